//! Signal-driven shutdown. Kept in its own test binary: the signal is
//! raised against the whole process.

use std::time::Duration;

use hookgate_core::{Daemon, DaemonContext, Router};
use hookgate_test_utils::daemon::TestDaemon;
use nix::sys::signal::{Signal, raise};

// ── SIGTERM ───────────────────────────────────────────────────────

// Current-thread runtime: `run` installs the signal handlers in the same poll
// that binds the socket, so a visible socket means SIGTERM is handled.
#[test_log::test(tokio::test)]
async fn test_sigterm_stops_running_daemon() {
    let dir = tempfile::tempdir().unwrap();
    let daemon = Daemon::new(
        TestDaemon::options_in(dir.path()),
        DaemonContext::new(Router::new()),
    );
    let socket = daemon.socket_path().to_path_buf();

    let runner = daemon.clone();
    let run = tokio::spawn(async move { runner.run().await });

    for _ in 0..200 {
        if socket.exists() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert!(socket.exists(), "daemon did not bind");

    raise(Signal::SIGTERM).unwrap();

    let outcome = tokio::time::timeout(Duration::from_secs(5), run)
        .await
        .expect("run returns after SIGTERM")
        .unwrap();
    assert!(outcome.is_ok());
    assert!(daemon.is_stopped());
    assert!(!socket.exists());
    assert!(!daemon.pid_path().exists());
}
