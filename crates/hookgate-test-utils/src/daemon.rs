//! Daemon test helpers.
//!
//! [`TestDaemon`] runs a real daemon on a socket inside an owned temporary
//! directory, with the idle monitor off and a short drain timeout.

use std::path::{Path, PathBuf};
use std::time::Duration;

use hookgate_core::ipc::IpcClient;
use hookgate_core::{Daemon, DaemonContext, DaemonOptions, Router};
use tempfile::TempDir;

/// A started test-scoped daemon.
///
/// The temp directory is deleted automatically when this value is dropped,
/// guaranteeing cleanup even on panic.
pub struct TestDaemon {
    pub daemon: Daemon,
    _temp_dir: TempDir,
}

impl TestDaemon {
    /// Options pointing into `dir`: no idle shutdown, 500 ms drain.
    pub fn options_in(dir: &Path) -> DaemonOptions {
        DaemonOptions::new(dir.join("hookgate.sock"), dir.join("hookgate.pid"))
            .with_idle_timeout(None)
            .with_request_timeout(Duration::from_secs(5))
            .with_drain_timeout(Duration::from_millis(500))
    }

    /// Start a daemon serving `router` with validation disabled.
    pub fn start(router: Router) -> Self {
        let context =
            DaemonContext::new(router).with_validation(hookgate_core::ValidationGate::disabled());
        Self::start_with(context, |options| options)
    }

    /// Start a daemon with a custom context and adjusted options.
    pub fn start_with(
        context: DaemonContext,
        adjust: impl FnOnce(DaemonOptions) -> DaemonOptions,
    ) -> Self {
        let temp_dir = TempDir::new().expect("failed to create temp dir");
        let options = adjust(Self::options_in(temp_dir.path()));
        let daemon = Daemon::new(options, context);
        daemon.start().expect("failed to start test daemon");
        Self {
            daemon,
            _temp_dir: temp_dir,
        }
    }

    /// Path of the daemon socket.
    pub fn socket_path(&self) -> PathBuf {
        self.daemon.socket_path().to_path_buf()
    }

    /// A client with a 5 s timeout.
    pub fn client(&self) -> IpcClient {
        IpcClient::new(self.socket_path()).with_timeout(Duration::from_secs(5))
    }

    /// Shut down and wait for completion.
    pub async fn stop(&self) -> bool {
        self.daemon.shutdown().await
    }
}
