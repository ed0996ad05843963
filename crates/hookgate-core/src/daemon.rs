//! Daemon process lifecycle: startup, idle monitor, signals, and graceful
//! shutdown.

use std::io;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::{Duration, Instant};

use tokio::net::UnixListener;
use tokio::signal::unix::{SignalKind, signal};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use hookgate_config::DaemonConfig;

use crate::ipc::server::{self, Activity, IpcState};
use crate::logging::LogReader;
use crate::pidfile;
use crate::router::Router;
use crate::validation::ValidationGate;

/// Permission bits applied to the socket file.
pub const SOCKET_MODE: u32 = 0o640;

/// How often the drain loop re-checks in-flight requests.
const DRAIN_POLL: Duration = Duration::from_millis(25);

/// Errors from the daemon runtime.
#[derive(Debug, thiserror::Error)]
pub enum DaemonError {
    #[error("failed to bind daemon socket at {path}: {source}")]
    Bind {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to set permissions on socket {path}: {source}")]
    SocketPermissions {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to write PID file {path}: {source}")]
    PidFile {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to install signal handler: {0}")]
    Signal(#[source] io::Error),

    #[error("daemon already started")]
    AlreadyStarted,

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// Paths and timings for one daemon instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DaemonOptions {
    pub socket_path: PathBuf,
    pub pid_path: PathBuf,
    /// `None` disables the idle monitor.
    pub idle_timeout: Option<Duration>,
    pub idle_check_interval: Duration,
    pub request_timeout: Duration,
    pub drain_timeout: Duration,
}

impl DaemonOptions {
    /// Options from the `[daemon]` config section. An idle timeout of `0` disables the idle
    /// monitor.
    pub fn from_config(config: &DaemonConfig) -> Self {
        Self {
            socket_path: PathBuf::from(&config.socket_path),
            pid_path: PathBuf::from(&config.pid_path),
            idle_timeout: (config.idle_timeout_secs > 0)
                .then(|| Duration::from_secs(config.idle_timeout_secs)),
            idle_check_interval: Duration::from_secs(config.idle_check_interval_secs.max(1)),
            request_timeout: Duration::from_secs(config.request_timeout_secs.max(1)),
            drain_timeout: Duration::from_secs(config.drain_timeout_secs.max(1)),
        }
    }

    /// Default timings with the given paths.
    pub fn new(socket_path: impl Into<PathBuf>, pid_path: impl Into<PathBuf>) -> Self {
        Self {
            socket_path: socket_path.into(),
            pid_path: pid_path.into(),
            ..Self::default()
        }
    }

    /// Set the idle timeout. `None` or zero disables the idle monitor.
    pub fn with_idle_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.idle_timeout = timeout.filter(|t| !t.is_zero());
        self
    }

    /// Set how often the idle monitor checks for inactivity.
    pub fn with_idle_check_interval(mut self, interval: Duration) -> Self {
        self.idle_check_interval = interval;
        self
    }

    /// Set how long a connection may take to send its request line.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Set how long shutdown waits for in-flight requests.
    pub fn with_drain_timeout(mut self, timeout: Duration) -> Self {
        self.drain_timeout = timeout;
        self
    }
}

impl Default for DaemonOptions {
    fn default() -> Self {
        Self::from_config(&DaemonConfig::default())
    }
}

/// Everything the daemon serves requests with.
#[derive(Debug, Clone)]
pub struct DaemonContext {
    pub router: Arc<Router>,
    pub validation: Arc<ValidationGate>,
    pub logs: Option<LogReader>,
}

impl DaemonContext {
    /// Serve `router` with the default validation gate and no log collector.
    pub fn new(router: Router) -> Self {
        Self {
            router: Arc::new(router),
            validation: Arc::new(ValidationGate::default()),
            logs: None,
        }
    }

    /// Replace the validation gate.
    pub fn with_validation(mut self, validation: ValidationGate) -> Self {
        self.validation = Arc::new(validation);
        self
    }

    /// Back `get_logs` with `logs`.
    pub fn with_logs(mut self, logs: LogReader) -> Self {
        self.logs = Some(logs);
        self
    }
}

#[derive(Debug, Default)]
struct Tasks {
    accept: Option<JoinHandle<()>>,
    idle: Option<JoinHandle<()>>,
    signals: Option<JoinHandle<()>>,
}

#[derive(Debug)]
struct Inner {
    options: DaemonOptions,
    context: DaemonContext,
    activity: Arc<Activity>,
    started: AtomicBool,
    /// Set once this instance owns the socket and PID files.
    serving: AtomicBool,
    shutdown_requested: AtomicBool,
    stop_accept: watch::Sender<bool>,
    shutdown_done: watch::Sender<bool>,
    tasks: Mutex<Tasks>,
}

/// The hookgate daemon. Cheap to clone; clones share one instance.
#[derive(Debug, Clone)]
pub struct Daemon {
    inner: Arc<Inner>,
}

impl Daemon {
    /// Create a daemon. Nothing is bound until [`start`](Self::start).
    pub fn new(options: DaemonOptions, context: DaemonContext) -> Self {
        let (stop_accept, _) = watch::channel(false);
        let (shutdown_done, _) = watch::channel(false);
        Self {
            inner: Arc::new(Inner {
                options,
                context,
                activity: Arc::new(Activity::new()),
                started: AtomicBool::new(false),
                serving: AtomicBool::new(false),
                shutdown_requested: AtomicBool::new(false),
                stop_accept,
                shutdown_done,
                tasks: Mutex::new(Tasks::default()),
            }),
        }
    }

    /// The options this daemon was created with.
    pub fn options(&self) -> &DaemonOptions {
        &self.inner.options
    }

    /// Path of the Unix socket.
    pub fn socket_path(&self) -> &Path {
        &self.inner.options.socket_path
    }

    /// Path of the PID file.
    pub fn pid_path(&self) -> &Path {
        &self.inner.options.pid_path
    }

    /// The router serving requests.
    pub fn router(&self) -> &Arc<Router> {
        &self.inner.context.router
    }

    /// Number of requests currently in flight.
    pub fn active_requests(&self) -> usize {
        self.inner.activity.active_requests()
    }

    /// Whether a shutdown has been requested.
    pub fn is_shutting_down(&self) -> bool {
        self.inner.shutdown_requested.load(Ordering::SeqCst)
    }

    /// Whether shutdown has completed.
    pub fn is_stopped(&self) -> bool {
        *self.inner.shutdown_done.borrow()
    }

    /// Bind the socket, write the PID file and start serving.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(&self) -> Result<(), DaemonError> {
        if self.inner.started.swap(true, Ordering::SeqCst) {
            return Err(DaemonError::AlreadyStarted);
        }
        let options = &self.inner.options;

        let listener = bind_socket(&options.socket_path)?;

        if let Err(source) = pidfile::write_pid_file(&options.pid_path) {
            let _ = pidfile::remove_if_present(&options.socket_path);
            return Err(DaemonError::PidFile {
                path: options.pid_path.clone(),
                source,
            });
        }

        let state = IpcState {
            router: Arc::clone(&self.inner.context.router),
            validation: Arc::clone(&self.inner.context.validation),
            logs: self.inner.context.logs.clone(),
            activity: Arc::clone(&self.inner.activity),
            started_at: Instant::now(),
            request_timeout: options.request_timeout,
        };
        let accept = tokio::spawn(server::accept_loop(
            listener,
            Arc::new(state),
            self.inner.stop_accept.subscribe(),
        ));

        let idle = options.idle_timeout.map(|timeout| {
            tokio::spawn(idle_monitor(
                Arc::downgrade(&self.inner),
                timeout,
                options.idle_check_interval,
            ))
        });

        if let Ok(mut tasks) = self.inner.tasks.lock() {
            tasks.accept = Some(accept);
            tasks.idle = idle;
        }
        self.inner.serving.store(true, Ordering::SeqCst);

        info!(
            socket = %options.socket_path.display(),
            pid = std::process::id(),
            handlers = self.inner.context.router.handler_count(),
            idle_timeout = ?options.idle_timeout,
            validation = self.inner.context.validation.is_enabled(),
            strict = self.inner.context.validation.is_strict(),
            "hookgate daemon listening"
        );
        Ok(())
    }

    /// Start serving, handle SIGTERM/SIGINT, and return once shut down.
    pub async fn run(&self) -> Result<(), DaemonError> {
        self.start()?;
        if let Err(e) = self.install_signal_handlers() {
            self.shutdown().await;
            return Err(e);
        }
        self.wait_for_shutdown().await;
        Ok(())
    }

    /// Route SIGTERM and SIGINT to [`shutdown`](Self::shutdown).
    pub fn install_signal_handlers(&self) -> Result<(), DaemonError> {
        let mut terminate = signal(SignalKind::terminate()).map_err(DaemonError::Signal)?;
        let mut interrupt = signal(SignalKind::interrupt()).map_err(DaemonError::Signal)?;
        let weak = Arc::downgrade(&self.inner);

        let handle = tokio::spawn(async move {
            loop {
                let name = tokio::select! {
                    received = terminate.recv() => match received {
                        Some(()) => "SIGTERM",
                        None => break,
                    },
                    received = interrupt.recv() => match received {
                        Some(()) => "SIGINT",
                        None => break,
                    },
                };
                let Some(inner) = weak.upgrade() else {
                    break;
                };
                info!(signal = name, "signal received, shutting down");
                let daemon = Daemon { inner };
                tokio::spawn(async move {
                    daemon.shutdown().await;
                });
            }
        });

        if let Ok(mut tasks) = self.inner.tasks.lock() {
            tasks.signals = Some(handle);
        }
        Ok(())
    }

    /// Gracefully stop the daemon.
    ///
    /// Waits up to the drain timeout for in-flight requests, stops accepting,
    /// removes the socket and PID files. Returns `true` only for the call that
    /// performed the shutdown; concurrent and later calls return `false`.
    pub async fn shutdown(&self) -> bool {
        if self.inner.shutdown_requested.swap(true, Ordering::SeqCst) {
            debug!("shutdown already requested");
            return false;
        }
        info!("graceful shutdown started");

        let drain_timeout = self.inner.options.drain_timeout;
        let deadline = Instant::now() + drain_timeout;
        while self.inner.activity.active_requests() > 0 && Instant::now() < deadline {
            tokio::time::sleep(DRAIN_POLL).await;
        }
        let remaining = self.inner.activity.active_requests();
        if remaining > 0 {
            warn!(remaining, timeout = ?drain_timeout, "drain timed out with requests in flight");
        }

        self.inner.stop_accept.send_replace(true);

        let Tasks {
            accept,
            idle,
            signals,
        } = self
            .inner
            .tasks
            .lock()
            .map(|mut tasks| std::mem::take(&mut *tasks))
            .unwrap_or_default();

        if let Some(accept) = accept {
            let _ = accept.await;
        }

        // The files at the configured paths may belong to another instance
        // unless this one started serving.
        if self.inner.serving.load(Ordering::SeqCst) {
            for path in [&self.inner.options.socket_path, &self.inner.options.pid_path] {
                if let Err(e) = pidfile::remove_if_present(path) {
                    warn!(
                        path = %path.display(),
                        error = %e,
                        "failed to remove file during shutdown"
                    );
                }
            }
        }

        if let Some(idle) = idle {
            idle.abort();
        }
        if let Some(signals) = signals {
            signals.abort();
        }

        self.inner.shutdown_done.send_replace(true);
        info!("hookgate daemon stopped");
        true
    }

    /// Resolve once a shutdown has completed.
    pub async fn wait_for_shutdown(&self) {
        let mut done = self.inner.shutdown_done.subscribe();
        let _ = done.wait_for(|stopped| *stopped).await;
    }
}

fn bind_socket(path: &Path) -> Result<UnixListener, DaemonError> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent).map_err(|source| DaemonError::Bind {
            path: path.to_path_buf(),
            source,
        })?;
    }

    if path.exists() {
        debug!(path = %path.display(), "removing stale socket file");
        pidfile::remove_if_present(path).map_err(|source| DaemonError::Bind {
            path: path.to_path_buf(),
            source,
        })?;
    }

    let listener = UnixListener::bind(path).map_err(|source| DaemonError::Bind {
        path: path.to_path_buf(),
        source,
    })?;

    if let Err(source) =
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(SOCKET_MODE))
    {
        drop(listener);
        let _ = pidfile::remove_if_present(path);
        return Err(DaemonError::SocketPermissions {
            path: path.to_path_buf(),
            source,
        });
    }

    Ok(listener)
}

async fn idle_monitor(inner: Weak<Inner>, timeout: Duration, interval: Duration) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    // The first tick completes immediately.
    ticker.tick().await;

    loop {
        ticker.tick().await;
        let Some(inner) = inner.upgrade() else {
            break;
        };
        let idle_for = inner.activity.idle_for();
        if inner.activity.active_requests() == 0 && idle_for >= timeout {
            info!(idle_for = ?idle_for, "idle timeout reached, shutting down");
            let daemon = Daemon { inner };
            tokio::spawn(async move {
                daemon.shutdown().await;
            });
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn test_daemon(dir: &Path) -> Daemon {
        let options = DaemonOptions::new(dir.join("d.sock"), dir.join("d.pid"))
            .with_idle_timeout(None)
            .with_drain_timeout(Duration::from_millis(200));
        Daemon::new(options, DaemonContext::new(Router::new()))
    }

    #[test]
    fn test_options_from_config() {
        let config = DaemonConfig {
            idle_timeout_secs: 0,
            ..DaemonConfig::default()
        };
        let options = DaemonOptions::from_config(&config);
        assert_eq!(options.idle_timeout, None);
        assert_eq!(options.idle_check_interval, Duration::from_secs(60));
        assert_eq!(options.drain_timeout, Duration::from_secs(5));

        let options = DaemonOptions::default();
        assert_eq!(options.idle_timeout, Some(Duration::from_secs(600)));
    }

    #[tokio::test]
    async fn test_start_creates_socket_and_pid_file() {
        let dir = tempfile::tempdir().unwrap();
        let daemon = test_daemon(dir.path());
        daemon.start().unwrap();

        assert!(daemon.socket_path().exists());
        let mode = std::fs::metadata(daemon.socket_path())
            .unwrap()
            .permissions()
            .mode();
        assert_eq!(mode & 0o777, SOCKET_MODE);
        let pid = std::fs::read_to_string(daemon.pid_path()).unwrap();
        assert_eq!(pid.trim(), std::process::id().to_string());

        assert!(daemon.shutdown().await);
        assert!(!daemon.socket_path().exists());
        assert!(!daemon.pid_path().exists());
        assert!(daemon.is_stopped());
    }

    #[tokio::test]
    async fn test_start_twice_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let daemon = test_daemon(dir.path());
        daemon.start().unwrap();
        assert!(matches!(daemon.start(), Err(DaemonError::AlreadyStarted)));
        daemon.shutdown().await;
    }

    #[tokio::test]
    async fn test_second_shutdown_is_a_noop() {
        let dir = tempfile::tempdir().unwrap();
        let daemon = test_daemon(dir.path());
        daemon.start().unwrap();
        assert!(daemon.shutdown().await);
        assert!(!daemon.shutdown().await);
        daemon.wait_for_shutdown().await;
    }

    #[tokio::test]
    async fn test_bind_failure_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        // Unix socket paths are limited to ~108 bytes.
        let long = dir.path().join("s".repeat(200));
        let daemon = Daemon::new(
            DaemonOptions::new(long, dir.path().join("d.pid")).with_idle_timeout(None),
            DaemonContext::new(Router::new()),
        );
        let err = daemon.start().unwrap_err();
        assert!(matches!(err, DaemonError::Bind { .. }));
        assert!(!dir.path().join("d.pid").exists());
    }

    #[tokio::test]
    async fn test_shutdown_before_start_keeps_files() {
        let dir = tempfile::tempdir().unwrap();
        let daemon = test_daemon(dir.path());
        std::fs::write(daemon.socket_path(), b"someone else's socket").unwrap();
        std::fs::write(daemon.pid_path(), "1\n").unwrap();

        assert!(daemon.shutdown().await);
        assert!(daemon.is_stopped());
        assert!(daemon.socket_path().exists());
        assert_eq!(std::fs::read_to_string(daemon.pid_path()).unwrap(), "1\n");
    }
}
