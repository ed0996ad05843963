//! Tracing initialisation helpers for tests.
//!
//! Call [`init_test_tracing`] at the top of any test that emits tracing events
//! and wants them shown by the test harness. Use [`capture_logs`] when the
//! test needs to read the events back, e.g. through `get_logs`.

use hookgate_core::{LogCollector, LogReader};
use tracing::subscriber::DefaultGuard;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Initialise a global subscriber that writes to the test-harness writer
/// and respects the `RUST_LOG` environment variable.
///
/// Idempotent: later calls are silently ignored.
///
/// # Example
///
/// ```ignore
/// #[tokio::test]
/// async fn my_test() {
///     hookgate_test_utils::tracing_setup::init_test_tracing();
///     tracing::info!("visible when RUST_LOG=info");
/// }
/// ```
pub fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_test_writer()
        .try_init();
}

/// Capture events on the current thread into a fresh [`LogCollector`].
///
/// Events are captured until the returned guard drops. Only events emitted on
/// this thread are seen, so pair it with a current-thread runtime.
pub fn capture_logs(capacity: usize) -> (LogReader, DefaultGuard) {
    let collector = LogCollector::new(capacity);
    let reader = collector.reader();
    let guard = tracing_subscriber::registry()
        .with(collector)
        .with(tracing_subscriber::fmt::layer().with_test_writer())
        .set_default();
    (reader, guard)
}
