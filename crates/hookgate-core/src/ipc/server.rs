//! IPC server: newline-delimited JSON over a Unix domain socket.
//!
//! Each accepted connection carries exactly one request line and receives
//! exactly one response line.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::watch;
use tracing::{debug, error, warn};

use super::system;
use super::types::*;
use crate::event::EventType;
use crate::logging::LogReader;
use crate::router::Router;
use crate::validation::{GateOutcome, ValidationGate};

/// Default Unix socket path for daemon IPC.
pub const DEFAULT_SOCKET_PATH: &str = "/tmp/hookgate.sock";

/// Request-activity bookkeeping shared by the server and the idle monitor.
#[derive(Debug)]
pub struct Activity {
    active: AtomicUsize,
    last: Mutex<Instant>,
}

impl Activity {
    /// No requests in flight; idle since now.
    pub fn new() -> Self {
        Self {
            active: AtomicUsize::new(0),
            last: Mutex::new(Instant::now()),
        }
    }

    /// Count a request as in flight until the returned guard drops.
    pub fn begin(self: &Arc<Self>) -> ActiveRequest {
        self.active.fetch_add(1, Ordering::SeqCst);
        self.touch();
        ActiveRequest {
            activity: Arc::clone(self),
        }
    }

    /// Record activity now.
    pub fn touch(&self) {
        if let Ok(mut last) = self.last.lock() {
            *last = Instant::now();
        }
    }

    /// Number of requests currently in flight.
    pub fn active_requests(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    /// Time since the last request started or finished.
    pub fn idle_for(&self) -> Duration {
        self.last
            .lock()
            .map(|last| last.elapsed())
            .unwrap_or_default()
    }
}

impl Default for Activity {
    fn default() -> Self {
        Self::new()
    }
}

/// In-flight marker for one request.
#[derive(Debug)]
pub struct ActiveRequest {
    activity: Arc<Activity>,
}

impl Drop for ActiveRequest {
    fn drop(&mut self) {
        self.activity.active.fetch_sub(1, Ordering::SeqCst);
        self.activity.touch();
    }
}

/// Shared state for every connection.
#[derive(Debug)]
pub struct IpcState {
    pub router: Arc<Router>,
    pub validation: Arc<ValidationGate>,
    pub logs: Option<LogReader>,
    pub activity: Arc<Activity>,
    pub started_at: Instant,
    pub request_timeout: Duration,
}

impl IpcState {
    /// State with no log collector and a 30 s request timeout.
    pub fn new(router: Arc<Router>, validation: Arc<ValidationGate>) -> Self {
        Self {
            router,
            validation,
            logs: None,
            activity: Arc::new(Activity::new()),
            started_at: Instant::now(),
            request_timeout: Duration::from_secs(30),
        }
    }

    /// Back `get_logs` with `logs`.
    pub fn with_logs(mut self, logs: LogReader) -> Self {
        self.logs = Some(logs);
        self
    }

    /// Share activity bookkeeping with the idle monitor.
    pub fn with_activity(mut self, activity: Arc<Activity>) -> Self {
        self.activity = activity;
        self
    }

    /// Set how long a connection may take to send its request line.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }
}

/// Accept connections until `stop` flips to `true`.
///
/// Each connection runs in its own task. The listener is dropped when this
/// returns; connections already accepted finish on their own.
pub async fn accept_loop(
    listener: UnixListener,
    state: Arc<IpcState>,
    mut stop: watch::Receiver<bool>,
) {
    loop {
        if *stop.borrow_and_update() {
            break;
        }
        tokio::select! {
            biased;
            changed = stop.changed() => {
                if changed.is_err() {
                    break;
                }
            }
            accepted = listener.accept() => match accepted {
                Ok((stream, _)) => {
                    let guard = state.activity.begin();
                    let state = Arc::clone(&state);
                    tokio::spawn(async move {
                        let _guard = guard;
                        if let Err(e) = handle_connection(stream, &state).await {
                            debug!(error = %e, "connection ended with I/O error");
                        }
                    });
                }
                Err(e) => {
                    warn!(error = %e, "accept failed");
                    tokio::time::sleep(Duration::from_millis(10)).await;
                }
            },
        }
    }
    debug!("accept loop stopped");
}

/// Serve one connection: read a line, reply with a line, close.
pub async fn handle_connection(stream: UnixStream, state: &IpcState) -> std::io::Result<()> {
    let (read_half, mut write_half) = stream.into_split();
    let mut reader = BufReader::new(read_half).take(MAX_REQUEST_BYTES as u64 + 1);
    let mut buf = Vec::new();

    let read = tokio::time::timeout(state.request_timeout, reader.read_until(b'\n', &mut buf));
    let reply = match read.await {
        Err(_) => {
            warn!(timeout = ?state.request_timeout, "request read timed out");
            protocol_error(ProtocolError::Timeout)
        }
        Ok(Err(e)) => return Err(e),
        Ok(Ok(0)) => return Ok(()),
        Ok(Ok(_)) if line_len(&buf) > MAX_REQUEST_BYTES => {
            warn!(limit = MAX_REQUEST_BYTES, "request line too large");
            let mut rest = reader.into_inner();
            match tokio::time::timeout(state.request_timeout, discard_line(&mut rest)).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => return Err(e),
                Err(_) => debug!("gave up discarding oversized request"),
            }
            protocol_error(ProtocolError::TooLarge(MAX_REQUEST_BYTES))
        }
        Ok(Ok(_)) => match std::str::from_utf8(&buf) {
            Ok(line) => process_line(state, line).await,
            Err(e) => protocol_error(ProtocolError::MalformedJson(e.to_string())),
        },
    };

    let mut line = reply.to_line();
    line.push('\n');
    write_half.write_all(line.as_bytes()).await?;
    write_half.flush().await?;
    write_half.shutdown().await
}

fn protocol_error(error: ProtocolError) -> Reply {
    Reply::Error(ErrorResponse::from(ProtocolRejection::from(error)))
}

/// Length of a request line without its terminating newline.
fn line_len(buf: &[u8]) -> usize {
    match buf.last() {
        Some(b'\n') => buf.len() - 1,
        _ => buf.len(),
    }
}

/// Drop input up to and including the next newline, or until EOF.
///
/// Runs before replying to an oversized line: the peer only reads its reply
/// once the whole line is written.
async fn discard_line<R: AsyncBufRead + Unpin>(reader: &mut R) -> std::io::Result<()> {
    loop {
        let chunk = reader.fill_buf().await?;
        if chunk.is_empty() {
            return Ok(());
        }
        match chunk.iter().position(|&b| b == b'\n') {
            Some(end) => {
                reader.consume(end + 1);
                return Ok(());
            }
            None => {
                let len = chunk.len();
                reader.consume(len);
            }
        }
    }
}

/// Turn one request line into its reply.
pub async fn process_line(state: &IpcState, line: &str) -> Reply {
    let request = match parse_request(line) {
        Ok(request) => request,
        Err(rejection) => {
            debug!(error = %rejection.error, "rejected request");
            return Reply::Error(rejection.into());
        }
    };

    if request.is_system() {
        return system::dispatch(state, request.request_id, &request.hook_input);
    }

    let HookRequest {
        request_id,
        event: event_name,
        hook_input,
    } = request;

    let Ok(event) = event_name.parse::<EventType>() else {
        debug!(event = %event_name, "unknown event type");
        return Reply::Error(
            ErrorResponse::new(format!("Unknown event type: {event_name}"))
                .with_request_id(request_id),
        );
    };

    if let GateOutcome::Rejected(problems) = state.validation.check(event, &hook_input) {
        debug!(event = %event, problems = ?problems, "input validation rejected request");
        return Reply::Error(
            ErrorResponse::new("Input validation failed")
                .with_details(problems)
                .with_event(event.as_str())
                .with_request_id(request_id),
        );
    }

    let router = Arc::clone(&state.router);
    match tokio::task::spawn_blocking(move || router.route(event, &hook_input)).await {
        Ok(execution) => Reply::Hook(HookResponse {
            request_id,
            execution,
        }),
        Err(e) => {
            error!(event = %event, error = %e, "chain execution task failed");
            Reply::Error(
                ErrorResponse::new("Handler execution failed")
                    .with_details(vec![e.to_string()])
                    .with_event(event.as_str())
                    .with_request_id(request_id),
            )
        }
    }
}
