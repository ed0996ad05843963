//! IPC client: connects to the daemon over a Unix domain socket.
//!
//! Used by the CLI and by hook forwarders: one connection, one request line,
//! one response line.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::UnixStream;
use tracing::debug;

use super::types::*;

/// Errors from the IPC client.
#[derive(Debug, thiserror::Error)]
pub enum IpcClientError {
    #[error("failed to connect to daemon socket at {path}: {source}")]
    Connect {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("daemon is not running (socket not found at {0})")]
    NotRunning(PathBuf),

    #[error("timed out after {0:?} waiting for the daemon")]
    Timeout(Duration),

    #[error("failed to parse response: {0}")]
    Parse(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("daemon returned error: {error}")]
    Daemon {
        error: String,
        details: Option<Vec<String>>,
    },
}

/// Client for communicating with the hookgate daemon via Unix socket.
#[derive(Debug, Clone)]
pub struct IpcClient {
    socket_path: PathBuf,
    timeout: Duration,
}

impl IpcClient {
    /// Create a new IPC client targeting the given socket path.
    pub fn new(socket_path: impl Into<PathBuf>) -> Self {
        Self {
            socket_path: socket_path.into(),
            timeout: Duration::from_secs(30),
        }
    }

    /// Set the timeout for a whole request/response exchange.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// The socket this client connects to.
    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    /// Check if the daemon socket exists (daemon is likely running).
    pub fn daemon_available(&self) -> bool {
        self.socket_path.exists()
    }

    /// Send one raw line and return the raw response line (without newline).
    pub async fn send_line(&self, line: &str) -> Result<String, IpcClientError> {
        if !self.daemon_available() {
            return Err(IpcClientError::NotRunning(self.socket_path.clone()));
        }
        tokio::time::timeout(self.timeout, self.exchange(line))
            .await
            .map_err(|_| IpcClientError::Timeout(self.timeout))?
    }

    async fn exchange(&self, line: &str) -> Result<String, IpcClientError> {
        let stream = UnixStream::connect(&self.socket_path)
            .await
            .map_err(|source| IpcClientError::Connect {
                path: self.socket_path.clone(),
                source,
            })?;
        let (read_half, mut write_half) = stream.into_split();

        debug!(bytes = line.len(), "IPC request");
        write_half.write_all(line.trim_end().as_bytes()).await?;
        write_half.write_all(b"\n").await?;
        write_half.flush().await?;

        let mut response = String::new();
        BufReader::new(read_half).read_line(&mut response).await?;
        if response.is_empty() {
            return Err(IpcClientError::Parse(
                "connection closed without a response".to_string(),
            ));
        }
        Ok(response.trim_end().to_string())
    }

    /// Send a request and return the response object, turning error
    /// responses into [`IpcClientError::Daemon`].
    pub async fn request(&self, request: &HookRequest) -> Result<Value, IpcClientError> {
        let line =
            serde_json::to_string(request).map_err(|e| IpcClientError::Parse(e.to_string()))?;
        let response = self.send_line(&line).await?;
        let value: Value =
            serde_json::from_str(&response).map_err(|e| IpcClientError::Parse(e.to_string()))?;

        if let Some(error) = value.get("error").and_then(Value::as_str) {
            let details = value
                .get("details")
                .and_then(|d| serde_json::from_value(d.clone()).ok());
            return Err(IpcClientError::Daemon {
                error: error.to_string(),
                details,
            });
        }
        Ok(value)
    }

    /// Dispatch an ordinary event.
    pub async fn dispatch(
        &self,
        event: &str,
        hook_input: Value,
        request_id: Option<String>,
    ) -> Result<HookResponse, IpcClientError> {
        let mut request = HookRequest::new(event, hook_input);
        request.request_id = request_id;
        decode(self.request(&request).await?)
    }

    /// Run a `_system` action and return its `result`.
    pub async fn system(&self, action: &str, params: Value) -> Result<Value, IpcClientError> {
        let response: SystemResponse =
            decode(self.request(&HookRequest::system(action, params)).await?)?;
        Ok(response.result)
    }

    /// Fetch daemon health.
    pub async fn health(&self) -> Result<HealthResponse, IpcClientError> {
        decode(self.system("health", Value::Null).await?)
    }

    /// Fetch the registered handlers per event type.
    pub async fn handlers(&self) -> Result<HandlersResponse, IpcClientError> {
        decode(self.system("handlers", Value::Null).await?)
    }

    /// Fetch recent log entries, optionally filtered by minimum level.
    pub async fn logs(
        &self,
        count: Option<usize>,
        level: Option<&str>,
    ) -> Result<LogsResponse, IpcClientError> {
        let mut params = serde_json::Map::new();
        if let Some(count) = count {
            params.insert("count".to_string(), count.into());
        }
        if let Some(level) = level {
            params.insert("level".to_string(), level.into());
        }
        decode(self.system("get_logs", Value::Object(params)).await?)
    }

    /// Write a marker into the daemon log.
    pub async fn log_marker(
        &self,
        message: Option<&str>,
    ) -> Result<MarkerResponse, IpcClientError> {
        let params = match message {
            Some(message) => serde_json::json!({ "message": message }),
            None => Value::Null,
        };
        decode(self.system("log_marker", params).await?)
    }
}

fn decode<T: DeserializeOwned>(value: Value) -> Result<T, IpcClientError> {
    serde_json::from_value(value).map_err(|e| IpcClientError::Parse(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_creation() {
        let client = IpcClient::new("/tmp/test-hookgate.sock");
        assert_eq!(client.socket_path(), Path::new("/tmp/test-hookgate.sock"));
    }

    #[tokio::test]
    async fn test_client_daemon_not_running() {
        let dir = tempfile::tempdir().unwrap();
        let client = IpcClient::new(dir.path().join("missing.sock"));
        assert!(!client.daemon_available());

        let err = client.health().await.unwrap_err();
        assert!(matches!(err, IpcClientError::NotRunning(_)));
    }

    #[tokio::test]
    async fn test_client_reports_daemon_errors() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fake.sock");
        let listener = tokio::net::UnixListener::bind(&path).unwrap();
        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let (read_half, mut write_half) = stream.into_split();
            let mut line = String::new();
            BufReader::new(read_half).read_line(&mut line).await.unwrap();
            write_half
                .write_all(b"{\"error\":\"Input validation failed\",\"details\":[\"missing\"]}\n")
                .await
                .unwrap();
        });

        let client = IpcClient::new(&path);
        let err = client
            .dispatch("PreToolUse", serde_json::json!({}), None)
            .await
            .unwrap_err();
        match err {
            IpcClientError::Daemon { error, details } => {
                assert_eq!(error, "Input validation failed");
                assert_eq!(details, Some(vec!["missing".to_string()]));
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
