//! Shared test utilities for mergington integration tests.
//!
//! - [`StubMcpServer`]: an in-process HTTP server standing in for the local
//!   GitHub MCP endpoint. Answers every request with a canned status/body and
//!   records the payloads it received.
//! - [`unreachable_url`]: a URL nothing listens on, to force the fallback path.
//! - [`truncated_response_url`]: a one-shot server whose response body ends
//!   before its declared length.
//! - [`SaturatedListener`]: a listener whose accept queue is full, so new
//!   connects hang instead of being refused.
//! - [`write_bridge_script`]: a shell script standing in for the containerized
//!   MCP server on the subprocess path.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use axum::extract::State;
use axum::http::{StatusCode, header};
use axum::response::IntoResponse;
use axum::routing::post;
use axum::{Json, Router};
use parking_lot::Mutex;
use serde_json::Value;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpSocket, TcpStream};
use tokio::task::JoinHandle;

// ---------------------------------------------------------------------------
// Stub MCP server
// ---------------------------------------------------------------------------

#[derive(Clone)]
struct StubState {
    status: StatusCode,
    body: String,
    received: Arc<Mutex<Vec<Value>>>,
}

async fn respond(State(state): State<StubState>, Json(payload): Json<Value>) -> impl IntoResponse {
    state.received.lock().push(payload);
    (
        state.status,
        [(header::CONTENT_TYPE, "application/json")],
        state.body.clone(),
    )
}

/// A running stub of the local MCP HTTP endpoint. Stops when dropped.
pub struct StubMcpServer {
    url: String,
    received: Arc<Mutex<Vec<Value>>>,
    handle: JoinHandle<()>,
}

impl StubMcpServer {
    /// Start a stub answering every POST to `/github` with `status` and the
    /// JSON `body`.
    pub async fn start(status: u16, body: Value) -> Self {
        Self::start_raw(status, body.to_string()).await
    }

    /// Like [`StubMcpServer::start`] but with an arbitrary (possibly
    /// non-JSON) body.
    pub async fn start_raw(status: u16, body: impl Into<String>) -> Self {
        let received = Arc::new(Mutex::new(Vec::new()));
        let state = StubState {
            status: StatusCode::from_u16(status).expect("invalid stub status code"),
            body: body.into(),
            received: Arc::clone(&received),
        };

        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind stub MCP server");
        let addr = listener.local_addr().expect("stub MCP server has no address");

        let app = Router::new().route("/github", post(respond)).with_state(state);
        let handle = tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });

        Self {
            url: format!("http://{addr}/github"),
            received,
            handle,
        }
    }

    /// Full URL of the stub's MCP endpoint.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Every request payload received so far, in arrival order.
    pub fn received(&self) -> Vec<Value> {
        self.received.lock().clone()
    }
}

impl Drop for StubMcpServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// Return an HTTP URL on a local port with no listener.
///
/// Binds an ephemeral port and releases it immediately, so connecting to the
/// returned URL fails with "connection refused".
pub async fn unreachable_url() -> String {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("failed to bind probe listener");
    let addr = listener.local_addr().expect("probe listener has no address");
    drop(listener);
    format!("http://{addr}/github")
}

/// Serve one request with `status` and a body cut short of its
/// `Content-Length`, then close. Returns the endpoint URL.
pub async fn truncated_response_url(status: u16) -> String {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("failed to bind truncated response server");
    let addr = listener.local_addr().expect("truncated response server has no address");

    tokio::spawn(async move {
        let Ok((mut stream, _)) = listener.accept().await else {
            return;
        };
        let mut request = Vec::new();
        let mut chunk = [0u8; 1024];
        while !request_complete(&request) {
            match stream.read(&mut chunk).await {
                Ok(0) | Err(_) => return,
                Ok(n) => request.extend_from_slice(&chunk[..n]),
            }
        }
        let response = format!(
            "HTTP/1.1 {status} Error\r\nContent-Length: 64\r\nConnection: close\r\n\r\npartial"
        );
        let _ = stream.write_all(response.as_bytes()).await;
        let _ = stream.shutdown().await;
    });

    format!("http://{addr}/github")
}

/// Whether `buf` holds the request head and its full `Content-Length` body.
fn request_complete(buf: &[u8]) -> bool {
    let Some(end) = buf.windows(4).position(|w| w == b"\r\n\r\n") else {
        return false;
    };
    let head = String::from_utf8_lossy(&buf[..end]).to_ascii_lowercase();
    let body_len = head
        .lines()
        .find_map(|line| line.strip_prefix("content-length:"))
        .and_then(|v| v.trim().parse::<usize>().ok())
        .unwrap_or(0);
    buf.len() >= end + 4 + body_len
}

/// A bound listener that never accepts, with its backlog filled.
///
/// Linux drops SYNs for a listener whose accept queue is full, so a client
/// connecting to [`SaturatedListener::url`] waits until its own connect
/// timeout fires.
pub struct SaturatedListener {
    url: String,
    _listener: TcpListener,
    _queued: Vec<TcpStream>,
}

impl SaturatedListener {
    pub async fn start() -> Self {
        let socket = TcpSocket::new_v4().expect("failed to create socket");
        socket
            .bind(([127, 0, 0, 1], 0).into())
            .expect("failed to bind saturated listener");
        let listener = socket.listen(1).expect("failed to listen");
        let addr = listener.local_addr().expect("saturated listener has no address");

        // Queue connections until one stalls; the queue is then full.
        let mut queued = Vec::new();
        for _ in 0..16 {
            match tokio::time::timeout(Duration::from_millis(200), TcpStream::connect(addr)).await {
                Ok(Ok(stream)) => queued.push(stream),
                _ => break,
            }
        }

        Self {
            url: format!("http://{addr}/github"),
            _listener: listener,
            _queued: queued,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

// ---------------------------------------------------------------------------
// Fake bridge scripts
// ---------------------------------------------------------------------------

/// A fake MCP bridge written to disk.
#[derive(Debug, Clone)]
pub struct BridgeScript {
    /// Path of the script; run it as `sh <path>`.
    pub path: PathBuf,
    /// File the script copies its stdin into.
    pub stdin_capture: PathBuf,
}

impl BridgeScript {
    /// `("sh", [path])`, ready to drop into a bridge config.
    pub fn command(&self) -> (String, Vec<String>) {
        (
            "sh".to_string(),
            vec![self.path.to_string_lossy().into_owned()],
        )
    }

    /// What the bridge received on stdin, or `None` if it never ran.
    pub fn captured_stdin(&self) -> Option<String> {
        std::fs::read_to_string(&self.stdin_capture).ok()
    }
}

/// Write a shell script into `dir` that copies stdin to a capture file,
/// prints `stdout` and `stderr`, and exits with `exit_code`.
pub fn write_bridge_script(
    dir: &Path,
    name: &str,
    stdout: &str,
    stderr: &str,
    exit_code: i32,
) -> BridgeScript {
    let path = dir.join(format!("{name}.sh"));
    let stdin_capture = dir.join(format!("{name}.stdin"));

    let script = format!(
        "#!/bin/sh\ncat > {capture}\nprintf '%s' {stdout}\nprintf '%s' {stderr} >&2\nexit {exit_code}\n",
        capture = shell_quote(&stdin_capture.to_string_lossy()),
        stdout = shell_quote(stdout),
        stderr = shell_quote(stderr),
    );
    std::fs::write(&path, script).expect("failed to write bridge script");

    BridgeScript {
        path,
        stdin_capture,
    }
}

/// Wrap `s` in single quotes, escaping embedded single quotes.
fn shell_quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', "'\\''"))
}
