//! GitHub MCP proxy: forwards structured requests to a GitHub MCP server.
//!
//! Two transports are supported, tried in order by [`McpClient`]:
//!
//! ```text
//! McpClient::execute(action, parameters)
//!     |
//!     v
//! LocalService     POST http://localhost:8912/github   (30s timeout)
//!     |  connection refused / connect timeout (5s)
//!     v
//! SubprocessBridge docker run -i --rm ... github-mcp-server
//!                  request JSON -> stdin, response JSON <- stdout
//! ```
//!
//! Only a connection failure moves on to the next transport. An HTTP error
//! status from a reachable server is returned to the caller as
//! [`McpError::Upstream`].

pub mod bridge;
pub mod local;
pub mod search;

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

pub use bridge::{BridgeConfig, SubprocessBridge};
pub use local::LocalService;
pub use search::{SearchOptions, SearchSort, SortOrder};

/// Protocol version sent in every request payload.
pub const MCP_VERSION: &str = "0.1";

// ---------------------------------------------------------------------------
// Request / error types
// ---------------------------------------------------------------------------

/// The `{version, action, parameters}` payload understood by the MCP server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct McpRequest {
    pub version: String,
    pub action: String,
    pub parameters: Value,
}

impl McpRequest {
    pub fn new(action: impl Into<String>, parameters: Value) -> Self {
        Self {
            version: MCP_VERSION.to_string(),
            action: action.into(),
            parameters,
        }
    }
}

/// Errors surfaced by the MCP transports.
#[derive(Debug, thiserror::Error)]
pub enum McpError {
    /// The local MCP endpoint could not be reached. Triggers fallback.
    #[error("could not connect to MCP server at {url}: {source}")]
    Connect {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// The local MCP server answered with a non-200 status.
    #[error("GitHub MCP server error ({status}): {body}")]
    Upstream { status: u16, body: String },

    #[error("MCP HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("failed to spawn MCP bridge `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    /// The bridge process exited unsuccessfully.
    #[error("GitHub MCP server error: {stderr}")]
    Process { code: Option<i32>, stderr: String },

    #[error("MCP bridge I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("MCP bridge timed out after {0:?}")]
    Timeout(Duration),

    #[error("invalid JSON from MCP server: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("no MCP transport configured")]
    NoTransport,
}

impl McpError {
    /// Whether the error means "nobody is listening" rather than "the server
    /// said no". Only these errors fall through to the next transport.
    pub fn is_unreachable(&self) -> bool {
        matches!(self, McpError::Connect { .. })
    }
}

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Settings for both transports.
#[derive(Debug, Clone)]
pub struct McpConfig {
    /// Try the local HTTP endpoint before the bridge.
    pub use_local_server: bool,
    /// URL of the local MCP HTTP endpoint.
    pub local_url: String,
    /// Connect timeout for the local endpoint. Expiry counts as unreachable.
    pub connect_timeout: Duration,
    /// Request timeout for the local endpoint.
    pub timeout: Duration,
    pub bridge: BridgeConfig,
}

impl McpConfig {
    pub const DEFAULT_LOCAL_URL: &str = "http://localhost:8912/github";
    pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 5;
    pub const DEFAULT_TIMEOUT_SECS: u64 = 30;
}

impl Default for McpConfig {
    fn default() -> Self {
        Self {
            use_local_server: true,
            local_url: Self::DEFAULT_LOCAL_URL.to_string(),
            connect_timeout: Duration::from_secs(Self::DEFAULT_CONNECT_TIMEOUT_SECS),
            timeout: Duration::from_secs(Self::DEFAULT_TIMEOUT_SECS),
            bridge: BridgeConfig::default(),
        }
    }
}

// ---------------------------------------------------------------------------
// Transport dispatch
// ---------------------------------------------------------------------------

/// One way of reaching the MCP server.
#[derive(Debug, Clone)]
pub enum McpTransport {
    LocalService(LocalService),
    SubprocessBridge(SubprocessBridge),
}

impl McpTransport {
    pub fn name(&self) -> &'static str {
        match self {
            McpTransport::LocalService(_) => "local-service",
            McpTransport::SubprocessBridge(_) => "subprocess-bridge",
        }
    }

    /// Send `request` and return the decoded JSON response.
    pub async fn request(&self, request: &McpRequest) -> Result<Value, McpError> {
        match self {
            McpTransport::LocalService(local) => local.request(request).await,
            McpTransport::SubprocessBridge(bridge) => bridge.request(request).await,
        }
    }
}

impl From<LocalService> for McpTransport {
    fn from(local: LocalService) -> Self {
        McpTransport::LocalService(local)
    }
}

impl From<SubprocessBridge> for McpTransport {
    fn from(bridge: SubprocessBridge) -> Self {
        McpTransport::SubprocessBridge(bridge)
    }
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// Ordered list of transports with connection-failure fallback.
#[derive(Debug, Clone)]
pub struct McpClient {
    transports: Vec<McpTransport>,
}

impl McpClient {
    /// Create a client that tries `transports` in order.
    pub fn new(transports: Vec<McpTransport>) -> Self {
        Self { transports }
    }

    /// Build the standard chain: local service (if enabled), then the bridge.
    pub fn from_config(config: &McpConfig) -> Result<Self, McpError> {
        let mut transports = Vec::with_capacity(2);
        if config.use_local_server {
            let local = LocalService::with_timeouts(
                &config.local_url,
                config.connect_timeout,
                config.timeout,
            )?;
            transports.push(local.into());
        }
        transports.push(SubprocessBridge::new(config.bridge.clone()).into());
        Ok(Self::new(transports))
    }

    /// Names of the configured transports, in the order they are tried.
    pub fn transport_names(&self) -> Vec<&'static str> {
        self.transports.iter().map(McpTransport::name).collect()
    }

    /// Run an arbitrary MCP action.
    pub async fn execute(&self, action: &str, parameters: Value) -> Result<Value, McpError> {
        self.send(&McpRequest::new(action, parameters)).await
    }

    /// Send a prepared request through the transport chain.
    pub async fn send(&self, request: &McpRequest) -> Result<Value, McpError> {
        let mut last_unreachable = None;

        for transport in &self.transports {
            debug!(transport = transport.name(), action = %request.action, "sending MCP request");
            match transport.request(request).await {
                Err(err) if err.is_unreachable() => {
                    warn!(
                        transport = transport.name(),
                        error = %err,
                        "MCP transport unreachable, falling back"
                    );
                    last_unreachable = Some(err);
                }
                other => return other,
            }
        }

        Err(last_unreachable.unwrap_or(McpError::NoTransport))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_serializes_with_version() {
        let req = McpRequest::new("search_issues", serde_json::json!({"q": "bug"}));
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "version": "0.1",
                "action": "search_issues",
                "parameters": {"q": "bug"},
            })
        );
    }

    #[test]
    fn only_connect_errors_are_unreachable() {
        assert!(!McpError::Upstream {
            status: 502,
            body: "bad gateway".into()
        }
        .is_unreachable());
        assert!(!McpError::Process {
            code: Some(1),
            stderr: "boom".into()
        }
        .is_unreachable());
        assert!(!McpError::NoTransport.is_unreachable());
    }

    #[test]
    fn upstream_error_preserves_status_and_body() {
        let err = McpError::Upstream {
            status: 503,
            body: "maintenance".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("503"), "{msg}");
        assert!(msg.contains("maintenance"), "{msg}");
    }

    #[tokio::test]
    async fn from_config_orders_local_before_bridge() {
        let client = McpClient::from_config(&McpConfig::default()).unwrap();
        assert_eq!(
            client.transport_names(),
            vec!["local-service", "subprocess-bridge"]
        );
    }

    #[tokio::test]
    async fn from_config_without_local_server_uses_bridge_only() {
        let config = McpConfig {
            use_local_server: false,
            ..McpConfig::default()
        };
        let client = McpClient::from_config(&config).unwrap();
        assert_eq!(client.transport_names(), vec!["subprocess-bridge"]);
    }

    #[tokio::test]
    async fn empty_client_reports_no_transport() {
        let client = McpClient::new(vec![]);
        let err = client
            .execute("search_issues", serde_json::json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, McpError::NoTransport));
    }
}
