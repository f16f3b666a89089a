//! HTTP transport to a locally running MCP server.

use std::time::Duration;

use reqwest::{Client, StatusCode};
use serde_json::Value;
use tracing::debug;

use super::{McpError, McpRequest};

/// Posts MCP requests to a fixed local URL.
#[derive(Debug, Clone)]
pub struct LocalService {
    client: Client,
    url: String,
}

impl LocalService {
    /// Connect-phase limit used by [`LocalService::new`].
    pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

    /// Build a transport for `url` with a per-request `timeout`. Connecting
    /// is capped at [`Self::DEFAULT_CONNECT_TIMEOUT`] or `timeout`, whichever
    /// is shorter.
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, McpError> {
        Self::with_timeouts(url, Self::DEFAULT_CONNECT_TIMEOUT.min(timeout), timeout)
    }

    /// Build a transport with separate connect and whole-request limits.
    ///
    /// A connect that does not complete within `connect_timeout` is reported
    /// as [`McpError::Connect`] and so falls back to the next transport. Keep
    /// it shorter than `timeout`, or the request deadline may fire first and
    /// surface as [`McpError::Http`].
    pub fn with_timeouts(
        url: impl Into<String>,
        connect_timeout: Duration,
        timeout: Duration,
    ) -> Result<Self, McpError> {
        let client = Client::builder()
            .connect_timeout(connect_timeout)
            .timeout(timeout)
            .user_agent(format!("mergington/{}", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// POST `request` as JSON. A 200 response body is decoded and returned;
    /// any other status becomes [`McpError::Upstream`].
    pub async fn request(&self, request: &McpRequest) -> Result<Value, McpError> {
        let response = self
            .client
            .post(&self.url)
            .json(request)
            .send()
            .await
            .map_err(|e| {
                // Connect-phase timeouts report is_connect() as well.
                if e.is_connect() {
                    McpError::Connect {
                        url: self.url.clone(),
                        source: e,
                    }
                } else {
                    McpError::Http(e)
                }
            })?;

        let status = response.status();
        debug!(url = %self.url, %status, "local MCP server responded");

        if status != StatusCode::OK {
            let body = response
                .text()
                .await
                .unwrap_or_else(|e| format!("<unreadable body: {e}>"));
            return Err(McpError::Upstream {
                status: status.as_u16(),
                body,
            });
        }

        let bytes = response.bytes().await?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}
