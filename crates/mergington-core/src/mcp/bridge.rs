//! Subprocess transport: runs the containerized MCP server over stdio.
//!
//! Each request spawns a fresh process, writes the whole request to its
//! stdin, closes stdin, then reads stdout and stderr to EOF while waiting for
//! exit. The child is spawned with `kill_on_drop`, so it is terminated on
//! every early return, including a dropped request future.

use std::process::Stdio;
use std::time::Duration;

use serde_json::Value;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::Command;
use tracing::{debug, warn};

use super::{McpError, McpRequest};

/// Environment variable carrying the GitHub token for the MCP server.
pub const DEFAULT_CREDENTIAL_ENV: &str = "GITHUB_PERSONAL_ACCESS_TOKEN";

/// Container image of the GitHub MCP server.
pub const DEFAULT_IMAGE: &str = "ghcr.io/github/github-mcp-server:v0.1.1";

/// How to launch the MCP server process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BridgeConfig {
    /// Program to run (e.g. "docker").
    pub command: String,
    /// Arguments passed to `command`.
    pub args: Vec<String>,
    /// Name of the environment variable forwarded to the child as the
    /// credential. Only the name is stored here, never the value.
    pub credential_env: Option<String>,
    /// Upper bound on one request/response exchange.
    pub timeout: Duration,
}

impl BridgeConfig {
    pub const DEFAULT_TIMEOUT_SECS: u64 = 120;

    /// `docker run -i --rm -e <credential_env> <image>`.
    pub fn docker(image: &str, credential_env: &str) -> Self {
        Self {
            command: "docker".to_string(),
            args: ["run", "-i", "--rm", "-e", credential_env, image]
                .into_iter()
                .map(String::from)
                .collect(),
            credential_env: Some(credential_env.to_string()),
            timeout: Duration::from_secs(Self::DEFAULT_TIMEOUT_SECS),
        }
    }
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self::docker(DEFAULT_IMAGE, DEFAULT_CREDENTIAL_ENV)
    }
}

/// Exchanges one JSON document with a freshly spawned process.
#[derive(Debug, Clone)]
pub struct SubprocessBridge {
    config: BridgeConfig,
}

impl SubprocessBridge {
    pub fn new(config: BridgeConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    /// Run the process once for `request`.
    ///
    /// A non-zero exit becomes [`McpError::Process`] carrying stderr. A zero
    /// exit with stdout that is not JSON becomes [`McpError::Decode`].
    pub async fn request(&self, request: &McpRequest) -> Result<Value, McpError> {
        let payload = serde_json::to_vec(request)?;

        let mut cmd = Command::new(&self.config.command);
        cmd.args(&self.config.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        if let Some(name) = &self.config.credential_env {
            match std::env::var(name) {
                Ok(value) => {
                    cmd.env(name, value);
                }
                Err(_) => {
                    warn!(credential_env = %name, "credential not set; MCP bridge may reject requests");
                }
            }
        }

        let mut child = cmd.spawn().map_err(|source| McpError::Spawn {
            command: self.config.command.clone(),
            source,
        })?;
        debug!(command = %self.config.command, pid = child.id(), "spawned MCP bridge");

        let stdin_pipe = child.stdin.take();
        let stdout_pipe = child.stdout.take();
        let stderr_pipe = child.stderr.take();

        let write_stdin = async move {
            let Some(mut pipe) = stdin_pipe else {
                return Ok(());
            };
            pipe.write_all(&payload).await?;
            pipe.shutdown().await
            // `pipe` drops here, closing the child's stdin.
        };

        // Read both pipes while waiting so a chatty child cannot fill a pipe
        // buffer and stall.
        let exchange = async {
            tokio::join!(
                write_stdin,
                child.wait(),
                read_pipe(stdout_pipe),
                read_pipe(stderr_pipe)
            )
        };

        match tokio::time::timeout(self.config.timeout, exchange).await {
            Ok((written, Ok(status), stdout, stderr)) => {
                if let Err(e) = written {
                    // A child that exits without reading stdin closes the pipe;
                    // its exit status is the more useful error.
                    if e.kind() != std::io::ErrorKind::BrokenPipe {
                        return Err(McpError::Io(e));
                    }
                    debug!(error = %e, "MCP bridge closed stdin early");
                }

                let stdout = stdout?;
                let stderr = String::from_utf8_lossy(&stderr?).into_owned();

                if !status.success() {
                    return Err(McpError::Process {
                        code: status.code(),
                        stderr,
                    });
                }

                Ok(serde_json::from_slice(&stdout)?)
            }
            Ok((_, Err(e), _, _)) => Err(McpError::Io(e)),
            Err(_) => {
                let _ = child.kill().await;
                Err(McpError::Timeout(self.config.timeout))
            }
        }
    }
}

async fn read_pipe<R>(pipe: Option<R>) -> std::io::Result<Vec<u8>>
where
    R: AsyncRead + Unpin,
{
    let mut buf = Vec::new();
    if let Some(mut pipe) = pipe {
        pipe.read_to_end(&mut buf).await?;
    }
    Ok(buf)
}
