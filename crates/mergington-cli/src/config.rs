//! Configuration file management for mergington.
//!
//! Provides a TOML-based config file at `~/.config/mergington/config.toml`
//! and a resolution chain: CLI flag > env var > config file > default.
//! Every field in the file is optional.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use mergington_core::mcp::{BridgeConfig, McpConfig, bridge};
use mergington_core::registry::CapacityPolicy;

// -----------------------------------------------------------------------
// Config file types
// -----------------------------------------------------------------------

#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfigFile {
    pub server: ServerSection,
    pub registry: RegistrySection,
    pub mcp: McpSection,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSection {
    pub bind: String,
    pub port: u16,
    /// Directory served under `/static`.
    pub static_dir: PathBuf,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1".to_string(),
            port: 8000,
            static_dir: PathBuf::from("static"),
        }
    }
}

#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistrySection {
    /// Reject signups once `max_participants` is reached.
    pub enforce_capacity: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct McpSection {
    pub use_local_server: bool,
    pub local_url: String,
    /// Seconds to wait for the local endpoint to accept a connection before
    /// falling back to the bridge.
    pub connect_timeout_secs: u64,
    pub timeout_secs: u64,
    pub bridge_command: String,
    pub bridge_args: Vec<String>,
    pub bridge_timeout_secs: u64,
    /// Name of the env var holding the GitHub token (the value is never stored).
    pub credential_env: String,
}

impl Default for McpSection {
    fn default() -> Self {
        let bridge = BridgeConfig::default();
        Self {
            use_local_server: true,
            local_url: McpConfig::DEFAULT_LOCAL_URL.to_string(),
            connect_timeout_secs: McpConfig::DEFAULT_CONNECT_TIMEOUT_SECS,
            timeout_secs: McpConfig::DEFAULT_TIMEOUT_SECS,
            bridge_command: bridge.command,
            bridge_args: bridge.args,
            bridge_timeout_secs: BridgeConfig::DEFAULT_TIMEOUT_SECS,
            credential_env: bridge::DEFAULT_CREDENTIAL_ENV.to_string(),
        }
    }
}

impl McpSection {
    fn to_mcp_config(&self) -> McpConfig {
        let credential_env = Some(self.credential_env.clone()).filter(|name| !name.is_empty());
        McpConfig {
            use_local_server: self.use_local_server,
            local_url: self.local_url.clone(),
            connect_timeout: Duration::from_secs(self.connect_timeout_secs.max(1)),
            timeout: Duration::from_secs(self.timeout_secs.max(1)),
            bridge: BridgeConfig {
                command: self.bridge_command.clone(),
                args: self.bridge_args.clone(),
                credential_env,
                timeout: Duration::from_secs(self.bridge_timeout_secs.max(1)),
            },
        }
    }
}

// -----------------------------------------------------------------------
// Paths
// -----------------------------------------------------------------------

/// Return the mergington config directory.
///
/// Always uses XDG layout: `$XDG_CONFIG_HOME/mergington` or
/// `~/.config/mergington`.
pub fn config_dir() -> PathBuf {
    if let Ok(xdg) = std::env::var("XDG_CONFIG_HOME") {
        return PathBuf::from(xdg).join("mergington");
    }
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".config")
        .join("mergington")
}

/// Return the default path to the config file.
pub fn config_path() -> PathBuf {
    config_dir().join("config.toml")
}

// -----------------------------------------------------------------------
// Read / write
// -----------------------------------------------------------------------

/// Load and parse the config file at `path`.
pub fn load_config(path: &Path) -> Result<ConfigFile> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config file at {}", path.display()))?;
    let config: ConfigFile = toml::from_str(&contents)
        .with_context(|| format!("failed to parse config file at {}", path.display()))?;
    Ok(config)
}

/// Serialize and write the config file, creating parent dirs as needed.
/// Sets file permissions to 0600 on Unix.
pub fn save_config(path: &Path, config: &ConfigFile) -> Result<()> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("failed to create config directory {}", dir.display()))?;
    }

    let contents = toml::to_string_pretty(config).context("failed to serialize config")?;
    std::fs::write(path, &contents)
        .with_context(|| format!("failed to write config file at {}", path.display()))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = std::fs::Permissions::from_mode(0o600);
        std::fs::set_permissions(path, perms)
            .with_context(|| format!("failed to set permissions on {}", path.display()))?;
    }

    Ok(())
}

// -----------------------------------------------------------------------
// Resolved config
// -----------------------------------------------------------------------

/// Values given on the command line; `None` means "not given".
#[derive(Debug, Default, Clone)]
pub struct CliOverrides {
    pub bind: Option<String>,
    pub port: Option<u16>,
    pub static_dir: Option<PathBuf>,
}

/// Fully resolved configuration, ready for use.
#[derive(Debug, Clone)]
pub struct MergingtonConfig {
    pub bind: String,
    pub port: u16,
    pub static_dir: PathBuf,
    pub capacity_policy: CapacityPolicy,
    pub mcp: McpConfig,
}

impl MergingtonConfig {
    /// Resolve configuration using the chain: CLI flag > env var > config file > default.
    ///
    /// - Bind: `--bind` > `MERGINGTON_BIND` > `server.bind` > `127.0.0.1`
    /// - Port: `--port` > `MERGINGTON_PORT` > `server.port` > `8000`
    /// - Static dir: `--static-dir` > `MERGINGTON_STATIC_DIR` > `server.static_dir` > `static`
    /// - MCP URL: `MERGINGTON_MCP_URL` > `mcp.local_url` > `http://localhost:8912/github`
    ///
    /// `config_file` defaults to [`config_path`]. A missing file means
    /// defaults; a file that exists but does not parse is an error.
    pub fn resolve(cli: &CliOverrides, config_file: Option<&Path>) -> Result<Self> {
        let path = config_file.map(Path::to_path_buf).unwrap_or_else(config_path);
        let file_config = if path.exists() {
            load_config(&path)?
        } else {
            ConfigFile::default()
        };

        let bind = if let Some(bind) = &cli.bind {
            bind.clone()
        } else if let Ok(bind) = std::env::var("MERGINGTON_BIND") {
            bind
        } else {
            file_config.server.bind.clone()
        };

        let port = if let Some(port) = cli.port {
            port
        } else if let Ok(raw) = std::env::var("MERGINGTON_PORT") {
            raw.parse()
                .with_context(|| format!("MERGINGTON_PORT is not a valid port: {raw:?}"))?
        } else {
            file_config.server.port
        };

        let static_dir = if let Some(dir) = &cli.static_dir {
            dir.clone()
        } else if let Ok(dir) = std::env::var("MERGINGTON_STATIC_DIR") {
            PathBuf::from(dir)
        } else {
            file_config.server.static_dir.clone()
        };

        let mut mcp = file_config.mcp.to_mcp_config();
        if let Ok(url) = std::env::var("MERGINGTON_MCP_URL") {
            mcp.local_url = url;
        }

        let capacity_policy = if file_config.registry.enforce_capacity {
            CapacityPolicy::Enforce
        } else {
            CapacityPolicy::Advisory
        };

        Ok(Self {
            bind,
            port,
            static_dir,
            capacity_policy,
            mcp,
        })
    }
}

// -----------------------------------------------------------------------
// Tests
// -----------------------------------------------------------------------
