//! TOML configuration for the vidshard daemon.
//!
//! Every section is optional; missing values fall back to defaults, and
//! command-line flags override whatever the file says.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use serde::Deserialize;
use vidshard_net::ClientConfig;
use vidshard_router::DEFAULT_MIGRATION_CONCURRENCY;

/// Top-level configuration, parsed from TOML.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct CliConfig {
    /// Storage node settings.
    pub storage: StorageSection,
    /// Router settings.
    pub router: RouterSection,
    /// RPC timeouts and connection pooling.
    pub net: NetSection,
    /// Migration tuning.
    pub migration: MigrationSection,
    /// Logging configuration.
    pub log: LogSection,
}

/// `[storage]` section.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct StorageSection {
    /// Host to bind.
    pub host: String,
    /// Port to bind.
    pub port: u16,
    /// Root directory for stored content.
    pub base_dir: Option<PathBuf>,
    /// Backend type: `"file"` (default) or `"memory"`.
    pub backend: String,
}

impl Default for StorageSection {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 8090,
            base_dir: None,
            backend: "file".to_string(),
        }
    }
}

/// `[router]` section.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct RouterSection {
    /// Address for the RPC listener (content + admin requests).
    pub listen_addr: String,
    /// Address for the HTTP content gateway. Disabled if unset.
    pub http_addr: Option<String>,
    /// Storage nodes registered at startup (`"host:port"`).
    pub nodes: Vec<String>,
}

impl Default for RouterSection {
    fn default() -> Self {
        Self {
            listen_addr: "localhost:8080".to_string(),
            http_addr: None,
            nodes: Vec::new(),
        }
    }
}

/// `[net]` section.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct NetSection {
    /// Upper bound on one RPC, in milliseconds.
    pub rpc_timeout_ms: Option<u64>,
    /// Upper bound on dialing a node, in milliseconds.
    pub connect_timeout_ms: Option<u64>,
    /// Idle connections kept per node.
    pub max_idle_per_node: Option<usize>,
    /// Upper bound on an admin add/remove call, in milliseconds. These
    /// calls answer only once the migration has finished.
    pub admin_timeout_ms: Option<u64>,
}

/// `[migration]` section.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct MigrationSection {
    /// Keys migrated in parallel during a join or leave.
    pub concurrency: Option<usize>,
}

/// `[log]` section.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct LogSection {
    /// Log level filter (e.g. `"info"`, `"debug"`, `"vidshard_router=debug"`).
    pub level: String,
}

impl Default for LogSection {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl CliConfig {
    /// Load config from a TOML file, or use defaults if no path is given.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        match path {
            Some(p) => {
                let content = std::fs::read_to_string(p)
                    .with_context(|| format!("failed to read {}", p.display()))?;
                Self::from_toml(&content).with_context(|| format!("invalid config {}", p.display()))
            }
            None => Ok(Self::default()),
        }
    }

    /// Parse config from a TOML string.
    pub fn from_toml(s: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(s)?)
    }

    /// Effective RPC timeout (config value or 10 s).
    pub fn rpc_timeout(&self) -> Duration {
        Duration::from_millis(self.net.rpc_timeout_ms.unwrap_or(10_000))
    }

    /// Effective dial timeout (config value or 3 s).
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.net.connect_timeout_ms.unwrap_or(3_000))
    }

    /// Effective admin membership call timeout (config value or 1 h).
    pub fn admin_timeout(&self) -> Duration {
        Duration::from_millis(self.net.admin_timeout_ms.unwrap_or(3_600_000))
    }

    /// Effective idle pool size per node (config value or 4).
    pub fn max_idle_per_node(&self) -> usize {
        self.net.max_idle_per_node.unwrap_or(4)
    }

    /// Effective migration parallelism (config value or 8, at least 1).
    pub fn migration_concurrency(&self) -> usize {
        self.migration
            .concurrency
            .unwrap_or(DEFAULT_MIGRATION_CONCURRENCY)
            .max(1)
    }

    /// RPC client settings derived from the `[net]` section.
    pub fn client_config(&self) -> ClientConfig {
        ClientConfig {
            connect_timeout: self.connect_timeout(),
            rpc_timeout: self.rpc_timeout(),
            max_idle: self.max_idle_per_node(),
        }
    }

    /// RPC client settings for `vidshardd admin`: the `[net]` settings with
    /// the admin timeout in place of the RPC timeout.
    pub fn admin_client_config(&self) -> ClientConfig {
        ClientConfig {
            rpc_timeout: self.admin_timeout(),
            ..self.client_config()
        }
    }

    /// The storage node's bind address.
    pub fn storage_addr(&self) -> String {
        format!("{}:{}", self.storage.host, self.storage.port)
    }
}
