use std::path::PathBuf;
use std::time::Duration;

use k6hub_core::{AdminAuthConfig, DispatchConfig, OrphanPolicy};
use serde::{Deserialize, Serialize};

/// Default host for the k6hub server
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// Default port for the k6hub server
pub const DEFAULT_PORT: u16 = 7480;

/// `storage.database` value that keeps everything in memory
pub const MEMORY_DATABASE: &str = ":memory:";

/// Configuration as stored in TOML files (with optional fields for merging)
#[derive(Debug, Clone, Deserialize, Default)]
pub struct RawK6HubConfig {
    #[serde(default)]
    pub server: RawServerConfig,

    #[serde(default)]
    pub storage: RawStorageConfig,

    #[serde(default)]
    pub dispatch: RawDispatchConfig,

    #[serde(default)]
    pub auth: RawAuthConfig,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct RawServerConfig {
    pub host: Option<String>,
    pub port: Option<u16>,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct RawStorageConfig {
    pub database: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct RawDispatchConfig {
    pub poll_batch_size: Option<u32>,
    pub heartbeat_timeout_secs: Option<u64>,
    pub sweep_interval_secs: Option<u64>,
    pub default_max_concurrent_tasks: Option<u32>,
    pub orphan_policy: Option<OrphanPolicy>,
    pub require_agent_token: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct RawAuthConfig {
    pub jwt_secret: Option<String>,
    pub issuer: Option<String>,
    pub clock_skew_seconds: Option<u64>,
    pub token_ttl_secs: Option<u64>,
}

/// Final configuration with defaults applied
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct K6HubConfig {
    #[serde(default)]
    pub server: ServerSection,

    #[serde(default)]
    pub storage: StorageSection,

    #[serde(default)]
    pub dispatch: DispatchSection,

    #[serde(default)]
    pub auth: AdminAuthConfig,
}

impl K6HubConfig {
    /// Tuning for the dispatch service and sweeper
    pub fn dispatch_config(&self) -> DispatchConfig {
        let d = &self.dispatch;
        DispatchConfig::default()
            .with_poll_batch_size(d.poll_batch_size)
            .with_heartbeat_timeout(Duration::from_secs(d.heartbeat_timeout_secs))
            .with_sweep_interval(Duration::from_secs(d.sweep_interval_secs))
            .with_default_max_concurrent_tasks(d.default_max_concurrent_tasks)
            .with_orphan_policy(d.orphan_policy)
            .with_agent_tokens(d.require_agent_token)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSection {
    /// Host address to bind to
    pub host: String,

    /// Port for the k6hub server
    pub port: u16,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageSection {
    /// SQLite database file, or `:memory:`
    pub database: PathBuf,
}

impl Default for StorageSection {
    fn default() -> Self {
        Self {
            database: k6hub_paths::default_database_path(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchSection {
    pub poll_batch_size: u32,
    pub heartbeat_timeout_secs: u64,
    pub sweep_interval_secs: u64,
    pub default_max_concurrent_tasks: u32,
    pub orphan_policy: OrphanPolicy,
    pub require_agent_token: bool,
}

impl Default for DispatchSection {
    fn default() -> Self {
        let defaults = DispatchConfig::default();
        Self {
            poll_batch_size: defaults.poll_batch_size,
            heartbeat_timeout_secs: defaults.heartbeat_timeout.as_secs(),
            sweep_interval_secs: defaults.sweep_interval.as_secs(),
            default_max_concurrent_tasks: defaults.default_max_concurrent_tasks,
            orphan_policy: defaults.orphan_policy,
            require_agent_token: defaults.require_agent_token,
        }
    }
}
