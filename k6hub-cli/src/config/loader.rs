use super::types::{
    DispatchSection, K6HubConfig, RawAuthConfig, RawDispatchConfig, RawK6HubConfig,
    RawServerConfig, RawStorageConfig, ServerSection, StorageSection,
};
use anyhow::{Context, Result};
use k6hub_core::AdminAuthConfig;
use std::path::{Path, PathBuf};

/// Overrides the project config directory (useful for isolated tests)
pub const PROJECT_CONFIG_ENV: &str = "K6HUB_PROJECT_CONFIG_DIR";

pub struct ConfigLoader;

impl ConfigLoader {
    /// Load merged configuration (user + project)
    pub fn load() -> Result<K6HubConfig> {
        Self::load_layers(&Self::user_config_path(), &Self::project_config_path())
    }

    /// Get user config path (`$XDG_CONFIG_HOME/k6hub/config.toml`)
    pub fn user_config_path() -> PathBuf {
        k6hub_paths::config_file()
    }

    /// Get project config path
    /// Can be overridden with K6HUB_PROJECT_CONFIG_DIR env var
    pub fn project_config_path() -> PathBuf {
        if let Ok(dir) = std::env::var(PROJECT_CONFIG_ENV) {
            PathBuf::from(dir).join("config.toml")
        } else {
            PathBuf::from(".k6hub/config.toml")
        }
    }

    /// Merge `user` then `project`; missing files are skipped
    fn load_layers(user: &Path, project: &Path) -> Result<K6HubConfig> {
        let mut raw = RawK6HubConfig::default();

        for path in [user, project] {
            if let Some(layer) = Self::read_raw(path)? {
                raw = Self::merge_raw(raw, layer);
            }
        }

        Ok(Self::finalize(raw))
    }

    fn read_raw(path: &Path) -> Result<Option<RawK6HubConfig>> {
        if !path.exists() {
            return Ok(None);
        }
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        let raw = toml::from_str(&contents)
            .with_context(|| format!("invalid config in {}", path.display()))?;
        Ok(Some(raw))
    }

    /// Merge two raw configs (overlay values override base only if explicitly set)
    fn merge_raw(base: RawK6HubConfig, overlay: RawK6HubConfig) -> RawK6HubConfig {
        RawK6HubConfig {
            server: RawServerConfig {
                host: overlay.server.host.or(base.server.host),
                port: overlay.server.port.or(base.server.port),
            },
            storage: RawStorageConfig {
                database: overlay.storage.database.or(base.storage.database),
            },
            dispatch: RawDispatchConfig {
                poll_batch_size: overlay
                    .dispatch
                    .poll_batch_size
                    .or(base.dispatch.poll_batch_size),
                heartbeat_timeout_secs: overlay
                    .dispatch
                    .heartbeat_timeout_secs
                    .or(base.dispatch.heartbeat_timeout_secs),
                sweep_interval_secs: overlay
                    .dispatch
                    .sweep_interval_secs
                    .or(base.dispatch.sweep_interval_secs),
                default_max_concurrent_tasks: overlay
                    .dispatch
                    .default_max_concurrent_tasks
                    .or(base.dispatch.default_max_concurrent_tasks),
                orphan_policy: overlay
                    .dispatch
                    .orphan_policy
                    .or(base.dispatch.orphan_policy),
                require_agent_token: overlay
                    .dispatch
                    .require_agent_token
                    .or(base.dispatch.require_agent_token),
            },
            auth: RawAuthConfig {
                jwt_secret: overlay.auth.jwt_secret.or(base.auth.jwt_secret),
                issuer: overlay.auth.issuer.or(base.auth.issuer),
                clock_skew_seconds: overlay
                    .auth
                    .clock_skew_seconds
                    .or(base.auth.clock_skew_seconds),
                token_ttl_secs: overlay.auth.token_ttl_secs.or(base.auth.token_ttl_secs),
            },
        }
    }

    /// Convert raw config to final config with defaults applied
    fn finalize(raw: RawK6HubConfig) -> K6HubConfig {
        let server = ServerSection::default();
        let dispatch = DispatchSection::default();
        let auth = AdminAuthConfig::default();

        K6HubConfig {
            server: ServerSection {
                host: raw.server.host.unwrap_or(server.host),
                port: raw.server.port.unwrap_or(server.port),
            },
            storage: StorageSection {
                database: raw
                    .storage
                    .database
                    .unwrap_or_else(k6hub_paths::default_database_path),
            },
            dispatch: DispatchSection {
                poll_batch_size: raw
                    .dispatch
                    .poll_batch_size
                    .unwrap_or(dispatch.poll_batch_size),
                heartbeat_timeout_secs: raw
                    .dispatch
                    .heartbeat_timeout_secs
                    .unwrap_or(dispatch.heartbeat_timeout_secs),
                sweep_interval_secs: raw
                    .dispatch
                    .sweep_interval_secs
                    .unwrap_or(dispatch.sweep_interval_secs),
                default_max_concurrent_tasks: raw
                    .dispatch
                    .default_max_concurrent_tasks
                    .unwrap_or(dispatch.default_max_concurrent_tasks),
                orphan_policy: raw.dispatch.orphan_policy.unwrap_or(dispatch.orphan_policy),
                require_agent_token: raw
                    .dispatch
                    .require_agent_token
                    .unwrap_or(dispatch.require_agent_token),
            },
            auth: AdminAuthConfig {
                jwt_secret: raw.auth.jwt_secret.unwrap_or(auth.jwt_secret),
                issuer: raw.auth.issuer.unwrap_or(auth.issuer),
                clock_skew_seconds: raw
                    .auth
                    .clock_skew_seconds
                    .unwrap_or(auth.clock_skew_seconds),
                token_ttl_secs: raw.auth.token_ttl_secs.unwrap_or(auth.token_ttl_secs),
            },
        }
    }
}
