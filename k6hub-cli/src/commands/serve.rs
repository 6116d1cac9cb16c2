//! k6hub serve command
//!
//! Opens the fleet database, then serves the agent protocol and the admin
//! API until Ctrl-C. The liveness sweeper runs for as long as the server does.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Args;
use k6hub_server::{AppState, K6HubServer, ServerConfig};
use tracing::{info, warn};

use crate::config::{ConfigLoader, K6HubConfig, MEMORY_DATABASE};

/// Arguments for the serve command
#[derive(Debug, Args)]
pub struct ServeArgs {
    /// Host to bind to (overrides `server.host`)
    #[arg(long)]
    pub host: Option<String>,

    /// Port to listen on (overrides `server.port`)
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Database file, or `:memory:` (overrides `storage.database`)
    #[arg(long)]
    pub database: Option<PathBuf>,
}

impl ServeArgs {
    /// Apply command-line flags on top of the loaded file config
    fn apply(&self, config: &mut K6HubConfig) {
        if let Some(host) = &self.host {
            config.server.host = host.clone();
        }
        if let Some(port) = self.port {
            config.server.port = port;
        }
        if let Some(database) = &self.database {
            config.storage.database = database.clone();
        }
    }
}

/// Run the serve command
pub async fn run(args: ServeArgs) -> Result<()> {
    let mut config = ConfigLoader::load()?;
    args.apply(&mut config);

    if !config.auth.is_configured() {
        warn!("auth.jwt_secret is not set; every admin request will be rejected");
    }

    prepare_database_dir(&config.storage.database)?;
    let state = AppState::open(
        &config.storage.database,
        config.dispatch_config(),
        config.auth.clone(),
    )
    .with_context(|| {
        format!(
            "failed to open database {}",
            config.storage.database.display()
        )
    })?;

    info!(
        "Starting k6hub on {}:{} (database {})",
        config.server.host,
        config.server.port,
        config.storage.database.display()
    );

    let server = K6HubServer::with_state(
        ServerConfig::new(config.server.host, config.server.port),
        Arc::new(state),
    );
    server.run_until(shutdown_signal()).await?;
    Ok(())
}

fn prepare_database_dir(database: &Path) -> Result<()> {
    if database.as_os_str() == MEMORY_DATABASE {
        return Ok(());
    }
    if let Some(parent) = database.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for Ctrl-C: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Received Ctrl-C");
}
