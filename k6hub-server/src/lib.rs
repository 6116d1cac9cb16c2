//! k6hub-server - HTTP server for the k6hub daemon
//!
//! This crate serves the agent protocol (register, heartbeat, poll, status)
//! and the bearer-authenticated admin API over one [`AppState`], and runs the
//! liveness sweeper alongside the listener.

mod error;
pub mod http;
pub mod middleware;
mod state;

use std::future::Future;
use std::sync::Arc;

use k6hub_core::LivenessSweeper;
use tokio::net::TcpListener;

pub use error::{ApiError, ErrorResponse, ServerError};
pub use http::create_router;
pub use middleware::{agent_credential, require_operator};
pub use state::{AppState, TEST_JWT_SECRET};

/// The main k6hub server
pub struct K6HubServer {
    config: ServerConfig,
    state: Arc<AppState>,
}

impl K6HubServer {
    /// Create a server over prepared state
    pub fn with_state(config: ServerConfig, state: Arc<AppState>) -> Self {
        Self { config, state }
    }

    /// Get the server configuration
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Get the shared application state
    pub fn state(&self) -> Arc<AppState> {
        Arc::clone(&self.state)
    }

    /// Run the server, binding to the configured address
    pub async fn run(self) -> Result<(), ServerError> {
        self.run_until(std::future::pending()).await
    }

    /// Run until `shutdown` resolves, then drain connections and stop the sweeper
    pub async fn run_until<F>(self, shutdown: F) -> Result<(), ServerError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let addr = self.config.addr();
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|e| ServerError::Bind {
                addr: addr.clone(),
                source: e,
            })?;

        tracing::info!("k6hub server listening on {}", addr);
        self.serve(listener, shutdown).await
    }

    /// Run the server on an already-bound listener
    pub async fn run_with_listener(self, listener: TcpListener) -> Result<(), ServerError> {
        self.serve(listener, std::future::pending()).await
    }

    async fn serve<F>(self, listener: TcpListener, shutdown: F) -> Result<(), ServerError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let mut sweeper = LivenessSweeper::new(Arc::clone(&self.state.dispatch));
        sweeper.spawn();

        let router = create_router(self.state);
        let result = axum::serve(listener, router)
            .with_graceful_shutdown(shutdown)
            .await
            .map_err(|e| ServerError::Internal(e.to_string()));

        tracing::info!("Shutting down");
        sweeper.shutdown();
        sweeper.wait_for_shutdown().await;

        result
    }
}

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Host address to bind to
    pub host: String,
    /// Port to listen on
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 7480,
        }
    }
}

impl ServerConfig {
    /// Create a new ServerConfig with the specified host and port
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// Returns the socket address string (e.g., "127.0.0.1:7480")
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
