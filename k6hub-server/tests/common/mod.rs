//! Shared test utilities for k6hub-server integration tests

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use k6hub_core::{DispatchConfig, Role};
use k6hub_server::{AppState, K6HubServer, ServerConfig};
use tokio::net::TcpListener;

/// Creates a test server with default dispatch config, returns state and address
#[allow(dead_code)]
pub async fn create_test_server() -> (Arc<AppState>, SocketAddr) {
    create_test_server_with_config(DispatchConfig::default()).await
}

/// Creates a test server with custom dispatch config
#[allow(dead_code)]
pub async fn create_test_server_with_config(config: DispatchConfig) -> (Arc<AppState>, SocketAddr) {
    let state = Arc::new(AppState::new_for_testing_with(config));
    let server = K6HubServer::with_state(ServerConfig::default(), Arc::clone(&state));
    let addr = spawn_server(server).await;
    (state, addr)
}

/// Admin `Authorization` header value signed with the test secret
#[allow(dead_code)]
pub fn admin_auth(state: &AppState) -> String {
    let token = state
        .validator
        .mint("root", Role::Admin, Duration::from_secs(600), Utc::now())
        .unwrap();
    format!("Bearer {token}")
}

/// Base URL for the versioned API of a spawned server
#[allow(dead_code)]
pub fn api(addr: SocketAddr, path: &str) -> String {
    format!("http://{addr}/api/v1{path}")
}

/// Spawns server in background task, returns bound address
async fn spawn_server(server: K6HubServer) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        let _ = server.run_with_listener(listener).await;
    });

    // Brief delay to ensure server is accepting connections
    tokio::time::sleep(Duration::from_millis(10)).await;

    addr
}
