//! Shared application state for the k6hub server

use std::sync::Arc;

use chrono::{DateTime, Utc};
use k6hub_core::{
    AdminAuthConfig, DispatchConfig, DispatchService, SqliteFleetStore, StoreError, TokenValidator,
};

/// Secret used by [`AppState::new_for_testing`]
pub const TEST_JWT_SECRET: &str = "test-secret";

/// Shared application state accessible by all handlers
#[derive(Clone)]
pub struct AppState {
    /// Registry, dispatcher, reconciler and fleet admin
    pub dispatch: Arc<DispatchService>,
    /// Admin bearer-token validator
    pub validator: Arc<TokenValidator>,
    /// When the server started
    pub started_at: DateTime<Utc>,
}

impl AppState {
    pub fn new(dispatch: Arc<DispatchService>, validator: Arc<TokenValidator>) -> Self {
        Self {
            dispatch,
            validator,
            started_at: Utc::now(),
        }
    }

    /// Open (or create) the database at `path` and wire up the service
    pub fn open(
        path: &std::path::Path,
        dispatch: DispatchConfig,
        auth: AdminAuthConfig,
    ) -> Result<Self, StoreError> {
        let store = if path.as_os_str() == ":memory:" {
            SqliteFleetStore::open_in_memory()?
        } else {
            SqliteFleetStore::open(path)?
        };
        Ok(Self::new(
            Arc::new(DispatchService::new(Arc::new(store), dispatch)),
            Arc::new(TokenValidator::new(auth)),
        ))
    }

    /// In-memory state with [`TEST_JWT_SECRET`] as the admin secret
    pub fn new_for_testing() -> Self {
        Self::new_for_testing_with(DispatchConfig::default())
    }

    pub fn new_for_testing_with(config: DispatchConfig) -> Self {
        let store = SqliteFleetStore::open_in_memory().expect("open in-memory store");
        Self::new(
            Arc::new(DispatchService::new(Arc::new(store), config)),
            Arc::new(TokenValidator::new(AdminAuthConfig::with_secret(
                TEST_JWT_SECRET,
            ))),
        )
    }

    /// Returns how long the server has been running
    pub fn uptime_seconds(&self) -> i64 {
        (Utc::now() - self.started_at).num_seconds()
    }
}
