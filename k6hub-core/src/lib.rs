//! k6hub-core: agent registry and load-test task dispatch
//!
//! Remote k6 agents pull work from the hub. This crate holds everything
//! behind the HTTP surface:
//!
//! - **Registry** - agents register by hostname, heartbeat, and are started or stopped by operators
//! - **Dispatch** - [`DispatchService::poll`] leases pending tasks within each agent's capacity
//! - **Reconciliation** - agents report task outcomes, idempotently
//! - **Liveness** - [`LivenessSweeper`] takes silent agents offline and reclaims their work
//! - **Storage** - [`SqliteFleetStore`] keeps leases and load counters transactionally consistent
//! - **Admin auth** - [`TokenValidator`] turns bearer JWTs into an [`Operator`]
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use k6hub_core::{AgentDescriptor, DispatchConfig, DispatchService, SqliteFleetStore};
//!
//! fn example() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = SqliteFleetStore::open_in_memory()?;
//!     let service = DispatchService::new(Arc::new(store), DispatchConfig::default());
//!
//!     let registration = service.register(
//!         AgentDescriptor { hostname: "load-01".into(), ..Default::default() },
//!         None,
//!     )?;
//!     let batch = service.poll(&registration.agent.id.to_string(), None)?;
//!     println!("leased {} tasks", batch.jobs.len());
//!     Ok(())
//! }
//! ```

pub mod agent;
pub mod auth;
pub mod dispatch;
pub mod error;
pub mod ids;
pub mod page;
pub mod script;
pub mod store;
pub mod task;

// Re-export key types for convenience
pub use agent::{
    Agent, AgentCapabilities, AgentDescriptor, AgentQuery, AgentStatistics, AgentStatus,
    AgentUpdate, BatchOutcome, HeartbeatReport, NewAgent, Registration,
};
pub use auth::{AdminAuthConfig, AuthError, Operator, Role, TokenValidator};
pub use dispatch::{DispatchConfig, DispatchService, LivenessSweeper, OrphanPolicy};
pub use error::DispatchError;
pub use ids::{AgentId, ScriptId, TaskId};
pub use page::{Page, PageRequest};
pub use script::{NewScript, Script};
pub use store::{FleetStore, ReclaimReport, SqliteFleetStore, StoreError};
pub use task::{
    Ack, JobPayload, NewTask, PollResponse, StatusReport, Task, TaskConfig, TaskQuery,
    TaskStatistics, TaskStatus, TaskUpdate, TriggerType,
};

/// Result type for dispatch operations
pub type Result<T> = std::result::Result<T, DispatchError>;
