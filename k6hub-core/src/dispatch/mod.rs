//! The agent task-distribution loop
//!
//! ```text
//! register ──► heartbeat ──► poll (lease) ──► status report (reconcile)
//!                  ▲
//!                  └── liveness sweeper (timer): stale ⇒ offline, orphans reclaimed
//! ```
//!
//! [`DispatchService`] owns the protocol rules; all state lives in a
//! [`FleetStore`], which makes every lease and counter change atomic.

mod config;
mod dispatcher;
mod fleet;
mod reconciler;
mod registry;
mod sweeper;

#[cfg(test)]
pub(crate) mod testing;

use std::sync::Arc;

pub use config::{DispatchConfig, OrphanPolicy};
pub use sweeper::LivenessSweeper;

use crate::error::DispatchError;
use crate::ids::{AgentId, TaskId};
use crate::store::FleetStore;

/// Registry, dispatcher, reconciler and sweeper over one store
pub struct DispatchService {
    store: Arc<dyn FleetStore>,
    config: DispatchConfig,
}

impl DispatchService {
    pub fn new(store: Arc<dyn FleetStore>, config: DispatchConfig) -> Self {
        Self { store, config }
    }

    pub fn config(&self) -> &DispatchConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn FleetStore> {
        &self.store
    }
}

/// Unknown and malformed agent ids are both "not found"
pub(crate) fn parse_agent_id(raw: &str) -> Result<AgentId, DispatchError> {
    raw.parse()
        .map_err(|_| DispatchError::AgentNotFound(raw.trim().to_string()))
}

pub(crate) fn parse_task_id(raw: &str) -> Result<TaskId, DispatchError> {
    raw.parse()
        .map_err(|_| DispatchError::TaskNotFound(raw.trim().to_string()))
}
