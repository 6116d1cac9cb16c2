//! Fleet persistence: agents, scripts and tasks in SQLite
//!
//! Every operation that touches more than one row runs inside a single
//! `IMMEDIATE` transaction, so task state and the owning agent's load
//! counter always change together.

mod codec;
mod error;
mod migrations;
mod sqlite;

use chrono::{DateTime, Utc};
use serde_json::Value;

pub use error::StoreError;
pub use migrations::Migrator;
pub use sqlite::SqliteFleetStore;

use crate::agent::{Agent, AgentProfile, AgentQuery, AgentStatistics, AgentStatus, AgentUpdate};
use crate::dispatch::OrphanPolicy;
use crate::ids::{AgentId, ScriptId, TaskId};
use crate::page::Page;
use crate::script::Script;
use crate::task::{
    JobPayload, ReportedStatus, Task, TaskQuery, TaskStatistics, TaskStatus, TaskUpdate, Visibility,
};

/// How re-registration of a known hostname is guarded
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenCheck<'a> {
    /// Any caller may overwrite the existing record
    Open,
    /// The caller must present the hostname's current token
    Require(Option<&'a str>),
}

#[derive(Debug, Clone)]
pub enum RegisterOutcome {
    Created(Agent),
    Updated(Agent),
    /// Hostname is held by an agent whose token was not presented
    Rejected,
}

#[derive(Debug, Clone)]
pub enum Transition {
    NotFound,
    /// Agent was already in the requested status
    Unchanged(AgentStatus),
    Changed(Agent),
}

/// Why a poll degraded to an empty batch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollSkip {
    Disabled,
    NotOnline,
    AtCapacity,
}

#[derive(Debug, Clone)]
pub enum ClaimOutcome {
    AgentNotFound,
    Skipped(PollSkip),
    Claimed { jobs: Vec<JobPayload>, has_more: bool },
}

#[derive(Debug, Clone)]
pub enum ReportOutcome {
    TaskNotFound,
    /// The reporter is not the agent bound to the task
    NotBound,
    /// Task is pending; nothing has been leased yet
    NotLeased(TaskStatus),
    /// Task was already terminal; nothing changed
    Unchanged(Task),
    Applied(Task),
}

#[derive(Debug, Clone)]
pub enum EditOutcome {
    NotFound,
    /// Only pending tasks may be edited
    NotPending(TaskStatus),
    Updated(Task),
}

#[derive(Debug, Clone)]
pub enum CancelOutcome {
    NotFound,
    AlreadyFinished(TaskStatus),
    Cancelled(Task),
}

/// What happened to the tasks of agents that went stale or were removed
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReclaimReport {
    pub agents: Vec<AgentId>,
    pub failed_tasks: u64,
    pub requeued_tasks: u64,
    pub unpinned_tasks: u64,
}

/// Storage for the agent fleet and its work queue
pub trait FleetStore: Send + Sync {
    fn register_agent(
        &self,
        profile: &AgentProfile,
        token: &str,
        check: TokenCheck<'_>,
        now: DateTime<Utc>,
    ) -> Result<RegisterOutcome, StoreError>;
    fn get_agent(&self, id: AgentId) -> Result<Option<Agent>, StoreError>;
    fn agent_token(&self, id: AgentId) -> Result<Option<String>, StoreError>;
    /// Returns false when the agent does not exist
    fn record_heartbeat(
        &self,
        id: AgentId,
        resources: Option<&Value>,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError>;
    fn transition_agent(
        &self,
        id: AgentId,
        to: AgentStatus,
        now: DateTime<Utc>,
    ) -> Result<Transition, StoreError>;
    /// Mark every agent silent since before `cutoff` offline and reclaim its
    /// RUNNING tasks. Already-offline agents are only revisited while they
    /// still hold leases and the policy reclaims them.
    fn sweep_stale_agents(
        &self,
        cutoff: DateTime<Utc>,
        policy: OrphanPolicy,
        now: DateTime<Utc>,
    ) -> Result<ReclaimReport, StoreError>;

    fn insert_agent(&self, agent: &Agent) -> Result<(), StoreError>;
    fn update_agent(
        &self,
        id: AgentId,
        update: &AgentUpdate,
        now: DateTime<Utc>,
    ) -> Result<Option<Agent>, StoreError>;
    fn delete_agent(
        &self,
        id: AgentId,
        policy: OrphanPolicy,
        now: DateTime<Utc>,
    ) -> Result<Option<ReclaimReport>, StoreError>;
    fn list_agents(&self, query: &AgentQuery) -> Result<Page<Agent>, StoreError>;
    fn agent_statistics(&self) -> Result<AgentStatistics, StoreError>;
    /// RUNNING and pinned PENDING tasks of one agent
    fn tasks_for_agent(&self, id: AgentId) -> Result<Vec<Task>, StoreError>;

    /// Lease up to `batch` eligible tasks to the agent
    fn claim_tasks(
        &self,
        agent: AgentId,
        batch: u32,
        now: DateTime<Utc>,
    ) -> Result<ClaimOutcome, StoreError>;
    fn apply_report(
        &self,
        task: TaskId,
        reporter: &str,
        status: ReportedStatus,
        result: Option<&Value>,
        error: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<ReportOutcome, StoreError>;

    fn insert_script(&self, script: &Script) -> Result<(), StoreError>;
    fn get_script(&self, id: ScriptId) -> Result<Option<Script>, StoreError>;
    fn list_scripts(&self) -> Result<Vec<Script>, StoreError>;

    fn insert_task(&self, task: &Task) -> Result<(), StoreError>;
    fn get_task(&self, id: TaskId) -> Result<Option<Task>, StoreError>;
    fn list_tasks(&self, query: &TaskQuery) -> Result<Page<Task>, StoreError>;
    fn task_statistics(&self, visibility: &Visibility) -> Result<TaskStatistics, StoreError>;
    fn cancel_task(&self, id: TaskId, now: DateTime<Utc>) -> Result<CancelOutcome, StoreError>;
    fn update_task(
        &self,
        id: TaskId,
        update: &TaskUpdate,
        now: DateTime<Utc>,
    ) -> Result<EditOutcome, StoreError>;
    /// Returns the deleted task; a RUNNING task frees its agent's slot
    fn delete_task(&self, id: TaskId, now: DateTime<Utc>) -> Result<Option<Task>, StoreError>;
}
