//! Task records, lease payloads and status reports

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ParseEnumError;
use crate::ids::{AgentId, ScriptId, TaskId};
use crate::page::PageRequest;
use crate::script::ScriptProjection;

/// Lifecycle state of a task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl TaskStatus {
    pub const ALL: [TaskStatus; 5] = [
        Self::Pending,
        Self::Running,
        Self::Completed,
        Self::Failed,
        Self::Cancelled,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }

    /// Terminal tasks are never resurrected
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskStatus {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pending" => Ok(Self::Pending),
            "running" => Ok(Self::Running),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            "cancelled" => Ok(Self::Cancelled),
            other => Err(ParseEnumError::new("task status", other)),
        }
    }
}

/// What caused a task to be created
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TriggerType {
    #[default]
    Manual,
    Scheduled,
    Api,
    Chat,
}

impl TriggerType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Manual => "manual",
            Self::Scheduled => "scheduled",
            Self::Api => "api",
            Self::Chat => "chat",
        }
    }
}

impl FromStr for TriggerType {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "manual" => Ok(Self::Manual),
            "scheduled" => Ok(Self::Scheduled),
            "api" => Ok(Self::Api),
            "chat" => Ok(Self::Chat),
            other => Err(ParseEnumError::new("trigger type", other)),
        }
    }
}

/// One step of a ramping profile
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stage {
    pub duration: String,
    pub target: u32,
}

/// Execution settings forwarded to the agent untouched
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskConfig {
    pub vus: u32,
    pub duration: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stages: Option<Vec<Stage>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thresholds: Option<BTreeMap<String, Vec<String>>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub env: Option<BTreeMap<String, String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<Value>,
}

impl TaskConfig {
    pub fn new(vus: u32, duration: impl Into<String>) -> Self {
        Self {
            vus,
            duration: duration.into(),
            stages: None,
            thresholds: None,
            env: None,
            options: None,
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.vus == 0 {
            return Err("config.vus must be at least 1".to_string());
        }
        if self.duration.trim().is_empty() {
            return Err("config.duration must not be empty".to_string());
        }
        Ok(())
    }
}

/// A unit of schedulable load-test work
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: TaskId,
    pub name: String,
    pub description: Option<String>,
    pub status: TaskStatus,
    pub trigger_type: TriggerType,
    /// Stored as given for scheduled tasks; the hub never evaluates it
    pub cron_expression: Option<String>,
    pub config: TaskConfig,
    pub is_enabled: bool,
    pub script_id: ScriptId,
    /// Pinned agent while pending, leasing agent once running
    pub agent_id: Option<AgentId>,
    pub creator_id: String,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
    /// Result payload as reported by the agent
    pub result: Option<Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Request to create a task
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewTask {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub script_id: ScriptId,
    /// Pin the task to one agent
    #[serde(default)]
    pub agent_id: Option<AgentId>,
    pub config: TaskConfig,
    #[serde(default)]
    pub trigger_type: Option<TriggerType>,
    #[serde(default)]
    pub cron_expression: Option<String>,
    #[serde(default)]
    pub is_enabled: Option<bool>,
}

/// Partial edit of a pending task; absent fields are left alone
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskUpdate {
    pub name: Option<String>,
    pub description: Option<String>,
    /// Re-pin the task to another agent
    pub agent_id: Option<AgentId>,
    pub config: Option<TaskConfig>,
    pub trigger_type: Option<TriggerType>,
    pub cron_expression: Option<String>,
    pub is_enabled: Option<bool>,
}

impl TaskUpdate {
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.description.is_none()
            && self.agent_id.is_none()
            && self.config.is_none()
            && self.trigger_type.is_none()
            && self.cron_expression.is_none()
            && self.is_enabled.is_none()
    }
}

/// Who is allowed to see a task
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Visibility {
    #[default]
    All,
    CreatedBy(String),
}

impl Visibility {
    pub fn permits(&self, task: &Task) -> bool {
        match self {
            Self::All => true,
            Self::CreatedBy(creator) => &task.creator_id == creator,
        }
    }
}

/// Filter for the task list
#[derive(Debug, Clone, Default)]
pub struct TaskQuery {
    pub page: PageRequest,
    pub status: Option<TaskStatus>,
    pub script_id: Option<ScriptId>,
    pub visibility: Visibility,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskStatistics {
    pub total: u64,
    pub pending: u64,
    pub running: u64,
    pub completed: u64,
    pub failed: u64,
    pub cancelled: u64,
}

/// The stripped-down task an agent receives when it leases work
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobPayload {
    pub id: TaskId,
    pub name: String,
    pub description: Option<String>,
    pub script: ScriptProjection,
    pub config: TaskConfig,
    pub trigger_type: TriggerType,
}

/// Result of one poll
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PollResponse {
    pub jobs: Vec<JobPayload>,
    /// More eligible work remains after this batch
    pub has_more: bool,
}

impl PollResponse {
    pub fn empty() -> Self {
        Self::default()
    }
}

/// Agent's report on a leased task
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusReport {
    pub agent_id: String,
    pub status: String,
    #[serde(default)]
    pub result: Option<Value>,
    #[serde(default)]
    pub error: Option<String>,
}

/// Statuses an agent is allowed to report
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportedStatus {
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl ReportedStatus {
    pub fn task_status(self) -> TaskStatus {
        match self {
            Self::Running => TaskStatus::Running,
            Self::Completed => TaskStatus::Completed,
            Self::Failed => TaskStatus::Failed,
            Self::Cancelled => TaskStatus::Cancelled,
        }
    }

    /// Whether the report ends the lease and counts as an execution
    pub fn counts_as_executed(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

impl FromStr for ReportedStatus {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.parse::<TaskStatus>() {
            Ok(TaskStatus::Running) => Ok(Self::Running),
            Ok(TaskStatus::Completed) => Ok(Self::Completed),
            Ok(TaskStatus::Failed) => Ok(Self::Failed),
            Ok(TaskStatus::Cancelled) => Ok(Self::Cancelled),
            _ => Err(ParseEnumError::new("reported status", s.trim())),
        }
    }
}

/// `{success, message}` acknowledgement used by the agent protocol
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ack {
    pub success: bool,
    pub message: String,
}

impl Ack {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
        }
    }
}
