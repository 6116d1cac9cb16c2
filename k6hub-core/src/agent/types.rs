//! Agent records and the payloads that create or change them

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ParseEnumError;
use crate::ids::AgentId;
use crate::page::PageRequest;

/// Port assumed when an agent does not declare one
pub const DEFAULT_AGENT_PORT: u16 = 8080;

/// Liveness status of an agent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentStatus {
    Online,
    Offline,
    Busy,
    Error,
}

impl AgentStatus {
    pub const ALL: [AgentStatus; 4] = [Self::Online, Self::Offline, Self::Busy, Self::Error];

    /// Convert to database string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Online => "online",
            Self::Offline => "offline",
            Self::Busy => "busy",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for AgentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AgentStatus {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "online" => Ok(Self::Online),
            "offline" => Ok(Self::Offline),
            "busy" => Ok(Self::Busy),
            "error" => Ok(Self::Error),
            other => Err(ParseEnumError::new("agent status", other)),
        }
    }
}

/// What an agent declares it can run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentCapabilities {
    pub max_concurrent_tasks: u32,
    #[serde(default)]
    pub supported_script_types: Vec<String>,
    #[serde(default)]
    pub k6_version: Option<String>,
    #[serde(default)]
    pub os: Option<String>,
    #[serde(default)]
    pub arch: Option<String>,
}

impl AgentCapabilities {
    pub fn with_capacity(max_concurrent_tasks: u32) -> Self {
        Self {
            max_concurrent_tasks,
            supported_script_types: vec!["k6".to_string()],
            k6_version: None,
            os: None,
            arch: None,
        }
    }
}

/// A worker that executes load tests
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Agent {
    pub id: AgentId,
    pub name: String,
    pub hostname: String,
    pub ip_address: String,
    pub port: u16,
    pub status: AgentStatus,
    pub description: Option<String>,
    pub tags: Vec<String>,
    pub capabilities: AgentCapabilities,
    /// Last reported resource snapshot, overwritten on each heartbeat
    pub resources: Option<Value>,
    pub last_heartbeat: Option<DateTime<Utc>>,
    pub version: Option<String>,
    pub is_enabled: bool,
    /// RUNNING tasks currently leased to this agent
    pub current_tasks: u32,
    pub total_tasks_executed: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Agent {
    /// Whether a poll from this agent may lease anything at all
    pub fn accepts_work(&self) -> bool {
        self.is_enabled && self.status == AgentStatus::Online
    }

    pub fn free_slots(&self) -> u32 {
        self.capabilities
            .max_concurrent_tasks
            .saturating_sub(self.current_tasks)
    }

    /// A status reporter is this agent when it names the agent or its id
    pub fn is_reporter(&self, reporter: &str) -> bool {
        let reporter = reporter.trim();
        reporter == self.name || reporter == self.id.to_string()
    }
}

/// Tags as sent by agents: either a plain list or a key/value map
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TagSet {
    List(Vec<String>),
    Map(BTreeMap<String, String>),
}

impl TagSet {
    /// Flatten to strings; map entries become `key=value` in key order
    pub fn into_tags(self) -> Vec<String> {
        match self {
            Self::List(tags) => tags,
            Self::Map(map) => map.into_iter().map(|(k, v)| format!("{k}={v}")).collect(),
        }
    }
}

/// Self-description an agent sends when it registers
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AgentDescriptor {
    /// Agent's own identifier; becomes the agent name when no name is given
    #[serde(default)]
    pub agent_id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    pub hostname: String,
    #[serde(default)]
    pub ip: Option<String>,
    #[serde(default)]
    pub port: Option<u16>,
    #[serde(default)]
    pub tags: Option<TagSet>,
    #[serde(default)]
    pub k6_version: Option<String>,
    #[serde(default)]
    pub os: Option<String>,
    #[serde(default)]
    pub arch: Option<String>,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub max_concurrent_tasks: Option<u32>,
    #[serde(default)]
    pub supported_script_types: Option<Vec<String>>,
    #[serde(default)]
    pub resources: Option<Value>,
}

/// Normalized registration data written to the store
#[derive(Debug, Clone, PartialEq)]
pub struct AgentProfile {
    pub name: String,
    pub hostname: String,
    pub ip_address: String,
    pub port: u16,
    pub tags: Vec<String>,
    pub capabilities: AgentCapabilities,
    pub version: Option<String>,
    pub resources: Option<Value>,
}

impl AgentDescriptor {
    /// Resolve defaults against the configured capacity
    pub fn into_profile(self, default_max_concurrent_tasks: u32) -> AgentProfile {
        let hostname = self.hostname.trim().to_string();
        let name = self
            .name
            .or(self.agent_id)
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| hostname.clone());
        let supported_script_types = self
            .supported_script_types
            .filter(|types| !types.is_empty())
            .unwrap_or_else(|| vec!["k6".to_string()]);

        AgentProfile {
            name,
            hostname,
            ip_address: self.ip.unwrap_or_default(),
            port: self.port.unwrap_or(DEFAULT_AGENT_PORT),
            tags: self.tags.map(TagSet::into_tags).unwrap_or_default(),
            capabilities: AgentCapabilities {
                max_concurrent_tasks: self
                    .max_concurrent_tasks
                    .unwrap_or(default_max_concurrent_tasks)
                    .max(1),
                supported_script_types,
                k6_version: self.k6_version,
                os: self.os,
                arch: self.arch,
            },
            version: self.version,
            resources: self.resources,
        }
    }
}

/// Periodic liveness signal
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeartbeatReport {
    pub agent_id: String,
    /// Agent-side clock; recorded nowhere, the server clock decides liveness
    #[serde(default)]
    pub timestamp: Option<Value>,
    #[serde(default)]
    pub resources: Option<Value>,
}

/// Admin request to create an agent record ahead of registration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewAgent {
    pub name: String,
    pub hostname: String,
    pub ip_address: String,
    #[serde(default)]
    pub port: Option<u16>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub capabilities: Option<AgentCapabilities>,
    #[serde(default)]
    pub is_enabled: Option<bool>,
}

/// Partial admin update; absent fields are left alone
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentUpdate {
    pub name: Option<String>,
    pub hostname: Option<String>,
    pub ip_address: Option<String>,
    pub port: Option<u16>,
    pub description: Option<String>,
    pub tags: Option<Vec<String>>,
    pub capabilities: Option<AgentCapabilities>,
    pub is_enabled: Option<bool>,
}

impl AgentUpdate {
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.hostname.is_none()
            && self.ip_address.is_none()
            && self.port.is_none()
            && self.description.is_none()
            && self.tags.is_none()
            && self.capabilities.is_none()
            && self.is_enabled.is_none()
    }
}

/// Filter for the admin agent list
#[derive(Debug, Clone, Default)]
pub struct AgentQuery {
    pub page: PageRequest,
    pub status: Option<AgentStatus>,
    /// Substring match on hostname
    pub hostname: Option<String>,
}

/// Fleet-wide counts for the dashboard
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentStatistics {
    pub total: u64,
    pub online: u64,
    pub offline: u64,
    pub busy: u64,
    pub error: u64,
    pub total_tasks_executed: u64,
    pub by_os: BTreeMap<String, u64>,
    pub by_arch: BTreeMap<String, u64>,
}

/// Per-id partition of a batch operation
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchOutcome {
    pub success: Vec<String>,
    pub failed: Vec<String>,
}

/// Registration response: the agent plus its freshly issued credential
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Registration {
    #[serde(flatten)]
    pub agent: Agent,
    pub agent_token: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_round_trips_through_str() {
        for status in AgentStatus::ALL {
            assert_eq!(status.as_str().parse::<AgentStatus>().unwrap(), status);
        }
        assert!("sleeping".parse::<AgentStatus>().is_err());
    }

    #[test]
    fn tag_map_is_flattened_in_key_order() {
        let tags: TagSet = serde_json::from_str(r#"{"zone":"eu","env":"prod"}"#).unwrap();
        assert_eq!(tags.into_tags(), vec!["env=prod", "zone=eu"]);
    }

    #[test]
    fn tag_list_is_kept() {
        let tags: TagSet = serde_json::from_str(r#"["fast","ssd"]"#).unwrap();
        assert_eq!(tags.into_tags(), vec!["fast", "ssd"]);
    }

    #[test]
    fn descriptor_name_falls_back_to_agent_id_then_hostname() {
        let with_id = AgentDescriptor {
            agent_id: Some("worker-1".into()),
            hostname: "h1".into(),
            ..Default::default()
        };
        assert_eq!(with_id.into_profile(1).name, "worker-1");

        let bare = AgentDescriptor {
            hostname: " h2 ".into(),
            ..Default::default()
        };
        let profile = bare.into_profile(3);
        assert_eq!(profile.name, "h2");
        assert_eq!(profile.hostname, "h2");
        assert_eq!(profile.port, DEFAULT_AGENT_PORT);
        assert_eq!(profile.capabilities.max_concurrent_tasks, 3);
        assert_eq!(profile.capabilities.supported_script_types, vec!["k6"]);
    }

    #[test]
    fn descriptor_capacity_is_at_least_one() {
        let descriptor = AgentDescriptor {
            hostname: "h".into(),
            max_concurrent_tasks: Some(0),
            ..Default::default()
        };
        assert_eq!(descriptor.into_profile(1).capabilities.max_concurrent_tasks, 1);
    }

    #[test]
    fn descriptor_parses_reference_worker_payload() {
        let json = r#"{
            "agent_id": "agent-abc",
            "hostname": "load-01",
            "ip": "10.0.0.4",
            "os": "linux",
            "arch": "amd64",
            "k6_version": "v0.49.0",
            "resources": {"cpu": 8, "memory": 16384},
            "tags": {"region": "us-east"},
            "timestamp": "2024-01-01T00:00:00Z"
        }"#;
        let descriptor: AgentDescriptor = serde_json::from_str(json).unwrap();
        let profile = descriptor.into_profile(1);
        assert_eq!(profile.name, "agent-abc");
        assert_eq!(profile.tags, vec!["region=us-east"]);
        assert_eq!(profile.capabilities.os.as_deref(), Some("linux"));
    }

    #[test]
    fn reporter_matches_name_or_id() {
        let now = Utc::now();
        let agent = Agent {
            id: AgentId::new(),
            name: "worker-1".into(),
            hostname: "h1".into(),
            ip_address: String::new(),
            port: DEFAULT_AGENT_PORT,
            status: AgentStatus::Online,
            description: None,
            tags: vec![],
            capabilities: AgentCapabilities::with_capacity(2),
            resources: None,
            last_heartbeat: Some(now),
            version: None,
            is_enabled: true,
            current_tasks: 1,
            total_tasks_executed: 0,
            created_at: now,
            updated_at: now,
        };
        assert!(agent.is_reporter("worker-1"));
        assert!(agent.is_reporter(&agent.id.to_string()));
        assert!(!agent.is_reporter("worker-2"));
        assert!(agent.accepts_work());
        assert_eq!(agent.free_slots(), 1);
    }

    #[test]
    fn agent_serializes_camel_case() {
        let caps = AgentCapabilities::with_capacity(4);
        let json = serde_json::to_value(&caps).unwrap();
        assert_eq!(json["maxConcurrentTasks"], 4);
        assert_eq!(json["supportedScriptTypes"][0], "k6");
    }
}
