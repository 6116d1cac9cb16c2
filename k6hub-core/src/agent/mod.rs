//! Agent records, registration payloads and fleet queries

mod types;

pub use types::{
    Agent, AgentCapabilities, AgentDescriptor, AgentProfile, AgentQuery, AgentStatistics,
    AgentStatus, AgentUpdate, BatchOutcome, DEFAULT_AGENT_PORT, HeartbeatReport, NewAgent,
    Registration, TagSet,
};
