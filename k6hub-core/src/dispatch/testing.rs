//! Fixtures shared by the dispatch tests

use std::sync::Arc;

use chrono::Utc;

use super::{DispatchConfig, DispatchService};
use crate::agent::{Agent, AgentDescriptor};
use crate::auth::{Operator, Role};
use crate::ids::{AgentId, ScriptId, TaskId};
use crate::script::NewScript;
use crate::store::SqliteFleetStore;
use crate::task::{NewTask, TaskConfig};

pub(crate) fn service_with(config: DispatchConfig) -> DispatchService {
    let store = SqliteFleetStore::open_in_memory().expect("in-memory store");
    DispatchService::new(Arc::new(store), config)
}

pub(crate) fn service() -> DispatchService {
    service_with(DispatchConfig::default())
}

pub(crate) fn admin() -> Operator {
    Operator::new("root", Role::Admin, Utc::now())
}

pub(crate) fn user(name: &str) -> Operator {
    Operator::new(name, Role::User, Utc::now())
}

pub(crate) fn descriptor(hostname: &str, capacity: u32) -> AgentDescriptor {
    AgentDescriptor {
        agent_id: Some(format!("agent-{hostname}")),
        hostname: hostname.to_string(),
        max_concurrent_tasks: Some(capacity),
        ..Default::default()
    }
}

pub(crate) fn register(service: &DispatchService, hostname: &str, capacity: u32) -> Agent {
    service
        .register(descriptor(hostname, capacity), None)
        .expect("register")
        .agent
}

pub(crate) fn script(service: &DispatchService) -> ScriptId {
    service
        .create_script(
            NewScript {
                name: "smoke".into(),
                description: None,
                content: "export default function () {}".into(),
                script_type: None,
            },
            &admin(),
        )
        .expect("script")
        .id
}

pub(crate) fn task(
    service: &DispatchService,
    script: ScriptId,
    pin: Option<AgentId>,
    owner: &Operator,
) -> TaskId {
    service
        .create_task(
            NewTask {
                name: "load".into(),
                description: None,
                script_id: script,
                agent_id: pin,
                config: TaskConfig::new(10, "30s"),
                trigger_type: None,
                cron_expression: None,
                is_enabled: None,
            },
            owner,
        )
        .expect("task")
        .id
}

/// `current_tasks` equals the agent's RUNNING task count
pub(crate) fn assert_load_consistent(service: &DispatchService, agent: AgentId) {
    let running = service
        .agent_tasks(agent)
        .expect("agent tasks")
        .into_iter()
        .filter(|t| t.status == crate::task::TaskStatus::Running)
        .count() as u32;
    let stored = service.get_agent(agent).expect("agent").current_tasks;
    assert_eq!(stored, running, "current_tasks drifted from RUNNING count");
}
