//! Concurrent polls never lease a task twice or overrun capacity

use std::collections::HashSet;
use std::sync::Arc;
use std::thread;

use chrono::Utc;
use k6hub_core::{
    AgentDescriptor, DispatchConfig, DispatchService, NewScript, NewTask, Operator, Role,
    SqliteFleetStore, TaskConfig, TaskId, TaskQuery, TaskStatus,
};
use tempfile::TempDir;

const TASKS: usize = 40;

fn admin() -> Operator {
    Operator::new("root", Role::Admin, Utc::now())
}

fn seed_tasks(service: &DispatchService, count: usize) {
    let script = service
        .create_script(
            NewScript {
                name: "soak".into(),
                description: None,
                content: "export default function () {}".into(),
                script_type: None,
            },
            &admin(),
        )
        .unwrap();
    for i in 0..count {
        service
            .create_task(
                NewTask {
                    name: format!("task-{i}"),
                    description: None,
                    script_id: script.id,
                    agent_id: None,
                    config: TaskConfig::new(1, "5s"),
                    trigger_type: None,
                    cron_expression: None,
                    is_enabled: None,
                },
                &admin(),
            )
            .unwrap();
    }
}

fn register(service: &DispatchService, hostname: &str, capacity: u32) -> String {
    service
        .register(
            AgentDescriptor {
                hostname: hostname.into(),
                max_concurrent_tasks: Some(capacity),
                ..Default::default()
            },
            None,
        )
        .unwrap()
        .agent
        .id
        .to_string()
}

/// Poll repeatedly until the agent is saturated or nothing is left
fn drain(service: &DispatchService, agent: &str) -> Vec<TaskId> {
    let mut leased = Vec::new();
    for _ in 0..20 {
        let response = service.poll(agent, None).unwrap();
        if response.jobs.is_empty() {
            break;
        }
        leased.extend(response.jobs.into_iter().map(|job| job.id));
    }
    leased
}

fn assert_counters_match(service: &DispatchService, agents: &[String]) {
    for agent in agents {
        let id = agent.parse().unwrap();
        let running = service
            .agent_tasks(id)
            .unwrap()
            .into_iter()
            .filter(|t| t.status == TaskStatus::Running)
            .count() as u32;
        let stored = service.get_agent(id).unwrap();
        assert_eq!(stored.current_tasks, running);
        assert!(stored.current_tasks <= stored.capabilities.max_concurrent_tasks);
    }
}

#[test]
fn racing_agents_on_one_store_lease_disjoint_sets() {
    let store = SqliteFleetStore::open_in_memory().unwrap();
    let service = Arc::new(DispatchService::new(
        Arc::new(store),
        DispatchConfig::default().with_poll_batch_size(3),
    ));
    seed_tasks(&service, TASKS);

    let agents: Vec<String> = (0..8)
        .map(|i| register(&service, &format!("load-{i}"), 4))
        .collect();

    let handles: Vec<_> = agents
        .iter()
        .cloned()
        .map(|agent| {
            let service = Arc::clone(&service);
            thread::spawn(move || drain(&service, &agent))
        })
        .collect();

    let mut seen = HashSet::new();
    let mut total = 0;
    for handle in handles {
        let leased = handle.join().unwrap();
        assert!(leased.len() <= 4, "an agent exceeded its capacity");
        total += leased.len();
        for id in leased {
            assert!(seen.insert(id), "task {id} was leased twice");
        }
    }

    assert_eq!(total, 32, "8 agents x 4 slots with 40 tasks pending");
    let stats = service.task_statistics(&admin()).unwrap();
    assert_eq!(stats.running, 32);
    assert_eq!(stats.pending, (TASKS - 32) as u64);
    assert_counters_match(&service, &agents);
}

#[test]
fn racing_connections_on_one_file_lease_disjoint_sets() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("k6hub.db");

    // Separate connections: row-level races go through SQLite's own locking
    let services: Vec<Arc<DispatchService>> = (0..4)
        .map(|_| {
            let store = SqliteFleetStore::open(&path).unwrap();
            Arc::new(DispatchService::new(
                Arc::new(store),
                DispatchConfig::default().with_poll_batch_size(2),
            ))
        })
        .collect();

    seed_tasks(&services[0], TASKS);
    let agents: Vec<String> = (0..6)
        .map(|i| register(&services[0], &format!("load-{i}"), 5))
        .collect();

    let handles: Vec<_> = agents
        .iter()
        .cloned()
        .enumerate()
        .map(|(i, agent)| {
            let service = Arc::clone(&services[i % services.len()]);
            thread::spawn(move || drain(&service, &agent))
        })
        .collect();

    let mut seen = HashSet::new();
    for handle in handles {
        for id in handle.join().unwrap() {
            assert!(seen.insert(id), "task {id} was leased twice");
        }
    }
    assert_eq!(seen.len(), 30);

    let reader = &services[0];
    let running = reader
        .list_tasks(
            &admin(),
            TaskQuery {
                status: Some(TaskStatus::Running),
                page: k6hub_core::PageRequest::new(1, 100),
                ..Default::default()
            },
        )
        .unwrap();
    assert_eq!(running.total, 30);
    assert_counters_match(reader, &agents);
}
