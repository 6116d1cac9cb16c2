//! Column lists and row mappers

use rusqlite::Row;

use crate::agent::{Agent, AgentCapabilities};
use crate::script::Script;
use crate::store::codec::{json, opt_json, opt_timestamp, timestamp};
use crate::task::Task;

pub(super) const AGENT_COLUMNS: &str = "id, name, hostname, ip_address, port, status, description, tags, \
     max_concurrent_tasks, supported_script_types, k6_version, os, arch, resources, \
     last_heartbeat, version, is_enabled, current_tasks, total_tasks_executed, created_at, updated_at";

pub(super) const TASK_COLUMNS: &str = "id, name, description, status, trigger_type, config, is_enabled, \
     script_id, agent_id, creator_id, started_at, completed_at, error_message, result, \
     created_at, updated_at, cron_expression";

pub(super) const SCRIPT_COLUMNS: &str =
    "id, name, description, content, script_type, author_id, created_at, updated_at";

pub(super) fn agent(row: &Row<'_>) -> rusqlite::Result<Agent> {
    let total_tasks_executed: i64 = row.get(18)?;
    Ok(Agent {
        id: row.get(0)?,
        name: row.get(1)?,
        hostname: row.get(2)?,
        ip_address: row.get(3)?,
        port: row.get(4)?,
        status: row.get(5)?,
        description: row.get(6)?,
        tags: json(row, 7)?,
        capabilities: AgentCapabilities {
            max_concurrent_tasks: row.get(8)?,
            supported_script_types: json(row, 9)?,
            k6_version: row.get(10)?,
            os: row.get(11)?,
            arch: row.get(12)?,
        },
        resources: opt_json(row, 13)?,
        last_heartbeat: opt_timestamp(row, 14)?,
        version: row.get(15)?,
        is_enabled: row.get(16)?,
        current_tasks: row.get(17)?,
        total_tasks_executed: total_tasks_executed.max(0) as u64,
        created_at: timestamp(row, 19)?,
        updated_at: timestamp(row, 20)?,
    })
}

pub(super) fn task(row: &Row<'_>) -> rusqlite::Result<Task> {
    Ok(Task {
        id: row.get(0)?,
        name: row.get(1)?,
        description: row.get(2)?,
        status: row.get(3)?,
        trigger_type: row.get(4)?,
        cron_expression: row.get(16)?,
        config: json(row, 5)?,
        is_enabled: row.get(6)?,
        script_id: row.get(7)?,
        agent_id: row.get(8)?,
        creator_id: row.get(9)?,
        started_at: opt_timestamp(row, 10)?,
        completed_at: opt_timestamp(row, 11)?,
        error_message: row.get(12)?,
        result: opt_json(row, 13)?,
        created_at: timestamp(row, 14)?,
        updated_at: timestamp(row, 15)?,
    })
}

pub(super) fn script(row: &Row<'_>) -> rusqlite::Result<Script> {
    Ok(Script {
        id: row.get(0)?,
        name: row.get(1)?,
        description: row.get(2)?,
        content: row.get(3)?,
        script_type: row.get(4)?,
        author_id: row.get(5)?,
        created_at: timestamp(row, 6)?,
        updated_at: timestamp(row, 7)?,
    })
}
