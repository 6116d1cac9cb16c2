//! Task rows: the lease protocol plus admin queries

use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, params};
use serde_json::Value;

use super::agents;
use super::rows::{self, TASK_COLUMNS};
use crate::agent::AgentStatus;
use crate::ids::{AgentId, TaskId};
use crate::page::Page;
use crate::script::ScriptProjection;
use crate::store::codec::{json, millis, to_json, to_opt_json};
use crate::store::{
    CancelOutcome, ClaimOutcome, EditOutcome, PollSkip, ReportOutcome, StoreError,
};
use crate::task::{
    JobPayload, ReportedStatus, Task, TaskQuery, TaskStatistics, TaskStatus, TaskUpdate,
    Visibility,
};

/// Pending, enabled, and either unassigned or pinned to ?1
const ELIGIBLE: &str =
    "status = 'pending' AND is_enabled = 1 AND (agent_id IS NULL OR agent_id = ?1)";

pub(super) fn get(conn: &Connection, id: TaskId) -> Result<Option<Task>, StoreError> {
    let task = conn
        .query_row(
            &format!("SELECT {TASK_COLUMNS} FROM tasks WHERE id = ?1"),
            [id],
            rows::task,
        )
        .optional()?;
    Ok(task)
}

fn reload(conn: &Connection, id: TaskId) -> Result<Task, StoreError> {
    get(conn, id)?.ok_or_else(|| StoreError::Corrupt(format!("task {id} vanished mid-transaction")))
}

pub(super) fn insert(conn: &Connection, task: &Task) -> Result<(), StoreError> {
    conn.execute(
        "INSERT INTO tasks (id, name, description, status, trigger_type, config, is_enabled,
             script_id, agent_id, creator_id, started_at, completed_at, error_message, result,
             created_at, updated_at, cron_expression)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17)",
        params![
            task.id,
            task.name,
            task.description,
            task.status,
            task.trigger_type,
            to_json(&task.config)?,
            task.is_enabled,
            task.script_id,
            task.agent_id,
            task.creator_id,
            task.started_at.map(millis),
            task.completed_at.map(millis),
            task.error_message,
            to_opt_json(task.result.as_ref())?,
            millis(task.created_at),
            millis(task.updated_at),
            task.cron_expression,
        ],
    )?;
    Ok(())
}

fn job_payload(conn: &Connection, id: TaskId) -> Result<JobPayload, StoreError> {
    let payload = conn.query_row(
        "SELECT t.id, t.name, t.description, t.config, t.trigger_type,
                s.id, s.name, s.content, s.script_type
         FROM tasks t JOIN scripts s ON s.id = t.script_id
         WHERE t.id = ?1",
        [id],
        |row| {
            Ok(JobPayload {
                id: row.get(0)?,
                name: row.get(1)?,
                description: row.get(2)?,
                config: json(row, 3)?,
                trigger_type: row.get(4)?,
                script: ScriptProjection {
                    id: row.get(5)?,
                    name: row.get(6)?,
                    content: row.get(7)?,
                    script_type: row.get(8)?,
                },
            })
        },
    )?;
    Ok(payload)
}

/// Lease eligible tasks to `agent_id`, oldest first.
///
/// Each lease is a conditional update that only succeeds while the row is
/// still pending and unassigned (or pinned here); the agent counter moves in
/// the same transaction, once per row actually flipped.
pub(super) fn claim(
    conn: &Connection,
    agent_id: AgentId,
    batch: u32,
    now: DateTime<Utc>,
) -> Result<ClaimOutcome, StoreError> {
    let Some(agent) = agents::get(conn, agent_id)? else {
        return Ok(ClaimOutcome::AgentNotFound);
    };
    if !agent.is_enabled {
        return Ok(ClaimOutcome::Skipped(PollSkip::Disabled));
    }
    if agent.status != AgentStatus::Online {
        return Ok(ClaimOutcome::Skipped(PollSkip::NotOnline));
    }
    let free = agent.free_slots();
    if free == 0 {
        return Ok(ClaimOutcome::Skipped(PollSkip::AtCapacity));
    }

    let candidates: Vec<TaskId> = {
        let mut stmt = conn.prepare(&format!(
            "SELECT id FROM tasks WHERE {ELIGIBLE} ORDER BY created_at ASC, rowid ASC LIMIT ?2"
        ))?;
        let rows = stmt.query_map(params![agent_id, batch.min(free)], |row| row.get(0))?;
        rows.collect::<Result<_, _>>()?
    };

    let now_ms = millis(now);
    let mut claimed = Vec::with_capacity(candidates.len());
    for id in candidates {
        let changed = conn.execute(
            &format!(
                "UPDATE tasks SET status = 'running', agent_id = ?1, started_at = ?2, updated_at = ?2
                 WHERE id = ?3 AND {ELIGIBLE}"
            ),
            params![agent_id, now_ms, id],
        )?;
        if changed == 1 {
            conn.execute(
                "UPDATE agents SET current_tasks = current_tasks + 1, updated_at = ?2 WHERE id = ?1",
                params![agent_id, now_ms],
            )?;
            claimed.push(id);
        }
    }

    let has_more: bool = conn.query_row(
        &format!("SELECT EXISTS (SELECT 1 FROM tasks WHERE {ELIGIBLE})"),
        [agent_id],
        |row| row.get(0),
    )?;

    let jobs = claimed
        .into_iter()
        .map(|id| job_payload(conn, id))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(ClaimOutcome::Claimed { jobs, has_more })
}

pub(super) fn report(
    conn: &Connection,
    task_id: TaskId,
    reporter: &str,
    status: ReportedStatus,
    result: Option<&Value>,
    error: Option<&str>,
    now: DateTime<Utc>,
) -> Result<ReportOutcome, StoreError> {
    let Some(task) = get(conn, task_id)? else {
        return Ok(ReportOutcome::TaskNotFound);
    };
    let Some(bound) = task.agent_id else {
        return Ok(ReportOutcome::NotBound);
    };
    let Some(agent) = agents::get(conn, bound)? else {
        return Ok(ReportOutcome::NotBound);
    };
    if !agent.is_reporter(reporter) {
        return Ok(ReportOutcome::NotBound);
    }
    if task.status.is_terminal() {
        return Ok(ReportOutcome::Unchanged(task));
    }
    if task.status != TaskStatus::Running {
        return Ok(ReportOutcome::NotLeased(task.status));
    }

    let result = to_opt_json(result)?;
    let now_ms = millis(now);

    if status == ReportedStatus::Running {
        conn.execute(
            "UPDATE tasks SET error_message = COALESCE(?2, error_message),
                 result = COALESCE(?3, result), updated_at = ?4
             WHERE id = ?1",
            params![task_id, error, result, now_ms],
        )?;
    } else {
        conn.execute(
            "UPDATE tasks SET status = ?2, completed_at = ?3, updated_at = ?3,
                 error_message = COALESCE(?4, error_message), result = COALESCE(?5, result)
             WHERE id = ?1 AND status = 'running'",
            params![task_id, status.task_status(), now_ms, error, result],
        )?;
        conn.execute(
            "UPDATE agents SET current_tasks = MAX(current_tasks - 1, 0),
                 total_tasks_executed = total_tasks_executed + ?2, updated_at = ?3
             WHERE id = ?1",
            params![bound, i64::from(status.counts_as_executed()), now_ms],
        )?;
    }

    Ok(ReportOutcome::Applied(reload(conn, task_id)?))
}

pub(super) fn cancel(
    conn: &Connection,
    id: TaskId,
    now: DateTime<Utc>,
) -> Result<CancelOutcome, StoreError> {
    let Some(task) = get(conn, id)? else {
        return Ok(CancelOutcome::NotFound);
    };
    if task.status.is_terminal() {
        return Ok(CancelOutcome::AlreadyFinished(task.status));
    }

    let now_ms = millis(now);
    conn.execute(
        "UPDATE tasks SET status = 'cancelled', completed_at = ?2, updated_at = ?2 WHERE id = ?1",
        params![id, now_ms],
    )?;

    if task.status == TaskStatus::Running
        && let Some(agent) = task.agent_id
    {
        release_slot(conn, agent, now_ms)?;
    }

    Ok(CancelOutcome::Cancelled(reload(conn, id)?))
}

fn release_slot(conn: &Connection, agent: AgentId, now_ms: i64) -> Result<(), StoreError> {
    conn.execute(
        "UPDATE agents SET current_tasks = MAX(current_tasks - 1, 0), updated_at = ?2
         WHERE id = ?1",
        params![agent, now_ms],
    )?;
    Ok(())
}

pub(super) fn update(
    conn: &Connection,
    id: TaskId,
    update: &TaskUpdate,
    now: DateTime<Utc>,
) -> Result<EditOutcome, StoreError> {
    let Some(mut task) = get(conn, id)? else {
        return Ok(EditOutcome::NotFound);
    };
    if task.status != TaskStatus::Pending {
        return Ok(EditOutcome::NotPending(task.status));
    }

    if let Some(name) = &update.name {
        task.name = name.trim().to_string();
    }
    if let Some(description) = &update.description {
        task.description = Some(description.clone());
    }
    if let Some(pin) = update.agent_id {
        task.agent_id = Some(pin);
    }
    if let Some(config) = &update.config {
        task.config = config.clone();
    }
    if let Some(trigger) = update.trigger_type {
        task.trigger_type = trigger;
    }
    if let Some(cron) = &update.cron_expression {
        task.cron_expression = Some(cron.clone());
    }
    if let Some(enabled) = update.is_enabled {
        task.is_enabled = enabled;
    }

    conn.execute(
        "UPDATE tasks SET name = ?2, description = ?3, agent_id = ?4, config = ?5,
             trigger_type = ?6, cron_expression = ?7, is_enabled = ?8, updated_at = ?9
         WHERE id = ?1",
        params![
            id,
            task.name,
            task.description,
            task.agent_id,
            to_json(&task.config)?,
            task.trigger_type,
            task.cron_expression,
            task.is_enabled,
            millis(now),
        ],
    )?;
    Ok(EditOutcome::Updated(reload(conn, id)?))
}

pub(super) fn delete(
    conn: &Connection,
    id: TaskId,
    now: DateTime<Utc>,
) -> Result<Option<Task>, StoreError> {
    let Some(task) = get(conn, id)? else {
        return Ok(None);
    };
    conn.execute("DELETE FROM tasks WHERE id = ?1", [id])?;

    if task.status == TaskStatus::Running
        && let Some(agent) = task.agent_id
    {
        release_slot(conn, agent, millis(now))?;
    }
    Ok(Some(task))
}

pub(super) fn for_agent(conn: &Connection, agent: AgentId) -> Result<Vec<Task>, StoreError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {TASK_COLUMNS} FROM tasks
         WHERE agent_id = ?1 AND status IN ('pending', 'running')
         ORDER BY created_at ASC, rowid ASC"
    ))?;
    let tasks = stmt
        .query_map([agent], rows::task)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(tasks)
}

fn visibility_condition(
    visibility: &Visibility,
    conditions: &mut Vec<String>,
    params: &mut Vec<Box<dyn rusqlite::ToSql>>,
) {
    if let Visibility::CreatedBy(creator) = visibility {
        conditions.push(format!("creator_id = ?{}", params.len() + 1));
        params.push(Box::new(creator.clone()));
    }
}

fn where_clause(conditions: &[String]) -> String {
    if conditions.is_empty() {
        String::new()
    } else {
        format!("WHERE {}", conditions.join(" AND "))
    }
}

pub(super) fn list(conn: &Connection, query: &TaskQuery) -> Result<Page<Task>, StoreError> {
    let mut conditions = Vec::new();
    let mut params: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

    visibility_condition(&query.visibility, &mut conditions, &mut params);

    if let Some(status) = query.status {
        conditions.push(format!("status = ?{}", params.len() + 1));
        params.push(Box::new(status));
    }

    if let Some(script_id) = query.script_id {
        conditions.push(format!("script_id = ?{}", params.len() + 1));
        params.push(Box::new(script_id));
    }

    let filter = where_clause(&conditions);

    let total: i64 = conn.query_row(
        &format!("SELECT COUNT(*) FROM tasks {}", filter),
        rusqlite::params_from_iter(params.iter()),
        |row| row.get(0),
    )?;

    let limit_idx = params.len() + 1;
    let offset_idx = params.len() + 2;
    params.push(Box::new(query.page.effective_limit()));
    params.push(Box::new(query.page.offset() as i64));

    let sql = format!(
        "SELECT {TASK_COLUMNS} FROM tasks {filter}
         ORDER BY created_at DESC, rowid DESC LIMIT ?{limit_idx} OFFSET ?{offset_idx}"
    );
    let mut stmt = conn.prepare(&sql)?;
    let tasks = stmt
        .query_map(rusqlite::params_from_iter(params.iter()), rows::task)?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Page::new(tasks, total.max(0) as u64, query.page))
}

pub(super) fn statistics(
    conn: &Connection,
    visibility: &Visibility,
) -> Result<TaskStatistics, StoreError> {
    let mut conditions = Vec::new();
    let mut params: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();
    visibility_condition(visibility, &mut conditions, &mut params);

    let mut stmt = conn.prepare(&format!(
        "SELECT status, COUNT(*) FROM tasks {} GROUP BY status",
        where_clause(&conditions)
    ))?;
    let rows = stmt.query_map(rusqlite::params_from_iter(params.iter()), |row| {
        let count: i64 = row.get(1)?;
        Ok((row.get::<_, TaskStatus>(0)?, count.max(0) as u64))
    })?;

    let mut stats = TaskStatistics::default();
    for row in rows {
        let (status, count) = row?;
        stats.total += count;
        match status {
            TaskStatus::Pending => stats.pending = count,
            TaskStatus::Running => stats.running = count,
            TaskStatus::Completed => stats.completed = count,
            TaskStatus::Failed => stats.failed = count,
            TaskStatus::Cancelled => stats.cancelled = count,
        }
    }
    Ok(stats)
}
