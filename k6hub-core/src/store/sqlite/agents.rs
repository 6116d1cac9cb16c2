//! Agent rows: registration, liveness, admin CRUD and reclaim

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, params};
use serde_json::Value;

use super::rows::{self, AGENT_COLUMNS};
use crate::agent::{Agent, AgentProfile, AgentQuery, AgentStatistics, AgentStatus, AgentUpdate};
use crate::dispatch::OrphanPolicy;
use crate::ids::AgentId;
use crate::page::Page;
use crate::store::codec::{millis, to_json, to_opt_json};
use crate::store::{ReclaimReport, RegisterOutcome, StoreError, TokenCheck, Transition};

pub(super) fn get(conn: &Connection, id: AgentId) -> Result<Option<Agent>, StoreError> {
    let agent = conn
        .query_row(
            &format!("SELECT {AGENT_COLUMNS} FROM agents WHERE id = ?1"),
            [id],
            rows::agent,
        )
        .optional()?;
    Ok(agent)
}

fn reload(conn: &Connection, id: AgentId) -> Result<Agent, StoreError> {
    get(conn, id)?.ok_or_else(|| StoreError::Corrupt(format!("agent {id} vanished mid-transaction")))
}

pub(super) fn token(conn: &Connection, id: AgentId) -> Result<Option<String>, StoreError> {
    let token: Option<Option<String>> = conn
        .query_row("SELECT agent_token FROM agents WHERE id = ?1", [id], |row| {
            row.get(0)
        })
        .optional()?;
    Ok(token.flatten())
}

pub(super) fn register(
    conn: &Connection,
    profile: &AgentProfile,
    token: &str,
    check: TokenCheck<'_>,
    now: DateTime<Utc>,
) -> Result<RegisterOutcome, StoreError> {
    let existing: Option<(AgentId, Option<String>)> = conn
        .query_row(
            "SELECT id, agent_token FROM agents WHERE hostname = ?1",
            [&profile.hostname],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()?;

    let tags = to_json(&profile.tags)?;
    let script_types = to_json(&profile.capabilities.supported_script_types)?;
    let resources = to_opt_json(profile.resources.as_ref())?;
    let caps = &profile.capabilities;
    let now_ms = millis(now);

    match existing {
        Some((id, current)) => {
            if let (TokenCheck::Require(presented), Some(current)) = (check, current.as_deref())
                && presented != Some(current)
            {
                return Ok(RegisterOutcome::Rejected);
            }

            conn.execute(
                "UPDATE agents SET name = ?2, ip_address = ?3, port = ?4, tags = ?5,
                     max_concurrent_tasks = ?6, supported_script_types = ?7, k6_version = ?8,
                     os = ?9, arch = ?10, version = ?11, resources = COALESCE(?12, resources),
                     status = 'online', last_heartbeat = ?13, agent_token = ?14, updated_at = ?13
                 WHERE id = ?1",
                params![
                    id,
                    profile.name,
                    profile.ip_address,
                    profile.port,
                    tags,
                    caps.max_concurrent_tasks,
                    script_types,
                    caps.k6_version,
                    caps.os,
                    caps.arch,
                    profile.version,
                    resources,
                    now_ms,
                    token,
                ],
            )?;
            Ok(RegisterOutcome::Updated(reload(conn, id)?))
        }
        None => {
            let id = AgentId::new();
            conn.execute(
                "INSERT INTO agents (id, name, hostname, ip_address, port, status, tags,
                     max_concurrent_tasks, supported_script_types, k6_version, os, arch,
                     resources, last_heartbeat, version, is_enabled, current_tasks,
                     total_tasks_executed, agent_token, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, 'online', ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14,
                     1, 0, 0, ?15, ?13, ?13)",
                params![
                    id,
                    profile.name,
                    profile.hostname,
                    profile.ip_address,
                    profile.port,
                    tags,
                    caps.max_concurrent_tasks,
                    script_types,
                    caps.k6_version,
                    caps.os,
                    caps.arch,
                    resources,
                    now_ms,
                    profile.version,
                    token,
                ],
            )
            .map_err(|e| StoreError::from_unique(e, format!("hostname {}", profile.hostname)))?;
            Ok(RegisterOutcome::Created(reload(conn, id)?))
        }
    }
}

pub(super) fn heartbeat(
    conn: &Connection,
    id: AgentId,
    resources: Option<&Value>,
    now: DateTime<Utc>,
) -> Result<bool, StoreError> {
    let resources = to_opt_json(resources)?;
    let changed = conn.execute(
        "UPDATE agents SET last_heartbeat = ?2, status = 'online',
             resources = COALESCE(?3, resources), updated_at = ?2
         WHERE id = ?1",
        params![id, millis(now), resources],
    )?;
    Ok(changed > 0)
}

pub(super) fn transition(
    conn: &Connection,
    id: AgentId,
    to: AgentStatus,
    now: DateTime<Utc>,
) -> Result<Transition, StoreError> {
    let current: Option<AgentStatus> = conn
        .query_row("SELECT status FROM agents WHERE id = ?1", [id], |row| {
            row.get(0)
        })
        .optional()?;

    match current {
        None => Ok(Transition::NotFound),
        Some(status) if status == to => Ok(Transition::Unchanged(status)),
        Some(_) => {
            let now_ms = millis(now);
            if to == AgentStatus::Online {
                conn.execute(
                    "UPDATE agents SET status = ?2, last_heartbeat = ?3, updated_at = ?3 WHERE id = ?1",
                    params![id, to, now_ms],
                )?;
            } else {
                conn.execute(
                    "UPDATE agents SET status = ?2, updated_at = ?3 WHERE id = ?1",
                    params![id, to, now_ms],
                )?;
            }
            Ok(Transition::Changed(reload(conn, id)?))
        }
    }
}

/// Apply the orphan policy to one agent's RUNNING tasks, then recount its load
fn reclaim_running(
    conn: &Connection,
    agent: AgentId,
    policy: OrphanPolicy,
    reason: &str,
    now: DateTime<Utc>,
    report: &mut ReclaimReport,
) -> Result<(), StoreError> {
    let now_ms = millis(now);
    match policy {
        OrphanPolicy::Keep => return Ok(()),
        OrphanPolicy::Fail => {
            let failed = conn.execute(
                "UPDATE tasks SET status = 'failed', completed_at = ?2, updated_at = ?2,
                     error_message = ?3
                 WHERE agent_id = ?1 AND status = 'running'",
                params![agent, now_ms, reason],
            )?;
            report.failed_tasks += failed as u64;
        }
        OrphanPolicy::Requeue => {
            let requeued = conn.execute(
                "UPDATE tasks SET status = 'pending', agent_id = NULL, started_at = NULL,
                     updated_at = ?2
                 WHERE agent_id = ?1 AND status = 'running'",
                params![agent, now_ms],
            )?;
            report.requeued_tasks += requeued as u64;
        }
    }

    conn.execute(
        "UPDATE agents SET current_tasks =
             (SELECT COUNT(*) FROM tasks WHERE tasks.agent_id = agents.id AND tasks.status = 'running')
         WHERE id = ?1",
        [agent],
    )?;
    Ok(())
}

pub(super) fn sweep(
    conn: &Connection,
    cutoff: DateTime<Utc>,
    policy: OrphanPolicy,
    now: DateTime<Utc>,
) -> Result<ReclaimReport, StoreError> {
    // Operator-stopped agents are already offline but may still hold leases
    let scope = match policy {
        OrphanPolicy::Keep => "status != 'offline'",
        OrphanPolicy::Fail | OrphanPolicy::Requeue => {
            "(status != 'offline' OR EXISTS (SELECT 1 FROM tasks
                 WHERE tasks.agent_id = agents.id AND tasks.status = 'running'))"
        }
    };
    let stale: Vec<(AgentId, String)> = {
        let mut stmt = conn.prepare(&format!(
            "SELECT id, name FROM agents
             WHERE {scope} AND (last_heartbeat IS NULL OR last_heartbeat < ?1)"
        ))?;
        let rows = stmt.query_map([millis(cutoff)], |row| Ok((row.get(0)?, row.get(1)?)))?;
        rows.collect::<Result<_, _>>()?
    };

    let mut report = ReclaimReport::default();
    for (id, name) in stale {
        conn.execute(
            "UPDATE agents SET status = 'offline', updated_at = ?2 WHERE id = ?1",
            params![id, millis(now)],
        )?;
        let reason = format!("agent {name} stopped heartbeating");
        reclaim_running(conn, id, policy, &reason, now, &mut report)?;
        report.agents.push(id);
    }
    Ok(report)
}

pub(super) fn insert(conn: &Connection, agent: &Agent) -> Result<(), StoreError> {
    let caps = &agent.capabilities;
    conn.execute(
        "INSERT INTO agents (id, name, hostname, ip_address, port, status, description, tags,
             max_concurrent_tasks, supported_script_types, k6_version, os, arch, resources,
             last_heartbeat, version, is_enabled, current_tasks, total_tasks_executed,
             created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17,
             ?18, ?19, ?20, ?21)",
        params![
            agent.id,
            agent.name,
            agent.hostname,
            agent.ip_address,
            agent.port,
            agent.status,
            agent.description,
            to_json(&agent.tags)?,
            caps.max_concurrent_tasks,
            to_json(&caps.supported_script_types)?,
            caps.k6_version,
            caps.os,
            caps.arch,
            to_opt_json(agent.resources.as_ref())?,
            agent.last_heartbeat.map(millis),
            agent.version,
            agent.is_enabled,
            agent.current_tasks,
            agent.total_tasks_executed as i64,
            millis(agent.created_at),
            millis(agent.updated_at),
        ],
    )
    .map_err(|e| StoreError::from_unique(e, format!("hostname {}", agent.hostname)))?;
    Ok(())
}

pub(super) fn update(
    conn: &Connection,
    id: AgentId,
    update: &AgentUpdate,
    now: DateTime<Utc>,
) -> Result<Option<Agent>, StoreError> {
    let Some(mut agent) = get(conn, id)? else {
        return Ok(None);
    };

    if let Some(name) = &update.name {
        agent.name = name.clone();
    }
    if let Some(hostname) = &update.hostname {
        agent.hostname = hostname.trim().to_string();
    }
    if let Some(ip) = &update.ip_address {
        agent.ip_address = ip.clone();
    }
    if let Some(port) = update.port {
        agent.port = port;
    }
    if let Some(description) = &update.description {
        agent.description = Some(description.clone());
    }
    if let Some(tags) = &update.tags {
        agent.tags = tags.clone();
    }
    if let Some(caps) = &update.capabilities {
        agent.capabilities = caps.clone();
    }
    if let Some(enabled) = update.is_enabled {
        agent.is_enabled = enabled;
    }

    let caps = &agent.capabilities;
    conn.execute(
        "UPDATE agents SET name = ?2, hostname = ?3, ip_address = ?4, port = ?5,
             description = ?6, tags = ?7, max_concurrent_tasks = ?8,
             supported_script_types = ?9, k6_version = ?10, os = ?11, arch = ?12,
             is_enabled = ?13, updated_at = ?14
         WHERE id = ?1",
        params![
            id,
            agent.name,
            agent.hostname,
            agent.ip_address,
            agent.port,
            agent.description,
            to_json(&agent.tags)?,
            caps.max_concurrent_tasks,
            to_json(&caps.supported_script_types)?,
            caps.k6_version,
            caps.os,
            caps.arch,
            agent.is_enabled,
            millis(now),
        ],
    )
    .map_err(|e| StoreError::from_unique(e, format!("hostname {}", agent.hostname)))?;

    Ok(Some(reload(conn, id)?))
}

pub(super) fn delete(
    conn: &Connection,
    id: AgentId,
    policy: OrphanPolicy,
    now: DateTime<Utc>,
) -> Result<Option<ReclaimReport>, StoreError> {
    let Some(agent) = get(conn, id)? else {
        return Ok(None);
    };

    let unpinned = conn.execute(
        "UPDATE tasks SET agent_id = NULL, updated_at = ?2 WHERE agent_id = ?1 AND status = 'pending'",
        params![id, millis(now)],
    )?;
    let mut report = ReclaimReport {
        unpinned_tasks: unpinned as u64,
        ..Default::default()
    };

    // A removed agent can never report back, so RUNNING work is never kept
    let policy = match policy {
        OrphanPolicy::Keep => OrphanPolicy::Fail,
        other => other,
    };
    let reason = format!("agent {} was removed", agent.name);
    reclaim_running(conn, id, policy, &reason, now, &mut report)?;

    conn.execute("DELETE FROM agents WHERE id = ?1", [id])?;
    report.agents.push(id);
    Ok(Some(report))
}

pub(super) fn list(conn: &Connection, query: &AgentQuery) -> Result<Page<Agent>, StoreError> {
    let mut conditions = Vec::new();
    let mut params: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

    if let Some(status) = query.status {
        conditions.push(format!("status = ?{}", params.len() + 1));
        params.push(Box::new(status));
    }

    if let Some(hostname) = query.hostname.as_deref().filter(|h| !h.is_empty()) {
        conditions.push(format!("hostname LIKE ?{}", params.len() + 1));
        params.push(Box::new(format!("%{}%", hostname)));
    }

    let where_clause = if conditions.is_empty() {
        String::new()
    } else {
        format!("WHERE {}", conditions.join(" AND "))
    };

    let total: i64 = conn.query_row(
        &format!("SELECT COUNT(*) FROM agents {}", where_clause),
        rusqlite::params_from_iter(params.iter()),
        |row| row.get(0),
    )?;

    let limit_idx = params.len() + 1;
    let offset_idx = params.len() + 2;
    params.push(Box::new(query.page.effective_limit()));
    params.push(Box::new(query.page.offset() as i64));

    let sql = format!(
        "SELECT {AGENT_COLUMNS} FROM agents {where_clause}
         ORDER BY created_at DESC, rowid DESC LIMIT ?{limit_idx} OFFSET ?{offset_idx}"
    );
    let mut stmt = conn.prepare(&sql)?;
    let agents = stmt
        .query_map(rusqlite::params_from_iter(params.iter()), rows::agent)?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Page::new(agents, total.max(0) as u64, query.page))
}

fn grouped_counts(conn: &Connection, column: &str) -> Result<BTreeMap<String, u64>, StoreError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT COALESCE({column}, 'unknown'), COUNT(*) FROM agents GROUP BY 1"
    ))?;
    let rows = stmt.query_map([], |row| {
        let count: i64 = row.get(1)?;
        Ok((row.get::<_, String>(0)?, count.max(0) as u64))
    })?;
    Ok(rows.collect::<Result<_, _>>()?)
}

pub(super) fn statistics(conn: &Connection) -> Result<AgentStatistics, StoreError> {
    let mut stats = AgentStatistics::default();

    {
        let mut stmt = conn.prepare("SELECT status, COUNT(*) FROM agents GROUP BY status")?;
        let rows = stmt.query_map([], |row| {
            let count: i64 = row.get(1)?;
            Ok((row.get::<_, AgentStatus>(0)?, count.max(0) as u64))
        })?;
        for row in rows {
            let (status, count) = row?;
            stats.total += count;
            match status {
                AgentStatus::Online => stats.online = count,
                AgentStatus::Offline => stats.offline = count,
                AgentStatus::Busy => stats.busy = count,
                AgentStatus::Error => stats.error = count,
            }
        }
    }

    let executed: i64 = conn.query_row(
        "SELECT COALESCE(SUM(total_tasks_executed), 0) FROM agents",
        [],
        |row| row.get(0),
    )?;
    stats.total_tasks_executed = executed.max(0) as u64;
    stats.by_os = grouped_counts(conn, "os")?;
    stats.by_arch = grouped_counts(conn, "arch")?;

    Ok(stats)
}
