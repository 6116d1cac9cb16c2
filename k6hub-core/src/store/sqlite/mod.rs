//! SQLite-backed fleet store

mod agents;
mod rows;
mod scripts;
mod tasks;

use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use rusqlite::{Connection, TransactionBehavior};
use serde_json::Value;

use super::migrations::Migrator;
use super::{
    CancelOutcome, ClaimOutcome, EditOutcome, FleetStore, ReclaimReport, RegisterOutcome,
    ReportOutcome, StoreError, TokenCheck, Transition,
};
use crate::agent::{Agent, AgentProfile, AgentQuery, AgentStatistics, AgentStatus, AgentUpdate};
use crate::dispatch::OrphanPolicy;
use crate::ids::{AgentId, ScriptId, TaskId};
use crate::page::Page;
use crate::script::Script;
use crate::task::{ReportedStatus, Task, TaskQuery, TaskStatistics, TaskUpdate, Visibility};

/// How long a writer waits for another connection's lock
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// SQLite-backed fleet store
pub struct SqliteFleetStore {
    conn: Mutex<Connection>,
}

impl SqliteFleetStore {
    /// Open or create database at path
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        Self::init(Connection::open(path)?)
    }

    /// Open in-memory database (for testing)
    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, StoreError> {
        conn.busy_timeout(BUSY_TIMEOUT)?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        Migrator::new(&conn).migrate()?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn.lock().map_err(|_| StoreError::LockPoisoned)
    }

    fn read<T>(
        &self,
        f: impl FnOnce(&Connection) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        let conn = self.lock()?;
        f(&conn)
    }

    /// Run `f` in an IMMEDIATE transaction; any error rolls it back
    fn write<T>(
        &self,
        f: impl FnOnce(&Connection) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        let mut conn = self.lock()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let out = f(&*tx)?;
        tx.commit()?;
        Ok(out)
    }
}

impl FleetStore for SqliteFleetStore {
    fn register_agent(
        &self,
        profile: &AgentProfile,
        token: &str,
        check: TokenCheck<'_>,
        now: DateTime<Utc>,
    ) -> Result<RegisterOutcome, StoreError> {
        self.write(|conn| agents::register(conn, profile, token, check, now))
    }

    fn get_agent(&self, id: AgentId) -> Result<Option<Agent>, StoreError> {
        self.read(|conn| agents::get(conn, id))
    }

    fn agent_token(&self, id: AgentId) -> Result<Option<String>, StoreError> {
        self.read(|conn| agents::token(conn, id))
    }

    fn record_heartbeat(
        &self,
        id: AgentId,
        resources: Option<&Value>,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        self.write(|conn| agents::heartbeat(conn, id, resources, now))
    }

    fn transition_agent(
        &self,
        id: AgentId,
        to: AgentStatus,
        now: DateTime<Utc>,
    ) -> Result<Transition, StoreError> {
        self.write(|conn| agents::transition(conn, id, to, now))
    }

    fn sweep_stale_agents(
        &self,
        cutoff: DateTime<Utc>,
        policy: OrphanPolicy,
        now: DateTime<Utc>,
    ) -> Result<ReclaimReport, StoreError> {
        self.write(|conn| agents::sweep(conn, cutoff, policy, now))
    }

    fn insert_agent(&self, agent: &Agent) -> Result<(), StoreError> {
        self.write(|conn| agents::insert(conn, agent))
    }

    fn update_agent(
        &self,
        id: AgentId,
        update: &AgentUpdate,
        now: DateTime<Utc>,
    ) -> Result<Option<Agent>, StoreError> {
        self.write(|conn| agents::update(conn, id, update, now))
    }

    fn delete_agent(
        &self,
        id: AgentId,
        policy: OrphanPolicy,
        now: DateTime<Utc>,
    ) -> Result<Option<ReclaimReport>, StoreError> {
        self.write(|conn| agents::delete(conn, id, policy, now))
    }

    fn list_agents(&self, query: &AgentQuery) -> Result<Page<Agent>, StoreError> {
        self.read(|conn| agents::list(conn, query))
    }

    fn agent_statistics(&self) -> Result<AgentStatistics, StoreError> {
        self.read(agents::statistics)
    }

    fn tasks_for_agent(&self, id: AgentId) -> Result<Vec<Task>, StoreError> {
        self.read(|conn| tasks::for_agent(conn, id))
    }

    fn claim_tasks(
        &self,
        agent: AgentId,
        batch: u32,
        now: DateTime<Utc>,
    ) -> Result<ClaimOutcome, StoreError> {
        self.write(|conn| tasks::claim(conn, agent, batch, now))
    }

    fn apply_report(
        &self,
        task: TaskId,
        reporter: &str,
        status: ReportedStatus,
        result: Option<&Value>,
        error: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<ReportOutcome, StoreError> {
        self.write(|conn| tasks::report(conn, task, reporter, status, result, error, now))
    }

    fn insert_script(&self, script: &Script) -> Result<(), StoreError> {
        self.write(|conn| scripts::insert(conn, script))
    }

    fn get_script(&self, id: ScriptId) -> Result<Option<Script>, StoreError> {
        self.read(|conn| scripts::get(conn, id))
    }

    fn list_scripts(&self) -> Result<Vec<Script>, StoreError> {
        self.read(scripts::list)
    }

    fn insert_task(&self, task: &Task) -> Result<(), StoreError> {
        self.write(|conn| tasks::insert(conn, task))
    }

    fn get_task(&self, id: TaskId) -> Result<Option<Task>, StoreError> {
        self.read(|conn| tasks::get(conn, id))
    }

    fn list_tasks(&self, query: &TaskQuery) -> Result<Page<Task>, StoreError> {
        self.read(|conn| tasks::list(conn, query))
    }

    fn task_statistics(&self, visibility: &Visibility) -> Result<TaskStatistics, StoreError> {
        self.read(|conn| tasks::statistics(conn, visibility))
    }

    fn cancel_task(&self, id: TaskId, now: DateTime<Utc>) -> Result<CancelOutcome, StoreError> {
        self.write(|conn| tasks::cancel(conn, id, now))
    }

    fn update_task(
        &self,
        id: TaskId,
        update: &TaskUpdate,
        now: DateTime<Utc>,
    ) -> Result<EditOutcome, StoreError> {
        self.write(|conn| tasks::update(conn, id, update, now))
    }

    fn delete_task(&self, id: TaskId, now: DateTime<Utc>) -> Result<Option<Task>, StoreError> {
        self.write(|conn| tasks::delete(conn, id, now))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::{AgentCapabilities, AgentDescriptor};
    use crate::page::PageRequest;
    use crate::store::PollSkip;
    use crate::task::{TaskConfig, TaskStatus, TriggerType};
    use chrono::Duration as ChronoDuration;

    fn profile(hostname: &str, capacity: u32) -> AgentProfile {
        AgentDescriptor {
            hostname: hostname.to_string(),
            max_concurrent_tasks: Some(capacity),
            os: Some("linux".into()),
            arch: Some("amd64".into()),
            ..Default::default()
        }
        .into_profile(1)
    }

    fn register(store: &SqliteFleetStore, hostname: &str, capacity: u32) -> Agent {
        match store
            .register_agent(&profile(hostname, capacity), "tok", TokenCheck::Open, Utc::now())
            .unwrap()
        {
            RegisterOutcome::Created(agent) | RegisterOutcome::Updated(agent) => agent,
            RegisterOutcome::Rejected => panic!("registration rejected"),
        }
    }

    fn seed_script(store: &SqliteFleetStore) -> ScriptId {
        let now = Utc::now();
        let script = Script {
            id: ScriptId::new(),
            name: "smoke".into(),
            description: None,
            content: "export default function () {}".into(),
            script_type: "k6".into(),
            author_id: "admin".into(),
            created_at: now,
            updated_at: now,
        };
        store.insert_script(&script).unwrap();
        script.id
    }

    /// Tasks are created `order` milliseconds apart so FIFO order is stable
    fn seed_task(
        store: &SqliteFleetStore,
        script: ScriptId,
        pin: Option<AgentId>,
        order: i64,
    ) -> TaskId {
        let created = DateTime::from_timestamp_millis(1_700_000_000_000 + order).unwrap();
        let task = Task {
            id: TaskId::new(),
            name: format!("task-{order}"),
            description: None,
            status: TaskStatus::Pending,
            trigger_type: TriggerType::Manual,
            cron_expression: None,
            config: TaskConfig::new(1, "10s"),
            is_enabled: true,
            script_id: script,
            agent_id: pin,
            creator_id: "alice".into(),
            started_at: None,
            completed_at: None,
            error_message: None,
            result: None,
            created_at: created,
            updated_at: created,
        };
        store.insert_task(&task).unwrap();
        task.id
    }

    fn claim(store: &SqliteFleetStore, agent: AgentId, batch: u32) -> Vec<TaskId> {
        match store.claim_tasks(agent, batch, Utc::now()).unwrap() {
            ClaimOutcome::Claimed { jobs, .. } => jobs.into_iter().map(|j| j.id).collect(),
            other => panic!("expected claim, got {other:?}"),
        }
    }

    fn assert_counter_matches(store: &SqliteFleetStore, agent: AgentId) {
        let running = store
            .tasks_for_agent(agent)
            .unwrap()
            .into_iter()
            .filter(|t| t.status == TaskStatus::Running)
            .count() as u32;
        let stored = store.get_agent(agent).unwrap().unwrap().current_tasks;
        assert_eq!(stored, running, "current_tasks drifted from RUNNING count");
    }

    #[test]
    fn test_register_twice_keeps_one_row() {
        let store = SqliteFleetStore::open_in_memory().unwrap();

        let first = register(&store, "h1", 1);
        let second = register(&store, "h1", 4);

        assert_eq!(first.id, second.id);
        assert_eq!(second.capabilities.max_concurrent_tasks, 4);
        assert_eq!(second.status, AgentStatus::Online);
        assert_eq!(store.list_agents(&AgentQuery::default()).unwrap().total, 1);
    }

    #[test]
    fn test_register_with_required_token() {
        let store = SqliteFleetStore::open_in_memory().unwrap();
        let now = Utc::now();
        store
            .register_agent(&profile("h1", 1), "first", TokenCheck::Open, now)
            .unwrap();

        let wrong = store
            .register_agent(&profile("h1", 1), "second", TokenCheck::Require(Some("nope")), now)
            .unwrap();
        assert!(matches!(wrong, RegisterOutcome::Rejected));

        let missing = store
            .register_agent(&profile("h1", 1), "second", TokenCheck::Require(None), now)
            .unwrap();
        assert!(matches!(missing, RegisterOutcome::Rejected));

        let right = store
            .register_agent(&profile("h1", 1), "second", TokenCheck::Require(Some("first")), now)
            .unwrap();
        let RegisterOutcome::Updated(agent) = right else {
            panic!("expected update");
        };
        assert_eq!(store.agent_token(agent.id).unwrap().as_deref(), Some("second"));
    }

    #[test]
    fn test_heartbeat_unknown_agent() {
        let store = SqliteFleetStore::open_in_memory().unwrap();
        assert!(!store.record_heartbeat(AgentId::new(), None, Utc::now()).unwrap());
    }

    #[test]
    fn test_heartbeat_overwrites_resources_and_revives() {
        let store = SqliteFleetStore::open_in_memory().unwrap();
        let agent = register(&store, "h1", 1);
        store
            .transition_agent(agent.id, AgentStatus::Offline, Utc::now())
            .unwrap();

        let resources = serde_json::json!({"cpu": 12.5});
        assert!(store.record_heartbeat(agent.id, Some(&resources), Utc::now()).unwrap());

        let agent = store.get_agent(agent.id).unwrap().unwrap();
        assert_eq!(agent.status, AgentStatus::Online);
        assert_eq!(agent.resources, Some(resources));
    }

    #[test]
    fn test_transition_reports_unchanged() {
        let store = SqliteFleetStore::open_in_memory().unwrap();
        let agent = register(&store, "h1", 1);

        let again = store
            .transition_agent(agent.id, AgentStatus::Online, Utc::now())
            .unwrap();
        assert!(matches!(again, Transition::Unchanged(AgentStatus::Online)));

        let missing = store
            .transition_agent(AgentId::new(), AgentStatus::Online, Utc::now())
            .unwrap();
        assert!(matches!(missing, Transition::NotFound));
    }

    #[test]
    fn test_claim_is_fifo_and_capped() {
        let store = SqliteFleetStore::open_in_memory().unwrap();
        let agent = register(&store, "h1", 10);
        let script = seed_script(&store);
        let ids: Vec<TaskId> = (0..7).map(|i| seed_task(&store, script, None, i)).collect();

        let ClaimOutcome::Claimed { jobs, has_more } =
            store.claim_tasks(agent.id, 5, Utc::now()).unwrap()
        else {
            panic!("expected claim");
        };

        let leased: Vec<TaskId> = jobs.iter().map(|j| j.id).collect();
        assert_eq!(leased, ids[..5].to_vec());
        assert!(has_more);
        assert_eq!(jobs[0].script.content, "export default function () {}");
        assert_counter_matches(&store, agent.id);
    }

    #[test]
    fn test_claim_respects_remaining_capacity() {
        let store = SqliteFleetStore::open_in_memory().unwrap();
        let agent = register(&store, "h1", 2);
        let script = seed_script(&store);
        for i in 0..4 {
            seed_task(&store, script, None, i);
        }

        assert_eq!(claim(&store, agent.id, 5).len(), 2);
        let outcome = store.claim_tasks(agent.id, 5, Utc::now()).unwrap();
        assert!(matches!(outcome, ClaimOutcome::Skipped(PollSkip::AtCapacity)));
        assert_counter_matches(&store, agent.id);
    }

    #[test]
    fn test_claim_honors_pins() {
        let store = SqliteFleetStore::open_in_memory().unwrap();
        let x = register(&store, "x", 5);
        let y = register(&store, "y", 5);
        let script = seed_script(&store);
        let pinned = seed_task(&store, script, Some(x.id), 0);

        assert!(claim(&store, y.id, 5).is_empty());
        assert_eq!(claim(&store, x.id, 5), vec![pinned]);
    }

    #[test]
    fn test_claim_skips_disabled_and_offline() {
        let store = SqliteFleetStore::open_in_memory().unwrap();
        let agent = register(&store, "h1", 1);
        let script = seed_script(&store);
        seed_task(&store, script, None, 0);

        let disable = AgentUpdate {
            is_enabled: Some(false),
            ..Default::default()
        };
        store.update_agent(agent.id, &disable, Utc::now()).unwrap();
        assert!(matches!(
            store.claim_tasks(agent.id, 5, Utc::now()).unwrap(),
            ClaimOutcome::Skipped(PollSkip::Disabled)
        ));

        let enable = AgentUpdate {
            is_enabled: Some(true),
            ..Default::default()
        };
        store.update_agent(agent.id, &enable, Utc::now()).unwrap();
        store
            .transition_agent(agent.id, AgentStatus::Offline, Utc::now())
            .unwrap();
        assert!(matches!(
            store.claim_tasks(agent.id, 5, Utc::now()).unwrap(),
            ClaimOutcome::Skipped(PollSkip::NotOnline)
        ));

        assert!(matches!(
            store.claim_tasks(AgentId::new(), 5, Utc::now()).unwrap(),
            ClaimOutcome::AgentNotFound
        ));
    }

    #[test]
    fn test_report_completion_releases_capacity_once() {
        let store = SqliteFleetStore::open_in_memory().unwrap();
        let agent = register(&store, "h1", 1);
        let script = seed_script(&store);
        let task = seed_task(&store, script, None, 0);
        claim(&store, agent.id, 5);

        let result = serde_json::json!({"http_reqs": 100});
        let outcome = store
            .apply_report(task, "h1", ReportedStatus::Completed, Some(&result), None, Utc::now())
            .unwrap();
        let ReportOutcome::Applied(done) = outcome else {
            panic!("expected applied");
        };
        assert_eq!(done.status, TaskStatus::Completed);
        assert!(done.completed_at.is_some());
        assert_eq!(done.result, Some(result));

        let duplicate = store
            .apply_report(task, "h1", ReportedStatus::Completed, None, None, Utc::now())
            .unwrap();
        assert!(matches!(duplicate, ReportOutcome::Unchanged(_)));

        let agent = store.get_agent(agent.id).unwrap().unwrap();
        assert_eq!(agent.current_tasks, 0);
        assert_eq!(agent.total_tasks_executed, 1);
    }

    #[test]
    fn test_report_from_wrong_agent_changes_nothing() {
        let store = SqliteFleetStore::open_in_memory().unwrap();
        let agent = register(&store, "h1", 1);
        register(&store, "h2", 1);
        let script = seed_script(&store);
        let task = seed_task(&store, script, None, 0);
        claim(&store, agent.id, 5);

        let outcome = store
            .apply_report(task, "h2", ReportedStatus::Failed, None, Some("boom"), Utc::now())
            .unwrap();
        assert!(matches!(outcome, ReportOutcome::NotBound));

        let task = store.get_task(task).unwrap().unwrap();
        assert_eq!(task.status, TaskStatus::Running);
        assert!(task.error_message.is_none());
        assert_eq!(store.get_agent(agent.id).unwrap().unwrap().current_tasks, 1);
    }

    #[test]
    fn test_report_accepts_agent_id_as_reporter() {
        let store = SqliteFleetStore::open_in_memory().unwrap();
        let agent = register(&store, "h1", 1);
        let script = seed_script(&store);
        let task = seed_task(&store, script, None, 0);
        claim(&store, agent.id, 5);

        let outcome = store
            .apply_report(
                task,
                &agent.id.to_string(),
                ReportedStatus::Failed,
                None,
                Some("threshold crossed"),
                Utc::now(),
            )
            .unwrap();
        let ReportOutcome::Applied(task) = outcome else {
            panic!("expected applied");
        };
        assert_eq!(task.status, TaskStatus::Failed);
        assert_eq!(task.error_message.as_deref(), Some("threshold crossed"));
    }

    #[test]
    fn test_report_on_pending_pinned_task_is_not_leased() {
        let store = SqliteFleetStore::open_in_memory().unwrap();
        let agent = register(&store, "h1", 1);
        let script = seed_script(&store);
        let task = seed_task(&store, script, Some(agent.id), 0);

        let outcome = store
            .apply_report(task, "h1", ReportedStatus::Completed, None, None, Utc::now())
            .unwrap();
        assert!(matches!(outcome, ReportOutcome::NotLeased(TaskStatus::Pending)));
    }

    #[test]
    fn test_agent_cancel_releases_without_counting() {
        let store = SqliteFleetStore::open_in_memory().unwrap();
        let agent = register(&store, "h1", 1);
        let script = seed_script(&store);
        let task = seed_task(&store, script, None, 0);
        claim(&store, agent.id, 5);

        store
            .apply_report(task, "h1", ReportedStatus::Cancelled, None, None, Utc::now())
            .unwrap();

        let agent = store.get_agent(agent.id).unwrap().unwrap();
        assert_eq!(agent.current_tasks, 0);
        assert_eq!(agent.total_tasks_executed, 0);
    }

    #[test]
    fn test_cancel_running_task_decrements_agent() {
        let store = SqliteFleetStore::open_in_memory().unwrap();
        let agent = register(&store, "h1", 1);
        let script = seed_script(&store);
        let task = seed_task(&store, script, None, 0);
        claim(&store, agent.id, 5);

        let outcome = store.cancel_task(task, Utc::now()).unwrap();
        assert!(matches!(outcome, CancelOutcome::Cancelled(ref t) if t.status == TaskStatus::Cancelled));
        assert_counter_matches(&store, agent.id);

        let again = store.cancel_task(task, Utc::now()).unwrap();
        assert!(matches!(again, CancelOutcome::AlreadyFinished(TaskStatus::Cancelled)));
    }

    #[test]
    fn test_update_task_only_while_pending() {
        let store = SqliteFleetStore::open_in_memory().unwrap();
        let agent = register(&store, "h1", 1);
        let script = seed_script(&store);
        let task = seed_task(&store, script, None, 0);

        let update = TaskUpdate {
            name: Some(" nightly ".into()),
            agent_id: Some(agent.id),
            cron_expression: Some("0 2 * * *".into()),
            trigger_type: Some(TriggerType::Scheduled),
            ..Default::default()
        };
        let EditOutcome::Updated(edited) = store.update_task(task, &update, Utc::now()).unwrap()
        else {
            panic!("pending task should be editable");
        };
        assert_eq!(edited.name, "nightly");
        assert_eq!(edited.agent_id, Some(agent.id));
        assert_eq!(edited.cron_expression.as_deref(), Some("0 2 * * *"));
        assert_eq!(edited.trigger_type, TriggerType::Scheduled);
        assert_eq!(edited.config, TaskConfig::new(1, "10s"));

        claim(&store, agent.id, 5);
        assert!(matches!(
            store.update_task(task, &update, Utc::now()).unwrap(),
            EditOutcome::NotPending(TaskStatus::Running)
        ));
        assert!(matches!(
            store.update_task(TaskId::new(), &update, Utc::now()).unwrap(),
            EditOutcome::NotFound
        ));
    }

    #[test]
    fn test_delete_running_task_releases_slot() {
        let store = SqliteFleetStore::open_in_memory().unwrap();
        let agent = register(&store, "h1", 2);
        let script = seed_script(&store);
        let running = seed_task(&store, script, None, 0);
        claim(&store, agent.id, 1);
        let pending = seed_task(&store, script, None, 1);

        let removed = store.delete_task(running, Utc::now()).unwrap().unwrap();
        assert_eq!(removed.status, TaskStatus::Running);
        assert!(store.get_task(running).unwrap().is_none());
        assert_eq!(store.get_agent(agent.id).unwrap().unwrap().current_tasks, 0);
        assert_counter_matches(&store, agent.id);

        store.delete_task(pending, Utc::now()).unwrap().unwrap();
        assert!(store.delete_task(pending, Utc::now()).unwrap().is_none());
        assert_eq!(store.get_agent(agent.id).unwrap().unwrap().current_tasks, 0);
    }

    #[test]
    fn test_sweep_threshold_boundaries() {
        let store = SqliteFleetStore::open_in_memory().unwrap();
        let now = Utc::now();
        let threshold = ChronoDuration::seconds(60);

        let stale = register(&store, "stale", 1);
        let fresh = register(&store, "fresh", 1);
        store
            .record_heartbeat(stale.id, None, now - threshold - ChronoDuration::seconds(1))
            .unwrap();
        store
            .record_heartbeat(fresh.id, None, now - threshold + ChronoDuration::seconds(1))
            .unwrap();

        let report = store
            .sweep_stale_agents(now - threshold, OrphanPolicy::Keep, now)
            .unwrap();

        assert_eq!(report.agents, vec![stale.id]);
        assert_eq!(store.get_agent(stale.id).unwrap().unwrap().status, AgentStatus::Offline);
        assert_eq!(store.get_agent(fresh.id).unwrap().unwrap().status, AgentStatus::Online);
    }

    fn stale_agent_with_running_task(store: &SqliteFleetStore) -> (Agent, TaskId) {
        let agent = register(store, "h1", 2);
        let script = seed_script(store);
        let task = seed_task(store, script, None, 0);
        claim(store, agent.id, 5);
        let long_ago = Utc::now() - ChronoDuration::minutes(10);
        store.record_heartbeat(agent.id, None, long_ago).unwrap();
        (agent, task)
    }

    #[test]
    fn test_sweep_fail_policy_fails_orphans() {
        let store = SqliteFleetStore::open_in_memory().unwrap();
        let (agent, task) = stale_agent_with_running_task(&store);
        let now = Utc::now();

        let report = store
            .sweep_stale_agents(now - ChronoDuration::seconds(60), OrphanPolicy::Fail, now)
            .unwrap();
        assert_eq!(report.failed_tasks, 1);

        let task = store.get_task(task).unwrap().unwrap();
        assert_eq!(task.status, TaskStatus::Failed);
        assert_eq!(task.error_message.as_deref(), Some("agent h1 stopped heartbeating"));
        assert_counter_matches(&store, agent.id);
    }

    #[test]
    fn test_sweep_reaches_stopped_agent_holding_leases() {
        let store = SqliteFleetStore::open_in_memory().unwrap();
        let (agent, task) = stale_agent_with_running_task(&store);
        let idle = register(&store, "idle", 1);
        store
            .transition_agent(agent.id, AgentStatus::Offline, Utc::now())
            .unwrap();
        store
            .transition_agent(idle.id, AgentStatus::Offline, Utc::now())
            .unwrap();
        let now = Utc::now() + ChronoDuration::hours(1);

        let report = store
            .sweep_stale_agents(now - ChronoDuration::seconds(60), OrphanPolicy::Fail, now)
            .unwrap();
        assert_eq!(report.agents, vec![agent.id]);
        assert_eq!(report.failed_tasks, 1);
        assert_eq!(store.get_task(task).unwrap().unwrap().status, TaskStatus::Failed);
        assert_counter_matches(&store, agent.id);

        let kept = store
            .sweep_stale_agents(now - ChronoDuration::seconds(60), OrphanPolicy::Keep, now)
            .unwrap();
        assert!(kept.agents.is_empty());
    }

    #[test]
    fn test_sweep_requeue_policy_returns_orphans_to_pool() {
        let store = SqliteFleetStore::open_in_memory().unwrap();
        let (agent, task) = stale_agent_with_running_task(&store);
        let now = Utc::now();

        let report = store
            .sweep_stale_agents(now - ChronoDuration::seconds(60), OrphanPolicy::Requeue, now)
            .unwrap();
        assert_eq!(report.requeued_tasks, 1);

        let task = store.get_task(task).unwrap().unwrap();
        assert_eq!(task.status, TaskStatus::Pending);
        assert!(task.agent_id.is_none());
        assert!(task.started_at.is_none());
        assert_eq!(store.get_agent(agent.id).unwrap().unwrap().current_tasks, 0);
    }

    #[test]
    fn test_sweep_keep_policy_leaves_tasks() {
        let store = SqliteFleetStore::open_in_memory().unwrap();
        let (agent, task) = stale_agent_with_running_task(&store);
        let now = Utc::now();

        store
            .sweep_stale_agents(now - ChronoDuration::seconds(60), OrphanPolicy::Keep, now)
            .unwrap();

        assert_eq!(store.get_task(task).unwrap().unwrap().status, TaskStatus::Running);
        assert_counter_matches(&store, agent.id);
    }

    #[test]
    fn test_delete_agent_unpins_and_fails_running() {
        let store = SqliteFleetStore::open_in_memory().unwrap();
        let agent = register(&store, "h1", 1);
        let script = seed_script(&store);
        let running = seed_task(&store, script, None, 0);
        claim(&store, agent.id, 5);
        let pinned = seed_task(&store, script, Some(agent.id), 1);

        let report = store
            .delete_agent(agent.id, OrphanPolicy::Keep, Utc::now())
            .unwrap()
            .unwrap();
        assert_eq!(report.unpinned_tasks, 1);
        assert_eq!(report.failed_tasks, 1);

        assert!(store.get_agent(agent.id).unwrap().is_none());
        assert_eq!(store.get_task(running).unwrap().unwrap().status, TaskStatus::Failed);
        let pinned = store.get_task(pinned).unwrap().unwrap();
        assert_eq!(pinned.status, TaskStatus::Pending);
        assert!(pinned.agent_id.is_none());

        assert!(store
            .delete_agent(agent.id, OrphanPolicy::Fail, Utc::now())
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_insert_agent_duplicate_hostname() {
        let store = SqliteFleetStore::open_in_memory().unwrap();
        let existing = register(&store, "h1", 1);

        let mut clone = existing.clone();
        clone.id = AgentId::new();
        let err = store.insert_agent(&clone).unwrap_err();
        assert!(matches!(err, StoreError::Duplicate(_)));
    }

    #[test]
    fn test_list_agents_filters_and_pages() {
        let store = SqliteFleetStore::open_in_memory().unwrap();
        for host in ["load-a", "load-b", "db-c"] {
            register(&store, host, 1);
        }
        let c = store
            .list_agents(&AgentQuery::default())
            .unwrap()
            .data
            .into_iter()
            .find(|a| a.hostname == "db-c")
            .unwrap();
        store.transition_agent(c.id, AgentStatus::Offline, Utc::now()).unwrap();

        let by_host = store
            .list_agents(&AgentQuery {
                hostname: Some("load".into()),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(by_host.total, 2);

        let offline = store
            .list_agents(&AgentQuery {
                status: Some(AgentStatus::Offline),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(offline.data.len(), 1);
        assert_eq!(offline.data[0].hostname, "db-c");

        let paged = store
            .list_agents(&AgentQuery {
                page: PageRequest::new(2, 2),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(paged.total, 3);
        assert_eq!(paged.total_pages, 2);
        assert_eq!(paged.data.len(), 1);
    }

    #[test]
    fn test_agent_statistics() {
        let store = SqliteFleetStore::open_in_memory().unwrap();
        let a = register(&store, "a", 1);
        register(&store, "b", 1);
        store.transition_agent(a.id, AgentStatus::Offline, Utc::now()).unwrap();

        let stats = store.agent_statistics().unwrap();
        assert_eq!(stats.total, 2);
        assert_eq!(stats.online, 1);
        assert_eq!(stats.offline, 1);
        assert_eq!(stats.by_os.get("linux"), Some(&2));
        assert_eq!(stats.by_arch.get("amd64"), Some(&2));
    }

    #[test]
    fn test_update_agent_capabilities() {
        let store = SqliteFleetStore::open_in_memory().unwrap();
        let agent = register(&store, "h1", 1);

        let update = AgentUpdate {
            description: Some("rack 4".into()),
            capabilities: Some(AgentCapabilities::with_capacity(8)),
            ..Default::default()
        };
        let updated = store.update_agent(agent.id, &update, Utc::now()).unwrap().unwrap();
        assert_eq!(updated.description.as_deref(), Some("rack 4"));
        assert_eq!(updated.capabilities.max_concurrent_tasks, 8);

        assert!(store
            .update_agent(AgentId::new(), &update, Utc::now())
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_task_visibility_and_statistics() {
        let store = SqliteFleetStore::open_in_memory().unwrap();
        let script = seed_script(&store);
        seed_task(&store, script, None, 0);
        let mut other = store.get_task(seed_task(&store, script, None, 1)).unwrap().unwrap();
        other.id = TaskId::new();
        other.creator_id = "bob".into();
        store.insert_task(&other).unwrap();

        let all = store.task_statistics(&Visibility::All).unwrap();
        assert_eq!(all.total, 3);
        assert_eq!(all.pending, 3);

        let bobs = store
            .list_tasks(&TaskQuery {
                visibility: Visibility::CreatedBy("bob".into()),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(bobs.total, 1);
        assert_eq!(bobs.data[0].creator_id, "bob");
    }

    #[test]
    fn test_open_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fleet.db");
        {
            let store = SqliteFleetStore::open(&path).unwrap();
            register(&store, "h1", 1);
        }
        let store = SqliteFleetStore::open(&path).unwrap();
        assert_eq!(store.agent_statistics().unwrap().total, 1);
    }
}
