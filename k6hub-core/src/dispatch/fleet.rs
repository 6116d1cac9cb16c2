//! Administrative operations on agents, scripts and tasks

use chrono::Utc;
use tracing::{info, instrument};

use super::DispatchService;
use crate::agent::{
    Agent, AgentCapabilities, AgentQuery, AgentStatistics, AgentStatus, AgentUpdate,
    DEFAULT_AGENT_PORT, NewAgent,
};
use crate::auth::Operator;
use crate::error::DispatchError;
use crate::ids::{AgentId, ScriptId, TaskId};
use crate::page::Page;
use crate::script::{DEFAULT_SCRIPT_TYPE, NewScript, Script};
use crate::store::{CancelOutcome, EditOutcome, ReclaimReport, StoreError};
use crate::task::{NewTask, Task, TaskQuery, TaskStatistics, TaskStatus, TaskUpdate};

fn conflict_on_duplicate(err: StoreError) -> DispatchError {
    match err {
        StoreError::Duplicate(what) => DispatchError::Conflict(format!("{what} already exists")),
        other => DispatchError::Store(other),
    }
}

fn require(field: &str, value: &str) -> Result<(), DispatchError> {
    if value.trim().is_empty() {
        return Err(DispatchError::Validation(format!("{field} is required")));
    }
    Ok(())
}

impl DispatchService {
    // ---- agents ----

    /// Pre-create an agent record. It stays offline until it registers.
    #[instrument(name = "agent::create", skip_all, fields(hostname = %new.hostname))]
    pub fn create_agent(&self, new: NewAgent) -> Result<Agent, DispatchError> {
        require("name", &new.name)?;
        require("hostname", &new.hostname)?;

        let now = Utc::now();
        let capabilities = new.capabilities.unwrap_or_else(|| {
            AgentCapabilities::with_capacity(self.config.default_max_concurrent_tasks)
        });
        if capabilities.max_concurrent_tasks == 0 {
            return Err(DispatchError::Validation(
                "maxConcurrentTasks must be at least 1".to_string(),
            ));
        }

        let agent = Agent {
            id: AgentId::new(),
            name: new.name.trim().to_string(),
            hostname: new.hostname.trim().to_string(),
            ip_address: new.ip_address,
            port: new.port.unwrap_or(DEFAULT_AGENT_PORT),
            status: AgentStatus::Offline,
            description: new.description,
            tags: new.tags,
            capabilities,
            resources: None,
            last_heartbeat: None,
            version: None,
            is_enabled: new.is_enabled.unwrap_or(true),
            current_tasks: 0,
            total_tasks_executed: 0,
            created_at: now,
            updated_at: now,
        };
        self.store
            .insert_agent(&agent)
            .map_err(conflict_on_duplicate)?;
        info!(agent_id = %agent.id, "Agent created");
        Ok(agent)
    }

    pub fn get_agent(&self, id: AgentId) -> Result<Agent, DispatchError> {
        self.store
            .get_agent(id)?
            .ok_or_else(|| DispatchError::AgentNotFound(id.to_string()))
    }

    pub fn list_agents(&self, query: &AgentQuery) -> Result<Page<Agent>, DispatchError> {
        Ok(self.store.list_agents(query)?)
    }

    /// Apply a partial update. Status and counters are not editable here.
    #[instrument(name = "agent::update", skip(self, update))]
    pub fn update_agent(&self, id: AgentId, update: AgentUpdate) -> Result<Agent, DispatchError> {
        if let Some(hostname) = &update.hostname {
            require("hostname", hostname)?;
        }
        if let Some(caps) = &update.capabilities
            && caps.max_concurrent_tasks == 0
        {
            return Err(DispatchError::Validation(
                "maxConcurrentTasks must be at least 1".to_string(),
            ));
        }
        if update.is_empty() {
            return self.get_agent(id);
        }

        self.store
            .update_agent(id, &update, Utc::now())
            .map_err(conflict_on_duplicate)?
            .ok_or_else(|| DispatchError::AgentNotFound(id.to_string()))
    }

    /// Delete an agent. Its pinned pending tasks become unpinned and its
    /// running tasks are reclaimed per the orphan policy.
    #[instrument(name = "agent::remove", skip(self))]
    pub fn remove_agent(&self, id: AgentId) -> Result<ReclaimReport, DispatchError> {
        let report = self
            .store
            .delete_agent(id, self.config.orphan_policy, Utc::now())?
            .ok_or_else(|| DispatchError::AgentNotFound(id.to_string()))?;
        info!(
            agent_id = %id,
            unpinned = report.unpinned_tasks,
            failed = report.failed_tasks,
            requeued = report.requeued_tasks,
            "Agent removed"
        );
        Ok(report)
    }

    pub fn agent_statistics(&self) -> Result<AgentStatistics, DispatchError> {
        Ok(self.store.agent_statistics()?)
    }

    /// Running and pinned pending tasks of one agent
    pub fn agent_tasks(&self, id: AgentId) -> Result<Vec<Task>, DispatchError> {
        self.get_agent(id)?;
        Ok(self.store.tasks_for_agent(id)?)
    }

    // ---- scripts ----

    pub fn create_script(&self, new: NewScript, author: &Operator) -> Result<Script, DispatchError> {
        require("name", &new.name)?;
        require("content", &new.content)?;

        let now = Utc::now();
        let script = Script {
            id: ScriptId::new(),
            name: new.name.trim().to_string(),
            description: new.description,
            content: new.content,
            script_type: new
                .script_type
                .filter(|t| !t.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_SCRIPT_TYPE.to_string()),
            author_id: author.subject.clone(),
            created_at: now,
            updated_at: now,
        };
        self.store.insert_script(&script)?;
        info!(script_id = %script.id, author = %author.subject, "Script created");
        Ok(script)
    }

    pub fn get_script(&self, id: ScriptId) -> Result<Script, DispatchError> {
        self.store
            .get_script(id)?
            .ok_or_else(|| DispatchError::ScriptNotFound(id.to_string()))
    }

    pub fn list_scripts(&self) -> Result<Vec<Script>, DispatchError> {
        Ok(self.store.list_scripts()?)
    }

    // ---- tasks ----

    /// Queue a new pending task owned by `creator`
    #[instrument(name = "task::create", skip_all, fields(creator = %creator.subject))]
    pub fn create_task(&self, new: NewTask, creator: &Operator) -> Result<Task, DispatchError> {
        require("name", &new.name)?;
        new.config.validate().map_err(DispatchError::Validation)?;
        self.get_script(new.script_id)?;
        if let Some(pin) = new.agent_id {
            self.get_agent(pin)?;
        }

        let now = Utc::now();
        let task = Task {
            id: TaskId::new(),
            name: new.name.trim().to_string(),
            description: new.description,
            status: TaskStatus::Pending,
            trigger_type: new.trigger_type.unwrap_or_default(),
            cron_expression: new.cron_expression.filter(|c| !c.trim().is_empty()),
            config: new.config,
            is_enabled: new.is_enabled.unwrap_or(true),
            script_id: new.script_id,
            agent_id: new.agent_id,
            creator_id: creator.subject.clone(),
            started_at: None,
            completed_at: None,
            error_message: None,
            result: None,
            created_at: now,
            updated_at: now,
        };
        self.store.insert_task(&task)?;
        info!(task_id = %task.id, pinned = task.agent_id.is_some(), "Task queued");
        Ok(task)
    }

    /// Tasks the operator may see; non-admins only see their own
    pub fn list_tasks(
        &self,
        operator: &Operator,
        mut query: TaskQuery,
    ) -> Result<Page<Task>, DispatchError> {
        query.visibility = operator.visibility();
        Ok(self.store.list_tasks(&query)?)
    }

    pub fn get_task(&self, id: TaskId, operator: &Operator) -> Result<Task, DispatchError> {
        self.store
            .get_task(id)?
            .filter(|task| operator.visibility().permits(task))
            .ok_or_else(|| DispatchError::TaskNotFound(id.to_string()))
    }

    /// Edit a task that has not been leased yet.
    ///
    /// Tasks the operator cannot see are reported as not found, so only
    /// their creator or an admin gets this far.
    #[instrument(name = "task::update", skip(self, update, operator), fields(operator = %operator.subject))]
    pub fn update_task(
        &self,
        id: TaskId,
        update: TaskUpdate,
        operator: &Operator,
    ) -> Result<Task, DispatchError> {
        let task = self.get_task(id, operator)?;
        if let Some(name) = &update.name {
            require("name", name)?;
        }
        if let Some(config) = &update.config {
            config.validate().map_err(DispatchError::Validation)?;
        }
        if let Some(pin) = update.agent_id {
            self.get_agent(pin)?;
        }
        if update.is_empty() {
            return Ok(task);
        }

        match self.store.update_task(id, &update, Utc::now())? {
            EditOutcome::NotFound => Err(DispatchError::TaskNotFound(id.to_string())),
            EditOutcome::NotPending(status) => Err(DispatchError::Conflict(format!(
                "task {id} is {status}; only pending tasks can be edited"
            ))),
            EditOutcome::Updated(task) => {
                info!(task_id = %id, "Task updated");
                Ok(task)
            }
        }
    }

    /// Delete a task in any state. A running task's slot is released at once.
    #[instrument(name = "task::remove", skip(self, operator), fields(operator = %operator.subject))]
    pub fn remove_task(&self, id: TaskId, operator: &Operator) -> Result<Task, DispatchError> {
        self.get_task(id, operator)?;
        let removed = self
            .store
            .delete_task(id, Utc::now())?
            .ok_or_else(|| DispatchError::TaskNotFound(id.to_string()))?;
        info!(task_id = %id, status = %removed.status, "Task removed");
        Ok(removed)
    }

    /// Cancel a pending or running task.
    ///
    /// Cancelling a running task frees its slot on the agent immediately;
    /// the agent's later report is acknowledged without effect.
    #[instrument(name = "task::stop", skip(self, operator), fields(operator = %operator.subject))]
    pub fn stop_task(&self, id: TaskId, operator: &Operator) -> Result<Task, DispatchError> {
        self.get_task(id, operator)?;

        match self.store.cancel_task(id, Utc::now())? {
            CancelOutcome::NotFound => Err(DispatchError::TaskNotFound(id.to_string())),
            CancelOutcome::AlreadyFinished(status) => Err(DispatchError::Conflict(format!(
                "task {id} is already {status}"
            ))),
            CancelOutcome::Cancelled(task) => {
                info!(task_id = %id, "Task cancelled");
                Ok(task)
            }
        }
    }

    pub fn task_statistics(&self, operator: &Operator) -> Result<TaskStatistics, DispatchError> {
        Ok(self.store.task_statistics(&operator.visibility())?)
    }
}
