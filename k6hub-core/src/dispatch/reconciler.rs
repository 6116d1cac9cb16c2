//! Status reports from agents

use chrono::Utc;
use tracing::{info, instrument, warn};

use super::{DispatchService, parse_task_id};
use crate::error::DispatchError;
use crate::store::ReportOutcome;
use crate::task::{Ack, ReportedStatus, StatusReport};

impl DispatchService {
    /// Apply an agent's report on a leased task.
    ///
    /// A terminal task is never rewritten: repeated reports acknowledge
    /// without side effects, so an agent may retry freely.
    #[instrument(
        name = "dispatch::report",
        skip(self, report, credential),
        fields(agent = %report.agent_id, status = %report.status)
    )]
    pub fn report_status(
        &self,
        task_id: &str,
        report: &StatusReport,
        credential: Option<&str>,
    ) -> Result<Ack, DispatchError> {
        let id = parse_task_id(task_id)?;
        let status: ReportedStatus = report
            .status
            .parse()
            .map_err(|e: crate::error::ParseEnumError| DispatchError::Validation(e.to_string()))?;

        if self.config.require_agent_token {
            let task = self
                .store
                .get_task(id)?
                .ok_or_else(|| DispatchError::TaskNotFound(id.to_string()))?;
            if let Some(bound) = task.agent_id {
                self.authenticate_agent(bound, credential)?;
            }
        }

        let outcome = self.store.apply_report(
            id,
            &report.agent_id,
            status,
            report.result.as_ref(),
            report.error.as_deref(),
            Utc::now(),
        )?;

        match outcome {
            ReportOutcome::TaskNotFound => Err(DispatchError::TaskNotFound(id.to_string())),
            ReportOutcome::NotBound => {
                warn!(task_id = %id, "Status report from an agent not bound to the task");
                Err(DispatchError::Forbidden(format!(
                    "task {id} is not assigned to agent {}",
                    report.agent_id
                )))
            }
            ReportOutcome::NotLeased(current) => Err(DispatchError::Conflict(format!(
                "task {id} is {current} and has not been leased"
            ))),
            ReportOutcome::Unchanged(task) => {
                Ok(Ack::ok(format!("task already {}", task.status)))
            }
            ReportOutcome::Applied(task) => {
                info!(task_id = %id, status = %task.status, "Task status updated");
                Ok(Ack::ok("status updated"))
            }
        }
    }
}
