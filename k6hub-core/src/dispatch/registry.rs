//! Agent identity and liveness bookkeeping

use chrono::Utc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use super::{DispatchService, parse_agent_id};
use crate::agent::{Agent, AgentDescriptor, AgentStatus, BatchOutcome, HeartbeatReport, Registration};
use crate::error::DispatchError;
use crate::ids::AgentId;
use crate::store::{RegisterOutcome, TokenCheck, Transition};
use crate::task::Ack;

impl DispatchService {
    /// Upsert an agent keyed by hostname and bring it online.
    ///
    /// Every registration issues a fresh agent token. With agent tokens
    /// required, taking over a hostname that already holds a token needs
    /// that token as `credential`.
    #[instrument(name = "agent::register", skip_all, fields(hostname = %descriptor.hostname))]
    pub fn register(
        &self,
        descriptor: AgentDescriptor,
        credential: Option<&str>,
    ) -> Result<Registration, DispatchError> {
        if descriptor.hostname.trim().is_empty() {
            return Err(DispatchError::Validation("hostname is required".to_string()));
        }

        let profile = descriptor.into_profile(self.config.default_max_concurrent_tasks);
        let token = Uuid::new_v4().to_string();
        let check = if self.config.require_agent_token {
            TokenCheck::Require(credential)
        } else {
            TokenCheck::Open
        };

        match self.store.register_agent(&profile, &token, check, Utc::now())? {
            RegisterOutcome::Created(agent) => {
                info!(agent_id = %agent.id, name = %agent.name, "Agent registered");
                Ok(Registration {
                    agent,
                    agent_token: token,
                })
            }
            RegisterOutcome::Updated(agent) => {
                info!(agent_id = %agent.id, name = %agent.name, "Agent re-registered");
                Ok(Registration {
                    agent,
                    agent_token: token,
                })
            }
            RegisterOutcome::Rejected => {
                warn!(hostname = %profile.hostname, "Re-registration without the current agent token");
                Err(DispatchError::Forbidden(format!(
                    "hostname {} is registered to another agent",
                    profile.hostname
                )))
            }
        }
    }

    /// Check an agent-protocol call's bearer token when tokens are required
    pub fn authenticate_agent(
        &self,
        agent: AgentId,
        credential: Option<&str>,
    ) -> Result<(), DispatchError> {
        if !self.config.require_agent_token {
            return Ok(());
        }
        let expected = self.store.agent_token(agent)?;
        match (expected.as_deref(), credential) {
            (Some(expected), Some(presented)) if expected == presented => Ok(()),
            (_, None) => Err(DispatchError::Unauthorized(
                "agent token required".to_string(),
            )),
            _ => Err(DispatchError::Unauthorized(format!(
                "invalid token for agent {agent}"
            ))),
        }
    }

    /// Record a liveness signal; the server clock is authoritative
    #[instrument(name = "agent::heartbeat", skip_all, fields(agent_id = %report.agent_id))]
    pub fn heartbeat(
        &self,
        report: &HeartbeatReport,
        credential: Option<&str>,
    ) -> Result<Ack, DispatchError> {
        let id = parse_agent_id(&report.agent_id)?;
        self.authenticate_agent(id, credential)?;

        if !self
            .store
            .record_heartbeat(id, report.resources.as_ref(), Utc::now())?
        {
            return Err(DispatchError::AgentNotFound(id.to_string()));
        }
        Ok(Ack::ok("heartbeat received"))
    }

    /// Administrative online transition; conflicts if already online
    #[instrument(name = "agent::start", skip(self))]
    pub fn start_agent(&self, id: AgentId) -> Result<Agent, DispatchError> {
        self.transition(id, AgentStatus::Online)
    }

    /// Administrative offline transition; conflicts if already offline
    #[instrument(name = "agent::stop", skip(self))]
    pub fn stop_agent(&self, id: AgentId) -> Result<Agent, DispatchError> {
        self.transition(id, AgentStatus::Offline)
    }

    fn transition(&self, id: AgentId, to: AgentStatus) -> Result<Agent, DispatchError> {
        match self.store.transition_agent(id, to, Utc::now())? {
            Transition::NotFound => Err(DispatchError::AgentNotFound(id.to_string())),
            Transition::Unchanged(status) => Err(DispatchError::Conflict(format!(
                "agent {id} is already {status}"
            ))),
            Transition::Changed(agent) => {
                info!(agent_id = %id, status = %to, "Agent status changed by operator");
                Ok(agent)
            }
        }
    }

    /// Start each agent independently; failures do not stop the batch
    pub fn batch_start(&self, ids: &[String]) -> BatchOutcome {
        self.batch(ids, AgentStatus::Online)
    }

    /// Stop each agent independently; failures do not stop the batch
    pub fn batch_stop(&self, ids: &[String]) -> BatchOutcome {
        self.batch(ids, AgentStatus::Offline)
    }

    fn batch(&self, ids: &[String], to: AgentStatus) -> BatchOutcome {
        let mut outcome = BatchOutcome::default();
        for raw in ids {
            let result = parse_agent_id(raw).and_then(|id| self.transition(id, to));
            match result {
                Ok(_) => outcome.success.push(raw.clone()),
                Err(e) => {
                    warn!(agent_id = %raw, error = %e, "Batch status change failed");
                    outcome.failed.push(raw.clone());
                }
            }
        }
        outcome
    }
}
