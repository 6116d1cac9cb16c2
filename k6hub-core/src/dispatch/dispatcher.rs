//! Poll handler: lease a bounded batch of pending tasks to an agent

use chrono::Utc;
use tracing::{debug, info, instrument};

use super::{DispatchService, parse_agent_id};
use crate::error::DispatchError;
use crate::store::ClaimOutcome;
use crate::task::PollResponse;

impl DispatchService {
    /// Hand out up to `min(poll_batch_size, free capacity)` tasks.
    ///
    /// Only an unknown agent is an error. A disabled, offline or saturated
    /// agent gets an empty batch and is expected to poll again later.
    #[instrument(name = "dispatch::poll", skip(self, credential))]
    pub fn poll(
        &self,
        agent_id: &str,
        credential: Option<&str>,
    ) -> Result<PollResponse, DispatchError> {
        let id = parse_agent_id(agent_id)?;
        self.authenticate_agent(id, credential)?;

        match self
            .store
            .claim_tasks(id, self.config.poll_batch_size, Utc::now())?
        {
            ClaimOutcome::AgentNotFound => Err(DispatchError::AgentNotFound(id.to_string())),
            ClaimOutcome::Skipped(reason) => {
                debug!(?reason, "Poll yields no work");
                Ok(PollResponse::empty())
            }
            ClaimOutcome::Claimed { jobs, has_more } => {
                if !jobs.is_empty() {
                    info!(count = jobs.len(), has_more, "Leased tasks to agent");
                }
                Ok(PollResponse { jobs, has_more })
            }
        }
    }
}
