//! Liveness sweeper: demotes silent agents and reclaims their leases
//!
//! Runs on a fixed interval independent of request traffic. Each sweep is
//! one store transaction, so a heartbeat racing the sweep either lands
//! before it (agent survives) or after it (agent comes back online).

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use super::DispatchService;
use crate::error::DispatchError;
use crate::store::ReclaimReport;

impl DispatchService {
    /// Run one sweep against the current time
    pub fn sweep_stale_agents(&self) -> Result<ReclaimReport, DispatchError> {
        self.sweep_stale_agents_at(Utc::now())
    }

    /// Run one sweep as if the clock read `now`.
    ///
    /// An agent is stale when its last heartbeat is strictly older than
    /// `now - heartbeat_timeout`, or when it never sent one.
    #[instrument(name = "sweeper::sweep", skip(self))]
    pub fn sweep_stale_agents_at(&self, now: DateTime<Utc>) -> Result<ReclaimReport, DispatchError> {
        let timeout = TimeDelta::from_std(self.config.heartbeat_timeout).unwrap_or(TimeDelta::MAX);
        let cutoff = now.checked_sub_signed(timeout).unwrap_or(DateTime::<Utc>::MIN_UTC);

        let report = self
            .store
            .sweep_stale_agents(cutoff, self.config.orphan_policy, now)?;

        if report.agents.is_empty() {
            debug!("No stale agents");
        } else {
            info!(
                agents = report.agents.len(),
                failed = report.failed_tasks,
                requeued = report.requeued_tasks,
                policy = %self.config.orphan_policy,
                "Marked stale agents offline"
            );
        }
        Ok(report)
    }
}

/// Background task driving [`DispatchService::sweep_stale_agents`]
pub struct LivenessSweeper {
    service: Arc<DispatchService>,
    interval: Duration,
    handle: Option<JoinHandle<()>>,
    shutdown: CancellationToken,
}

impl LivenessSweeper {
    /// Create a sweeper using the service's configured interval.
    pub fn new(service: Arc<DispatchService>) -> Self {
        let interval = service.config().sweep_interval;
        Self {
            service,
            interval,
            handle: None,
            shutdown: CancellationToken::new(),
        }
    }

    /// Override the sweep interval.
    #[must_use]
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Start the sweep loop. Calling it twice has no effect.
    pub fn spawn(&mut self) {
        if self.handle.is_some() {
            return;
        }

        let service = Arc::clone(&self.service);
        let shutdown = self.shutdown.clone();
        let period = self.interval.max(Duration::from_millis(10));

        self.handle = Some(tokio::spawn(async move {
            info!(interval_ms = period.as_millis() as u64, "Liveness sweeper started");
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => {
                        info!("Liveness sweeper received shutdown signal");
                        break;
                    }
                    _ = ticker.tick() => {
                        if let Err(e) = service.sweep_stale_agents() {
                            error!(error = %e, "Liveness sweep failed");
                        }
                    }
                }
            }

            info!("Liveness sweeper stopped");
        }));
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Signal the sweep loop to stop.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    /// Wait for the sweep loop to exit.
    pub async fn wait_for_shutdown(mut self) {
        if let Some(handle) = self.handle.take()
            && let Err(e) = handle.await
        {
            warn!(error = %e, "Liveness sweeper task panicked");
        }
    }
}
