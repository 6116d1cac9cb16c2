//! Dispatch tuning knobs

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ParseEnumError;

/// What happens to RUNNING tasks whose agent is gone
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrphanPolicy {
    /// Mark them FAILED
    #[default]
    Fail,
    /// Return them to the pending pool, unassigned
    Requeue,
    /// Leave them RUNNING
    Keep,
}

impl OrphanPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Fail => "fail",
            Self::Requeue => "requeue",
            Self::Keep => "keep",
        }
    }
}

impl fmt::Display for OrphanPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrphanPolicy {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "fail" => Ok(Self::Fail),
            "requeue" => Ok(Self::Requeue),
            "keep" => Ok(Self::Keep),
            other => Err(ParseEnumError::new("orphan policy", other)),
        }
    }
}

/// Configuration for the dispatch service and the liveness sweeper
#[derive(Debug, Clone, PartialEq)]
pub struct DispatchConfig {
    /// Most tasks handed out by one poll
    pub poll_batch_size: u32,
    /// Heartbeat silence after which an agent is marked offline
    pub heartbeat_timeout: Duration,
    /// How often the sweeper runs
    pub sweep_interval: Duration,
    /// Capacity for agents that register without declaring one
    pub default_max_concurrent_tasks: u32,
    pub orphan_policy: OrphanPolicy,
    /// Require the registration token on agent calls
    pub require_agent_token: bool,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            poll_batch_size: 5,
            heartbeat_timeout: Duration::from_secs(60),
            sweep_interval: Duration::from_secs(15),
            default_max_concurrent_tasks: 1,
            orphan_policy: OrphanPolicy::Fail,
            require_agent_token: false,
        }
    }
}

impl DispatchConfig {
    /// Set the per-poll batch cap.
    #[must_use]
    pub fn with_poll_batch_size(mut self, size: u32) -> Self {
        self.poll_batch_size = size.max(1);
        self
    }

    /// Set the heartbeat staleness threshold.
    #[must_use]
    pub fn with_heartbeat_timeout(mut self, timeout: Duration) -> Self {
        self.heartbeat_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval = interval;
        self
    }

    #[must_use]
    pub fn with_default_max_concurrent_tasks(mut self, max: u32) -> Self {
        self.default_max_concurrent_tasks = max.max(1);
        self
    }

    #[must_use]
    pub fn with_orphan_policy(mut self, policy: OrphanPolicy) -> Self {
        self.orphan_policy = policy;
        self
    }

    #[must_use]
    pub fn with_agent_tokens(mut self, required: bool) -> Self {
        self.require_agent_token = required;
        self
    }
}
