use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::domain::ActorId;
use super::repository::{RateLimitStore, RepositoryError};
use crate::clock::Clock;

/// Records older than this are removed by [`RateLimiter::sweep`].
pub fn retention() -> Duration {
    Duration::hours(24)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RateLimitedAction {
    InviteUser,
    DeleteUser,
    ChangeRole,
    SubmitProfile,
    DeleteProfile,
}

impl RateLimitedAction {
    pub const fn label(self) -> &'static str {
        match self {
            Self::InviteUser => "user.invite",
            Self::DeleteUser => "user.delete",
            Self::ChangeRole => "user.change_role",
            Self::SubmitProfile => "profile.submit",
            Self::DeleteProfile => "profile.delete",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        [
            Self::InviteUser,
            Self::DeleteUser,
            Self::ChangeRole,
            Self::SubmitProfile,
            Self::DeleteProfile,
        ]
        .into_iter()
        .find(|action| action.label() == raw.trim())
    }
}

impl fmt::Display for RateLimitedAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitPolicy {
    pub max_requests: u32,
    pub window: Duration,
}

impl RateLimitPolicy {
    pub fn per_hour(max_requests: u32) -> Self {
        Self {
            max_requests,
            window: Duration::hours(1),
        }
    }
}

/// Per-action caps. Actions without a policy are never limited.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitConfig {
    policies: BTreeMap<RateLimitedAction, RateLimitPolicy>,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self::empty()
            .with_policy(RateLimitedAction::InviteUser, RateLimitPolicy::per_hour(10))
            .with_policy(RateLimitedAction::DeleteUser, RateLimitPolicy::per_hour(5))
            .with_policy(RateLimitedAction::ChangeRole, RateLimitPolicy::per_hour(20))
            .with_policy(RateLimitedAction::SubmitProfile, RateLimitPolicy::per_hour(30))
            .with_policy(RateLimitedAction::DeleteProfile, RateLimitPolicy::per_hour(10))
    }
}

impl RateLimitConfig {
    pub fn empty() -> Self {
        Self {
            policies: BTreeMap::new(),
        }
    }

    pub fn with_policy(mut self, action: RateLimitedAction, policy: RateLimitPolicy) -> Self {
        self.policies.insert(action, policy);
        self
    }

    pub fn policy(&self, action: RateLimitedAction) -> Option<&RateLimitPolicy> {
        self.policies.get(&action)
    }
}

/// One allowed attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitRecord {
    pub actor: ActorId,
    pub action: RateLimitedAction,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RateLimitDecision {
    pub allowed: bool,
    pub remaining: u32,
    pub reset_at: DateTime<Utc>,
}

/// Sliding-window limiter. `allowed` never writes; `record` is called by the
/// caller once every other precondition has passed.
#[derive(Clone)]
pub struct RateLimiter {
    store: Arc<dyn RateLimitStore>,
    config: RateLimitConfig,
    clock: Arc<dyn Clock>,
}

impl fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RateLimiter")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl RateLimiter {
    pub fn new(
        store: Arc<dyn RateLimitStore>,
        config: RateLimitConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            config,
            clock,
        }
    }

    pub fn allowed(
        &self,
        actor: &ActorId,
        action: RateLimitedAction,
    ) -> Result<RateLimitDecision, RepositoryError> {
        let now = self.clock.now();
        let Some(policy) = self.config.policy(action) else {
            return Ok(RateLimitDecision {
                allowed: true,
                remaining: u32::MAX,
                reset_at: now,
            });
        };

        let window_start = now - policy.window;
        let timestamps = self.store.timestamps_after(actor, action, window_start)?;
        let used = u32::try_from(timestamps.len()).unwrap_or(u32::MAX);
        let reset_at = timestamps
            .first()
            .map(|oldest| *oldest + policy.window)
            .unwrap_or(now);

        let decision = RateLimitDecision {
            allowed: used < policy.max_requests,
            remaining: policy.max_requests.saturating_sub(used),
            reset_at,
        };

        debug!(
            actor = %actor,
            action = %action,
            used,
            allowed = decision.allowed,
            "rate limit checked"
        );
        Ok(decision)
    }

    pub fn record(&self, actor: &ActorId, action: RateLimitedAction) -> Result<(), RepositoryError> {
        if self.config.policy(action).is_none() {
            return Ok(());
        }

        self.store.record(RateLimitRecord {
            actor: actor.clone(),
            action,
            at: self.clock.now(),
        })
    }

    /// Deletes records past the retention horizon.
    pub fn sweep(&self) -> Result<usize, RepositoryError> {
        let cutoff = self.clock.now() - retention();
        let removed = self.store.purge_before(cutoff)?;
        if removed > 0 {
            info!(removed, %cutoff, "rate limit records swept");
        }
        Ok(removed)
    }
}
