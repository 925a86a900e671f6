use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde_json::json;
use tracing::{debug, error, info, warn};

use super::transition;
use super::LifecycleError;
use crate::clock::Clock;
use crate::config::JobConfig;
use crate::workflows::profiles::audit::{
    AuditAction, AuditCursor, AuditEvent, AuditFilter, AuditLog, AuditPage, AuditStats, TargetType,
};
use crate::workflows::profiles::domain::{
    Actor, ActorId, ActorStamp, Profile, ProfileDraft, ProfileId, ProfilePatch, ProfileQuery,
    ProfileStatus, ProfileUpdate, Role,
};
use crate::workflows::profiles::jobs::{Job, JobHandle, JobScheduler};
use crate::workflows::profiles::rate_limit::{RateLimitDecision, RateLimitedAction, RateLimiter};
use crate::workflows::profiles::repository::{ProfileRepository, RepositoryError};
use crate::workflows::profiles::validation::{ValidationConfig, ValidationEngine, ValidationReport};

const DEFAULT_SEARCH_LIMIT: usize = 50;

/// Result of one validation job delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationOutcome {
    Accepted,
    Rejected(ValidationReport),
    /// The record had already left DRAFT, so the delivery was a duplicate.
    Skipped(ProfileStatus),
}

/// Owns every status write. Synchronous calls mutate the store before
/// returning; slow work is handed to the scheduler as follow-up jobs.
pub struct LifecycleEngine {
    profiles: Arc<dyn ProfileRepository>,
    audit: AuditLog,
    rate_limiter: RateLimiter,
    scheduler: Arc<dyn JobScheduler>,
    validation: ValidationEngine,
    clock: Arc<dyn Clock>,
    jobs: JobConfig,
}

impl fmt::Debug for LifecycleEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LifecycleEngine")
            .field("rate_limiter", &self.rate_limiter)
            .field("jobs", &self.jobs)
            .finish_non_exhaustive()
    }
}

impl LifecycleEngine {
    pub fn new(
        profiles: Arc<dyn ProfileRepository>,
        audit: AuditLog,
        rate_limiter: RateLimiter,
        scheduler: Arc<dyn JobScheduler>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            profiles,
            audit,
            rate_limiter,
            scheduler,
            validation: ValidationEngine::default(),
            clock,
            jobs: JobConfig::default(),
        }
    }

    pub fn with_validation(mut self, config: ValidationConfig) -> Self {
        self.validation = ValidationEngine::new(config);
        self
    }

    pub fn with_job_config(mut self, jobs: JobConfig) -> Self {
        self.jobs = jobs;
        self
    }

    pub fn audit_log(&self) -> &AuditLog {
        &self.audit
    }

    pub fn rate_limiter(&self) -> &RateLimiter {
        &self.rate_limiter
    }

    pub(crate) fn profiles(&self) -> &dyn ProfileRepository {
        self.profiles.as_ref()
    }

    pub(crate) fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Stores a new DRAFT and schedules its validation.
    pub fn submit(&self, draft: ProfileDraft, actor: &Actor) -> Result<Profile, LifecycleError> {
        self.check_rate_limit(actor, RateLimitedAction::SubmitProfile)?;
        self.rate_limiter
            .record(&actor.id, RateLimitedAction::SubmitProfile)?;

        let profile = Profile::from_draft(ProfileId::generate(), draft, &actor.id, self.clock.now());
        let stored = self.profiles.insert(profile)?;

        self.schedule(
            Job::Validate {
                profile_id: stored.id.clone(),
            },
            Duration::ZERO,
        )?;
        self.record(
            AuditEvent::new(
                AuditAction::ProfileCreate,
                TargetType::Profile,
                stored.id.to_string(),
            )
            .by(Some(&actor.id))
            .named(stored.name.clone()),
        );
        info!(profile_id = %stored.id, actor = %actor.id, "profile submitted");
        Ok(stored)
    }

    /// Reviewer decision. The write is a compare-and-set on the status that
    /// was read, so of two racing calls only one takes effect.
    pub fn set_status(
        &self,
        id: &ProfileId,
        target: ProfileStatus,
        actor: &Actor,
    ) -> Result<Profile, LifecycleError> {
        if !actor.role.can_review() {
            return Err(self.deny(actor, "change profile status", TargetType::Profile, &id.0));
        }

        let current = self.fetch(id)?;
        if !transition::is_legal(current.status, target) {
            return Err(LifecycleError::InvalidTransition {
                from: current.status,
                to: target,
            });
        }

        let updated = self.transition(&current, target, Some(&actor.id))?;
        self.schedule_follow_ups(&updated)?;
        self.record(
            AuditEvent::new(
                AuditAction::ProfileStatusChange,
                TargetType::Profile,
                id.to_string(),
            )
            .by(Some(&actor.id))
            .named(updated.name.clone())
            .with_change(current.status.label(), target.label()),
        );
        info!(
            profile_id = %id,
            actor = %actor.id,
            from = %current.status,
            to = %target,
            "profile status changed"
        );
        Ok(updated)
    }

    /// Partial edit of descriptive fields. The audit entry lists field names,
    /// never values.
    pub fn update(
        &self,
        id: &ProfileId,
        update: ProfileUpdate,
        actor: &Actor,
    ) -> Result<Profile, LifecycleError> {
        let current = self.fetch(id)?;
        let changed = update.changed_fields(&current);

        let updated = self
            .profiles
            .patch(id, ProfilePatch::Content(update), self.clock.now())
            .map_err(|err| not_found(id, err))?;

        self.record(
            AuditEvent::new(
                AuditAction::ProfileUpdate,
                TargetType::Profile,
                id.to_string(),
            )
            .by(Some(&actor.id))
            .named(updated.name.clone())
            .with_detail(json!({ "fields": changed })),
        );
        debug!(profile_id = %id, actor = %actor.id, fields = ?changed, "profile updated");
        Ok(updated)
    }

    pub fn remove(&self, id: &ProfileId, actor: &Actor) -> Result<Profile, LifecycleError> {
        if actor.role != Role::Administrator {
            return Err(self.deny(actor, "delete profiles", TargetType::Profile, &id.0));
        }
        self.check_rate_limit(actor, RateLimitedAction::DeleteProfile)?;
        self.fetch(id)?;
        self.rate_limiter
            .record(&actor.id, RateLimitedAction::DeleteProfile)?;

        let removed = self
            .profiles
            .remove(id)?
            .ok_or_else(|| LifecycleError::NotFound(id.clone()))?;

        self.record(
            AuditEvent::new(
                AuditAction::ProfileDelete,
                TargetType::Profile,
                id.to_string(),
            )
            .by(Some(&actor.id))
            .named(removed.name.clone())
            .with_detail(removed.snapshot_summary()),
        );
        info!(profile_id = %id, actor = %actor.id, "profile deleted");
        Ok(removed)
    }

    pub fn get(&self, id: &ProfileId, actor: &Actor) -> Result<Profile, LifecycleError> {
        debug!(profile_id = %id, actor = %actor.id, "profile read");
        self.fetch(id)
    }

    pub fn list(&self, query: &ProfileQuery, actor: &Actor) -> Result<Vec<Profile>, LifecycleError> {
        debug!(actor = %actor.id, status = ?query.status, "profiles listed");
        Ok(self.profiles.list(query)?)
    }

    /// Case-insensitive match on name, category and location. A blank term
    /// matches nothing.
    pub fn search(
        &self,
        term: &str,
        limit: Option<usize>,
        actor: &Actor,
    ) -> Result<Vec<Profile>, LifecycleError> {
        let term = term.trim();
        if term.is_empty() {
            return Ok(Vec::new());
        }
        debug!(actor = %actor.id, term, "profiles searched");
        Ok(self
            .profiles
            .search(term, limit.unwrap_or(DEFAULT_SEARCH_LIMIT))?)
    }

    /// Administrator-only view of the audit trail, newest first.
    pub fn audit_entries(
        &self,
        filter: &AuditFilter,
        cursor: Option<&AuditCursor>,
        limit: Option<usize>,
        actor: &Actor,
    ) -> Result<AuditPage, LifecycleError> {
        if actor.role != Role::Administrator {
            return Err(self.deny(actor, "read the audit log", TargetType::AuditLog, "audit"));
        }
        Ok(self.audit.list(filter, cursor, limit)?)
    }

    pub fn audit_stats(&self, window_days: u32, actor: &Actor) -> Result<AuditStats, LifecycleError> {
        if actor.role != Role::Administrator {
            return Err(self.deny(actor, "read audit statistics", TargetType::AuditLog, "audit"));
        }
        Ok(self.audit.stats(window_days)?)
    }

    /// The caller's own standing against an action's limit. Never records.
    pub fn rate_limit_status(
        &self,
        action: RateLimitedAction,
        actor: &Actor,
    ) -> Result<RateLimitDecision, LifecycleError> {
        Ok(self.rate_limiter.allowed(&actor.id, action)?)
    }

    /// Validation follow-up job. Decides DRAFT -> ACCEPTED or REJECTED with
    /// the system as reviewer.
    pub fn run_validation(&self, id: &ProfileId) -> Result<ValidationOutcome, LifecycleError> {
        let profile = self.fetch(id)?;
        if profile.status != ProfileStatus::Draft {
            debug!(profile_id = %id, status = %profile.status, "validation skipped");
            return Ok(ValidationOutcome::Skipped(profile.status));
        }

        let report = self
            .validation
            .validate(&profile, self.clock.now().date_naive());
        let target = if report.passed() {
            ProfileStatus::Accepted
        } else {
            ProfileStatus::Rejected
        };

        let updated = match self.transition(&profile, target, None) {
            Ok(updated) => updated,
            Err(LifecycleError::InvalidTransition { from, .. }) => {
                debug!(profile_id = %id, status = %from, "validation lost race");
                return Ok(ValidationOutcome::Skipped(from));
            }
            Err(err) => return Err(err),
        };

        let event = if report.passed() {
            self.schedule_follow_ups(&updated)?;
            AuditEvent::new(
                AuditAction::ValidationSuccess,
                TargetType::Profile,
                id.to_string(),
            )
        } else {
            AuditEvent::new(
                AuditAction::ValidationFailure,
                TargetType::Profile,
                id.to_string(),
            )
            .with_detail(json!({ "errors": report.errors }))
        };
        self.record(
            event
                .named(updated.name.clone())
                .with_change(ProfileStatus::Draft.label(), target.label()),
        );

        if report.passed() {
            info!(profile_id = %id, "profile passed validation");
            Ok(ValidationOutcome::Accepted)
        } else {
            info!(profile_id = %id, fields = ?report.fields(), "profile failed validation");
            Ok(ValidationOutcome::Rejected(report))
        }
    }

    fn fetch(&self, id: &ProfileId) -> Result<Profile, LifecycleError> {
        self.profiles
            .fetch(id)?
            .ok_or_else(|| LifecycleError::NotFound(id.clone()))
    }

    fn transition(
        &self,
        current: &Profile,
        target: ProfileStatus,
        actor: Option<&ActorId>,
    ) -> Result<Profile, LifecycleError> {
        let now = self.clock.now();
        let patch = ProfilePatch::Status {
            status: target,
            stamp: ActorStamp {
                actor: actor.cloned(),
                at: now,
            },
        };

        self.profiles
            .compare_and_patch(&current.id, current.status, patch, now)
            .map_err(|err| match err {
                RepositoryError::StatusChanged { actual } => LifecycleError::InvalidTransition {
                    from: actual,
                    to: target,
                },
                other => not_found(&current.id, other),
            })
    }

    fn schedule_follow_ups(&self, profile: &Profile) -> Result<(), LifecycleError> {
        let profile_id = profile.id.clone();
        match profile.status {
            ProfileStatus::Accepted => {
                self.schedule(Job::Translate { profile_id }, Duration::ZERO)?;
            }
            ProfileStatus::Published => {
                self.schedule(
                    Job::Distribute {
                        profile_id: profile_id.clone(),
                    },
                    Duration::ZERO,
                )?;
                self.schedule(Job::CatalogSync { profile_id }, self.jobs.catalog_sync_delay)?;
            }
            ProfileStatus::Draft | ProfileStatus::Rejected => {}
        }
        Ok(())
    }

    fn schedule(&self, job: Job, delay: Duration) -> Result<JobHandle, LifecycleError> {
        let kind = job.kind();
        let profile_id = job.profile_id().clone();
        self.scheduler.enqueue(job, delay).map_err(|err| {
            error!(%kind, %profile_id, error = %err, "failed to enqueue follow-up job");
            LifecycleError::from(err)
        })
    }

    /// Appends an entry for a write that is already committed. Failures are
    /// logged so the committed change and its follow-ups stand.
    fn record(&self, event: AuditEvent) {
        let action = event.action();
        if let Err(err) = self.audit.append(event) {
            error!(%action, error = %err, "failed to append audit entry");
        }
    }

    fn check_rate_limit(
        &self,
        actor: &Actor,
        action: RateLimitedAction,
    ) -> Result<(), LifecycleError> {
        let decision = self.rate_limiter.allowed(&actor.id, action)?;
        if decision.allowed {
            return Ok(());
        }

        warn!(actor = %actor.id, %action, reset_at = %decision.reset_at, "rate limit exceeded");
        let event = AuditEvent::new(
            AuditAction::RateLimitExceeded,
            TargetType::RateLimit,
            action.label(),
        )
        .by(Some(&actor.id))
        .with_detail(json!({ "reset_at": decision.reset_at }));
        if let Err(err) = self.audit.append(event) {
            error!(error = %err, "failed to audit rate limit denial");
        }

        Err(LifecycleError::RateLimited {
            action,
            reset_at: decision.reset_at,
        })
    }

    /// Audits the denial and returns the error for the caller.
    fn deny(
        &self,
        actor: &Actor,
        operation: &'static str,
        target: TargetType,
        target_id: &str,
    ) -> LifecycleError {
        warn!(actor = %actor.id, role = %actor.role, operation, "access denied");
        let event = AuditEvent::new(AuditAction::AccessDenied, target, target_id)
            .by(Some(&actor.id))
            .with_detail(json!({ "operation": operation, "role": actor.role.label() }));
        if let Err(err) = self.audit.append(event) {
            error!(error = %err, "failed to audit access denial");
        }

        LifecycleError::Unauthorized {
            role: actor.role,
            operation,
        }
    }
}

fn not_found(id: &ProfileId, err: RepositoryError) -> LifecycleError {
    match err {
        RepositoryError::NotFound => LifecycleError::NotFound(id.clone()),
        other => LifecycleError::Repository(other),
    }
}
