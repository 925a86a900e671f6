//! Animal profile lifecycle: the DRAFT to PUBLISHED state machine, the
//! validation gate, follow-up jobs and their integration clients, the rate
//! limiter and the audit trail.

pub mod audit;
pub mod domain;
pub mod integrations;
pub mod jobs;
pub mod lifecycle;
pub mod memory;
pub mod rate_limit;
pub mod repository;
pub mod router;
pub mod validation;

#[cfg(test)]
mod tests;

pub use audit::{
    AuditAction, AuditCursor, AuditEntry, AuditEvent, AuditFilter, AuditLog, AuditPage,
    AuditStats, TargetType,
};
pub use domain::{
    Actor, ActorId, ActorStamp, DistributionResult, Platform, Profile, ProfileDraft, ProfileId,
    ProfilePatch, ProfileQuery, ProfileStatus, ProfileUpdate, ProfileView, Role,
    TranslatedFields,
};
pub use jobs::{
    Job, JobError, JobHandle, JobHandler, JobKind, JobReceiver, JobRunner, JobScheduler,
    JobWorker, RecordingScheduler, SchedulerError, TokioJobQueue,
};
pub use lifecycle::{LifecycleEngine, LifecycleError, ValidationOutcome};
pub use memory::{InMemoryAuditStore, InMemoryProfileRepository, InMemoryRateLimitStore};
pub use rate_limit::{
    RateLimitConfig, RateLimitDecision, RateLimitPolicy, RateLimitedAction, RateLimiter,
};
pub use repository::{AuditStore, ProfileRepository, RateLimitStore, RepositoryError};
pub use router::profile_router;
pub use validation::{FieldError, ValidationConfig, ValidationEngine, ValidationReport};
