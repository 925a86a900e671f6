use chrono::{DateTime, Utc};

use super::audit::{AuditCursor, AuditEntry, AuditFilter};
use super::domain::{ActorId, Profile, ProfileId, ProfilePatch, ProfileQuery, ProfileStatus};
use super::rate_limit::{RateLimitRecord, RateLimitedAction};

/// Document store for profiles. Implementations must apply each call atomically.
pub trait ProfileRepository: Send + Sync {
    fn insert(&self, profile: Profile) -> Result<Profile, RepositoryError>;
    fn fetch(&self, id: &ProfileId) -> Result<Option<Profile>, RepositoryError>;
    /// Applies `patch` only while the stored status still equals `expected`.
    fn compare_and_patch(
        &self,
        id: &ProfileId,
        expected: ProfileStatus,
        patch: ProfilePatch,
        now: DateTime<Utc>,
    ) -> Result<Profile, RepositoryError>;
    fn patch(
        &self,
        id: &ProfileId,
        patch: ProfilePatch,
        now: DateTime<Utc>,
    ) -> Result<Profile, RepositoryError>;
    fn remove(&self, id: &ProfileId) -> Result<Option<Profile>, RepositoryError>;
    fn list(&self, query: &ProfileQuery) -> Result<Vec<Profile>, RepositoryError>;
    /// Case-insensitive substring match on name, category and location.
    fn search(&self, term: &str, limit: usize) -> Result<Vec<Profile>, RepositoryError>;
}

/// Append-only storage for audit entries.
pub trait AuditStore: Send + Sync {
    /// Stores the entry and returns it with its store-assigned sequence.
    fn append(&self, entry: AuditEntry) -> Result<AuditEntry, RepositoryError>;
    /// Newest first, strictly older than `cursor` when given.
    fn query(
        &self,
        filter: &AuditFilter,
        cursor: Option<&AuditCursor>,
        limit: usize,
    ) -> Result<Vec<AuditEntry>, RepositoryError>;
    fn since(&self, from: DateTime<Utc>) -> Result<Vec<AuditEntry>, RepositoryError>;
}

/// Storage for sliding-window rate-limit facts.
pub trait RateLimitStore: Send + Sync {
    fn record(&self, record: RateLimitRecord) -> Result<(), RepositoryError>;
    /// Timestamps strictly after `from`, oldest first.
    fn timestamps_after(
        &self,
        actor: &ActorId,
        action: RateLimitedAction,
        from: DateTime<Utc>,
    ) -> Result<Vec<DateTime<Utc>>, RepositoryError>;
    /// Deletes records older than `cutoff`, returning how many were removed.
    fn purge_before(&self, cutoff: DateTime<Utc>) -> Result<usize, RepositoryError>;
}

/// Error enumeration for repository failures.
#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("record already exists")]
    Conflict,
    #[error("record not found")]
    NotFound,
    #[error("record status changed concurrently (now {actual})")]
    StatusChanged { actual: ProfileStatus },
    #[error("repository unavailable: {0}")]
    Unavailable(String),
}
