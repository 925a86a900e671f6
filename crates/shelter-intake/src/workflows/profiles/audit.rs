//! Append-only audit trail of lifecycle steps, job outcomes and access decisions.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Duration, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;
use uuid::Uuid;

use super::domain::ActorId;
use super::repository::{AuditStore, RepositoryError};
use crate::clock::Clock;

pub const DEFAULT_PAGE_SIZE: usize = 50;
pub const MAX_PAGE_SIZE: usize = 200;
pub const MAX_STATS_WINDOW_DAYS: u32 = 365;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditAction {
    ProfileCreate,
    ProfileUpdate,
    ProfileStatusChange,
    ProfileDelete,
    ValidationSuccess,
    ValidationFailure,
    TranslationSuccess,
    TranslationFailure,
    DistributionSuccess,
    DistributionFailure,
    MatchpfoteSyncSuccess,
    MatchpfoteSyncFailure,
    AccessDenied,
    RateLimitExceeded,
}

impl AuditAction {
    pub const fn label(self) -> &'static str {
        match self {
            Self::ProfileCreate => "PROFILE_CREATE",
            Self::ProfileUpdate => "PROFILE_UPDATE",
            Self::ProfileStatusChange => "PROFILE_STATUS_CHANGE",
            Self::ProfileDelete => "PROFILE_DELETE",
            Self::ValidationSuccess => "VALIDATION_SUCCESS",
            Self::ValidationFailure => "VALIDATION_FAILURE",
            Self::TranslationSuccess => "TRANSLATION_SUCCESS",
            Self::TranslationFailure => "TRANSLATION_FAILURE",
            Self::DistributionSuccess => "DISTRIBUTION_SUCCESS",
            Self::DistributionFailure => "DISTRIBUTION_FAILURE",
            Self::MatchpfoteSyncSuccess => "MATCHPFOTE_SYNC_SUCCESS",
            Self::MatchpfoteSyncFailure => "MATCHPFOTE_SYNC_FAILURE",
            Self::AccessDenied => "ACCESS_DENIED",
            Self::RateLimitExceeded => "RATE_LIMIT_EXCEEDED",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        Self::all()
            .into_iter()
            .find(|action| action.label().eq_ignore_ascii_case(raw.trim()))
    }

    pub const fn all() -> [Self; 14] {
        [
            Self::ProfileCreate,
            Self::ProfileUpdate,
            Self::ProfileStatusChange,
            Self::ProfileDelete,
            Self::ValidationSuccess,
            Self::ValidationFailure,
            Self::TranslationSuccess,
            Self::TranslationFailure,
            Self::DistributionSuccess,
            Self::DistributionFailure,
            Self::MatchpfoteSyncSuccess,
            Self::MatchpfoteSyncFailure,
            Self::AccessDenied,
            Self::RateLimitExceeded,
        ]
    }

    /// Failure outcomes and denials count as errors in the stats split.
    pub fn is_failure(self) -> bool {
        let label = self.label();
        label.ends_with("_FAILURE") || matches!(self, Self::AccessDenied | Self::RateLimitExceeded)
    }
}

impl fmt::Display for AuditAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetType {
    Profile,
    RateLimit,
    AuditLog,
}

impl TargetType {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim() {
            "profile" => Some(Self::Profile),
            "rate_limit" => Some(Self::RateLimit),
            "audit_log" => Some(Self::AuditLog),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditTarget {
    pub kind: TargetType,
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValueChange {
    pub before: Value,
    pub after: Value,
}

/// Immutable audit fact as stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub id: String,
    pub sequence: u64,
    pub action: AuditAction,
    pub actor: Option<ActorId>,
    pub target: AuditTarget,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub change: Option<ValueChange>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<Value>,
    pub at: DateTime<Utc>,
}

impl AuditEntry {
    pub fn cursor(&self) -> AuditCursor {
        AuditCursor {
            at: self.at,
            sequence: self.sequence,
        }
    }

    pub fn is_before(&self, cursor: &AuditCursor) -> bool {
        (self.at, self.sequence) < (cursor.at, cursor.sequence)
    }
}

/// Unstamped audit entry built by callers; the log adds id and timestamp.
#[derive(Debug, Clone, PartialEq)]
pub struct AuditEvent {
    action: AuditAction,
    actor: Option<ActorId>,
    target: AuditTarget,
    change: Option<ValueChange>,
    detail: Option<Value>,
}

impl AuditEvent {
    pub fn new(action: AuditAction, kind: TargetType, id: impl Into<String>) -> Self {
        Self {
            action,
            actor: None,
            target: AuditTarget {
                kind,
                id: id.into(),
                display_name: None,
            },
            change: None,
            detail: None,
        }
    }

    pub fn by(mut self, actor: Option<&ActorId>) -> Self {
        self.actor = actor.cloned();
        self
    }

    pub fn named(mut self, display_name: impl Into<String>) -> Self {
        self.target.display_name = Some(display_name.into());
        self
    }

    pub fn with_change(mut self, before: impl Into<Value>, after: impl Into<Value>) -> Self {
        self.change = Some(ValueChange {
            before: before.into(),
            after: after.into(),
        });
        self
    }

    pub fn with_detail(mut self, detail: Value) -> Self {
        self.detail = Some(detail);
        self
    }

    pub fn action(&self) -> AuditAction {
        self.action
    }
}

/// Position after which the next page starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditCursor {
    pub at: DateTime<Utc>,
    pub sequence: u64,
}

impl AuditCursor {
    pub fn encode(&self) -> String {
        format!(
            "{}_{}",
            self.at.to_rfc3339_opts(SecondsFormat::Nanos, true),
            self.sequence
        )
    }

    pub fn decode(raw: &str) -> Option<Self> {
        let (at, sequence) = raw.trim().rsplit_once('_')?;
        let at = DateTime::parse_from_rfc3339(at).ok()?.with_timezone(&Utc);
        Some(Self {
            at,
            sequence: sequence.parse().ok()?,
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuditFilter {
    pub action: Option<AuditAction>,
    pub target_type: Option<TargetType>,
    pub actor: Option<ActorId>,
}

impl AuditFilter {
    pub fn matches(&self, entry: &AuditEntry) -> bool {
        self.action.map_or(true, |action| entry.action == action)
            && self
                .target_type
                .map_or(true, |kind| entry.target.kind == kind)
            && self
                .actor
                .as_ref()
                .map_or(true, |actor| entry.actor.as_ref() == Some(actor))
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AuditPage {
    pub entries: Vec<AuditEntry>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_cursor: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuditStats {
    pub window_days: u32,
    pub total: u64,
    pub by_action: BTreeMap<AuditAction, u64>,
    pub by_target: BTreeMap<TargetType, u64>,
    pub successes: u64,
    pub errors: u64,
}

#[derive(Clone)]
pub struct AuditLog {
    store: Arc<dyn AuditStore>,
    clock: Arc<dyn Clock>,
}

impl fmt::Debug for AuditLog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuditLog").finish_non_exhaustive()
    }
}

impl AuditLog {
    pub fn new(store: Arc<dyn AuditStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    pub fn append(&self, event: AuditEvent) -> Result<AuditEntry, RepositoryError> {
        let AuditEvent {
            action,
            actor,
            target,
            change,
            detail,
        } = event;

        let entry = AuditEntry {
            id: Uuid::new_v4().to_string(),
            sequence: 0,
            action,
            actor,
            target,
            change,
            detail,
            at: self.clock.now(),
        };

        let stored = self.store.append(entry)?;
        debug!(
            action = %stored.action,
            target = %stored.target.id,
            sequence = stored.sequence,
            "audit entry appended"
        );
        Ok(stored)
    }

    pub fn list(
        &self,
        filter: &AuditFilter,
        cursor: Option<&AuditCursor>,
        limit: Option<usize>,
    ) -> Result<AuditPage, RepositoryError> {
        let limit = limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE);
        let mut entries = self.store.query(filter, cursor, limit + 1)?;

        let next_cursor = if entries.len() > limit {
            entries.truncate(limit);
            entries.last().map(|entry| entry.cursor().encode())
        } else {
            None
        };

        Ok(AuditPage {
            entries,
            next_cursor,
        })
    }

    pub fn stats(&self, window_days: u32) -> Result<AuditStats, RepositoryError> {
        let window_days = window_days.clamp(1, MAX_STATS_WINDOW_DAYS);
        let from = self.clock.now() - Duration::days(i64::from(window_days));
        let entries = self.store.since(from)?;

        let mut stats = AuditStats {
            window_days,
            total: 0,
            by_action: BTreeMap::new(),
            by_target: BTreeMap::new(),
            successes: 0,
            errors: 0,
        };

        for entry in &entries {
            stats.total += 1;
            *stats.by_action.entry(entry.action).or_default() += 1;
            *stats.by_target.entry(entry.target.kind).or_default() += 1;
            if entry.action.is_failure() {
                stats.errors += 1;
            } else {
                stats.successes += 1;
            }
        }

        Ok(stats)
    }
}
