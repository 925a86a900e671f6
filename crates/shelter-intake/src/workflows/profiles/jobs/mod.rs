//! Follow-up work scheduled by lifecycle transitions and the worker that
//! delivers it.

mod queue;
mod runner;

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::domain::ProfileId;

pub use queue::{JobHandler, JobReceiver, JobWorker, RecordingScheduler, TokioJobQueue};
pub use runner::{JobError, JobRunner};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    Validate,
    Translate,
    Distribute,
    CatalogSync,
}

impl JobKind {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Validate => "validate",
            Self::Translate => "translate",
            Self::Distribute => "distribute",
            Self::CatalogSync => "catalog_sync",
        }
    }
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// A unit of follow-up work. Every job carries only the profile id; handlers
/// re-read the record so they always act on current state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Job {
    Validate { profile_id: ProfileId },
    Translate { profile_id: ProfileId },
    Distribute { profile_id: ProfileId },
    CatalogSync { profile_id: ProfileId },
}

impl Job {
    pub fn kind(&self) -> JobKind {
        match self {
            Self::Validate { .. } => JobKind::Validate,
            Self::Translate { .. } => JobKind::Translate,
            Self::Distribute { .. } => JobKind::Distribute,
            Self::CatalogSync { .. } => JobKind::CatalogSync,
        }
    }

    pub fn profile_id(&self) -> &ProfileId {
        match self {
            Self::Validate { profile_id }
            | Self::Translate { profile_id }
            | Self::Distribute { profile_id }
            | Self::CatalogSync { profile_id } => profile_id,
        }
    }
}

/// Opaque receipt for an enqueued job.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct JobHandle(pub String);

impl fmt::Display for JobHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Accepts follow-up work for later delivery. Implementations must not run
/// the job inline.
pub trait JobScheduler: Send + Sync {
    fn enqueue(&self, job: Job, delay: Duration) -> Result<JobHandle, SchedulerError>;
}

#[derive(Debug, thiserror::Error)]
pub enum SchedulerError {
    #[error("job queue is closed")]
    Closed,
}
