mod service;
pub mod transition;

use axum::http::StatusCode;
use chrono::{DateTime, Utc};

use super::domain::{ProfileId, ProfileStatus, Role};
use super::jobs::SchedulerError;
use super::rate_limit::RateLimitedAction;
use super::repository::RepositoryError;

pub use service::{LifecycleEngine, ValidationOutcome};

/// Fatal outcomes of a synchronous lifecycle call.
#[derive(Debug, thiserror::Error)]
pub enum LifecycleError {
    #[error("role {role} may not {operation}")]
    Unauthorized {
        role: Role,
        operation: &'static str,
    },
    #[error("cannot move profile from {from} to {to}")]
    InvalidTransition {
        from: ProfileStatus,
        to: ProfileStatus,
    },
    #[error("rate limit for {action} exceeded until {reset_at}")]
    RateLimited {
        action: RateLimitedAction,
        reset_at: DateTime<Utc>,
    },
    #[error("profile {0} not found")]
    NotFound(ProfileId),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
    #[error(transparent)]
    Scheduler(#[from] SchedulerError),
}

impl LifecycleError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Unauthorized { .. } => StatusCode::FORBIDDEN,
            Self::InvalidTransition { .. } => StatusCode::CONFLICT,
            Self::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Repository(_) | Self::Scheduler(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}
