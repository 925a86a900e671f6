mod config;
mod rules;

pub use config::ValidationConfig;

use chrono::NaiveDate;
use serde::Serialize;

use super::domain::Profile;

/// One violated rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    pub field: &'static str,
    pub message: String,
}

impl FieldError {
    pub fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

/// Verdict of a validation run, errors in rule order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationReport {
    pub errors: Vec<FieldError>,
}

impl ValidationReport {
    pub fn passed(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn fields(&self) -> Vec<&'static str> {
        self.errors.iter().map(|error| error.field).collect()
    }
}

/// Stateless rule set run over draft profiles.
#[derive(Debug, Clone, Default)]
pub struct ValidationEngine {
    config: ValidationConfig,
}

impl ValidationEngine {
    pub fn new(config: ValidationConfig) -> Self {
        Self { config }
    }

    /// `today` bounds the year rules; every rule runs, nothing short-circuits.
    pub fn validate(&self, profile: &Profile, today: NaiveDate) -> ValidationReport {
        ValidationReport {
            errors: rules::check_profile(profile, &self.config, today),
        }
    }
}
