use crate::config::TelemetryConfig;
use std::fmt;
use tracing_subscriber::filter::ParseError;
use tracing_subscriber::EnvFilter;

/// Transport crates that log every connection at debug level.
const QUIET_DEPENDENCIES: &[&str] = &["hyper=warn", "hyper_util=warn", "reqwest=warn"];

#[derive(Debug)]
pub enum TelemetryError {
    EnvFilter { value: String, source: ParseError },
    Subscriber(Box<dyn std::error::Error + Send + Sync>),
}

impl fmt::Display for TelemetryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TelemetryError::EnvFilter { value, .. } => {
                write!(
                    f,
                    "invalid log level/filter '{}': unable to build EnvFilter",
                    value
                )
            }
            TelemetryError::Subscriber(err) => write!(f, "telemetry error: {err}"),
        }
    }
}

impl std::error::Error for TelemetryError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            TelemetryError::EnvFilter { source, .. } => Some(source),
            TelemetryError::Subscriber(err) => Some(&**err),
        }
    }
}

/// Installs the global subscriber. `RUST_LOG` wins over the configured level.
pub fn init(config: &TelemetryConfig) -> Result<(), TelemetryError> {
    let env_filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => build_filter(&config.log_level)?,
    };

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(true)
        .compact()
        .with_ansi(false)
        .try_init()
        .map_err(TelemetryError::Subscriber)
}

fn build_filter(log_level: &str) -> Result<EnvFilter, TelemetryError> {
    let directives = if log_level.contains('=') || log_level.contains(',') {
        log_level.to_string()
    } else {
        let mut parts = vec![log_level.to_string()];
        parts.extend(QUIET_DEPENDENCIES.iter().map(|item| item.to_string()));
        parts.join(",")
    };

    EnvFilter::try_new(&directives).map_err(|source| TelemetryError::EnvFilter {
        value: log_level.to_string(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_level_quiets_transport_crates() {
        let filter = build_filter("debug").expect("filter builds");
        let rendered = filter.to_string();
        assert!(rendered.contains("debug"));
        assert!(rendered.contains("reqwest=warn"));
    }

    #[test]
    fn explicit_directives_are_kept_verbatim() {
        let filter = build_filter("shelter_intake=trace").expect("filter builds");
        assert!(!filter.to_string().contains("reqwest"));
    }

    #[test]
    fn invalid_directive_reports_value() {
        match build_filter("shelter_intake=loud") {
            Err(TelemetryError::EnvFilter { value, .. }) => {
                assert_eq!(value, "shelter_intake=loud")
            }
            other => panic!("expected filter error, got {other:?}"),
        }
    }
}
