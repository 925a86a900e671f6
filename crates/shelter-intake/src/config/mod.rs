use std::env;
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

/// Distinguishes runtime behavior for different stages of the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppEnvironment {
    Development,
    Test,
    Production,
}

impl AppEnvironment {
    fn from_str(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "prod" | "production" => Self::Production,
            "test" | "ci" => Self::Test,
            _ => Self::Development,
        }
    }
}

/// Top-level configuration for the application.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub environment: AppEnvironment,
    pub server: ServerConfig,
    pub telemetry: TelemetryConfig,
    pub jobs: JobConfig,
    pub publishing: PublishingConfig,
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let environment = AppEnvironment::from_str(
            &env::var("APP_ENV").unwrap_or_else(|_| "development".to_string()),
        );

        let host = env::var("APP_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port = env::var("APP_PORT")
            .unwrap_or_else(|_| "3000".to_string())
            .parse::<u16>()
            .map_err(|_| ConfigError::InvalidPort)?;

        let log_level = env::var("APP_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        let defaults = JobConfig::default();
        let jobs = JobConfig {
            catalog_sync_delay: Duration::from_secs(parse_number(
                "JOB_CATALOG_SYNC_DELAY_SECS",
                defaults.catalog_sync_delay.as_secs(),
            )?),
            max_deliveries: parse_number("JOB_MAX_DELIVERIES", defaults.max_deliveries)?,
            redelivery_backoff: Duration::from_millis(parse_number(
                "JOB_REDELIVERY_BACKOFF_MS",
                defaults.redelivery_backoff.as_millis() as u64,
            )?),
        };

        let publishing_defaults = PublishingConfig::default();
        let publishing = PublishingConfig {
            public_base_url: env::var("PUBLIC_PROFILE_BASE_URL")
                .unwrap_or(publishing_defaults.public_base_url),
            media_base_url: env::var("PUBLIC_MEDIA_BASE_URL")
                .unwrap_or(publishing_defaults.media_base_url),
        };

        Ok(Self {
            environment,
            server: ServerConfig { host, port },
            telemetry: TelemetryConfig { log_level },
            jobs,
            publishing,
        })
    }
}

fn parse_number<T>(var: &'static str, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
{
    match env::var(var) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|_| ConfigError::InvalidNumber { var }),
        Err(_) => Ok(default),
    }
}

/// Reads a credential variable, treating blank values as absent.
pub fn credential(var: &str) -> Option<String> {
    env::var(var)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

/// Settings controlling the HTTP server binding.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl ServerConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        if self.host.eq_ignore_ascii_case("localhost") {
            return Ok(SocketAddr::new(IpAddr::from([127, 0, 0, 1]), self.port));
        }

        let ip: IpAddr = self
            .host
            .parse()
            .map_err(|source| ConfigError::InvalidHost { source })?;

        Ok(SocketAddr::new(ip, self.port))
    }
}

/// Tracing and metrics controls.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub log_level: String,
}

/// Follow-up job dispatch settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobConfig {
    /// Delay between a publication and its catalog sync, so the distribution
    /// patch lands first.
    pub catalog_sync_delay: Duration,
    /// Total deliveries of a job whose handler returned an error.
    pub max_deliveries: u32,
    pub redelivery_backoff: Duration,
}

impl Default for JobConfig {
    fn default() -> Self {
        Self {
            catalog_sync_delay: Duration::from_secs(15),
            max_deliveries: 3,
            redelivery_backoff: Duration::from_millis(500),
        }
    }
}

/// Settings shared by the outbound publishing clients.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishingConfig {
    /// Prefix of the public profile page; the profile id is appended.
    pub public_base_url: String,
    /// Prefix under which gallery object keys are publicly readable.
    pub media_base_url: String,
}

impl PublishingConfig {
    pub fn profile_url(&self, profile_id: &str) -> String {
        format!("{}/{}", self.public_base_url.trim_end_matches('/'), profile_id)
    }

    pub fn media_url(&self, key: &str) -> String {
        format!(
            "{}/{}",
            self.media_base_url.trim_end_matches('/'),
            key.trim_start_matches('/')
        )
    }
}

impl Default for PublishingConfig {
    fn default() -> Self {
        Self {
            public_base_url: "http://localhost:3000/tiere".to_string(),
            media_base_url: "http://localhost:3000/media".to_string(),
        }
    }
}

#[derive(Debug)]
pub enum ConfigError {
    InvalidPort,
    InvalidHost { source: std::net::AddrParseError },
    InvalidNumber { var: &'static str },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidPort => write!(f, "APP_PORT must be a valid u16"),
            ConfigError::InvalidHost { .. } => {
                write!(f, "APP_HOST must parse to an IPv4 or IPv6 address")
            }
            ConfigError::InvalidNumber { var } => {
                write!(f, "{var} must be a non-negative integer")
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::InvalidPort | ConfigError::InvalidNumber { .. } => None,
            ConfigError::InvalidHost { source } => Some(source),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use std::sync::{Mutex, OnceLock};

    fn env_guard() -> &'static Mutex<()> {
        static GUARD: OnceLock<Mutex<()>> = OnceLock::new();
        GUARD.get_or_init(|| Mutex::new(()))
    }

    fn reset_env() {
        for var in [
            "APP_ENV",
            "APP_HOST",
            "APP_PORT",
            "APP_LOG_LEVEL",
            "JOB_CATALOG_SYNC_DELAY_SECS",
            "JOB_MAX_DELIVERIES",
            "JOB_REDELIVERY_BACKOFF_MS",
            "PUBLIC_PROFILE_BASE_URL",
            "PUBLIC_MEDIA_BASE_URL",
        ] {
            env::remove_var(var);
        }
    }

    #[test]
    fn load_uses_defaults_when_env_missing() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        let config = AppConfig::load().expect("config loads with defaults");
        assert_eq!(config.environment, AppEnvironment::Development);
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 3000);
        assert_eq!(config.telemetry.log_level, "info");
        assert_eq!(config.jobs, JobConfig::default());
        assert_eq!(config.publishing, PublishingConfig::default());
    }

    #[test]
    fn accepts_localhost_host() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        env::set_var("APP_HOST", "localhost");
        let config = AppConfig::load().expect("config loads");
        let addr = config.server.socket_addr().expect("localhost resolves");
        assert_eq!(addr, SocketAddr::new(IpAddr::from([127, 0, 0, 1]), 3000));
        reset_env();
    }

    #[test]
    fn job_overrides_are_parsed() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        env::set_var("JOB_CATALOG_SYNC_DELAY_SECS", "45");
        env::set_var("JOB_MAX_DELIVERIES", "1");
        let config = AppConfig::load().expect("config loads");
        assert_eq!(config.jobs.catalog_sync_delay, Duration::from_secs(45));
        assert_eq!(config.jobs.max_deliveries, 1);
        reset_env();
    }

    #[test]
    fn rejects_non_numeric_job_settings() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        env::set_var("JOB_MAX_DELIVERIES", "many");
        match AppConfig::load() {
            Err(ConfigError::InvalidNumber { var }) => assert_eq!(var, "JOB_MAX_DELIVERIES"),
            other => panic!("expected invalid number, got {other:?}"),
        }
        reset_env();
    }

    #[test]
    fn publishing_urls_join_without_double_slashes() {
        let publishing = PublishingConfig {
            public_base_url: "https://tierheim.example/tiere/".to_string(),
            media_base_url: "https://cdn.example/media/".to_string(),
        };
        assert_eq!(
            publishing.profile_url("abc"),
            "https://tierheim.example/tiere/abc"
        );
        assert_eq!(
            publishing.media_url("/gallery/1.jpg"),
            "https://cdn.example/media/gallery/1.jpg"
        );
    }

    #[test]
    fn blank_credentials_are_treated_as_absent() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        env::set_var("SHELTER_TEST_CREDENTIAL", "   ");
        assert_eq!(credential("SHELTER_TEST_CREDENTIAL"), None);
        env::set_var("SHELTER_TEST_CREDENTIAL", " token ");
        assert_eq!(
            credential("SHELTER_TEST_CREDENTIAL").as_deref(),
            Some("token")
        );
        env::remove_var("SHELTER_TEST_CREDENTIAL");
    }
}
