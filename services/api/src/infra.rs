use chrono::NaiveDate;
use metrics_exporter_prometheus::PrometheusHandle;
use shelter_intake::clock::Clock;
use shelter_intake::config::JobConfig;
use shelter_intake::workflows::profiles::{
    AuditLog, InMemoryAuditStore, InMemoryProfileRepository, InMemoryRateLimitStore,
    JobScheduler, LifecycleEngine, RateLimitConfig, RateLimiter, ValidationConfig,
};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

/// Engine over fresh in-process stores. Profiles, audit entries and
/// rate-limit records live as long as the process.
pub(crate) fn in_memory_engine(
    scheduler: Arc<dyn JobScheduler>,
    clock: Arc<dyn Clock>,
    jobs: JobConfig,
) -> LifecycleEngine {
    LifecycleEngine::new(
        Arc::new(InMemoryProfileRepository::default()),
        AuditLog::new(Arc::new(InMemoryAuditStore::default()), clock.clone()),
        RateLimiter::new(
            Arc::new(InMemoryRateLimitStore::default()),
            RateLimitConfig::default(),
            clock.clone(),
        ),
        scheduler,
        clock,
    )
    .with_validation(ValidationConfig::default())
    .with_job_config(jobs)
}

pub(crate) fn parse_date(raw: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .map_err(|err| format!("failed to parse '{raw}' as YYYY-MM-DD ({err})"))
}
