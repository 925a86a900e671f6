use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};

use crate::clock::{Clock, ManualClock};
use crate::config::JobConfig;
use crate::workflows::profiles::audit::{
    AuditAction, AuditCursor, AuditEntry, AuditFilter, AuditLog,
};
use crate::workflows::profiles::domain::{Actor, Platform, Profile, ProfileDraft, Role};
use crate::workflows::profiles::integrations::{
    CatalogGateway, IntegrationError, PlatformPublisher, TranslationGateway,
};
use crate::workflows::profiles::jobs::{Job, JobRunner, RecordingScheduler};
use crate::workflows::profiles::lifecycle::LifecycleEngine;
use crate::workflows::profiles::memory::{
    InMemoryAuditStore, InMemoryProfileRepository, InMemoryRateLimitStore,
};
use crate::workflows::profiles::rate_limit::{RateLimitConfig, RateLimiter};
use crate::workflows::profiles::repository::{AuditStore, ProfileRepository, RepositoryError};

pub(super) fn start() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 3, 9, 0, 0).unwrap()
}

pub(super) fn author() -> Actor {
    Actor::new("author-1", Role::Author)
}

pub(super) fn reviewer() -> Actor {
    Actor::new("reviewer-1", Role::Reviewer)
}

pub(super) fn admin() -> Actor {
    Actor::new("admin-1", Role::Administrator)
}

pub(super) fn valid_draft() -> ProfileDraft {
    ProfileDraft {
        name: "Luna".to_string(),
        category: "Hund".to_string(),
        desc_short: "Verspielte Hündin, liebt lange Spaziergänge.".to_string(),
        location: "Tierheim Berlin".to_string(),
        gallery: vec!["gallery/luna-1.jpg".to_string()],
        characteristics: Some("verspielt und verschmust".to_string()),
        compatibility: Some("verträgt sich mit Katzen".to_string()),
        birth_date: Some("14.03.2019".to_string()),
        size: Some("55".to_string()),
        seeking_home_since: Some("2023".to_string()),
        ..ProfileDraft::default()
    }
}

/// Fails exactly the description-length and gallery rules.
pub(super) fn short_draft_without_images() -> ProfileDraft {
    ProfileDraft {
        desc_short: "Lieb.".to_string(),
        gallery: Vec::new(),
        ..valid_draft()
    }
}

pub(super) struct Harness {
    pub engine: Arc<LifecycleEngine>,
    pub profiles: InMemoryProfileRepository,
    pub audit: InMemoryAuditStore,
    pub rate_limits: InMemoryRateLimitStore,
    pub scheduler: Arc<RecordingScheduler>,
    pub clock: Arc<ManualClock>,
}

pub(super) fn harness() -> Harness {
    harness_with(RateLimitConfig::default(), RecordingScheduler::default())
}

pub(super) fn harness_with(limits: RateLimitConfig, scheduler: RecordingScheduler) -> Harness {
    let audit = InMemoryAuditStore::default();
    build(limits, scheduler, Arc::new(audit.clone()), audit)
}

/// Harness whose audit store is down for the given actions.
pub(super) fn harness_refusing_audit(refused: Vec<AuditAction>) -> Harness {
    let audit = InMemoryAuditStore::default();
    let store = RefusingAuditStore {
        inner: audit.clone(),
        refused,
    };
    build(
        RateLimitConfig::default(),
        RecordingScheduler::default(),
        Arc::new(store),
        audit,
    )
}

fn build(
    limits: RateLimitConfig,
    scheduler: RecordingScheduler,
    audit_store: Arc<dyn AuditStore>,
    audit: InMemoryAuditStore,
) -> Harness {
    let profiles = InMemoryProfileRepository::default();
    let rate_limits = InMemoryRateLimitStore::default();
    let scheduler = Arc::new(scheduler);
    let clock = Arc::new(ManualClock::new(start()));
    let shared_clock: Arc<dyn Clock> = clock.clone();

    let engine = LifecycleEngine::new(
        Arc::new(profiles.clone()),
        AuditLog::new(audit_store, shared_clock.clone()),
        RateLimiter::new(Arc::new(rate_limits.clone()), limits, shared_clock.clone()),
        scheduler.clone(),
        shared_clock,
    )
    .with_job_config(JobConfig::default());

    Harness {
        engine: Arc::new(engine),
        profiles,
        audit,
        rate_limits,
        scheduler,
        clock,
    }
}

impl Harness {
    pub fn audit_actions(&self) -> Vec<AuditAction> {
        self.audit.entries().iter().map(|entry| entry.action).collect()
    }

    pub fn last_audit(&self) -> AuditEntry {
        self.audit
            .entries()
            .into_iter()
            .max_by_key(|entry| entry.sequence)
            .expect("audit trail is empty")
    }

    pub fn take_jobs(&self) -> Vec<(Job, Duration)> {
        self.scheduler.take()
    }

    pub fn reload(&self, profile: &Profile) -> Profile {
        self.profiles
            .fetch(&profile.id)
            .expect("store available")
            .expect("profile exists")
    }

    pub fn submit(&self, draft: ProfileDraft) -> Profile {
        self.engine.submit(draft, &author()).expect("submit succeeds")
    }

    /// A validated profile, with the follow-up jobs drained.
    pub fn accepted(&self) -> Profile {
        let profile = self.submit(valid_draft());
        self.engine
            .run_validation(&profile.id)
            .expect("validation runs");
        self.take_jobs();
        self.reload(&profile)
    }

    pub fn published(&self) -> Profile {
        let profile = self.accepted();
        let published = self
            .engine
            .set_status(
                &profile.id,
                crate::workflows::profiles::domain::ProfileStatus::Published,
                &reviewer(),
            )
            .expect("publication succeeds");
        self.take_jobs();
        published
    }

    pub fn runner(
        &self,
        translator: Arc<dyn TranslationGateway>,
        publishers: Vec<Arc<dyn PlatformPublisher>>,
        catalog: Arc<dyn CatalogGateway>,
    ) -> JobRunner {
        JobRunner::new(self.engine.clone(), translator, publishers, catalog)
    }

    pub fn default_runner(&self) -> JobRunner {
        self.runner(
            Arc::new(PrefixTranslator::default()),
            fixed_publishers([true, true, true, true]),
            Arc::new(FixedCatalog::synced()),
        )
    }
}

struct RefusingAuditStore {
    inner: InMemoryAuditStore,
    refused: Vec<AuditAction>,
}

impl AuditStore for RefusingAuditStore {
    fn append(&self, entry: AuditEntry) -> Result<AuditEntry, RepositoryError> {
        if self.refused.contains(&entry.action) {
            return Err(RepositoryError::Unavailable("store down".to_string()));
        }
        self.inner.append(entry)
    }

    fn query(
        &self,
        filter: &AuditFilter,
        cursor: Option<&AuditCursor>,
        limit: usize,
    ) -> Result<Vec<AuditEntry>, RepositoryError> {
        self.inner.query(filter, cursor, limit)
    }

    fn since(&self, from: DateTime<Utc>) -> Result<Vec<AuditEntry>, RepositoryError> {
        self.inner.since(from)
    }
}

/// Translates by prefixing, optionally failing on one input.
#[derive(Debug, Default)]
pub(super) struct PrefixTranslator {
    pub fail_on: Option<String>,
    pub calls: AtomicUsize,
}

#[async_trait]
impl TranslationGateway for PrefixTranslator {
    async fn translate(&self, text: &str) -> Result<String, IntegrationError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_on.as_deref() == Some(text) {
            return Err(IntegrationError::RetriesExhausted {
                integration: "deepl",
                attempts: 3,
                last: "HTTP 503".to_string(),
            });
        }
        Ok(format!("EN: {text}"))
    }
}

#[derive(Debug)]
pub(super) struct FixedPublisher {
    pub platform: Platform,
    pub result: bool,
    pub calls: AtomicUsize,
}

#[async_trait]
impl PlatformPublisher for FixedPublisher {
    fn platform(&self) -> Platform {
        self.platform
    }

    async fn send(&self, _profile: &Profile) -> bool {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.result
    }
}

pub(super) fn fixed_publisher(platform: Platform, result: bool) -> Arc<FixedPublisher> {
    Arc::new(FixedPublisher {
        platform,
        result,
        calls: AtomicUsize::new(0),
    })
}

pub(super) fn fixed_publishers(results: [bool; 4]) -> Vec<Arc<dyn PlatformPublisher>> {
    Platform::ordered()
        .into_iter()
        .zip(results)
        .map(|(platform, result)| fixed_publisher(platform, result) as Arc<dyn PlatformPublisher>)
        .collect()
}

#[derive(Debug)]
pub(super) struct FixedCatalog {
    outcome: Result<bool, &'static str>,
}

impl FixedCatalog {
    pub fn synced() -> Self {
        Self { outcome: Ok(true) }
    }

    pub fn failing() -> Self {
        Self {
            outcome: Err("HTTP 500"),
        }
    }
}

#[async_trait]
impl CatalogGateway for FixedCatalog {
    async fn send(&self, _profile: &Profile) -> Result<bool, IntegrationError> {
        self.outcome.map_err(|message| IntegrationError::Http {
            integration: "matchpfote",
            status: 500,
            body: message.to_string(),
        })
    }
}
