use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;
use tracing::{debug, error, info, warn};

use super::queue::JobHandler;
use super::Job;
use crate::workflows::profiles::audit::{AuditAction, AuditEvent, TargetType};
use crate::workflows::profiles::domain::{
    Profile, ProfileId, ProfilePatch, ProfileStatus, TranslatedFields,
};
use crate::workflows::profiles::integrations::{
    CatalogGateway, IntegrationError, PlatformPublisher, TranslationGateway,
};
use crate::workflows::profiles::lifecycle::{LifecycleEngine, LifecycleError};
use crate::workflows::profiles::repository::RepositoryError;

/// Errors that make a delivery count as failed. Integration failures never
/// appear here; they end as audit entries and `false` results.
#[derive(Debug, thiserror::Error)]
pub enum JobError {
    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

/// Executes follow-up jobs against the engine's store. Each handler re-reads
/// the profile and writes only its own patch variant.
pub struct JobRunner {
    engine: Arc<LifecycleEngine>,
    translator: Arc<dyn TranslationGateway>,
    publishers: Vec<Arc<dyn PlatformPublisher>>,
    catalog: Arc<dyn CatalogGateway>,
}

impl fmt::Debug for JobRunner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let platforms: Vec<_> = self
            .publishers
            .iter()
            .map(|publisher| publisher.platform())
            .collect();
        f.debug_struct("JobRunner")
            .field("platforms", &platforms)
            .finish_non_exhaustive()
    }
}

impl JobRunner {
    pub fn new(
        engine: Arc<LifecycleEngine>,
        translator: Arc<dyn TranslationGateway>,
        publishers: Vec<Arc<dyn PlatformPublisher>>,
        catalog: Arc<dyn CatalogGateway>,
    ) -> Self {
        Self {
            engine,
            translator,
            publishers,
            catalog,
        }
    }

    pub async fn run(&self, job: &Job) -> Result<(), JobError> {
        debug!(kind = %job.kind(), profile_id = %job.profile_id(), "running job");
        match job {
            Job::Validate { profile_id } => self.validate(profile_id),
            Job::Translate { profile_id } => self.translate(profile_id).await,
            Job::Distribute { profile_id } => self.distribute(profile_id).await,
            Job::CatalogSync { profile_id } => self.sync_catalog(profile_id).await,
        }
    }

    fn validate(&self, id: &ProfileId) -> Result<(), JobError> {
        match self.engine.run_validation(id) {
            Ok(_) => Ok(()),
            Err(LifecycleError::NotFound(_)) => {
                warn!(profile_id = %id, "profile removed before validation");
                Ok(())
            }
            Err(err) => Err(err.into()),
        }
    }

    async fn translate(&self, id: &ProfileId) -> Result<(), JobError> {
        let Some(profile) = self.engine.profiles().fetch(id)? else {
            warn!(profile_id = %id, "profile removed before translation");
            return Ok(());
        };
        if !matches!(
            profile.status,
            ProfileStatus::Accepted | ProfileStatus::Published
        ) {
            debug!(profile_id = %id, status = %profile.status, "translation skipped");
            return Ok(());
        }

        let fields = match self.translate_fields(&profile).await {
            Ok(fields) => fields,
            Err(err) => {
                warn!(profile_id = %id, error = %err, "translation failed");
                self.record(
                    event(AuditAction::TranslationFailure, &profile)
                        .with_detail(json!({ "error": err.to_string() })),
                );
                return Ok(());
            }
        };

        let names = fields.field_names();
        let original_characteristics = fields
            .characteristics
            .as_ref()
            .and(profile.characteristics.clone());
        let patch = ProfilePatch::Translation {
            fields,
            original_characteristics,
        };

        match self.engine.profiles().patch(id, patch, self.engine.now()) {
            Ok(_) => {
                info!(profile_id = %id, fields = ?names, "profile translated");
                self.record(
                    event(AuditAction::TranslationSuccess, &profile)
                        .with_detail(json!({ "fields": names })),
                );
                Ok(())
            }
            Err(RepositoryError::NotFound) => {
                self.record(
                    event(AuditAction::TranslationFailure, &profile)
                        .with_detail(json!({ "error": "profile removed during translation" })),
                );
                Ok(())
            }
            Err(err) => Err(err.into()),
        }
    }

    async fn translate_fields(
        &self,
        profile: &Profile,
    ) -> Result<TranslatedFields, IntegrationError> {
        Ok(TranslatedFields {
            desc_short: self.translate_one(Some(&profile.desc_short)).await?,
            characteristics: self
                .translate_one(profile.characteristics.as_ref())
                .await?,
            compatibility: self.translate_one(profile.compatibility.as_ref()).await?,
            diseases: self.translate_one(profile.diseases.as_ref()).await?,
            handicaps: self.translate_one(profile.handicaps.as_ref()).await?,
            health: self.translate_one(profile.health.as_ref()).await?,
        })
    }

    async fn translate_one(
        &self,
        source: Option<&String>,
    ) -> Result<Option<String>, IntegrationError> {
        match source.map(|text| text.trim()).filter(|text| !text.is_empty()) {
            Some(text) => self.translator.translate(text).await.map(Some),
            None => Ok(None),
        }
    }

    /// Posts to every platform in order. A platform failure only flips its
    /// own flag; the job itself is never redelivered, so nothing posts twice.
    async fn distribute(&self, id: &ProfileId) -> Result<(), JobError> {
        let Some(profile) = self.published_profile(id, AuditAction::DistributionFailure)? else {
            return Ok(());
        };

        let mut platforms = BTreeMap::new();
        for publisher in &self.publishers {
            let delivered = publisher.send(&profile).await;
            platforms.insert(publisher.platform(), delivered);
        }

        let distributed_at = self.engine.now();
        let patch = ProfilePatch::Distribution {
            platforms: platforms.clone(),
            distributed_at,
        };
        match self.engine.profiles().patch(id, patch, distributed_at) {
            Ok(_) => {
                info!(profile_id = %id, platforms = ?platforms, "profile distributed");
                self.record(
                    event(AuditAction::DistributionSuccess, &profile).with_detail(json!({
                        "platforms": platforms,
                        "distributed_at": distributed_at,
                    })),
                );
            }
            Err(err) => {
                error!(profile_id = %id, error = %err, "failed to store distribution result");
                self.record(
                    event(AuditAction::DistributionFailure, &profile).with_detail(json!({
                        "error": err.to_string(),
                        "platforms": platforms,
                    })),
                );
            }
        }
        Ok(())
    }

    async fn sync_catalog(&self, id: &ProfileId) -> Result<(), JobError> {
        let Some(profile) = self.published_profile(id, AuditAction::MatchpfoteSyncFailure)?
        else {
            return Ok(());
        };

        let failure = match self.catalog.send(&profile).await {
            Ok(true) => None,
            Ok(false) => Some(IntegrationError::NotConfigured("matchpfote").to_string()),
            Err(err) => Some(err.to_string()),
        };

        let synced_at = self.engine.now();
        let patch = ProfilePatch::CatalogSync {
            synced: failure.is_none(),
            synced_at,
        };
        if let Err(err) = self.engine.profiles().patch(id, patch, synced_at) {
            error!(profile_id = %id, error = %err, "failed to store catalog sync result");
            self.record(
                event(AuditAction::MatchpfoteSyncFailure, &profile)
                    .with_detail(json!({ "error": err.to_string() })),
            );
            return Ok(());
        }

        match failure {
            None => self.record(event(AuditAction::MatchpfoteSyncSuccess, &profile)),
            Some(error) => {
                warn!(profile_id = %id, %error, "catalog sync failed");
                self.record(
                    event(AuditAction::MatchpfoteSyncFailure, &profile)
                        .with_detail(json!({ "error": error })),
                );
            }
        }
        Ok(())
    }

    /// The profile if it still exists and is PUBLISHED; otherwise audits
    /// `failure` and returns `None`.
    fn published_profile(
        &self,
        id: &ProfileId,
        failure: AuditAction,
    ) -> Result<Option<Profile>, JobError> {
        let Some(profile) = self.engine.profiles().fetch(id)? else {
            warn!(profile_id = %id, action = %failure, "profile not found");
            self.record(
                AuditEvent::new(failure, TargetType::Profile, id.to_string())
                    .with_detail(json!({ "error": "profile not found" })),
            );
            return Ok(None);
        };

        if profile.status != ProfileStatus::Published {
            warn!(profile_id = %id, status = %profile.status, "profile is not published");
            self.record(event(failure, &profile).with_detail(json!({
                "error": "profile is not published",
                "status": profile.status.label(),
            })));
            return Ok(None);
        }

        Ok(Some(profile))
    }

    fn record(&self, event: AuditEvent) {
        if let Err(err) = self.engine.audit_log().append(event) {
            error!(error = %err, "failed to append job audit entry");
        }
    }
}

#[async_trait]
impl JobHandler for JobRunner {
    async fn handle(&self, job: &Job) -> Result<(), JobError> {
        self.run(job).await
    }
}

fn event(action: AuditAction, profile: &Profile) -> AuditEvent {
    AuditEvent::new(action, TargetType::Profile, profile.id.to_string()).named(profile.name.clone())
}
