use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::RETRY_AFTER;
use serde::Serialize;
use tracing::{debug, info, warn};

use super::retry::{parse_retry_after, retry_with_policy, AttemptError, RequestPacer, RetryPolicy};
use super::{CatalogGateway, IntegrationError};
use crate::config::{credential, PublishingConfig};
use crate::workflows::profiles::domain::Profile;

const INTEGRATION: &str = "matchpfote";
/// Published ceiling of the registry API.
const REQUESTS_PER_MINUTE: u32 = 100;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogCredentials {
    pub api_url: String,
    pub api_key: String,
}

impl CatalogCredentials {
    pub fn from_env() -> Option<Self> {
        Some(Self {
            api_url: credential("MATCHPFOTE_API_URL")?,
            api_key: credential("MATCHPFOTE_API_KEY")?,
        })
    }
}

/// Registry representation of a published profile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogListing {
    pub external_id: String,
    pub name: String,
    pub category: String,
    pub description: String,
    pub location: String,
    pub images: Vec<String>,
    pub profile_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub birth_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size_cm: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seeking_home_since: Option<i32>,
}

impl CatalogListing {
    pub fn from_profile(profile: &Profile, publishing: &PublishingConfig) -> Self {
        Self {
            external_id: profile.id.0.clone(),
            name: profile.name.clone(),
            category: profile.category.clone(),
            description: profile
                .translated
                .desc_short
                .clone()
                .unwrap_or_else(|| profile.desc_short.clone()),
            location: profile.location.clone(),
            images: profile
                .gallery
                .iter()
                .map(|key| publishing.media_url(key))
                .collect(),
            profile_url: publishing.profile_url(&profile.id.0),
            birth_date: profile.birth_date.clone(),
            size_cm: profile
                .size
                .as_deref()
                .and_then(|raw| raw.trim().parse().ok()),
            seeking_home_since: profile
                .seeking_home_since
                .as_deref()
                .and_then(|raw| raw.trim().parse().ok()),
        }
    }
}

/// Raw outcome of one upsert call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportResponse {
    pub status: u16,
    pub retry_after: Option<Duration>,
    pub body: String,
}

/// Wire seam of the catalog client; network failures are `Err`, every HTTP
/// status is `Ok`.
#[async_trait]
pub trait CatalogTransport: Send + Sync {
    async fn upsert(
        &self,
        credentials: &CatalogCredentials,
        listing: &CatalogListing,
    ) -> Result<TransportResponse, IntegrationError>;
}

#[derive(Debug, Clone, Default)]
pub struct ReqwestCatalogTransport {
    client: reqwest::Client,
}

#[async_trait]
impl CatalogTransport for ReqwestCatalogTransport {
    async fn upsert(
        &self,
        credentials: &CatalogCredentials,
        listing: &CatalogListing,
    ) -> Result<TransportResponse, IntegrationError> {
        let url = format!(
            "{}/animals/{}",
            credentials.api_url.trim_end_matches('/'),
            listing.external_id
        );
        let response = self
            .client
            .put(url)
            .bearer_auth(&credentials.api_key)
            .json(listing)
            .send()
            .await
            .map_err(|err| IntegrationError::Network {
                integration: INTEGRATION,
                message: err.to_string(),
            })?;

        let status = response.status().as_u16();
        let retry_after = response
            .headers()
            .get(RETRY_AFTER)
            .and_then(|value| value.to_str().ok())
            .and_then(parse_retry_after);
        let body = response.text().await.unwrap_or_default();

        Ok(TransportResponse {
            status,
            retry_after,
            body,
        })
    }
}

/// Client for the Matchpfote adoption registry. Every attempt, retries
/// included, passes through the pacer owned by this instance.
#[derive(Debug)]
pub struct MatchpfoteClient<T = ReqwestCatalogTransport> {
    credentials: Option<CatalogCredentials>,
    transport: T,
    pacer: RequestPacer,
    policy: RetryPolicy,
    publishing: PublishingConfig,
}

impl MatchpfoteClient<ReqwestCatalogTransport> {
    pub fn from_env(publishing: PublishingConfig) -> Self {
        Self::new(
            CatalogCredentials::from_env(),
            ReqwestCatalogTransport::default(),
            publishing,
        )
    }
}

impl<T: CatalogTransport> MatchpfoteClient<T> {
    pub fn new(
        credentials: Option<CatalogCredentials>,
        transport: T,
        publishing: PublishingConfig,
    ) -> Self {
        Self {
            credentials,
            transport,
            pacer: RequestPacer::per_minute(REQUESTS_PER_MINUTE),
            policy: RetryPolicy::default(),
            publishing,
        }
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    async fn attempt(
        &self,
        credentials: &CatalogCredentials,
        listing: &CatalogListing,
        attempt: u32,
    ) -> Result<(), AttemptError> {
        self.pacer.wait_turn().await;
        debug!(external_id = %listing.external_id, attempt, "catalog upsert");

        let response = self
            .transport
            .upsert(credentials, listing)
            .await
            .map_err(AttemptError::Transient)?;

        match response.status {
            200..=299 => Ok(()),
            429 => Err(AttemptError::RateLimited {
                retry_after: response.retry_after,
            }),
            status => Err(AttemptError::Fatal(IntegrationError::Http {
                integration: INTEGRATION,
                status,
                body: response.body,
            })),
        }
    }
}

#[async_trait]
impl<T: CatalogTransport> CatalogGateway for MatchpfoteClient<T> {
    async fn send(&self, profile: &Profile) -> Result<bool, IntegrationError> {
        let Some(credentials) = &self.credentials else {
            warn!(profile_id = %profile.id, "matchpfote credentials missing; skipping sync");
            return Ok(false);
        };

        let listing = CatalogListing::from_profile(profile, &self.publishing);
        let listing = &listing;
        retry_with_policy(&self.policy, INTEGRATION, |attempt| async move {
            self.attempt(credentials, listing, attempt).await
        })
        .await?;

        info!(profile_id = %profile.id, "profile synced to catalog");
        Ok(true)
    }
}
