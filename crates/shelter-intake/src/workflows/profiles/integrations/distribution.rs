use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use tracing::{info, warn};

use super::retry::{decode_json, execute, retry_with_policy, RetryPolicy};
use super::{IntegrationError, PlatformPublisher};
use crate::config::{credential, PublishingConfig};
use crate::workflows::profiles::domain::{Platform, Profile};

const GRAPH_API: &str = "https://graph.facebook.com/v19.0";
const X_API: &str = "https://api.twitter.com/2/tweets";

const FACEBOOK_LIMIT: usize = 2_000;
const INSTAGRAM_LIMIT: usize = 2_200;
const X_LIMIT: usize = 280;
const MASTODON_LIMIT: usize = 500;

/// The publishers for every platform, in fan-out order.
pub fn publishers_from_env(publishing: &PublishingConfig) -> Vec<Arc<dyn PlatformPublisher>> {
    vec![
        Arc::new(FacebookPublisher::from_env(publishing.clone())),
        Arc::new(InstagramPublisher::from_env(publishing.clone())),
        Arc::new(XPublisher::from_env(publishing.clone())),
        Arc::new(MastodonPublisher::from_env(publishing.clone())),
    ]
}

/// Builds the post text. The profile link is always kept whole; the body is
/// shortened to fit `max_chars`.
pub fn compose_post(profile: &Profile, profile_url: &str, max_chars: usize) -> String {
    let mut lines = vec![format!(
        "{} ({}) sucht ein Zuhause!",
        profile.name.trim(),
        profile.category.trim()
    )];
    if !profile.location.trim().is_empty() {
        lines.push(format!("Standort: {}", profile.location.trim()));
    }
    if !profile.desc_short.trim().is_empty() {
        lines.push(profile.desc_short.trim().to_string());
    }

    let link_chars = profile_url.chars().count() + 2;
    let body = truncate_chars(&lines.join("\n"), max_chars.saturating_sub(link_chars));
    format!("{body}\n\n{profile_url}")
}

fn truncate_chars(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let mut shortened: String = text.chars().take(max_chars.saturating_sub(1)).collect();
    shortened.push('…');
    shortened
}

#[derive(Debug, Clone)]
struct Posting {
    client: reqwest::Client,
    policy: RetryPolicy,
    publishing: PublishingConfig,
}

impl Posting {
    fn new(publishing: PublishingConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            policy: RetryPolicy::default(),
            publishing,
        }
    }

    fn message(&self, profile: &Profile, max_chars: usize) -> String {
        compose_post(profile, &self.publishing.profile_url(&profile.id.0), max_chars)
    }
}

fn unconfigured(platform: Platform, profile: &Profile) -> bool {
    warn!(
        platform = platform.label(),
        profile_id = %profile.id,
        "credentials missing; skipping platform"
    );
    false
}

fn report(platform: Platform, profile: &Profile, result: Result<(), IntegrationError>) -> bool {
    match result {
        Ok(()) => {
            info!(platform = platform.label(), profile_id = %profile.id, "profile posted");
            true
        }
        Err(err) => {
            warn!(
                platform = platform.label(),
                profile_id = %profile.id,
                error = %err,
                "profile post failed"
            );
            false
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FacebookCredentials {
    pub page_id: String,
    pub page_token: String,
}

/// Posts to a Facebook page feed through the Graph API.
#[derive(Debug, Clone)]
pub struct FacebookPublisher {
    credentials: Option<FacebookCredentials>,
    posting: Posting,
}

impl FacebookPublisher {
    pub fn new(credentials: Option<FacebookCredentials>, publishing: PublishingConfig) -> Self {
        Self {
            credentials,
            posting: Posting::new(publishing),
        }
    }

    pub fn from_env(publishing: PublishingConfig) -> Self {
        let credentials = credential("FACEBOOK_PAGE_ID")
            .zip(credential("FACEBOOK_PAGE_TOKEN"))
            .map(|(page_id, page_token)| FacebookCredentials {
                page_id,
                page_token,
            });
        Self::new(credentials, publishing)
    }
}

#[async_trait]
impl PlatformPublisher for FacebookPublisher {
    fn platform(&self) -> Platform {
        Platform::Facebook
    }

    async fn send(&self, profile: &Profile) -> bool {
        let Some(credentials) = &self.credentials else {
            return unconfigured(self.platform(), profile);
        };

        let message = self.posting.message(profile, FACEBOOK_LIMIT);
        let link = self.posting.publishing.profile_url(&profile.id.0);
        let url = format!("{GRAPH_API}/{}/feed", credentials.page_id);
        let (message, link, url) = (message.as_str(), link.as_str(), url.as_str());
        let client = &self.posting.client;

        let result = retry_with_policy(&self.posting.policy, "facebook", |_| async move {
            let request = client.post(url).form(&[
                ("message", message),
                ("link", link),
                ("access_token", credentials.page_token.as_str()),
            ]);
            execute("facebook", request).await.map(|_| ())
        })
        .await;

        report(self.platform(), profile, result)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstagramCredentials {
    pub account_id: String,
    pub access_token: String,
}

#[derive(Deserialize)]
struct MediaContainer {
    id: String,
}

/// Publishes the first gallery image with a caption to an Instagram business
/// account. Needs two calls: create the media container, then publish it.
#[derive(Debug, Clone)]
pub struct InstagramPublisher {
    credentials: Option<InstagramCredentials>,
    posting: Posting,
}

impl InstagramPublisher {
    pub fn new(credentials: Option<InstagramCredentials>, publishing: PublishingConfig) -> Self {
        Self {
            credentials,
            posting: Posting::new(publishing),
        }
    }

    pub fn from_env(publishing: PublishingConfig) -> Self {
        let credentials = credential("INSTAGRAM_ACCOUNT_ID")
            .zip(credential("INSTAGRAM_ACCESS_TOKEN"))
            .map(|(account_id, access_token)| InstagramCredentials {
                account_id,
                access_token,
            });
        Self::new(credentials, publishing)
    }

    async fn publish(
        &self,
        credentials: &InstagramCredentials,
        profile: &Profile,
    ) -> Result<(), IntegrationError> {
        let image_key = profile
            .gallery
            .first()
            .ok_or(IntegrationError::Unpublishable {
                integration: "instagram",
                reason: "profile has no gallery image",
            })?;
        let image_url = self.posting.publishing.media_url(image_key);
        let caption = self.posting.message(profile, INSTAGRAM_LIMIT);
        let media_url = format!("{GRAPH_API}/{}/media", credentials.account_id);
        let publish_url = format!("{GRAPH_API}/{}/media_publish", credentials.account_id);
        let (image_url, caption) = (image_url.as_str(), caption.as_str());
        let (media_url, publish_url) = (media_url.as_str(), publish_url.as_str());
        let token = credentials.access_token.as_str();
        let client = &self.posting.client;

        let container: MediaContainer =
            retry_with_policy(&self.posting.policy, "instagram", |_| async move {
                let request = client.post(media_url).form(&[
                    ("image_url", image_url),
                    ("caption", caption),
                    ("access_token", token),
                ]);
                let response = execute("instagram", request).await?;
                decode_json("instagram", response).await
            })
            .await?;

        let creation_id = container.id.as_str();
        retry_with_policy(&self.posting.policy, "instagram", |_| async move {
            let request = client
                .post(publish_url)
                .form(&[("creation_id", creation_id), ("access_token", token)]);
            execute("instagram", request).await.map(|_| ())
        })
        .await
    }
}

#[async_trait]
impl PlatformPublisher for InstagramPublisher {
    fn platform(&self) -> Platform {
        Platform::Instagram
    }

    async fn send(&self, profile: &Profile) -> bool {
        let Some(credentials) = &self.credentials else {
            return unconfigured(self.platform(), profile);
        };
        let result = self.publish(credentials, profile).await;
        report(self.platform(), profile, result)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XCredentials {
    pub bearer_token: String,
}

#[derive(Debug, Clone)]
pub struct XPublisher {
    credentials: Option<XCredentials>,
    posting: Posting,
}

impl XPublisher {
    pub fn new(credentials: Option<XCredentials>, publishing: PublishingConfig) -> Self {
        Self {
            credentials,
            posting: Posting::new(publishing),
        }
    }

    pub fn from_env(publishing: PublishingConfig) -> Self {
        let credentials =
            credential("X_BEARER_TOKEN").map(|bearer_token| XCredentials { bearer_token });
        Self::new(credentials, publishing)
    }
}

#[async_trait]
impl PlatformPublisher for XPublisher {
    fn platform(&self) -> Platform {
        Platform::X
    }

    async fn send(&self, profile: &Profile) -> bool {
        let Some(credentials) = &self.credentials else {
            return unconfigured(self.platform(), profile);
        };

        let body = json!({ "text": self.posting.message(profile, X_LIMIT) });
        let body = &body;
        let client = &self.posting.client;
        let result = retry_with_policy(&self.posting.policy, "x", |_| async move {
            let request = client
                .post(X_API)
                .bearer_auth(&credentials.bearer_token)
                .json(body);
            execute("x", request).await.map(|_| ())
        })
        .await;

        report(self.platform(), profile, result)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MastodonCredentials {
    pub base_url: String,
    pub access_token: String,
}

/// Posts a public status. The profile id doubles as idempotency key so a
/// retried request never produces a second toot.
#[derive(Debug, Clone)]
pub struct MastodonPublisher {
    credentials: Option<MastodonCredentials>,
    posting: Posting,
}

impl MastodonPublisher {
    pub fn new(credentials: Option<MastodonCredentials>, publishing: PublishingConfig) -> Self {
        Self {
            credentials,
            posting: Posting::new(publishing),
        }
    }

    pub fn from_env(publishing: PublishingConfig) -> Self {
        let credentials = credential("MASTODON_BASE_URL")
            .zip(credential("MASTODON_ACCESS_TOKEN"))
            .map(|(base_url, access_token)| MastodonCredentials {
                base_url,
                access_token,
            });
        Self::new(credentials, publishing)
    }
}

#[async_trait]
impl PlatformPublisher for MastodonPublisher {
    fn platform(&self) -> Platform {
        Platform::Mastodon
    }

    async fn send(&self, profile: &Profile) -> bool {
        let Some(credentials) = &self.credentials else {
            return unconfigured(self.platform(), profile);
        };

        let status = self.posting.message(profile, MASTODON_LIMIT);
        let url = format!(
            "{}/api/v1/statuses",
            credentials.base_url.trim_end_matches('/')
        );
        let (status, url) = (status.as_str(), url.as_str());
        let client = &self.posting.client;
        let result = retry_with_policy(&self.posting.policy, "mastodon", |_| async move {
            let request = client
                .post(url)
                .bearer_auth(&credentials.access_token)
                .header("Idempotency-Key", profile.id.0.as_str())
                .form(&[("status", status), ("visibility", "public")]);
            execute("mastodon", request).await.map(|_| ())
        })
        .await;

        report(self.platform(), profile, result)
    }
}
