//! Outbound clients run by the follow-up jobs. Every client reads its own
//! credentials; a client without credentials soft-fails instead of erroring.

mod catalog;
mod distribution;
mod retry;
mod translation;

use async_trait::async_trait;

use super::domain::{Platform, Profile};

pub use catalog::{
    CatalogCredentials, CatalogListing, CatalogTransport, MatchpfoteClient, ReqwestCatalogTransport,
    TransportResponse,
};
pub use distribution::{
    compose_post, publishers_from_env, FacebookCredentials, FacebookPublisher,
    InstagramCredentials, InstagramPublisher, MastodonCredentials, MastodonPublisher,
    XCredentials, XPublisher,
};
pub use retry::{retry_with_policy, AttemptError, RequestPacer, RetryPolicy};
pub use translation::{DeepLCredentials, DeepLTranslator};

/// One social platform in the distribution fan-out.
#[async_trait]
pub trait PlatformPublisher: Send + Sync {
    fn platform(&self) -> Platform;
    /// `false` covers both missing credentials and exhausted retries.
    async fn send(&self, profile: &Profile) -> bool;
}

/// German to English machine translation of a single text.
#[async_trait]
pub trait TranslationGateway: Send + Sync {
    async fn translate(&self, text: &str) -> Result<String, IntegrationError>;
}

/// External adoption catalog. `Ok(false)` means the client is unconfigured.
#[async_trait]
pub trait CatalogGateway: Send + Sync {
    async fn send(&self, profile: &Profile) -> Result<bool, IntegrationError>;
}

#[derive(Debug, thiserror::Error)]
pub enum IntegrationError {
    #[error("{0} integration is not configured")]
    NotConfigured(&'static str),
    #[error("{integration} returned HTTP {status}: {body}")]
    Http {
        integration: &'static str,
        status: u16,
        body: String,
    },
    #[error("{integration} request failed: {message}")]
    Network {
        integration: &'static str,
        message: String,
    },
    #[error("{integration} response could not be decoded: {message}")]
    Decode {
        integration: &'static str,
        message: String,
    },
    #[error("{integration} cannot publish this profile: {reason}")]
    Unpublishable {
        integration: &'static str,
        reason: &'static str,
    },
    #[error("{integration} still failing after {attempts} attempts: {last}")]
    RetriesExhausted {
        integration: &'static str,
        attempts: u32,
        last: String,
    },
}
