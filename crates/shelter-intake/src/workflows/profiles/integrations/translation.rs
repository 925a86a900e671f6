use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::retry::{decode_json, execute, retry_with_policy, AttemptError, RetryPolicy};
use super::{IntegrationError, TranslationGateway};
use crate::config::credential;

const INTEGRATION: &str = "deepl";
const DEFAULT_API_URL: &str = "https://api-free.deepl.com/v2/translate";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeepLCredentials {
    pub api_key: String,
    pub api_url: String,
}

impl DeepLCredentials {
    /// `DEEPL_API_KEY` is required; `DEEPL_API_URL` defaults to the free tier.
    pub fn from_env() -> Option<Self> {
        Some(Self {
            api_key: credential("DEEPL_API_KEY")?,
            api_url: credential("DEEPL_API_URL").unwrap_or_else(|| DEFAULT_API_URL.to_string()),
        })
    }
}

#[derive(Serialize)]
struct TranslateRequest<'a> {
    text: [&'a str; 1],
    source_lang: &'a str,
    target_lang: &'a str,
}

#[derive(Deserialize)]
struct TranslateResponse {
    translations: Vec<Translation>,
}

#[derive(Deserialize)]
struct Translation {
    text: String,
}

/// DeepL-compatible client translating German profile text into English.
#[derive(Debug, Clone)]
pub struct DeepLTranslator {
    credentials: Option<DeepLCredentials>,
    client: reqwest::Client,
    policy: RetryPolicy,
}

impl DeepLTranslator {
    pub fn new(credentials: Option<DeepLCredentials>) -> Self {
        Self {
            credentials,
            client: reqwest::Client::new(),
            policy: RetryPolicy::default(),
        }
    }

    pub fn from_env() -> Self {
        Self::new(DeepLCredentials::from_env())
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }
}

#[async_trait]
impl TranslationGateway for DeepLTranslator {
    async fn translate(&self, text: &str) -> Result<String, IntegrationError> {
        let credentials = self
            .credentials
            .as_ref()
            .ok_or(IntegrationError::NotConfigured(INTEGRATION))?;

        let body = TranslateRequest {
            text: [text],
            source_lang: "DE",
            target_lang: "EN-GB",
        };

        let body = &body;
        let client = &self.client;
        let translated = retry_with_policy(&self.policy, INTEGRATION, |_| async move {
            let request = client
                .post(credentials.api_url.as_str())
                .header(
                    "Authorization",
                    format!("DeepL-Auth-Key {}", credentials.api_key),
                )
                .json(body);
            let response = execute(INTEGRATION, request).await?;
            let payload: TranslateResponse = decode_json(INTEGRATION, response).await?;
            payload
                .translations
                .into_iter()
                .next()
                .map(|translation| translation.text)
                .ok_or_else(|| {
                    AttemptError::Fatal(IntegrationError::Decode {
                        integration: INTEGRATION,
                        message: "empty translation list".to_string(),
                    })
                })
        })
        .await?;

        debug!(chars = text.chars().count(), "text translated");
        Ok(translated)
    }
}
