use super::{CompletionRequest, CompletionService};
use crate::config::CompletionConfig;
use async_trait::async_trait;
use sdk::errors::{ConvoError, Result};
use std::time::Duration;
use tracing::debug;

/// Completion backend reached over HTTP.
///
/// Sends `{model, messages}` as JSON to `{base_url}/completion` and reads the
/// reply from a `content` field (or `message.content`).
pub struct HttpCompletionService {
    base_url: String,
    client: reqwest::Client,
}

impl HttpCompletionService {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ConvoError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
        })
    }

    pub fn from_config(config: &CompletionConfig) -> Result<Self> {
        Self::new(&config.base_url, Duration::from_secs(config.timeout_secs))
    }

    pub fn endpoint(&self) -> String {
        format!("{}/completion", self.base_url)
    }
}

fn transport_error(err: reqwest::Error) -> ConvoError {
    if err.is_timeout() {
        ConvoError::Timeout
    } else {
        ConvoError::Network(err.to_string())
    }
}

#[async_trait]
impl CompletionService for HttpCompletionService {
    fn name(&self) -> &str {
        "http"
    }

    async fn complete(&self, request: CompletionRequest) -> Result<String> {
        let url = self.endpoint();
        debug!(model = %request.model, messages = request.messages.len(), "POST {}", url);

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(transport_error)?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();

            return Err(match status.as_u16() {
                401 | 403 => ConvoError::Engine(format!("Authentication failed: {}", text)),
                429 => ConvoError::Engine("Rate limit exceeded".to_string()),
                code => ConvoError::Engine(format!("Completion failed with {}: {}", code, text)),
            });
        }

        let data: serde_json::Value = response.json().await.map_err(|e| {
            if e.is_timeout() {
                ConvoError::Timeout
            } else {
                ConvoError::Engine(format!("Malformed completion response: {}", e))
            }
        })?;

        data.get("content")
            .or_else(|| data.get("message").and_then(|m| m.get("content")))
            .and_then(|c| c.as_str())
            .map(str::to_string)
            .ok_or_else(|| ConvoError::Engine("No content in completion response".to_string()))
    }
}
