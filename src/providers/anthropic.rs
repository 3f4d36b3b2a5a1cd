//! Anthropic messages provider.

use super::reply::{parse_reply, system_prompt, user_message};
use super::{Provider, ProviderRequest, ProviderResponse};
use crate::error::ProviderError;
use crate::http_client::HttpClient;
use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;
use tracing::debug;

pub const DEFAULT_MODEL: &str = "claude-3-haiku-20240307";
const ENDPOINT: &str = "https://api.anthropic.com/v1/messages";
const MAX_TOKENS: u32 = 1024;

pub struct AnthropicProvider {
    http: Arc<dyn HttpClient>,
    api_key: String,
    model: String,
}

impl AnthropicProvider {
    pub fn new(http: Arc<dyn HttpClient>, api_key: impl Into<String>, model: Option<String>) -> Self {
        Self {
            http,
            api_key: api_key.into(),
            model: model.unwrap_or_else(|| DEFAULT_MODEL.to_string()),
        }
    }
}

#[async_trait]
impl Provider for AnthropicProvider {
    fn name(&self) -> &str {
        "anthropic"
    }

    async fn send(&self, request: &ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        if self.api_key.trim().is_empty() {
            return Err(ProviderError::MissingKey);
        }

        let body = json!({
            "model": self.model,
            "max_tokens": MAX_TOKENS,
            "system": system_prompt(request.role),
            "messages": [
                {"role": "user", "content": user_message(request)}
            ]
        });

        let text = self
            .http
            .post_json(
                ENDPOINT,
                &[
                    ("x-api-key", self.api_key.as_str()),
                    ("content-type", "application/json"),
                    ("anthropic-version", "2023-06-01"),
                ],
                &body,
            )
            .await
            .map_err(|e| ProviderError::Transport(e.to_string()))?;
        debug!("Anthropic response: {}", text);

        let value: serde_json::Value = serde_json::from_str(&text)
            .map_err(|e| ProviderError::InvalidResponse(e.to_string()))?;
        let content = value
            .pointer("/content/0/text")
            .and_then(|c| c.as_str())
            .ok_or_else(|| ProviderError::InvalidResponse("no text content".into()))?;

        let (payload, confidence) = parse_reply(request.role, content)?;
        Ok(ProviderResponse {
            provider: self.name().to_string(),
            payload,
            confidence,
        })
    }
}
