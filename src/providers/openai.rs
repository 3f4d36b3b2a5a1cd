//! OpenAI chat-completions provider.

use super::reply::{parse_reply, system_prompt, user_message};
use super::{Provider, ProviderRequest, ProviderResponse};
use crate::error::ProviderError;
use crate::http_client::HttpClient;
use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;
use tracing::debug;

pub const DEFAULT_MODEL: &str = "gpt-4o";
const ENDPOINT: &str = "https://api.openai.com/v1/chat/completions";

pub struct OpenAiProvider {
    http: Arc<dyn HttpClient>,
    api_key: String,
    model: String,
}

impl OpenAiProvider {
    pub fn new(http: Arc<dyn HttpClient>, api_key: impl Into<String>, model: Option<String>) -> Self {
        Self {
            http,
            api_key: api_key.into(),
            model: model.unwrap_or_else(|| DEFAULT_MODEL.to_string()),
        }
    }
}

#[async_trait]
impl Provider for OpenAiProvider {
    fn name(&self) -> &str {
        "openai"
    }

    async fn send(&self, request: &ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        if self.api_key.trim().is_empty() {
            return Err(ProviderError::MissingKey);
        }

        let body = json!({
            "model": self.model,
            "temperature": 0,
            "response_format": {"type": "json_object"},
            "messages": [
                {"role": "system", "content": system_prompt(request.role)},
                {"role": "user", "content": user_message(request)}
            ]
        });
        let auth = format!("Bearer {}", self.api_key);

        let text = self
            .http
            .post_json(
                ENDPOINT,
                &[("Authorization", auth.as_str()), ("Content-Type", "application/json")],
                &body,
            )
            .await
            .map_err(|e| ProviderError::Transport(e.to_string()))?;
        debug!("OpenAI response: {}", text);

        let value: serde_json::Value = serde_json::from_str(&text)
            .map_err(|e| ProviderError::InvalidResponse(e.to_string()))?;
        let content = value
            .pointer("/choices/0/message/content")
            .and_then(|c| c.as_str())
            .ok_or_else(|| ProviderError::InvalidResponse("no message content".into()))?;

        let (payload, confidence) = parse_reply(request.role, content)?;
        Ok(ProviderResponse {
            provider: self.name().to_string(),
            payload,
            confidence,
        })
    }
}
