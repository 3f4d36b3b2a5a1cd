//! Google Gemini `generateContent` provider.
//!
//! Gemini takes no separate system message here, so the role prompt is
//! prepended to the user text.

use super::reply::{parse_reply, system_prompt, user_message};
use super::{Provider, ProviderRequest, ProviderResponse};
use crate::error::ProviderError;
use crate::http_client::HttpClient;
use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;
use tracing::debug;

pub const DEFAULT_MODEL: &str = "gemini-1.5-flash";
const BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta/models";

pub struct GeminiProvider {
    http: Arc<dyn HttpClient>,
    api_key: String,
    model: String,
}

impl GeminiProvider {
    pub fn new(http: Arc<dyn HttpClient>, api_key: impl Into<String>, model: Option<String>) -> Self {
        Self {
            http,
            api_key: api_key.into(),
            model: model.unwrap_or_else(|| DEFAULT_MODEL.to_string()),
        }
    }

    fn endpoint(&self) -> String {
        format!("{}/{}:generateContent?key={}", BASE_URL, self.model, self.api_key)
    }
}

#[async_trait]
impl Provider for GeminiProvider {
    fn name(&self) -> &str {
        "gemini"
    }

    async fn send(&self, request: &ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        if self.api_key.trim().is_empty() {
            return Err(ProviderError::MissingKey);
        }

        let prompt = format!("{}\n\n{}", system_prompt(request.role), user_message(request));
        let body = json!({
            "contents": [{"parts": [{"text": prompt}]}],
            "generationConfig": {"temperature": 0, "responseMimeType": "application/json"}
        });

        let text = self
            .http
            .post_json(&self.endpoint(), &[("Content-Type", "application/json")], &body)
            .await
            .map_err(|e| ProviderError::Transport(e.to_string()))?;
        debug!("Gemini response: {}", text);

        let value: serde_json::Value = serde_json::from_str(&text)
            .map_err(|e| ProviderError::InvalidResponse(e.to_string()))?;
        let content = value
            .pointer("/candidates/0/content/parts/0/text")
            .and_then(|c| c.as_str())
            .ok_or_else(|| ProviderError::InvalidResponse("no candidate text".into()))?;

        let (payload, confidence) = parse_reply(request.role, content)?;
        Ok(ProviderResponse {
            provider: self.name().to_string(),
            payload,
            confidence,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http_client::tests::MockHttpClient;
    use crate::providers::{RequestRole, ResponsePayload};

    #[tokio::test]
    async fn test_send_parses_plan_from_candidate() {
        let http = Arc::new(MockHttpClient::new(
            r#"{"candidates": [{"content": {"parts": [{"text": "{\"steps\": [{\"command\": \"df -h\", \"rationale\": \"disk usage\", \"best_effort\": true}]}"}]}}]}"#,
        ));
        let provider = GeminiProvider::new(http.clone(), "g-key", None);

        let response = provider
            .send(&ProviderRequest::new(RequestRole::PlanSteps, "how full is my disk"))
            .await
            .unwrap();

        match response.payload {
            ResponsePayload::Steps(steps) => {
                assert_eq!(steps[0].command, "df -h");
                assert!(steps[0].best_effort);
            }
            other => panic!("unexpected payload {:?}", other),
        }
        let requests = http.requests.lock().unwrap();
        assert!(requests[0].0.contains("gemini-1.5-flash:generateContent?key=g-key"));
        let text = requests[0].1["contents"][0]["parts"][0]["text"].as_str().unwrap();
        assert!(text.contains("GOAL: how full is my disk"));
    }
}
