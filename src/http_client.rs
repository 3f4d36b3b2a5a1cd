//! HTTP client abstraction for provider APIs.
//!
//! Providers talk HTTP only through [`HttpClient`], so tests can inject a
//! canned transport and never touch the network.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;
use tracing::warn;

/// Longest slice of an error body quoted back in a transport error.
const ERROR_BODY_LIMIT: usize = 300;

#[async_trait]
pub trait HttpClient: Send + Sync {
    /// Sends a POST request with a JSON body and returns the response text.
    ///
    /// # Errors
    ///
    /// Returns an error if the request cannot be sent, the body cannot be
    /// read, or the server answers with a non-success status (quota
    /// exhaustion and auth failures surface here).
    async fn post_json(
        &self,
        url: &str,
        headers: &[(&str, &str)],
        body: &serde_json::Value,
    ) -> Result<String>;
}

/// HTTP client implementation using reqwest.
pub struct ReqwestHttpClient {
    client: Client,
}

impl ReqwestHttpClient {
    /// The overall deadline is enforced by the provider chain, so only the
    /// connect phase is bounded here.
    pub fn new() -> Self {
        let client = Client::builder()
            .user_agent(concat!("thinkshell/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_else(|e| {
                warn!("Falling back to a default HTTP client: {}", e);
                Client::new()
            });
        Self { client }
    }
}

impl Default for ReqwestHttpClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl HttpClient for ReqwestHttpClient {
    async fn post_json(
        &self,
        url: &str,
        headers: &[(&str, &str)],
        body: &serde_json::Value,
    ) -> Result<String> {
        let mut request = self.client.post(url);

        for (key, value) in headers {
            request = request.header(*key, *value);
        }

        let response = request.json(body).send().await?;
        let status = response.status();
        let text = response.text().await?;

        if !status.is_success() {
            let snippet: String = text.chars().take(ERROR_BODY_LIMIT).collect();
            return Err(anyhow!("HTTP {}: {}", status, snippet));
        }
        Ok(text)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Mock HTTP client returning a fixed reply and recording each request.
    pub struct MockHttpClient {
        reply: std::result::Result<String, String>,
        pub requests: Mutex<Vec<(String, serde_json::Value)>>,
    }

    impl MockHttpClient {
        pub fn new(response: &str) -> Self {
            Self {
                reply: Ok(response.to_string()),
                requests: Mutex::new(Vec::new()),
            }
        }

        pub fn failing(message: &str) -> Self {
            Self {
                reply: Err(message.to_string()),
                requests: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl HttpClient for MockHttpClient {
        async fn post_json(
            &self,
            url: &str,
            _headers: &[(&str, &str)],
            body: &serde_json::Value,
        ) -> Result<String> {
            self.requests
                .lock()
                .unwrap()
                .push((url.to_string(), body.clone()));
            self.reply.clone().map_err(|e| anyhow!(e))
        }
    }

    #[tokio::test]
    async fn test_mock_http_client_records_request() {
        let client = MockHttpClient::new("test response");
        let body = serde_json::json!({"key": "value"});

        let response = client
            .post_json("https://api.example.com", &[], &body)
            .await
            .unwrap();

        assert_eq!(response, "test response");
        let requests = client.requests.lock().unwrap();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].1["key"], "value");
    }

    #[tokio::test]
    async fn test_mock_http_client_failure() {
        let client = MockHttpClient::failing("HTTP 429: quota");
        let err = client
            .post_json("https://api.example.com", &[], &serde_json::json!({}))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("429"));
    }
}
