//! Ordered provider fallback.

use super::{Provider, ProviderRequest, ProviderResponse};
use crate::error::{ProviderError, ProviderFailure, ThinkError};
use std::time::Duration;
use tracing::{info, warn};

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(20);

/// Providers in priority order, each call bounded by `timeout`.
///
/// A timeout, transport failure or structurally invalid reply moves on to
/// the next provider. When every provider has failed the request fails with
/// [`ThinkError::ProviderUnavailable`]; no guess is ever returned in its place.
pub struct ProviderChain {
    providers: Vec<Box<dyn Provider>>,
    timeout: Duration,
}

impl ProviderChain {
    pub fn new(providers: Vec<Box<dyn Provider>>) -> Self {
        Self {
            providers,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    pub fn names(&self) -> Vec<&str> {
        self.providers.iter().map(|p| p.name()).collect()
    }

    pub async fn send(&self, request: &ProviderRequest) -> Result<ProviderResponse, ThinkError> {
        let mut attempts = Vec::new();

        for provider in &self.providers {
            let error = match tokio::time::timeout(self.timeout, provider.send(request)).await {
                Err(_) => ProviderError::Timeout(self.timeout.as_secs()),
                Ok(Err(e)) => e,
                Ok(Ok(response)) => match response.validate(request.role) {
                    Ok(()) => {
                        info!("{:?} answered by {}", request.role, provider.name());
                        return Ok(response);
                    }
                    Err(e) => e,
                },
            };
            warn!("Provider {} failed: {}", provider.name(), error);
            attempts.push(ProviderFailure {
                provider: provider.name().to_string(),
                error,
            });
        }

        Err(ThinkError::ProviderUnavailable { attempts })
    }
}
