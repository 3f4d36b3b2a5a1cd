//! Error taxonomy for the interception engine.
//!
//! Provider and classification problems are recovered locally wherever that
//! is safe (fallback, conservative defaults). Safety blocks and execution
//! failures always reach the user with the offending command attached.

use thiserror::Error;

/// Failure of a single provider call.
///
/// Every variant counts as a provider-level failure and moves the
/// [`crate::providers::ProviderChain`] on to the next configured provider.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProviderError {
    #[error("request timed out after {0}s")]
    Timeout(u64),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("invalid provider response: {0}")]
    InvalidResponse(String),

    #[error("no API key configured")]
    MissingKey,
}

/// One provider's failure, kept for the `ProviderUnavailable` report.
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderFailure {
    pub provider: String,
    pub error: ProviderError,
}

/// Failure at the shell boundary.
#[derive(Error, Debug)]
pub enum HookError {
    #[error("terminal session lost")]
    SessionLost,

    #[error("shell I/O error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Error, Debug)]
pub enum ThinkError {
    #[error("no provider available ({} attempted)", attempts.len())]
    ProviderUnavailable { attempts: Vec<ProviderFailure> },

    #[error("invalid provider response: {0}")]
    InvalidProviderResponse(String),

    #[error("blocked `{command}` ({rule})")]
    SafetyBlocked { command: String, rule: String },

    #[error("step `{command}` failed with status {status}")]
    StepFailed { command: String, status: i32 },

    #[error("terminal session lost")]
    SessionLost,

    #[error("plan step {index} filled out of order")]
    PlanOrder { index: usize },

    #[error("session already holds a plan")]
    PlanAlreadyAttached,

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl From<HookError> for ThinkError {
    fn from(err: HookError) -> Self {
        match err {
            HookError::SessionLost => ThinkError::SessionLost,
            HookError::Io(e) => ThinkError::Io(e),
        }
    }
}
