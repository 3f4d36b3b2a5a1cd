//! Language-model providers behind one request/response interface.
//!
//! Every backend implements [`Provider`] and is fully substitutable; the
//! capability is selected by the request's [`RequestRole`], not by the
//! provider type. [`ProviderChain`] walks an ordered list of providers and
//! falls back on any provider-level failure.

pub mod anthropic;
pub mod chain;
pub mod gemini;
pub mod mock;
pub mod openai;
pub mod reply;

pub use chain::ProviderChain;

use crate::error::ProviderError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProviderKind {
    #[serde(rename = "openai")]
    OpenAi,
    #[serde(rename = "anthropic")]
    Anthropic,
    #[serde(rename = "gemini")]
    Gemini,
}

impl ProviderKind {
    pub const ALL: [ProviderKind; 3] = [
        ProviderKind::OpenAi,
        ProviderKind::Anthropic,
        ProviderKind::Gemini,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            ProviderKind::OpenAi => "openai",
            ProviderKind::Anthropic => "anthropic",
            ProviderKind::Gemini => "gemini",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            ProviderKind::OpenAi => "OpenAI",
            ProviderKind::Anthropic => "Anthropic Claude",
            ProviderKind::Gemini => "Google Gemini",
        }
    }

    /// Environment variable holding this provider's API key.
    pub fn env_key(&self) -> &'static str {
        match self {
            ProviderKind::OpenAi => "OPENAI_API_KEY",
            ProviderKind::Anthropic => "ANTHROPIC_API_KEY",
            ProviderKind::Gemini => "GOOGLE_API_KEY",
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ProviderKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "openai" => Ok(ProviderKind::OpenAi),
            "anthropic" | "claude" => Ok(ProviderKind::Anthropic),
            "gemini" | "google" => Ok(ProviderKind::Gemini),
            other => Err(format!("unknown provider '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestRole {
    TranslateCommand,
    PlanSteps,
    AssessSafety,
}

/// A step that already ran in this terminal session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PriorStep {
    pub command: String,
    pub status: i32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProviderRequest {
    pub role: RequestRole,
    pub input: String,
    /// Oldest first, already bounded by the caller's window.
    pub context: Vec<PriorStep>,
    /// Working directory of the user's shell, when known.
    pub cwd: Option<String>,
}

impl ProviderRequest {
    pub fn new(role: RequestRole, input: impl Into<String>) -> Self {
        Self {
            role,
            input: input.into(),
            context: Vec::new(),
            cwd: None,
        }
    }

    pub fn with_context(mut self, context: Vec<PriorStep>) -> Self {
        self.context = context;
        self
    }

    pub fn with_cwd(mut self, cwd: Option<String>) -> Self {
        self.cwd = cwd;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ProposedStep {
    pub command: String,
    #[serde(default)]
    pub rationale: String,
    #[serde(default)]
    pub best_effort: bool,
    #[serde(default)]
    pub review: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Judgment {
    Safe,
    Confirm,
    Block,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ResponsePayload {
    Command(String),
    Steps(Vec<ProposedStep>),
    Judgment { judgment: Judgment, reason: String },
    /// The model needs one more piece of information from the user.
    Clarification(String),
    /// The model declined the request.
    Refusal(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProviderResponse {
    pub provider: String,
    pub payload: ResponsePayload,
    pub confidence: Option<f32>,
}

impl ProviderResponse {
    /// Structural check applied before a response is trusted.
    pub fn validate(&self, role: RequestRole) -> Result<(), ProviderError> {
        match (&self.payload, role) {
            (ResponsePayload::Command(cmd), RequestRole::TranslateCommand) => {
                validate_command(cmd)
            }
            (ResponsePayload::Steps(steps), RequestRole::PlanSteps) => {
                if steps.is_empty() {
                    return Err(ProviderError::InvalidResponse("plan has no steps".into()));
                }
                steps.iter().try_for_each(|s| validate_command(&s.command))
            }
            (ResponsePayload::Judgment { .. }, RequestRole::AssessSafety) => Ok(()),
            (ResponsePayload::Refusal(r), RequestRole::TranslateCommand | RequestRole::PlanSteps)
            | (ResponsePayload::Clarification(r), RequestRole::PlanSteps) => {
                if r.trim().is_empty() {
                    Err(ProviderError::InvalidResponse("empty reason".into()))
                } else {
                    Ok(())
                }
            }
            (payload, role) => Err(ProviderError::InvalidResponse(format!(
                "{} reply does not answer a {:?} request",
                payload_name(payload),
                role
            ))),
        }
    }
}

fn payload_name(payload: &ResponsePayload) -> &'static str {
    match payload {
        ResponsePayload::Command(_) => "command",
        ResponsePayload::Steps(_) => "steps",
        ResponsePayload::Judgment { .. } => "judgment",
        ResponsePayload::Clarification(_) => "question",
        ResponsePayload::Refusal(_) => "refusal",
    }
}

/// Commands are injected into a live shell one line at a time.
fn validate_command(command: &str) -> Result<(), ProviderError> {
    if command.trim().is_empty() {
        return Err(ProviderError::InvalidResponse("empty command".into()));
    }
    if command.chars().any(char::is_control) {
        return Err(ProviderError::InvalidResponse(format!(
            "command contains control characters: {:?}",
            command
        )));
    }
    Ok(())
}

#[async_trait]
pub trait Provider: Send + Sync {
    /// Identity reported in responses and failure reports.
    fn name(&self) -> &str;

    async fn send(&self, request: &ProviderRequest) -> Result<ProviderResponse, ProviderError>;
}
