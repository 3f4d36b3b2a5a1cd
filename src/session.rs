//! Per-invocation state.
//!
//! A [`SessionState`] is created when the shell reports a failed command or
//! an explicit invocation, threaded by `&mut` through each pipeline stage and
//! dropped when the invocation reaches a terminal state. It is deliberately
//! neither `Clone` nor shared: one invocation, one owner.

use crate::error::ThinkError;
use crate::plan::Plan;
use std::time::{Duration, Instant};

/// Where a captured line came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    /// The shell's "command not found" hook fired.
    FailedCommand,
    /// The user typed the assistant's trigger prefix.
    ExplicitInvocation,
}

/// Raw text exactly as the user typed it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapturedInput {
    text: String,
    origin: Origin,
}

impl CapturedInput {
    pub fn new(text: impl Into<String>, origin: Origin) -> Self {
        Self {
            text: text.into(),
            origin,
        }
    }

    pub fn failed(text: impl Into<String>) -> Self {
        Self::new(text, Origin::FailedCommand)
    }

    pub fn explicit(text: impl Into<String>) -> Self {
        Self::new(text, Origin::ExplicitInvocation)
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn origin(&self) -> Origin {
        self.origin
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntentKind {
    TypoCorrection,
    NaturalLanguageTask,
    Passthrough,
}

/// Classification result; produced once per invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Intent {
    pub kind: IntentKind,
    /// Normalized input text handed to the provider.
    pub text: String,
    /// Heuristics could not decide and the conservative default was used.
    pub ambiguous: bool,
}

impl Intent {
    pub fn new(kind: IntentKind, text: impl Into<String>) -> Self {
        Self {
            kind,
            text: text.into(),
            ambiguous: false,
        }
    }

    pub fn ambiguous(kind: IntentKind, text: impl Into<String>) -> Self {
        Self {
            kind,
            text: text.into(),
            ambiguous: true,
        }
    }
}

pub struct SessionState {
    input: CapturedInput,
    intent: Intent,
    plan: Option<Plan>,
    started: Instant,
}

impl SessionState {
    pub fn new(input: CapturedInput, intent: Intent) -> Self {
        Self {
            input,
            intent,
            plan: None,
            started: Instant::now(),
        }
    }

    pub fn input(&self) -> &CapturedInput {
        &self.input
    }

    pub fn intent(&self) -> &Intent {
        &self.intent
    }

    pub fn plan(&self) -> Option<&Plan> {
        self.plan.as_ref()
    }

    pub fn plan_mut(&mut self) -> Option<&mut Plan> {
        self.plan.as_mut()
    }

    /// Attaches the invocation's plan. A session holds at most one.
    pub fn attach_plan(&mut self, plan: Plan) -> Result<(), ThinkError> {
        if self.plan.is_some() {
            return Err(ThinkError::PlanAlreadyAttached);
        }
        self.plan = Some(plan);
        Ok(())
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::Step;

    #[test]
    fn test_captured_input_keeps_text_verbatim() {
        let input = CapturedInput::failed("  grep -r \"a  b\" 'c d'  ");
        assert_eq!(input.text(), "  grep -r \"a  b\" 'c d'  ");
        assert_eq!(input.origin(), Origin::FailedCommand);
    }

    #[test]
    fn test_session_accepts_only_one_plan() {
        let mut session = SessionState::new(
            CapturedInput::explicit("list files"),
            Intent::new(IntentKind::NaturalLanguageTask, "list files"),
        );
        assert!(session.plan().is_none());

        session
            .attach_plan(Plan::single(Step::new("ls -la", "list files")))
            .unwrap();
        let second = session.attach_plan(Plan::single(Step::new("ls", "again")));

        assert!(matches!(second, Err(ThinkError::PlanAlreadyAttached)));
        assert_eq!(session.plan().unwrap().steps()[0].command(), "ls -la");
    }
}
