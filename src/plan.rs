//! Plans, steps and their per-step safety and execution records.
//!
//! Verdicts and outcomes are filled strictly left to right. The setters on
//! [`Plan`] refuse any write that would skip ahead, backfill a step that a
//! later step already ran after, or record an outcome for a blocked step.

use crate::error::ThinkError;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SafetyLevel {
    Safe,
    NeedsConfirmation,
    Blocked,
}

/// Verdict plus what triggered it, kept for auditability.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SafetyVerdict {
    pub level: SafetyLevel,
    /// Rule id for the pattern layer, the model's reason for the semantic
    /// layer, or a fixed tag for defaults.
    pub basis: String,
}

impl SafetyVerdict {
    pub fn safe(basis: impl Into<String>) -> Self {
        Self {
            level: SafetyLevel::Safe,
            basis: basis.into(),
        }
    }

    pub fn needs_confirmation(basis: impl Into<String>) -> Self {
        Self {
            level: SafetyLevel::NeedsConfirmation,
            basis: basis.into(),
        }
    }

    pub fn blocked(basis: impl Into<String>) -> Self {
        Self {
            level: SafetyLevel::Blocked,
            basis: basis.into(),
        }
    }

    pub fn is_blocked(&self) -> bool {
        self.level == SafetyLevel::Blocked
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CapturedOutput {
    Buffered { stdout: Vec<u8>, stderr: Vec<u8> },
    /// Output went straight to the user's terminal and was not kept.
    Streamed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionOutcome {
    pub status: i32,
    pub output: CapturedOutput,
    pub elapsed: Duration,
}

/// Exit status bash reports for a foreground job killed by SIGINT.
pub const INTERRUPT_STATUS: i32 = 128 + libc::SIGINT;

impl ExecutionOutcome {
    pub fn streamed(status: i32, elapsed: Duration) -> Self {
        Self {
            status,
            output: CapturedOutput::Streamed,
            elapsed,
        }
    }

    pub fn success(&self) -> bool {
        self.status == 0
    }

    pub fn interrupted(&self) -> bool {
        self.status == INTERRUPT_STATUS
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Step {
    command: String,
    rationale: String,
    best_effort: bool,
    review: bool,
    verdict: Option<SafetyVerdict>,
    outcome: Option<ExecutionOutcome>,
}

impl Step {
    pub fn new(command: impl Into<String>, rationale: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            rationale: rationale.into(),
            best_effort: false,
            review: false,
            verdict: None,
            outcome: None,
        }
    }

    /// Marks the step non-fatal: a failing exit status does not abort the plan.
    pub fn best_effort(mut self, best_effort: bool) -> Self {
        self.best_effort = best_effort;
        self
    }

    /// Asks for confirmation regardless of a `Safe` verdict.
    pub fn with_review(mut self, review: bool) -> Self {
        self.review = review;
        self
    }

    pub fn command(&self) -> &str {
        &self.command
    }

    pub fn rationale(&self) -> &str {
        &self.rationale
    }

    pub fn is_best_effort(&self) -> bool {
        self.best_effort
    }

    pub fn needs_review(&self) -> bool {
        self.review
    }

    pub fn verdict(&self) -> Option<&SafetyVerdict> {
        self.verdict.as_ref()
    }

    pub fn outcome(&self) -> Option<&ExecutionOutcome> {
        self.outcome.as_ref()
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Plan {
    steps: Vec<Step>,
    truncated: bool,
}

impl Plan {
    pub fn new(steps: Vec<Step>) -> Self {
        Self {
            steps,
            truncated: false,
        }
    }

    pub fn single(step: Step) -> Self {
        Self::new(vec![step])
    }

    /// Drops steps beyond `max`, flagging the plan if anything was cut.
    pub fn cap(&mut self, max: usize) -> bool {
        if self.steps.len() > max {
            self.steps.truncate(max);
            self.truncated = true;
        }
        self.truncated
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn truncated(&self) -> bool {
        self.truncated
    }

    /// Index of the first step that has not run yet.
    pub fn next_index(&self) -> Option<usize> {
        self.steps.iter().position(|s| s.outcome.is_none())
    }

    pub fn record_verdict(&mut self, index: usize, verdict: SafetyVerdict) -> Result<(), ThinkError> {
        if self.next_index() != Some(index) || self.steps[index].verdict.is_some() {
            return Err(ThinkError::PlanOrder { index });
        }
        self.steps[index].verdict = Some(verdict);
        Ok(())
    }

    pub fn record_outcome(&mut self, index: usize, outcome: ExecutionOutcome) -> Result<(), ThinkError> {
        if self.next_index() != Some(index) {
            return Err(ThinkError::PlanOrder { index });
        }
        let step = &mut self.steps[index];
        match &step.verdict {
            None => Err(ThinkError::PlanOrder { index }),
            Some(v) if v.is_blocked() => Err(ThinkError::SafetyBlocked {
                command: step.command.clone(),
                rule: v.basis.clone(),
            }),
            Some(_) => {
                step.outcome = Some(outcome);
                Ok(())
            }
        }
    }
}
