//! Execution supervisor.
//!
//! Runs an attached plan one step at a time against the live shell:
//!
//! ```text
//! Pending -> Running -+-> Completed
//!                     +-> AwaitingConfirmation --resume(true)--> Running
//!                     |                        \-resume(false)-> Aborted(Declined)
//!                     +-> Aborted(reason)
//!                     \-> Blocked { command, rule }
//! ```
//!
//! Each step is assessed immediately before it would run, never earlier, so
//! it sees the directory and environment left behind by the step before.

use crate::error::{HookError, ThinkError};
use crate::plan::{SafetyLevel, SafetyVerdict, Step};
use crate::safety::SafetyGate;
use crate::session::SessionState;
use crate::shell_hook::ShellHook;
use tracing::{info, warn};

/// Basis used when a reviewed step is upgraded from `Safe`.
pub const PLANNER_REVIEW: &str = "planner-review";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AbortReason {
    /// A step exited non-zero and was not best-effort.
    StepFailed {
        index: usize,
        command: String,
        status: i32,
    },
    /// The user declined a step that needed confirmation.
    Declined { command: String },
    /// The user interrupted a running step.
    Interrupted { command: String },
    /// The shell went away mid-plan.
    SessionLost,
    /// The model refused to propose anything. Never produced by the
    /// supervisor itself; the pipeline reports it before a plan exists.
    ModelDeclined(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SupervisorState {
    Pending,
    Running,
    /// Paused on step `index`; drive on with [`Supervisor::resume`].
    AwaitingConfirmation { index: usize },
    Completed,
    Aborted(AbortReason),
    Blocked { command: String, rule: String },
}

impl SupervisorState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SupervisorState::Completed | SupervisorState::Aborted(_) | SupervisorState::Blocked { .. }
        )
    }
}

/// Drives one plan. Holds the shell exclusively until it is dropped, so no
/// other invocation can type into the session while the plan is live.
pub struct Supervisor<'a, H: ShellHook + ?Sized> {
    session: &'a mut SessionState,
    gate: &'a SafetyGate,
    hook: &'a mut H,
    state: SupervisorState,
    announce: bool,
}

impl<'a, H: ShellHook + ?Sized> Supervisor<'a, H> {
    pub fn new(session: &'a mut SessionState, gate: &'a SafetyGate, hook: &'a mut H) -> Self {
        Self {
            session,
            gate,
            hook,
            state: SupervisorState::Pending,
            announce: false,
        }
    }

    /// Echo each command to the user before it runs.
    pub fn announce_steps(mut self, announce: bool) -> Self {
        self.announce = announce;
        self
    }

    pub fn state(&self) -> &SupervisorState {
        &self.state
    }

    /// The step waiting for confirmation together with its verdict.
    pub fn pending_confirmation(&self) -> Option<(&Step, &SafetyVerdict)> {
        let SupervisorState::AwaitingConfirmation { index } = self.state else {
            return None;
        };
        let step = self.session.plan()?.steps().get(index)?;
        Some((step, step.verdict()?))
    }

    /// Runs steps until the plan finishes, stops, or needs confirmation.
    /// Calling it in a paused or terminal state changes nothing.
    pub async fn advance(&mut self) -> Result<&SupervisorState, ThinkError> {
        match self.state {
            SupervisorState::Pending => {
                info!("Plan started");
                self.state = SupervisorState::Running;
            }
            SupervisorState::Running => {}
            _ => return Ok(&self.state),
        }

        while self.state == SupervisorState::Running {
            let Some(plan) = self.session.plan_mut() else {
                self.state = SupervisorState::Completed;
                break;
            };
            let Some(index) = plan.next_index() else {
                info!("Plan completed");
                self.state = SupervisorState::Completed;
                break;
            };

            let step = &plan.steps()[index];
            let command = step.command().to_string();
            let review = step.needs_review();

            let cwd = self.hook.working_dir();
            let mut verdict = self.gate.assess(&command, cwd.as_deref()).await;
            if review && verdict.level == SafetyLevel::Safe {
                verdict = SafetyVerdict::needs_confirmation(PLANNER_REVIEW);
            }

            let level = verdict.level;
            let basis = verdict.basis.clone();
            plan.record_verdict(index, verdict)?;

            match level {
                SafetyLevel::Blocked => {
                    warn!("Blocked `{}` ({})", command, basis);
                    self.state = SupervisorState::Blocked {
                        command,
                        rule: basis,
                    };
                }
                SafetyLevel::NeedsConfirmation => {
                    info!("Step {} `{}` needs confirmation ({})", index, command, basis);
                    self.state = SupervisorState::AwaitingConfirmation { index };
                }
                SafetyLevel::Safe => self.execute(index, command).await?,
            }
        }

        Ok(&self.state)
    }

    /// Answers a pending confirmation. A confirmed step runs as assessed;
    /// it is not assessed again. Without a pending confirmation this is a
    /// no-op.
    pub async fn resume(&mut self, ack: bool) -> Result<&SupervisorState, ThinkError> {
        let SupervisorState::AwaitingConfirmation { index } = self.state else {
            return Ok(&self.state);
        };
        let command = self
            .session
            .plan()
            .and_then(|p| p.steps().get(index))
            .map(|s| s.command().to_string())
            .ok_or(ThinkError::PlanOrder { index })?;

        if !ack {
            info!("User declined `{}`", command);
            self.state = SupervisorState::Aborted(AbortReason::Declined { command });
            return Ok(&self.state);
        }

        self.state = SupervisorState::Running;
        self.execute(index, command).await?;
        self.advance().await
    }

    async fn execute(&mut self, index: usize, command: String) -> Result<(), ThinkError> {
        if self.announce {
            self.hook.announce(&command);
        }
        info!("Running step {}: `{}`", index, command);

        let outcome = match self.hook.run(&command).await {
            Ok(outcome) => outcome,
            Err(HookError::SessionLost) => {
                warn!("Session lost while running `{}`", command);
                self.state = SupervisorState::Aborted(AbortReason::SessionLost);
                return Ok(());
            }
            Err(HookError::Io(e)) => return Err(e.into()),
        };

        let plan = self
            .session
            .plan_mut()
            .ok_or(ThinkError::PlanOrder { index })?;
        let best_effort = plan.steps()[index].is_best_effort();
        let status = outcome.status;
        let interrupted = outcome.interrupted();
        plan.record_outcome(index, outcome)?;
        info!("Step {} exited with {}", index, status);

        if interrupted {
            self.state = SupervisorState::Aborted(AbortReason::Interrupted { command });
        } else if status != 0 && !best_effort {
            self.state = SupervisorState::Aborted(AbortReason::StepFailed {
                index,
                command,
                status,
            });
        } else if status != 0 {
            warn!("Best-effort step `{}` failed with {}, continuing", command, status);
        }
        Ok(())
    }
}
