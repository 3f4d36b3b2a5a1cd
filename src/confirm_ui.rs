//! User interface for step confirmation and invocation outcomes.
//!
//! Everything here writes `\r\n` line endings because the host terminal is
//! in raw mode while the shell session is attached.

use crate::command_router::InvocationOutcome;
use crate::plan::{SafetyVerdict, Step};
use crate::session::IntentKind;
use crate::supervisor::AbortReason;
use anyhow::Result;
use async_trait::async_trait;
use std::io::Write;
use tracing::info;

/// Answers the supervisor's confirmation requests.
#[async_trait]
pub trait Confirmer: Send {
    /// Returns `true` to run `step`. Anything that is not an explicit yes
    /// counts as a decline.
    async fn confirm(&mut self, step: &Step, verdict: &SafetyVerdict) -> bool;
}

/// Gives the same answer to every request.
pub struct AutoConfirm(pub bool);

#[async_trait]
impl Confirmer for AutoConfirm {
    async fn confirm(&mut self, step: &Step, _verdict: &SafetyVerdict) -> bool {
        info!("Auto-answering {} for `{}`", self.0, step.command());
        self.0
    }
}

/// Parses a yes/no answer; `None` for anything else.
pub fn parse_answer(answer: &str) -> Option<bool> {
    match answer.trim().to_ascii_lowercase().as_str() {
        "y" | "yes" => Some(true),
        "n" | "no" | "" => Some(false),
        _ => None,
    }
}

/// Renders confirmation dialogs and outcome reports.
pub struct ConfirmUI {
    verbose: bool,
}

impl ConfirmUI {
    /// Creates a new `ConfirmUI`.
    ///
    /// With `verbose`, completed natural-language plans are summarised too.
    pub fn new(verbose: bool) -> Self {
        Self { verbose }
    }

    // =========================================================================
    // Core methods with I/O injection (testable)
    // =========================================================================

    /// Shows the step and why it needs a yes, without the question line.
    pub fn render_confirmation_with_io<W: Write>(
        &self,
        step: &Step,
        verdict: &SafetyVerdict,
        output: &mut W,
    ) -> Result<()> {
        write!(output, "\r\n⚠️  Confirmation needed\r\n")?;
        write!(output, "   ▶️  {}\r\n", step.command())?;
        if !step.rationale().is_empty() {
            write!(output, "   💡 {}\r\n", step.rationale())?;
        }
        write!(output, "   🛡️  {}\r\n", verdict.basis)?;
        Ok(())
    }

    /// Writes the yes/no question that follows the dialog.
    pub fn ask_with_io<W: Write>(&self, output: &mut W) -> Result<()> {
        write!(output, "Run it? [y/N]: ")?;
        output.flush()?;
        Ok(())
    }

    /// Interprets one answer to the question. `None` for input means the
    /// user cancelled, which declines. `Ok(None)` means the question has to
    /// be asked again.
    pub fn answer_with_io<W: Write>(
        &self,
        step: &Step,
        answer: Option<&str>,
        output: &mut W,
    ) -> Result<Option<bool>> {
        let Some(answer) = answer else {
            info!("Confirmation cancelled for `{}`", step.command());
            return Ok(Some(false));
        };
        match parse_answer(answer) {
            Some(ack) => {
                info!("User answered {} for `{}`", ack, step.command());
                Ok(Some(ack))
            }
            None => {
                write!(output, "Please answer y or n.\r\n")?;
                output.flush()?;
                Ok(None)
            }
        }
    }

    /// Shows a command the assistant is about to type into the session.
    pub fn announce_with_io<W: Write>(&self, command: &str, output: &mut W) -> Result<()> {
        write!(output, "\r\n🤖 {}\r\n", command)?;
        output.flush()?;
        Ok(())
    }

    /// Reports how an invocation ended. Successful typo corrections and
    /// passthrough stay silent.
    pub fn report_outcome_with_io<W: Write>(
        &self,
        outcome: &InvocationOutcome,
        output: &mut W,
    ) -> Result<()> {
        match outcome {
            InvocationOutcome::Passthrough | InvocationOutcome::NeedsClarification { .. } => {}
            InvocationOutcome::Completed { kind, steps } => {
                if self.verbose && *kind == IntentKind::NaturalLanguageTask {
                    write!(output, "\r\n✅ Done ({} step{})\r\n", steps, plural(*steps))?;
                }
            }
            InvocationOutcome::Blocked { command, rule } => {
                write!(output, "\r\n⛔ Blocked: {}\r\n", command)?;
                write!(output, "   Rule: {}\r\n", rule)?;
                write!(output, "   Nothing after this step was run.\r\n")?;
            }
            InvocationOutcome::Aborted(reason) => {
                let message = match reason {
                    AbortReason::StepFailed { command, status, .. } => {
                        format!("Stopped: `{}` exited with status {}", command, status)
                    }
                    AbortReason::Declined { command } => {
                        format!("Cancelled: `{}` was not run", command)
                    }
                    AbortReason::Interrupted { command } => {
                        format!("Interrupted during `{}`; remaining steps skipped", command)
                    }
                    AbortReason::SessionLost => "Terminal session lost".to_string(),
                    AbortReason::ModelDeclined(why) => format!("The model declined: {}", why),
                };
                write!(output, "\r\n❌ {}\r\n", message)?;
            }
            InvocationOutcome::ProviderUnavailable { attempts } => {
                write!(output, "\r\n❌ No language model could answer; nothing was run.\r\n")?;
                if attempts.is_empty() {
                    write!(
                        output,
                        "   No provider is configured. Set OPENAI_API_KEY, ANTHROPIC_API_KEY or GOOGLE_API_KEY.\r\n"
                    )?;
                }
                for attempt in attempts {
                    write!(output, "   - {}: {}\r\n", attempt.provider, attempt.error)?;
                }
            }
            InvocationOutcome::SessionLost => {
                write!(output, "\r\n❌ Terminal session lost\r\n")?;
            }
        }
        output.flush()?;
        Ok(())
    }
}

fn plural(n: usize) -> &'static str {
    if n == 1 { "" } else { "s" }
}
