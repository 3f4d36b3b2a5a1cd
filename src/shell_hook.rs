//! Boundary to the user's live interactive shell.

use crate::error::HookError;
use crate::plan::ExecutionOutcome;
use crate::session::CapturedInput;
use async_trait::async_trait;

/// The interactive session the assistant reads from and types into.
///
/// Implementations keep the user's own shell process: `run` executes in the
/// same working directory and environment, with the command's standard
/// streams attached to the user's terminal.
#[async_trait]
pub trait ShellHook: Send {
    /// Waits until the shell reports a failed command or an explicit
    /// invocation, and returns the line exactly as typed.
    async fn capture(&mut self) -> Result<CapturedInput, HookError>;

    /// Types `command` into the session and waits for it to finish.
    ///
    /// # Errors
    ///
    /// Returns [`HookError::SessionLost`] once the shell is gone.
    async fn run(&mut self, command: &str) -> Result<ExecutionOutcome, HookError>;

    /// Current working directory of the shell, when it is known.
    fn working_dir(&self) -> Option<String> {
        None
    }

    /// Shows the user a command that is about to run.
    fn announce(&mut self, _command: &str) {}
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::plan::{ExecutionOutcome, INTERRUPT_STATUS};
    use std::collections::{HashMap, VecDeque};
    use std::time::Duration;

    /// Shell double: replays queued captures and answers `run` from a
    /// status table, recording every command it was asked to run.
    #[derive(Default)]
    pub struct ScriptedShell {
        pub captures: VecDeque<CapturedInput>,
        pub statuses: HashMap<String, i32>,
        pub lost_on: Option<String>,
        pub ran: Vec<String>,
        pub announced: Vec<String>,
        pub cwd: Option<String>,
    }

    impl ScriptedShell {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn status(mut self, command: &str, status: i32) -> Self {
            self.statuses.insert(command.to_string(), status);
            self
        }

        pub fn interrupted(self, command: &str) -> Self {
            self.status(command, INTERRUPT_STATUS)
        }

        pub fn lose_session_on(mut self, command: &str) -> Self {
            self.lost_on = Some(command.to_string());
            self
        }
    }

    #[async_trait]
    impl ShellHook for ScriptedShell {
        async fn capture(&mut self) -> Result<CapturedInput, HookError> {
            self.captures.pop_front().ok_or(HookError::SessionLost)
        }

        async fn run(&mut self, command: &str) -> Result<ExecutionOutcome, HookError> {
            if self.lost_on.as_deref() == Some(command) {
                return Err(HookError::SessionLost);
            }
            self.ran.push(command.to_string());
            let status = self.statuses.get(command).copied().unwrap_or(0);
            Ok(ExecutionOutcome::streamed(status, Duration::from_millis(1)))
        }

        fn working_dir(&self) -> Option<String> {
            self.cwd.clone()
        }

        fn announce(&mut self, command: &str) {
            self.announced.push(command.to_string());
        }
    }

    #[tokio::test]
    async fn test_scripted_shell_reports_configured_status() {
        let mut shell = ScriptedShell::new().status("false", 1);
        assert_eq!(shell.run("false").await.unwrap().status, 1);
        assert!(shell.run("true").await.unwrap().success());
        assert_eq!(shell.ran, vec!["false", "true"]);
    }
}
