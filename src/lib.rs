//! ThinkShell - an assistant that lives inside your interactive shell.
//!
//! When bash cannot run a line, or the line starts with the trigger prefix,
//! the line is handed to a language model. Typos come back as one corrected
//! command; natural-language requests come back as a short plan. Every
//! command passes a safety gate before it is typed into the user's own
//! session, where it runs with the user's working directory and environment.
//!
//! # Architecture
//!
//! - [`shell_hook`] - boundary to the live shell; [`pty_shell`] hosts bash in
//!   a PTY and reads the [`markers`] its rcfile emits
//! - [`intent`] - local classification: typo, natural language or passthrough
//! - [`providers`] - OpenAI, Anthropic and Gemini behind one trait, with
//!   ordered fallback in [`providers::ProviderChain`]
//! - [`planner`] - turns an intent into a bounded [`plan::Plan`]
//! - [`safety`] - deterministic pattern rules plus an optional model judgment
//! - [`supervisor`] - runs a plan step by step and stops on failure
//! - [`session`] and [`history`] - per-invocation state and the recent-step
//!   window carried between invocations
//! - [`command_router`] - wires the pipeline together
//! - [`confirm_ui`] - confirmation prompts and outcome reports
//! - [`config`] - provider keys, order and limits
//!
//! # Example
//!
//! ```ignore
//! use thinkshell::command_router::CommandRouter;
//! use thinkshell::config::Config;
//! use thinkshell::pty_shell::PtyShell;
//! use thinkshell::shell_hook::ShellHook;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load(None)?;
//!     let mut router = CommandRouter::from_config(&config)?;
//!     let (mut shell, mut prompt) =
//!         PtyShell::spawn(&config.shell_path(), &config.trigger_prefix, false)?;
//!
//!     while let Ok(input) = shell.capture().await {
//!         let outcome = router.handle(input, &mut shell, &mut prompt).await?;
//!         prompt.report(&outcome);
//!         shell.refresh_prompt();
//!     }
//!     Ok(())
//! }
//! ```

pub mod command_router;
pub mod config;
pub mod confirm_ui;
pub mod error;
pub mod history;
pub mod http_client;
pub mod intent;
pub mod markers;
pub mod plan;
pub mod planner;
pub mod providers;
pub mod pty_shell;
pub mod safety;
pub mod session;
pub mod shell_hook;
pub mod supervisor;
