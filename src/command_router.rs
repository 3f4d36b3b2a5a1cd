use crate::{
    config::Config,
    confirm_ui::Confirmer,
    error::{ProviderFailure, ThinkError},
    history::RecentSteps,
    http_client::ReqwestHttpClient,
    intent::IntentRouter,
    planner::{Planner, Proposal},
    safety::SafetyGate,
    session::{CapturedInput, IntentKind, SessionState},
    shell_hook::ShellHook,
    supervisor::{AbortReason, Supervisor, SupervisorState},
};
use anyhow::Result;
use std::sync::Arc;
use tracing::{info, warn};

/// How an invocation ended.
#[derive(Debug, Clone, PartialEq)]
pub enum InvocationOutcome {
    /// Nothing to do; no provider was called.
    Passthrough,
    Completed { kind: IntentKind, steps: usize },
    Aborted(AbortReason),
    Blocked { command: String, rule: String },
    ProviderUnavailable { attempts: Vec<ProviderFailure> },
    SessionLost,
    /// The planner needs an answer before it can plan.
    NeedsClarification { question: String },
}

/// One terminal session's pipeline: classify, plan or translate, then
/// supervise. Invocations are handled one at a time; the recent-step window
/// carries over between them.
pub struct CommandRouter {
    intents: IntentRouter,
    planner: Planner,
    gate: SafetyGate,
    recent: RecentSteps,
    last: Option<SessionState>,
}

impl CommandRouter {
    pub fn new(intents: IntentRouter, planner: Planner, gate: SafetyGate, context_window: usize) -> Self {
        Self {
            intents,
            planner,
            gate,
            recent: RecentSteps::new(context_window),
            last: None,
        }
    }

    /// Wires the real providers, gate and PATH-based intent policy.
    pub fn from_config(config: &Config) -> Result<Self> {
        let chain = Arc::new(config.provider_chain(Arc::new(ReqwestHttpClient::new())));
        if chain.is_empty() {
            warn!("No providers configured; every invocation will be reported as unavailable");
        } else {
            info!("Provider order: {}", chain.names().join(", "));
        }

        let gate = if config.semantic_safety {
            SafetyGate::with_semantic(chain.clone())?
        } else {
            SafetyGate::pattern_only()?
        };
        let planner = Planner::new(chain, config.max_plan_steps);

        Ok(Self::new(
            IntentRouter::from_path_env(),
            planner,
            gate,
            config.context_window,
        ))
    }

    pub fn recent(&self) -> &RecentSteps {
        &self.recent
    }

    /// State of the most recent invocation, kept until the next one starts.
    pub fn last_session(&self) -> Option<&SessionState> {
        self.last.as_ref()
    }

    /// Runs one invocation to a terminal state.
    ///
    /// `hook` is borrowed for the whole invocation, so nothing else can type
    /// into the session until the plan is over. `confirmer` answers every
    /// step that needs confirmation.
    pub async fn handle<H, C>(
        &mut self,
        input: CapturedInput,
        hook: &mut H,
        confirmer: &mut C,
    ) -> Result<InvocationOutcome, ThinkError>
    where
        H: ShellHook + ?Sized,
        C: Confirmer + ?Sized,
    {
        self.last = None;
        let intent = self.intents.classify(&input);
        let mut session = SessionState::new(input, intent);
        let outcome = self.run_session(&mut session, hook, confirmer).await;
        info!("Invocation finished after {:?}: {:?}", session.elapsed(), outcome);
        self.last = Some(session);
        outcome
    }

    async fn run_session<H, C>(
        &mut self,
        session: &mut SessionState,
        hook: &mut H,
        confirmer: &mut C,
    ) -> Result<InvocationOutcome, ThinkError>
    where
        H: ShellHook + ?Sized,
        C: Confirmer + ?Sized,
    {
        let intent = session.intent();
        if intent.kind == IntentKind::Passthrough {
            return Ok(InvocationOutcome::Passthrough);
        }
        if intent.ambiguous {
            info!("Ambiguous input, planning '{}' as a natural-language task", intent.text);
        }

        let kind = intent.kind;
        let recent = self.recent.snapshot();
        let cwd = hook.working_dir();
        let proposal = match kind {
            IntentKind::TypoCorrection => self.planner.translate(intent, recent, cwd).await,
            _ => self.planner.plan(intent, recent, cwd).await,
        };

        let plan = match proposal {
            Ok(Proposal::Plan(plan)) => plan,
            Ok(Proposal::Clarify(question)) => {
                return Ok(InvocationOutcome::NeedsClarification { question });
            }
            Ok(Proposal::Declined(reason)) => {
                return Ok(InvocationOutcome::Aborted(AbortReason::ModelDeclined(reason)));
            }
            Err(ThinkError::ProviderUnavailable { attempts }) => {
                warn!("All {} provider attempts failed", attempts.len());
                return Ok(InvocationOutcome::ProviderUnavailable { attempts });
            }
            Err(e) => return Err(e),
        };
        session.attach_plan(plan)?;

        let state = {
            let mut supervisor = Supervisor::new(&mut *session, &self.gate, hook)
                .announce_steps(kind == IntentKind::NaturalLanguageTask);
            let mut state = supervisor.advance().await?.clone();
            while let SupervisorState::AwaitingConfirmation { .. } = state {
                let ack = match supervisor.pending_confirmation() {
                    Some((step, verdict)) => confirmer.confirm(step, verdict).await,
                    None => false,
                };
                state = supervisor.resume(ack).await?.clone();
            }
            state
        };

        let steps = match session.plan() {
            Some(plan) => {
                self.recent.record_plan(plan);
                plan.len()
            }
            None => 0,
        };

        Ok(match state {
            SupervisorState::Completed => InvocationOutcome::Completed { kind, steps },
            SupervisorState::Aborted(AbortReason::SessionLost) => InvocationOutcome::SessionLost,
            SupervisorState::Aborted(reason) => InvocationOutcome::Aborted(reason),
            SupervisorState::Blocked { command, rule } => InvocationOutcome::Blocked { command, rule },
            SupervisorState::Pending
            | SupervisorState::Running
            | SupervisorState::AwaitingConfirmation { .. } => {
                InvocationOutcome::Aborted(AbortReason::SessionLost)
            }
        })
    }

    /// Input for the follow-up invocation after the user answered a
    /// clarifying question.
    pub fn with_answer(original: &CapturedInput, answer: &str) -> CapturedInput {
        CapturedInput::explicit(format!(
            "{}\n\nUSER_ANSWER: {}",
            original.text(),
            answer.trim()
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::confirm_ui::AutoConfirm;
    use crate::error::ProviderError;
    use crate::intent::{HeuristicPolicy, KnownCommands};
    use crate::providers::chain::tests::FixedProvider;
    use crate::providers::mock::MockProvider;
    use crate::providers::{ProposedStep, ProviderChain, ResponsePayload};
    use crate::shell_hook::tests::ScriptedShell;

    fn router_over(chain: ProviderChain) -> CommandRouter {
        let chain = Arc::new(chain);
        let known = KnownCommands::from_names(["ls", "git", "grep", "cat"]);
        CommandRouter::new(
            IntentRouter::new(Box::new(HeuristicPolicy::new(known))),
            Planner::new(chain, 8),
            SafetyGate::pattern_only().unwrap(),
            10,
        )
    }

    fn mock_router() -> CommandRouter {
        router_over(ProviderChain::new(vec![Box::new(MockProvider::new())]))
    }

    #[tokio::test]
    async fn test_empty_input_is_passthrough() {
        let mut shell = ScriptedShell::new();
        let outcome = mock_router()
            .handle(CapturedInput::failed("  "), &mut shell, &mut AutoConfirm(true))
            .await
            .unwrap();
        assert_eq!(outcome, InvocationOutcome::Passthrough);
        assert!(shell.ran.is_empty());
    }

    #[tokio::test]
    async fn test_typo_is_corrected_and_run_silently() {
        let mut router = mock_router();
        let mut shell = ScriptedShell::new();

        let outcome = router
            .handle(CapturedInput::failed("gti status"), &mut shell, &mut AutoConfirm(false))
            .await
            .unwrap();

        assert_eq!(
            outcome,
            InvocationOutcome::Completed {
                kind: IntentKind::TypoCorrection,
                steps: 1
            }
        );
        assert_eq!(shell.ran, vec!["git status"]);
        assert!(shell.announced.is_empty());
        assert_eq!(router.recent().snapshot()[0].command, "git status");
    }

    #[tokio::test]
    async fn test_clarification_is_surfaced() {
        let mut shell = ScriptedShell::new();
        let outcome = mock_router()
            .handle(CapturedInput::explicit("install something"), &mut shell, &mut AutoConfirm(true))
            .await
            .unwrap();
        assert!(matches!(outcome, InvocationOutcome::NeedsClarification { .. }));
        assert!(shell.ran.is_empty());
    }

    #[tokio::test]
    async fn test_session_exists_before_any_plan() {
        let mut router = mock_router();
        let mut shell = ScriptedShell::new();

        router
            .handle(CapturedInput::explicit("install something"), &mut shell, &mut AutoConfirm(true))
            .await
            .unwrap();

        let session = router.last_session().unwrap();
        assert_eq!(session.input().text(), "install something");
        assert_eq!(session.intent().kind, IntentKind::NaturalLanguageTask);
        assert!(session.plan().is_none());

        router
            .handle(CapturedInput::failed("gti status"), &mut shell, &mut AutoConfirm(true))
            .await
            .unwrap();

        let session = router.last_session().unwrap();
        assert_eq!(session.intent().kind, IntentKind::TypoCorrection);
        assert_eq!(session.plan().map(|p| p.len()), Some(1));
    }

    #[tokio::test]
    async fn test_answer_is_appended_to_original_goal() {
        let original = CapturedInput::explicit("install something");
        let follow_up = CommandRouter::with_answer(&original, " ripgrep ");
        assert_eq!(follow_up.text(), "install something\n\nUSER_ANSWER: ripgrep");
    }

    #[tokio::test]
    async fn test_model_refusal_aborts() {
        let mut shell = ScriptedShell::new();
        let outcome = mock_router()
            .handle(CapturedInput::explicit("print my password"), &mut shell, &mut AutoConfirm(true))
            .await
            .unwrap();
        assert!(matches!(
            outcome,
            InvocationOutcome::Aborted(AbortReason::ModelDeclined(_))
        ));
    }

    #[tokio::test]
    async fn test_declined_confirmation_runs_nothing() {
        let steps = vec![ProposedStep {
            command: "rm notes.txt".into(),
            rationale: "clean up".into(),
            best_effort: false,
            review: false,
        }];
        let mut router = router_over(ProviderChain::new(vec![Box::new(FixedProvider::ok(
            "fixed",
            ResponsePayload::Steps(steps),
        ))]));
        let mut shell = ScriptedShell::new();

        let outcome = router
            .handle(CapturedInput::explicit("remove my notes"), &mut shell, &mut AutoConfirm(false))
            .await
            .unwrap();

        assert_eq!(
            outcome,
            InvocationOutcome::Aborted(AbortReason::Declined {
                command: "rm notes.txt".into()
            })
        );
        assert!(shell.ran.is_empty());
        assert!(router.recent().is_empty());
    }

    #[tokio::test]
    async fn test_unavailable_providers_run_nothing() {
        let mut router = router_over(ProviderChain::new(vec![Box::new(FixedProvider::err(
            "down",
            ProviderError::Transport("offline".into()),
        ))]));
        let mut shell = ScriptedShell::new();

        let outcome = router
            .handle(CapturedInput::failed("gti status"), &mut shell, &mut AutoConfirm(true))
            .await
            .unwrap();

        match outcome {
            InvocationOutcome::ProviderUnavailable { attempts } => {
                assert_eq!(attempts[0].provider, "down");
            }
            other => panic!("unexpected outcome {:?}", other),
        }
        assert!(shell.ran.is_empty());
    }

    #[tokio::test]
    async fn test_session_lost_is_reported() {
        let mut shell = ScriptedShell::new().lose_session_on("ls -la");
        let outcome = mock_router()
            .handle(CapturedInput::failed("list files"), &mut shell, &mut AutoConfirm(true))
            .await
            .unwrap();
        assert_eq!(outcome, InvocationOutcome::SessionLost);
    }
}
