//! Turns a classified intent into a plan.
//!
//! Natural-language goals go through a plan-multi-step request; typo
//! corrections skip planning and become a one-step plan built from a
//! translate-single-command request.

use crate::error::ThinkError;
use crate::plan::{Plan, Step};
use crate::providers::{
    PriorStep, ProposedStep, ProviderChain, ProviderRequest, RequestRole, ResponsePayload,
};
use crate::session::Intent;
use std::sync::Arc;
use tracing::{info, warn};

pub const DEFAULT_MAX_STEPS: usize = 8;

/// What the provider came back with.
#[derive(Debug, Clone, PartialEq)]
pub enum Proposal {
    Plan(Plan),
    /// The goal is missing something only the user can answer.
    Clarify(String),
    /// The model refused the request.
    Declined(String),
}

pub struct Planner {
    chain: Arc<ProviderChain>,
    max_steps: usize,
}

impl Planner {
    pub fn new(chain: Arc<ProviderChain>, max_steps: usize) -> Self {
        Self {
            chain,
            max_steps: max_steps.max(1),
        }
    }

    /// Plans a natural-language goal. Longer plans are cut to the step cap
    /// and flagged as truncated.
    pub async fn plan(
        &self,
        intent: &Intent,
        recent: Vec<PriorStep>,
        cwd: Option<String>,
    ) -> Result<Proposal, ThinkError> {
        let request = ProviderRequest::new(RequestRole::PlanSteps, intent.text.clone())
            .with_context(recent)
            .with_cwd(cwd);
        let response = self.chain.send(&request).await?;
        info!("Plan proposed by {}", response.provider);

        match response.payload {
            ResponsePayload::Steps(proposed) => {
                let mut plan = Plan::new(proposed.into_iter().map(to_step).collect());
                let proposed_len = plan.len();
                if plan.cap(self.max_steps) {
                    warn!(
                        "Plan of {} steps truncated to {}",
                        proposed_len, self.max_steps
                    );
                }
                Ok(Proposal::Plan(plan))
            }
            ResponsePayload::Clarification(question) => Ok(Proposal::Clarify(question)),
            ResponsePayload::Refusal(reason) => Ok(Proposal::Declined(reason)),
            other => Err(ThinkError::InvalidProviderResponse(format!(
                "unexpected plan payload {:?}",
                other
            ))),
        }
    }

    /// Corrects a mistyped command into a one-step plan.
    pub async fn translate(
        &self,
        intent: &Intent,
        recent: Vec<PriorStep>,
        cwd: Option<String>,
    ) -> Result<Proposal, ThinkError> {
        let request = ProviderRequest::new(RequestRole::TranslateCommand, intent.text.clone())
            .with_context(recent)
            .with_cwd(cwd);
        let response = self.chain.send(&request).await?;

        match response.payload {
            ResponsePayload::Command(command) => {
                info!("`{}` corrected to `{}` by {}", intent.text, command, response.provider);
                Ok(Proposal::Plan(Plan::single(Step::new(
                    command,
                    "Corrected mistyped command",
                ))))
            }
            ResponsePayload::Refusal(reason) => Ok(Proposal::Declined(reason)),
            other => Err(ThinkError::InvalidProviderResponse(format!(
                "unexpected translate payload {:?}",
                other
            ))),
        }
    }
}

fn to_step(proposed: ProposedStep) -> Step {
    Step::new(proposed.command, proposed.rationale)
        .best_effort(proposed.best_effort)
        .with_review(proposed.review)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ProviderError;
    use crate::providers::chain::tests::FixedProvider;
    use crate::providers::{Provider, ProviderResponse};
    use crate::session::IntentKind;
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct RecordingProvider {
        seen: Arc<Mutex<Vec<ProviderRequest>>>,
    }

    #[async_trait]
    impl Provider for RecordingProvider {
        fn name(&self) -> &str {
            "recorder"
        }

        async fn send(&self, request: &ProviderRequest) -> Result<ProviderResponse, ProviderError> {
            self.seen.lock().unwrap().push(request.clone());
            Ok(ProviderResponse {
                provider: "recorder".into(),
                payload: ResponsePayload::Steps(vec![proposed("pwd")]),
                confidence: None,
            })
        }
    }

    fn proposed(command: &str) -> ProposedStep {
        ProposedStep {
            command: command.into(),
            rationale: format!("run {}", command),
            best_effort: false,
            review: false,
        }
    }

    fn planner_with(payload: ResponsePayload, max_steps: usize) -> Planner {
        let chain = ProviderChain::new(vec![Box::new(FixedProvider::ok("fixed", payload))]);
        Planner::new(Arc::new(chain), max_steps)
    }

    fn goal(text: &str) -> Intent {
        Intent::new(IntentKind::NaturalLanguageTask, text)
    }

    #[tokio::test]
    async fn test_plan_copies_step_flags() {
        let mut check = proposed("df -h");
        check.best_effort = true;
        let mut wipe = proposed("rm -r build");
        wipe.review = true;
        let planner = planner_with(ResponsePayload::Steps(vec![check, wipe]), DEFAULT_MAX_STEPS);

        let Proposal::Plan(plan) = planner.plan(&goal("clean up"), vec![], None).await.unwrap() else {
            panic!("expected a plan");
        };

        assert_eq!(plan.len(), 2);
        assert!(plan.steps()[0].is_best_effort());
        assert!(plan.steps()[1].needs_review());
        assert!(plan.steps()[0].verdict().is_none());
        assert!(plan.steps()[0].outcome().is_none());
        assert!(!plan.truncated());
    }

    #[tokio::test]
    async fn test_long_plan_is_truncated_not_rejected() {
        let steps = (0..5).map(|i| proposed(&format!("echo {}", i))).collect();
        let planner = planner_with(ResponsePayload::Steps(steps), 3);

        let Proposal::Plan(plan) = planner.plan(&goal("count"), vec![], None).await.unwrap() else {
            panic!("expected a plan");
        };

        assert_eq!(plan.len(), 3);
        assert!(plan.truncated());
        assert_eq!(plan.steps()[2].command(), "echo 2");
    }

    #[tokio::test]
    async fn test_plan_passes_question_and_refusal_through() {
        let planner = planner_with(ResponsePayload::Clarification("Which port?".into()), 8);
        assert_eq!(
            planner.plan(&goal("open the port"), vec![], None).await.unwrap(),
            Proposal::Clarify("Which port?".into())
        );

        let planner = planner_with(ResponsePayload::Refusal("no".into()), 8);
        assert_eq!(
            planner.plan(&goal("leak keys"), vec![], None).await.unwrap(),
            Proposal::Declined("no".into())
        );
    }

    #[tokio::test]
    async fn test_plan_request_carries_context() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let chain = ProviderChain::new(vec![Box::new(RecordingProvider { seen: seen.clone() })]);
        let planner = Planner::new(Arc::new(chain), 8);
        let recent = vec![PriorStep {
            command: "cd api".into(),
            status: 0,
        }];

        planner
            .plan(&goal("where am i"), recent.clone(), Some("/srv/api".into()))
            .await
            .unwrap();

        let seen = seen.lock().unwrap();
        assert_eq!(seen[0].role, RequestRole::PlanSteps);
        assert_eq!(seen[0].input, "where am i");
        assert_eq!(seen[0].context, recent);
        assert_eq!(seen[0].cwd.as_deref(), Some("/srv/api"));
    }

    #[tokio::test]
    async fn test_translate_builds_single_step_plan() {
        let planner = planner_with(ResponsePayload::Command("git status".into()), 8);
        let intent = Intent::new(IntentKind::TypoCorrection, "gti status");

        let Proposal::Plan(plan) = planner.translate(&intent, vec![], None).await.unwrap() else {
            panic!("expected a plan");
        };

        assert_eq!(plan.len(), 1);
        assert_eq!(plan.steps()[0].command(), "git status");
    }

    #[tokio::test]
    async fn test_unavailable_providers_propagate() {
        let chain = ProviderChain::new(vec![Box::new(FixedProvider::err(
            "down",
            ProviderError::Timeout(20),
        ))]);
        let planner = Planner::new(Arc::new(chain), 8);

        let err = planner.plan(&goal("list files"), vec![], None).await.unwrap_err();

        assert!(matches!(err, ThinkError::ProviderUnavailable { .. }));
    }
}
