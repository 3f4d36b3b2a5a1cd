//! Deterministic offline provider.
//!
//! Enabled with `THINKSHELL_USE_MOCK=1` (or `use_mock = true` in the config)
//! so the whole pipeline can be exercised without network access or keys.

use super::{
    Judgment, ProposedStep, Provider, ProviderRequest, ProviderResponse, RequestRole,
    ResponsePayload,
};
use crate::error::ProviderError;
use async_trait::async_trait;

const TYPO_TABLE: &[(&str, &str)] = &[
    ("gti", "git"),
    ("got", "git"),
    ("sl", "ls"),
    ("grpe", "grep"),
    ("claer", "clear"),
    ("dokcer", "docker"),
    ("pyhton", "python3"),
    ("mkae", "make"),
];

/// Commands the mock reviewer always wants confirmed.
const REVIEW_VERBS: &[&str] = &["rm", "sudo", "kill", "chmod", "chown", "mv", "dd"];

pub struct MockProvider;

impl MockProvider {
    pub fn new() -> Self {
        Self
    }

    fn translate(&self, input: &str) -> ResponsePayload {
        let mut words = input.splitn(2, char::is_whitespace);
        let first = words.next().unwrap_or_default();
        let rest = words.next().unwrap_or_default();
        match TYPO_TABLE.iter().find(|(typo, _)| *typo == first) {
            Some((_, fixed)) if rest.is_empty() => ResponsePayload::Command(fixed.to_string()),
            Some((_, fixed)) => ResponsePayload::Command(format!("{} {}", fixed, rest)),
            None => ResponsePayload::Refusal(format!("no correction known for '{}'", first)),
        }
    }

    fn plan(&self, goal: &str) -> ResponsePayload {
        let goal = goal.to_lowercase();
        let has = |word: &str| goal.contains(word);
        let step = |command: &str, rationale: &str| ProposedStep {
            command: command.to_string(),
            rationale: rationale.to_string(),
            best_effort: false,
            review: false,
        };

        if has("secret") || has("password") || has("private key") {
            return ResponsePayload::Refusal("Refusing to expose credentials".into());
        }
        if (has("delete") || has("remove")) && has("build") {
            let mut s = step("rm -rf build", "Recursively delete the build folder");
            s.review = true;
            return ResponsePayload::Steps(vec![s]);
        }
        if has("list") && has("file") {
            return ResponsePayload::Steps(vec![step("ls -la", "List files in the current directory")]);
        }
        if has("ip") && has("address") {
            return ResponsePayload::Steps(vec![step("ifconfig | grep inet", "Show interface addresses")]);
        }
        if has("disk") {
            let mut s = step("df -h", "Show disk usage");
            s.best_effort = true;
            return ResponsePayload::Steps(vec![s]);
        }
        if has("time") || has("date") {
            return ResponsePayload::Steps(vec![step("date", "Show the current date and time")]);
        }
        if has("install") {
            return match goal.split_once("user_answer:") {
                Some((_, package)) => ResponsePayload::Steps(vec![step(
                    &format!("echo 'would install {}'", package.trim().replace('\'', "")),
                    "Mock install",
                )]),
                None => ResponsePayload::Clarification("Which package should I install?".into()),
            };
        }
        let flat = goal.split_whitespace().collect::<Vec<_>>().join(" ");
        ResponsePayload::Steps(vec![step(
            &format!("echo 'No mock plan for: {}'", flat.replace('\'', "")),
            "Mock fallback",
        )])
    }

    fn assess(&self, command: &str) -> ResponsePayload {
        let first = command.split_whitespace().next().unwrap_or_default();
        if REVIEW_VERBS.contains(&first) {
            ResponsePayload::Judgment {
                judgment: Judgment::Confirm,
                reason: format!("'{}' modifies the system", first),
            }
        } else {
            ResponsePayload::Judgment {
                judgment: Judgment::Safe,
                reason: "mock reviewer found nothing risky".into(),
            }
        }
    }
}

impl Default for MockProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Provider for MockProvider {
    fn name(&self) -> &str {
        "mock"
    }

    async fn send(&self, request: &ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        let payload = match request.role {
            RequestRole::TranslateCommand => self.translate(request.input.trim()),
            RequestRole::PlanSteps => self.plan(&request.input),
            RequestRole::AssessSafety => self.assess(request.input.trim()),
        };
        Ok(ProviderResponse {
            provider: self.name().to_string(),
            payload,
            confidence: Some(1.0),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn send(role: RequestRole, input: &str) -> ResponsePayload {
        MockProvider::new()
            .send(&ProviderRequest::new(role, input))
            .await
            .unwrap()
            .payload
    }

    #[tokio::test]
    async fn test_mock_translates_known_typo_keeping_args() {
        let payload = send(RequestRole::TranslateCommand, "gti commit -m 'wip  now'").await;
        assert_eq!(payload, ResponsePayload::Command("git commit -m 'wip  now'".into()));
    }

    #[tokio::test]
    async fn test_mock_refuses_unknown_typo() {
        let payload = send(RequestRole::TranslateCommand, "qqq").await;
        assert!(matches!(payload, ResponsePayload::Refusal(_)));
    }

    #[tokio::test]
    async fn test_mock_plans_list_files() {
        let payload = send(RequestRole::PlanSteps, "list files").await;
        match payload {
            ResponsePayload::Steps(steps) => assert_eq!(steps[0].command, "ls -la"),
            other => panic!("unexpected payload {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_mock_plans_build_deletion_for_review() {
        let payload = send(
            RequestRole::PlanSteps,
            "delete everything in the build folder recursively and permanently",
        )
        .await;
        match payload {
            ResponsePayload::Steps(steps) => {
                assert_eq!(steps[0].command, "rm -rf build");
                assert!(steps[0].review);
            }
            other => panic!("unexpected payload {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_mock_asks_for_missing_package() {
        let payload = send(RequestRole::PlanSteps, "install something").await;
        assert!(matches!(payload, ResponsePayload::Clarification(_)));
    }

    #[tokio::test]
    async fn test_mock_plans_answered_install() {
        let payload = send(RequestRole::PlanSteps, "install something USER_ANSWER: ripgrep").await;
        match payload {
            ResponsePayload::Steps(steps) => assert_eq!(steps[0].command, "echo 'would install ripgrep'"),
            other => panic!("unexpected payload {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_mock_assess_flags_rm() {
        let payload = send(RequestRole::AssessSafety, "rm notes.txt").await;
        assert!(matches!(
            payload,
            ResponsePayload::Judgment {
                judgment: Judgment::Confirm,
                ..
            }
        ));
    }
}
