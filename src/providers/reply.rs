//! Role prompts and the JSON reply protocol shared by all HTTP providers.

use super::{Judgment, ProposedStep, ProviderRequest, RequestRole, ResponsePayload};
use crate::error::ProviderError;
use serde::Deserialize;

const TRANSLATE_PROMPT: &str = r#"You fix mistyped shell commands for a bash user on Linux or macOS.
Return EXACTLY one JSON object and nothing else (no markdown, no prose):
{"command": "<corrected single-line command>", "confidence": <0.0-1.0>}
Rules:
- Keep the user's arguments, quoting and intent; only fix what is wrong.
- One line, no newlines, no explanations inside the command.
- If there is no sensible correction, return {"command": null, "refusal": "<short reason>"}."#;

const PLAN_PROMPT: &str = r#"You are a careful bash agent. Turn the user's goal into an ordered list of shell commands that will be typed, one by one, into the user's own interactive bash session (same working directory, same environment).
Return EXACTLY one JSON object and nothing else (no markdown, no prose):
{"steps": [{"command": "<single-line command>", "rationale": "<why>", "best_effort": false, "review": false}], "confidence": <0.0-1.0>}
Rules:
- Prefer the fewest steps. Later steps run after earlier ones and see their cd/export effects.
- Each command is one line. Never use sudo unless the user asked for it.
- Quote variables ("$var"), use $() rather than backticks, and keep commands POSIX-compatible.
- Set "best_effort": true only for diagnostic commands whose failure should not stop the plan.
- Set "review": true for anything destructive or hard to undo (deletions, force pushes, service restarts, cloud or database mutations).
- Interactive programs (vim, less, top) are fine when clearly intended.
- If critical information is missing, return {"steps": [], "question": "<one focused question>"}.
- If the goal is clearly unsafe (secret exfiltration, malware, wiping systems), return {"steps": [], "refusal": "<short reason>"}."#;

const ASSESS_PROMPT: &str = r#"You review a single shell command before it runs in a user's interactive bash session.
Return EXACTLY one JSON object and nothing else:
{"verdict": "safe" | "confirm" | "block", "reason": "<one sentence>"}
- "safe": read-only or easily reversible and unsurprising.
- "confirm": modifies or deletes data, changes system or remote state, uses elevated privileges, or you are unsure.
- "block": clearly destructive beyond recovery or malicious."#;

pub fn system_prompt(role: RequestRole) -> &'static str {
    match role {
        RequestRole::TranslateCommand => TRANSLATE_PROMPT,
        RequestRole::PlanSteps => PLAN_PROMPT,
        RequestRole::AssessSafety => ASSESS_PROMPT,
    }
}

/// Renders the request (plus host facts and the recent-step window) as the
/// user message.
pub fn user_message(request: &ProviderRequest) -> String {
    let mut message = match request.role {
        RequestRole::TranslateCommand => format!("MISTYPED_COMMAND: {}\n", request.input),
        RequestRole::PlanSteps => format!("GOAL: {}\n", request.input),
        RequestRole::AssessSafety => format!("COMMAND: {}\n", request.input),
    };
    message.push_str(&format!(
        "OS: {} ({})\n",
        std::env::consts::OS,
        std::env::consts::ARCH
    ));
    if let Some(cwd) = &request.cwd {
        message.push_str(&format!("CWD: {}\n", cwd));
    }
    if !request.context.is_empty() {
        message.push_str("RECENT_STEPS:\n");
        for step in &request.context {
            message.push_str(&format!("$ {}  [exit {}]\n", step.command, step.status));
        }
    }
    message
}

#[derive(Debug, Deserialize)]
struct TranslateReply {
    command: Option<String>,
    confidence: Option<f32>,
    refusal: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PlanReply {
    #[serde(default)]
    steps: Vec<ProposedStep>,
    question: Option<String>,
    refusal: Option<String>,
    confidence: Option<f32>,
}

#[derive(Debug, Deserialize)]
struct AssessReply {
    verdict: String,
    #[serde(default)]
    reason: String,
}

/// Parses the model's text for `role` into a payload and optional confidence.
pub fn parse_reply(
    role: RequestRole,
    text: &str,
) -> Result<(ResponsePayload, Option<f32>), ProviderError> {
    let json = extract_json(text)
        .ok_or_else(|| ProviderError::InvalidResponse(format!("no JSON object in reply: {}", text)))?;
    let invalid = |e: serde_json::Error| ProviderError::InvalidResponse(e.to_string());

    match role {
        RequestRole::TranslateCommand => {
            let reply: TranslateReply = serde_json::from_str(json).map_err(invalid)?;
            if let Some(reason) = non_empty(reply.refusal) {
                return Ok((ResponsePayload::Refusal(reason), reply.confidence));
            }
            let command = reply
                .command
                .ok_or_else(|| ProviderError::InvalidResponse("missing command".into()))?;
            Ok((ResponsePayload::Command(command.trim().to_string()), reply.confidence))
        }
        RequestRole::PlanSteps => {
            let reply: PlanReply = serde_json::from_str(json).map_err(invalid)?;
            if let Some(reason) = non_empty(reply.refusal) {
                return Ok((ResponsePayload::Refusal(reason), reply.confidence));
            }
            if reply.steps.is_empty() {
                if let Some(question) = non_empty(reply.question) {
                    return Ok((ResponsePayload::Clarification(question), reply.confidence));
                }
            }
            let steps = reply
                .steps
                .into_iter()
                .map(|mut s| {
                    s.command = s.command.trim().to_string();
                    s
                })
                .collect();
            Ok((ResponsePayload::Steps(steps), reply.confidence))
        }
        RequestRole::AssessSafety => {
            let reply: AssessReply = serde_json::from_str(json).map_err(invalid)?;
            let judgment = match reply.verdict.trim().to_ascii_lowercase().as_str() {
                "safe" => Judgment::Safe,
                "confirm" | "review" | "needs_confirmation" => Judgment::Confirm,
                "block" | "blocked" => Judgment::Block,
                other => {
                    return Err(ProviderError::InvalidResponse(format!(
                        "unknown verdict '{}'",
                        other
                    )));
                }
            };
            Ok((
                ResponsePayload::Judgment {
                    judgment,
                    reason: reply.reason,
                },
                None,
            ))
        }
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

/// Returns the outermost `{...}` span, which also strips markdown fences.
fn extract_json(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (end > start).then(|| &text[start..=end])
}
