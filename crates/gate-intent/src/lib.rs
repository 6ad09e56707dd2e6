//! Intent parser adapter: turns a free-text prompt into a structured,
//! authorization-checked [`Intent`].
//!
//! The actual LLM call is a pluggable collaborator behind [`IntentOracle`] —
//! this crate owns the parsing, validation, and defense-in-depth policy
//! override around whatever that collaborator returns.

#![forbid(unsafe_code)]

use async_trait::async_trait;
use gate_proto::Intent;
use thiserror::Error;
use tracing::warn;

/// The system prompt this adapter's external contract is built against.
/// Carried here for documentation; callers never need to construct it
/// themselves since [`parse_intent`] assembles the full prompt internally.
pub const SYSTEM_PROMPT: &str = "You are a financial compliance AI. Your task is to analyze a user's prompt within the context of their roles and the available financial actions. You must respond with ONLY a single, valid JSON object. Do not include any other text, greetings, or explanations outside of the JSON object. The JSON object must conform to the following schema: {\"action\": \"...\", \"target\": \"...\", \"amount\": ..., \"unit\": ..., \"is_safe\": ..., \"confidence_score\": ..., \"reasoning\": \"...\"}.";

#[derive(Debug, Error)]
pub enum IntentError {
    #[error("LLM API returned an unparsable response")]
    Unparsable,
    #[error("LLM could not identify a clear action from the prompt")]
    NoAction,
}

/// The LLM vendor call, abstracted so it can be swapped or stubbed.
#[async_trait]
pub trait IntentOracle: Send + Sync {
    async fn propose(&self, system_prompt: &str, roles: &[String], prompt: &str) -> String;
}

/// Parse a prompt into an [`Intent`], applying the post-parse policy
/// override: an LLM that marked an unauthorized action `is_safe: true` is
/// always overridden here, regardless of its own self-assessment.
pub async fn parse_intent(
    oracle: &dyn IntentOracle,
    roles: &[String],
    prompt: &str,
) -> Result<Intent, IntentError> {
    let raw = oracle.propose(SYSTEM_PROMPT, roles, prompt).await;
    let cleaned = strip_fences(&raw);

    let mut intent: Intent = serde_json::from_str(cleaned).map_err(|e| {
        warn!(error = %e, "LLM response failed to parse as Intent");
        IntentError::Unparsable
    })?;

    if intent.action.trim().is_empty() {
        return Err(IntentError::NoAction);
    }

    let required = intent
        .known_action()
        .map(gate_policy::required_roles)
        .unwrap_or(&[]);
    let authorized = required.iter().any(|r| roles.iter().any(|role| role == r));

    if !authorized && intent.is_safe {
        intent.is_safe = false;
        intent.confidence_score = 0.0;
        intent.reasoning = format!(
            "your role is not authorized to perform the '{}' action",
            intent.action
        );
    }

    Ok(intent)
}

fn strip_fences(raw: &str) -> &str {
    let trimmed = raw.trim();
    let trimmed = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .unwrap_or(trimmed);
    trimmed.strip_suffix("```").unwrap_or(trimmed).trim()
}

/// Deterministic oracle for tests and offline operation — extracts an
/// action via keyword matching rather than calling out to a real LLM.
pub struct StubOracle;

#[async_trait]
impl IntentOracle for StubOracle {
    async fn propose(&self, _system_prompt: &str, _roles: &[String], prompt: &str) -> String {
        let lower = prompt.to_lowercase();
        let amount = first_number(&lower);
        let target = word_after(&lower, "to");

        let (action, reasoning) = if lower.contains("transfer") {
            ("transfer", "parsed a transfer request")
        } else if lower.contains("balance") {
            ("check_balance", "parsed a balance inquiry")
        } else if lower.contains("pay") {
            ("pay_bill", "parsed a bill payment request")
        } else if lower.contains("loan") {
            ("approve_loan", "parsed a loan approval request")
        } else if lower.contains("create account") {
            ("create_account", "parsed an account creation request")
        } else if lower.contains("audit") {
            ("audit_transaction", "parsed an audit request")
        } else if lower.contains("delete account") {
            ("delete_account", "parsed an account deletion request")
        } else if lower.contains("ignore") || lower.contains("system prompt") || lower.contains("shell") {
            ("N/A", "prompt could not be parsed into a financial action")
        } else {
            ("informational", "parsed an informational request")
        };

        let is_safe = action != "N/A";
        serde_json::json!({
            "action": action,
            "target": target,
            "amount": amount,
            "unit": if amount.is_some() { Some("dollars") } else { None },
            "is_safe": is_safe,
            "confidence_score": if is_safe { 0.9 } else { 0.0 },
            "reasoning": reasoning,
        })
        .to_string()
    }
}

fn first_number(text: &str) -> Option<f64> {
    text.split_whitespace()
        .find_map(|tok| tok.trim_matches(|c: char| !c.is_ascii_digit() && c != '.').parse().ok())
}

fn word_after<'a>(text: &'a str, marker: &str) -> Option<String> {
    let idx = text.find(marker)?;
    let rest = text[idx + marker.len()..].trim_start();
    let words: Vec<&str> = rest.split_whitespace().take(2).collect();
    if words.is_empty() {
        None
    } else {
        Some(words.join(" "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_parse_transfer_intent() {
        let roles = vec!["teller".to_string()];
        let intent = parse_intent(&StubOracle, &roles, "transfer 100 dollars to savings")
            .await
            .expect("parse");
        assert_eq!(intent.action, "transfer");
        assert!(intent.is_safe);
        assert_eq!(intent.amount, Some(100.0));
    }

    #[tokio::test]
    async fn test_policy_override_forces_unsafe() {
        let roles = vec!["auditor".to_string()];
        let intent = parse_intent(&StubOracle, &roles, "transfer 100 dollars to savings")
            .await
            .expect("parse");
        assert_eq!(intent.action, "transfer");
        assert!(!intent.is_safe);
        assert_eq!(intent.confidence_score, 0.0);
    }

    #[tokio::test]
    async fn test_no_action_rejected() {
        struct BlankOracle;
        #[async_trait]
        impl IntentOracle for BlankOracle {
            async fn propose(&self, _: &str, _: &[String], _: &str) -> String {
                serde_json::json!({
                    "action": "",
                    "target": null,
                    "amount": null,
                    "unit": null,
                    "is_safe": false,
                    "confidence_score": 0.0,
                    "reasoning": "could not determine action",
                })
                .to_string()
            }
        }

        let roles = vec!["teller".to_string()];
        let result = parse_intent(&BlankOracle, &roles, "asdf").await;
        assert!(matches!(result, Err(IntentError::NoAction)));
    }

    #[tokio::test]
    async fn test_unparsable_response_rejected() {
        struct GarbageOracle;
        #[async_trait]
        impl IntentOracle for GarbageOracle {
            async fn propose(&self, _: &str, _: &[String], _: &str) -> String {
                "not json at all".to_string()
            }
        }

        let roles = vec!["teller".to_string()];
        let result = parse_intent(&GarbageOracle, &roles, "anything").await;
        assert!(matches!(result, Err(IntentError::Unparsable)));
    }

    #[tokio::test]
    async fn test_fenced_response_is_stripped() {
        struct FencedOracle;
        #[async_trait]
        impl IntentOracle for FencedOracle {
            async fn propose(&self, _: &str, _: &[String], _: &str) -> String {
                format!(
                    "```json\n{}\n```",
                    serde_json::json!({
                        "action": "check_balance",
                        "target": "checking account",
                        "amount": null,
                        "unit": null,
                        "is_safe": true,
                        "confidence_score": 0.8,
                        "reasoning": "balance check",
                    })
                )
            }
        }

        let roles = vec!["teller".to_string()];
        let intent = parse_intent(&FencedOracle, &roles, "what's my balance")
            .await
            .expect("parse");
        assert_eq!(intent.action, "check_balance");
    }
}
