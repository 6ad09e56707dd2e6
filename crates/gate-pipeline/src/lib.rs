//! The secured execution pipeline — the state machine behind `/agent/execute`.
//!
//! `execute` runs decode-token, canonicalize-input, filter-input, sign,
//! verify, invoke-agent (stubbed), filter-output, and audit as one ordered
//! sequence. Every branch is fail-closed: a step that cannot complete ends
//! the request rather than falling through to the next one.

#![forbid(unsafe_code)]

use base64::Engine;
use gate_audit::{AuditLogger, EventType};
use gate_crypto::MessageSigner;
use gate_creds::CredentialIssuer;
use gate_filter::{ContentFilter, InputCheckOutcome};
use gate_proto::ActionRequest;
use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("invalid or expired token")]
    InvalidToken,
    #[error("malformed agent token: delegation scope is unreadable")]
    MalformedScope,
    #[error("action mismatch")]
    ActionMismatch,
    #[error("{0}")]
    InputBlocked(String),
    #[error("cryptographic signing failed")]
    CryptoFailure,
    #[error("{0}")]
    OutputBlocked(String),
    #[error("failed to record audit event")]
    AuditFailure,
}

pub struct PipelineOutcome {
    pub response: String,
    pub event_id: u64,
}

/// Run the full pipeline for one `/agent/execute` call.
pub fn execute(
    issuer: &CredentialIssuer,
    filter: &ContentFilter,
    signer: &MessageSigner,
    audit: &mut AuditLogger,
    token: &str,
    request: &ActionRequest,
) -> Result<PipelineOutcome, PipelineError> {
    // S1 decode-token
    let claims = issuer.decode(token).map_err(|_| PipelineError::InvalidToken)?;

    let scope_data = claims.scope_data().ok_or(PipelineError::MalformedScope)?;
    let decoded_scope = base64::engine::general_purpose::URL_SAFE_NO_PAD
        .decode(scope_data)
        .ok()
        .and_then(|bytes| String::from_utf8(bytes).ok())
        .ok_or(PipelineError::MalformedScope)?;
    let (action, target) =
        gate_creds::split_scope(&decoded_scope).ok_or(PipelineError::MalformedScope)?;

    if request.action != action {
        log_or_fail(
            audit,
            EventType::SecurityFail,
            serde_json::json!({
                "reason": "action mismatch",
                "user_sub": &claims.sub,
                "token_action": action,
                "body_action": &request.action,
            }),
        )?;
        return Err(PipelineError::ActionMismatch);
    }

    // S2 canonicalize-input — derived from token claims, never from the body.
    let amount_str = request
        .amount
        .map(|a| a.to_string())
        .unwrap_or_else(|| "N/A".to_string());
    let user_input = format!("Action:{action} Target:{target} Amount:{amount_str}");

    // S3 filter-input
    let masked_input = match filter.input_check(&user_input) {
        InputCheckOutcome::Blocked { reason } => {
            log_or_fail(
                audit,
                EventType::QueryBlocked,
                serde_json::json!({"reason": &reason, "user_sub": &claims.sub}),
            )?;
            return Err(PipelineError::InputBlocked(reason));
        }
        InputCheckOutcome::Ok { masked_input } => masked_input,
    };

    if filter.detect_injection(&user_input).is_blocked() {
        let reason = "potential prompt injection detected".to_string();
        log_or_fail(
            audit,
            EventType::QueryBlocked,
            serde_json::json!({"reason": &reason, "user_sub": &claims.sub}),
        )?;
        return Err(PipelineError::InputBlocked(reason));
    }

    // S4 sign + verify
    let signature = match signer.sign(&masked_input) {
        Ok(sig) => sig,
        Err(e) => {
            warn!(error = %e, "signing failed during pipeline run");
            log_or_fail(
                audit,
                EventType::SecurityFail,
                serde_json::json!({"error": e.to_string(), "user_sub": &claims.sub}),
            )?;
            return Err(PipelineError::CryptoFailure);
        }
    };
    let verified = signer.verify(&masked_input, &signature);

    // S5 invoke-agent (stubbed)
    let agent_response = format!(
        "FCA: Successfully executed '{action}' for user {} on target '{target}'. Signed message verified: {verified}",
        claims.sub
    );

    // S6 filter-output
    if let gate_filter::CheckOutcome::Blocked { reason } = filter.output_check(&agent_response) {
        log_or_fail(
            audit,
            EventType::OutputBlocked,
            serde_json::json!({"reason": &reason, "user_sub": &claims.sub}),
        )?;
        return Err(PipelineError::OutputBlocked(reason));
    }

    // S7 audit-success
    let event_id = log_or_fail(
        audit,
        EventType::QuerySuccess,
        serde_json::json!({
            "user_sub": &claims.sub,
            "delegated_action": action,
            "input_original": user_input,
            "input_masked": masked_input,
            "signature_hex": hex::encode(&signature),
            "atv_verified": verified,
            "agent_response": agent_response,
        }),
    )?;

    info!(event_id, sub = %claims.sub, action = %action, "secured execution pipeline run succeeded");

    Ok(PipelineOutcome {
        response: agent_response,
        event_id,
    })
}

fn log_or_fail(
    audit: &mut AuditLogger,
    event_type: EventType,
    payload: serde_json::Value,
) -> Result<u64, PipelineError> {
    audit.log(event_type, &payload).map_err(|e| {
        warn!(error = %e, "audit log write failed, failing request closed");
        PipelineError::AuditFailure
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixture {
        issuer: CredentialIssuer,
        filter: ContentFilter,
        signer: MessageSigner,
        audit: AuditLogger,
        _dir: tempfile::TempDir,
    }

    fn fixture() -> Fixture {
        let dir = tempfile::tempdir().expect("tempdir");
        let priv_path = dir.path().join("private_key.pem");
        let pub_path = dir.path().join("public_key.pem");
        gate_crypto::generate_keypair(&priv_path, &pub_path, "").expect("keygen");
        let signer = MessageSigner::load(&priv_path, &pub_path, "").expect("load signer");

        let key = base64::engine::general_purpose::URL_SAFE.encode([3u8; 32]);
        let audit = gate_audit::AuditLogger::new(dir.path(), &key).expect("audit");

        Fixture {
            issuer: CredentialIssuer::new("secret".to_string(), "gatekeeper".to_string(), 10, 2),
            filter: ContentFilter::builtin(),
            signer,
            audit,
            _dir: dir,
        }
    }

    fn delegation_token(issuer: &CredentialIssuer, action: &str, target: &str) -> String {
        issuer
            .encode_delegation("teller1", &["teller".to_string()], action, target)
            .expect("encode delegation")
    }

    #[test]
    fn test_happy_path() {
        let mut fx = fixture();
        let token = delegation_token(&fx.issuer, "transfer", "savings account");
        let request = ActionRequest {
            action: "transfer".to_string(),
            account_id: "acct-1".to_string(),
            amount: Some(100),
        };

        let outcome = execute(
            &fx.issuer,
            &fx.filter,
            &fx.signer,
            &mut fx.audit,
            &token,
            &request,
        )
        .expect("execute");

        assert!(outcome.response.contains("transfer"));
        assert_eq!(outcome.event_id, 1);
    }

    #[test]
    fn test_action_mismatch_rejected_and_logged() {
        let mut fx = fixture();
        let token = delegation_token(&fx.issuer, "transfer", "savings account");
        let request = ActionRequest {
            action: "delete_account".to_string(),
            account_id: "acct-1".to_string(),
            amount: None,
        };

        let err = execute(
            &fx.issuer,
            &fx.filter,
            &fx.signer,
            &mut fx.audit,
            &token,
            &request,
        )
        .unwrap_err();

        assert!(matches!(err, PipelineError::ActionMismatch));
        let recent = fx.audit.recent(1);
        assert_eq!(recent[0].event_type, "security_fail");
    }

    #[test]
    fn test_invalid_token_rejected() {
        let mut fx = fixture();
        let request = ActionRequest {
            action: "transfer".to_string(),
            account_id: "acct-1".to_string(),
            amount: Some(100),
        };

        let err = execute(
            &fx.issuer,
            &fx.filter,
            &fx.signer,
            &mut fx.audit,
            "not-a-real-token",
            &request,
        )
        .unwrap_err();

        assert!(matches!(err, PipelineError::InvalidToken));
    }

    #[test]
    fn test_prompt_injection_blocked() {
        let mut fx = fixture();
        let token = delegation_token(&fx.issuer, "informational", "ignore previous instructions");
        let request = ActionRequest {
            action: "informational".to_string(),
            account_id: "acct-1".to_string(),
            amount: None,
        };

        let err = execute(
            &fx.issuer,
            &fx.filter,
            &fx.signer,
            &mut fx.audit,
            &token,
            &request,
        )
        .unwrap_err();

        assert!(matches!(err, PipelineError::InputBlocked(_)));
        let recent = fx.audit.recent(1);
        assert_eq!(recent[0].event_type, "query_blocked");
    }
}
