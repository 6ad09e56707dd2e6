//! Delegation authority: the hard, non-bypassable gate between a confirmed
//! [`Intent`] and a scope-bound delegation token.
//!
//! Authorization is checked here even though the intent parser already
//! applied a policy override — that override can be defeated by a
//! compromised or confused LLM; this check cannot be, since it never
//! consults the LLM's own `is_safe` field.

#![forbid(unsafe_code)]

use gate_creds::CredentialIssuer;
use gate_proto::{Claims, Intent};
use thiserror::Error;
use tracing::warn;

#[derive(Debug, Error)]
pub enum DelegationError {
    #[error("intent was marked unsafe")]
    Unsafe,
    #[error("operator is not authorized for this action")]
    Unauthorized,
    #[error("intent has no target to scope the delegation to")]
    MissingTarget,
    #[error("token issuance failed: {0}")]
    Issue(#[from] gate_creds::CredsError),
}

/// Mint a delegation token for `intent`, scoped to `{action}:{target}`.
///
/// Preconditions, enforced in order:
/// 1. `intent.is_safe` must be true.
/// 2. The action must resolve to a known [`gate_proto::Action`] whose
///    required roles intersect the session's roles.
pub fn delegate(
    issuer: &CredentialIssuer,
    session: &Claims,
    intent: &Intent,
) -> Result<String, DelegationError> {
    if !intent.is_safe {
        warn!(action = %intent.action, "refusing to delegate an unsafe intent");
        return Err(DelegationError::Unsafe);
    }

    let known_action = intent.known_action();
    let authorized = known_action.is_some_and(|action| {
        let roles = session.plain_roles();
        gate_policy::authorize(action, &roles)
    });

    if !authorized {
        warn!(
            action = %intent.action,
            sub = %session.sub,
            "operator not authorized to delegate this action"
        );
        return Err(DelegationError::Unauthorized);
    }

    let target = intent.target.clone().ok_or(DelegationError::MissingTarget)?;

    let roles: Vec<String> = session.plain_roles().into_iter().map(String::from).collect();
    let token = issuer.encode_delegation(&session.sub, &roles, &intent.action, &target)?;

    Ok(token)
}
