//! Wire types shared across the gateway.
//!
//! Defines the `Intent`, `ActionRequest`, and JWT claim shapes exchanged
//! between the credential service, the intent parser adapter, and the
//! secured execution pipeline.

#![forbid(unsafe_code)]

use serde::{Deserialize, Serialize};

// ─── Financial actions ────────────────────────────────────────────────────────

/// The enumerated financial actions an Intent may name.
///
/// This is the closed set `ROLE_ACTION_MAP` is keyed on. An `Intent.action`
/// string that does not match one of these (including the literal sentinel
/// `"N/A"`) has no entry in the map and is therefore never authorized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    Transfer,
    CheckBalance,
    PayBill,
    ApproveLoan,
    CreateAccount,
    AuditTransaction,
    DeleteAccount,
    Informational,
}

impl Action {
    /// All known actions, in `ROLE_ACTION_MAP` declaration order.
    pub const ALL: [Action; 8] = [
        Action::Transfer,
        Action::CheckBalance,
        Action::PayBill,
        Action::ApproveLoan,
        Action::CreateAccount,
        Action::AuditTransaction,
        Action::DeleteAccount,
        Action::Informational,
    ];

    /// Parse a raw action string from an Intent or Action Request.
    ///
    /// Returns `None` for the "N/A" sentinel and for any unrecognized string —
    /// both cases mean "not in `ROLE_ACTION_MAP`" to the caller.
    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|a| a.as_str() == s)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Transfer => "transfer",
            Action::CheckBalance => "check_balance",
            Action::PayBill => "pay_bill",
            Action::ApproveLoan => "approve_loan",
            Action::CreateAccount => "create_account",
            Action::AuditTransaction => "audit_transaction",
            Action::DeleteAccount => "delete_account",
            Action::Informational => "informational",
        }
    }
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Sentinel the LLM emits when no action could be determined.
pub const ACTION_NOT_APPLICABLE: &str = "N/A";

// ─── Intent ────────────────────────────────────────────────────────────────────

/// Structured intent produced by the Intent Parser Adapter from LLM output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Intent {
    /// Raw action string as parsed from the LLM response (may be `"N/A"` or
    /// an action unknown to this gateway; see [`Action::parse`]).
    pub action: String,
    pub target: Option<String>,
    pub amount: Option<f64>,
    pub unit: Option<String>,
    pub is_safe: bool,
    pub confidence_score: f64,
    pub reasoning: String,
}

impl Intent {
    /// This intent's action, resolved against the closed [`Action`] set.
    pub fn known_action(&self) -> Option<Action> {
        Action::parse(&self.action)
    }
}

// ─── Action Request ────────────────────────────────────────────────────────────

/// The body an agent submits to `/agent/execute` alongside a delegation token.
///
/// This is the agent's *claim* of what to do — the authoritative scope lives
/// in the delegation token, not here (see `gate-pipeline`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionRequest {
    pub action: String,
    pub account_id: String,
    #[serde(default)]
    pub amount: Option<i64>,
}

// ─── JWT claim shapes ──────────────────────────────────────────────────────────

/// Claims carried by both session and delegation tokens.
///
/// The two token kinds share this exact shape (see design note in
/// `gate-delegate`): a delegation token is a session-shaped token whose
/// `roles` list has one additional `scope_data=<b64>` entry appended.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub roles: Vec<String>,
    pub iat: i64,
    pub exp: i64,
    pub auth: String,
}

impl Claims {
    /// Roles with any `scope_data=...` entry stripped out.
    pub fn plain_roles(&self) -> Vec<&str> {
        self.roles
            .iter()
            .map(String::as_str)
            .filter(|r| !r.starts_with(SCOPE_DATA_PREFIX))
            .collect()
    }

    /// The raw, still-base64-encoded scope payload, if this token carries one.
    pub fn scope_data(&self) -> Option<&str> {
        self.roles
            .iter()
            .find_map(|r| r.strip_prefix(SCOPE_DATA_PREFIX))
    }
}

/// Prefix marking a synthetic scope entry inside a `roles` claim (see §4.7).
pub const SCOPE_DATA_PREFIX: &str = "scope_data=";

// ─── Validation ───────────────────────────────────────────────────────────────

/// Validate an operator username.
pub fn validate_username(username: &str) -> bool {
    !username.is_empty()
        && username.len() <= 64
        && username
            .chars()
            .all(|c| c.is_alphanumeric() || c == '-' || c == '_' || c == '.')
}

/// Validate an account identifier from an Action Request.
pub fn validate_account_id(id: &str) -> bool {
    !id.is_empty() && id.len() <= 128
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_action_round_trip() {
        for action in Action::ALL {
            assert_eq!(Action::parse(action.as_str()), Some(action));
        }
    }

    #[test]
    fn test_action_not_applicable_unknown() {
        assert_eq!(Action::parse(ACTION_NOT_APPLICABLE), None);
        assert_eq!(Action::parse("transfer_money_illegally"), None);
    }

    #[test]
    fn test_action_display() {
        assert_eq!(Action::Transfer.to_string(), "transfer");
        assert_eq!(Action::DeleteAccount.to_string(), "delete_account");
    }

    #[test]
    fn test_intent_serialization() {
        let intent = Intent {
            action: "transfer".to_string(),
            target: Some("savings account".to_string()),
            amount: Some(100.0),
            unit: Some("dollars".to_string()),
            is_safe: true,
            confidence_score: 0.95,
            reasoning: "operator requested a transfer".to_string(),
        };
        let json = serde_json::to_string(&intent).expect("serialize");
        let back: Intent = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(intent, back);
        assert_eq!(back.known_action(), Some(Action::Transfer));
    }

    #[test]
    fn test_claims_scope_extraction() {
        let claims = Claims {
            sub: "teller1".to_string(),
            roles: vec![
                "teller".to_string(),
                "customer_service".to_string(),
                "scope_data=dHJhbnNmZXI6c2F2aW5ncw".to_string(),
            ],
            iat: 1_700_000_000,
            exp: 1_700_000_600,
            auth: "gatekeeper".to_string(),
        };
        assert_eq!(claims.plain_roles(), vec!["teller", "customer_service"]);
        assert_eq!(claims.scope_data(), Some("dHJhbnNmZXI6c2F2aW5ncw"));
    }

    #[test]
    fn test_claims_without_scope() {
        let claims = Claims {
            sub: "teller1".to_string(),
            roles: vec!["teller".to_string()],
            iat: 0,
            exp: 600,
            auth: "gatekeeper".to_string(),
        };
        assert_eq!(claims.scope_data(), None);
    }

    #[test]
    fn test_validate_username() {
        assert!(validate_username("teller1"));
        assert!(!validate_username(""));
        assert!(!validate_username("has space"));
    }

    #[test]
    fn test_validate_account_id() {
        assert!(validate_account_id("acct-1"));
        assert!(!validate_account_id(""));
    }
}
