//! Top-level gateway error type and its HTTP surfacing.
//!
//! This is the one place in the binary that decides HTTP status codes; no
//! component crate below it knows about HTTP. Mirrors the reference node
//! agent's `NodeError`, composed over the per-crate error enums from the
//! `gate-*` library crates.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("config error: {0}")]
    Config(String),

    #[error("incorrect username or password")]
    AuthenticationFailure,

    #[error("{0}")]
    AuthorizationDenied(String),

    #[error("{0}")]
    InputRejected(String),

    #[error("{0}")]
    OutputRejected(String),

    #[error("cryptographic operation failed")]
    CryptoFailure,

    #[error("upstream LLM call failed")]
    UpstreamLlmFailure,

    #[error("failed to record audit event")]
    LedgerFailure,

    #[error("malformed request: {0}")]
    BadRequest(String),

    #[error("invalid or expired token")]
    InvalidToken,

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type GatewayResult<T> = Result<T, GatewayError>;

impl From<gate_creds::CredsError> for GatewayError {
    fn from(e: gate_creds::CredsError) -> Self {
        match e {
            gate_creds::CredsError::AuthenticationFailure => GatewayError::AuthenticationFailure,
            gate_creds::CredsError::InvalidToken => GatewayError::InvalidToken,
            other => GatewayError::Config(other.to_string()),
        }
    }
}

impl From<gate_intent::IntentError> for GatewayError {
    fn from(_: gate_intent::IntentError) -> Self {
        GatewayError::UpstreamLlmFailure
    }
}

impl From<gate_delegate::DelegationError> for GatewayError {
    fn from(e: gate_delegate::DelegationError) -> Self {
        match e {
            gate_delegate::DelegationError::Unsafe => {
                GatewayError::BadRequest("cannot delegate token for an unsafe intent".to_string())
            }
            gate_delegate::DelegationError::Unauthorized => GatewayError::AuthorizationDenied(
                "your role is not authorized to perform this action".to_string(),
            ),
            gate_delegate::DelegationError::MissingTarget => {
                GatewayError::BadRequest("intent has no target to scope the delegation to".to_string())
            }
            gate_delegate::DelegationError::Issue(inner) => inner.into(),
        }
    }
}

impl From<gate_pipeline::PipelineError> for GatewayError {
    fn from(e: gate_pipeline::PipelineError) -> Self {
        use gate_pipeline::PipelineError as P;
        match e {
            P::InvalidToken => GatewayError::InvalidToken,
            P::MalformedScope => GatewayError::BadRequest("malformed scope".to_string()),
            P::ActionMismatch => GatewayError::BadRequest("action mismatch".to_string()),
            P::InputBlocked(reason) => GatewayError::InputRejected(reason),
            P::CryptoFailure => GatewayError::CryptoFailure,
            P::OutputBlocked(reason) => GatewayError::OutputRejected(reason),
            P::AuditFailure => GatewayError::LedgerFailure,
        }
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = match &self {
            GatewayError::AuthenticationFailure | GatewayError::InvalidToken => {
                StatusCode::UNAUTHORIZED
            }
            GatewayError::AuthorizationDenied(_) => StatusCode::FORBIDDEN,
            GatewayError::InputRejected(_) | GatewayError::BadRequest(_) => StatusCode::BAD_REQUEST,
            GatewayError::OutputRejected(_)
            | GatewayError::CryptoFailure
            | GatewayError::UpstreamLlmFailure
            | GatewayError::LedgerFailure
            | GatewayError::Config(_)
            | GatewayError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        (status, Json(json!({ "detail": self.to_string() }))).into_response()
    }
}
