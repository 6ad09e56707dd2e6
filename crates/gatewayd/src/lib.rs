//! gatewayd — the FinLLM authorization gateway.
//!
//! Wires the `gate-*` library crates behind an axum HTTP server: operator
//! login, LLM-backed intent parsing, delegation-token issuance, and the
//! secured execution pipeline that drives every `/agent/execute` call.

#![forbid(unsafe_code)]

pub mod config;
pub mod error;
pub mod handlers;

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use gate_crypto::MessageSigner;
use gate_filter::ContentFilter;
use gate_intent::{IntentOracle, StubOracle};
use gate_creds::{CredentialIssuer, OperatorDirectory};
use parking_lot::Mutex;

pub use config::GatewayConfig;
pub use error::{GatewayError, GatewayResult};

/// Process-wide shared state. Everything here except the audit ledger is
/// read-only after startup and needs no lock; the ledger is the gateway's
/// single mutable, single-writer store (see design note in `gate-audit`).
pub struct GatewayState {
    pub operators: OperatorDirectory,
    pub issuer: CredentialIssuer,
    pub filter: ContentFilter,
    pub signer: MessageSigner,
    pub audit: Mutex<gate_audit::AuditLogger>,
    pub oracle: Box<dyn IntentOracle>,
}

impl GatewayState {
    pub fn bootstrap(config: &GatewayConfig) -> GatewayResult<Self> {
        let operators = OperatorDirectory::load(&config.operators_fixture_path())
            .map_err(|e| GatewayError::Config(format!("operator directory: {e}")))?;

        let issuer = CredentialIssuer::new(
            config.jwt_secret_key.clone(),
            config.server_id.clone(),
            config.jwt_expiry_minutes,
            config.delegation_expiry_minutes,
        );

        let filter = ContentFilter::load(&config.blocked_keywords_path());

        let signer = MessageSigner::load(
            &config.private_key_path(),
            &config.public_key_path(),
            &config.key_passphrase,
        )
        .map_err(|e| GatewayError::Config(format!("signing keys: {e}")))?;

        let audit = gate_audit::AuditLogger::new(&config.state_dir, &config.db_encryption_key)
            .map_err(|e| GatewayError::Config(format!("audit ledger: {e}")))?;

        Ok(Self {
            operators,
            issuer,
            filter,
            signer,
            audit: Mutex::new(audit),
            oracle: Box::new(StubOracle),
        })
    }
}

pub type SharedState = Arc<GatewayState>;

/// Build the gateway's axum router over `state`.
pub fn build_router(state: SharedState) -> Router {
    Router::new()
        .route("/healthz", get(handlers::healthz))
        .route("/auth/login", post(handlers::login))
        .route("/auth/intent", post(handlers::intent))
        .route("/auth/delegate", post(handlers::delegate))
        .route("/agent/execute", post(handlers::execute))
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .with_state(state)
}
