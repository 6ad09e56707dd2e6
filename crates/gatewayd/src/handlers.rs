//! HTTP handlers for the gateway's five endpoints.

use axum::extract::{Form, State};
use axum::http::HeaderMap;
use axum::response::Json;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::info;

use crate::error::{GatewayError, GatewayResult};
use crate::SharedState;
use gate_proto::{Claims, Intent};

pub async fn healthz() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

// ─── /auth/login ────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct LoginForm {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: String,
}

pub async fn login(
    State(state): State<SharedState>,
    Form(form): Form<LoginForm>,
) -> GatewayResult<Json<TokenResponse>> {
    let operator = state
        .operators
        .authenticate(&form.username, &form.password)?;

    let access_token = state
        .issuer
        .encode_session(&operator.username, &operator.roles)?;

    info!(username = %operator.username, "operator session issued");

    Ok(Json(TokenResponse {
        access_token,
        token_type: "bearer".to_string(),
    }))
}

// ─── /auth/intent ───────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct IntentRequestBody {
    pub prompt: String,
}

pub async fn intent(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Json(body): Json<IntentRequestBody>,
) -> GatewayResult<Json<Intent>> {
    let claims = session_claims(&state, &headers)?;
    let roles: Vec<String> = claims.plain_roles().into_iter().map(String::from).collect();

    let intent = gate_intent::parse_intent(state.oracle.as_ref(), &roles, &body.prompt).await?;
    Ok(Json(intent))
}

// ─── /auth/delegate ─────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct DelegationRequestBody {
    /// Carried for wire parity with the reference schema; the operator
    /// identity that is actually delegated from is the session token in the
    /// `Authorization` header, not this field.
    #[allow(dead_code)]
    pub user_token: String,
    pub intent: Intent,
}

#[derive(Debug, Serialize)]
pub struct DelegationResponseBody {
    pub agent_token: String,
}

pub async fn delegate(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Json(body): Json<DelegationRequestBody>,
) -> GatewayResult<Json<DelegationResponseBody>> {
    let claims = session_claims(&state, &headers)?;
    let agent_token = gate_delegate::delegate(&state.issuer, &claims, &body.intent)?;
    info!(sub = %claims.sub, action = %body.intent.action, "delegation token minted");
    Ok(Json(DelegationResponseBody { agent_token }))
}

// ─── /agent/execute ─────────────────────────────────────────────────────────

pub async fn execute(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Json(body): Json<gate_proto::ActionRequest>,
) -> GatewayResult<Json<Value>> {
    let token = bearer_token(&headers)?;

    let mut audit = state.audit.lock();
    let outcome = gate_pipeline::execute(
        &state.issuer,
        &state.filter,
        &state.signer,
        &mut audit,
        token,
        &body,
    )?;

    Ok(Json(json!({
        "response": outcome.response,
        "event_id": outcome.event_id,
        "status": "ok",
    })))
}

// ─── Shared helpers ─────────────────────────────────────────────────────────

fn bearer_token(headers: &HeaderMap) -> GatewayResult<&str> {
    headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .ok_or_else(|| {
            GatewayError::BadRequest(
                "missing or malformed Authorization header (expected: Bearer <token>)".to_string(),
            )
        })
}

fn session_claims(state: &SharedState, headers: &HeaderMap) -> GatewayResult<Claims> {
    let token = bearer_token(headers)?;
    Ok(state.issuer.decode(token)?)
}
