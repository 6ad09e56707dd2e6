//! Operator directory, password hashing, and JWT session/delegation issuance.
//!
//! Two token kinds come out of [`CredentialIssuer`]: a session token minted at
//! login, and a delegation token minted once an intent has been confirmed.
//! They share one claims shape — a delegation token is simply a session token
//! whose `roles` carry one extra `scope_data=<b64>` entry (see `gate-delegate`).

#![forbid(unsafe_code)]

use base64::Engine;
use chrono::Utc;
use gate_proto::{Claims, SCOPE_DATA_PREFIX};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum CredsError {
    #[error("operator directory file error: {0}")]
    Io(#[from] std::io::Error),
    #[error("operator directory is not valid JSON: {0}")]
    BadFixture(#[from] serde_json::Error),
    #[error("incorrect username or password")]
    AuthenticationFailure,
    #[error("token encoding failed: {0}")]
    Encode(jsonwebtoken::errors::Error),
    #[error("invalid or expired token")]
    InvalidToken,
}

// ─── Operator directory ────────────────────────────────────────────────────────

/// A single operator record, as seeded from the `operators.json` fixture.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Operator {
    pub username: String,
    pub hashed_password: String,
    pub roles: Vec<String>,
}

/// Read-only operator registry, seeded once from a JSON fixture at startup.
///
/// Unlike the gateway's other stateful components this is not a mutable
/// snapshot store — operator provisioning is out of scope (see Non-goals);
/// the directory is whatever `operators.json` names at process start.
pub struct OperatorDirectory {
    operators: HashMap<String, Operator>,
}

impl OperatorDirectory {
    /// Load the operator fixture from disk.
    pub fn load(fixture_path: &Path) -> Result<Self, CredsError> {
        let content = std::fs::read_to_string(fixture_path)?;
        let list: Vec<Operator> = serde_json::from_str(&content)?;
        let operators = list
            .into_iter()
            .map(|op| (op.username.clone(), op))
            .collect::<HashMap<_, _>>();

        info!(count = operators.len(), "operator directory loaded");
        Ok(Self { operators })
    }

    pub fn get(&self, username: &str) -> Option<&Operator> {
        self.operators.get(username)
    }

    /// Verify a login attempt. Returns the matched operator on success.
    pub fn authenticate(&self, username: &str, password: &str) -> Result<&Operator, CredsError> {
        let operator = self
            .operators
            .get(username)
            .ok_or(CredsError::AuthenticationFailure)?;

        let ok = bcrypt::verify(password, &operator.hashed_password)
            .unwrap_or(false);
        if !ok {
            return Err(CredsError::AuthenticationFailure);
        }
        Ok(operator)
    }
}

/// Hash a plaintext password for a new operator fixture entry.
pub fn hash_password(password: &str) -> Result<String, CredsError> {
    bcrypt::hash(password, bcrypt::DEFAULT_COST).map_err(|_| CredsError::AuthenticationFailure)
}

// ─── Token issuance ─────────────────────────────────────────────────────────────

/// Mints and decodes session and delegation JWTs.
///
/// Both token kinds use HS256 pinned at decode time — a token presenting any
/// other algorithm, including `"none"`, is rejected before its claims are
/// ever inspected.
pub struct CredentialIssuer {
    secret: String,
    server_id: String,
    session_ttl_minutes: i64,
    delegation_ttl_minutes: i64,
}

impl CredentialIssuer {
    pub fn new(
        secret: String,
        server_id: String,
        session_ttl_minutes: i64,
        delegation_ttl_minutes: i64,
    ) -> Self {
        Self {
            secret,
            server_id,
            session_ttl_minutes,
            delegation_ttl_minutes,
        }
    }

    /// Mint a session token for an operator at login.
    pub fn encode_session(&self, username: &str, roles: &[String]) -> Result<String, CredsError> {
        self.encode(username, roles.to_vec(), self.session_ttl_minutes)
    }

    /// Mint a delegation token scoped to one confirmed action/target pair.
    ///
    /// The scope is base64url-encoded (no padding) as `{action}:{target}` and
    /// appended to the roles list rather than carried as a separate claim —
    /// matching the wire shape a delegation token shares with a session token.
    pub fn encode_delegation(
        &self,
        username: &str,
        roles: &[String],
        action: &str,
        target: &str,
    ) -> Result<String, CredsError> {
        let scope_plain = format!("{action}:{target}");
        let scope_b64 = base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(scope_plain);
        let mut roles = roles.to_vec();
        roles.push(format!("{SCOPE_DATA_PREFIX}{scope_b64}"));

        self.encode(username, roles, self.delegation_ttl_minutes)
    }

    fn encode(&self, username: &str, roles: Vec<String>, ttl_minutes: i64) -> Result<String, CredsError> {
        let now = Utc::now().timestamp();
        let claims = Claims {
            sub: username.to_string(),
            roles,
            iat: now,
            exp: now + ttl_minutes * 60,
            auth: self.server_id.clone(),
        };

        encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(self.secret.as_bytes()),
        )
        .map_err(CredsError::Encode)
    }

    /// Decode and validate a bearer token. Rejects non-HS256 tokens, expired
    /// tokens (no leeway), anything that fails signature verification, and
    /// anything whose `auth` claim doesn't match this server's identifier.
    pub fn decode(&self, token: &str) -> Result<Claims, CredsError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.validate_exp = true;

        let claims = decode::<Claims>(
            token,
            &DecodingKey::from_secret(self.secret.as_bytes()),
            &validation,
        )
        .map(|data| data.claims)
        .map_err(|e| {
            warn!(error = %e, "token decode failed");
            CredsError::InvalidToken
        })?;

        if claims.auth != self.server_id {
            warn!(token_auth = %claims.auth, "token auth claim does not match this server");
            return Err(CredsError::InvalidToken);
        }

        Ok(claims)
    }
}

/// Split a `scope_data=<b64>` value's decoded plaintext on the first colon,
/// yielding `(action, target)`.
pub fn split_scope(decoded: &str) -> Option<(&str, &str)> {
    decoded.split_once(':')
}
