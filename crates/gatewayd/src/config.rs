//! Gateway configuration, sourced from the environment at process startup.

use std::path::PathBuf;

use crate::error::{GatewayError, GatewayResult};

/// Process-wide configuration, loaded once from `std::env` before the server
/// binds. Mirrors the reference node agent's `NodeConfig::load`/`Default`
/// pair, but has no peer to hand it a config file the way a fleet node does —
/// this process is the root of its own deployment.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// HMAC secret for session/delegation JWTs. No default: absence is
    /// startup-fatal.
    pub jwt_secret_key: String,
    pub jwt_expiry_minutes: i64,
    pub delegation_expiry_minutes: i64,
    /// Accepted for interface parity with the reference system; this
    /// gateway's operator directory is seeded from `operators.json` rather
    /// than a SQL connection (see `gate-creds::OperatorDirectory`).
    pub database_url: Option<String>,
    /// Value placed in the `auth` claim of every minted token.
    pub server_id: String,
    /// LLM credential, passed through to a live `IntentOracle` when one is
    /// configured; unused by the stub oracle this binary wires by default.
    pub google_gemini_api_key: Option<String>,
    pub key_passphrase: String,
    /// AEAD key for the audit ledger. No default: absence is startup-fatal.
    pub db_encryption_key: String,
    pub bind_addr: String,
    pub state_dir: PathBuf,
}

impl GatewayConfig {
    /// Load configuration from the environment, applying the defaults
    /// documented alongside each field. `JWT_SECRET_KEY` and
    /// `DB_ENCRYPTION_KEY` have no default; their absence returns
    /// `GatewayError::Config` so `main` can abort before binding.
    pub fn from_env() -> GatewayResult<Self> {
        let jwt_secret_key = require_env("JWT_SECRET_KEY")?;
        let db_encryption_key = require_env("DB_ENCRYPTION_KEY")?;

        Ok(Self {
            jwt_secret_key,
            jwt_expiry_minutes: env_parse_or("JWT_EXPIRY_MINUTES", 10)?,
            delegation_expiry_minutes: env_parse_or("DELEGATION_EXPIRY_MINUTES", 2)?,
            database_url: std::env::var("DATABASE_URL").ok(),
            server_id: env_or("SERVER_ID", "trusted_FinLLM_server_1975"),
            google_gemini_api_key: std::env::var("GOOGLE_GEMINI_API_KEY").ok(),
            key_passphrase: std::env::var("KEY_PASSPHRASE").unwrap_or_default(),
            db_encryption_key,
            bind_addr: env_or("GATEWAY_BIND_ADDR", "0.0.0.0:8080"),
            state_dir: PathBuf::from(env_or("GATEWAY_STATE_DIR", "./var")),
        })
    }

    pub fn operators_fixture_path(&self) -> PathBuf {
        self.state_dir.join("operators.json")
    }

    pub fn blocked_keywords_path(&self) -> PathBuf {
        self.state_dir.join("blocked_keywords.json")
    }

    pub fn private_key_path(&self) -> PathBuf {
        self.state_dir.join("keys").join("private_key.pem")
    }

    pub fn public_key_path(&self) -> PathBuf {
        self.state_dir.join("keys").join("public_key.pem")
    }
}

fn require_env(name: &str) -> GatewayResult<String> {
    std::env::var(name).map_err(|_| GatewayError::Config(format!("{name} is required but not set")))
}

fn env_or(name: &str, default: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| default.to_string())
}

fn env_parse_or(name: &str, default: i64) -> GatewayResult<i64> {
    match std::env::var(name) {
        Ok(value) => value
            .parse()
            .map_err(|_| GatewayError::Config(format!("{name} must be an integer, got '{value}'"))),
        Err(_) => Ok(default),
    }
}
