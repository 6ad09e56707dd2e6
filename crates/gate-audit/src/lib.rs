//! Append-only, AEAD-encrypted audit ledger.
//!
//! Every gateway decision — blocked, failed, or successful — is written here
//! before the response leaves the process. Rows are never updated or deleted;
//! the ledger's id is monotonic and its payload is always encrypted at rest.

#![forbid(unsafe_code)]

use base64::Engine;
use chrono::Utc;
use gate_persist::JsonStore;
use openssl::rand::rand_bytes;
use openssl::symm::{Cipher, Crypter, Mode};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use thiserror::Error;
use tracing::{info, warn};

const NONCE_LEN: usize = 12;
const TAG_LEN: usize = 16;

#[derive(Debug, Error)]
pub enum AuditError {
    #[error("DB_ENCRYPTION_KEY must decode to 32 bytes, got {0}")]
    BadKeyLength(usize),
    #[error("DB_ENCRYPTION_KEY is not valid base64: {0}")]
    BadKeyEncoding(#[from] base64::DecodeError),
    #[error("encryption failure: {0}")]
    Crypto(#[from] openssl::error::ErrorStack),
}

/// The four outcomes the secured execution pipeline ever logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    QueryBlocked,
    QuerySuccess,
    OutputBlocked,
    SecurityFail,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::QueryBlocked => "query_blocked",
            EventType::QuerySuccess => "query_success",
            EventType::OutputBlocked => "output_blocked",
            EventType::SecurityFail => "security_fail",
        }
    }
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A single ledger row as stored on disk — payload stays ciphertext here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditRow {
    pub id: u64,
    pub timestamp: String,
    pub event_type: String,
    /// base64 of nonce || ciphertext || tag.
    pub payload: String,
}

/// A decrypted ledger row, as returned by `get`/`recent`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    pub id: u64,
    pub timestamp: String,
    pub event_type: String,
    pub payload: serde_json::Value,
}

/// Append-only audit ledger, AEAD-encrypted at rest.
///
/// Backed by the gateway's JSON-snapshot persistence layer rather than a SQL
/// engine — the whole row map is loaded at startup and rewritten on append,
/// matching every other stateful component in the gateway.
pub struct AuditLogger {
    rows: HashMap<String, AuditRow>,
    store: JsonStore,
    next_id: u64,
    key: [u8; 32],
}

impl AuditLogger {
    /// Load (or create) the ledger from disk. `encryption_key` is the raw
    /// `DB_ENCRYPTION_KEY` value, urlsafe-base64 encoding 32 key bytes.
    pub fn new(state_path: &Path, encryption_key: &str) -> Result<Self, AuditError> {
        let key_bytes = base64::engine::general_purpose::URL_SAFE.decode(encryption_key)?;
        if key_bytes.len() != 32 {
            return Err(AuditError::BadKeyLength(key_bytes.len()));
        }
        let mut key = [0u8; 32];
        key.copy_from_slice(&key_bytes);

        let store = JsonStore::new(state_path, "acl");
        let rows: HashMap<String, AuditRow> = store.load();
        let next_id = rows.values().map(|r| r.id).max().map(|m| m + 1).unwrap_or(1);

        info!(row_count = rows.len(), next_id, "audit ledger initialized");
        Ok(Self {
            rows,
            store,
            next_id,
            key,
        })
    }

    /// Append a new event. Serialization failures fall back to a `__repr__`
    /// envelope rather than failing the call — this never returns an error
    /// for a serializable-but-odd payload, only for I/O/crypto failure.
    pub fn log(
        &mut self,
        event_type: EventType,
        payload: &serde_json::Value,
    ) -> Result<u64, AuditError> {
        let payload_json = serde_json::to_string(payload).unwrap_or_else(|_| {
            serde_json::json!({ "__repr__": format!("{payload:?}") }).to_string()
        });

        let encrypted = self.encrypt(payload_json.as_bytes())?;
        let id = self.next_id;
        let timestamp = Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true);

        let row = AuditRow {
            id,
            timestamp,
            event_type: event_type.as_str().to_string(),
            payload: encrypted,
        };

        info!(id, event_type = %event_type, "audit row appended");

        self.rows.insert(id.to_string(), row);
        self.next_id += 1;
        self.snapshot();

        Ok(id)
    }

    /// Fetch and decrypt a single row by id.
    pub fn get(&self, id: u64) -> Option<AuditEvent> {
        self.rows.get(&id.to_string()).map(|row| self.decrypt_row(row))
    }

    /// The most recent `limit` events, newest first.
    pub fn recent(&self, limit: usize) -> Vec<AuditEvent> {
        let mut rows: Vec<&AuditRow> = self.rows.values().collect();
        rows.sort_by_key(|r| std::cmp::Reverse(r.id));
        rows.truncate(limit);
        rows.into_iter().map(|r| self.decrypt_row(r)).collect()
    }

    fn decrypt_row(&self, row: &AuditRow) -> AuditEvent {
        let payload = self
            .try_decrypt(&row.payload)
            .and_then(|plaintext| serde_json::from_slice(&plaintext).ok())
            .unwrap_or_else(|| serde_json::json!({ "raw": row.payload }));

        AuditEvent {
            id: row.id,
            timestamp: row.timestamp.clone(),
            event_type: row.event_type.clone(),
            payload,
        }
    }

    fn encrypt(&self, plaintext: &[u8]) -> Result<String, AuditError> {
        let mut nonce = [0u8; NONCE_LEN];
        rand_bytes(&mut nonce)?;

        let cipher = Cipher::aes_256_gcm();
        let mut crypter = Crypter::new(cipher, Mode::Encrypt, &self.key, Some(&nonce))?;
        let mut ciphertext = vec![0u8; plaintext.len() + cipher.block_size()];
        let mut count = crypter.update(plaintext, &mut ciphertext)?;
        count += crypter.finalize(&mut ciphertext[count..])?;
        ciphertext.truncate(count);

        let mut tag = [0u8; TAG_LEN];
        crypter.get_tag(&mut tag)?;

        let mut blob = Vec::with_capacity(NONCE_LEN + ciphertext.len() + TAG_LEN);
        blob.extend_from_slice(&nonce);
        blob.extend_from_slice(&ciphertext);
        blob.extend_from_slice(&tag);
        Ok(base64::engine::general_purpose::STANDARD.encode(blob))
    }

    fn try_decrypt(&self, encoded: &str) -> Option<Vec<u8>> {
        let blob = base64::engine::general_purpose::STANDARD
            .decode(encoded)
            .ok()?;
        if blob.len() < NONCE_LEN + TAG_LEN {
            return None;
        }
        let (nonce, rest) = blob.split_at(NONCE_LEN);
        let (ciphertext, tag) = rest.split_at(rest.len() - TAG_LEN);

        let cipher = Cipher::aes_256_gcm();
        let mut crypter = Crypter::new(cipher, Mode::Decrypt, &self.key, Some(nonce)).ok()?;
        crypter.set_tag(tag).ok()?;
        let mut plaintext = vec![0u8; ciphertext.len() + cipher.block_size()];
        let mut count = crypter.update(ciphertext, &mut plaintext).ok()?;
        count += crypter.finalize(&mut plaintext[count..]).ok()?;
        plaintext.truncate(count);
        Some(plaintext)
    }

    fn snapshot(&self) {
        if let Err(e) = self.store.save(&self.rows) {
            warn!(error = %e, "failed to snapshot audit ledger");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_key() -> String {
        base64::engine::general_purpose::URL_SAFE.encode([7u8; 32])
    }

    #[test]
    fn test_log_and_get_roundtrip() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut logger = AuditLogger::new(dir.path(), &test_key()).expect("new");

        let id = logger
            .log(
                EventType::QuerySuccess,
                &serde_json::json!({"username": "teller1"}),
            )
            .expect("log");

        let event = logger.get(id).expect("get");
        assert_eq!(event.event_type, "query_success");
        assert_eq!(event.payload["username"], "teller1");
    }

    #[test]
    fn test_recent_orders_newest_first() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut logger = AuditLogger::new(dir.path(), &test_key()).expect("new");

        for i in 0..3 {
            logger
                .log(EventType::QueryBlocked, &serde_json::json!({"seq": i}))
                .expect("log");
        }

        let recent = logger.recent(2);
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].payload["seq"], 2);
        assert_eq!(recent[1].payload["seq"], 1);
    }

    #[test]
    fn test_next_id_recovered_on_restart() {
        let dir = tempfile::tempdir().expect("tempdir");
        let key = test_key();
        {
            let mut logger = AuditLogger::new(dir.path(), &key).expect("new");
            logger
                .log(EventType::SecurityFail, &serde_json::json!({}))
                .expect("log");
        }

        let mut logger2 = AuditLogger::new(dir.path(), &key).expect("reload");
        let id = logger2
            .log(EventType::SecurityFail, &serde_json::json!({}))
            .expect("log");
        assert_eq!(id, 2);
    }

    #[test]
    fn test_bad_key_length_rejected() {
        let dir = tempfile::tempdir().expect("tempdir");
        let short_key = base64::engine::general_purpose::URL_SAFE.encode([1u8; 16]);
        assert!(AuditLogger::new(dir.path(), &short_key).is_err());
    }

    #[test]
    fn test_tampered_payload_surfaces_raw_fallback() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut logger = AuditLogger::new(dir.path(), &test_key()).expect("new");
        let id = logger
            .log(EventType::QuerySuccess, &serde_json::json!({"a": 1}))
            .expect("log");

        let row = logger.rows.get_mut(&id.to_string()).expect("row");
        row.payload = "not even base64 ciphertext".to_string();

        let event = logger.get(id).expect("get");
        assert!(event.payload.get("raw").is_some());
    }
}
