//! `TokenRecord` and credential-index entry shapes (spec §3).

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use zeroize::Zeroize;

/// Plaintext credential record. Never hits disk unencrypted; the store
/// encrypts its serialized form before writing and zeroizes the buffer
/// holding the decrypted copy once it goes out of scope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenRecord {
    pub provider: String,
    pub account: String,
    #[serde(default)]
    pub client_id: Option<String>,
    #[serde(default)]
    pub client_secret: Option<String>,
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default = "default_token_type")]
    pub token_type: String,
    pub expiry: DateTime<Utc>,
    #[serde(default)]
    pub scopes: BTreeSet<String>,
    pub issued_at: DateTime<Utc>,
    pub last_refreshed: DateTime<Utc>,
}

fn default_token_type() -> String {
    "Bearer".to_string()
}

impl TokenRecord {
    pub fn is_expired(&self, skew: chrono::Duration) -> bool {
        self.expiry <= Utc::now() + skew
    }

    pub fn has_scopes(&self, required: &BTreeSet<String>) -> bool {
        required.is_subset(&self.scopes)
    }
}

/// Unencrypted metadata kept in `metadata.json`; no secret material.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexEntry {
    pub provider: String,
    pub account: String,
    pub file: String,
    pub scopes: BTreeSet<String>,
    pub expiry: DateTime<Utc>,
    pub last_refreshed: DateTime<Utc>,
}

impl IndexEntry {
    pub fn from_record(record: &TokenRecord, file: String) -> Self {
        Self {
            provider: record.provider.clone(),
            account: record.account.clone(),
            file,
            scopes: record.scopes.clone(),
            expiry: record.expiry,
            last_refreshed: record.last_refreshed,
        }
    }

    pub fn key(&self) -> (String, String) {
        (self.provider.clone(), self.account.clone())
    }
}

/// A single opaque, non-OAuth secret stored under `credentials.*`
/// (spec.md §4.6's generic credential store). Mirrors the zeroize-on-drop
/// shape of `eric8810-authy/src/vault/secret.rs::SecretEntry`.
#[derive(Debug, Clone, Serialize, Deserialize, Zeroize)]
pub struct SecretRecord {
    pub value: String,
    #[zeroize(skip)]
    pub created_at: DateTime<Utc>,
    #[zeroize(skip)]
    pub updated_at: DateTime<Utc>,
}

/// Account info surfaced to callers with no secret material (spec §4.6 `accounts`).
#[derive(Debug, Clone, Serialize)]
pub struct AccountInfo {
    pub provider: String,
    pub account: String,
    pub scopes: BTreeSet<String>,
    pub expiry: DateTime<Utc>,
}

impl From<&IndexEntry> for AccountInfo {
    fn from(e: &IndexEntry) -> Self {
        Self {
            provider: e.provider.clone(),
            account: e.account.clone(),
            scopes: e.scopes.clone(),
            expiry: e.expiry,
        }
    }
}
