//! Encrypted-at-rest credential store (spec §4.6).
//!
//! Atomic write pattern (write to temp file, rename) is lifted from
//! `eric8810-authy/src/vault/mod.rs::save_vault`. Unlike a single monolithic
//! vault file, each credential gets its own encrypted blob so a concurrent
//! reader of one record is never blocked by a write to another.

use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::{Mutex, RwLock};

use crate::error::{BrokerError, Result};
use crate::paths;

use super::crypto::MasterKey;
use super::token::{AccountInfo, IndexEntry, SecretRecord, TokenRecord};

fn token_filename(provider: &str, account: &str) -> String {
    format!("{provider}-{account}.enc")
}

/// The Auth Broker's credential store: OAuth token records plus a generic
/// secret store, both encrypted under the same master key.
pub struct AuthStore {
    root: PathBuf,
    key: MasterKey,
    index: RwLock<Vec<IndexEntry>>,
    secrets_index: RwLock<BTreeMap<String, String>>,
    /// Per-`(provider, account)` lock preventing a client-initiated refresh
    /// and the background daemon from racing (spec §4.6, §8 Property 8).
    record_locks: RwLock<HashMap<(String, String), Arc<Mutex<()>>>>,
}

impl AuthStore {
    pub async fn open(root: PathBuf, key: MasterKey) -> Result<Self> {
        paths::create_dir_owner_only(&root)?;
        paths::create_dir_owner_only(&paths::auth_tokens_dir(&root))?;
        paths::create_dir_owner_only(&secrets_dir(&root))?;

        let index = load_index(&paths::auth_index_path(&root)).await?;
        let secrets_index = load_secrets_index(&secrets_index_path(&root)).await?;
        Ok(Self {
            root,
            key,
            index: RwLock::new(index),
            secrets_index: RwLock::new(secrets_index),
            record_locks: RwLock::new(HashMap::new()),
        })
    }

    pub fn initialized(&self) -> bool {
        paths::auth_index_path(&self.root).exists()
    }

    async fn lock_for(&self, provider: &str, account: &str) -> Arc<Mutex<()>> {
        let key = (provider.to_string(), account.to_string());
        let mut locks = self.record_locks.write().await;
        locks.entry(key).or_insert_with(|| Arc::new(Mutex::new(()))).clone()
    }

    pub async fn account_count(&self) -> usize {
        self.index.read().await.len()
    }

    pub async fn accounts(&self, provider: Option<&str>) -> Vec<AccountInfo> {
        self.index
            .read()
            .await
            .iter()
            .filter(|e| provider.is_none_or(|p| e.provider == p))
            .map(AccountInfo::from)
            .collect()
    }

    /// Load the raw record for `(provider, account)`, failing with
    /// `TokenNotFound` if no index entry exists.
    pub async fn load_record(&self, provider: &str, account: &str) -> Result<TokenRecord> {
        let file = {
            let index = self.index.read().await;
            index
                .iter()
                .find(|e| e.provider == provider && e.account == account)
                .map(|e| e.file.clone())
                .ok_or_else(|| BrokerError::TokenNotFound {
                    provider: provider.to_string(),
                    account: account.to_string(),
                })?
        };
        let path = paths::auth_tokens_dir(&self.root).join(&file);
        let blob = tokio::fs::read(&path)
            .await
            .map_err(|_| BrokerError::TokenNotFound {
                provider: provider.to_string(),
                account: account.to_string(),
            })?;
        let plaintext = self.key.decrypt(&blob)?;
        serde_json::from_slice(&plaintext)
            .map_err(|e| BrokerError::Internal(format!("corrupt token record: {e}")))
    }

    /// Encrypt and persist `record`, updating the index (spec §4.6 `store`).
    pub async fn store_record(&self, record: &TokenRecord) -> Result<()> {
        let filename = token_filename(&record.provider, &record.account);
        let plaintext = serde_json::to_vec(record)
            .map_err(|e| BrokerError::Internal(format!("serialize token: {e}")))?;
        let blob = self.key.encrypt(&plaintext)?;

        let path = paths::auth_tokens_dir(&self.root).join(&filename);
        atomic_write(&path, &blob).await?;

        let mut index = self.index.write().await;
        index.retain(|e| !(e.provider == record.provider && e.account == record.account));
        index.push(IndexEntry::from_record(record, filename));
        persist_index(&self.root, &index).await
    }

    pub async fn revoke(&self, provider: &str, account: &str) -> Result<()> {
        let mut index = self.index.write().await;
        let before = index.len();
        let removed: Vec<IndexEntry> = index
            .iter()
            .filter(|e| e.provider == provider && e.account == account)
            .cloned()
            .collect();
        index.retain(|e| !(e.provider == provider && e.account == account));
        if index.len() == before {
            return Err(BrokerError::TokenNotFound {
                provider: provider.to_string(),
                account: account.to_string(),
            });
        }
        persist_index(&self.root, &index).await?;
        drop(index);
        for entry in removed {
            let path = paths::auth_tokens_dir(&self.root).join(&entry.file);
            let _ = tokio::fs::remove_file(path).await;
        }
        Ok(())
    }

    /// Acquire the per-record lock, reload the record under it, and run
    /// `f` — used so refresh callers and the daemon never double-refresh.
    pub async fn with_record_lock<F, Fut, T>(
        &self,
        provider: &str,
        account: &str,
        f: F,
    ) -> Result<T>
    where
        F: FnOnce(TokenRecord) -> Fut,
        Fut: std::future::Future<Output = Result<(TokenRecord, T)>>,
    {
        let lock = self.lock_for(provider, account).await;
        let _guard = lock.lock().await;
        let record = self.load_record(provider, account).await?;
        let (updated, out) = f(record).await?;
        self.store_record(&updated).await?;
        Ok(out)
    }

    /// All index entries currently due for proactive refresh (spec §4.6
    /// background daemon: `expiry <= now + 5 minutes`).
    pub async fn due_for_refresh(&self, window: chrono::Duration) -> Vec<(String, String)> {
        let now = Utc::now();
        self.index
            .read()
            .await
            .iter()
            .filter(|e| e.expiry <= now + window)
            .map(|e| e.key())
            .collect()
    }

    // --- generic credential store (`credentials.*`) ---

    pub async fn secret_store(&self, label: &str, value: &str) -> Result<()> {
        let now = Utc::now();
        let record = SecretRecord {
            value: value.to_string(),
            created_at: now,
            updated_at: now,
        };
        self.write_secret(label, &record).await
    }

    async fn write_secret(&self, label: &str, record: &SecretRecord) -> Result<()> {
        let filename = format!("{}.enc", sanitize_label(label));
        let plaintext = serde_json::to_vec(record)
            .map_err(|e| BrokerError::Internal(format!("serialize secret: {e}")))?;
        let blob = self.key.encrypt(&plaintext)?;
        let path = secrets_dir(&self.root).join(&filename);
        atomic_write(&path, &blob).await?;

        let mut index = self.secrets_index.write().await;
        index.insert(label.to_string(), filename);
        persist_secrets_index(&self.root, &index).await
    }

    pub async fn secret_get(&self, label: &str) -> Result<SecretRecord> {
        let filename = {
            let index = self.secrets_index.read().await;
            index
                .get(label)
                .cloned()
                .ok_or_else(|| BrokerError::Other(format!("no credential stored for '{label}'")))?
        };
        let path = secrets_dir(&self.root).join(&filename);
        let blob = tokio::fs::read(&path).await?;
        let plaintext = self.key.decrypt(&blob)?;
        serde_json::from_slice(&plaintext)
            .map_err(|e| BrokerError::Internal(format!("corrupt secret record: {e}")))
    }

    pub async fn secret_list(&self) -> Vec<String> {
        self.secrets_index.read().await.keys().cloned().collect()
    }

    pub async fn secret_delete(&self, label: &str) -> Result<()> {
        let filename = {
            let mut index = self.secrets_index.write().await;
            index
                .remove(label)
                .ok_or_else(|| BrokerError::Other(format!("no credential stored for '{label}'")))?
        };
        persist_secrets_index(&self.root, &self.secrets_index.read().await).await?;
        let path = secrets_dir(&self.root).join(&filename);
        let _ = tokio::fs::remove_file(path).await;
        Ok(())
    }

    /// `rename` is `get + store-under-new-label + delete-old`; a crash
    /// between the two leaves both labels present and self-heals on the
    /// next rename, per spec §4.6's explicitly accepted non-atomicity.
    pub async fn secret_rename(&self, old_label: &str, new_label: &str) -> Result<()> {
        let record = self.secret_get(old_label).await?;
        self.write_secret(new_label, &record).await?;
        self.secret_delete(old_label).await
    }
}

fn sanitize_label(label: &str) -> String {
    label
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect()
}

fn secrets_dir(root: &std::path::Path) -> PathBuf {
    root.join("secrets")
}

fn secrets_index_path(root: &std::path::Path) -> PathBuf {
    root.join("secrets_index.json")
}

async fn load_index(path: &std::path::Path) -> Result<Vec<IndexEntry>> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let content = tokio::fs::read_to_string(path).await?;
    serde_json::from_str(&content)
        .map_err(|e| BrokerError::Internal(format!("corrupt credential index: {e}")))
}

async fn persist_index(root: &std::path::Path, index: &[IndexEntry]) -> Result<()> {
    let content = serde_json::to_vec_pretty(index)
        .map_err(|e| BrokerError::Internal(format!("serialize index: {e}")))?;
    atomic_write(&paths::auth_index_path(root), &content).await
}

async fn load_secrets_index(path: &std::path::Path) -> Result<BTreeMap<String, String>> {
    if !path.exists() {
        return Ok(BTreeMap::new());
    }
    let content = tokio::fs::read_to_string(path).await?;
    serde_json::from_str(&content)
        .map_err(|e| BrokerError::Internal(format!("corrupt secrets index: {e}")))
}

async fn persist_secrets_index(root: &std::path::Path, index: &BTreeMap<String, String>) -> Result<()> {
    let content = serde_json::to_vec_pretty(index)
        .map_err(|e| BrokerError::Internal(format!("serialize secrets index: {e}")))?;
    atomic_write(&secrets_index_path(root), &content).await
}

/// Write-to-temp, then rename, so a crash mid-write never leaves a
/// half-written file in place of a good one.
async fn atomic_write(path: &std::path::Path, content: &[u8]) -> Result<()> {
    let tmp = path.with_extension("tmp");
    tokio::fs::write(&tmp, content).await?;
    tokio::fs::rename(&tmp, path).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    fn sample_record(provider: &str, account: &str, expiry: chrono::DateTime<Utc>) -> TokenRecord {
        let now = Utc::now();
        TokenRecord {
            provider: provider.to_string(),
            account: account.to_string(),
            client_id: None,
            client_secret: None,
            access_token: "at".to_string(),
            refresh_token: Some("rt".to_string()),
            token_type: "Bearer".to_string(),
            expiry,
            scopes: BTreeSet::from(["read".to_string()]),
            issued_at: now,
            last_refreshed: now,
        }
    }

    #[tokio::test]
    async fn store_and_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let key = MasterKey::derive_machine_key();
        let store = AuthStore::open(dir.path().to_path_buf(), key).await.unwrap();
        let record = sample_record("oura", "default", Utc::now() + chrono::Duration::hours(1));
        store.store_record(&record).await.unwrap();
        let loaded = store.load_record("oura", "default").await.unwrap();
        assert_eq!(loaded.access_token, "at");
        assert_eq!(store.account_count().await, 1);
    }

    #[tokio::test]
    async fn revoke_removes_index_and_file() {
        let dir = tempfile::tempdir().unwrap();
        let key = MasterKey::derive_machine_key();
        let store = AuthStore::open(dir.path().to_path_buf(), key).await.unwrap();
        let record = sample_record("oura", "default", Utc::now() + chrono::Duration::hours(1));
        store.store_record(&record).await.unwrap();
        store.revoke("oura", "default").await.unwrap();
        assert!(store.load_record("oura", "default").await.is_err());
    }

    #[tokio::test]
    async fn due_for_refresh_finds_near_expiry_records() {
        let dir = tempfile::tempdir().unwrap();
        let key = MasterKey::derive_machine_key();
        let store = AuthStore::open(dir.path().to_path_buf(), key).await.unwrap();
        store
            .store_record(&sample_record("a", "x", Utc::now() + chrono::Duration::seconds(30)))
            .await
            .unwrap();
        store
            .store_record(&sample_record("b", "x", Utc::now() + chrono::Duration::hours(2)))
            .await
            .unwrap();
        let due = store.due_for_refresh(chrono::Duration::minutes(5)).await;
        assert_eq!(due, vec![("a".to_string(), "x".to_string())]);
    }

    #[tokio::test]
    async fn secret_rename_moves_value() {
        let dir = tempfile::tempdir().unwrap();
        let key = MasterKey::derive_machine_key();
        let store = AuthStore::open(dir.path().to_path_buf(), key).await.unwrap();
        store.secret_store("old", "shh").await.unwrap();
        store.secret_rename("old", "new").await.unwrap();
        assert!(store.secret_get("old").await.is_err());
        assert_eq!(store.secret_get("new").await.unwrap().value, "shh");
    }
}
