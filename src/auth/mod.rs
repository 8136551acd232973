//! Auth Broker (spec §4.6): encrypted credential storage, token issuance,
//! and proactive OAuth refresh.

mod crypto;
mod daemon;
mod provider;
mod store;
mod token;

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::Duration as ChronoDuration;
use serde::Serialize;
use tokio::sync::watch;

use crate::error::{BrokerError, Result};
use crate::paths;

pub use crypto::MasterKey;
pub use store::AuthStore;
pub use token::{AccountInfo, SecretRecord, TokenRecord};

#[derive(Debug, Serialize)]
pub struct AuthStatus {
    pub initialized: bool,
    pub account_count: usize,
    pub master_key_available: bool,
    /// Whether a keyfile-based override is in effect rather than the
    /// default machine-derived key. Named to match spec §4.6's
    /// `gog_passphrase_set` field.
    pub gog_passphrase_set: bool,
}

#[derive(Debug, Serialize)]
pub struct TokenBody {
    pub access_token: String,
    pub expiry: chrono::DateTime<chrono::Utc>,
    pub scopes: BTreeSet<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_secret: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    pub token_type: String,
}

impl TokenBody {
    fn from_record(record: TokenRecord) -> Self {
        Self {
            access_token: record.access_token,
            expiry: record.expiry,
            scopes: record.scopes,
            client_id: record.client_id,
            client_secret: record.client_secret,
            refresh_token: record.refresh_token,
            token_type: record.token_type,
        }
    }
}

/// Facade the rest of the broker talks to under the `auth` and
/// `credentials` namespaces (spec §4.6 "Public operations").
#[derive(Clone)]
pub struct AuthBroker {
    store: Arc<AuthStore>,
    client: Arc<provider::OAuthClient>,
    expiry_skew: ChronoDuration,
    keyfile_override: bool,
}

impl AuthBroker {
    pub async fn new(
        root: std::path::PathBuf,
        keyfile: Option<&std::path::Path>,
        connect_timeout: Duration,
        request_timeout: Duration,
        expiry_skew_secs: i64,
    ) -> Result<Self> {
        let keyfile_override = keyfile.is_some();
        let key = match keyfile {
            Some(path) => {
                let bytes = std::fs::read(path)?;
                MasterKey::from_keyfile_bytes(&bytes)
            }
            None => MasterKey::derive_machine_key(),
        };
        let store = Arc::new(AuthStore::open(root, key).await?);
        let client = Arc::new(provider::OAuthClient::new(connect_timeout, request_timeout)?);
        Ok(Self {
            store,
            client,
            expiry_skew: ChronoDuration::seconds(expiry_skew_secs),
            keyfile_override,
        })
    }

    /// Spawn the background refresh daemon; returns a handle the caller
    /// stops by dropping the paired `watch::Sender` (see `server.rs`).
    pub fn spawn_refresh_daemon(&self, period: Duration, refresh_window_secs: i64, shutdown: watch::Receiver<bool>) {
        let store = self.store.clone();
        let client = self.client.clone();
        let window = ChronoDuration::seconds(refresh_window_secs);
        tokio::spawn(daemon::run(store, client, period, window, shutdown));
    }

    pub async fn status(&self) -> AuthStatus {
        AuthStatus {
            initialized: self.store.initialized(),
            account_count: self.store.account_count().await,
            master_key_available: true,
            gog_passphrase_set: self.keyfile_override,
        }
    }

    pub fn providers(&self) -> Vec<&'static str> {
        provider::names()
    }

    pub async fn accounts(&self, provider: Option<&str>) -> Result<Vec<AccountInfo>> {
        if let Some(p) = provider {
            if !provider::is_supported(p) {
                return Err(BrokerError::ProviderNotSupported(p.to_string()));
            }
        }
        Ok(self.store.accounts(provider).await)
    }

    /// Return a valid access token, refreshing first if it's within the
    /// expiry skew window (spec §4.6 `token`).
    pub async fn token(
        &self,
        provider_name: &str,
        account: &str,
        required_scopes: Option<&BTreeSet<String>>,
    ) -> Result<TokenBody> {
        if !provider::is_supported(provider_name) {
            return Err(BrokerError::ProviderNotSupported(provider_name.to_string()));
        }
        let store = &self.store;
        let client = &self.client;
        let skew = self.expiry_skew;

        let record = store
            .with_record_lock(provider_name, account, |record| async move {
                if !record.is_expired(skew) {
                    return Ok((record, false));
                }
                let refreshed = daemon::refresh_record(client, record).await?;
                Ok((refreshed, true))
            })
            .await;
        let record = match record {
            Ok(_) => store.load_record(provider_name, account).await?,
            Err(e) => return Err(e),
        };

        if let Some(required) = required_scopes {
            if !record.has_scopes(required) {
                return Err(BrokerError::ScopeInsufficient {
                    has: record.scopes.iter().cloned().collect(),
                    needs: required.iter().cloned().collect(),
                });
            }
        }

        Ok(TokenBody::from_record(record))
    }

    /// Force a refresh regardless of expiry (spec §4.6 `refresh`).
    pub async fn refresh(&self, provider_name: &str, account: &str) -> Result<TokenBody> {
        if !provider::is_supported(provider_name) {
            return Err(BrokerError::ProviderNotSupported(provider_name.to_string()));
        }
        let client = &self.client;
        self.store
            .with_record_lock(provider_name, account, |record| async move {
                let refreshed = daemon::refresh_record(client, record).await?;
                Ok((refreshed.clone(), refreshed))
            })
            .await
            .map(TokenBody::from_record)
    }

    pub async fn revoke(&self, provider_name: &str, account: &str) -> Result<()> {
        self.store.revoke(provider_name, account).await
    }

    pub async fn store_token(&self, record: TokenRecord) -> Result<()> {
        if !provider::is_supported(&record.provider) {
            return Err(BrokerError::ProviderNotSupported(record.provider.clone()));
        }
        if record.expiry <= record.issued_at {
            return Err(BrokerError::Other("expiry must be after issued_at".into()));
        }
        self.store.store_record(&record).await
    }

    // --- generic credential store ---

    pub async fn credential_store(&self, label: &str, value: &str) -> Result<()> {
        self.store.secret_store(label, value).await
    }

    pub async fn credential_get(&self, label: &str) -> Result<SecretRecord> {
        self.store.secret_get(label).await
    }

    pub async fn credential_list(&self) -> Vec<String> {
        self.store.secret_list().await
    }

    pub async fn credential_delete(&self, label: &str) -> Result<()> {
        self.store.secret_delete(label).await
    }

    pub async fn credential_rename(&self, old: &str, new: &str) -> Result<()> {
        self.store.secret_rename(old, new).await
    }
}

pub fn default_keyfile_path(root: &std::path::Path) -> std::path::PathBuf {
    paths::auth_dir(root).join("master.key")
}
