//! Background OAuth refresh daemon (spec §4.6).

use std::sync::Arc;
use std::time::Duration;

use chrono::Duration as ChronoDuration;
use tokio::sync::watch;

use super::provider::{self, OAuthClient};
use super::store::AuthStore;
use super::token::TokenRecord;

/// Run forever: sleep, scan the index for records nearing expiry, refresh
/// them under their per-record lock. Refresh failures are logged and do not
/// stop the daemon (spec §7).
pub async fn run(
    store: Arc<AuthStore>,
    client: Arc<OAuthClient>,
    period: Duration,
    refresh_window: ChronoDuration,
    mut shutdown: watch::Receiver<bool>,
) {
    tracing::info!("auth refresh daemon started");
    loop {
        tokio::select! {
            _ = tokio::time::sleep(period) => {
                scan_and_refresh(&store, &client, refresh_window).await;
            }
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    tracing::info!("auth refresh daemon shutting down");
                    break;
                }
            }
        }
    }
}

async fn scan_and_refresh(store: &AuthStore, client: &OAuthClient, window: ChronoDuration) {
    let due = store.due_for_refresh(window).await;
    for (provider_name, account) in due {
        let result = store
            .with_record_lock(&provider_name, &account, |record| {
                let client = client;
                async move {
                    // Re-check expiry after acquiring the lock: a client-initiated
                    // refresh may have already happened (spec §8 Property 8).
                    if !record.is_expired(window) {
                        return Ok((record, false));
                    }
                    let updated = refresh_record(client, record).await?;
                    Ok((updated, true))
                }
            })
            .await;

        match result {
            Ok(true) => tracing::info!(provider = %provider_name, account = %account, "proactively refreshed token"),
            Ok(false) => {}
            Err(e) => tracing::warn!(provider = %provider_name, account = %account, error = %e, "proactive refresh failed"),
        }
    }
}

/// Shared by the daemon and the on-demand `auth.refresh`/`auth.token` paths:
/// call the provider, fold the response into an updated record.
pub async fn refresh_record(
    client: &OAuthClient,
    mut record: TokenRecord,
) -> crate::error::Result<TokenRecord> {
    let refresh_token = record
        .refresh_token
        .clone()
        .ok_or_else(|| crate::error::BrokerError::TokenRefreshFailed("no refresh_token on record".into()))?;
    let resp = client
        .refresh(
            &record.provider,
            &refresh_token,
            record.client_id.as_deref(),
            record.client_secret.as_deref(),
        )
        .await?;

    record.access_token = resp.access_token;
    if let Some(rt) = resp.refresh_token {
        record.refresh_token = Some(rt);
    }
    record.scopes = provider::parse_scope(resp.scope.as_deref(), &record.scopes);
    record.expiry = chrono::Utc::now() + ChronoDuration::seconds(resp.expires_in);
    record.last_refreshed = chrono::Utc::now();
    Ok(record)
}
