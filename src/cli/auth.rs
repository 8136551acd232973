//! `capbroker auth` / `capbroker auth credentials`: socket-client wrappers
//! around the Auth Broker's public operations (spec §4.6), for local
//! scripting and debugging without a full MCP host.

use std::io::Read;
use std::path::Path;

use capbroker::error::{BrokerError, Result};
use serde_json::{json, Value};

use super::client;
use super::CredentialCommands;

const DEFAULT_ACCOUNT: &str = "default";

pub async fn status(socket: &Path) -> Result<Value> {
    client::call(socket, "auth.status", json!({})).await
}

pub async fn providers(socket: &Path) -> Result<Value> {
    client::call(socket, "auth.providers", json!({})).await
}

pub async fn accounts(socket: &Path, provider: Option<String>) -> Result<Value> {
    client::call(socket, "auth.accounts", json!({ "provider": provider })).await
}

pub async fn token(socket: &Path, provider: String, account: Option<String>, scopes: Vec<String>) -> Result<Value> {
    client::call(
        socket,
        "auth.token",
        json!({
            "provider": provider,
            "account": account.unwrap_or_else(|| DEFAULT_ACCOUNT.to_string()),
            "scopes": scopes,
        }),
    )
    .await
}

pub async fn refresh(socket: &Path, provider: String, account: Option<String>) -> Result<Value> {
    client::call(
        socket,
        "auth.refresh",
        json!({ "provider": provider, "account": account.unwrap_or_else(|| DEFAULT_ACCOUNT.to_string()) }),
    )
    .await
}

pub async fn revoke(socket: &Path, provider: String, account: Option<String>, skip_confirm: bool) -> Result<Value> {
    let account = account.unwrap_or_else(|| DEFAULT_ACCOUNT.to_string());
    if !skip_confirm && !confirm_revoke(&provider, &account)? {
        return Ok(json!({ "revoked": false, "reason": "aborted" }));
    }
    client::call(socket, "auth.revoke", json!({ "provider": provider, "account": account })).await
}

/// Interactive confirmation before a destructive operation, styled like
/// `eric8810-authy/src/cli/rekey.rs`'s `dialoguer::Password` prompt — here a
/// `Confirm` instead, since the vault isn't being rekeyed, just one token
/// deleted.
fn confirm_revoke(provider: &str, account: &str) -> Result<bool> {
    dialoguer::Confirm::new()
        .with_prompt(format!("Revoke stored credential for {provider}:{account}?"))
        .default(false)
        .interact()
        .map_err(|e| BrokerError::Other(format!("failed to read confirmation: {e}")))
}

pub async fn credentials(socket: &Path, command: CredentialCommands) -> Result<Value> {
    match command {
        CredentialCommands::Store { label } => {
            let value = read_stdin_secret()?;
            client::call(socket, "credentials.store", json!({ "label": label, "value": value })).await
        }
        CredentialCommands::Get { label } => client::call(socket, "credentials.get", json!({ "label": label })).await,
        CredentialCommands::List => client::call(socket, "credentials.list", json!({})).await,
        CredentialCommands::Delete { label } => {
            client::call(socket, "credentials.delete", json!({ "label": label })).await
        }
        CredentialCommands::Rename { old, new } => {
            client::call(socket, "credentials.rename", json!({ "old": old, "new": new })).await
        }
    }
}

fn read_stdin_secret() -> Result<String> {
    let mut value = String::new();
    std::io::stdin().read_to_string(&mut value)?;
    Ok(value.trim_end_matches('\n').to_string())
}
