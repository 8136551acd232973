//! `auth.*` / `credentials.*` internal handlers (spec §4.6 "Public operations").

use std::collections::BTreeSet;

use serde_json::Value;

use crate::context::BrokerContext;
use crate::error::{BrokerError, Result};

fn get_str<'a>(params: &'a Value, field: &str) -> Result<&'a str> {
    params
        .get(field)
        .and_then(Value::as_str)
        .ok_or_else(|| BrokerError::InvalidParams(format!("missing required field '{field}'")))
}

pub async fn dispatch(ctx: &BrokerContext, action: &str, params: Value) -> Result<Value> {
    match action {
        "status" => {
            let status = ctx.auth.status().await;
            serde_json::to_value(status).map_err(|e| BrokerError::Internal(e.to_string()))
        }
        "providers" => Ok(serde_json::json!(ctx.auth.providers())),
        "accounts" => {
            let provider = params.get("provider").and_then(Value::as_str);
            let accounts = ctx.auth.accounts(provider).await?;
            serde_json::to_value(accounts).map_err(|e| BrokerError::Internal(e.to_string()))
        }
        "token" => {
            let provider = get_str(&params, "provider")?;
            let account = params.get("account").and_then(Value::as_str).unwrap_or("default");
            let scopes: Option<BTreeSet<String>> = params
                .get("scopes")
                .and_then(Value::as_array)
                .map(|a| a.iter().filter_map(|v| v.as_str().map(str::to_string)).collect());
            let body = ctx.auth.token(provider, account, scopes.as_ref()).await?;
            serde_json::to_value(body).map_err(|e| BrokerError::Internal(e.to_string()))
        }
        "refresh" => {
            let provider = get_str(&params, "provider")?;
            let account = params.get("account").and_then(Value::as_str).unwrap_or("default");
            let body = ctx.auth.refresh(provider, account).await?;
            serde_json::to_value(body).map_err(|e| BrokerError::Internal(e.to_string()))
        }
        "revoke" => {
            let provider = get_str(&params, "provider")?;
            let account = params.get("account").and_then(Value::as_str).unwrap_or("default");
            ctx.auth.revoke(provider, account).await?;
            Ok(serde_json::json!({ "revoked": true }))
        }
        "store" => {
            let record: crate::auth::TokenRecord = serde_json::from_value(
                params
                    .get("token_data")
                    .cloned()
                    .ok_or_else(|| BrokerError::InvalidParams("missing field 'token_data'".into()))?,
            )
            .map_err(|e| BrokerError::InvalidParams(format!("invalid token_data: {e}")))?;
            ctx.auth.store_token(record).await?;
            Ok(serde_json::json!({ "stored": true }))
        }
        _ => Err(BrokerError::MethodNotFound(format!("Method not found: auth.{action}"))),
    }
}

pub async fn dispatch_credentials(ctx: &BrokerContext, action: &str, params: Value) -> Result<Value> {
    match action {
        "store" => {
            let label = get_str(&params, "label")?;
            let value = get_str(&params, "value")?;
            ctx.auth.credential_store(label, value).await?;
            Ok(serde_json::json!({ "stored": true }))
        }
        "get" => {
            let label = get_str(&params, "label")?;
            let record = ctx.auth.credential_get(label).await?;
            serde_json::to_value(record).map_err(|e| BrokerError::Internal(e.to_string()))
        }
        "list" => Ok(serde_json::json!(ctx.auth.credential_list().await)),
        "delete" => {
            let label = get_str(&params, "label")?;
            ctx.auth.credential_delete(label).await?;
            Ok(serde_json::json!({ "deleted": true }))
        }
        "rename" => {
            let old = get_str(&params, "old")?;
            let new = get_str(&params, "new")?;
            ctx.auth.credential_rename(old, new).await?;
            Ok(serde_json::json!({ "renamed": true }))
        }
        _ => Err(BrokerError::MethodNotFound(format!("Method not found: credentials.{action}"))),
    }
}
