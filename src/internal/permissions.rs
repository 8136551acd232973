//! `permissions.*` internal handlers (spec §4.7).

use serde_json::Value;

use crate::context::BrokerContext;
use crate::error::{BrokerError, Result};
use crate::permissions::PermissionName;

pub async fn dispatch(ctx: &BrokerContext, action: &str, params: Value) -> Result<Value> {
    match action {
        "check" => {
            let name = parse_permission(&params)?;
            let record = ctx.permissions.check(name);
            serde_json::to_value(record).map_err(|e| BrokerError::Internal(e.to_string()))
        }
        "list" => {
            let records = ctx.permissions.list();
            serde_json::to_value(records).map_err(|e| BrokerError::Internal(e.to_string()))
        }
        "request" => {
            let name = parse_permission(&params)?;
            let status = ctx.permissions.request(name);
            Ok(serde_json::json!({ "permission": name.as_str(), "status": status.as_str() }))
        }
        "open_settings" => {
            let pane = params
                .get("pane")
                .and_then(Value::as_str)
                .ok_or_else(|| BrokerError::InvalidParams("missing required field 'pane'".into()))?;
            ctx.permissions.open_settings(pane);
            Ok(serde_json::json!({ "opened": true }))
        }
        _ => Err(BrokerError::MethodNotFound(format!("Method not found: permissions.{action}"))),
    }
}

fn parse_permission(params: &Value) -> Result<PermissionName> {
    let name = params
        .get("permission")
        .and_then(Value::as_str)
        .ok_or_else(|| BrokerError::InvalidParams("missing required field 'permission'".into()))?;
    PermissionName::parse(name).ok_or_else(|| BrokerError::InvalidParams(format!("unknown permission: {name}")))
}
