//! `server.*` internal handlers: broker self-status and the rolling
//! activity buffer (spec §8 Scenario S1).

use serde_json::Value;

use crate::context::{BrokerContext, VERSION};
use crate::error::{BrokerError, Result};

pub async fn dispatch(ctx: &BrokerContext, action: &str, params: Value) -> Result<Value> {
    match action {
        "status" => status(ctx),
        "activity" => activity(ctx, params),
        _ => Err(BrokerError::MethodNotFound(format!("Method not found: server.{action}"))),
    }
}

fn status(ctx: &BrokerContext) -> Result<Value> {
    Ok(serde_json::json!({
        "status": "running",
        "version": VERSION,
        "uptime_secs": ctx.uptime_secs(),
    }))
}

fn activity(ctx: &BrokerContext, params: Value) -> Result<Value> {
    let limit = params
        .get("limit")
        .and_then(Value::as_u64)
        .unwrap_or(50) as usize;
    let entries = ctx.activity.recent(limit);
    serde_json::to_value(entries).map_err(|e| BrokerError::Internal(format!("serialize activity: {e}")))
}
