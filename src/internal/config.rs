//! `config.*` internal handlers: read-only introspection of the effective
//! broker-wide configuration (spec §4.3 lists `config` among the namespaces
//! that never require an OS permission).

use serde_json::Value;

use crate::context::BrokerContext;
use crate::error::{BrokerError, Result};

pub async fn dispatch(ctx: &BrokerContext, action: &str, _params: Value) -> Result<Value> {
    match action {
        "get" => serde_json::to_value(ctx.config.as_ref()).map_err(|e| BrokerError::Internal(e.to_string())),
        _ => Err(BrokerError::MethodNotFound(format!("Method not found: config.{action}"))),
    }
}
