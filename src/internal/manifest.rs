//! `manifest.*` internal handlers: read-only registry introspection plus an
//! on-demand reload trigger, exposed for local scripting/debugging — the
//! same operations the hot-reload watcher triggers automatically.

use serde_json::Value;

use crate::context::BrokerContext;
use crate::error::{BrokerError, Result};

pub async fn dispatch(ctx: &BrokerContext, action: &str, _params: Value) -> Result<Value> {
    match action {
        "list" => {
            let tools = ctx.manifests.list_mcp_exposed().await;
            serde_json::to_value(tools).map_err(|e| BrokerError::Internal(e.to_string()))
        }
        "reload" => {
            ctx.manifests
                .reload()
                .await
                .map_err(|e| BrokerError::Internal(format!("manifest reload failed: {e}")))?;
            Ok(serde_json::json!({ "reloaded": true, "manifest_count": ctx.manifests.manifest_count().await }))
        }
        _ => Err(BrokerError::MethodNotFound(format!("Method not found: manifest.{action}"))),
    }
}
