//! Handler Registry (spec §4.3): the permission gate and the entry point the
//! socket server hands every parsed request to. The remediation-string
//! lookup itself lives in `permissions.rs`; this module only decides
//! *whether* a method needs the gate at all.

use serde_json::Value;

use crate::context::BrokerContext;
use crate::error::{BrokerError, Result};
use crate::internal;
use crate::permissions::{PermissionName, PermissionStatus};
use crate::router;

/// Dispatch one already-validated request: permission gate, then Capability
/// Router, falling back to the legacy namespace dispatcher on a router miss
/// (spec §4.3 steps 1-3).
pub async fn dispatch(ctx: &BrokerContext, method: &str, params: Value) -> Result<Value> {
    gate_permission(ctx, method)?;

    match router::dispatch(ctx, method, params.clone()).await {
        Err(BrokerError::MethodNotFound(_)) => legacy_dispatch(ctx, method, params).await,
        other => other,
    }
}

/// Methods under `auth`, `permissions`, `config`, `server`, and `manifest`
/// never require an OS permission (spec §4.3); every other namespace is
/// gated only if it appears in the configured namespace→permission map —
/// which by construction holds only OS-resource namespaces, never the
/// namespaces a manifest binds to a Proxy or Script implementation (those
/// are gated by credentials, not TCC, per the same paragraph).
fn gate_permission(ctx: &BrokerContext, method: &str) -> Result<()> {
    let Ok((namespace, _)) = internal::split_method(method) else {
        return Ok(());
    };
    if internal::is_exempt_from_permission_gate(namespace) {
        return Ok(());
    }
    let Some(permission_str) = ctx.config.permission_namespaces.get(namespace) else {
        return Ok(());
    };
    let Some(permission) = PermissionName::parse(permission_str) else {
        return Ok(());
    };

    let record = ctx.permissions.check(permission);
    if record.status != PermissionStatus::Granted.as_str() {
        return Err(BrokerError::PermissionDenied {
            permission: permission.as_str().to_string(),
            status: record.status.to_string(),
            remediation: record.description,
        });
    }
    Ok(())
}

/// Legacy namespace fallback (spec §4.3 step 2 "miss"): a fixed match on
/// `namespace` to a named internal handler module, dispatching `action`
/// there directly with no manifest involved at all. Modeled as a closed,
/// compile-time-exhaustive enum per spec §9 "Dynamic handler dispatch".
async fn legacy_dispatch(ctx: &BrokerContext, method: &str, params: Value) -> Result<Value> {
    let (namespace, action) = internal::split_method(method)?;
    internal::dispatch(ctx, namespace, action, params).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::AuthBroker;
    use crate::config::Config;
    use crate::manifest::ManifestRegistry;
    use crate::permissions::PermissionsFacade;
    use crate::router::proxy::ProxyDispatcher;

    async fn test_ctx() -> (BrokerContext, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let auth = AuthBroker::new(
            dir.path().join("auth"),
            None,
            std::time::Duration::from_secs(10),
            std::time::Duration::from_secs(30),
            60,
        )
        .await
        .unwrap();
        let manifests = ManifestRegistry::load(dir.path().join("manifests")).await.unwrap();
        let permissions = PermissionsFacade::default();
        let proxy = ProxyDispatcher::new(std::time::Duration::from_secs(10), std::time::Duration::from_secs(30)).unwrap();
        let ctx = BrokerContext::new(auth, manifests, permissions, proxy, Config::default());
        (ctx, dir)
    }

    #[tokio::test]
    async fn server_status_dispatches_without_permission_gate() {
        let (ctx, _dir) = test_ctx().await;
        let result = dispatch(&ctx, "server.status", serde_json::json!({})).await.unwrap();
        assert_eq!(result["status"], "running");
    }

    #[tokio::test]
    async fn unknown_method_yields_method_not_found() {
        let (ctx, _dir) = test_ctx().await;
        let err = dispatch(&ctx, "nope.whatever", serde_json::json!({})).await.unwrap_err();
        assert_eq!(err.rpc_code(), -32601);
    }

    #[tokio::test]
    async fn contacts_namespace_is_gated_and_not_determined_denies() {
        let (ctx, _dir) = test_ctx().await;
        let err = dispatch(&ctx, "contacts.list", serde_json::json!({})).await.unwrap_err();
        assert_eq!(err.rpc_code(), -32001);
    }
}
