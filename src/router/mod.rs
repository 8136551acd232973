//! Capability Router (spec §4.4): manifest lookup, credential loading, and
//! three-way dispatch (Internal / Proxy / Script). The three-way dispatch
//! enum is matched the way `eric8810-authy`'s `VaultKey` enum
//! (`Passphrase`/`Keyfile`) is matched in `vault::load_vault`/`save_vault`.

pub mod interpolate;
pub mod proxy;
mod script;

use std::collections::BTreeSet;

use serde_json::Value;

use crate::context::BrokerContext;
use crate::error::{BrokerError, Result};
use crate::internal;
use crate::manifest::{Implementation, Manifest, Requirements, Tool};
use crate::permissions::{PermissionName, PermissionStatus};
use interpolate::CredentialMap;

/// Route `method` through the manifest-driven dispatch pipeline (spec §4.4).
/// A manifest miss surfaces as `BrokerError::MethodNotFound` — the caller
/// (`registry.rs`) catches that specific variant to fall back to the legacy
/// namespace dispatcher, per spec §4.3 step 2.
pub async fn dispatch(ctx: &BrokerContext, method: &str, params: Value) -> Result<Value> {
    let (manifest, tool) = ctx
        .manifests
        .find_tool(method)
        .await
        .ok_or_else(|| BrokerError::MethodNotFound(format!("Method not found: {method}")))?;

    check_permissions(ctx, &manifest, &tool)?;
    let credentials = load_credentials(ctx, &manifest, &tool, &params).await?;

    match &manifest.implementation {
        Implementation::Internal { methods, .. } => {
            let dotted = methods
                .get(&tool.name)
                .ok_or_else(|| BrokerError::Internal(format!("tool '{}' has no internal binding", tool.name)))?;
            let (namespace, action) = internal::split_method(dotted)?;
            internal::dispatch(ctx, namespace, action, params).await
        }
        Implementation::Proxy { base_url, auth, tool_bindings } => {
            let binding = tool_bindings.get(&tool.name).ok_or_else(|| {
                BrokerError::Internal(format!("tool '{}' has no proxy binding", tool.name))
            })?;
            let max_results = params.get("max_results").and_then(Value::as_u64);
            ctx.proxy
                .dispatch(base_url, auth, binding, &params, &credentials, max_results)
                .await
        }
        Implementation::Script { runtime, entrypoint, args, env, tool_bindings } => {
            let binding = tool_bindings.get(&tool.name).ok_or_else(|| {
                BrokerError::Internal(format!("tool '{}' has no script binding", tool.name))
            })?;
            script::dispatch(
                ctx,
                *runtime,
                entrypoint,
                args,
                env,
                binding,
                &params,
                &credentials,
            )
            .await
        }
    }
}

fn merged_requirements<'a>(manifest: &'a Manifest, tool: &'a Tool) -> (Vec<&'a crate::manifest::PermissionRequirement>, Vec<&'a crate::manifest::CredentialRequirement>) {
    let mut permissions: Vec<&crate::manifest::PermissionRequirement> =
        manifest.requires.permissions.iter().collect();
    let mut credentials: Vec<&crate::manifest::CredentialRequirement> =
        manifest.requires.credentials.iter().collect();
    if let Some(Requirements { permissions: tp, credentials: tc }) = &tool.requires {
        permissions.extend(tp.iter());
        credentials.extend(tc.iter());
    }
    (permissions, credentials)
}

/// Required permissions = manifest-level ∪ tool-level (spec §4.4 step 2).
fn check_permissions(ctx: &BrokerContext, manifest: &Manifest, tool: &Tool) -> Result<()> {
    let (permissions, _) = merged_requirements(manifest, tool);
    for req in permissions {
        let Some(name) = PermissionName::parse(&req.name) else {
            if req.optional {
                continue;
            }
            return Err(BrokerError::Internal(format!("unknown permission '{}'", req.name)));
        };
        let record = ctx.permissions.check(name);
        if record.status != PermissionStatus::Granted.as_str() {
            if req.optional {
                continue;
            }
            return Err(BrokerError::PermissionDenied {
                permission: name.as_str().to_string(),
                status: record.status.to_string(),
                remediation: record.description,
            });
        }
    }
    Ok(())
}

/// Required credentials = manifest-level ∪ tool-level, loaded in declaration
/// order through the Auth Broker's `get_token` (`token`) API, which detects
/// expiry and refreshes before returning — the router never inspects token
/// lifetimes itself (spec §4.4 "Token refresh interaction").
async fn load_credentials(
    ctx: &BrokerContext,
    manifest: &Manifest,
    tool: &Tool,
    params: &Value,
) -> Result<CredentialMap> {
    let (_, credentials) = merged_requirements(manifest, tool);
    let mut out = CredentialMap::new();
    for req in credentials {
        let account = params
            .get("account")
            .and_then(Value::as_str)
            .unwrap_or(req.default_account.as_str());
        let scopes: Option<BTreeSet<String>> = if req.scopes.is_empty() {
            None
        } else {
            Some(req.scopes.iter().cloned().collect())
        };

        let result = ctx.auth.token(&req.provider, account, scopes.as_ref()).await;
        match result {
            Ok(body) => {
                let mut fields = std::collections::BTreeMap::new();
                fields.insert("access_token".to_string(), body.access_token);
                fields.insert("token_type".to_string(), body.token_type);
                if let Some(client_id) = &body.client_id {
                    fields.insert("client_id".to_string(), client_id.clone());
                }
                if let Some(client_secret) = &body.client_secret {
                    fields.insert("client_secret".to_string(), client_secret.clone());
                    // `ProxyAuthStrategy::Basic` looks up a fixed "password"
                    // field; client_secret is the closest analogue for an
                    // OAuth-backed credential used with Basic auth.
                    fields.insert("password".to_string(), client_secret.clone());
                }
                if let Some(refresh_token) = &body.refresh_token {
                    fields.insert("refresh_token".to_string(), refresh_token.clone());
                }
                out.insert(req.id.clone(), fields);
            }
            Err(BrokerError::TokenNotFound { .. }) if req.optional => {}
            Err(e) => return Err(e),
        }
    }
    Ok(out)
}
