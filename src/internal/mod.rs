//! Internal handler namespaces (spec §4.4 "Internal"): the fixed, compile-time
//! set of in-process modules a manifest's `Internal` implementation — or the
//! Handler Registry's legacy namespace fallback (spec §4.3) — can dispatch
//! into. Styled after `eric8810-authy/src/error.rs`'s exhaustive match-based
//! helpers.

mod auth;
mod config;
mod manifest;
mod permissions;
mod server;

use serde_json::Value;

use crate::context::BrokerContext;
use crate::error::{BrokerError, Result};

/// The fixed enumeration of internal namespaces this build understands
/// (spec §4.4 "The set of valid internal namespaces is fixed at build
/// time"). A manifest referencing any other module name fails to resolve
/// at dispatch time, not at load time (load-time validation only checks
/// that every declared tool has a binding, not that the module exists).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Namespace {
    Server,
    Auth,
    Credentials,
    Permissions,
    Manifest,
    Config,
    Log,
}

impl Namespace {
    pub fn parse(name: &str) -> Option<Self> {
        Some(match name {
            "server" => Namespace::Server,
            "auth" => Namespace::Auth,
            "credentials" => Namespace::Credentials,
            "permissions" => Namespace::Permissions,
            "manifest" => Namespace::Manifest,
            "config" => Namespace::Config,
            "log" => Namespace::Log,
            _ => return None,
        })
    }
}

/// Split a dotted method name into `(namespace, action)`. Used both by the
/// legacy namespace fallback and by Internal dispatch after translating a
/// tool name through `methods[toolName]` (spec §4.4).
pub fn split_method(method: &str) -> Result<(&str, &str)> {
    method
        .split_once('.')
        .filter(|(ns, action)| !ns.is_empty() && !action.is_empty())
        .ok_or_else(|| BrokerError::MethodNotFound(format!("Method not found: {method}")))
}

/// Dispatch `(namespace, action)` to the matching internal handler module.
/// Exhaustive match over [`Namespace`] — adding a namespace here is the only
/// way to extend the set of internal handlers (spec §4.4, §9 "Dynamic
/// handler dispatch").
pub async fn dispatch(ctx: &BrokerContext, namespace: &str, action: &str, params: Value) -> Result<Value> {
    let ns = Namespace::parse(namespace)
        .ok_or_else(|| BrokerError::MethodNotFound(format!("Method not found: {namespace}.{action}")))?;
    match ns {
        Namespace::Server => server::dispatch(ctx, action, params).await,
        Namespace::Auth => auth::dispatch(ctx, action, params).await,
        Namespace::Credentials => auth::dispatch_credentials(ctx, action, params).await,
        Namespace::Permissions => permissions::dispatch(ctx, action, params).await,
        Namespace::Manifest => manifest::dispatch(ctx, action, params).await,
        Namespace::Config => config::dispatch(ctx, action, params).await,
        Namespace::Log => Ok(serde_json::json!({ "logged": true })),
    }
}

/// Namespaces that never require an OS permission gate (spec §4.3): the
/// built-in internal namespaces, plus — per the same rule — any method the
/// Capability Router resolves to a Proxy or Script implementation (handled
/// separately in `registry.rs`, since those aren't internal namespaces at
/// all).
pub fn is_exempt_from_permission_gate(namespace: &str) -> bool {
    matches!(namespace, "auth" | "credentials" | "permissions" | "config" | "server" | "manifest")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_method_rejects_missing_dot() {
        assert!(split_method("nodot").is_err());
    }

    #[test]
    fn split_method_splits_on_first_dot() {
        assert_eq!(split_method("a.b.c").unwrap(), ("a", "b.c"));
    }

    #[test]
    fn exempt_namespaces_match_spec() {
        assert!(is_exempt_from_permission_gate("auth"));
        assert!(is_exempt_from_permission_gate("permissions"));
        assert!(is_exempt_from_permission_gate("config"));
        assert!(is_exempt_from_permission_gate("server"));
        assert!(!is_exempt_from_permission_gate("contacts"));
    }
}
