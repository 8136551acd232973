//! Integration tests for JSON-RPC parsing and dispatch error codes, driven
//! entirely through the public library surface (`capbroker::protocol`,
//! `capbroker::registry`) rather than the private per-connection framing in
//! `src/socket/connection.rs`. Complements the unit tests embedded there.

use std::time::Duration;

use capbroker::auth::AuthBroker;
use capbroker::config::Config;
use capbroker::context::BrokerContext;
use capbroker::manifest::ManifestRegistry;
use capbroker::permissions::PermissionsFacade;
use capbroker::protocol::{Incoming, Response};
use capbroker::router::proxy::ProxyDispatcher;
use serde_json::json;
use tempfile::TempDir;

async fn test_ctx() -> (BrokerContext, TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let auth = AuthBroker::new(
        dir.path().join("auth"),
        None,
        Duration::from_secs(10),
        Duration::from_secs(30),
        60,
    )
    .await
    .unwrap();
    let manifests = ManifestRegistry::load(dir.path().join("manifests")).await.unwrap();
    let permissions = PermissionsFacade::default();
    let proxy = ProxyDispatcher::new(Duration::from_secs(10), Duration::from_secs(30)).unwrap();
    let ctx = BrokerContext::new(auth, manifests, permissions, proxy, Config::default());
    (ctx, dir)
}

#[test]
fn parse_line_rejects_malformed_json() {
    let err = capbroker::protocol::parse_line("{not json").unwrap_err();
    let resp = Response::parse_error(format!("Parse error: {err}"));
    assert_eq!(resp.id, json!(null));
}

#[test]
fn parse_line_accepts_batch_of_mixed_requests_and_notifications() {
    let line = r#"[{"jsonrpc":"2.0","id":1,"method":"server.status"},{"jsonrpc":"2.0","method":"log.note"}]"#;
    let Incoming::Batch(reqs) = capbroker::protocol::parse_line(line).unwrap() else {
        panic!("expected a batch");
    };
    assert_eq!(reqs.len(), 2);
    assert!(!reqs[0].is_notification());
    assert!(reqs[1].is_notification());
}

#[tokio::test]
async fn dispatch_server_status_reports_running() {
    let (ctx, _dir) = test_ctx().await;
    let result = capbroker::registry::dispatch(&ctx, "server.status", json!({})).await.unwrap();
    assert_eq!(result["status"], "running");
    assert!(result["version"].is_string());
}

#[tokio::test]
async fn dispatch_unknown_namespace_yields_method_not_found() {
    let (ctx, _dir) = test_ctx().await;
    let err = capbroker::registry::dispatch(&ctx, "nonesuch.whatever", json!({})).await.unwrap_err();
    assert_eq!(err.rpc_code(), -32601);
}

#[tokio::test]
async fn dispatch_malformed_method_without_dot_is_method_not_found() {
    let (ctx, _dir) = test_ctx().await;
    let err = capbroker::registry::dispatch(&ctx, "nodot", json!({})).await.unwrap_err();
    assert_eq!(err.rpc_code(), -32601);
}

#[tokio::test]
async fn dispatch_credentials_roundtrip_through_the_gate() {
    let (ctx, _dir) = test_ctx().await;
    capbroker::registry::dispatch(
        &ctx,
        "credentials.store",
        json!({ "label": "github-token", "value": "s3cr3t" }),
    )
    .await
    .unwrap();

    let got = capbroker::registry::dispatch(&ctx, "credentials.get", json!({ "label": "github-token" }))
        .await
        .unwrap();
    assert_eq!(got["value"], "s3cr3t");
}

#[tokio::test]
async fn dispatch_auth_status_never_requires_a_permission() {
    let (ctx, _dir) = test_ctx().await;
    let result = capbroker::registry::dispatch(&ctx, "auth.status", json!({})).await;
    assert!(result.is_ok());
}

#[test]
fn response_success_serializes_without_error_key() {
    let resp = Response::success(json!(7), json!({ "ok": true }));
    let value = serde_json::to_value(&resp).unwrap();
    assert_eq!(value["id"], 7);
    assert!(value.get("error").is_none());
}
