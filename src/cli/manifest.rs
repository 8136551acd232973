//! `capbroker manifest`: read-only registry introspection plus an on-demand
//! reload trigger (spec §4.5 "Exposed query API"), wrapping the same
//! `manifest.*` internal handlers the socket exposes to any other client.

use std::path::Path;

use capbroker::error::Result;
use serde_json::{json, Value};

use super::client;

pub async fn list(socket: &Path) -> Result<Value> {
    client::call(socket, "manifest.list", json!({})).await
}

pub async fn reload(socket: &Path) -> Result<Value> {
    client::call(socket, "manifest.reload", json!({})).await
}
