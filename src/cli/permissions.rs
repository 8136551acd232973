//! `capbroker permissions`: wraps the four Permissions Facade operations
//! (spec §4.7) over the socket, for local scripting and debugging.

use std::path::Path;

use capbroker::error::Result;
use serde_json::{json, Value};

use super::client;

pub async fn check(socket: &Path, name: String) -> Result<Value> {
    client::call(socket, "permissions.check", json!({ "permission": name })).await
}

pub async fn list(socket: &Path) -> Result<Value> {
    client::call(socket, "permissions.list", json!({})).await
}

pub async fn request(socket: &Path, name: String) -> Result<Value> {
    client::call(socket, "permissions.request", json!({ "permission": name })).await
}

pub async fn open_settings(socket: &Path, pane: String) -> Result<Value> {
    client::call(socket, "permissions.open_settings", json!({ "pane": pane })).await
}
