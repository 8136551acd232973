//! `capbroker status`: a one-shot `server.status` call against the running
//! broker (spec §8 Scenario S1).

use std::path::Path;

use capbroker::error::Result;
use serde_json::{json, Value};

use super::client;

pub async fn run(socket: &Path) -> Result<Value> {
    client::call(socket, "server.status", json!({})).await
}
