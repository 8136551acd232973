//! Thin JSON-RPC client the CLI uses to talk to a running broker over its
//! Unix socket — the same wire protocol any other client speaks (spec §6).
//! One connection per call, mirroring `crate::bridge`'s `forward`: connect,
//! write one line, read one line, disconnect.

use std::path::Path;

use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::UnixStream;

use capbroker::error::{BrokerError, Result};

pub async fn call(socket_path: &Path, method: &str, params: Value) -> Result<Value> {
    let stream = UnixStream::connect(socket_path).await.map_err(|e| {
        BrokerError::Other(format!(
            "failed to connect to broker at {}: {e} (is `capbroker serve` running?)",
            socket_path.display()
        ))
    })?;
    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader);

    let request = json!({ "jsonrpc": "2.0", "id": 1, "method": method, "params": params });
    let mut line = serde_json::to_vec(&request).map_err(|e| BrokerError::Other(e.to_string()))?;
    line.push(b'\n');
    writer.write_all(&line).await?;
    writer.flush().await?;

    let mut response_line = String::new();
    let n = reader.read_line(&mut response_line).await?;
    if n == 0 {
        return Err(BrokerError::Other("broker closed the connection without a response".into()));
    }
    let response: Value = serde_json::from_str(&response_line)
        .map_err(|e| BrokerError::Other(format!("malformed broker response: {e}")))?;

    if let Some(error) = response.get("error") {
        let message = error.get("message").and_then(Value::as_str).unwrap_or("unknown error");
        let code = error.get("code").and_then(Value::as_i64).unwrap_or(-32603);
        let data = error.get("data").cloned();
        return Err(BrokerError::Other(match data {
            Some(data) => format!("broker error {code}: {message} ({data})"),
            None => format!("broker error {code}: {message}"),
        }));
    }
    Ok(response.get("result").cloned().unwrap_or(Value::Null))
}
