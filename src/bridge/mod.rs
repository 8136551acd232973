//! Stdio-to-socket bridge (spec §4.8): exposes a subset of the broker to
//! tool hosts that speak line-delimited JSON-RPC over stdin/stdout instead
//! of a Unix socket. A distinct process from the broker — every `tools/call`
//! connects to the broker's own socket exactly as any other client would,
//! rather than calling into the dispatch pipeline in-process. Framing mirrors
//! `eric8810-authy/src/mcp/mod.rs`'s stdio read loop.

use std::collections::BTreeMap;

use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::UnixStream;

use crate::manifest::ManifestRegistry;

/// MCP protocol version the bridge declares during `initialize`.
const PROTOCOL_VERSION: &str = "2024-11-05";

/// Fixed literal prefixed onto every bound tool name to synthesize its MCP
/// name (spec §4.8, example S6: `<prefix>_server_status`).
const TOOL_NAME_PREFIX: &str = "capbroker";

struct Bridge {
    socket_path: std::path::PathBuf,
    /// mcpName -> dotted socket method
    allowlist: BTreeMap<String, String>,
    tools: Vec<Value>,
}

impl Bridge {
    async fn build(manifests_root: std::path::PathBuf, socket_path: std::path::PathBuf) -> std::io::Result<Self> {
        let registry = ManifestRegistry::load(manifests_root).await?;
        let bound = registry.list_bridge_tools().await;

        let mut allowlist = BTreeMap::new();
        let mut tools = Vec::with_capacity(bound.len());
        for (tool, dotted) in bound {
            let mcp_name = format!("{TOOL_NAME_PREFIX}_{}", tool.name);
            allowlist.insert(mcp_name.clone(), dotted);
            tools.push(json!({
                "name": mcp_name,
                "description": tool.description,
                "inputSchema": tool.input_schema,
            }));
        }

        Ok(Self { socket_path, allowlist, tools })
    }

    async fn handle(&self, req: &Value) -> Value {
        let id = req.get("id").cloned().unwrap_or(Value::Null);
        let method = req.get("method").and_then(Value::as_str).unwrap_or("");

        match method {
            "initialize" => success(
                id,
                json!({
                    "protocolVersion": PROTOCOL_VERSION,
                    "capabilities": { "tools": { "listChanged": false } },
                    "serverInfo": { "name": "capbroker-bridge", "version": crate::context::VERSION },
                    "instructions": "Capability broker bridge: tools proxy to the local broker socket.",
                }),
            ),
            "tools/list" => success(id, json!({ "tools": self.tools })),
            "tools/call" => self.handle_tools_call(id, req).await,
            "resources/list" => success(id, json!({ "resources": [] })),
            "prompts/list" => success(id, json!({ "prompts": [] })),
            other => error(id, -32601, format!("Method not found: {other}")),
        }
    }

    async fn handle_tools_call(&self, id: Value, req: &Value) -> Value {
        let Some(name) = req.pointer("/params/name").and_then(Value::as_str) else {
            return error(id, -32602, "missing params.name".to_string());
        };
        let Some(dotted) = self.allowlist.get(name) else {
            return error(id, -32601, format!("unknown tool: {name}"));
        };
        let arguments = req
            .pointer("/params/arguments")
            .cloned()
            .unwrap_or_else(|| json!({}));

        match self.forward(dotted, arguments).await {
            Ok(Value::Object(body)) if body.contains_key("error") => {
                let err = &body["error"];
                success(
                    id,
                    json!({
                        "isError": true,
                        "content": [{ "type": "text", "text": err.to_string() }],
                    }),
                )
            }
            Ok(Value::Object(body)) => {
                let result = body.get("result").cloned().unwrap_or(Value::Null);
                success(
                    id,
                    json!({
                        "isError": false,
                        "content": [{ "type": "text", "text": result.to_string() }],
                    }),
                )
            }
            Ok(other) => success(
                id,
                json!({
                    "isError": true,
                    "content": [{ "type": "text", "text": format!("malformed broker response: {other}") }],
                }),
            ),
            Err(e) => success(
                id,
                json!({
                    "isError": true,
                    "content": [{ "type": "text", "text": format!("bridge connection failed: {e}") }],
                }),
            ),
        }
    }

    /// Open a fresh connection to the broker socket, send one request, read
    /// one line back. One connection per call — the bridge does not keep a
    /// persistent socket open (spec §4.8 step 2).
    async fn forward(&self, dotted_method: &str, arguments: Value) -> std::io::Result<Value> {
        let stream = UnixStream::connect(&self.socket_path).await?;
        let (reader, mut writer) = stream.into_split();
        let mut reader = BufReader::new(reader);

        let request = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": dotted_method,
            "params": arguments,
        });
        let mut line = serde_json::to_vec(&request)?;
        line.push(b'\n');
        writer.write_all(&line).await?;
        writer.flush().await?;

        let mut response_line = String::new();
        reader.read_line(&mut response_line).await?;
        serde_json::from_str(&response_line)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
    }
}

fn success(id: Value, result: Value) -> Value {
    json!({ "jsonrpc": "2.0", "id": id, "result": result })
}

fn error(id: Value, code: i64, message: String) -> Value {
    json!({ "jsonrpc": "2.0", "id": id, "error": { "code": code, "message": message } })
}

/// Run the bridge: read lines from `stdin`, write responses to `stdout`.
/// Never exits on stdin EOF (spec §4.8) — some MCP hosts close stdin but
/// keep the process alive and expect it to keep serving.
pub async fn run(manifests_root: std::path::PathBuf, socket_path: std::path::PathBuf) -> std::io::Result<()> {
    let bridge = Bridge::build(manifests_root, socket_path).await?;

    let stdin = tokio::io::stdin();
    let mut stdout = tokio::io::stdout();
    let mut reader = BufReader::new(stdin);

    loop {
        let mut line = String::new();
        let n = reader.read_line(&mut line).await?;
        if n == 0 {
            tracing::info!("stdin closed, bridge sleeping forever rather than exiting");
            std::future::pending::<()>().await;
            unreachable!();
        }
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        let req: Value = match serde_json::from_str(trimmed) {
            Ok(v) => v,
            Err(e) => {
                let resp = error(Value::Null, -32700, format!("Parse error: {e}"));
                write_line(&mut stdout, &resp).await?;
                continue;
            }
        };
        let resp = bridge.handle(&req).await;
        write_line(&mut stdout, &resp).await?;
    }
}

async fn write_line(stdout: &mut tokio::io::Stdout, value: &Value) -> std::io::Result<()> {
    let mut bytes = serde_json::to_vec(value)?;
    bytes.push(b'\n');
    stdout.write_all(&bytes).await?;
    stdout.flush().await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn build_synthesizes_prefixed_names() {
        let dir = tempfile::tempdir().unwrap();
        let body = json!({
            "id": "srv", "name": "srv", "version": "1.0.0", "category": "core",
            "schema_version": 1,
            "tools": [{"name": "server_status", "description": "d", "inputSchema": {"type": "object"}}],
            "implementation": {
                "type": "internal",
                "module": "server",
                "methods": { "server_status": "server.status" }
            }
        });
        tokio::fs::write(dir.path().join("server.json"), body.to_string()).await.unwrap();

        let bridge = Bridge::build(dir.path().to_path_buf(), dir.path().join("broker.sock"))
            .await
            .unwrap();
        assert_eq!(
            bridge.allowlist.get("capbroker_server_status"),
            Some(&"server.status".to_string())
        );
    }

    #[tokio::test]
    async fn unknown_tool_call_yields_bridge_level_method_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let bridge = Bridge::build(dir.path().to_path_buf(), dir.path().join("broker.sock"))
            .await
            .unwrap();
        let req = json!({"jsonrpc":"2.0","id":1,"method":"tools/call","params":{"name":"nope"}});
        let resp = bridge.handle(&req).await;
        assert_eq!(resp["error"]["code"], -32601);
    }

    #[tokio::test]
    async fn tools_list_is_sorted_and_empty_resources_supported() {
        let dir = tempfile::tempdir().unwrap();
        let bridge = Bridge::build(dir.path().to_path_buf(), dir.path().join("broker.sock"))
            .await
            .unwrap();
        let req = json!({"jsonrpc":"2.0","id":2,"method":"resources/list"});
        let resp = bridge.handle(&req).await;
        assert_eq!(resp["result"]["resources"], json!([]));
    }
}
