//! End-to-end stdio bridge test (spec §4.8, Scenario S6): spawns a real
//! `capbroker serve` process against a scratch `$HOME`, then spawns a real
//! `capbroker bridge` process with piped stdin/stdout and drives it exactly
//! as an external tool host would — `initialize`, `tools/list`,
//! `tools/call`. Uses `env!("CARGO_BIN_EXE_capbroker")`, the standard way
//! an integration test reaches its own package's binary, the way
//! `eric8810-authy/tests/cli_test.rs`-style tests drive the compiled CLI
//! rather than calling library internals directly.

use std::io::{BufRead, BufReader, Write};
use std::process::{Child, Command, Stdio};
use std::time::{Duration, Instant};

fn capbroker_bin() -> &'static str {
    env!("CARGO_BIN_EXE_capbroker")
}

/// Kills the wrapped child on drop so a failing assertion never leaves a
/// broker or bridge process running past the test.
struct ChildGuard(Child);

impl Drop for ChildGuard {
    fn drop(&mut self) {
        let _ = self.0.kill();
        let _ = self.0.wait();
    }
}

fn write_server_manifest(home: &std::path::Path) {
    let manifests_dir = home.join(".capbroker").join("manifests");
    std::fs::create_dir_all(&manifests_dir).unwrap();
    let body = serde_json::json!({
        "id": "server",
        "name": "server",
        "version": "1.0.0",
        "category": "core",
        "schema_version": 1,
        "tools": [{
            "name": "server_status",
            "description": "Broker self-status",
            "inputSchema": {"type": "object"},
        }],
        "implementation": {
            "type": "internal",
            "module": "server",
            "methods": { "server_status": "server.status" },
        },
    });
    std::fs::write(manifests_dir.join("server.json"), body.to_string()).unwrap();
}

fn wait_for_socket(path: &std::path::Path, timeout: Duration) {
    let start = Instant::now();
    while !path.exists() {
        if start.elapsed() > timeout {
            panic!("broker socket never appeared at {}", path.display());
        }
        std::thread::sleep(Duration::from_millis(20));
    }
}

fn send(stdin: &mut impl Write, body: &serde_json::Value) {
    let mut line = serde_json::to_vec(body).unwrap();
    line.push(b'\n');
    stdin.write_all(&line).unwrap();
    stdin.flush().unwrap();
}

fn recv(stdout: &mut impl BufRead) -> serde_json::Value {
    let mut line = String::new();
    stdout.read_line(&mut line).expect("bridge stdout closed unexpectedly");
    serde_json::from_str(&line).unwrap_or_else(|e| panic!("malformed bridge response {line:?}: {e}"))
}

#[test]
fn bridge_advertises_and_forwards_tool_calls() {
    let dir = tempfile::tempdir().unwrap();
    let home = dir.path();
    write_server_manifest(home);
    let socket_path = home.join(".capbroker").join("broker.sock");

    let serve = Command::new(capbroker_bin())
        .arg("serve")
        .env("HOME", home)
        .env("CAPBROKER_LOG", "error")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .expect("failed to spawn `capbroker serve`");
    let _serve_guard = ChildGuard(serve);
    wait_for_socket(&socket_path, Duration::from_secs(5));

    let mut bridge = Command::new(capbroker_bin())
        .arg("bridge")
        .env("HOME", home)
        .env("CAPBROKER_LOG", "error")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("failed to spawn `capbroker bridge`");
    let mut stdin = bridge.stdin.take().unwrap();
    let mut stdout = BufReader::new(bridge.stdout.take().unwrap());
    let _bridge_guard = ChildGuard(bridge);

    send(
        &mut stdin,
        &serde_json::json!({"jsonrpc":"2.0","id":1,"method":"initialize","params":{}}),
    );
    let resp = recv(&mut stdout);
    assert_eq!(resp["result"]["protocolVersion"], "2024-11-05");
    assert_eq!(resp["result"]["capabilities"]["tools"]["listChanged"], false);

    send(
        &mut stdin,
        &serde_json::json!({"jsonrpc":"2.0","id":2,"method":"tools/list","params":{}}),
    );
    let resp = recv(&mut stdout);
    let tools = resp["result"]["tools"].as_array().unwrap();
    assert!(tools.iter().any(|t| t["name"] == "capbroker_server_status"));

    send(
        &mut stdin,
        &serde_json::json!({
            "jsonrpc":"2.0","id":3,"method":"tools/call",
            "params":{"name":"capbroker_server_status","arguments":{}},
        }),
    );
    let resp = recv(&mut stdout);
    assert_eq!(resp["result"]["isError"], false);
    let text = resp["result"]["content"][0]["text"].as_str().unwrap();
    assert!(text.contains("\"status\":\"running\""), "unexpected tool text: {text}");

    send(
        &mut stdin,
        &serde_json::json!({
            "jsonrpc":"2.0","id":4,"method":"tools/call",
            "params":{"name":"capbroker_does_not_exist","arguments":{}},
        }),
    );
    let resp = recv(&mut stdout);
    assert_eq!(resp["error"]["code"], -32601);

    send(
        &mut stdin,
        &serde_json::json!({"jsonrpc":"2.0","id":5,"method":"resources/list","params":{}}),
    );
    let resp = recv(&mut stdout);
    assert_eq!(resp["result"]["resources"], serde_json::json!([]));
}
