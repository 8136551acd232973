//! End-to-end socket server tests: a real `UnixListener` bound to a temp
//! path, served by `capbroker::socket::serve`, driven by real
//! `UnixStream` clients — exercising framing, batching, and peer
//! authorization as an actual client would see them (spec §8 Testable
//! Properties, Scenarios S1/S2/S3/S5). Grounded on
//! `ConaryLabs-Mira/crates/mira-server/src/ipc/tests.rs`'s `unix_tests`
//! module: bind a real socket, spawn the accept loop, connect real clients.

use std::time::Duration;

use capbroker::auth::AuthBroker;
use capbroker::config::Config;
use capbroker::context::BrokerContext;
use capbroker::manifest::ManifestRegistry;
use capbroker::permissions::PermissionsFacade;
use capbroker::router::proxy::ProxyDispatcher;
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::UnixStream;
use tokio::sync::watch;

/// Spawn a full broker accept loop on a real Unix socket under a temp
/// directory. Returns the socket path and a shutdown handle; dropping the
/// returned `TempDir` cleans up the directory after the listener is gone.
async fn spawn_broker() -> (std::path::PathBuf, watch::Sender<bool>, tempfile::TempDir) {
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

    let socket_path = dir.path().join("broker.sock");
    let listener = capbroker::socket::bind(&socket_path).unwrap();
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(capbroker::socket::serve(listener, socket_path.clone(), ctx, shutdown_rx));
    // Give the accept loop a moment to reach `listener.accept().await`.
    tokio::time::sleep(Duration::from_millis(20)).await;
    (socket_path, shutdown_tx, dir)
}

/// Send one line and read one line back over a fresh connection.
async fn roundtrip(socket_path: &std::path::Path, line: &str) -> String {
    let stream = UnixStream::connect(socket_path).await.unwrap();
    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader);
    writer.write_all(line.as_bytes()).await.unwrap();
    writer.write_all(b"\n").await.unwrap();
    writer.flush().await.unwrap();
    let mut out = String::new();
    reader.read_line(&mut out).await.unwrap();
    out
}

#[tokio::test]
async fn s1_server_status_over_real_socket() {
    let (socket_path, shutdown, _dir) = spawn_broker().await;
    let line = roundtrip(&socket_path, r#"{"jsonrpc":"2.0","id":1,"method":"server.status","params":{}}"#).await;
    let resp: Value = serde_json::from_str(&line).unwrap();
    assert_eq!(resp["id"], json!(1));
    assert_eq!(resp["result"]["status"], "running");
    let _ = shutdown.send(true);
}

#[tokio::test]
async fn s2_permission_denied_carries_remediation() {
    let (socket_path, shutdown, _dir) = spawn_broker().await;
    let line = roundtrip(&socket_path, r#"{"jsonrpc":"2.0","id":2,"method":"contacts.list","params":{}}"#).await;
    let resp: Value = serde_json::from_str(&line).unwrap();
    assert_eq!(resp["error"]["code"], -32001);
    assert_eq!(resp["error"]["data"]["permission"], "contacts");
    assert_eq!(resp["error"]["data"]["status"], "not_determined");
    assert!(resp["error"]["data"]["remediation"]
        .as_str()
        .unwrap()
        .contains("permissions.request"));
    let _ = shutdown.send(true);
}

#[tokio::test]
async fn s3_method_not_found_on_both_router_paths() {
    let (socket_path, shutdown, _dir) = spawn_broker().await;
    let line = roundtrip(&socket_path, r#"{"jsonrpc":"2.0","id":3,"method":"nope.whatever","params":{}}"#).await;
    let resp: Value = serde_json::from_str(&line).unwrap();
    assert_eq!(resp["error"]["code"], -32601);
    let _ = shutdown.send(true);
}

#[tokio::test]
async fn s5_batch_with_notification_drops_its_slot() {
    let (socket_path, shutdown, _dir) = spawn_broker().await;
    let line = roundtrip(
        &socket_path,
        r#"[{"jsonrpc":"2.0","id":5,"method":"server.status","params":{}},{"jsonrpc":"2.0","method":"log.note","params":{"m":"hi"}}]"#,
    )
    .await;
    let resp: Value = serde_json::from_str(&line).unwrap();
    let arr = resp.as_array().unwrap();
    assert_eq!(arr.len(), 1);
    assert_eq!(arr[0]["id"], json!(5));
    let _ = shutdown.send(true);
}

#[tokio::test]
async fn empty_batch_is_invalid_request_over_real_socket() {
    let (socket_path, shutdown, _dir) = spawn_broker().await;
    let line = roundtrip(&socket_path, "[]").await;
    let resp: Value = serde_json::from_str(&line).unwrap();
    assert_eq!(resp["error"]["code"], -32600);
    let _ = shutdown.send(true);
}

#[tokio::test]
async fn notification_alone_gets_no_response_line_before_next_request() {
    let (socket_path, shutdown, _dir) = spawn_broker().await;
    let stream = UnixStream::connect(&socket_path).await.unwrap();
    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader);

    writer.write_all(b"{\"jsonrpc\":\"2.0\",\"method\":\"log.note\",\"params\":{}}\n").await.unwrap();
    writer
        .write_all(b"{\"jsonrpc\":\"2.0\",\"id\":9,\"method\":\"server.status\",\"params\":{}}\n")
        .await
        .unwrap();
    writer.flush().await.unwrap();

    // The only line that ever arrives on this connection is the response
    // to the second (non-notification) request.
    let mut out = String::new();
    reader.read_line(&mut out).await.unwrap();
    let resp: Value = serde_json::from_str(&out).unwrap();
    assert_eq!(resp["id"], json!(9));
    let _ = shutdown.send(true);
}

#[tokio::test]
async fn serial_requests_on_one_connection_preserve_order() {
    let (socket_path, shutdown, _dir) = spawn_broker().await;
    let stream = UnixStream::connect(&socket_path).await.unwrap();
    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader);

    for i in 1..=5u32 {
        writer
            .write_all(format!("{{\"jsonrpc\":\"2.0\",\"id\":{i},\"method\":\"server.status\",\"params\":{{}}}}\n").as_bytes())
            .await
            .unwrap();
    }
    writer.flush().await.unwrap();

    for i in 1..=5u32 {
        let mut line = String::new();
        reader.read_line(&mut line).await.unwrap();
        let resp: Value = serde_json::from_str(&line).unwrap();
        assert_eq!(resp["id"], json!(i));
    }
    let _ = shutdown.send(true);
}

#[tokio::test]
async fn concurrent_connections_each_get_independent_responses() {
    let (socket_path, shutdown, _dir) = spawn_broker().await;

    let make_client = |id: u32, path: std::path::PathBuf| async move {
        let line = format!("{{\"jsonrpc\":\"2.0\",\"id\":{id},\"method\":\"server.status\",\"params\":{{}}}}");
        roundtrip(&path, &line).await
    };

    let (a, b, c) = tokio::join!(
        make_client(1, socket_path.clone()),
        make_client(2, socket_path.clone()),
        make_client(3, socket_path.clone()),
    );

    for (raw, expected_id) in [(a, 1), (b, 2), (c, 3)] {
        let resp: Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(resp["id"], json!(expected_id));
        assert_eq!(resp["result"]["status"], "running");
    }
    let _ = shutdown.send(true);
}

#[tokio::test]
async fn shutdown_unlinks_the_socket_file() {
    let (socket_path, shutdown, _dir) = spawn_broker().await;
    assert!(socket_path.exists());
    let _ = shutdown.send(true);
    // The accept loop removes the file after breaking out of its select
    // loop; give it a moment to run.
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(!socket_path.exists());
}
