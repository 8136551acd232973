//! Per-connection framing and request dispatch (spec §4.1). Bounded
//! line-by-line reads are modeled on
//! `ConaryLabs-Mira/crates/mira-server/src/ipc/handler.rs::handle_connection`
//! (fill_buf/consume instead of `read_line`, to reject oversized lines
//! before allocating unbounded memory), adapted for JSON-RPC batching and
//! notifications instead of Mira's NDJSON envelope.

use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::UnixStream;

use crate::context::BrokerContext;
use crate::protocol::{Incoming, Request, Response};
use crate::registry;

/// 1 MiB: generous for any single JSON-RPC line, small enough to bound a
/// malicious or buggy client's memory pressure on the broker.
const MAX_LINE_SIZE: usize = 1_048_576;

pub async fn handle(stream: UnixStream, ctx: BrokerContext) {
    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader);

    loop {
        let mut line = String::new();
        match reader.read_line(&mut line).await {
            Ok(0) => break, // EOF
            Ok(_) => {}
            Err(e) => {
                tracing::warn!(error = %e, "connection read error, dropping");
                return;
            }
        }
        if line.len() > MAX_LINE_SIZE {
            let resp = Response::parse_error(format!("request line exceeds {MAX_LINE_SIZE} bytes"));
            if write_response(&mut writer, &resp).await.is_err() {
                return;
            }
            continue;
        }
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        match process_line(&ctx, trimmed).await {
            Line::None => {}
            Line::Single(resp) => {
                if write_response(&mut writer, &resp).await.is_err() {
                    return;
                }
            }
            Line::Batch(resps) => {
                if write_batch(&mut writer, &resps).await.is_err() {
                    return;
                }
            }
        }
    }
}

enum Line {
    /// Every element was a notification (or the single request was one):
    /// no response line is emitted at all (spec §4.1, §8 Property 2).
    None,
    Single(Response),
    Batch(Vec<Response>),
}

async fn process_line(ctx: &BrokerContext, line: &str) -> Line {
    let incoming: Incoming = match crate::protocol::parse_line(line) {
        Ok(i) => i,
        Err(e) => return Line::Single(Response::parse_error(format!("Parse error: {e}"))),
    };

    match incoming {
        Incoming::Single(req) => match process_request(ctx, req).await {
            Some(resp) => Line::Single(resp),
            None => Line::None,
        },
        Incoming::Batch(reqs) => {
            if reqs.is_empty() {
                return Line::Single(Response::invalid_request(Value::Null, "batch must not be empty"));
            }
            let mut out = Vec::with_capacity(reqs.len());
            // Batches are processed in array order; responses preserve that
            // order (spec §4.1).
            for req in reqs {
                if let Some(resp) = process_request(ctx, req).await {
                    out.push(resp);
                }
            }
            if out.is_empty() {
                Line::None
            } else {
                Line::Batch(out)
            }
        }
    }
}

/// Validate and dispatch one request. Returns `None` for notifications
/// (spec: no response line ever, even if dispatch errors — the error is
/// only logged).
async fn process_request(ctx: &BrokerContext, req: Request) -> Option<Response> {
    let is_notification = req.is_notification();

    if let Err(e) = req.validate() {
        return if is_notification {
            tracing::warn!(error = %e, "invalid notification, no response emitted");
            None
        } else {
            Some(Response::from_error(req.id.clone().unwrap_or(Value::Null), &e))
        };
    }

    let method = req.method().to_string();
    let result = registry::dispatch(ctx, &method, req.params.clone()).await;

    match result {
        Ok(value) => {
            ctx.activity.record(&method, "success", None);
            if is_notification {
                None
            } else {
                Some(Response::success(req.id.clone().unwrap_or(Value::Null), value))
            }
        }
        Err(e) => {
            ctx.activity.record(&method, "error", Some(e.to_string()));
            if is_notification {
                tracing::warn!(method = %method, error = %e, "notification dispatch failed, no response emitted");
                None
            } else {
                tracing::debug!(method = %method, error = %e, "request dispatch failed");
                Some(Response::from_error(req.id.clone().unwrap_or(Value::Null), &e))
            }
        }
    }
}

async fn write_response<W: AsyncWriteExt + Unpin>(writer: &mut W, resp: &Response) -> std::io::Result<()> {
    let json = serde_json::to_string(resp)?;
    writer.write_all(json.as_bytes()).await?;
    writer.write_all(b"\n").await?;
    writer.flush().await
}

async fn write_batch<W: AsyncWriteExt + Unpin>(writer: &mut W, resps: &[Response]) -> std::io::Result<()> {
    let json = serde_json::to_string(resps)?;
    writer.write_all(json.as_bytes()).await?;
    writer.write_all(b"\n").await?;
    writer.flush().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::AuthBroker;
    use crate::config::Config;
    use crate::manifest::ManifestRegistry;
    use crate::permissions::PermissionsFacade;
    use crate::router::proxy::ProxyDispatcher;

    async fn test_ctx() -> (BrokerContext, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let auth = AuthBroker::new(
            dir.path().join("auth"),
            None,
            std::time::Duration::from_secs(10),
            std::time::Duration::from_secs(30),
            60,
        )
        .await
        .unwrap();
        let manifests = ManifestRegistry::load(dir.path().join("manifests")).await.unwrap();
        let permissions = PermissionsFacade::default();
        let proxy = ProxyDispatcher::new(std::time::Duration::from_secs(10), std::time::Duration::from_secs(30)).unwrap();
        let ctx = BrokerContext::new(auth, manifests, permissions, proxy, Config::default());
        (ctx, dir)
    }

    #[tokio::test]
    async fn empty_batch_is_invalid_request() {
        let (ctx, _dir) = test_ctx().await;
        match process_line(&ctx, "[]").await {
            Line::Single(resp) => assert_eq!(resp.error.unwrap().code, -32600),
            _ => panic!("expected single invalid-request response"),
        }
    }

    #[tokio::test]
    async fn malformed_json_is_parse_error() {
        let (ctx, _dir) = test_ctx().await;
        match process_line(&ctx, "{not json").await {
            Line::Single(resp) => {
                let err = resp.error.unwrap();
                assert_eq!(err.code, -32700);
                assert_eq!(resp.id, Value::Null);
            }
            _ => panic!("expected parse error"),
        }
    }

    #[tokio::test]
    async fn batch_with_only_notifications_emits_nothing() {
        let (ctx, _dir) = test_ctx().await;
        let line = r#"[{"jsonrpc":"2.0","method":"log.note","params":{}}]"#;
        match process_line(&ctx, line).await {
            Line::None => {}
            _ => panic!("expected no response line"),
        }
    }

    #[tokio::test]
    async fn batch_preserves_order_and_drops_notification_slots() {
        let (ctx, _dir) = test_ctx().await;
        let line = r#"[{"jsonrpc":"2.0","id":5,"method":"server.status","params":{}},{"jsonrpc":"2.0","method":"log.note","params":{}}]"#;
        match process_line(&ctx, line).await {
            Line::Batch(resps) => {
                assert_eq!(resps.len(), 1);
                assert_eq!(resps[0].id, serde_json::json!(5));
            }
            _ => panic!("expected batch with one response"),
        }
    }
}
