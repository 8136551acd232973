//! JSON-RPC 2.0 request/response/error types and batch parsing (spec §3, §4.2).
//!
//! Grounded on the request/response shape in `eric8810-authy`'s `mcp/mod.rs`,
//! generalized to support batches, notifications (no `id`), and the broker's
//! larger error code table.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::BrokerError;

/// A request `id`. Present and non-null means a response is expected;
/// absent means the request is a notification.
pub type RequestId = Value;

#[derive(Debug, Clone, Deserialize)]
pub struct Request {
    #[serde(default)]
    pub jsonrpc: Option<String>,
    #[serde(default)]
    pub method: Option<String>,
    #[serde(default)]
    pub params: Value,
    /// Absent (serde default = `None`) marks a notification. A literal
    /// `"id": null` also deserializes to `None`, which is intentional: both
    /// forms are notifications per JSON-RPC 2.0.
    #[serde(default)]
    pub id: Option<RequestId>,
}

impl Request {
    /// True when this request carries no `id` — a notification, which never
    /// produces a response line (spec §3, Testable Property 1).
    pub fn is_notification(&self) -> bool {
        self.id.is_none()
    }

    /// Validate the structural requirements from spec §4.1: `jsonrpc` must be
    /// `"2.0"` and `method` must be non-empty.
    pub fn validate(&self) -> Result<(), BrokerError> {
        match &self.jsonrpc {
            Some(v) if v == "2.0" => {}
            _ => return Err(BrokerError::InvalidRequest("jsonrpc must be \"2.0\"".into())),
        }
        match &self.method {
            Some(m) if !m.is_empty() => Ok(()),
            _ => Err(BrokerError::InvalidRequest("method must be non-empty".into())),
        }
    }

    pub fn method(&self) -> &str {
        self.method.as_deref().unwrap_or("")
    }
}

#[derive(Debug, Serialize)]
pub struct Response {
    pub jsonrpc: &'static str,
    pub id: RequestId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
}

#[derive(Debug, Serialize)]
pub struct RpcError {
    pub code: i64,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl Response {
    pub fn success(id: RequestId, result: Value) -> Self {
        Self {
            jsonrpc: "2.0",
            id,
            result: Some(result),
            error: None,
        }
    }

    pub fn from_error(id: RequestId, err: &BrokerError) -> Self {
        Self {
            jsonrpc: "2.0",
            id,
            result: None,
            error: Some(RpcError {
                code: err.rpc_code(),
                message: err.to_string(),
                data: err.rpc_data(),
            }),
        }
    }

    /// A pre-parse error response: `id` is always `null` because no valid
    /// request (and therefore no echoable `id`) could be recovered.
    pub fn parse_error(message: impl Into<String>) -> Self {
        Self {
            jsonrpc: "2.0",
            id: Value::Null,
            result: None,
            error: Some(RpcError {
                code: -32700,
                message: message.into(),
                data: None,
            }),
        }
    }

    pub fn invalid_request(id: RequestId, message: impl Into<String>) -> Self {
        Self {
            jsonrpc: "2.0",
            id,
            result: None,
            error: Some(RpcError {
                code: -32600,
                message: message.into(),
                data: None,
            }),
        }
    }
}

/// One line of input: either a single request or a batch (array) of requests.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum Incoming {
    Single(Request),
    Batch(Vec<Request>),
}

/// Parse a single framed line into `Incoming`. Malformed JSON is the only
/// failure mode here; structural validation (`jsonrpc`, `method`) happens
/// per-request in [`Request::validate`].
pub fn parse_line(line: &str) -> Result<Incoming, serde_json::Error> {
    serde_json::from_str(line)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_request_roundtrip() {
        let line = r#"{"jsonrpc":"2.0","id":1,"method":"server.status","params":{}}"#;
        let incoming = parse_line(line).unwrap();
        match incoming {
            Incoming::Single(req) => {
                assert_eq!(req.method(), "server.status");
                assert!(!req.is_notification());
            }
            Incoming::Batch(_) => panic!("expected single"),
        }
    }

    #[test]
    fn notification_has_no_id() {
        let line = r#"{"jsonrpc":"2.0","method":"log.note","params":{"m":"hi"}}"#;
        let Incoming::Single(req) = parse_line(line).unwrap() else {
            panic!("expected single")
        };
        assert!(req.is_notification());
    }

    #[test]
    fn batch_parses_as_array() {
        let line = r#"[{"jsonrpc":"2.0","id":1,"method":"a"},{"jsonrpc":"2.0","method":"b"}]"#;
        let Incoming::Batch(reqs) = parse_line(line).unwrap() else {
            panic!("expected batch")
        };
        assert_eq!(reqs.len(), 2);
        assert!(!reqs[0].is_notification());
        assert!(reqs[1].is_notification());
    }

    #[test]
    fn rejects_wrong_jsonrpc_version() {
        let req: Request =
            serde_json::from_str(r#"{"jsonrpc":"1.0","id":1,"method":"x"}"#).unwrap();
        assert!(req.validate().is_err());
    }

    #[test]
    fn rejects_empty_method() {
        let req: Request = serde_json::from_str(r#"{"jsonrpc":"2.0","id":1,"method":""}"#).unwrap();
        assert!(req.validate().is_err());
    }
}
