//! Crate-wide error type and the JSON-RPC error code table (spec §4.2).

use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

/// The broker's single error type. Every public operation returns
/// `Result<T, BrokerError>`; the socket server and bridge translate these
/// into JSON-RPC error responses via [`BrokerError::rpc_code`] and
/// [`BrokerError::rpc_data`].
#[derive(Error, Debug)]
pub enum BrokerError {
    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Method not found: {0}")]
    MethodNotFound(String),

    #[error("Invalid params: {0}")]
    InvalidParams(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Upstream error: {0}")]
    Upstream(String),

    #[error("Permission not granted")]
    PermissionDenied {
        permission: String,
        status: String,
        remediation: String,
    },

    #[error("Token not found for {provider}:{account}")]
    TokenNotFound { provider: String, account: String },

    #[error("Token refresh failed: {0}")]
    TokenRefreshFailed(String),

    #[error("Scope insufficient")]
    ScopeInsufficient { has: Vec<String>, needs: Vec<String> },

    #[error("Provider not supported: {0}")]
    ProviderNotSupported(String),

    #[error("Master key unavailable: {0}")]
    MasterKeyUnavailable(String),

    #[error("Vault not initialized")]
    VaultNotInitialized,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

impl BrokerError {
    /// The JSON-RPC 2.0 error code for this error, per spec §4.2.
    pub fn rpc_code(&self) -> i64 {
        match self {
            BrokerError::Parse(_) => -32700,
            BrokerError::InvalidRequest(_) => -32600,
            BrokerError::MethodNotFound(_) => -32601,
            BrokerError::InvalidParams(_) => -32602,
            BrokerError::Internal(_) | BrokerError::Io(_) | BrokerError::Other(_) => -32603,
            BrokerError::Upstream(_) => -32000,
            BrokerError::PermissionDenied { .. } => -32001,
            BrokerError::TokenNotFound { .. } => -32010,
            BrokerError::TokenRefreshFailed(_) => -32011,
            BrokerError::ScopeInsufficient { .. } => -32012,
            BrokerError::ProviderNotSupported(_) => -32013,
            BrokerError::MasterKeyUnavailable(_) | BrokerError::VaultNotInitialized => -32015,
        }
    }

    /// Structured `error.data` payload the GUI/agent can key off, per §7.
    pub fn rpc_data(&self) -> Option<Value> {
        match self {
            BrokerError::PermissionDenied {
                permission,
                status,
                remediation,
            } => Some(serde_json::json!({
                "permission": permission,
                "status": status,
                "remediation": remediation,
            })),
            BrokerError::ScopeInsufficient { has, needs } => Some(serde_json::json!({
                "has": has,
                "needs": needs,
            })),
            _ => None,
        }
    }

    /// Exit code for CLI (non-socket) invocations of broker operations.
    pub fn exit_code(&self) -> i32 {
        match self {
            BrokerError::VaultNotInitialized => 7,
            BrokerError::TokenNotFound { .. } => 3,
            BrokerError::PermissionDenied { .. } => 4,
            BrokerError::ProviderNotSupported(_) => 5,
            BrokerError::MasterKeyUnavailable(_) => 2,
            BrokerError::Io(_) => 1,
            _ => 1,
        }
    }
}

/// JSON representation of an error, used by `--json` CLI output.
#[derive(Serialize)]
pub struct JsonError {
    pub code: i64,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl JsonError {
    pub fn from_error(e: &BrokerError) -> Self {
        Self {
            code: e.rpc_code(),
            message: e.to_string(),
            data: e.rpc_data(),
        }
    }
}

pub type Result<T> = std::result::Result<T, BrokerError>;
