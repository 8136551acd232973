//! Manifest data model (spec §3): the authoritative unit of capability.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Manifest {
    pub id: String,
    pub name: String,
    pub version: String,
    pub category: String,
    #[serde(default)]
    pub requires: Requirements,
    pub tools: Vec<Tool>,
    pub implementation: Implementation,
    /// Manifest schema version this file was written against; validated
    /// against the version this build supports (spec §4.5).
    #[serde(default = "default_schema_version")]
    pub schema_version: u32,
}

fn default_schema_version() -> u32 {
    1
}

/// The manifest schema version this build understands.
pub const SUPPORTED_SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Requirements {
    #[serde(default)]
    pub permissions: Vec<PermissionRequirement>,
    #[serde(default)]
    pub credentials: Vec<CredentialRequirement>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PermissionRequirement {
    pub name: String,
    #[serde(default)]
    pub optional: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CredentialRequirement {
    pub id: String,
    pub provider: String,
    #[serde(default)]
    pub scopes: Vec<String>,
    #[serde(default)]
    pub optional: bool,
    /// Account label to use when `params.account` is absent. Defaults to
    /// `"default"` per spec §4.4's resolution rule.
    #[serde(default = "default_account")]
    pub default_account: String,
}

fn default_account() -> String {
    "default".to_string()
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Tool {
    pub name: String,
    pub description: String,
    #[serde(rename = "inputSchema")]
    pub input_schema: Value,
    #[serde(rename = "outputSchema", default)]
    pub output_schema: Option<Value>,
    #[serde(default)]
    pub annotations: ToolAnnotations,
    #[serde(rename = "mcpExpose", default = "default_true")]
    pub mcp_expose: bool,
    #[serde(default)]
    pub requires: Option<Requirements>,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ToolAnnotations {
    #[serde(rename = "readOnlyHint", default)]
    pub read_only_hint: bool,
    #[serde(rename = "destructiveHint", default)]
    pub destructive_hint: bool,
    #[serde(rename = "idempotentHint", default)]
    pub idempotent_hint: bool,
    #[serde(rename = "openWorldHint", default)]
    pub open_world_hint: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Implementation {
    Internal {
        module: String,
        methods: BTreeMap<String, String>,
    },
    Proxy {
        #[serde(rename = "baseUrl")]
        base_url: String,
        auth: ProxyAuth,
        #[serde(rename = "toolBindings")]
        tool_bindings: BTreeMap<String, ProxyBinding>,
    },
    Script {
        runtime: ScriptRuntime,
        entrypoint: String,
        #[serde(default)]
        args: Vec<String>,
        #[serde(default)]
        env: BTreeMap<String, String>,
        #[serde(rename = "toolBindings")]
        tool_bindings: BTreeMap<String, ScriptBinding>,
    },
}

impl Implementation {
    /// The set of tool names this implementation declares a binding for,
    /// used to validate "every tool has a matching implementation entry"
    /// (spec §3 invariant).
    pub fn bound_tool_names(&self) -> Vec<&str> {
        match self {
            Implementation::Internal { methods, .. } => {
                methods.keys().map(String::as_str).collect()
            }
            Implementation::Proxy { tool_bindings, .. } => {
                tool_bindings.keys().map(String::as_str).collect()
            }
            Implementation::Script { tool_bindings, .. } => {
                tool_bindings.keys().map(String::as_str).collect()
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ScriptRuntime {
    Sh,
    Bash,
    Python3,
    Node,
    Ruby,
    Custom,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ProxyAuth {
    pub strategy: ProxyAuthStrategy,
    #[serde(rename = "credentialId")]
    pub credential_id: String,
    #[serde(rename = "tokenField", default = "default_token_field")]
    pub token_field: String,
    #[serde(rename = "headerName", default)]
    pub header_name: Option<String>,
}

fn default_token_field() -> String {
    "access_token".to_string()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ProxyAuthStrategy {
    Bearer,
    ApiKeyHeader,
    ApiKeyQuery,
    Basic,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ProxyBinding {
    pub method: HttpMethod,
    pub path: String,
    #[serde(default)]
    pub query: BTreeMap<String, String>,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    /// Template for the request body; if absent, the remainder of `params`
    /// (minus path/query consumers) is serialized as JSON (spec §4.4).
    #[serde(default)]
    pub body: Option<Value>,
    #[serde(rename = "responsePath", default)]
    pub response_path: Option<String>,
    #[serde(default)]
    pub pagination: Option<PaginationSpec>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PaginationSpec {
    #[serde(rename = "nextPageField", default = "default_next_page_field")]
    pub next_page_field: String,
    #[serde(rename = "itemsField", default)]
    pub items_field: Option<String>,
}

fn default_next_page_field() -> String {
    "nextPageToken".to_string()
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ScriptBinding {
    pub action: String,
}

impl Manifest {
    /// Validate the invariants spec §4.5 requires at load time. Returns the
    /// first violation found; callers reject the whole file on any failure.
    pub fn validate(&self) -> Result<(), String> {
        if self.schema_version != SUPPORTED_SCHEMA_VERSION {
            return Err(format!(
                "unsupported schema version {} (supported: {})",
                self.schema_version, SUPPORTED_SCHEMA_VERSION
            ));
        }
        for tool in &self.tools {
            if !is_valid_identifier(&tool.name) {
                return Err(format!("invalid tool name: {}", tool.name));
            }
        }
        let bound: std::collections::HashSet<&str> =
            self.implementation.bound_tool_names().into_iter().collect();
        for tool in &self.tools {
            if !bound.contains(tool.name.as_str()) {
                return Err(format!(
                    "tool '{}' has no implementation binding",
                    tool.name
                ));
            }
        }
        for provider in self.referenced_providers() {
            if !crate::auth::provider::is_supported(provider) {
                return Err(format!("unknown credential provider: {provider}"));
            }
        }
        Ok(())
    }

    /// Every credential provider this manifest references, at manifest and
    /// tool granularity (spec §4.5 "Referenced credential providers are
    /// either built-in or present in the credential-types registry").
    fn referenced_providers(&self) -> impl Iterator<Item = &str> {
        self.requires
            .credentials
            .iter()
            .chain(self.tools.iter().flat_map(|t| t.requires.iter().flat_map(|r| r.credentials.iter())))
            .map(|c| c.provider.as_str())
    }
}

/// Alphanumerics and `_`, leading letter (spec §4.5).
fn is_valid_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}
