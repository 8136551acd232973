//! Broker-wide configuration (`<root>/config.toml`), env var overrides (spec §6).
//!
//! Grounded on `eric8810-authy/src/config/mod.rs`'s load/save pattern: a
//! missing file is not an error, every field has a hardcoded default.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{BrokerError, Result};

/// Top-level config file format (`<root>/config.toml`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub script: ScriptConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default = "default_permission_namespaces")]
    pub permission_namespaces: BTreeMap<String, String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            http: HttpConfig::default(),
            script: ScriptConfig::default(),
            auth: AuthConfig::default(),
            permission_namespaces: default_permission_namespaces(),
        }
    }
}

/// Method-namespace → OS-permission-name map (spec §4.3 Handler Registry
/// step 1; spec.md Open Question 2 calls for enumerating this explicitly in
/// configuration rather than hard-coding it — this is the default table, and
/// `config.toml` may override or extend it). Namespaces absent from this map
/// never require an OS permission (`auth`, `permissions`, `config`, `server`,
/// and any manifest-routed namespace, per spec §4.3).
fn default_permission_namespaces() -> BTreeMap<String, String> {
    BTreeMap::from([
        ("contacts".to_string(), "contacts".to_string()),
        ("calendar".to_string(), "calendar".to_string()),
        ("reminders".to_string(), "reminders".to_string()),
        ("photos".to_string(), "photos".to_string()),
    ])
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Override for the socket path. `None` uses the default under the data root.
    pub socket_path: Option<String>,
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            socket_path: None,
            log_level: default_log_level(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    #[serde(default = "default_http_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            request_timeout_secs: default_http_timeout_secs(),
            connect_timeout_secs: default_connect_timeout_secs(),
        }
    }
}

impl HttpConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScriptConfig {
    #[serde(default = "default_script_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for ScriptConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_script_timeout_secs(),
        }
    }
}

impl ScriptConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    #[serde(default = "default_refresh_period_secs")]
    pub refresh_period_secs: u64,
    #[serde(default = "default_refresh_window_secs")]
    pub refresh_window_secs: i64,
    #[serde(default = "default_skew_secs")]
    pub expiry_skew_secs: i64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            refresh_period_secs: default_refresh_period_secs(),
            refresh_window_secs: default_refresh_window_secs(),
            expiry_skew_secs: default_skew_secs(),
        }
    }
}

impl AuthConfig {
    pub fn refresh_period(&self) -> Duration {
        Duration::from_secs(self.refresh_period_secs)
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_http_timeout_secs() -> u64 {
    30
}

fn default_connect_timeout_secs() -> u64 {
    10
}

fn default_script_timeout_secs() -> u64 {
    60
}

fn default_refresh_period_secs() -> u64 {
    60
}

fn default_refresh_window_secs() -> i64 {
    300
}

fn default_skew_secs() -> i64 {
    60
}

impl Config {
    /// Load config from a path. Returns the default config if the file is absent.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| BrokerError::Other(format!("Invalid config: {e}")))
    }

    /// Resolve the log level, letting `<APP>_LOG` override the file setting.
    pub fn log_level(&self, env_override: Option<&str>) -> String {
        env_override
            .map(str::to_string)
            .unwrap_or_else(|| self.server.log_level.clone())
    }

    /// Resolve the socket path: `<APP>_SOCKET` env var, then file config,
    /// then the fixed default under `root`.
    pub fn socket_path(&self, root: &Path, env_override: Option<&str>) -> PathBuf {
        if let Some(p) = env_override {
            return PathBuf::from(p);
        }
        if let Some(p) = &self.server.socket_path {
            return PathBuf::from(shellexpand_home(p));
        }
        root.join("broker.sock")
    }
}

fn shellexpand_home(p: &str) -> String {
    if let Some(rest) = p.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest).to_string_lossy().into_owned();
        }
    }
    p.to_string()
}
