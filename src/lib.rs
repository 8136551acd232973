//! Capability broker — a local, authenticated JSON-RPC endpoint that gates
//! macOS system facilities and third-party cloud APIs behind OS permission
//! checks and an encrypted credential vault (spec §1).
//!
//! This library exposes the socket server, the dispatch pipeline (Handler
//! Registry → Capability Router → Internal/Proxy/Script), the Auth Broker,
//! the Manifest Registry, and the stdio bridge for programmatic use. The CLI
//! front door (`capbroker serve`, `capbroker bridge`, ...) is private to the
//! `capbroker` binary under `src/cli/`.
//!
//! # Quick start
//!
//! ```no_run
//! # async fn run() -> capbroker::error::Result<()> {
//! use capbroker::config::Config;
//! use capbroker::auth::AuthBroker;
//!
//! let root = capbroker::paths::root_dir();
//! let config = Config::load(&capbroker::paths::config_path(&root))?;
//! let auth = AuthBroker::new(
//!     capbroker::paths::auth_dir(&root),
//!     None,
//!     config.http.connect_timeout(),
//!     config.http.request_timeout(),
//!     config.auth.expiry_skew_secs,
//! )
//! .await?;
//! let _ = auth.status().await;
//! # Ok(())
//! # }
//! ```

pub mod activity;
pub mod auth;
pub mod bridge;
pub mod config;
pub mod context;
pub mod error;
pub mod internal;
pub mod manifest;
pub mod paths;
pub mod permissions;
pub mod protocol;
pub mod registry;
pub mod router;
pub mod socket;
