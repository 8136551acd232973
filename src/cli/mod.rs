//! CLI front door: `capbroker serve|bridge|status|auth|manifest|permissions`.
//! `clap` `Commands` enum, one module per subcommand. `serve` starts the
//! socket server, `bridge` starts the stdio bridge, and
//! `auth`/`manifest`/`permissions` are thin socket clients that wrap the
//! same operations the broker exposes to any other client, for local
//! scripting and debugging without a full MCP host.

pub mod auth;
pub mod bridge;
pub mod client;
pub mod manifest;
pub mod permissions;
pub mod serve;
pub mod status;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "capbroker", version, about = "Local capability broker for AI agents and scripts")]
pub struct Cli {
    /// Override the broker socket path (else `CAPBROKER_SOCKET`, else config, else `<root>/broker.sock`)
    #[arg(long, global = true)]
    pub socket: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the broker: bind the socket, load manifests, open the auth
    /// store, and serve until SIGINT/SIGTERM.
    Serve,

    /// Run the stdio-to-socket bridge for external tool hosts.
    Bridge,

    /// Print the running broker's status (`server.status`).
    Status,

    /// Auth Broker operations: OAuth tokens and generic credentials.
    Auth {
        #[command(subcommand)]
        command: AuthCommands,
    },

    /// Manifest Registry operations.
    Manifest {
        #[command(subcommand)]
        command: ManifestCommands,
    },

    /// Permissions Facade operations.
    Permissions {
        #[command(subcommand)]
        command: PermissionsCommands,
    },
}

#[derive(Subcommand)]
pub enum AuthCommands {
    /// Vault status: initialized, account count, master key availability.
    Status,
    /// List supported credential providers.
    Providers,
    /// List stored accounts, optionally filtered by provider.
    Accounts {
        provider: Option<String>,
    },
    /// Fetch a valid access token, refreshing first if near expiry.
    Token {
        provider: String,
        #[arg(long)]
        account: Option<String>,
        #[arg(long = "scope")]
        scopes: Vec<String>,
    },
    /// Force a refresh regardless of expiry.
    Refresh {
        provider: String,
        #[arg(long)]
        account: Option<String>,
    },
    /// Delete a stored token.
    Revoke {
        provider: String,
        #[arg(long)]
        account: Option<String>,
        /// Skip the confirmation prompt.
        #[arg(long)]
        yes: bool,
    },
    /// Generic (non-OAuth) secret store, sharing the same vault and encryption.
    Credentials {
        #[command(subcommand)]
        command: CredentialCommands,
    },
}

#[derive(Subcommand)]
pub enum CredentialCommands {
    /// Store a secret under `label` (value read from stdin).
    Store { label: String },
    /// Read a stored secret's metadata and value.
    Get { label: String },
    /// List stored secret labels.
    List,
    /// Delete a stored secret.
    Delete { label: String },
    /// Rename a stored secret (get + store-under-new-label + delete-old).
    Rename { old: String, new: String },
}

#[derive(Subcommand)]
pub enum ManifestCommands {
    /// List tools advertised by the loaded manifest set.
    List,
    /// Force an immediate reload from disk (hot-reload normally does this automatically).
    Reload,
}

#[derive(Subcommand)]
pub enum PermissionsCommands {
    /// Check one permission's current status.
    Check { name: String },
    /// List all known permissions and their status.
    List,
    /// Request (prompt for, or open Settings for) a permission.
    Request { name: String },
    /// Open a System Settings pane by name.
    OpenSettings { pane: String },
}
