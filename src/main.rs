//! `capbroker` CLI front door: `serve` runs the broker itself; `bridge` runs
//! the stdio translator; `status`/`auth`/`manifest`/`permissions` are thin
//! socket clients for local scripting and debugging.

mod cli;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use capbroker::config::Config;
use capbroker::paths;
use cli::{Cli, Commands};

fn main() {
    let cli = Cli::parse();
    init_tracing();

    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("capbroker: failed to start async runtime: {e}");
            std::process::exit(1);
        }
    };

    match runtime.block_on(dispatch(cli)) {
        Ok(Some(value)) => {
            println!("{}", serde_json::to_string_pretty(&value).unwrap_or_else(|_| value.to_string()));
        }
        Ok(None) => {}
        Err(e) => {
            eprintln!("capbroker: {e}");
            std::process::exit(e.exit_code());
        }
    }
}

/// `EnvFilter` seeded from `CAPBROKER_LOG` (spec §6), writer on stderr so
/// stdout stays free for the stdio bridge's own protocol, grounded on
/// `MatejGomboc-git-proxy-mcp/src/main.rs::init_tracing`.
fn init_tracing() {
    let filter = std::env::var("CAPBROKER_LOG")
        .ok()
        .and_then(|level| EnvFilter::try_new(level).ok())
        .unwrap_or_else(|| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

/// Resolve the socket path a non-`serve`/`bridge` subcommand should connect
/// to: the CLI's `--socket` flag, then `CAPBROKER_SOCKET`, then config, then
/// the fixed default under the data root (spec §6).
fn resolve_socket_path(cli_override: Option<&str>) -> std::path::PathBuf {
    let root = paths::root_dir();
    let config = Config::load(&paths::config_path(&root)).unwrap_or_default();
    let env_override = cli_override.map(str::to_string).or_else(|| std::env::var("CAPBROKER_SOCKET").ok());
    config.socket_path(&root, env_override.as_deref())
}

async fn dispatch(cli: Cli) -> capbroker::error::Result<Option<serde_json::Value>> {
    match cli.command {
        Commands::Serve => {
            cli::serve::run(cli.socket).await?;
            Ok(None)
        }
        Commands::Bridge => {
            cli::bridge::run(cli.socket).await?;
            Ok(None)
        }
        Commands::Status => {
            let socket = resolve_socket_path(cli.socket.as_deref());
            Ok(Some(cli::status::run(&socket).await?))
        }
        Commands::Auth { command } => {
            let socket = resolve_socket_path(cli.socket.as_deref());
            Ok(Some(dispatch_auth(&socket, command).await?))
        }
        Commands::Manifest { command } => {
            let socket = resolve_socket_path(cli.socket.as_deref());
            let value = match command {
                cli::ManifestCommands::List => cli::manifest::list(&socket).await?,
                cli::ManifestCommands::Reload => cli::manifest::reload(&socket).await?,
            };
            Ok(Some(value))
        }
        Commands::Permissions { command } => {
            let socket = resolve_socket_path(cli.socket.as_deref());
            let value = match command {
                cli::PermissionsCommands::Check { name } => cli::permissions::check(&socket, name).await?,
                cli::PermissionsCommands::List => cli::permissions::list(&socket).await?,
                cli::PermissionsCommands::Request { name } => cli::permissions::request(&socket, name).await?,
                cli::PermissionsCommands::OpenSettings { pane } => {
                    cli::permissions::open_settings(&socket, pane).await?
                }
            };
            Ok(Some(value))
        }
    }
}

async fn dispatch_auth(socket: &std::path::Path, command: cli::AuthCommands) -> capbroker::error::Result<serde_json::Value> {
    use cli::AuthCommands;
    match command {
        AuthCommands::Status => cli::auth::status(socket).await,
        AuthCommands::Providers => cli::auth::providers(socket).await,
        AuthCommands::Accounts { provider } => cli::auth::accounts(socket, provider).await,
        AuthCommands::Token { provider, account, scopes } => cli::auth::token(socket, provider, account, scopes).await,
        AuthCommands::Refresh { provider, account } => cli::auth::refresh(socket, provider, account).await,
        AuthCommands::Revoke { provider, account, yes } => cli::auth::revoke(socket, provider, account, yes).await,
        AuthCommands::Credentials { command } => cli::auth::credentials(socket, command).await,
    }
}
