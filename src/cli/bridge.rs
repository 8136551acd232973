//! `capbroker bridge`: runs the stdio-to-socket translator (spec §4.8) as a
//! separate process from the broker, so an external tool host can spawn it
//! directly without knowing the socket path itself.

use capbroker::config::Config;
use capbroker::error::Result;
use capbroker::paths;

pub async fn run(socket_override: Option<String>) -> Result<()> {
    let root = paths::root_dir();
    let config = Config::load(&paths::config_path(&root))?;
    let socket_env = socket_override.or_else(|| std::env::var("CAPBROKER_SOCKET").ok());
    let socket_path = config.socket_path(&root, socket_env.as_deref());

    capbroker::bridge::run(paths::manifests_dir(&root), socket_path).await?;
    Ok(())
}
