//! `capbroker serve`: the broker's own startup sequence (spec §2 "Control
//! flow (lifecycle)"): brief delay, load manifests and spawn the watcher,
//! open the auth store, spawn the refresh daemon, bind the socket, serve
//! until SIGINT/SIGTERM drains connections and unlinks the socket file.

use std::time::Duration;

use tokio::sync::watch;

use capbroker::auth::AuthBroker;
use capbroker::config::Config;
use capbroker::context::BrokerContext;
use capbroker::error::Result;
use capbroker::manifest::{self, ManifestRegistry};
use capbroker::paths;
use capbroker::permissions::PermissionsFacade;
use capbroker::router::proxy::ProxyDispatcher;
use capbroker::socket;

/// A fast-restarting supervisor's previous instance may still be unlinking
/// its socket file; a short delay avoids a spurious "already running" bind
/// failure (spec §2 "startup delays briefly").
const STARTUP_DELAY: Duration = Duration::from_millis(200);

pub async fn run(socket_override: Option<String>) -> Result<()> {
    let root = paths::root_dir();
    paths::create_dir_owner_only(&root)?;
    let config = Config::load(&paths::config_path(&root))?;

    tokio::time::sleep(STARTUP_DELAY).await;

    let keyfile = std::env::var("CAPBROKER_KEYFILE").ok().map(std::path::PathBuf::from);
    let auth = AuthBroker::new(
        paths::auth_dir(&root),
        keyfile.as_deref(),
        config.http.connect_timeout(),
        config.http.request_timeout(),
        config.auth.expiry_skew_secs,
    )
    .await?;

    let manifests = ManifestRegistry::load(paths::manifests_dir(&root)).await?;
    let permissions = PermissionsFacade::default();
    let proxy = ProxyDispatcher::new(config.http.connect_timeout(), config.http.request_timeout())?;
    let ctx = BrokerContext::new(auth.clone(), manifests.clone(), permissions, proxy, config.clone());

    let socket_env = socket_override.or_else(|| std::env::var("CAPBROKER_SOCKET").ok());
    let socket_path = config.socket_path(&root, socket_env.as_deref());

    let listener = socket::bind(&socket_path)?;
    tracing::info!(
        path = %socket_path.display(),
        manifests = %manifests.root().display(),
        "broker listening"
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    auth.spawn_refresh_daemon(config.auth.refresh_period(), config.auth.refresh_window_secs, shutdown_rx.clone());
    tokio::spawn(manifest::watch(manifests, shutdown_rx.clone()));

    // Run the accept loop as its own task so shutdown can both signal it
    // *and* wait for it to drain in-flight connections and unlink the
    // socket file before this function returns (spec §5 "Shutdown").
    let accept_loop = tokio::spawn(socket::serve(listener, socket_path, ctx, shutdown_rx));

    shutdown_signal().await;
    tracing::info!("shutdown signal received, draining connections");
    let _ = shutdown_tx.send(true);
    let _ = accept_loop.await;

    Ok(())
}

#[cfg(unix)]
async fn shutdown_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm = match signal(SignalKind::terminate()) {
        Ok(s) => s,
        Err(e) => {
            tracing::warn!(error = %e, "failed to register SIGTERM handler, only SIGINT will trigger shutdown");
            std::future::pending::<()>().await;
            unreachable!()
        }
    };
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {}
        _ = sigterm.recv() => {}
    }
}

#[cfg(not(unix))]
async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
