//! Unix Domain Socket server (spec §4.1): binds an owner-only socket,
//! accepts one task per connection, and enforces peer-credential
//! authorization before any bytes are read. Bind/unlink/permission sequence
//! is modeled on `ConaryLabs-Mira/crates/mira-server/src/ipc/mod.rs::run_ipc_listener`;
//! per-connection framing lives in `connection.rs`.

mod connection;
mod peer;

use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use tokio::net::UnixListener;
use tokio::sync::watch;

use crate::context::BrokerContext;
use crate::error::{BrokerError, Result};

pub use peer::{is_same_principal, peer_uid};

/// Bind the broker's listening socket at `path`, removing any stale socket
/// file left behind by an unclean shutdown first. The socket is created
/// `0600` (owner read/write only) — there is no group or world access to a
/// capability broker's control plane (spec §4.1, §5 "Security Invariants").
pub fn bind(path: &Path) -> Result<UnixListener> {
    if let Some(parent) = path.parent() {
        crate::paths::create_dir_owner_only(parent)?;
    }
    remove_stale_socket(path)?;

    let listener = UnixListener::bind(path)
        .map_err(|e| BrokerError::Other(format!("failed to bind socket at {}: {e}", path.display())))?;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))?;
    Ok(listener)
}

/// A socket file with nothing listening on it is safe to remove and rebind
/// over; one with a live listener means another broker instance is already
/// running and we must not steal its path.
fn remove_stale_socket(path: &Path) -> Result<()> {
    if !path.exists() {
        return Ok(());
    }
    match std::os::unix::net::UnixStream::connect(path) {
        Ok(_) => Err(BrokerError::Other(format!(
            "broker already running at {}",
            path.display()
        ))),
        Err(_) => {
            std::fs::remove_file(path)?;
            Ok(())
        }
    }
}

/// Accept loop: one task per connection, each gated by the peer-credential
/// check before any request bytes are read (spec §4.1). Runs until `shutdown`
/// is signalled, at which point the listener is dropped and the socket file
/// unlinked.
pub async fn serve(listener: UnixListener, socket_path: PathBuf, ctx: BrokerContext, mut shutdown: watch::Receiver<bool>) {
    loop {
        tokio::select! {
            accepted = listener.accept() => {
                match accepted {
                    Ok((stream, _addr)) => {
                        if !peer::is_same_principal(&stream) {
                            tracing::warn!("rejected connection from foreign principal");
                            continue;
                        }
                        let ctx = ctx.clone();
                        tokio::spawn(async move {
                            connection::handle(stream, ctx).await;
                        });
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "accept failed");
                    }
                }
            }
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    break;
                }
            }
        }
    }
    drop(listener);
    let _ = std::fs::remove_file(&socket_path);
    tracing::info!(path = %socket_path.display(), "socket server shut down");
}
