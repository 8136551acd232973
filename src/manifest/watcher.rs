//! Filesystem watcher that triggers manifest registry reloads (spec §4.5).
//!
//! Grounded on `ConaryLabs-Mira/crates/mira-server/src/background/watcher.rs`:
//! a `notify` callback forwards raw events over an mpsc channel to an async
//! loop, which debounces bursts before acting.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::{mpsc, watch};

use super::registry::ManifestRegistry;

const DEBOUNCE: Duration = Duration::from_millis(300);

/// Watch the manifest directory and reload `registry` on changes, debounced
/// so a burst of edits (e.g. an editor's save-then-rename) triggers one
/// reload instead of several.
pub async fn run(registry: ManifestRegistry, mut shutdown: watch::Receiver<bool>) {
    let (tx, mut rx) = mpsc::channel::<PathBuf>(256);

    let mut watcher: RecommendedWatcher = match notify::recommended_watcher(
        move |res: notify::Result<Event>| match res {
            Ok(event) => {
                if !matches!(
                    event.kind,
                    EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_)
                ) {
                    return;
                }
                for path in event.paths {
                    if let Err(e) = tx.try_send(path) {
                        tracing::debug!(error = %e, "manifest watch event dropped");
                    }
                }
            }
            Err(e) => tracing::warn!(error = %e, "manifest watcher error"),
        },
    ) {
        Ok(w) => w,
        Err(e) => {
            tracing::error!(error = %e, "failed to create manifest watcher, hot-reload disabled");
            return;
        }
    };

    if let Err(e) = watcher.watch(registry.root(), RecursiveMode::Recursive) {
        tracing::error!(error = %e, root = %registry.root().display(), "failed to watch manifest root");
        return;
    }
    tracing::info!(root = %registry.root().display(), "watching manifest directory for changes");

    let mut pending: HashMap<PathBuf, Instant> = HashMap::new();
    loop {
        tokio::select! {
            Some(path) = rx.recv() => {
                pending.insert(path, Instant::now());
            }
            _ = tokio::time::sleep(Duration::from_millis(100)) => {
                if pending.is_empty() {
                    continue;
                }
                let now = Instant::now();
                let ready = pending.iter().any(|(_, ts)| now.duration_since(*ts) >= DEBOUNCE);
                if !ready {
                    continue;
                }
                pending.clear();
                match registry.reload().await {
                    Ok(()) => tracing::info!("manifest registry reloaded"),
                    Err(e) => tracing::warn!(error = %e, "manifest reload failed, keeping prior snapshot"),
                }
            }
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    tracing::info!("manifest watcher shutting down");
                    break;
                }
            }
        }
    }
}
