//! Filesystem layout under the user data directory (spec §6).
//!
//! Grounded on `eric8810-authy/src/vault/mod.rs`'s `authy_dir()`/`vault_path()`
//! helpers and `ConaryLabs-Mira/crates/mira-server/src/ipc/mod.rs::socket_path`'s
//! `HOME`-unset fallback chain.

use std::path::PathBuf;

const APP_DIR_NAME: &str = ".capbroker";

/// The broker's data root: `$HOME/.capbroker`, falling back to
/// `$XDG_RUNTIME_DIR/capbroker` and finally a UID-scoped `/tmp` directory when
/// `HOME` is unset (spec §6's `HOME` entry only documents the common case;
/// this fallback keeps the broker usable in stripped-down environments).
pub fn root_dir() -> PathBuf {
    if let Some(home) = dirs::home_dir() {
        return home.join(APP_DIR_NAME);
    }
    tracing::warn!("HOME not set, falling back to XDG_RUNTIME_DIR or /tmp");
    if let Ok(runtime_dir) = std::env::var("XDG_RUNTIME_DIR") {
        return PathBuf::from(runtime_dir).join("capbroker");
    }
    #[cfg(unix)]
    {
        let uid = unsafe { libc::getuid() };
        return PathBuf::from(format!("/tmp/capbroker-{uid}"));
    }
    #[cfg(not(unix))]
    {
        std::env::temp_dir().join(APP_DIR_NAME)
    }
}

pub fn socket_path(root: &std::path::Path) -> PathBuf {
    root.join("broker.sock")
}

pub fn manifests_dir(root: &std::path::Path) -> PathBuf {
    root.join("manifests")
}

pub fn auth_dir(root: &std::path::Path) -> PathBuf {
    root.join("auth")
}

pub fn auth_index_path(root: &std::path::Path) -> PathBuf {
    auth_dir(root).join("metadata.json")
}

pub fn auth_tokens_dir(root: &std::path::Path) -> PathBuf {
    auth_dir(root).join("tokens")
}

pub fn scripts_dir(root: &std::path::Path) -> PathBuf {
    root.join("scripts")
}

pub fn logs_dir(root: &std::path::Path) -> PathBuf {
    root.join("logs")
}

pub fn config_path(root: &std::path::Path) -> PathBuf {
    root.join("config.toml")
}

/// Create a directory with owner-only (`0700`) permissions on Unix; a no-op
/// mode restriction elsewhere.
pub fn create_dir_owner_only(path: &std::path::Path) -> std::io::Result<()> {
    std::fs::create_dir_all(path)?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o700))?;
    }
    Ok(())
}
