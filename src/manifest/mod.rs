//! Manifest Registry (spec §4.5): the authoritative source of bindable tools.

mod registry;
mod types;
mod watcher;

pub use registry::{AdvertisedTool, ManifestRegistry};
pub use types::{
    CredentialRequirement, HttpMethod, Implementation, Manifest, PaginationSpec,
    PermissionRequirement, ProxyAuth, ProxyAuthStrategy, ProxyBinding, Requirements,
    ScriptBinding, ScriptRuntime, Tool, ToolAnnotations,
};
pub use watcher::run as watch;
