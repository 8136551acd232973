//! Shared broker state, threaded through the Handler Registry, Capability
//! Router, and internal handlers (spec §4.3–§4.8). One `BrokerContext` is
//! constructed at startup and cloned (cheaply — everything behind an `Arc`)
//! into each connection task, the refresh daemon, and the manifest watcher.

use std::sync::Arc;
use std::time::Instant;

use crate::activity::ActivityLog;
use crate::auth::AuthBroker;
use crate::config::Config;
use crate::manifest::ManifestRegistry;
use crate::permissions::PermissionsFacade;
use crate::router::proxy::ProxyDispatcher;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Clone)]
pub struct BrokerContext {
    pub auth: AuthBroker,
    pub manifests: ManifestRegistry,
    pub permissions: Arc<PermissionsFacade>,
    pub proxy: Arc<ProxyDispatcher>,
    pub activity: Arc<ActivityLog>,
    pub config: Arc<Config>,
    start: Instant,
}

impl BrokerContext {
    pub fn new(
        auth: AuthBroker,
        manifests: ManifestRegistry,
        permissions: PermissionsFacade,
        proxy: ProxyDispatcher,
        config: Config,
    ) -> Self {
        Self {
            auth,
            manifests,
            permissions: Arc::new(permissions),
            proxy: Arc::new(proxy),
            activity: Arc::new(ActivityLog::new()),
            config: Arc::new(config),
            start: Instant::now(),
        }
    }

    pub fn uptime_secs(&self) -> u64 {
        self.start.elapsed().as_secs()
    }
}
