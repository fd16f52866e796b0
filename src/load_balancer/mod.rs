// src/load_balancer/mod.rs
mod algorithm;
mod round_robin;
mod sticky;

pub use algorithm::Balancer;
pub use round_robin::RoundRobinBalancer;
pub use sticky::StickyBalancer;

use crate::config::{BalancerMode, Settings};
use crate::proxy::Backend;
use std::sync::Arc;
use tracing::warn;

pub fn create_balancer(mode: BalancerMode) -> Arc<dyn Balancer> {
    match mode {
        BalancerMode::RoundRobin => Arc::new(RoundRobinBalancer::new()),
        BalancerMode::Sticky => Arc::new(StickyBalancer),
    }
}

/// The fixed backend set plus the routing policy.
///
/// Constructed once at startup and never reconfigured: backends are not
/// added or removed while the process runs.
pub struct Router {
    backends: Vec<Arc<Backend>>,
    balancer: Arc<dyn Balancer>,
}

impl Router {
    pub fn new(settings: &Settings) -> Self {
        let backends = settings
            .backends
            .iter()
            .map(|&addr| {
                Arc::new(Backend::new(
                    addr,
                    settings.pool_size,
                    settings.dial_timeout,
                    settings.idle_timeout,
                ))
            })
            .collect();

        Self {
            backends,
            balancer: create_balancer(settings.mode),
        }
    }

    /// Assemble a router from pre-built parts; used by tests to control
    /// the backend set and policy directly.
    pub fn with_balancer(backends: Vec<Arc<Backend>>, balancer: Arc<dyn Balancer>) -> Self {
        Self { backends, balancer }
    }

    pub fn backends(&self) -> &[Arc<Backend>] {
        &self.backends
    }

    pub fn balancer_name(&self) -> &'static str {
        self.balancer.name()
    }

    /// Snapshot of the backends currently marked alive.
    pub fn alive_backends(&self) -> Vec<Arc<Backend>> {
        self.backends
            .iter()
            .filter(|backend| backend.is_alive())
            .cloned()
            .collect()
    }

    /// Pick a backend for a client, or `None` when every backend is
    /// currently marked not-alive (the caller drops the client).
    pub async fn choose(&self, client_key: &str) -> Option<Arc<Backend>> {
        let alive = self.alive_backends();
        if alive.is_empty() {
            warn!("no alive backends");
            return None;
        }
        self.balancer.select(&alive, client_key).await
    }
}
