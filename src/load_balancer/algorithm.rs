// src/load_balancer/algorithm.rs
use crate::proxy::Backend;
use async_trait::async_trait;
use std::sync::Arc;

/// A routing policy over the current alive-backend snapshot.
///
/// `alive` is already filtered on the liveness flag; policies index into
/// it, so a backend flapping in or out of the set shifts every policy's
/// mapping, not just the flapped backend's share.
#[async_trait]
pub trait Balancer: Send + Sync {
    async fn select(&self, alive: &[Arc<Backend>], client_key: &str) -> Option<Arc<Backend>>;

    fn name(&self) -> &'static str;
}
