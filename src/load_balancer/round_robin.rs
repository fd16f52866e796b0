// src/load_balancer/round_robin.rs
use crate::load_balancer::Balancer;
use crate::proxy::Backend;
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Rotates through the alive snapshot with a shared atomic counter.
/// The counter is taken modulo the snapshot length, so distribution is
/// exact over any window in which the alive set is stable.
pub struct RoundRobinBalancer {
    counter: AtomicUsize,
}

impl RoundRobinBalancer {
    pub fn new() -> Self {
        Self {
            counter: AtomicUsize::new(0),
        }
    }
}

impl Default for RoundRobinBalancer {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Balancer for RoundRobinBalancer {
    async fn select(&self, alive: &[Arc<Backend>], _client_key: &str) -> Option<Arc<Backend>> {
        if alive.is_empty() {
            return None;
        }

        let index = self.counter.fetch_add(1, Ordering::Relaxed) % alive.len();
        Some(alive[index].clone())
    }

    fn name(&self) -> &'static str {
        "round_robin"
    }
}
