// src/load_balancer/sticky.rs
use crate::load_balancer::Balancer;
use crate::proxy::Backend;
use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::sync::Arc;

/// Maps a client key (its IP, port stripped) to a backend through a
/// truncated SHA-256 digest, so the same client lands on the same
/// backend for as long as the alive set is unchanged.
///
/// Known limitation, kept on purpose: the digest is reduced modulo the
/// *alive* count, so a backend leaving or rejoining the alive set
/// reshuffles the mapping for all clients, not only those that were
/// routed to it.
pub struct StickyBalancer;

#[async_trait]
impl Balancer for StickyBalancer {
    async fn select(&self, alive: &[Arc<Backend>], client_key: &str) -> Option<Arc<Backend>> {
        if alive.is_empty() {
            return None;
        }

        let digest = Sha256::digest(client_key.as_bytes());
        let bucket = u32::from_be_bytes([digest[0], digest[1], digest[2], digest[3]]);
        Some(alive[bucket as usize % alive.len()].clone())
    }

    fn name(&self) -> &'static str {
        "sticky"
    }
}
