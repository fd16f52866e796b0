// src/proxy/backend.rs
use crate::proxy::pool::ConnectionPool;
use chrono::{DateTime, Utc};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::RwLock;

/// A routable destination: immutable address, a liveness flag, and an
/// exclusively-owned connection pool.
///
/// The backend set is fixed for the life of the process; only the alive
/// flag and the pool contents mutate after construction. The flag is an
/// independent atomic so the routing hot path never touches the pool
/// lock. It is written by the health checker and, on dial failure, by
/// the session pipeline; lost updates between idempotent boolean writes
/// are harmless.
#[derive(Debug)]
pub struct Backend {
    pub addr: SocketAddr,
    /// Reserved for weighted policies; current policies ignore it.
    pub weight: u32,
    alive: AtomicBool,
    pool: ConnectionPool,
    last_health_check: RwLock<Option<DateTime<Utc>>>,
}

impl Backend {
    pub fn new(
        addr: SocketAddr,
        pool_size: usize,
        dial_timeout: Duration,
        idle_timeout: Duration,
    ) -> Self {
        Self {
            addr,
            weight: 1,
            // Assume alive until a probe says otherwise.
            alive: AtomicBool::new(true),
            pool: ConnectionPool::new(addr, pool_size, dial_timeout, idle_timeout),
            last_health_check: RwLock::new(None),
        }
    }

    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::Relaxed)
    }

    pub fn set_alive(&self, alive: bool) {
        self.alive.store(alive, Ordering::Relaxed);
    }

    pub fn pool(&self) -> &ConnectionPool {
        &self.pool
    }

    pub async fn record_health_check(&self) {
        *self.last_health_check.write().await = Some(Utc::now());
    }

    pub async fn last_health_check(&self) -> Option<DateTime<Utc>> {
        *self.last_health_check.read().await
    }
}
