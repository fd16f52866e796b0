// src/health/checker.rs
use crate::load_balancer::Router;
use crate::proxy::Backend;
use crate::server::socket;
use futures::future::join_all;
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::sync::watch;
use tokio::time::interval;
use tracing::{debug, info, warn};

/// Probe payload. The reply is deliberately not read back: liveness is
/// judged by a successful dial plus write, so a backend that accepts TCP
/// while otherwise unhealthy is still reported alive.
pub const PROBE_PAYLOAD: &[u8] = b"ping\r\n\r\n";

/// Dial timeout for active probes.
pub const PROBE_TIMEOUT: Duration = Duration::from_secs(2);

/// One-in-N chance per backend per tick of sweeping its idle pool.
const PRUNE_ODDS: u32 = 64;

/// Periodic active health checks plus opportunistic pool pruning.
///
/// Each tick probes every backend concurrently and joins the probes, so
/// one tick's probe for a backend never overlaps the next tick's. Only
/// the alive flags and pool contents are mutated; the routing policy is
/// untouched.
pub struct HealthChecker {
    interval: Duration,
    router: Arc<Router>,
    shutdown_tx: watch::Sender<bool>,
    shutdown_rx: watch::Receiver<bool>,
}

impl HealthChecker {
    pub fn new(interval: Duration, router: Arc<Router>) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        Self {
            interval,
            router,
            shutdown_tx,
            shutdown_rx,
        }
    }

    pub async fn start(self: Arc<Self>) {
        let mut ticker = interval(self.interval);
        let mut shutdown_rx = self.shutdown_rx.clone();

        info!(every = ?self.interval, "starting health checker");

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.clone().check_all_backends().await;
                }
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        info!("health checker shutting down");
                        break;
                    }
                }
            }
        }
    }

    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
    }

    async fn check_all_backends(self: Arc<Self>) {
        let mut tasks = Vec::new();

        for backend in self.router.backends() {
            // Occasional sweep so idle pools shrink even for backends
            // that receive no traffic.
            if rand::thread_rng().gen_range(0..PRUNE_ODDS) == 0 {
                backend.pool().prune_expired().await;
            }

            let backend = Arc::clone(backend);
            tasks.push(tokio::spawn(probe_backend(backend)));
        }

        let mut healthy = 0usize;
        let mut unhealthy = 0usize;
        for result in join_all(tasks).await {
            match result {
                Ok(true) => healthy += 1,
                Ok(false) => unhealthy += 1,
                Err(err) => {
                    warn!(error = %err, "health probe task failed");
                    unhealthy += 1;
                }
            }
        }

        debug!(healthy, unhealthy, "health check pass complete");
    }
}

async fn probe_backend(backend: Arc<Backend>) -> bool {
    let was_alive = backend.is_alive();

    let alive = match socket::dial_tcp(backend.addr, PROBE_TIMEOUT).await {
        Ok(mut stream) => stream.write_all(PROBE_PAYLOAD).await.is_ok(),
        Err(err) => {
            debug!(backend = %backend.addr, error = %err, "health probe dial failed");
            false
        }
    };

    backend.set_alive(alive);
    backend.record_health_check().await;

    if alive && !was_alive {
        info!(backend = %backend.addr, "backend is healthy again");
    } else if !alive && was_alive {
        warn!(backend = %backend.addr, "backend marked unhealthy");
    }

    alive
}
