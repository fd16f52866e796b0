// src/proxy/pool.rs
//! Per-backend connection pool. Idle connections are kept in LIFO order,
//! validated with a short non-consuming peek before reuse, and pruned
//! once they outlive the idle timeout.

use crate::server::socket;
use std::io;
use std::net::SocketAddr;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio::time::timeout;
use tracing::debug;

/// Read deadline for the reuse-validation probe. A quiet timeout is the
/// success case: the peer is still there and has sent nothing unexpected.
const VALIDATE_TIMEOUT: Duration = Duration::from_millis(1);

#[derive(Debug, Error)]
pub enum PoolError {
    #[error("dial {addr} failed: {source}")]
    DialFailed {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },
}

#[derive(Debug)]
struct PooledConn {
    stream: TcpStream,
    last_used: Instant,
}

#[derive(Debug, Default)]
struct PoolInner {
    /// Most-recently-returned connection sits at the back.
    idle: Vec<PooledConn>,
    /// Idle plus checked-out connections. Advisory: burst dials made
    /// while the pool is saturated are not counted here.
    total_open: usize,
}

/// Bounded cache of reusable connections to a single backend.
#[derive(Debug)]
pub struct ConnectionPool {
    addr: SocketAddr,
    max_size: usize,
    dial_timeout: Duration,
    idle_timeout: Duration,
    inner: Mutex<PoolInner>,
}

enum GetAction {
    Validate(TcpStream),
    DialReserved,
    DialBurst,
}

impl ConnectionPool {
    pub fn new(
        addr: SocketAddr,
        max_size: usize,
        dial_timeout: Duration,
        idle_timeout: Duration,
    ) -> Self {
        Self {
            addr,
            max_size,
            dial_timeout,
            idle_timeout,
            inner: Mutex::new(PoolInner::default()),
        }
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Check out a connection: reuse a validated idle one, dial a new one
    /// against a reserved slot, or burst-dial past the cap.
    ///
    /// Each failed validation shrinks the idle set, so the loop is bounded
    /// and ends in one of the dial paths.
    pub async fn get(&self) -> Result<TcpStream, PoolError> {
        loop {
            let action = {
                let mut inner = self.inner.lock().await;
                self.evict_expired(&mut inner);
                if let Some(pooled) = inner.idle.pop() {
                    GetAction::Validate(pooled.stream)
                } else if inner.total_open < self.max_size {
                    // Reserve the slot before the dial so concurrent
                    // callers cannot oversubscribe it.
                    inner.total_open += 1;
                    GetAction::DialReserved
                } else {
                    GetAction::DialBurst
                }
            };

            match action {
                GetAction::Validate(mut stream) => {
                    if self.validate(&mut stream).await {
                        debug!(backend = %self.addr, "reusing pooled connection");
                        return Ok(stream);
                    }
                    debug!(backend = %self.addr, "pooled connection is dead, discarding");
                    drop(stream);
                    let mut inner = self.inner.lock().await;
                    inner.total_open = inner.total_open.saturating_sub(1);
                }
                GetAction::DialReserved => {
                    return match socket::dial_tcp(self.addr, self.dial_timeout).await {
                        Ok(stream) => {
                            debug!(backend = %self.addr, "opened new pooled connection");
                            Ok(stream)
                        }
                        Err(source) => {
                            let mut inner = self.inner.lock().await;
                            inner.total_open = inner.total_open.saturating_sub(1);
                            Err(PoolError::DialFailed {
                                addr: self.addr,
                                source,
                            })
                        }
                    };
                }
                GetAction::DialBurst => {
                    debug!(backend = %self.addr, "pool saturated, burst dialing");
                    return socket::dial_tcp(self.addr, self.dial_timeout)
                        .await
                        .map_err(|source| PoolError::DialFailed {
                            addr: self.addr,
                            source,
                        });
                }
            }
        }
    }

    /// Return a connection for reuse. When the idle shelf is full the
    /// connection is closed instead and its slot released.
    pub async fn put(&self, stream: TcpStream) {
        let mut inner = self.inner.lock().await;
        if inner.idle.len() < self.max_size {
            inner.idle.push(PooledConn {
                stream,
                last_used: Instant::now(),
            });
        } else {
            drop(stream);
            inner.total_open = inner.total_open.saturating_sub(1);
        }
    }

    /// Close a failed connection and release its slot. The count is
    /// clamped at zero since burst connections were never counted.
    pub async fn mark_dead(&self, stream: TcpStream) {
        debug!(backend = %self.addr, "marking connection dead");
        drop(stream);
        let mut inner = self.inner.lock().await;
        inner.total_open = inner.total_open.saturating_sub(1);
    }

    /// Sweep expired idle connections from the oldest end. Called by the
    /// health monitor so pools shrink even for backends with no traffic.
    pub async fn prune_expired(&self) {
        let mut inner = self.inner.lock().await;
        while inner
            .idle
            .first()
            .map_or(false, |pooled| pooled.last_used.elapsed() > self.idle_timeout)
        {
            let pooled = inner.idle.remove(0);
            drop(pooled);
            inner.total_open = inner.total_open.saturating_sub(1);
            debug!(backend = %self.addr, "pruned expired idle connection");
        }
    }

    pub async fn idle_len(&self) -> usize {
        self.inner.lock().await.idle.len()
    }

    pub async fn total_open(&self) -> usize {
        self.inner.lock().await.total_open
    }

    fn evict_expired(&self, inner: &mut PoolInner) {
        let now = Instant::now();
        let before = inner.idle.len();
        inner
            .idle
            .retain(|pooled| now.duration_since(pooled.last_used) < self.idle_timeout);
        let evicted = before - inner.idle.len();
        if evicted > 0 {
            inner.total_open = inner.total_open.saturating_sub(evicted);
            debug!(backend = %self.addr, evicted, "evicted expired idle connections");
        }
    }

    /// Probe an idle connection without consuming application bytes.
    /// Timing out on the peek means the peer is idle and quiet; EOF, an
    /// error, or readable data all mean it cannot be handed out.
    async fn validate(&self, stream: &mut TcpStream) -> bool {
        let mut buf = [0u8; 1];
        match timeout(VALIDATE_TIMEOUT, stream.peek(&mut buf)).await {
            Err(_) => true,
            Ok(Ok(0)) => false,
            Ok(Ok(_)) => false,
            Ok(Err(_)) => false,
        }
    }
}
