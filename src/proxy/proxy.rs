// ────────────────────────────────
// src/proxy/proxy.rs
// Per-connection session pipeline: route, acquire, relay, dispose.
// ────────────────────────────────

use crate::config::Settings;
use crate::load_balancer::Router;
use crate::proxy::pool::PoolError;
use std::io;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tracing::{debug, warn};
use uuid::Uuid;

/// Session-level failures. All of these stay local to one client's
/// session: they are logged and folded into pool/liveness state, never
/// surfaced to the accept loop and never retried against another backend.
#[derive(Debug, thiserror::Error)]
pub enum ProxyError {
    #[error("no backend available")]
    NoBackendAvailable,

    #[error("backend dial failed: {0}")]
    DialFailed(#[from] PoolError),

    #[error("relay failed: {0}")]
    RelayFailed(#[source] io::Error),

    #[error("proxy header write failed: {0}")]
    ProbeWriteFailed(#[source] io::Error),
}

pub struct Proxy {
    settings: Arc<Settings>,
    router: Arc<Router>,
}

impl Proxy {
    pub fn new(settings: Arc<Settings>, router: Arc<Router>) -> Self {
        Self { settings, router }
    }

    pub fn router(&self) -> &Router {
        &self.router
    }

    /// Entry point for one accepted client connection. Consumes the
    /// stream; the client socket closes when this returns, whatever the
    /// outcome.
    pub async fn handle(&self, client: TcpStream, peer: SocketAddr) {
        let session = Uuid::new_v4();
        if let Err(err) = self.run_session(client, peer, session).await {
            match err {
                ProxyError::NoBackendAvailable => {
                    warn!(%peer, %session, "no alive backends, dropping client")
                }
                other => warn!(%peer, %session, error = %other, "session failed"),
            }
        }
    }

    async fn run_session(
        &self,
        mut client: TcpStream,
        peer: SocketAddr,
        session: Uuid,
    ) -> Result<(), ProxyError> {
        // Route on the client's IP with the port stripped.
        let client_ip = peer.ip();
        let backend = self
            .router
            .choose(&client_ip.to_string())
            .await
            .ok_or(ProxyError::NoBackendAvailable)?;
        debug!(%session, client = %client_ip, backend = %backend.addr, "chose backend");

        let mut upstream = match backend.pool().get().await {
            Ok(stream) => stream,
            Err(err) => {
                // Passive health signal; the next probe may revive it.
                backend.set_alive(false);
                return Err(err.into());
            }
        };

        if self.settings.proxy_v1 {
            if let Err(err) = self.write_proxy_header(&mut upstream, client_ip).await {
                backend.pool().mark_dead(upstream).await;
                return Err(ProxyError::ProbeWriteFailed(err));
            }
        }

        let relay = relay_streams(&mut client, &mut upstream);
        let first_result = match self.settings.io_timeout {
            Some(deadline) => match tokio::time::timeout(deadline, relay).await {
                Ok(result) => result,
                Err(_) => Err(io::Error::new(
                    io::ErrorKind::TimedOut,
                    "relay deadline exceeded",
                )),
            },
            None => relay.await,
        };

        // Tell the client we are done; the backend side stays open so the
        // pool decision below can keep the connection.
        let _ = client.shutdown().await;

        match first_result {
            Ok(()) => {
                backend.pool().put(upstream).await;
                Ok(())
            }
            Err(err) => {
                backend.pool().mark_dead(upstream).await;
                Err(ProxyError::RelayFailed(err))
            }
        }
    }

    /// PROXY protocol v1 line, written before any payload bytes. Bounded
    /// by the I/O timeout when one is configured.
    async fn write_proxy_header(
        &self,
        upstream: &mut TcpStream,
        client_ip: IpAddr,
    ) -> io::Result<()> {
        let header = format!("PROXY TCP4 {client_ip} 0 0 0\r\n");
        let write = upstream.write_all(header.as_bytes());
        match self.settings.io_timeout {
            Some(deadline) => match tokio::time::timeout(deadline, write).await {
                Ok(result) => result,
                Err(_) => Err(io::Error::new(
                    io::ErrorKind::TimedOut,
                    "proxy header write timed out",
                )),
            },
            None => write.await,
        }
    }
}

/// Race the two copy directions and report the first to finish: `Ok` on a
/// clean EOF, `Err` otherwise. The slower direction is cancelled rather
/// than awaited, and neither stream is shut down here so a cleanly-ended
/// backend connection remains reusable.
async fn relay_streams(client: &mut TcpStream, upstream: &mut TcpStream) -> io::Result<()> {
    let (mut client_rd, mut client_wr) = client.split();
    let (mut upstream_rd, mut upstream_wr) = upstream.split();

    let client_to_backend = tokio::io::copy(&mut client_rd, &mut upstream_wr);
    let backend_to_client = tokio::io::copy(&mut upstream_rd, &mut client_wr);

    tokio::select! {
        result = client_to_backend => result.map(|_| ()),
        result = backend_to_client => result.map(|_| ()),
    }
}
