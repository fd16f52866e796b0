// ────────────────────────────────
// src/server/builder.rs
// ────────────────────────────────
use crate::proxy::Proxy;
use crate::server::socket;
use anyhow::{Context, Result};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::signal;
use tracing::{info, warn};

/// Builder pattern so `main.rs` can inject the session pipeline.
pub struct ServerBuilder {
    addr: SocketAddr,
    proxy: Option<Arc<Proxy>>,
}

impl ServerBuilder {
    pub fn new(addr: SocketAddr) -> Self {
        Self { addr, proxy: None }
    }

    pub fn with_proxy(mut self, proxy: Arc<Proxy>) -> Self {
        self.proxy = Some(proxy);
        self
    }

    /// Consume the builder and bind the listening socket. Binding is
    /// separate from `run` so callers can learn the bound address first.
    pub fn bind(self) -> Result<Server> {
        let proxy = self.proxy.expect("proxy must be set via with_proxy()");
        let listener = socket::bind_tcp(self.addr)
            .with_context(|| format!("failed to bind {}", self.addr))?;
        Ok(Server { listener, proxy })
    }
}

pub struct Server {
    listener: TcpListener,
    proxy: Arc<Proxy>,
}

impl Server {
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Accept loop: one task per connection, until a shutdown signal.
    ///
    /// Sessions in flight when the signal arrives are abandoned; only the
    /// listener is torn down. Accept errors are non-fatal and the loop
    /// continues after a short pause.
    pub async fn run(self) -> Result<()> {
        info!(addr = %self.local_addr()?, "listening");

        let shutdown = shutdown_signal();
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                accepted = self.listener.accept() => {
                    match accepted {
                        Ok((stream, peer)) => {
                            let proxy = self.proxy.clone();
                            tokio::spawn(async move {
                                proxy.handle(stream, peer).await;
                            });
                        }
                        Err(err) => {
                            warn!(error = %err, "accept error");
                            tokio::time::sleep(Duration::from_millis(100)).await;
                        }
                    }
                }
                _ = &mut shutdown => break,
            }
        }

        info!("shutdown complete");
        Ok(())
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}
