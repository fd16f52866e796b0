// src/main.rs
use anyhow::Result;
use std::sync::Arc;
use tracing::info;

mod config;
mod server;
mod proxy;
mod load_balancer;
mod health;

use crate::{
    health::HealthChecker,
    load_balancer::Router,
    proxy::Proxy,
    server::ServerBuilder,
};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("tcp_load_balancer=debug".parse()?),
        )
        .init();

    // Load configuration from the environment
    let settings = Arc::new(config::load_settings()?);
    info!(
        listen = %settings.listen,
        mode = ?settings.mode,
        backends = ?settings.backends,
        "starting load balancer"
    );

    // Fixed backend set with one connection pool per backend
    let router = Arc::new(Router::new(&settings));

    // Start the active health-check loop
    let checker = Arc::new(HealthChecker::new(settings.health_every, router.clone()));
    tokio::spawn(checker.clone().start());

    // Session pipeline
    let proxy = Arc::new(Proxy::new(settings.clone(), router));

    // Accept loop; returns on SIGINT/SIGTERM
    let server = ServerBuilder::new(settings.listen).with_proxy(proxy).bind()?;
    server.run().await?;

    checker.shutdown();
    Ok(())
}
