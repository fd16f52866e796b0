// tests/health_tests.rs
//! Active health-check loop against real loopback listeners.

use std::sync::Arc;
use std::time::Duration;
use tcp_load_balancer::health::HealthChecker;
use tcp_load_balancer::load_balancer::{Router, RoundRobinBalancer};
use tcp_load_balancer::proxy::Backend;
use tokio::net::TcpListener;
use tokio::time::sleep;

fn make_backend(addr: std::net::SocketAddr) -> Arc<Backend> {
    Arc::new(Backend::new(
        addr,
        4,
        Duration::from_millis(500),
        Duration::from_secs(60),
    ))
}

#[tokio::test]
async fn probe_revives_and_buries_a_backend() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let backend = make_backend(addr);
    backend.set_alive(false);
    let router = Arc::new(Router::with_balancer(
        vec![backend.clone()],
        Arc::new(RoundRobinBalancer::new()),
    ));

    let checker = Arc::new(HealthChecker::new(Duration::from_millis(50), router));
    let handle = tokio::spawn(checker.clone().start());

    // The listener accepts probe dials, so the backend comes back.
    sleep(Duration::from_millis(300)).await;
    assert!(backend.is_alive());
    assert!(backend.last_health_check().await.is_some());

    // Kill the listener; the next probes are refused.
    drop(listener);
    sleep(Duration::from_millis(300)).await;
    assert!(!backend.is_alive());

    checker.shutdown();
    let _ = handle.await;
}

#[tokio::test]
async fn dead_port_is_marked_unhealthy_on_the_first_tick() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let backend = make_backend(addr);
    assert!(backend.is_alive(), "backends start out assumed alive");
    let router = Arc::new(Router::with_balancer(
        vec![backend.clone()],
        Arc::new(RoundRobinBalancer::new()),
    ));

    let checker = Arc::new(HealthChecker::new(Duration::from_millis(50), router));
    let handle = tokio::spawn(checker.clone().start());

    sleep(Duration::from_millis(300)).await;
    assert!(!backend.is_alive());

    checker.shutdown();
    let _ = handle.await;
}
