// tests/load_balancer_tests.rs
//! Routing policy behavior over a fixed backend set. Backends here are
//! never dialed, so placeholder addresses are fine.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tcp_load_balancer::load_balancer::{Router, RoundRobinBalancer, StickyBalancer};
use tcp_load_balancer::proxy::Backend;

fn make_backends(n: usize) -> Vec<Arc<Backend>> {
    (0..n)
        .map(|i| {
            let addr: SocketAddr = format!("127.0.0.1:{}", 6000 + i).parse().unwrap();
            Arc::new(Backend::new(
                addr,
                4,
                Duration::from_millis(200),
                Duration::from_secs(60),
            ))
        })
        .collect()
}

#[tokio::test]
async fn round_robin_is_fair() {
    let backends = make_backends(4);
    let router = Router::with_balancer(backends, Arc::new(RoundRobinBalancer::new()));

    let mut counts: HashMap<SocketAddr, usize> = HashMap::new();
    for _ in 0..100 {
        let chosen = router.choose("192.168.0.1").await.unwrap();
        *counts.entry(chosen.addr).or_default() += 1;
    }

    assert_eq!(counts.len(), 4);
    for (_, count) in counts {
        assert_eq!(count, 25);
    }
}

#[tokio::test]
async fn round_robin_skips_dead_backends() {
    let backends = make_backends(3);
    backends[1].set_alive(false);
    let dead_addr = backends[1].addr;
    let router = Router::with_balancer(backends, Arc::new(RoundRobinBalancer::new()));

    let mut counts: HashMap<SocketAddr, usize> = HashMap::new();
    for _ in 0..30 {
        let chosen = router.choose("192.168.0.1").await.unwrap();
        assert_ne!(chosen.addr, dead_addr);
        *counts.entry(chosen.addr).or_default() += 1;
    }

    assert_eq!(counts.len(), 2);
    for (_, count) in counts {
        assert_eq!(count, 15);
    }
}

#[tokio::test]
async fn sticky_same_key_maps_to_same_backend() {
    let backends = make_backends(5);
    let router = Router::with_balancer(backends, Arc::new(StickyBalancer));

    let first = router.choose("10.1.2.3").await.unwrap().addr;
    for _ in 0..20 {
        assert_eq!(router.choose("10.1.2.3").await.unwrap().addr, first);
    }
}

#[tokio::test]
async fn sticky_never_picks_a_dead_backend() {
    let backends = make_backends(4);
    backends[2].set_alive(false);
    let dead_addr = backends[2].addr;
    let router = Router::with_balancer(backends, Arc::new(StickyBalancer));

    for i in 0..50 {
        let chosen = router.choose(&format!("10.0.0.{i}")).await.unwrap();
        assert!(chosen.is_alive());
        assert_ne!(chosen.addr, dead_addr);
    }
}

#[tokio::test]
async fn all_dead_yields_no_backend() {
    let backends = make_backends(3);
    for backend in &backends {
        backend.set_alive(false);
    }
    let router = Router::with_balancer(backends, Arc::new(RoundRobinBalancer::new()));

    for _ in 0..10 {
        assert!(router.choose("192.168.0.1").await.is_none());
    }
}

#[tokio::test]
async fn balancer_names() {
    let router = Router::with_balancer(make_backends(1), Arc::new(RoundRobinBalancer::new()));
    assert_eq!(router.balancer_name(), "round_robin");

    let router = Router::with_balancer(make_backends(1), Arc::new(StickyBalancer));
    assert_eq!(router.balancer_name(), "sticky");
}
