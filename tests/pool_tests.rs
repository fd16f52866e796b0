// tests/pool_tests.rs
//! Connection pool invariants against real loopback sockets.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tcp_load_balancer::proxy::ConnectionPool;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::time::{sleep, timeout};

/// Wait until the backend's accept task has observed `expected`
/// connections. `connect` completes from the kernel backlog before the
/// listener task runs `accept()`, so the counter lags the dial.
async fn settle_accepted(accepted: &AtomicUsize, expected: usize) {
    timeout(Duration::from_secs(2), async {
        while accepted.load(Ordering::SeqCst) < expected {
            sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("backend never observed the expected accepts");
}

/// Echo server that keeps accepted connections open. Returns the bound
/// address and a counter of accepted connections.
async fn spawn_echo_backend() -> (SocketAddr, Arc<AtomicUsize>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let accepted = Arc::new(AtomicUsize::new(0));
    let counter = accepted.clone();

    tokio::spawn(async move {
        loop {
            let Ok((mut stream, _)) = listener.accept().await else {
                break;
            };
            counter.fetch_add(1, Ordering::SeqCst);
            tokio::spawn(async move {
                let mut buf = [0u8; 1024];
                loop {
                    match stream.read(&mut buf).await {
                        Ok(0) | Err(_) => break,
                        Ok(n) => {
                            if stream.write_all(&buf[..n]).await.is_err() {
                                break;
                            }
                        }
                    }
                }
            });
        }
    });

    (addr, accepted)
}

/// Server that accepts and immediately drops every connection.
async fn spawn_slamming_backend() -> (SocketAddr, Arc<AtomicUsize>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let accepted = Arc::new(AtomicUsize::new(0));
    let counter = accepted.clone();

    tokio::spawn(async move {
        loop {
            let Ok((stream, _)) = listener.accept().await else {
                break;
            };
            counter.fetch_add(1, Ordering::SeqCst);
            drop(stream);
        }
    });

    (addr, accepted)
}

fn make_pool(addr: SocketAddr, max_size: usize, idle_timeout: Duration) -> ConnectionPool {
    ConnectionPool::new(addr, max_size, Duration::from_millis(500), idle_timeout)
}

#[tokio::test]
async fn get_after_put_reuses_the_same_connection() {
    let (addr, accepted) = spawn_echo_backend().await;
    let pool = make_pool(addr, 4, Duration::from_secs(60));

    let conn = pool.get().await.unwrap();
    let local = conn.local_addr().unwrap();
    pool.put(conn).await;

    assert_eq!(pool.idle_len().await, 1);
    assert_eq!(pool.total_open().await, 1);

    let conn = pool.get().await.unwrap();
    assert_eq!(conn.local_addr().unwrap(), local);
    assert_eq!(accepted.load(Ordering::SeqCst), 1);
    assert_eq!(pool.idle_len().await, 0);
    assert_eq!(pool.total_open().await, 1);
}

#[tokio::test]
async fn put_beyond_capacity_closes_the_connection() {
    let (addr, _accepted) = spawn_echo_backend().await;
    let pool = make_pool(addr, 1, Duration::from_secs(60));

    let first = pool.get().await.unwrap();
    // Saturated now, so this one is a burst dial.
    let second = pool.get().await.unwrap();
    assert_eq!(pool.total_open().await, 1);

    pool.put(first).await;
    assert_eq!(pool.idle_len().await, 1);

    pool.put(second).await;
    assert_eq!(pool.idle_len().await, 1);
    assert_eq!(pool.total_open().await, 0);
}

#[tokio::test]
async fn expired_idle_connection_is_evicted_on_get() {
    let (addr, accepted) = spawn_echo_backend().await;
    let pool = make_pool(addr, 4, Duration::from_millis(50));

    let conn = pool.get().await.unwrap();
    pool.put(conn).await;
    sleep(Duration::from_millis(120)).await;

    let _conn = pool.get().await.unwrap();
    settle_accepted(&accepted, 2).await;
    assert_eq!(accepted.load(Ordering::SeqCst), 2);
    assert_eq!(pool.total_open().await, 1);
    assert_eq!(pool.idle_len().await, 0);
}

#[tokio::test]
async fn monitor_sweep_prunes_expired_idle_connections() {
    let (addr, _accepted) = spawn_echo_backend().await;
    let pool = make_pool(addr, 4, Duration::from_millis(50));

    let conn = pool.get().await.unwrap();
    pool.put(conn).await;
    sleep(Duration::from_millis(120)).await;

    pool.prune_expired().await;
    assert_eq!(pool.idle_len().await, 0);
    assert_eq!(pool.total_open().await, 0);
}

#[tokio::test]
async fn validation_discards_a_peer_closed_connection() {
    let (addr, accepted) = spawn_slamming_backend().await;
    let pool = make_pool(addr, 4, Duration::from_secs(60));

    let conn = pool.get().await.unwrap();
    pool.put(conn).await;
    // Let the peer's FIN arrive before the next checkout.
    sleep(Duration::from_millis(50)).await;

    let _conn = pool.get().await.unwrap();
    settle_accepted(&accepted, 2).await;
    assert_eq!(accepted.load(Ordering::SeqCst), 2);
    assert_eq!(pool.total_open().await, 1);
}

#[tokio::test]
async fn dial_failure_releases_the_reserved_slot() {
    // Grab a port and free it again so the dial is refused.
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let pool = make_pool(addr, 4, Duration::from_secs(60));
    assert!(pool.get().await.is_err());
    assert_eq!(pool.total_open().await, 0);
}

#[tokio::test]
async fn mark_dead_clamps_the_count_at_zero() {
    let (addr, _accepted) = spawn_echo_backend().await;
    // Zero capacity: every dial is a burst and never counted.
    let pool = make_pool(addr, 0, Duration::from_secs(60));

    let conn = pool.get().await.unwrap();
    pool.mark_dead(conn).await;
    assert_eq!(pool.total_open().await, 0);
}
