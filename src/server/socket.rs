// ────────────────────────────────
// src/server/socket.rs
// Shared socket setup: listener binding and tuned outbound dials.
// ────────────────────────────────
use std::io;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::{TcpListener, TcpSocket, TcpStream};

/// Send/receive buffer size applied to outbound dials. Larger buffers
/// help throughput under high RTT; this mirrors the listener side's OS
/// defaults rather than correctness.
const SOCKET_BUF_SIZE: u32 = 1 << 20; // 1 MiB

const LISTEN_BACKLOG: u32 = 1024;

/// Bind the listening socket with address (and, on unix, port) reuse.
pub fn bind_tcp(addr: SocketAddr) -> io::Result<TcpListener> {
    let socket = new_socket(addr)?;
    socket.set_reuseaddr(true)?;
    #[cfg(unix)]
    socket.set_reuseport(true)?;
    socket.bind(addr)?;
    socket.listen(LISTEN_BACKLOG)
}

/// Dial a backend within `timeout`, with Nagle disabled and enlarged
/// kernel buffers. Used by both the connection pool and the health
/// checker so every outbound socket is tuned the same way.
pub async fn dial_tcp(addr: SocketAddr, timeout: Duration) -> io::Result<TcpStream> {
    let socket = new_socket(addr)?;
    socket.set_send_buffer_size(SOCKET_BUF_SIZE)?;
    socket.set_recv_buffer_size(SOCKET_BUF_SIZE)?;
    let stream = tokio::time::timeout(timeout, socket.connect(addr))
        .await
        .map_err(|_| io::Error::new(io::ErrorKind::TimedOut, "connect timed out"))??;
    stream.set_nodelay(true)?;
    Ok(stream)
}

fn new_socket(addr: SocketAddr) -> io::Result<TcpSocket> {
    if addr.is_ipv4() {
        TcpSocket::new_v4()
    } else {
        TcpSocket::new_v6()
    }
}
