//! Standalone mock TCP backend for manual testing.
//! Run: cargo run --bin test_backend -- <port> [name]
//!
//! Answers `pong\r\n\r\n` to any chunk containing `ping` (the balancer's
//! health probe) and otherwise echoes one identification line per chunk.

use chrono::Local;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

const CONN_DEADLINE: Duration = Duration::from_secs(300);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let port: u16 = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "5001".into())
        .parse()?;
    let name = std::env::args()
        .nth(2)
        .or_else(|| std::env::var("BACKEND_NAME").ok())
        .unwrap_or_else(|| format!("backend-{port}"));

    let listener = TcpListener::bind(("0.0.0.0", port)).await?;
    let pid = std::process::id();

    println!("Mock TCP backend '{name}' on port {port} (pid {pid})");
    println!("Press Ctrl+C to stop");

    loop {
        let (stream, peer) = listener.accept().await?;
        let name = name.clone();
        tokio::spawn(async move {
            if let Err(err) = serve(stream, &name, pid).await {
                eprintln!("[{name}] connection from {peer} failed: {err}");
            }
        });
    }
}

async fn serve(mut stream: TcpStream, name: &str, pid: u32) -> std::io::Result<()> {
    let mut buf = [0u8; 1024];

    loop {
        let n = match tokio::time::timeout(CONN_DEADLINE, stream.read(&mut buf)).await {
            Ok(Ok(0)) | Err(_) => return Ok(()),
            Ok(Ok(n)) => n,
            Ok(Err(err)) => return Err(err),
        };

        if buf[..n].windows(4).any(|window| window == b"ping") {
            stream.write_all(b"pong\r\n\r\n").await?;
            return Ok(());
        }

        let reply = format!(
            "HOST: {} | PID: {} | TIME: {}\n",
            name,
            pid,
            Local::now().format("%Y-%m-%d %H:%M:%S")
        );
        tokio::time::timeout(CONN_DEADLINE, stream.write_all(reply.as_bytes()))
            .await
            .map_err(|_| std::io::Error::new(std::io::ErrorKind::TimedOut, "write timed out"))??;
    }
}
