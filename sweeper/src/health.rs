//! Liveness endpoint: `GET /health` answers 200, everything else 404.

use std::io;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tokio::time::timeout;
use tracing::{debug, warn};

const OK: &str = "HTTP/1.1 200 OK\r\ncontent-type: text/plain\r\ncontent-length: 2\r\nconnection: close\r\n\r\nok";
const NOT_FOUND: &str = "HTTP/1.1 404 Not Found\r\ncontent-length: 0\r\nconnection: close\r\n\r\n";

/// Serve until `stop` turns true or its sender is dropped.
pub async fn serve_health(listener: TcpListener, mut stop: watch::Receiver<bool>) {
    loop {
        if *stop.borrow_and_update() {
            break;
        }
        tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok((sock, peer)) => {
                    tokio::spawn(async move {
                        if let Err(e) = respond(sock).await {
                            debug!(%peer, error = %e, "health request failed");
                        }
                    });
                }
                Err(e) => warn!(error = %e, "health listener accept failed"),
            },
            changed = stop.changed() => {
                if changed.is_err() { break; }
            }
        }
    }
    debug!("health endpoint stopped");
}

async fn respond(mut sock: TcpStream) -> io::Result<()> {
    let mut buf = [0u8; 1024];
    let n = timeout(Duration::from_secs(5), sock.read(&mut buf))
        .await
        .map_err(|_| io::Error::from(io::ErrorKind::TimedOut))??;
    let req = String::from_utf8_lossy(&buf[..n]);
    let mut parts = req.lines().next().unwrap_or("").split_whitespace();
    let reply = match (parts.next(), parts.next()) {
        (Some("GET"), Some("/health")) => OK,
        _ => NOT_FOUND,
    };
    sock.write_all(reply.as_bytes()).await?;
    sock.shutdown().await
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn request(addr: std::net::SocketAddr, line: &str) -> String {
        let mut sock = TcpStream::connect(addr).await.unwrap();
        sock.write_all(format!("{line}\r\nHost: localhost\r\n\r\n").as_bytes()).await.unwrap();
        let mut out = String::new();
        sock.read_to_string(&mut out).await.unwrap();
        out
    }

    #[tokio::test]
    async fn answers_health_and_stops() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (stop_tx, stop_rx) = watch::channel(false);
        let server = tokio::spawn(serve_health(listener, stop_rx));

        assert!(request(addr, "GET /health HTTP/1.1").await.starts_with("HTTP/1.1 200 OK"));
        assert!(request(addr, "GET / HTTP/1.1").await.starts_with("HTTP/1.1 404"));
        assert!(request(addr, "POST /health HTTP/1.1").await.starts_with("HTTP/1.1 404"));

        stop_tx.send(true).unwrap();
        server.await.unwrap();
        assert!(TcpStream::connect(addr).await.is_err());
    }
}
