//! TCP connect probing: port lists, the dialer seam, single probes and chunk scans.

use async_trait::async_trait;
use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::time::Duration;
use sweeper_core::{Limiter, ProbeError, ScanResult};
use tokio::net::TcpStream;
use tokio::time::timeout;

pub mod chunk;

pub use chunk::{scan_chunk, scan_chunk_into, ChunkOptions};

/// Parse a comma-separated port list (e.g. "22,80,443").
///
/// Tokens that do not parse, or fall outside 1-65535, are dropped. Order and duplicates are
/// kept as given. An empty input yields an empty list.
pub fn parse_ports(spec: &str) -> Vec<u16> {
    spec.split(',')
        .filter_map(|part| part.trim().parse::<u32>().ok())
        .filter(|&p| (1..=65535).contains(&p))
        .map(|p| p as u16)
        .collect()
}

/// Opens a connection to decide whether a port is open.
#[async_trait]
pub trait Dialer: Send + Sync {
    async fn dial(&self, addr: SocketAddr, timeout: Duration) -> Result<(), ProbeError>;
}

/// Real TCP connect dialer. The stream is dropped as soon as the handshake completes.
#[derive(Debug, Default, Clone, Copy)]
pub struct TcpDialer;

#[async_trait]
impl Dialer for TcpDialer {
    async fn dial(&self, addr: SocketAddr, limit: Duration) -> Result<(), ProbeError> {
        connect_within(limit, TcpStream::connect(addr)).await
    }
}

/// Run a connect attempt under `limit`. Running out of time is [`ProbeError::TimedOut`].
pub async fn connect_within<T>(limit: Duration, connect: impl Future<Output = io::Result<T>>) -> Result<(), ProbeError> {
    match timeout(limit, connect).await {
        Ok(Ok(_stream)) => Ok(()),
        Ok(Err(e)) => Err(e.into()),
        Err(_elapsed) => Err(ProbeError::TimedOut),
    }
}

/// Probe one (ip, port) pair. Waits for a limiter token first; the token is held only for
/// the duration of the dial.
pub async fn probe(
    dialer: &dyn Dialer,
    ip: &str,
    port: u16,
    timeout_per_port: Duration,
    limiter: &Limiter,
) -> ScanResult {
    let _token = limiter.acquire().await;
    let addr = match ip.parse::<std::net::Ipv4Addr>() {
        Ok(v4) => SocketAddr::from((v4, port)),
        Err(_) => return ScanResult::closed(ip, port, ProbeError::InvalidTarget(ip.to_string())),
    };
    match dialer.dial(addr, timeout_per_port).await {
        Ok(()) => ScanResult::open(ip, port),
        Err(e) => ScanResult::closed(ip, port, e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct Fixed(Result<(), ProbeError>);

    #[async_trait]
    impl Dialer for Fixed {
        async fn dial(&self, _addr: SocketAddr, _timeout: Duration) -> Result<(), ProbeError> {
            self.0.clone()
        }
    }

    #[test]
    fn parse_drops_invalid_tokens() {
        assert_eq!(parse_ports("80,443,invalid,65536"), vec![80, 443]);
        assert_eq!(parse_ports("0,1,65535,-5"), vec![1, 65535]);
    }

    #[test]
    fn parse_empty_is_empty() {
        assert!(parse_ports("").is_empty());
        assert!(parse_ports(",,").is_empty());
    }

    #[test]
    fn parse_keeps_order_and_duplicates() {
        assert_eq!(parse_ports("443, 22,443"), vec![443, 22, 443]);
    }

    #[tokio::test]
    async fn probe_open_and_closed() {
        let limiter = Limiter::new(1);
        let r = probe(&Fixed(Ok(())), "127.0.0.1", 80, Duration::from_secs(1), &limiter).await;
        assert!(r.open);
        assert!(r.error.is_none());

        let r = probe(&Fixed(Err(ProbeError::Refused)), "127.0.0.1", 81, Duration::from_secs(1), &limiter).await;
        assert!(!r.open);
        assert_eq!(r.error, Some(ProbeError::Refused));
        assert_eq!(limiter.available(), 1);
    }

    #[tokio::test]
    async fn probe_rejects_malformed_ip_without_dialing() {
        struct Counting(AtomicUsize);
        #[async_trait]
        impl Dialer for Counting {
            async fn dial(&self, _addr: SocketAddr, _timeout: Duration) -> Result<(), ProbeError> {
                self.0.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        }
        let dialer = Arc::new(Counting(AtomicUsize::new(0)));
        let limiter = Limiter::new(1);
        let r = probe(dialer.as_ref(), "not-an-ip", 80, Duration::from_secs(1), &limiter).await;
        assert!(!r.open);
        assert!(matches!(r.error, Some(ProbeError::InvalidTarget(_))));
        assert_eq!(dialer.0.load(Ordering::SeqCst), 0);
        assert_eq!(limiter.available(), 1);
    }

    /// A connect attempt that never completes, bounded the same way as [`TcpDialer`].
    struct Hanging;

    #[async_trait]
    impl Dialer for Hanging {
        async fn dial(&self, _addr: SocketAddr, limit: Duration) -> Result<(), ProbeError> {
            connect_within(limit, std::future::pending::<io::Result<()>>()).await
        }
    }

    #[tokio::test]
    async fn connect_within_maps_outcomes() {
        let limit = Duration::from_millis(10);
        assert_eq!(connect_within(limit, async { Ok::<_, io::Error>(()) }).await, Ok(()));
        let refused = async { Err::<(), _>(io::Error::from(io::ErrorKind::ConnectionRefused)) };
        assert_eq!(connect_within(limit, refused).await, Err(ProbeError::Refused));
        assert_eq!(
            connect_within(limit, std::future::pending::<io::Result<()>>()).await,
            Err(ProbeError::TimedOut)
        );
    }

    #[tokio::test]
    async fn timed_out_dial_returns_its_token() {
        let limiter = Limiter::new(2);
        let r = probe(&Hanging, "10.0.0.1", 80, Duration::from_millis(10), &limiter).await;
        assert!(!r.open);
        assert_eq!(r.error, Some(ProbeError::TimedOut));
        assert_eq!(limiter.available(), limiter.capacity());
    }

    #[tokio::test]
    async fn tcp_dialer_against_local_listener() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let limiter = Limiter::new(4);
        let r = probe(&TcpDialer, "127.0.0.1", port, Duration::from_secs(2), &limiter).await;
        assert!(r.open, "{r:?}");

        drop(listener);
        let r = probe(&TcpDialer, "127.0.0.1", port, Duration::from_secs(2), &limiter).await;
        assert!(!r.open);
        assert!(r.error.is_some());
    }
}
