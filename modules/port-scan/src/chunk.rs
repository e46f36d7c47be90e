//! Scan one chunk of addresses across every requested port.
//!
//! Each (ip, port) pair becomes its own task; all tasks of a chunk share one [`Limiter`].
//! The bound is per chunk: running several chunks at once multiplies the number of
//! in-flight connects by the number of chunks. Results are delivered in completion order.

use crate::{probe, Dialer};
use std::sync::Arc;
use std::time::Duration;
use sweeper_core::{int_to_address, Chunk, Limiter, ScanResult};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy)]
pub struct ChunkOptions {
    pub timeout: Duration,
    pub max_concurrent: usize,
}

/// Start scanning `chunk` in the background and return the result stream.
///
/// The receiver yields exactly `chunk.len() * ports.len()` results and then closes.
pub fn scan_chunk(
    dialer: Arc<dyn Dialer>,
    chunk: Chunk,
    ports: Arc<[u16]>,
    opts: ChunkOptions,
) -> mpsc::Receiver<ScanResult> {
    let (tx, rx) = mpsc::channel::<ScanResult>(opts.max_concurrent.max(1));
    tokio::spawn(scan_chunk_into(dialer, chunk, ports, opts, tx));
    rx
}

/// Scan `chunk` into a caller-owned channel, returning once every probe has finished.
///
/// The caller must keep draining `tx`'s receiver while this runs.
pub async fn scan_chunk_into<T>(
    dialer: Arc<dyn Dialer>,
    chunk: Chunk,
    ports: Arc<[u16]>,
    opts: ChunkOptions,
    tx: mpsc::Sender<T>,
) where
    T: From<ScanResult> + Send + 'static,
{
    let limiter = Limiter::new(opts.max_concurrent);
    debug!(%chunk, probes = chunk.len() * ports.len() as u64, "scanning chunk");

    let mut tasks = JoinSet::new();
    for n in chunk.addresses() {
        let ip: Arc<str> = int_to_address(n).into();
        for &port in ports.iter() {
            let tx = tx.clone();
            let dialer = dialer.clone();
            let limiter = limiter.clone();
            let ip = ip.clone();
            tasks.spawn(async move {
                let result = probe(dialer.as_ref(), &ip, port, opts.timeout, &limiter).await;
                // receiver gone means the consumer gave up on this chunk
                let _ = tx.send(T::from(result)).await;
            });
        }
    }
    drop(tx);

    while let Some(joined) = tasks.join_next().await {
        if let Err(e) = joined {
            warn!(%chunk, error = %e, "probe task did not complete");
        }
    }
    debug!(%chunk, free = limiter.available(), "chunk finished");
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::HashSet;
    use std::net::SocketAddr;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use sweeper_core::{address_to_int, ProbeError};

    struct AlwaysOpen;

    #[async_trait]
    impl Dialer for AlwaysOpen {
        async fn dial(&self, _addr: SocketAddr, _timeout: Duration) -> Result<(), ProbeError> {
            Ok(())
        }
    }

    /// Open only on even ports; tracks the peak number of concurrent dials.
    #[derive(Default)]
    struct Tracking {
        current: AtomicUsize,
        peak: AtomicUsize,
    }

    #[async_trait]
    impl Dialer for Tracking {
        async fn dial(&self, addr: SocketAddr, _timeout: Duration) -> Result<(), ProbeError> {
            let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(5)).await;
            self.current.fetch_sub(1, Ordering::SeqCst);
            if addr.port() % 2 == 0 { Ok(()) } else { Err(ProbeError::Refused) }
        }
    }

    fn opts(max_concurrent: usize) -> ChunkOptions {
        ChunkOptions { timeout: Duration::from_millis(1), max_concurrent }
    }

    #[tokio::test]
    async fn two_addresses_one_port_all_open() {
        let chunk = Chunk {
            start: address_to_int("192.168.1.1").unwrap(),
            end: address_to_int("192.168.1.2").unwrap(),
        };
        let mut rx = scan_chunk(Arc::new(AlwaysOpen), chunk, Arc::from(vec![80u16]), opts(2));
        let mut got = Vec::new();
        while let Some(r) = rx.recv().await {
            got.push(r);
        }
        assert_eq!(got.len(), 2);
        assert!(got.iter().all(|r| r.open && r.error.is_none()));
        let ips: HashSet<_> = got.iter().map(|r| r.ip.as_str()).collect();
        assert_eq!(ips, HashSet::from(["192.168.1.1", "192.168.1.2"]));
    }

    #[tokio::test]
    async fn every_pair_probed_once_within_limit() {
        let dialer = Arc::new(Tracking::default());
        let chunk = Chunk { start: 100, end: 109 };
        let ports: Arc<[u16]> = Arc::from(vec![1u16, 2, 3, 4]);
        let mut rx = scan_chunk(dialer.clone(), chunk, ports, opts(3));
        let mut seen = HashSet::new();
        let mut open = 0;
        while let Some(r) = rx.recv().await {
            assert!(seen.insert((r.ip.clone(), r.port)), "duplicate {r:?}");
            if r.open { open += 1; }
        }
        assert_eq!(seen.len(), 40);
        assert_eq!(open, 20);
        assert!(dialer.peak.load(Ordering::SeqCst) <= 3);
    }

    /// Panics on port 81, answers open everywhere else.
    struct PanicsOn81;

    #[async_trait]
    impl Dialer for PanicsOn81 {
        async fn dial(&self, addr: SocketAddr, _timeout: Duration) -> Result<(), ProbeError> {
            if addr.port() == 81 {
                panic!("dialer failure on {addr}");
            }
            Ok(())
        }
    }

    #[tokio::test]
    async fn panicking_task_loses_only_its_result() {
        let chunk = Chunk { start: 10, end: 13 };
        let mut rx = scan_chunk(Arc::new(PanicsOn81), chunk, Arc::from(vec![80u16, 81]), opts(2));
        let mut got = Vec::new();
        while let Some(r) = rx.recv().await {
            got.push(r);
        }
        // 4 addresses x 2 ports, the 4 probes of port 81 are lost
        assert_eq!(got.len(), 4);
        assert!(got.iter().all(|r| r.port == 80 && r.open));
    }

    #[tokio::test]
    async fn no_ports_means_no_work() {
        let mut rx = scan_chunk(Arc::new(AlwaysOpen), Chunk { start: 1, end: 50 }, Arc::from(Vec::<u16>::new()), opts(4));
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn delivers_into_converting_channel() {
        #[derive(Debug)]
        struct Wrapped(ScanResult);
        impl From<ScanResult> for Wrapped {
            fn from(r: ScanResult) -> Self { Wrapped(r) }
        }
        let (tx, mut rx) = mpsc::channel::<Wrapped>(4);
        let driver = tokio::spawn(scan_chunk_into(Arc::new(AlwaysOpen), Chunk { start: 7, end: 9 }, Arc::from(vec![22u16]), opts(1), tx));
        let mut n = 0;
        while let Some(Wrapped(r)) = rx.recv().await {
            assert!(r.open);
            n += 1;
        }
        driver.await.unwrap();
        assert_eq!(n, 3);
    }
}
