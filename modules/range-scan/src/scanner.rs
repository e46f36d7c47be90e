use crate::sink::{OutputConfig, ResultSink};
use crate::subjects;
use checkpoint::CheckpointStore;
use notify::{deliver, Message, Notifier};
use port_scan::{scan_chunk, scan_chunk_into, ChunkOptions, Dialer};
use std::sync::Arc;
use std::time::Duration;
use sweeper_core::{address_to_int, chunks, int_to_address, Chunk, ScanError, ScanResult};
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, info_span, warn, Instrument};
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct ScanOptions {
    pub start_ip: String,
    pub end_ip: String,
    pub ports: Vec<u16>,
    pub timeout: Duration,
    /// In-flight probe budget of a single chunk.
    pub max_concurrent: usize,
    pub chunk_size: u32,
    /// Launch every chunk at once instead of one after another.
    pub parallel: bool,
    pub output: Option<OutputConfig>,
    /// Keep every probe result in memory, not only the open ones. The list is never
    /// trimmed, so it grows with every pass of [`RangeScanner::run_forever`].
    pub retain_results: bool,
    /// Pause between passes of [`RangeScanner::run_forever`].
    pub pass_interval: Duration,
}

impl Default for ScanOptions {
    fn default() -> Self {
        ScanOptions {
            start_ip: "192.168.1.1".into(),
            end_ip: "192.168.1.10".into(),
            ports: vec![25],
            timeout: Duration::from_secs(2),
            max_concurrent: 1000,
            chunk_size: 1_000_000,
            parallel: false,
            output: None,
            retain_results: false,
            pass_interval: Duration::ZERO,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanState {
    Idle,
    LoadingCheckpoint,
    ChunkScanning,
    Finalizing,
    Done,
    Error,
}

/// Addresses covered so far in the current pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Progress {
    pub completed: u64,
    pub total: u64,
}

impl Progress {
    pub fn fraction(&self) -> f64 {
        if self.total == 0 {
            return 1.0;
        }
        (self.completed as f64 / self.total as f64).min(1.0)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanSummary {
    /// Addresses left to scan after applying the checkpoint.
    pub addresses: u64,
    pub chunks: usize,
    pub probes: u64,
    pub open: Vec<ScanResult>,
    pub resumed_from: Option<String>,
}

enum ScanEvent {
    Probe(ScanResult),
    ChunkDone(Chunk),
}

impl From<ScanResult> for ScanEvent {
    fn from(r: ScanResult) -> Self {
        ScanEvent::Probe(r)
    }
}

/// Drives chunk scans over an address range, committing a checkpoint after each chunk.
pub struct RangeScanner {
    opts: ScanOptions,
    dialer: Arc<dyn Dialer>,
    checkpoints: Box<dyn CheckpointStore>,
    notifier: Arc<dyn Notifier>,
    state: ScanState,
    results: Vec<ScanResult>,
    progress: watch::Sender<Progress>,
}

impl RangeScanner {
    pub fn new(
        opts: ScanOptions,
        dialer: Arc<dyn Dialer>,
        checkpoints: Box<dyn CheckpointStore>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        let (progress, _) = watch::channel(Progress::default());
        RangeScanner { opts, dialer, checkpoints, notifier, state: ScanState::Idle, results: Vec::new(), progress }
    }

    pub fn state(&self) -> ScanState {
        self.state
    }

    pub fn options(&self) -> &ScanOptions {
        &self.opts
    }

    /// Every result recorded so far, across passes, when retention is enabled.
    pub fn results(&self) -> &[ScanResult] {
        &self.results
    }

    pub fn subscribe_progress(&self) -> watch::Receiver<Progress> {
        self.progress.subscribe()
    }

    /// Scan the configured range once, resuming after any stored checkpoint.
    pub async fn run_once(&mut self) -> Result<ScanSummary, ScanError> {
        let span = info_span!("pass", run_id = %Uuid::now_v7());
        self.pass().instrument(span).await
    }

    /// Repeat passes until `stop` reads true or its sender is dropped. The checkpoint is
    /// cleared after every completed pass so the next one covers the whole range again.
    /// Returns the number of completed passes.
    pub async fn run_forever(&mut self, mut stop: watch::Receiver<bool>) -> Result<usize, ScanError> {
        let mut passes = 0;
        loop {
            if *stop.borrow_and_update() {
                break;
            }
            self.run_once().await?;
            passes += 1;
            self.checkpoints.clear()?;
            tokio::select! {
                _ = tokio::time::sleep(self.opts.pass_interval) => {}
                changed = stop.changed() => {
                    if changed.is_err() { break; }
                }
            }
        }
        info!(passes, "stopped repeating scan");
        Ok(passes)
    }

    async fn pass(&mut self) -> Result<ScanSummary, ScanError> {
        let (start, end) = match self.validate_range() {
            Ok(bounds) => bounds,
            Err(e) => {
                self.state = ScanState::Error;
                return Err(e);
            }
        };
        let port_list = self.opts.ports.iter().map(u16::to_string).collect::<Vec<_>>().join(",");
        let body = format!("Starting scan from {} to {} on ports {}", self.opts.start_ip, self.opts.end_ip, port_list);
        info!("{body}");
        deliver(self.notifier.as_ref(), &Message::new(subjects::START, body)).await;

        match self.scan_range(start, end).await {
            Ok(summary) => {
                deliver(self.notifier.as_ref(), &Message::new(subjects::SUMMARY, self.summary_body(&summary))).await;
                self.state = ScanState::Done;
                info!(probes = summary.probes, open = summary.open.len(), chunks = summary.chunks, "scan complete");
                Ok(summary)
            }
            Err(e) => {
                self.state = ScanState::Error;
                error!(error = %e, "scan aborted");
                if e.is_persistence() {
                    warn!("fix the checkpoint or output file and rerun to resume from the last checkpoint");
                }
                deliver(self.notifier.as_ref(), &Message::new(subjects::FAILED, e.to_string())).await;
                Err(e)
            }
        }
    }

    fn validate_range(&self) -> Result<(u32, u32), ScanError> {
        let start = address_to_int(&self.opts.start_ip)?;
        let end = address_to_int(&self.opts.end_ip)?;
        if start > end {
            return Err(ScanError::InvalidRange { start: self.opts.start_ip.clone(), end: self.opts.end_ip.clone() });
        }
        Ok((start, end))
    }

    async fn scan_range(&mut self, start: u32, end: u32) -> Result<ScanSummary, ScanError> {
        self.state = ScanState::LoadingCheckpoint;
        let mut summary = ScanSummary::default();
        let mut effective = start;
        if let Some(marker) = self.checkpoints.load()? {
            if (start..=end).contains(&marker) {
                info!(checkpoint = %int_to_address(marker), "resuming after checkpoint");
                summary.resumed_from = Some(int_to_address(marker));
                if marker == end {
                    info!(end = %self.opts.end_ip, "nothing left to scan: checkpoint is at the end of the range");
                    self.state = ScanState::Finalizing;
                    self.progress.send_replace(Progress::default());
                    return Ok(summary);
                }
                effective = marker + 1;
            }
        }

        let total = u64::from(end) - u64::from(effective) + 1;
        summary.addresses = total;
        info!(total, from = %int_to_address(effective), to = %self.opts.end_ip, "addresses to scan");

        let mut sink = match &self.opts.output {
            Some(cfg) => Some(ResultSink::open(cfg)?),
            None => None,
        };

        self.state = ScanState::ChunkScanning;
        let mut progress = Progress { completed: 0, total };
        self.progress.send_replace(progress);
        if self.opts.parallel {
            self.scan_parallel(effective, end, &mut sink, &mut progress, &mut summary).await?;
        } else {
            self.scan_sequential(effective, end, &mut sink, &mut progress, &mut summary).await?;
        }

        self.state = ScanState::Finalizing;
        if let Some(sink) = sink {
            sink.finish()?;
        }
        Ok(summary)
    }

    fn chunk_options(&self) -> ChunkOptions {
        ChunkOptions { timeout: self.opts.timeout, max_concurrent: self.opts.max_concurrent }
    }

    async fn scan_sequential(
        &mut self,
        start: u32,
        end: u32,
        sink: &mut Option<ResultSink>,
        progress: &mut Progress,
        summary: &mut ScanSummary,
    ) -> Result<(), ScanError> {
        let ports: Arc<[u16]> = Arc::from(self.opts.ports.as_slice());
        for chunk in chunks(start, end, self.opts.chunk_size) {
            let expected = chunk.len() * ports.len() as u64;
            debug!(%chunk, expected, "launching chunk");
            let mut rx = scan_chunk(self.dialer.clone(), chunk, ports.clone(), self.chunk_options());
            let mut received = 0u64;
            while let Some(result) = rx.recv().await {
                received += 1;
                self.record(result, sink, summary).await?;
            }
            if received != expected {
                warn!(%chunk, expected, received, "chunk produced fewer results than probes");
            }
            self.complete_chunk(chunk, sink, progress, summary)?;
        }
        Ok(())
    }

    async fn scan_parallel(
        &mut self,
        start: u32,
        end: u32,
        sink: &mut Option<ResultSink>,
        progress: &mut Progress,
        summary: &mut ScanSummary,
    ) -> Result<(), ScanError> {
        warn!("parallel chunks: checkpoints may be committed out of address order");
        let ports: Arc<[u16]> = Arc::from(self.opts.ports.as_slice());
        let (tx, mut rx) = mpsc::channel::<ScanEvent>(self.opts.max_concurrent.max(1));
        let mut pending = 0usize;
        for chunk in chunks(start, end, self.opts.chunk_size) {
            debug!(%chunk, "launching chunk");
            let tx = tx.clone();
            let dialer = self.dialer.clone();
            let ports = ports.clone();
            let opts = self.chunk_options();
            tokio::spawn(async move {
                scan_chunk_into(dialer, chunk, ports, opts, tx.clone()).await;
                let _ = tx.send(ScanEvent::ChunkDone(chunk)).await;
            });
            pending += 1;
        }
        drop(tx);

        while pending > 0 {
            match rx.recv().await {
                Some(ScanEvent::Probe(result)) => self.record(result, sink, summary).await?,
                Some(ScanEvent::ChunkDone(chunk)) => {
                    pending -= 1;
                    self.complete_chunk(chunk, sink, progress, summary)?;
                }
                None => break,
            }
        }
        if pending > 0 {
            warn!(pending, "chunk tasks ended without reporting completion");
        }
        Ok(())
    }

    async fn record(
        &mut self,
        result: ScanResult,
        sink: &mut Option<ResultSink>,
        summary: &mut ScanSummary,
    ) -> Result<(), ScanError> {
        summary.probes += 1;
        if result.open {
            let line = result.to_string();
            info!(ip = %result.ip, port = result.port, "open port");
            if let Some(sink) = sink.as_mut() {
                sink.write_line(&line)?;
            }
            deliver(self.notifier.as_ref(), &Message::new(subjects::OPEN_PORT, line)).await;
            summary.open.push(result.clone());
        }
        if self.opts.retain_results {
            self.results.push(result);
        }
        Ok(())
    }

    fn complete_chunk(
        &mut self,
        chunk: Chunk,
        sink: &mut Option<ResultSink>,
        progress: &mut Progress,
        summary: &mut ScanSummary,
    ) -> Result<(), ScanError> {
        if let Some(sink) = sink.as_mut() {
            sink.flush()?;
        }
        self.checkpoints.save(chunk.end)?;
        summary.chunks += 1;
        progress.completed += chunk.len();
        self.progress.send_replace(*progress);
        info!(%chunk, "progress: {:.2}% complete", progress.fraction() * 100.0);
        Ok(())
    }

    fn summary_body(&self, summary: &ScanSummary) -> String {
        let mut body = format!(
            "Scan from {} to {} finished: {} probes across {} addresses, {} open.",
            self.opts.start_ip,
            self.opts.end_ip,
            summary.probes,
            summary.addresses,
            summary.open.len()
        );
        if summary.open.is_empty() {
            body.push_str("\nNo open ports found");
        }
        for r in &summary.open {
            body.push('\n');
            body.push_str(&r.to_string());
        }
        body
    }
}
