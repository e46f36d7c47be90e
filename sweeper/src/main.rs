use anyhow::{bail, Result};
use clap::Parser;
use ipnet::Ipv4Net;
use notify::{deliver, spawn_heartbeat, BrevoNotifier, LogNotifier, Message, Notifier};
use port_scan::TcpDialer;
use range_scan::{subjects, RangeScanner};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, MissedTickBehavior};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

mod config;
mod health;

use config::Settings;

const NOTIFY_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Parser)]
#[command(name = "sweeper", version, about = "Resumable TCP connect sweep over an IPv4 range")]
pub struct Cli {
    /// Optional config file (YAML). If omitted, loads ./sweeper.yaml if present.
    #[arg(long)]
    config: Option<PathBuf>,
    /// First address of the range [default: 192.168.1.1]
    #[arg(long, conflicts_with = "cidr")]
    start: Option<String>,
    /// Last address of the range, inclusive [default: 192.168.1.10]
    #[arg(long, conflicts_with = "cidr")]
    end: Option<String>,
    /// Scan a whole IPv4 network (e.g. 10.0.0.0/16) instead of --start/--end
    #[arg(long)]
    cidr: Option<Ipv4Net>,
    /// Comma-separated ports; invalid entries are skipped [default: 25]
    #[arg(long)]
    ports: Option<String>,
    /// Connect timeout per probe in milliseconds [default: 2000]
    #[arg(long)]
    timeout_ms: Option<u64>,
    /// Maximum concurrent probes per chunk [default: 1000]
    #[arg(long)]
    concurrent: Option<usize>,
    /// Addresses per chunk; a checkpoint is written after each chunk [default: 1000000]
    #[arg(long)]
    chunk: Option<u32>,
    /// Run all chunks at once. Checkpoints may then land out of address order.
    #[arg(long, default_value_t = false)]
    parallel: bool,
    /// File receiving one line per open port (appended) [default: scan_results.txt]
    #[arg(long, value_name = "FILE")]
    output: Option<PathBuf>,
    /// Gzip the output file
    #[arg(long, default_value_t = false)]
    compress: bool,
    /// Checkpoint file used to resume [default: checkpoint.txt]
    #[arg(long, value_name = "FILE")]
    checkpoint: Option<PathBuf>,
    /// Keep the checkpoint in memory only (no resume across restarts)
    #[arg(long, default_value_t = false)]
    memory_checkpoint: bool,
    /// Keep every probe result in memory, not only open ports
    #[arg(long, default_value_t = false)]
    keep_results: bool,
    /// Rescan the range repeatedly until interrupted
    #[arg(long, default_value_t = false)]
    forever: bool,
    /// Pause between passes with --forever [default: 0]
    #[arg(long)]
    pass_interval_secs: Option<u64>,
    /// Hours between "Update" notifications; 0 disables [default: 12]
    #[arg(long)]
    heartbeat_hours: Option<u64>,
    /// Serve GET /health on this port
    #[arg(long, env = "PORT")]
    health_port: Option<u16>,
    /// Email API endpoint
    #[arg(long, env = "BREVO_URL")]
    brevo_url: Option<String>,
    /// Email API key
    #[arg(long, env = "BREVO_APIKEY", hide_env_values = true)]
    brevo_apikey: Option<String>,
    #[arg(long, env = "SENDER_EMAIL")]
    sender_email: Option<String>,
    #[arg(long, env = "TO_EMAIL")]
    to_email: Option<String>,
    /// Debug logging (RUST_LOG overrides)
    #[arg(short, long, default_value_t = false)]
    verbose: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    let cfg = config::load_config(cli.config.as_deref())?.unwrap_or_default();
    let settings = Settings::resolve(&cli, &cfg)?;
    info!("sweeper {} (core {})", env!("CARGO_PKG_VERSION"), sweeper_core::version());
    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(run(settings))
}

fn init_tracing(verbose: bool) {
    let fallback = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(false).init();
}

fn build_notifier(settings: &Settings) -> Result<Arc<dyn Notifier>> {
    match &settings.email {
        Some(cfg) => Ok(Arc::new(BrevoNotifier::new(cfg.clone(), NOTIFY_TIMEOUT)?)),
        None => {
            warn!("BREVO_URL/BREVO_APIKEY not set; notifications go to the log only");
            Ok(Arc::new(LogNotifier))
        }
    }
}

async fn run(settings: Settings) -> Result<()> {
    let started = Instant::now();
    let (stop_tx, stop_rx) = watch::channel(false);
    let notifier = build_notifier(&settings)?;

    let mut background: Vec<JoinHandle<()>> = Vec::new();
    if let Some(port) = settings.health_port {
        let listener = TcpListener::bind(("0.0.0.0", port)).await?;
        info!(port, "health endpoint listening on /health");
        background.push(tokio::spawn(health::serve_health(listener, stop_rx.clone())));
    }
    if !settings.heartbeat.is_zero() {
        background.push(spawn_heartbeat(notifier.clone(), settings.heartbeat, stop_rx.clone()));
    }
    background.push(spawn_elapsed_log(started, stop_rx.clone()));

    let forever = settings.forever;
    let output = settings.scan.output.as_ref().map(|o| o.path.display().to_string());
    let mut scanner = RangeScanner::new(settings.scan, Arc::new(TcpDialer), settings.checkpoint.open(), notifier.clone());

    let outcome = tokio::select! {
        r = async {
            if forever {
                scanner.run_forever(stop_rx.clone()).await.map(|_| ())
            } else {
                scanner.run_once().await.map(|_| ())
            }
        } => r.map_err(anyhow::Error::from),
        _ = tokio::signal::ctrl_c() => interrupted(notifier.as_ref()).await,
    };

    let _ = stop_tx.send(true);
    for handle in background {
        let _ = handle.await;
    }

    let minutes = started.elapsed().as_secs_f64() / 60.0;
    match (&outcome, output) {
        (Ok(()), Some(path)) => info!("scan finished in {minutes:.2} minutes, results saved to {path}"),
        (Ok(()), None) => info!("scan finished in {minutes:.2} minutes"),
        (Err(_), _) => {}
    }
    if scanner.options().retain_results {
        info!(results = scanner.results().len(), "results kept in memory");
    }
    outcome
}

/// Report an interrupted scan. Always an error, so the process exits non-zero.
async fn interrupted(notifier: &dyn Notifier) -> Result<()> {
    warn!("interrupted; the chunk in flight is discarded, rerun to resume from the last checkpoint");
    deliver(notifier, &Message::new(subjects::INTERRUPTED, "Scan interrupted by signal")).await;
    bail!("scan interrupted")
}

/// Log the elapsed time once a minute until stopped.
fn spawn_elapsed_log(started: Instant, mut stop: watch::Receiver<bool>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let every = Duration::from_secs(60);
        let mut ticker = interval_at(tokio::time::Instant::now() + every, every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = ticker.tick() => info!("elapsed time: {:.0} minutes", started.elapsed().as_secs_f64() / 60.0),
                changed = stop.changed() => {
                    if changed.is_err() || *stop.borrow() { break; }
                }
            }
        }
    })
}
