//! YAML configuration and its merge with command-line flags.
//!
//! Flags win; the file fills in whatever was not given on the command line; built-in
//! defaults cover the rest.

use crate::Cli;
use anyhow::{anyhow, Context, Result};
use checkpoint::CheckpointBackend;
use ipnet::Ipv4Net;
use notify::BrevoConfig;
use range_scan::{OutputConfig, ScanOptions};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

const DEFAULT_CONFIG: &str = "sweeper.yaml";

#[derive(Debug, Default, Deserialize, Clone)]
pub struct ScanConfig {
    pub start: Option<String>,
    pub end: Option<String>,
    pub cidr: Option<String>,
    pub ports: Option<String>,
    pub timeout_ms: Option<u64>,
    pub concurrent: Option<usize>,
    pub chunk: Option<u32>,
    pub parallel: Option<bool>,
    pub output: Option<PathBuf>,
    pub compress: Option<bool>,
    pub checkpoint: Option<PathBuf>,
    pub memory_checkpoint: Option<bool>,
    pub keep_results: Option<bool>,
    pub forever: Option<bool>,
    pub pass_interval_secs: Option<u64>,
    pub heartbeat_hours: Option<u64>,
    pub health_port: Option<u16>,
}

#[derive(Debug, Default, Deserialize, Clone)]
pub struct NotifyConfig {
    pub url: Option<String>,
    pub api_key: Option<String>,
    pub sender_name: Option<String>,
    pub sender_email: Option<String>,
    pub to_name: Option<String>,
    pub to_email: Option<String>,
}

#[derive(Debug, Default, Deserialize, Clone)]
pub struct Config {
    pub scan: Option<ScanConfig>,
    pub notify: Option<NotifyConfig>,
}

/// Load an explicit config file, or `./sweeper.yaml` when present.
pub fn load_config(path: Option<&Path>) -> Result<Option<Config>> {
    let path = match path {
        Some(p) => p.to_path_buf(),
        None => {
            let p = Path::new(DEFAULT_CONFIG);
            if p.exists() { p.to_path_buf() } else { return Ok(None); }
        }
    };
    let s = fs::read_to_string(&path).with_context(|| format!("failed to read config {}", path.display()))?;
    let cfg = serde_yaml::from_str(&s).with_context(|| format!("failed to parse config {}", path.display()))?;
    Ok(Some(cfg))
}

/// Everything the run needs, after merging flags, file and defaults.
#[derive(Debug, Clone)]
pub struct Settings {
    pub scan: ScanOptions,
    pub checkpoint: CheckpointBackend,
    pub forever: bool,
    pub heartbeat: Duration,
    pub health_port: Option<u16>,
    pub email: Option<BrevoConfig>,
}

impl Settings {
    pub fn resolve(cli: &Cli, cfg: &Config) -> Result<Settings> {
        let file = cfg.scan.clone().unwrap_or_default();
        let defaults = ScanOptions::default();

        let (start_ip, end_ip) = match cli.cidr.or(parse_cidr(file.cidr.as_deref())?) {
            Some(net) if cli.start.is_none() && cli.end.is_none() => (net.network().to_string(), net.broadcast().to_string()),
            _ => (
                cli.start.clone().or(file.start).unwrap_or(defaults.start_ip),
                cli.end.clone().or(file.end).unwrap_or(defaults.end_ip),
            ),
        };
        let ports = match cli.ports.clone().or(file.ports) {
            Some(spec) => port_scan::parse_ports(&spec),
            None => defaults.ports,
        };
        let output_path = cli.output.clone().or(file.output).unwrap_or_else(|| PathBuf::from("scan_results.txt"));
        let compress = cli.compress || file.compress.unwrap_or(false);

        let scan = ScanOptions {
            start_ip,
            end_ip,
            ports,
            timeout: cli.timeout_ms.or(file.timeout_ms).map(Duration::from_millis).unwrap_or(defaults.timeout),
            max_concurrent: cli.concurrent.or(file.concurrent).unwrap_or(defaults.max_concurrent),
            chunk_size: cli.chunk.or(file.chunk).unwrap_or(defaults.chunk_size),
            parallel: cli.parallel || file.parallel.unwrap_or(false),
            output: Some(OutputConfig { path: output_path, compress }),
            retain_results: cli.keep_results || file.keep_results.unwrap_or(false),
            pass_interval: Duration::from_secs(cli.pass_interval_secs.or(file.pass_interval_secs).unwrap_or(0)),
        };

        let checkpoint = if cli.memory_checkpoint || file.memory_checkpoint.unwrap_or(false) {
            CheckpointBackend::Memory
        } else {
            CheckpointBackend::File(cli.checkpoint.clone().or(file.checkpoint).unwrap_or_else(|| PathBuf::from("checkpoint.txt")))
        };

        Ok(Settings {
            scan,
            checkpoint,
            forever: cli.forever || file.forever.unwrap_or(false),
            heartbeat: Duration::from_secs(3600 * cli.heartbeat_hours.or(file.heartbeat_hours).unwrap_or(12)),
            health_port: cli.health_port.or(file.health_port),
            email: email_config(cli, cfg.notify.clone().unwrap_or_default()),
        })
    }
}

fn parse_cidr(s: Option<&str>) -> Result<Option<Ipv4Net>> {
    s.map(|v| v.trim().parse::<Ipv4Net>().map_err(|e| anyhow!("invalid cidr {v:?}: {e}"))).transpose()
}

/// `None` unless both an endpoint and an API key are known.
fn email_config(cli: &Cli, file: NotifyConfig) -> Option<BrevoConfig> {
    let url = cli.brevo_url.clone().or(file.url)?;
    let api_key = cli.brevo_apikey.clone().or(file.api_key)?;
    let mut cfg = BrevoConfig::new(
        url,
        api_key,
        cli.sender_email.clone().or(file.sender_email).unwrap_or_default(),
        cli.to_email.clone().or(file.to_email).unwrap_or_default(),
    );
    if let Some(name) = file.sender_name { cfg.sender_name = name; }
    if let Some(name) = file.to_name { cfg.to_name = name; }
    cfg.validate().ok().map(|()| cfg)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    /// Parse `args`, keeping env-backed options only when they appear on the command line,
    /// so exported `BREVO_*`, `PORT` and `*_EMAIL` variables do not leak into the tests.
    fn cli(args: &[&str]) -> Cli {
        let mut argv = vec!["sweeper"];
        argv.extend_from_slice(args);
        let mut c = Cli::try_parse_from(argv).unwrap();
        let given = |flag: &str| args.contains(&flag);
        if !given("--health-port") { c.health_port = None; }
        if !given("--brevo-url") { c.brevo_url = None; }
        if !given("--brevo-apikey") { c.brevo_apikey = None; }
        if !given("--sender-email") { c.sender_email = None; }
        if !given("--to-email") { c.to_email = None; }
        c
    }

    fn yaml(s: &str) -> Config {
        serde_yaml::from_str(s).unwrap()
    }

    #[test]
    fn defaults_without_flags_or_file() {
        let s = Settings::resolve(&cli(&[]), &Config::default()).unwrap();
        assert_eq!(s.scan.start_ip, "192.168.1.1");
        assert_eq!(s.scan.end_ip, "192.168.1.10");
        assert_eq!(s.scan.ports, vec![25]);
        assert_eq!(s.scan.timeout, Duration::from_secs(2));
        assert_eq!(s.scan.max_concurrent, 1000);
        assert_eq!(s.scan.chunk_size, 1_000_000);
        assert!(!s.scan.parallel);
        assert_eq!(s.scan.output, Some(OutputConfig { path: "scan_results.txt".into(), compress: false }));
        assert_eq!(s.checkpoint, CheckpointBackend::File("checkpoint.txt".into()));
        assert_eq!(s.heartbeat, Duration::from_secs(12 * 3600));
        assert!(!s.forever);
    }

    #[test]
    fn flags_beat_file_and_file_beats_defaults() {
        let cfg = yaml("scan:\n  ports: \"22,80\"\n  timeout_ms: 300\n  chunk: 50\n  parallel: true\n");
        let s = Settings::resolve(&cli(&["--timeout-ms", "900", "--start", "10.0.0.1", "--end", "10.0.0.9"]), &cfg).unwrap();
        assert_eq!(s.scan.timeout, Duration::from_millis(900));
        assert_eq!(s.scan.ports, vec![22, 80]);
        assert_eq!(s.scan.chunk_size, 50);
        assert!(s.scan.parallel);
        assert_eq!(s.scan.start_ip, "10.0.0.1");
    }

    #[test]
    fn cidr_expands_to_network_and_broadcast() {
        let s = Settings::resolve(&cli(&["--cidr", "10.9.8.0/30"]), &Config::default()).unwrap();
        assert_eq!(s.scan.start_ip, "10.9.8.0");
        assert_eq!(s.scan.end_ip, "10.9.8.3");

        let s = Settings::resolve(&cli(&[]), &yaml("scan:\n  cidr: 172.16.0.0/31\n")).unwrap();
        assert_eq!((s.scan.start_ip.as_str(), s.scan.end_ip.as_str()), ("172.16.0.0", "172.16.0.1"));

        assert!(Settings::resolve(&cli(&[]), &yaml("scan:\n  cidr: nonsense\n")).is_err());
    }

    #[test]
    fn cidr_conflicts_with_explicit_bounds() {
        assert!(Cli::try_parse_from(["sweeper", "--cidr", "10.0.0.0/24", "--start", "10.0.0.1"]).is_err());
    }

    #[test]
    fn lenient_ports_may_be_empty() {
        let s = Settings::resolve(&cli(&["--ports", "nope,70000"]), &Config::default()).unwrap();
        assert!(s.scan.ports.is_empty());
    }

    #[test]
    fn memory_checkpoint_and_compression() {
        let s = Settings::resolve(&cli(&["--memory-checkpoint", "--compress", "--output", "out.gz"]), &Config::default()).unwrap();
        assert_eq!(s.checkpoint, CheckpointBackend::Memory);
        assert_eq!(s.scan.output, Some(OutputConfig { path: "out.gz".into(), compress: true }));
    }

    #[test]
    fn email_needs_url_and_key() {
        let s = Settings::resolve(&cli(&[]), &yaml("notify:\n  url: http://mail.example/v3\n")).unwrap();
        assert!(s.email.is_none());
        assert!(s.health_port.is_none());

        let cfg = yaml("notify:\n  url: http://mail.example/v3\n  api_key: k\n  to_email: ops@example.com\n  to_name: Ops\n");
        let s = Settings::resolve(&cli(&["--sender-email", "bot@example.com"]), &cfg).unwrap();
        let email = s.email.unwrap();
        assert_eq!(email.api_key, "k");
        assert_eq!(email.to_name, "Ops");
        assert_eq!(email.sender_email, "bot@example.com");
        assert_eq!(email.sender_name, "Port Scanner Bot");
    }

    #[test]
    fn email_flags_beat_file() {
        let cfg = yaml("notify:\n  url: http://file.example\n  api_key: file-key\n");
        let s = Settings::resolve(&cli(&["--brevo-apikey", "flag-key", "--to-email", "ops@example.com"]), &cfg).unwrap();
        let email = s.email.unwrap();
        assert_eq!(email.url, "http://file.example");
        assert_eq!(email.api_key, "flag-key");
        assert_eq!(email.to_email, "ops@example.com");
    }

    #[test]
    fn explicit_missing_file_fails() {
        let missing = std::env::temp_dir().join(format!("sweeper-{}.yaml", uuid::Uuid::now_v7()));
        assert!(load_config(Some(&missing)).is_err());
    }

    #[test]
    fn explicit_file_loads() {
        let path = std::env::temp_dir().join(format!("sweeper-{}.yaml", uuid::Uuid::now_v7()));
        fs::write(&path, "scan:\n  start: 10.1.1.1\n  forever: true\n").unwrap();
        let cfg = load_config(Some(&path)).unwrap().unwrap();
        let scan = cfg.scan.unwrap();
        assert_eq!(scan.start.as_deref(), Some("10.1.1.1"));
        assert_eq!(scan.forever, Some(true));
        fs::remove_file(&path).unwrap();
    }
}
