use std::fmt;
use std::io;
use thiserror::Error;

/// Why a single connect attempt did not succeed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProbeError {
    #[error("connection refused")]
    Refused,
    #[error("connect timed out")]
    TimedOut,
    #[error("host or network unreachable")]
    Unreachable,
    #[error("invalid target {0:?}")]
    InvalidTarget(String),
    #[error("{0}")]
    Other(String),
}

impl From<io::Error> for ProbeError {
    fn from(e: io::Error) -> Self {
        match e.kind() {
            io::ErrorKind::ConnectionRefused => ProbeError::Refused,
            io::ErrorKind::TimedOut => ProbeError::TimedOut,
            io::ErrorKind::HostUnreachable | io::ErrorKind::NetworkUnreachable => ProbeError::Unreachable,
            _ => ProbeError::Other(e.to_string()),
        }
    }
}

/// Outcome of one probe against one (ip, port) pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanResult {
    pub ip: String,
    pub port: u16,
    pub open: bool,
    pub error: Option<ProbeError>,
}

impl ScanResult {
    pub fn open(ip: impl Into<String>, port: u16) -> Self {
        ScanResult { ip: ip.into(), port, open: true, error: None }
    }

    pub fn closed(ip: impl Into<String>, port: u16, error: ProbeError) -> Self {
        ScanResult { ip: ip.into(), port, open: false, error: Some(error) }
    }
}

impl fmt::Display for ScanResult {
    /// The line written to result sinks for open ports.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.open {
            write!(f, "Port {} is open on {}", self.port, self.ip)
        } else {
            write!(f, "Port {} is closed on {}", self.port, self.ip)
        }
    }
}
