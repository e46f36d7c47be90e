use std::io;
use thiserror::Error;

/// Scan-level failures. Probe failures are never represented here; they travel as data
/// inside [`crate::ScanResult`].
#[derive(Debug, Error)]
pub enum ScanError {
    #[error("invalid IPv4 address: {0:?}")]
    InvalidAddress(String),
    #[error("invalid IP range: start {start} is greater than end {end}")]
    InvalidRange { start: String, end: String },
    #[error("{context}: {source}")]
    Persistence {
        context: String,
        #[source]
        source: io::Error,
    },
}

impl ScanError {
    pub fn persistence(context: impl Into<String>, source: io::Error) -> Self {
        ScanError::Persistence { context: context.into(), source }
    }

    /// True for failures of the checkpoint store or the output sink.
    pub fn is_persistence(&self) -> bool {
        matches!(self, ScanError::Persistence { .. })
    }
}
