//! Range scanning: partition an IPv4 range into chunks, scan them, checkpoint after each one,
//! and report what was found.

mod scanner;
pub mod sink;

pub use scanner::{Progress, RangeScanner, ScanOptions, ScanState, ScanSummary};
pub use sink::{OutputConfig, ResultSink};

/// Subjects of the notifications sent during a pass.
pub mod subjects {
    pub const START: &str = "Port Scan Results";
    pub const OPEN_PORT: &str = "Open port found";
    pub const SUMMARY: &str = "Scan complete";
    pub const FAILED: &str = "Scan failed";
    pub const INTERRUPTED: &str = "Scan interrupted";
}
