//! Core types shared by the scanning engine: the IPv4 address space, chunking,
//! probe results, errors and the concurrency limiter.

pub mod addr;
pub mod error;
pub mod limiter;
pub mod result;

pub use addr::{address_to_int, chunks, int_to_address, Chunk, Chunks};
pub use error::ScanError;
pub use limiter::Limiter;
pub use result::{ProbeError, ScanResult};

pub const fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
