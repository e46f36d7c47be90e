//! IPv4 addresses as a flat `u32` space, and the chunking of inclusive ranges over it.

use crate::ScanError;
use std::fmt;
use std::net::Ipv4Addr;

/// Parse a dotted-quad IPv4 literal into its integer position.
pub fn address_to_int(dotted: &str) -> Result<u32, ScanError> {
    dotted
        .trim()
        .parse::<Ipv4Addr>()
        .map(u32::from)
        .map_err(|_| ScanError::InvalidAddress(dotted.to_string()))
}

pub fn int_to_address(n: u32) -> String {
    Ipv4Addr::from(n).to_string()
}

/// Inclusive sub-interval of the address space scanned as one checkpointed unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Chunk {
    pub start: u32,
    pub end: u32,
}

impl Chunk {
    /// Number of addresses covered. Never zero.
    pub fn len(&self) -> u64 {
        u64::from(self.end) - u64::from(self.start) + 1
    }

    pub fn addresses(&self) -> impl Iterator<Item = u32> {
        self.start..=self.end
    }
}

impl fmt::Display for Chunk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", Ipv4Addr::from(self.start), Ipv4Addr::from(self.end))
    }
}

/// Iterator over consecutive chunks of `[start, end]`.
#[derive(Debug, Clone)]
pub struct Chunks {
    next: Option<u32>,
    end: u32,
    size: u32,
}

/// Split `[start, end]` into chunks of `chunk_size` addresses, the last one truncated to `end`.
/// Yields nothing when `start > end`. A size of zero is treated as one.
pub fn chunks(start: u32, end: u32, chunk_size: u32) -> Chunks {
    Chunks {
        next: (start <= end).then_some(start),
        end,
        size: chunk_size.max(1),
    }
}

impl Iterator for Chunks {
    type Item = Chunk;

    fn next(&mut self) -> Option<Chunk> {
        let start = self.next?;
        // saturating: a chunk reaching past u32::MAX clamps to the requested end
        let end = start.saturating_add(self.size - 1).min(self.end);
        self.next = if end >= self.end { None } else { Some(end + 1) };
        Some(Chunk { start, end })
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        match self.next {
            None => (0, Some(0)),
            Some(start) => {
                let remaining = u64::from(self.end) - u64::from(start) + 1;
                let n = remaining.div_ceil(u64::from(self.size)) as usize;
                (n, Some(n))
            }
        }
    }
}

impl ExactSizeIterator for Chunks {}
