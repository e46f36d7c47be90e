//! Resume markers: the last address whose whole chunk finished scanning.

mod file;
mod memory;

pub use file::FileCheckpoint;
pub use memory::InMemoryCheckpoint;

use std::path::PathBuf;
use sweeper_core::ScanError;

/// Single-value store for the last fully scanned address.
pub trait CheckpointStore: Send + Sync {
    /// Overwrite the stored marker.
    fn save(&self, address: u32) -> Result<(), ScanError>;
    /// `None` when nothing has been saved yet.
    fn load(&self) -> Result<Option<u32>, ScanError>;
    /// Forget the marker so the next scan starts from the beginning of its range.
    fn clear(&self) -> Result<(), ScanError>;
}

/// Which store to use, as chosen by configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckpointBackend {
    File(PathBuf),
    Memory,
}

impl CheckpointBackend {
    pub fn open(&self) -> Box<dyn CheckpointStore> {
        match self {
            CheckpointBackend::File(path) => Box::new(FileCheckpoint::new(path)),
            CheckpointBackend::Memory => Box::new(InMemoryCheckpoint::new()),
        }
    }
}
