use crate::CheckpointStore;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use sweeper_core::{address_to_int, int_to_address, ScanError};
use tracing::debug;

/// Marker kept as a single dotted-quad line in a file.
#[derive(Debug, Clone)]
pub struct FileCheckpoint {
    path: PathBuf,
}

impl FileCheckpoint {
    pub fn new(path: impl AsRef<Path>) -> Self {
        FileCheckpoint { path: path.as_ref().to_path_buf() }
    }

    fn staging_path(&self) -> PathBuf {
        let mut name = self.path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

impl CheckpointStore for FileCheckpoint {
    fn save(&self, address: u32) -> Result<(), ScanError> {
        let staging = self.staging_path();
        let line = int_to_address(address) + "\n";
        fs::write(&staging, line)
            .and_then(|()| fs::rename(&staging, &self.path))
            .map_err(|e| ScanError::persistence(format!("failed to save checkpoint {}", self.path.display()), e))?;
        debug!(path = %self.path.display(), checkpoint = %int_to_address(address), "checkpoint saved");
        Ok(())
    }

    fn load(&self) -> Result<Option<u32>, ScanError> {
        let text = match fs::read_to_string(&self.path) {
            Ok(t) => t,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(ScanError::persistence(format!("failed to load checkpoint {}", self.path.display()), e))
            }
        };
        let first = text.lines().next().unwrap_or("").trim();
        if first.is_empty() {
            return Ok(None);
        }
        address_to_int(first).map(Some).map_err(|_| {
            ScanError::persistence(
                format!("failed to load checkpoint {}", self.path.display()),
                io::Error::new(io::ErrorKind::InvalidData, format!("malformed address {first:?}")),
            )
        })
    }

    fn clear(&self) -> Result<(), ScanError> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(ScanError::persistence(format!("failed to clear checkpoint {}", self.path.display()), e)),
        }
    }
}
