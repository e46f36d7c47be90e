use crate::CheckpointStore;
use std::sync::Mutex;
use sweeper_core::ScanError;

/// Process-local store. Keeps every saved marker so write order can be inspected.
#[derive(Debug, Default)]
pub struct InMemoryCheckpoint {
    history: Mutex<Vec<u32>>,
}

impl InMemoryCheckpoint {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from an existing marker, as if a previous run had saved it.
    pub fn with_marker(address: u32) -> Self {
        InMemoryCheckpoint { history: Mutex::new(vec![address]) }
    }

    pub fn history(&self) -> Vec<u32> {
        self.lock().clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<u32>> {
        // a panic while holding the lock cannot leave the Vec half-written
        self.history.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl CheckpointStore for InMemoryCheckpoint {
    fn save(&self, address: u32) -> Result<(), ScanError> {
        self.lock().push(address);
        Ok(())
    }

    fn load(&self) -> Result<Option<u32>, ScanError> {
        Ok(self.lock().last().copied())
    }

    fn clear(&self) -> Result<(), ScanError> {
        self.lock().clear();
        Ok(())
    }
}
