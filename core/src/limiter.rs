use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Counting limiter bounding in-flight probes. Clones share the same budget.
pub struct Limiter {
    sem: Arc<Semaphore>,
    capacity: usize,
}

impl Clone for Limiter {
    fn clone(&self) -> Self { Limiter { sem: self.sem.clone(), capacity: self.capacity } }
}

/// A held token; returned to the limiter when dropped.
pub struct Token {
    _permit: OwnedSemaphorePermit,
}

impl Limiter {
    pub fn new(max_concurrent: usize) -> Self {
        let capacity = max_concurrent.max(1);
        Limiter { sem: Arc::new(Semaphore::new(capacity)), capacity }
    }

    /// Wait until a token is free and take it.
    pub async fn acquire(&self) -> Token {
        let permit = self.sem.clone().acquire_owned().await.expect("limiter semaphore is never closed");
        Token { _permit: permit }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn available(&self) -> usize {
        self.sem.available_permits()
    }
}
