use async_trait::async_trait;
use shared::StoreError;
use std::collections::HashMap;
use std::sync::Mutex;

/// Issues strictly increasing integers per namespace.
///
/// Implementations must make increment-and-fetch one atomic step at the
/// storage layer. A namespace that was never used starts at 1.
#[async_trait]
pub trait SequenceAllocator: Send + Sync {
    async fn next_value(&self, namespace: &str) -> Result<i64, StoreError>;
}

/// Process-local counters guarded by a single mutex.
#[derive(Debug, Default)]
pub struct InMemorySequenceAllocator {
    counters: Mutex<HashMap<String, i64>>,
}

impl InMemorySequenceAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Last value handed out for `namespace`, 0 if none.
    pub fn current(&self, namespace: &str) -> Result<i64, StoreError> {
        let counters = self
            .counters
            .lock()
            .map_err(|_| StoreError::Unavailable("sequence lock poisoned".to_string()))?;
        Ok(counters.get(namespace).copied().unwrap_or(0))
    }
}

#[async_trait]
impl SequenceAllocator for InMemorySequenceAllocator {
    async fn next_value(&self, namespace: &str) -> Result<i64, StoreError> {
        let mut counters = self
            .counters
            .lock()
            .map_err(|_| StoreError::Unavailable("sequence lock poisoned".to_string()))?;
        let seq = counters.entry(namespace.to_string()).or_insert(0);
        *seq += 1;
        Ok(*seq)
    }
}
