//! Saga state persistence.

use super::SagaContext;
use crate::context::TransactionContext;
use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Errors from saga persistence.
#[derive(Debug, Error)]
pub enum SagaPersisterError {
    #[error("saga read failed: {0}")]
    Read(String),

    #[error("saga write failed: {0}")]
    Write(String),
}

/// Port for saga state storage.
#[async_trait]
pub trait SagaPersister: Send + Sync {
    async fn get_by_id(&self, saga_id: &str) -> Result<Option<SagaContext>, SagaPersisterError>;

    async fn persist(
        &self,
        saga: &SagaContext,
        tx: &TransactionContext,
    ) -> Result<(), SagaPersisterError>;
}

/// In-memory [`SagaPersister`] with opportunistic TTL eviction.
///
/// Entries older than the TTL (measured from their last persist) are swept
/// on every `persist` call rather than by a background timer. Process-
/// lifetime durability only.
#[derive(Debug)]
pub struct InMemorySagaPersister {
    sagas: Arc<DashMap<String, SagaContext>>,
    ttl: Duration,
}

impl InMemorySagaPersister {
    pub fn new(ttl: Duration) -> Self {
        Self {
            sagas: Arc::new(DashMap::new()),
            ttl,
        }
    }

    pub fn len(&self) -> usize {
        self.sagas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sagas.is_empty()
    }

    fn sweep(&self) {
        let ttl = match chrono::Duration::from_std(self.ttl) {
            Ok(ttl) => ttl,
            Err(_) => return,
        };
        let cutoff = Utc::now() - ttl;
        self.sagas.retain(|_, saga| saga.last_updated >= cutoff);
    }
}

#[async_trait]
impl SagaPersister for InMemorySagaPersister {
    async fn get_by_id(&self, saga_id: &str) -> Result<Option<SagaContext>, SagaPersisterError> {
        Ok(self.sagas.get(saga_id).map(|s| s.clone()))
    }

    async fn persist(
        &self,
        saga: &SagaContext,
        _tx: &TransactionContext,
    ) -> Result<(), SagaPersisterError> {
        self.sweep();
        let mut saga = saga.clone();
        saga.last_updated = Utc::now();
        self.sagas.insert(saga.saga_id.clone(), saga);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::TransactionMode;

    fn tx() -> TransactionContext {
        TransactionContext::new("queue-saga", TransactionMode::ReceiveOnly)
    }

    #[tokio::test]
    async fn persist_then_load_round_trips() {
        let persister = InMemorySagaPersister::new(Duration::from_secs(3600));
        let saga = SagaContext::new("saga-1", "queue-saga", "queue-step-1");

        persister.persist(&saga, &tx()).await.unwrap();
        let loaded = persister.get_by_id("saga-1").await.unwrap().unwrap();

        assert_eq!(loaded.saga_id, "saga-1");
        assert!(loaded.last_updated >= saga.last_updated);
    }

    #[tokio::test]
    async fn sweep_on_persist_evicts_only_expired_entries() {
        let persister = InMemorySagaPersister::new(Duration::from_millis(30));
        let old = SagaContext::new("saga-old", "queue-saga", "queue-step-1");
        persister.persist(&old, &tx()).await.unwrap();

        tokio::time::sleep(Duration::from_millis(60)).await;

        // Persisting a fresh saga sweeps the expired one.
        let fresh = SagaContext::new("saga-fresh", "queue-saga", "queue-step-1");
        persister.persist(&fresh, &tx()).await.unwrap();

        assert!(persister.get_by_id("saga-old").await.unwrap().is_none());
        assert!(persister.get_by_id("saga-fresh").await.unwrap().is_some());
        assert_eq!(persister.len(), 1);
    }
}
