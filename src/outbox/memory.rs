//! In-memory outbox store.
//!
//! Process-lifetime durability only: rows survive for as long as the process
//! runs and are lost on crash. Suitable for tests, local development and
//! deployments that accept that trade-off; durable deployments put a
//! database-backed implementation behind the same [`OutboxStore`] port.

use super::{MarkOutcome, OutboxError, OutboxMessage, OutboxStore};
use crate::context::TransactionContext;
use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use std::sync::Arc;
use uuid::Uuid;

/// In-memory [`OutboxStore`] backed by a concurrent map.
///
/// When the [`TransactionContext`] carries an active unit of work the insert
/// is staged and only becomes visible on commit; a rollback discards it.
#[derive(Debug, Default, Clone)]
pub struct InMemoryOutbox {
    rows: Arc<DashMap<String, OutboxMessage>>,
}

impl InMemoryOutbox {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of rows, processed and pending.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Look up a row by message id.
    pub fn get(&self, message_id: &str) -> Option<OutboxMessage> {
        self.rows.get(message_id).map(|r| r.clone())
    }

    /// Drop processed rows older than the given instant. Retention cleanup.
    pub fn evict_processed_before(&self, cutoff: chrono::DateTime<Utc>) -> usize {
        let before = self.rows.len();
        self.rows
            .retain(|_, row| match row.processed_at {
                Some(processed_at) => processed_at >= cutoff,
                None => true,
            });
        before - self.rows.len()
    }

    fn insert_all(rows: &DashMap<String, OutboxMessage>, messages: Vec<OutboxMessage>) {
        for message in messages {
            rows.insert(message.message_id.clone(), message);
        }
    }

    fn sorted_pending<F>(&self, filter: F) -> Vec<OutboxMessage>
    where
        F: Fn(&OutboxMessage) -> bool,
    {
        let mut pending: Vec<OutboxMessage> = self
            .rows
            .iter()
            .filter(|row| row.is_pending() && filter(row.value()))
            .map(|row| row.clone())
            .collect();
        pending.sort_by_key(|m| m.sent_at);
        pending
    }
}

#[async_trait]
impl OutboxStore for InMemoryOutbox {
    async fn send_to_outbox(
        &self,
        messages: Vec<OutboxMessage>,
        tx: &TransactionContext,
    ) -> Result<(), OutboxError> {
        match tx.unit_of_work() {
            Some(uow) => {
                let rows = self.rows.clone();
                uow.enlist(move || Self::insert_all(&rows, messages))?;
            }
            None => Self::insert_all(&self.rows, messages),
        }
        Ok(())
    }

    async fn unprocessed_messages(&self) -> Result<Vec<OutboxMessage>, OutboxError> {
        Ok(self.sorted_pending(|_| true))
    }

    async fn unprocessed_batch(&self, batch_id: Uuid) -> Result<Vec<OutboxMessage>, OutboxError> {
        Ok(self.sorted_pending(|m| m.batch_id == batch_id))
    }

    async fn mark_processed(&self, message_id: &str) -> Result<MarkOutcome, OutboxError> {
        let mut row = self
            .rows
            .get_mut(message_id)
            .ok_or_else(|| OutboxError::NotFound(message_id.to_string()))?;
        if row.processed_at.is_some() {
            // Another drain got here first; skip rather than fail the batch.
            return Ok(MarkOutcome::AlreadyProcessed);
        }
        row.processed_at = Some(Utc::now());
        Ok(MarkOutcome::Processed)
    }
}
