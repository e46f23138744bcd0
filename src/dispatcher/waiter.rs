use crate::message::{AggregatedReport, CorrelationId};
use crate::shard::{ShardedMap, DEFAULT_SHARDS};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::oneshot;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum WaitError {
    #[error("deadline elapsed")]
    Timeout,

    #[error("wait cancelled")]
    Cancelled,
}

/// Table of outstanding batch requests, each with a single-fulfillment slot
pub struct PendingWaiters {
    slots: ShardedMap<oneshot::Sender<AggregatedReport>>,
}

impl PendingWaiters {
    pub fn new() -> Self {
        Self::with_shards(DEFAULT_SHARDS)
    }

    pub fn with_shards(shards: usize) -> Self {
        Self {
            slots: ShardedMap::new(shards),
        }
    }

    /// Register a waiter for `correlation_id`. Returns None if one is already
    /// registered under that id.
    pub fn register(
        self: &Arc<Self>,
        correlation_id: CorrelationId,
        deadline: Instant,
    ) -> Option<Waiter> {
        let (tx, rx) = oneshot::channel();
        if !self.slots.insert_new(correlation_id.clone(), tx) {
            return None;
        }

        Some(Waiter {
            correlation_id,
            deadline,
            rx,
            table: Arc::clone(self),
        })
    }

    /// Hand `report` to its waiter. Returns false when there is nobody to hand
    /// it to: already fulfilled, timed out, cancelled, or never registered.
    pub fn fulfill(&self, report: AggregatedReport) -> bool {
        match self.slots.remove(&report.correlation_id) {
            Some(tx) => tx.send(report).is_ok(),
            None => false,
        }
    }

    pub fn is_pending(&self, correlation_id: &CorrelationId) -> bool {
        self.slots.contains_key(correlation_id)
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

impl Default for PendingWaiters {
    fn default() -> Self {
        Self::new()
    }
}

/// Caller-side handle for one outstanding batch request.
///
/// Dropping it (after a result, a timeout, or because the surrounding future
/// was dropped) removes the entry from the table.
pub struct Waiter {
    correlation_id: CorrelationId,
    deadline: Instant,
    rx: oneshot::Receiver<AggregatedReport>,
    table: Arc<PendingWaiters>,
}

impl Waiter {
    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    /// Wait for the report, the deadline, or `cancel`, whichever comes first
    pub async fn wait(
        mut self,
        cancel: &CancellationToken,
    ) -> Result<AggregatedReport, WaitError> {
        tokio::select! {
            biased;
            received = &mut self.rx => received.map_err(|_| WaitError::Cancelled),
            _ = cancel.cancelled() => Err(WaitError::Cancelled),
            _ = tokio::time::sleep_until(self.deadline) => Err(WaitError::Timeout),
        }
    }
}

impl Drop for Waiter {
    fn drop(&mut self) {
        self.table.slots.remove(&self.correlation_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn report(id: &str) -> AggregatedReport {
        AggregatedReport::from_results(CorrelationId::from(id), 0, &[])
    }

    #[tokio::test]
    async fn test_fulfill_delivers_once() {
        let table = Arc::new(PendingWaiters::new());
        let waiter = table
            .register(CorrelationId::from("c-1"), Instant::now() + Duration::from_secs(5))
            .unwrap();

        assert!(table.fulfill(report("c-1")));
        assert!(!table.fulfill(report("c-1")));

        let received = waiter.wait(&CancellationToken::new()).await.unwrap();
        assert_eq!(received.correlation_id.as_str(), "c-1");
        assert!(table.is_empty());
    }

    #[tokio::test]
    async fn test_duplicate_registration_refused() {
        let table = Arc::new(PendingWaiters::new());
        let deadline = Instant::now() + Duration::from_secs(5);
        let _first = table.register(CorrelationId::from("c-1"), deadline).unwrap();
        assert!(table.register(CorrelationId::from("c-1"), deadline).is_none());
        assert_eq!(table.len(), 1);
    }

    #[tokio::test]
    async fn test_unknown_id_is_noop() {
        let table = PendingWaiters::new();
        assert!(!table.fulfill(report("nobody")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_times_out_and_unregisters() {
        let table = Arc::new(PendingWaiters::new());
        let start = Instant::now();
        let waiter = table
            .register(CorrelationId::from("c-1"), start + Duration::from_secs(1))
            .unwrap();

        let err = waiter.wait(&CancellationToken::new()).await.unwrap_err();
        assert_eq!(err, WaitError::Timeout);
        let waited = Instant::now() - start;
        assert!(waited >= Duration::from_secs(1));
        assert!(waited < Duration::from_millis(1100));
        assert!(!table.is_pending(&CorrelationId::from("c-1")));

        // Late arrival
        assert!(!table.fulfill(report("c-1")));
    }

    #[tokio::test]
    async fn test_cancel_unregisters() {
        let table = Arc::new(PendingWaiters::new());
        let waiter = table
            .register(CorrelationId::from("c-1"), Instant::now() + Duration::from_secs(60))
            .unwrap();

        let cancel = CancellationToken::new();
        cancel.cancel();
        assert_eq!(waiter.wait(&cancel).await.unwrap_err(), WaitError::Cancelled);
        assert!(table.is_empty());
    }

    #[tokio::test]
    async fn test_dropping_waiter_unregisters() {
        let table = Arc::new(PendingWaiters::new());
        let waiter = table
            .register(CorrelationId::from("c-1"), Instant::now() + Duration::from_secs(60))
            .unwrap();
        assert_eq!(table.len(), 1);

        drop(waiter);
        assert!(table.is_empty());
    }
}
