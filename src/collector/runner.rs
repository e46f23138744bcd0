use crate::broker::{Broker, BrokerError, SharedReceiver};
use crate::collector::store::{AggregationStore, Outcome};
use crate::message::UnitResult;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

#[derive(Debug, Error)]
pub enum CollectorError {
    #[error("broker error: {0}")]
    Broker(#[from] BrokerError),
}

/// Apply one unit result to the store and publish the aggregated report if it
/// completed its group.
///
/// The store has released its shard lock by the time the report is published.
pub async fn process_result(
    store: &AggregationStore,
    broker: &dyn Broker,
    result: UnitResult,
) -> Result<(), CollectorError> {
    let correlation_id = result.correlation_id.clone();
    info!(
        correlation_id = %correlation_id,
        unit_key = %result.unit_key,
        success = result.success,
        "Received unit result"
    );

    match store.on_unit_result(result) {
        Outcome::Pending { received, total } => {
            debug!(
                correlation_id = %correlation_id,
                received,
                total,
                "Aggregation progress"
            );
        }
        Outcome::Duplicate => {
            warn!(correlation_id = %correlation_id, "Ignoring duplicate unit result");
        }
        Outcome::Rejected(reason) => {
            warn!(correlation_id = %correlation_id, error = %reason, "Rejected unit result");
        }
        Outcome::Completed(report) => {
            info!(
                correlation_id = %correlation_id,
                total = report.total_units,
                successful = report.success_count,
                failed = report.failure_count,
                "Aggregated report ready"
            );
            broker.publish_report(report).await?;
            debug!(correlation_id = %correlation_id, "Aggregated report sent");
        }
    }

    Ok(())
}

async fn consume_results(
    consumer_id: usize,
    queue: SharedReceiver<UnitResult>,
    store: Arc<AggregationStore>,
    broker: Arc<dyn Broker>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    loop {
        let result = tokio::select! {
            _ = shutdown_rx.wait_for(|&v| v) => break,
            result = queue.recv() => match result {
                Some(result) => result,
                None => break,
            },
        };

        if let Err(e) = process_result(&store, broker.as_ref(), result).await {
            // The group is already gone; the waiting request will time out.
            error!(consumer_id, error = %e, "Failed to publish aggregated report");
        }
    }

    debug!(consumer_id, "Result consumer stopped");
}

/// Start `consumers` tasks competing for the result queue
pub fn spawn_consumers(
    consumers: usize,
    queue: SharedReceiver<UnitResult>,
    store: Arc<AggregationStore>,
    broker: Arc<dyn Broker>,
    shutdown_rx: watch::Receiver<bool>,
) -> Vec<JoinHandle<()>> {
    (0..consumers.max(1))
        .map(|consumer_id| {
            tokio::spawn(consume_results(
                consumer_id,
                queue.clone(),
                Arc::clone(&store),
                Arc::clone(&broker),
                shutdown_rx.clone(),
            ))
        })
        .collect()
}

/// Run one expiry pass, returning how many groups were evicted
pub fn sweep_once(store: &AggregationStore, timeout: Duration) -> usize {
    let expired = store.sweep_expired(Instant::now(), timeout);

    for group in &expired {
        warn!(
            correlation_id = %group.correlation_id,
            received = group.received,
            total = group.total_units,
            elapsed_secs = group.age.as_secs(),
            timeout_secs = timeout.as_secs(),
            "Removed expired aggregation group"
        );
    }

    expired.len()
}

/// Periodically evict aggregation groups older than `timeout`
pub async fn run_sweeper(
    store: Arc<AggregationStore>,
    sweep_interval: Duration,
    timeout: Duration,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval_at(Instant::now() + sweep_interval, sweep_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    info!(
        interval_secs = sweep_interval.as_secs(),
        timeout_secs = timeout.as_secs(),
        "Starting aggregation sweeper"
    );

    loop {
        tokio::select! {
            _ = shutdown_rx.wait_for(|&v| v) => break,
            _ = ticker.tick() => {
                let removed = sweep_once(&store, timeout);
                if removed > 0 {
                    info!(removed, open = store.open_groups(), "Expiry sweep finished");
                }
            }
        }
    }

    debug!("Aggregation sweeper stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::InMemoryBroker;
    use crate::config::types::DuplicatePolicy;
    use crate::message::{CorrelationId, UnitRequest};

    fn failure(id: &str, city: &str, index: usize, total: usize) -> UnitResult {
        let request = UnitRequest::new(CorrelationId::from(id), city, index, total);
        UnitResult::failure(&request, "provider unavailable")
    }

    #[tokio::test]
    async fn test_completed_group_publishes_report() {
        let store = AggregationStore::new(DuplicatePolicy::Deduplicate);
        let (broker, mut queues) = InMemoryBroker::new(8);

        process_result(&store, &broker, failure("c-1", "Lima", 0, 2))
            .await
            .unwrap();
        assert!(queues.reports.try_recv().is_err());

        process_result(&store, &broker, failure("c-1", "Quito", 1, 2))
            .await
            .unwrap();
        let report = queues.reports.try_recv().unwrap();
        assert_eq!(report.failure_count, 2);
        assert_eq!(report.results[0].unit_key, "Lima");
    }

    #[tokio::test]
    async fn test_publish_failure_is_reported() {
        let store = AggregationStore::new(DuplicatePolicy::Deduplicate);
        let (broker, queues) = InMemoryBroker::new(8);
        drop(queues);

        let err = process_result(&store, &broker, failure("c-1", "Lima", 0, 1))
            .await
            .unwrap_err();
        assert!(matches!(err, CollectorError::Broker(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweeper_evicts_on_tick() {
        let store = Arc::new(AggregationStore::new(DuplicatePolicy::Deduplicate));
        store.on_unit_result(failure("c-1", "Lima", 0, 3));

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(run_sweeper(
            Arc::clone(&store),
            Duration::from_secs(30),
            Duration::from_secs(45),
            shutdown_rx,
        ));

        // First tick at 30s: group is 30s old, not yet past the timeout
        tokio::time::sleep(Duration::from_secs(31)).await;
        assert!(store.contains(&CorrelationId::from("c-1")));

        // Second tick at 60s evicts it
        tokio::time::sleep(Duration::from_secs(30)).await;
        assert!(!store.contains(&CorrelationId::from("c-1")));
        assert_eq!(store.stats().expired, 1);

        shutdown_tx.send(true).unwrap();
        handle.await.unwrap();
    }
}
