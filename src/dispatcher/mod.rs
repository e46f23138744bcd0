pub mod waiter;

use crate::broker::{Broker, BrokerError};
use crate::message::{AggregatedReport, CorrelationId, UnitRequest};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

pub use waiter::{PendingWaiters, WaitError, Waiter};

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("invalid batch: {0}")]
    Validation(String),

    #[error("timed out waiting for aggregated report {correlation_id} (timeout {timeout:?})")]
    Timeout {
        correlation_id: CorrelationId,
        timeout: Duration,
    },

    #[error("request {correlation_id} was cancelled")]
    Cancelled { correlation_id: CorrelationId },

    #[error("correlation id {0} is already in flight")]
    DuplicateCorrelationId(CorrelationId),

    #[error("broker error: {0}")]
    Broker(#[from] BrokerError),
}

/// Fans a batch out as unit requests and waits for the aggregated report
pub struct Dispatcher {
    broker: Arc<dyn Broker>,
    waiters: Arc<PendingWaiters>,
    request_timeout: Duration,
}

impl Dispatcher {
    pub fn new(
        broker: Arc<dyn Broker>,
        waiters: Arc<PendingWaiters>,
        request_timeout: Duration,
    ) -> Self {
        Self {
            broker,
            waiters,
            request_timeout,
        }
    }

    /// Number of batch requests currently waiting for a report
    pub fn pending(&self) -> usize {
        self.waiters.len()
    }

    pub async fn submit_batch(
        &self,
        items: Vec<String>,
    ) -> Result<AggregatedReport, DispatchError> {
        self.submit_batch_with_cancel(items, &CancellationToken::new()).await
    }

    /// Submit a batch, giving up early if `cancel` fires.
    ///
    /// Emits one unit request per item. The deadline and `cancel` apply from
    /// the moment the waiter is registered, including while a full request
    /// queue holds up publishing. The waiter is removed on every exit path, so
    /// a report arriving afterwards is dropped.
    pub async fn submit_batch_with_cancel(
        &self,
        items: Vec<String>,
        cancel: &CancellationToken,
    ) -> Result<AggregatedReport, DispatchError> {
        let items = validate_items(items)?;

        let correlation_id = CorrelationId::generate();
        let total_units = items.len();
        info!(
            correlation_id = %correlation_id,
            units = total_units,
            "Dispatching batch request"
        );

        let deadline = Instant::now() + self.request_timeout;
        let waiter = self
            .waiters
            .register(correlation_id.clone(), deadline)
            .ok_or_else(|| DispatchError::DuplicateCorrelationId(correlation_id.clone()))?;

        let publish = self.publish_units(&correlation_id, items);
        let published = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(WaitError::Cancelled),
            _ = tokio::time::sleep_until(waiter.deadline()) => Err(WaitError::Timeout),
            published = publish => Ok(published),
        };

        let outcome = match published {
            Ok(Ok(())) => waiter.wait(cancel).await,
            Ok(Err(e)) => {
                error!(correlation_id = %correlation_id, error = %e, "Failed to send unit request");
                return Err(DispatchError::Broker(e));
            }
            Err(e) => {
                debug!(correlation_id = %correlation_id, "Gave up while sending unit requests");
                Err(e)
            }
        };

        match outcome {
            Ok(report) => {
                info!(
                    correlation_id = %correlation_id,
                    successful = report.success_count,
                    failed = report.failure_count,
                    "Received aggregated report"
                );
                Ok(report)
            }
            Err(WaitError::Timeout) => {
                warn!(
                    correlation_id = %correlation_id,
                    timeout_secs = self.request_timeout.as_secs(),
                    "Timed out waiting for aggregated report"
                );
                Err(DispatchError::Timeout {
                    correlation_id,
                    timeout: self.request_timeout,
                })
            }
            Err(WaitError::Cancelled) => {
                info!(correlation_id = %correlation_id, "Batch request cancelled");
                Err(DispatchError::Cancelled { correlation_id })
            }
        }
    }

    async fn publish_units(
        &self,
        correlation_id: &CorrelationId,
        items: Vec<String>,
    ) -> Result<(), BrokerError> {
        let total_units = items.len();
        for (unit_index, unit_key) in items.into_iter().enumerate() {
            debug!(correlation_id = %correlation_id, unit_key = %unit_key, "Sending unit request");
            let request =
                UnitRequest::new(correlation_id.clone(), unit_key, unit_index, total_units);
            self.broker.publish_request(request).await?;
        }
        Ok(())
    }

    /// Route an aggregated report to its waiter. Redeliveries and reports for
    /// requests that already returned are dropped.
    pub fn deliver_report(&self, report: AggregatedReport) -> bool {
        let correlation_id = report.correlation_id.clone();
        let delivered = self.waiters.fulfill(report);

        if delivered {
            debug!(correlation_id = %correlation_id, "Completed pending request");
        } else {
            warn!(
                correlation_id = %correlation_id,
                "No pending request found for aggregated report"
            );
        }

        delivered
    }
}

/// Trim items and reject empty batches or blank entries
fn validate_items(items: Vec<String>) -> Result<Vec<String>, DispatchError> {
    if items.is_empty() {
        return Err(DispatchError::Validation(
            "cities list cannot be empty".to_string(),
        ));
    }

    items
        .into_iter()
        .enumerate()
        .map(|(i, item)| {
            let trimmed = item.trim();
            if trimmed.is_empty() {
                Err(DispatchError::Validation(format!("city at index {} is blank", i)))
            } else {
                Ok(trimmed.to_string())
            }
        })
        .collect()
}

/// Feed reports from the broker's report queue to the dispatcher's waiters
pub async fn run_report_listener(
    dispatcher: Arc<Dispatcher>,
    mut reports: mpsc::Receiver<AggregatedReport>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            _ = shutdown_rx.wait_for(|&v| v) => break,
            report = reports.recv() => match report {
                Some(report) => {
                    info!(correlation_id = %report.correlation_id, "Received aggregated report");
                    dispatcher.deliver_report(report);
                }
                None => {
                    error!("Report queue closed");
                    break;
                }
            },
        }
    }

    debug!("Report listener stopped");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_rejects_empty_batch() {
        let err = validate_items(Vec::new()).unwrap_err();
        assert!(matches!(err, DispatchError::Validation(_)));
    }

    #[test]
    fn test_validate_rejects_blank_city() {
        let err = validate_items(vec!["Paris".to_string(), "   ".to_string()]).unwrap_err();
        assert_eq!(err.to_string(), "invalid batch: city at index 1 is blank");
    }

    #[test]
    fn test_validate_trims() {
        let items = validate_items(vec![" Paris ".to_string(), "Oslo".to_string()]).unwrap();
        assert_eq!(items, vec!["Paris", "Oslo"]);
    }
}
