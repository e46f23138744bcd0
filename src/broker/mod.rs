pub mod memory;

use crate::message::{AggregatedReport, UnitRequest, UnitResult};
use async_trait::async_trait;
use thiserror::Error;

pub use memory::{InMemoryBroker, Queues, SharedReceiver};

#[derive(Debug, Error)]
pub enum BrokerError {
    #[error("{queue} queue is closed")]
    Closed { queue: &'static str },
}

/// Publishing side of the message broker.
///
/// Delivery is at-least-once: consumers must tolerate redelivered messages.
#[async_trait]
pub trait Broker: Send + Sync {
    /// Fan-out leg: dispatcher to workers
    async fn publish_request(&self, request: UnitRequest) -> Result<(), BrokerError>;

    /// Worker to collector
    async fn publish_result(&self, result: UnitResult) -> Result<(), BrokerError>;

    /// Collector back to the dispatcher
    async fn publish_report(&self, report: AggregatedReport) -> Result<(), BrokerError>;
}
