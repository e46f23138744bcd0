use super::{Broker, BrokerError};
use crate::message::{AggregatedReport, UnitRequest, UnitResult};
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};

pub type Sender<T> = mpsc::Sender<T>;
pub type Receiver<T> = mpsc::Receiver<T>;

/// Create a bounded channel with the specified buffer size
pub fn create_channel<T>(buffer_size: usize) -> (Sender<T>, Receiver<T>) {
    mpsc::channel(buffer_size.max(1))
}

/// A queue consumed by several competing tasks; each message goes to exactly one
pub struct SharedReceiver<T> {
    inner: Arc<Mutex<Receiver<T>>>,
}

impl<T> SharedReceiver<T> {
    pub fn new(receiver: Receiver<T>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(receiver)),
        }
    }

    /// Next message, or None once every publisher is gone and the queue is drained
    pub async fn recv(&self) -> Option<T> {
        self.inner.lock().await.recv().await
    }
}

impl<T> Clone for SharedReceiver<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

/// Consuming ends of the in-process broker
pub struct Queues {
    pub requests: SharedReceiver<UnitRequest>,
    pub results: SharedReceiver<UnitResult>,
    pub reports: Receiver<AggregatedReport>,
}

/// Broker backed by bounded in-process queues.
///
/// Clones share the same queues. Consumers see their queue close once every
/// clone has been dropped.
#[derive(Clone)]
pub struct InMemoryBroker {
    requests: Sender<UnitRequest>,
    results: Sender<UnitResult>,
    reports: Sender<AggregatedReport>,
}

impl InMemoryBroker {
    pub fn new(capacity: usize) -> (Self, Queues) {
        let (request_tx, request_rx) = create_channel(capacity);
        let (result_tx, result_rx) = create_channel(capacity);
        let (report_tx, report_rx) = create_channel(capacity);

        let broker = Self {
            requests: request_tx,
            results: result_tx,
            reports: report_tx,
        };
        let queues = Queues {
            requests: SharedReceiver::new(request_rx),
            results: SharedReceiver::new(result_rx),
            reports: report_rx,
        };

        (broker, queues)
    }
}

#[async_trait]
impl Broker for InMemoryBroker {
    async fn publish_request(&self, request: UnitRequest) -> Result<(), BrokerError> {
        self.requests
            .send(request)
            .await
            .map_err(|_| BrokerError::Closed { queue: "request" })
    }

    async fn publish_result(&self, result: UnitResult) -> Result<(), BrokerError> {
        self.results
            .send(result)
            .await
            .map_err(|_| BrokerError::Closed { queue: "result" })
    }

    async fn publish_report(&self, report: AggregatedReport) -> Result<(), BrokerError> {
        self.reports
            .send(report)
            .await
            .map_err(|_| BrokerError::Closed { queue: "report" })
    }
}
