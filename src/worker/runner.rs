use crate::broker::{Broker, SharedReceiver};
use crate::message::{UnitRequest, UnitResult};
use crate::worker::provider::WeatherProvider;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

/// Consumes unit requests and emits exactly one unit result for each
pub struct Worker {
    worker_id: usize,
    provider: Arc<dyn WeatherProvider>,
    broker: Arc<dyn Broker>,
    pacing_delay: Duration,
}

impl Worker {
    pub fn new(
        worker_id: usize,
        provider: Arc<dyn WeatherProvider>,
        broker: Arc<dyn Broker>,
        pacing_delay: Duration,
    ) -> Self {
        Self {
            worker_id,
            provider,
            broker,
            pacing_delay,
        }
    }

    /// Look up one city. Provider failures become failed results; this never errors.
    pub async fn process(&self, request: &UnitRequest) -> UnitResult {
        info!(
            worker_id = self.worker_id,
            correlation_id = %request.correlation_id,
            unit_key = %request.unit_key,
            "Received unit request"
        );

        if !self.pacing_delay.is_zero() {
            debug!(delay_ms = self.pacing_delay.as_millis() as u64, "Applying pacing delay");
            tokio::time::sleep(self.pacing_delay).await;
        }

        match self.provider.current_weather(&request.unit_key).await {
            Ok(payload) => {
                info!(
                    unit_key = %request.unit_key,
                    temperature = payload.temperature,
                    description = %payload.description,
                    "Fetched weather"
                );
                UnitResult::success(request, payload)
            }
            Err(e) => {
                error!(unit_key = %request.unit_key, error = %e, "Error fetching weather");
                UnitResult::failure(
                    request,
                    format!("Failed to fetch weather data for {}: {}", request.unit_key, e),
                )
            }
        }
    }

    pub async fn run(
        self,
        queue: SharedReceiver<UnitRequest>,
        mut shutdown_rx: watch::Receiver<bool>,
    ) {
        loop {
            let request = tokio::select! {
                _ = shutdown_rx.wait_for(|&v| v) => break,
                request = queue.recv() => match request {
                    Some(request) => request,
                    None => break,
                },
            };

            let result = self.process(&request).await;
            if let Err(e) = self.broker.publish_result(result).await {
                error!(
                    worker_id = self.worker_id,
                    correlation_id = %request.correlation_id,
                    unit_key = %request.unit_key,
                    error = %e,
                    "Failed to publish unit result"
                );
            }
        }

        debug!(worker_id = self.worker_id, "Worker stopped");
    }
}

/// Start `concurrency` workers competing for the request queue
pub fn spawn_pool(
    concurrency: usize,
    provider: Arc<dyn WeatherProvider>,
    broker: Arc<dyn Broker>,
    pacing_delay: Duration,
    queue: SharedReceiver<UnitRequest>,
    shutdown_rx: watch::Receiver<bool>,
) -> Vec<JoinHandle<()>> {
    (0..concurrency.max(1))
        .map(|worker_id| {
            let worker = Worker::new(
                worker_id,
                Arc::clone(&provider),
                Arc::clone(&broker),
                pacing_delay,
            );
            tokio::spawn(worker.run(queue.clone(), shutdown_rx.clone()))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::InMemoryBroker;
    use crate::message::{CorrelationId, WeatherPayload};
    use crate::worker::provider::ProviderError;
    use async_trait::async_trait;

    struct FixedProvider;

    #[async_trait]
    impl WeatherProvider for FixedProvider {
        async fn current_weather(&self, city: &str) -> Result<WeatherPayload, ProviderError> {
            if city == "Atlantis" {
                return Err(ProviderError::Status {
                    status: 404,
                    message: "city not found".to_string(),
                });
            }
            Ok(WeatherPayload {
                temperature: 21.0,
                description: "clear sky".to_string(),
                humidity: 30,
                wind_speed: 2.0,
            })
        }
    }

    fn worker(broker: Arc<dyn Broker>, delay: Duration) -> Worker {
        Worker::new(0, Arc::new(FixedProvider), broker, delay)
    }

    #[tokio::test]
    async fn test_provider_failure_becomes_failed_result() {
        let (broker, _queues) = InMemoryBroker::new(4);
        let request = UnitRequest::new(CorrelationId::from("c-1"), "Atlantis", 2, 3);

        let result = worker(Arc::new(broker), Duration::ZERO).process(&request).await;

        assert!(!result.success);
        assert_eq!(result.unit_index, 2);
        assert_eq!(result.total_units, 3);
        let message = result.error_message.unwrap();
        assert!(message.contains("Atlantis"));
        assert!(message.contains("404"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_pacing_delay_applied_before_lookup() {
        let (broker, _queues) = InMemoryBroker::new(4);
        let request = UnitRequest::new(CorrelationId::from("c-1"), "Oslo", 0, 1);

        let start = tokio::time::Instant::now();
        let result = worker(Arc::new(broker), Duration::from_millis(500))
            .process(&request)
            .await;

        assert!(result.success);
        assert!(start.elapsed() >= Duration::from_millis(500));
    }

    #[tokio::test]
    async fn test_run_emits_one_result_per_request() {
        let (broker, mut queues) = InMemoryBroker::new(8);
        let broker: Arc<dyn Broker> = Arc::new(broker);
        let id = CorrelationId::from("c-1");
        for (i, city) in ["Oslo", "Atlantis", "Rome"].iter().enumerate() {
            broker
                .publish_request(UnitRequest::new(id.clone(), *city, i, 3))
                .await
                .unwrap();
        }

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(
            worker(Arc::clone(&broker), Duration::ZERO).run(queues.requests.clone(), shutdown_rx),
        );

        let mut outcomes = Vec::new();
        for _ in 0..3 {
            let result = queues.results.recv().await.unwrap();
            outcomes.push((result.unit_key, result.success));
        }
        assert_eq!(
            outcomes,
            vec![
                ("Oslo".to_string(), true),
                ("Atlantis".to_string(), false),
                ("Rome".to_string(), true),
            ]
        );

        shutdown_tx.send(true).unwrap();
        handle.await.unwrap();
        assert!(queues.reports.try_recv().is_err());
    }
}
