use crate::broker::{Broker, InMemoryBroker};
use crate::collector::{run_sweeper, spawn_consumers, AggregationStore};
use crate::config::Config;
use crate::dispatcher::{run_report_listener, Dispatcher, PendingWaiters};
use crate::worker::{spawn_pool, WeatherProvider};
use futures::future::join_all;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info};

/// A running scatter-gather pipeline: dispatcher, worker pool, collector and
/// sweeper, wired through an in-process broker.
pub struct Pipeline {
    dispatcher: Arc<Dispatcher>,
    store: Arc<AggregationStore>,
    shutdown_tx: watch::Sender<bool>,
    handles: Vec<JoinHandle<()>>,
}

impl Pipeline {
    /// Spawn all pipeline tasks. Must be called from within a tokio runtime.
    pub fn start(config: &Config, provider: Arc<dyn WeatherProvider>) -> Self {
        let (broker, queues) = InMemoryBroker::new(config.broker.capacity);
        let broker: Arc<dyn Broker> = Arc::new(broker);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let store = Arc::new(AggregationStore::with_shards(
            config.collector.duplicate_policy,
            config.collector.shards,
        ));
        let dispatcher = Arc::new(Dispatcher::new(
            Arc::clone(&broker),
            Arc::new(PendingWaiters::new()),
            config.dispatcher.request_timeout,
        ));

        let mut handles = Vec::new();

        info!(workers = config.worker.concurrency, "Starting worker pool");
        handles.extend(spawn_pool(
            config.worker.concurrency,
            provider,
            Arc::clone(&broker),
            config.worker.pacing_delay,
            queues.requests,
            shutdown_rx.clone(),
        ));

        info!(consumers = config.collector.consumers, "Starting collector");
        handles.extend(spawn_consumers(
            config.collector.consumers,
            queues.results,
            Arc::clone(&store),
            Arc::clone(&broker),
            shutdown_rx.clone(),
        ));

        handles.push(tokio::spawn(run_sweeper(
            Arc::clone(&store),
            config.collector.sweep_interval,
            config.collector.aggregation_timeout,
            shutdown_rx.clone(),
        )));

        handles.push(tokio::spawn(run_report_listener(
            Arc::clone(&dispatcher),
            queues.reports,
            shutdown_rx,
        )));

        Self {
            dispatcher,
            store,
            shutdown_tx,
            handles,
        }
    }

    pub fn dispatcher(&self) -> Arc<Dispatcher> {
        Arc::clone(&self.dispatcher)
    }

    pub fn store(&self) -> Arc<AggregationStore> {
        Arc::clone(&self.store)
    }

    /// Receiver that flips to true when `shutdown` is called
    pub fn shutdown_signal(&self) -> watch::Receiver<bool> {
        self.shutdown_tx.subscribe()
    }

    /// Signal every task to stop and wait for them
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(true);

        for result in join_all(self.handles).await {
            if let Err(e) = result {
                error!(error = %e, "Pipeline task join error");
            }
        }

        info!("Pipeline shutdown complete");
    }
}
