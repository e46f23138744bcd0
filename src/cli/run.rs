use crate::config::parse::load_config;
use crate::pipeline::Pipeline;
use crate::web::{run_server, AppState};
use crate::worker::{OpenWeatherMapClient, ProviderError};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tokio::signal;
use tracing::{error, info};

#[derive(Debug, Error)]
pub enum RunError {
    #[error("config error: {0}")]
    Config(#[from] crate::config::parse::ConfigError),

    #[error("provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("task join error: {0}")]
    Join(#[from] tokio::task::JoinError),

    #[error("web server error: {0}")]
    WebServer(#[from] std::io::Error),
}

pub async fn run(config_path: Option<PathBuf>) -> Result<(), Box<dyn std::error::Error>> {
    let config_path = match config_path {
        Some(path) => path,
        None => {
            eprintln!("Error: config not found");
            eprintln!("Searched locations:");
            eprintln!("  ~/.config/gather/config.yml");
            eprintln!("  /etc/gather/config.yml");
            eprintln!("\nUse --config <path> to specify a config file, or run 'gather config init' to generate one.");
            std::process::exit(1);
        }
    };

    run_service(&config_path).await.map_err(|e| e.into())
}

async fn run_service(config_path: &PathBuf) -> Result<(), RunError> {
    info!(config_path = %config_path.display(), "Loading configuration");
    let config = load_config(config_path)?;

    let provider = Arc::new(OpenWeatherMapClient::new(&config.worker.provider)?);
    let pipeline = Pipeline::start(&config, provider);

    let instance_id = hostname::get()
        .ok()
        .and_then(|h| h.to_str().map(|s| s.to_string()))
        .unwrap_or_else(|| "gather".to_string());

    let state = Arc::new(AppState {
        instance_id,
        version: env!("CARGO_PKG_VERSION").to_string(),
        start_time: Instant::now(),
        dispatcher: pipeline.dispatcher(),
        store: pipeline.store(),
    });

    let web_config = config.web.clone();
    let web_shutdown = pipeline.shutdown_signal();
    let mut web_handle =
        tokio::spawn(async move { run_server(state, web_config, web_shutdown).await });

    info!("Service started, press Ctrl+C to shutdown");

    let web_result = tokio::select! {
        _ = signal::ctrl_c() => {
            info!("Shutdown signal received");
            None
        }
        result = &mut web_handle => Some(result),
    };

    pipeline.shutdown().await;

    let web_result = match web_result {
        Some(result) => result,
        None => web_handle.await,
    };

    match web_result {
        Ok(Ok(())) => {
            info!("Service shutdown complete");
            Ok(())
        }
        Ok(Err(e)) => {
            error!(error = %e, "Web server error");
            Err(RunError::WebServer(e))
        }
        Err(e) => Err(RunError::Join(e)),
    }
}
