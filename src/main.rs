use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "gather")]
#[command(about = "Scatter-gather weather aggregation service", long_about = None)]
struct Cli {
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the service (default)
    Run,
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
    /// Request an aggregated forecast from a running instance
    Submit {
        #[arg(long, default_value = "http://127.0.0.1:8080")]
        url: String,

        /// Client-side timeout in seconds
        #[arg(long, default_value_t = 90)]
        timeout_secs: u64,

        #[arg(required = true)]
        cities: Vec<String>,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Write a starter config
    Init {
        #[arg(long)]
        stdout: bool,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "gather=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Run) | None => {
            let config_path = gather::config::resolve_config_path(cli.config.as_deref());
            gather::cli::run::run(config_path).await?;
        }
        Some(Commands::Config { action }) => match action {
            ConfigAction::Init { stdout } => {
                gather::cli::config::init(stdout)?;
            }
        },
        Some(Commands::Submit {
            url,
            timeout_secs,
            cities,
        }) => {
            gather::cli::submit::run(&url, cities, Duration::from_secs(timeout_secs)).await?;
        }
    }

    Ok(())
}
