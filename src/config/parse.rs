use super::types::*;
use crate::config::{env_var_pattern, expand_env_vars};
use std::fs;
use std::net::SocketAddr;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse YAML: {0}")]
    YamlParse(#[from] serde_yaml::Error),

    #[error("validation failed:\n{}", .0.join("\n"))]
    ValidationList(Vec<String>),

    #[error("validation failed: {0}")]
    Validation(String),
}

pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    let yaml_string = fs::read_to_string(path).map_err(|e| {
        ConfigError::Io(std::io::Error::new(
            e.kind(),
            format!("failed to read config file '{}': {}", path.display(), e),
        ))
    })?;

    parse_config(&yaml_string).map_err(|e| match e {
        ConfigError::YamlParse(e) => ConfigError::Io(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!("in file '{}': {}", path.display(), e),
        )),
        other => other,
    })
}

/// Parse and validate a config from YAML text, expanding `$env{VAR}` first
pub fn parse_config(yaml: &str) -> Result<Config, ConfigError> {
    let yaml_string = expand_env_vars(yaml);
    check_unexpanded_vars(&yaml_string)?;

    let config: Config = serde_yaml::from_str(&yaml_string)?;
    validate_config(&config)?;

    Ok(config)
}

/// Checks for unexpanded environment variables and returns a helpful error
fn check_unexpanded_vars(yaml_string: &str) -> Result<(), ConfigError> {
    let mut unexpanded_vars: Vec<String> = env_var_pattern()
        .captures_iter(yaml_string)
        .filter_map(|cap| cap.get(1).map(|m| m.as_str().to_string()))
        .collect();

    if unexpanded_vars.is_empty() {
        return Ok(());
    }

    unexpanded_vars.sort();
    unexpanded_vars.dedup();

    let error_msg = if unexpanded_vars.len() == 1 {
        format!(
            "Environment variable $env{{{0}}} is not set.\n\
             \n\
             To fix this, either:\n\
             1. Set the environment variable: export {0}=...\n\
             2. Replace $env{{{0}}} in the config file with an actual value",
            unexpanded_vars[0]
        )
    } else {
        format!(
            "Environment variables are not set: {}\n\
             \n\
             To fix this, either:\n\
             1. Set the environment variables\n\
             2. Replace the variables in the config file with actual values",
            unexpanded_vars.join(", ")
        )
    };

    Err(ConfigError::Validation(error_msg))
}

pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    let mut errors = Vec::new();

    if config.web.listen.parse::<SocketAddr>().is_err() {
        errors.push(format!(
            "web.listen: '{}' is not a valid socket address",
            config.web.listen
        ));
    }

    if config.dispatcher.request_timeout.is_zero() {
        errors.push("dispatcher.request_timeout must be greater than zero".to_string());
    }

    let collector = &config.collector;
    if collector.aggregation_timeout.is_zero() {
        errors.push("collector.aggregation_timeout must be greater than zero".to_string());
    }
    if collector.sweep_interval.is_zero() {
        errors.push("collector.sweep_interval must be greater than zero".to_string());
    }
    if collector.consumers == 0 {
        errors.push("collector.consumers must be at least 1".to_string());
    }
    if collector.shards == 0 {
        errors.push("collector.shards must be at least 1".to_string());
    }

    let worker = &config.worker;
    if worker.concurrency == 0 {
        errors.push("worker.concurrency must be at least 1".to_string());
    }
    if reqwest::Url::parse(&worker.provider.url).is_err() {
        errors.push(format!(
            "worker.provider.url: '{}' is not a valid URL",
            worker.provider.url
        ));
    }
    if worker.provider.api_key.trim().is_empty() {
        errors.push("worker.provider.api_key cannot be empty".to_string());
    }

    if config.broker.capacity == 0 {
        errors.push("broker.capacity must be at least 1".to_string());
    }

    if errors.is_empty() {
        if collector.aggregation_timeout < config.dispatcher.request_timeout {
            tracing::warn!(
                aggregation_timeout = ?collector.aggregation_timeout,
                request_timeout = ?config.dispatcher.request_timeout,
                "Aggregation groups may be evicted before their requests time out"
            );
        }
        Ok(())
    } else {
        Err(ConfigError::ValidationList(errors))
    }
}
