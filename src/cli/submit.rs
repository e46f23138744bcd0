use crate::message::AggregatedReport;
use serde::Serialize;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SubmitError {
    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("JSON serialization failed: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("service returned error status {status}: {message}")]
    Service { status: u16, message: String },
}

#[derive(Debug, Serialize)]
struct ForecastBody<'a> {
    cities: &'a [String],
}

pub fn forecast_url(base_url: &str) -> String {
    format!("{}/api/weather/forecast", base_url.trim_end_matches('/'))
}

/// Post a forecast request to a running instance and return its report
pub async fn submit(
    base_url: &str,
    cities: &[String],
    timeout: Duration,
) -> Result<AggregatedReport, SubmitError> {
    let client = reqwest::Client::builder().timeout(timeout).build()?;
    let response = client
        .post(forecast_url(base_url))
        .json(&ForecastBody { cities })
        .send()
        .await?;

    if !response.status().is_success() {
        return Err(SubmitError::Service {
            status: response.status().as_u16(),
            message: response.text().await.unwrap_or_default(),
        });
    }

    Ok(response.json().await?)
}

/// `gather submit`: print the aggregated report as pretty JSON
pub async fn run(
    base_url: &str,
    cities: Vec<String>,
    timeout: Duration,
) -> Result<(), Box<dyn std::error::Error>> {
    let report = submit(base_url, &cities, timeout).await?;
    println!("{}", serde_json::to_string_pretty(&report).map_err(SubmitError::from)?);
    Ok(())
}
