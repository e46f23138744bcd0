use crate::config::types::ProviderConfig;
use crate::message::WeatherPayload;
use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("invalid provider URL: {0}")]
    InvalidUrl(String),

    #[error("provider returned error status {status}: {message}")]
    Status { status: u16, message: String },
}

/// Source of current weather conditions for a city
#[async_trait]
pub trait WeatherProvider: Send + Sync {
    async fn current_weather(&self, city: &str) -> Result<WeatherPayload, ProviderError>;
}

/// HTTP client for the OpenWeatherMap current-weather endpoint
#[derive(Debug)]
pub struct OpenWeatherMapClient {
    base_url: reqwest::Url,
    api_key: String,
    units: String,
    client: reqwest::Client,
}

impl OpenWeatherMapClient {
    pub fn new(config: &ProviderConfig) -> Result<Self, ProviderError> {
        let base_url = reqwest::Url::parse(&config.url)
            .map_err(|e| ProviderError::InvalidUrl(format!("{}: {}", config.url, e)))?;
        let client = reqwest::Client::builder().timeout(config.timeout).build()?;

        Ok(Self {
            base_url,
            api_key: config.api_key.clone(),
            units: config.units.clone(),
            client,
        })
    }

    fn request_url(&self, city: &str) -> reqwest::Url {
        let mut url = self.base_url.clone();
        url.query_pairs_mut()
            .append_pair("q", city)
            .append_pair("appid", &self.api_key)
            .append_pair("units", &self.units);
        url
    }

    fn redacted(&self, url: &reqwest::Url) -> String {
        url.as_str().replace(&self.api_key, "***")
    }
}

#[async_trait]
impl WeatherProvider for OpenWeatherMapClient {
    async fn current_weather(&self, city: &str) -> Result<WeatherPayload, ProviderError> {
        let url = self.request_url(city);
        tracing::debug!(city = %city, url = %self.redacted(&url), "Fetching weather data");

        let response = self.client.get(url).send().await?;

        if !response.status().is_success() {
            return Err(ProviderError::Status {
                status: response.status().as_u16(),
                message: response.text().await.unwrap_or_default(),
            });
        }

        let body: OpenWeatherMapResponse = response.json().await?;
        let payload = body.into_payload();
        tracing::debug!(
            city = %city,
            temperature = payload.temperature,
            humidity = payload.humidity,
            wind_speed = payload.wind_speed,
            "Received weather data"
        );

        Ok(payload)
    }
}

// ===== Response Types =====

#[derive(Debug, Clone, Deserialize)]
pub struct OpenWeatherMapResponse {
    #[serde(default)]
    pub name: Option<String>,
    pub main: MainReading,
    #[serde(default)]
    pub weather: Vec<Condition>,
    #[serde(default)]
    pub wind: Wind,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MainReading {
    pub temp: f64,
    pub humidity: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Condition {
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Wind {
    #[serde(default)]
    pub speed: f64,
}

impl OpenWeatherMapResponse {
    pub fn into_payload(self) -> WeatherPayload {
        let description = self
            .weather
            .into_iter()
            .next()
            .and_then(|c| c.description)
            .unwrap_or_else(|| "No description available".to_string());

        WeatherPayload {
            temperature: self.main.temp,
            description,
            humidity: self.main.humidity,
            wind_speed: self.wind.speed,
        }
    }
}
