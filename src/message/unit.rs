use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Join key shared by every message that belongs to one batch request
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CorrelationId(String);

impl CorrelationId {
    /// Mint a fresh id (UUID v4)
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for CorrelationId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for CorrelationId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// One unit of fanned-out work: a weather lookup for a single city
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnitRequest {
    pub correlation_id: CorrelationId,

    /// City name
    pub unit_key: String,

    /// Position of this unit in the submitted batch (0-based). Required: a
    /// repeated city is only told apart from a redelivery by its position.
    pub unit_index: usize,

    /// Number of units the batch was split into
    pub total_units: usize,

    pub created_at: DateTime<Utc>,
}

impl UnitRequest {
    pub fn new(
        correlation_id: CorrelationId,
        unit_key: impl Into<String>,
        unit_index: usize,
        total_units: usize,
    ) -> Self {
        Self {
            correlation_id,
            unit_key: unit_key.into(),
            unit_index,
            total_units,
            created_at: Utc::now(),
        }
    }
}

/// Current conditions returned by the weather provider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WeatherPayload {
    /// Degrees Celsius
    pub temperature: f64,
    pub description: String,
    /// Percent
    pub humidity: i64,
    /// Meters per second
    pub wind_speed: f64,
}

/// Outcome of one unit of work.
///
/// Workers emit exactly one of these per `UnitRequest` they consume, success or
/// failure. `payload` is set iff `success`, `error_message` iff not.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnitResult {
    pub correlation_id: CorrelationId,
    pub unit_key: String,
    pub unit_index: usize,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<WeatherPayload>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    pub total_units: usize,
    pub created_at: DateTime<Utc>,
}

impl UnitResult {
    pub fn success(request: &UnitRequest, payload: WeatherPayload) -> Self {
        Self {
            correlation_id: request.correlation_id.clone(),
            unit_key: request.unit_key.clone(),
            unit_index: request.unit_index,
            success: true,
            payload: Some(payload),
            error_message: None,
            total_units: request.total_units,
            created_at: Utc::now(),
        }
    }

    pub fn failure(request: &UnitRequest, error_message: impl Into<String>) -> Self {
        Self {
            correlation_id: request.correlation_id.clone(),
            unit_key: request.unit_key.clone(),
            unit_index: request.unit_index,
            success: false,
            payload: None,
            error_message: Some(error_message.into()),
            total_units: request.total_units,
            created_at: Utc::now(),
        }
    }
}
