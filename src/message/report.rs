use super::unit::{CorrelationId, UnitResult, WeatherPayload};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Per-city entry of an aggregated report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnitReport {
    pub unit_key: String,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<WeatherPayload>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl From<&UnitResult> for UnitReport {
    fn from(result: &UnitResult) -> Self {
        Self {
            unit_key: result.unit_key.clone(),
            success: result.success,
            payload: result.payload.clone(),
            error_message: result.error_message.clone(),
        }
    }
}

/// The single answer delivered back to the caller of a batch request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregatedReport {
    pub correlation_id: CorrelationId,
    pub total_units: usize,

    /// Results in arrival order
    pub results: Vec<UnitReport>,

    pub success_count: usize,
    pub failure_count: usize,
    pub produced_at: DateTime<Utc>,
}

impl AggregatedReport {
    pub fn from_results(
        correlation_id: CorrelationId,
        total_units: usize,
        received: &[UnitResult],
    ) -> Self {
        let success_count = received.iter().filter(|r| r.success).count();

        Self {
            correlation_id,
            total_units,
            results: received.iter().map(UnitReport::from).collect(),
            success_count,
            failure_count: received.len() - success_count,
            produced_at: Utc::now(),
        }
    }
}
