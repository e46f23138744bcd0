use crate::collector::{AggregationStore, StoreStats};
use crate::dispatcher::{DispatchError, Dispatcher};
use crate::message::AggregatedReport;
use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;

/// Shared state for the HTTP API
pub struct AppState {
    pub instance_id: String,
    pub version: String,
    pub start_time: Instant,
    pub dispatcher: Arc<Dispatcher>,
    pub store: Arc<AggregationStore>,
}

#[derive(Debug, Deserialize)]
pub struct ForecastRequest {
    #[serde(default)]
    pub cities: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub instance_id: String,
    pub version: String,
    pub uptime_seconds: u64,
    pub pending_requests: usize,
    pub aggregation: StoreStats,
}

/// POST /api/weather/forecast
pub async fn forecast(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<ForecastRequest>, JsonRejection>,
) -> Result<Json<AggregatedReport>, ApiError> {
    let Json(request) = payload?;
    tracing::info!(cities = request.cities.len(), "Received forecast request");

    let report = state.dispatcher.submit_batch(request.cities).await?;

    tracing::info!(
        correlation_id = %report.correlation_id,
        reports = report.results.len(),
        "Returning aggregated report"
    );
    Ok(Json(report))
}

/// GET /api/weather/health
pub async fn health() -> &'static str {
    "Weather API Service is running"
}

/// GET /api/status
pub async fn status(State(state): State<Arc<AppState>>) -> Json<StatusResponse> {
    Json(StatusResponse {
        instance_id: state.instance_id.clone(),
        version: state.version.clone(),
        uptime_seconds: state.start_time.elapsed().as_secs(),
        pending_requests: state.dispatcher.pending(),
        aggregation: state.store.stats(),
    })
}

// Error handling
#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    GatewayTimeout(String),
    BadGateway(String),
    InternalError(String),
}

impl From<DispatchError> for ApiError {
    fn from(err: DispatchError) -> Self {
        match err {
            DispatchError::Validation(_) => ApiError::BadRequest(err.to_string()),
            DispatchError::Timeout { .. } => ApiError::GatewayTimeout(err.to_string()),
            DispatchError::Broker(_) => ApiError::BadGateway(err.to_string()),
            DispatchError::Cancelled { .. } | DispatchError::DuplicateCorrelationId(_) => {
                ApiError::InternalError(err.to_string())
            }
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(format!("invalid request body: {}", rejection.body_text()))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::GatewayTimeout(msg) => (StatusCode::GATEWAY_TIMEOUT, msg),
            ApiError::BadGateway(msg) => (StatusCode::BAD_GATEWAY, msg),
            ApiError::InternalError(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };

        if status.is_server_error() {
            tracing::error!(status = status.as_u16(), error = %message, "Forecast request failed");
        } else {
            tracing::warn!(status = status.as_u16(), error = %message, "Forecast request rejected");
        }

        (status, Json(serde_json::json!({ "error": message }))).into_response()
    }
}
