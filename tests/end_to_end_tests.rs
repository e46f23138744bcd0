//! Full pipeline tests: HTTP request -> dispatcher -> workers -> collector -> report

use async_trait::async_trait;
use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use gather::config::{parse_config, Config};
use gather::message::WeatherPayload;
use gather::pipeline::Pipeline;
use gather::web::{router, AppState};
use gather::worker::{ProviderError, WeatherProvider};
use serde_json::Value;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tower::ServiceExt;

/// Known cities answer immediately, "Atlantis" is unknown, "Nowhere" never answers
struct FakeProvider;

#[async_trait]
impl WeatherProvider for FakeProvider {
    async fn current_weather(&self, city: &str) -> Result<WeatherPayload, ProviderError> {
        let temperature = match city {
            "Moscow" => 15.5,
            "Paris" => 9.0,
            "Oslo" => -3.0,
            "Nowhere" => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                0.0
            }
            _ => {
                return Err(ProviderError::Status {
                    status: 404,
                    message: "city not found".to_string(),
                })
            }
        };

        Ok(WeatherPayload {
            temperature,
            description: "overcast clouds".to_string(),
            humidity: 70,
            wind_speed: 3.0,
        })
    }
}

fn test_config(request_timeout: &str) -> Config {
    parse_config(&format!(
        r#"
web:
  listen: "127.0.0.1:0"
dispatcher:
  request_timeout: {}
collector:
  aggregation_timeout: 120s
  sweep_interval: 1s
  consumers: 2
  shards: 4
worker:
  concurrency: 3
  pacing_delay: 0s
  provider:
    url: "http://localhost/data/2.5/weather"
    api_key: "test-key"
"#,
        request_timeout
    ))
    .unwrap()
}

fn app_state(pipeline: &Pipeline) -> Arc<AppState> {
    Arc::new(AppState {
        instance_id: "test-instance".to_string(),
        version: "0.0.0".to_string(),
        start_time: Instant::now(),
        dispatcher: pipeline.dispatcher(),
        store: pipeline.store(),
    })
}

fn forecast_request(body: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/api/weather/forecast")
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn send(state: Arc<AppState>, request: Request<Body>) -> (StatusCode, Value) {
    let response = router(state).oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, body)
}

#[tokio::test]
async fn test_forecast_returns_aggregated_report() {
    let pipeline = Pipeline::start(&test_config("10s"), Arc::new(FakeProvider));
    let state = app_state(&pipeline);

    let (status, body) = send(
        Arc::clone(&state),
        forecast_request(r#"{"cities": ["Moscow", "Paris"]}"#),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["totalUnits"], 2);
    assert_eq!(body["successCount"], 2);
    assert_eq!(body["failureCount"], 0);

    let results = body["results"].as_array().unwrap();
    assert_eq!(results.len(), 2);
    for result in results {
        let expected = match result["unitKey"].as_str().unwrap() {
            "Moscow" => 15.5,
            "Paris" => 9.0,
            other => panic!("unexpected unit {}", other),
        };
        assert_eq!(result["success"], true);
        assert_eq!(result["payload"]["temperature"], expected);
    }

    assert_eq!(pipeline.dispatcher().pending(), 0);
    assert_eq!(pipeline.store().open_groups(), 0);
    pipeline.shutdown().await;
}

#[tokio::test]
async fn test_forecast_reports_failed_cities() {
    let pipeline = Pipeline::start(&test_config("10s"), Arc::new(FakeProvider));
    let state = app_state(&pipeline);

    let (status, body) = send(
        state,
        forecast_request(r#"{"cities": ["Oslo", "Atlantis", "Paris"]}"#),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["successCount"], 2);
    assert_eq!(body["failureCount"], 1);

    let failed: Vec<&Value> = body["results"]
        .as_array()
        .unwrap()
        .iter()
        .filter(|r| r["success"] == false)
        .collect();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0]["unitKey"], "Atlantis");
    assert!(failed[0]["errorMessage"]
        .as_str()
        .unwrap()
        .starts_with("Failed to fetch weather data for Atlantis"));
    assert!(failed[0].get("payload").map_or(true, Value::is_null));

    pipeline.shutdown().await;
}

#[tokio::test]
async fn test_concurrent_forecasts_are_not_mixed() {
    let pipeline = Pipeline::start(&test_config("10s"), Arc::new(FakeProvider));
    let state = app_state(&pipeline);

    let first = send(
        Arc::clone(&state),
        forecast_request(r#"{"cities": ["Moscow", "Paris"]}"#),
    );
    let second = send(
        Arc::clone(&state),
        forecast_request(r#"{"cities": ["Oslo", "Atlantis"]}"#),
    );
    let ((s1, b1), (s2, b2)) = tokio::join!(first, second);

    assert_eq!(s1, StatusCode::OK);
    assert_eq!(s2, StatusCode::OK);
    assert_ne!(b1["correlationId"], b2["correlationId"]);

    let keys = |body: &Value| -> HashSet<String> {
        body["results"]
            .as_array()
            .unwrap()
            .iter()
            .map(|r| r["unitKey"].as_str().unwrap().to_string())
            .collect()
    };
    assert_eq!(keys(&b1), HashSet::from(["Moscow".to_string(), "Paris".to_string()]));
    assert_eq!(keys(&b2), HashSet::from(["Oslo".to_string(), "Atlantis".to_string()]));

    pipeline.shutdown().await;
}

#[tokio::test]
async fn test_empty_city_list_is_bad_request() {
    let pipeline = Pipeline::start(&test_config("10s"), Arc::new(FakeProvider));
    let state = app_state(&pipeline);

    let (status, body) = send(Arc::clone(&state), forecast_request(r#"{"cities": []}"#)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("cannot be empty"));

    let (status, _) = send(Arc::clone(&state), forecast_request("{}")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(state, forecast_request(r#"{"cities": ["Paris", "  "]}"#)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    pipeline.shutdown().await;
}

#[tokio::test]
async fn test_malformed_body_is_json_bad_request() {
    let pipeline = Pipeline::start(&test_config("10s"), Arc::new(FakeProvider));
    let state = app_state(&pipeline);

    let (status, body) = send(
        Arc::clone(&state),
        forecast_request(r#"{"cities": "Moscow"}"#),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"]
        .as_str()
        .unwrap()
        .starts_with("invalid request body"));

    let (status, body) = send(state, forecast_request("not json at all")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].is_string());
    assert_eq!(pipeline.dispatcher().pending(), 0);

    pipeline.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_unanswered_city_times_out_with_gateway_timeout() {
    let pipeline = Pipeline::start(&test_config("1s"), Arc::new(FakeProvider));
    let state = app_state(&pipeline);

    let (status, body) = send(
        Arc::clone(&state),
        forecast_request(r#"{"cities": ["Moscow", "Nowhere"]}"#),
    )
    .await;

    assert_eq!(status, StatusCode::GATEWAY_TIMEOUT);
    assert!(body["error"].as_str().unwrap().contains("timed out"));
    assert_eq!(pipeline.dispatcher().pending(), 0);

    // Moscow's partial group is still held until the sweeper evicts it
    assert_eq!(pipeline.store().open_groups(), 1);
}

#[tokio::test]
async fn test_health_endpoint() {
    let pipeline = Pipeline::start(&test_config("10s"), Arc::new(FakeProvider));

    let request = Request::builder()
        .uri("/api/weather/health")
        .body(Body::empty())
        .unwrap();
    let response = router(app_state(&pipeline)).oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    assert_eq!(&bytes[..], b"Weather API Service is running");

    pipeline.shutdown().await;
}

#[tokio::test]
async fn test_status_endpoint_reports_counters() {
    let pipeline = Pipeline::start(&test_config("10s"), Arc::new(FakeProvider));
    let state = app_state(&pipeline);

    let (status, _) = send(
        Arc::clone(&state),
        forecast_request(r#"{"cities": ["Oslo"]}"#),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let request = Request::builder()
        .uri("/api/status")
        .body(Body::empty())
        .unwrap();
    let (status, body) = send(state, request).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["instance_id"], "test-instance");
    assert_eq!(body["pending_requests"], 0);
    assert_eq!(body["aggregation"]["completed"], 1);
    assert_eq!(body["aggregation"]["open_groups"], 0);

    pipeline.shutdown().await;
}
