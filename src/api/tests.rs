//! Router tests driven through `tower::ServiceExt::oneshot`

use super::*;
use axum::body::{to_bytes, Body};
use axum::http::Request;
use serde_json::{json, Value};
use tower::ServiceExt;

use crate::test_support::trained_service;

fn trained_state() -> Arc<AppState> {
    let state = AppState::new(Config::default(), PredictionService::new(30));
    *state.service.write() = trained_service();
    Arc::new(state)
}

fn empty_state() -> Arc<AppState> {
    Arc::new(AppState::new(Config::default(), PredictionService::new(30)))
}

async fn send(state: Arc<AppState>, request: Request<Body>) -> (StatusCode, Value) {
    let response = create_router(state).oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, serde_json::from_slice(&bytes).unwrap())
}

fn get_request(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

#[test]
fn test_parse_horizons() {
    assert_eq!(parse_horizons(Some("1, 2,5")).unwrap(), vec![1, 2, 5]);
    assert_eq!(parse_horizons(None).unwrap(), vec![1, 2, 3, 4, 5]);
    assert_eq!(parse_horizons(Some("")).unwrap(), vec![1, 2, 3, 4, 5]);
    assert!(matches!(parse_horizons(Some("1,x")), Err(ForecastError::Validation(_))));
}

#[test]
fn test_error_status_mapping() {
    let status = |e: ForecastError| ApiError(e).status();
    assert_eq!(status(ForecastError::Validation("x".into())), StatusCode::BAD_REQUEST);
    assert_eq!(status(ForecastError::NotFound("x".into())), StatusCode::NOT_FOUND);
    assert_eq!(
        status(ForecastError::ServiceUnavailable("x".into())),
        StatusCode::SERVICE_UNAVAILABLE
    );
    assert_eq!(status(ForecastError::Model("x".into())), StatusCode::INTERNAL_SERVER_ERROR);
}

#[tokio::test]
async fn test_health_reports_loaded_state() {
    let (status, body) = send(trained_state(), get_request("/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["models_loaded"], true);
    assert_eq!(body["data_loaded"], true);

    let (status, body) = send(empty_state(), get_request("/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "degraded");
    assert_eq!(body["models_loaded"], false);
}

#[tokio::test]
async fn test_predict_ok() {
    let (status, body) = send(
        trained_state(),
        post_json("/predict", json!({"symbol": "calm", "horizons": [1, 2]})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let result: PredictionResult = serde_json::from_value(body).unwrap();
    assert_eq!(result.symbol, "CALM");
    assert_eq!(result.forecasts.len(), 2);
    assert!(result.forecasts[0].ci_80.lower < result.forecasts[0].ci_80.upper);
}

#[tokio::test]
async fn test_predict_unknown_symbol_is_404() {
    let (status, body) = send(
        trained_state(),
        post_json("/predict", json!({"symbol": "ZZZZ", "horizons": [1]})),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "not_found");
    assert!(body["message"].as_str().unwrap().contains("ZZZZ"));
}

#[tokio::test]
async fn test_predict_bad_horizon_is_400() {
    let (status, body) = send(
        trained_state(),
        post_json("/predict", json!({"symbol": "CALM", "horizons": [6]})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "validation_error");
}

#[tokio::test]
async fn test_predict_without_models_is_503() {
    let (status, body) = send(
        empty_state(),
        post_json("/predict", json!({"symbol": "CALM", "horizons": [1]})),
    )
    .await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["error"], "service_unavailable");
}

#[tokio::test]
async fn test_batch_and_listing_endpoints() {
    let state = trained_state();

    let (status, body) = send(
        state.clone(),
        post_json("/predict/batch", json!({"symbols": ["CALM", "ZZZZ"], "horizons": [1]})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["predictions"].as_array().unwrap().len(), 1);
    assert_eq!(body["errors"][0]["symbol"], "ZZZZ");

    let (status, body) = send(state.clone(), get_request("/symbols")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!(["CALM", "MIXED", "WILD"]));

    let (status, body) = send(state, get_request("/metrics")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["horizons"], json!([1, 2, 3]));
    assert!(body["feature_importance"]["1"].is_array());
}

#[tokio::test]
async fn test_visualization_endpoint() {
    let state = trained_state();

    let (status, body) = send(state.clone(), get_request("/visualization/wild?horizons=1,2")).await;
    assert_eq!(status, StatusCode::OK);
    let chart: VisualizationData = serde_json::from_value(body).unwrap();
    assert_eq!(chart.symbol, "WILD");
    assert_eq!(chart.history.len(), 30);
    assert_eq!(chart.forecast.len(), 2);

    let (status, _) = send(state, get_request("/visualization/WILD?horizons=1,x")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_replace_swaps_service() {
    let state = trained_state();
    state.replace(PredictionService::new(30));

    let (_, body) = send(state, get_request("/health")).await;
    assert_eq!(body["models_loaded"], false);
}

#[tokio::test]
async fn test_reload_from_empty_directories() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = Config::default();
    config.models.models_dir = dir.path().join("models").display().to_string();
    config.data.processed_dir = dir.path().join("processed").display().to_string();
    let state = Arc::new(AppState::new(config, PredictionService::new(30)));

    let (status, body) = send(state, post_json("/reload", json!({}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "degraded");
}
