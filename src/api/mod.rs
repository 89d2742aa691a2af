//! HTTP API
//!
//! Provides:
//! - JSON endpoints over a shared `PredictionService`
//! - Error kind to status code mapping (400/404/503/500)
//! - Hot reload of models and features without restarting the server

#[cfg(test)]
mod tests;

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::config::Config;
use crate::error::ForecastError;
use crate::service::{
    default_horizons, BatchPredictRequest, BatchPrediction, HealthStatus, MetricsReport, PredictRequest,
    PredictionService, VisualizationData,
};
use crate::types::PredictionResult;

/// Server state shared across handlers
///
/// Requests clone the current service handle; a reload swaps the whole slot.
pub struct AppState {
    config: Config,
    service: RwLock<Arc<PredictionService>>,
}

impl AppState {
    pub fn new(config: Config, service: PredictionService) -> Self {
        Self {
            config,
            service: RwLock::new(Arc::new(service)),
        }
    }

    pub fn service(&self) -> Arc<PredictionService> {
        self.service.read().clone()
    }

    pub fn replace(&self, service: PredictionService) {
        *self.service.write() = Arc::new(service);
    }

    pub fn config(&self) -> &Config {
        &self.config
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    pub message: String,
}

/// `ForecastError` rendered as an HTTP response
#[derive(Debug)]
pub struct ApiError(pub ForecastError);

impl From<ForecastError> for ApiError {
    fn from(err: ForecastError) -> Self {
        ApiError(err)
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match &self.0 {
            ForecastError::Validation(_) => StatusCode::BAD_REQUEST,
            ForecastError::NotFound(_) => StatusCode::NOT_FOUND,
            ForecastError::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!("Request failed: {}", self.0);
        }
        let body = ErrorBody {
            error: self.0.kind().to_string(),
            message: self.0.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

type ApiResult<T> = Result<Json<T>, ApiError>;

#[derive(Debug, Default, Deserialize)]
pub struct HorizonQuery {
    /// Comma-separated list, e.g. `1,2,5`
    pub horizons: Option<String>,
}

fn parse_horizons(raw: Option<&str>) -> Result<Vec<usize>, ForecastError> {
    match raw.map(str::trim).filter(|s| !s.is_empty()) {
        None => Ok(default_horizons()),
        Some(list) => list
            .split(',')
            .map(|part| {
                part.trim()
                    .parse::<usize>()
                    .map_err(|_| ForecastError::Validation(format!("invalid horizon '{}'", part.trim())))
            })
            .collect(),
    }
}

async fn predict(
    State(state): State<Arc<AppState>>,
    Json(request): Json<PredictRequest>,
) -> ApiResult<PredictionResult> {
    let service = state.service();
    Ok(Json(service.predict(&request.symbol, &request.horizons)?))
}

async fn predict_batch(
    State(state): State<Arc<AppState>>,
    Json(request): Json<BatchPredictRequest>,
) -> ApiResult<BatchPrediction> {
    let service = state.service();
    let batch = service.predict_batch(&request.symbols, &request.horizons)?;
    if !batch.errors.is_empty() {
        warn!("Batch prediction: {} of {} symbols failed", batch.errors.len(), request.symbols.len());
    }
    Ok(Json(batch))
}

async fn visualization(
    State(state): State<Arc<AppState>>,
    Path(symbol): Path<String>,
    Query(query): Query<HorizonQuery>,
) -> ApiResult<VisualizationData> {
    let horizons = parse_horizons(query.horizons.as_deref())?;
    let service = state.service();
    Ok(Json(service.visualization(&symbol, &horizons)?))
}

async fn get_metrics(State(state): State<Arc<AppState>>) -> ApiResult<MetricsReport> {
    Ok(Json(state.service().metrics()?))
}

async fn get_symbols(State(state): State<Arc<AppState>>) -> ApiResult<Vec<String>> {
    Ok(Json(state.service().symbols()?))
}

async fn health_check(State(state): State<Arc<AppState>>) -> Json<HealthStatus> {
    Json(state.service().health())
}

/// Reload artifacts from disk and swap them in
async fn reload(State(state): State<Arc<AppState>>) -> ApiResult<HealthStatus> {
    let config = state.config().clone();
    let service = tokio::task::spawn_blocking(move || PredictionService::load(&config))
        .await
        .map_err(|e| ForecastError::Internal(format!("reload task failed: {}", e)))?;
    let health = service.health();
    state.replace(service);
    info!("Reloaded prediction service: {}", health.status);
    Ok(Json(health))
}

/// Create the API router
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/predict", post(predict))
        .route("/predict/batch", post(predict_batch))
        .route("/visualization/{symbol}", get(visualization))
        .route("/metrics", get(get_metrics))
        .route("/symbols", get(get_symbols))
        .route("/reload", post(reload))
        .with_state(state)
}

/// Serve the API until the process is stopped
pub async fn serve(state: Arc<AppState>) -> crate::error::Result<()> {
    let addr = format!("{}:{}", state.config().api.host, state.config().api.port);
    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Forecast API listening on http://{}", addr);
    axum::serve(listener, app).await?;
    Ok(())
}
