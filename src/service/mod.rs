//! Prediction service
//!
//! Provides:
//! - Per-symbol multi-horizon forecasts in price space with 80%/95% bands
//! - Batch prediction with per-symbol errors reported inline
//! - Chart data (recent history plus forecast path)
//! - Stored evaluation metrics and feature importance
//!
//! The service is an explicitly constructed, read-only context: models and
//! the feature matrix are loaded once and never mutated while serving.

#[cfg(test)]
mod tests;

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::calendar::TradingCalendar;
use crate::config::Config;
use crate::error::{ForecastError, Result};
use crate::features::{load_parquet, FeatureFrame, FeatureRow};
use crate::models::store::{read_json, VALIDATION_FILE};
use crate::models::ForecastModels;
use crate::types::{ConfidenceInterval, HorizonForecast, PredictionResult, QuantilePoint, MAX_HORIZON};
use crate::validation::{BacktestSummary, ForecastMetrics, WalkForwardReport};

pub fn default_horizons() -> Vec<usize> {
    (1..=MAX_HORIZON).collect()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictRequest {
    pub symbol: String,
    #[serde(default = "default_horizons")]
    pub horizons: Vec<usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchPredictRequest {
    pub symbols: Vec<String>,
    #[serde(default = "default_horizons")]
    pub horizons: Vec<usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchError {
    pub symbol: String,
    pub error: String,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchPrediction {
    pub predictions: Vec<PredictionResult>,
    pub errors: Vec<BatchError>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryPoint {
    pub date: NaiveDate,
    pub close: f64,
    pub volume: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastPoint {
    pub date: NaiveDate,
    pub horizon: usize,
    pub price: f64,
    pub lower_80: f64,
    pub upper_80: f64,
    pub lower_95: f64,
    pub upper_95: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VisualizationData {
    pub symbol: String,
    pub history: Vec<HistoryPoint>,
    pub forecast: Vec<ForecastPoint>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureImportance {
    pub feature: String,
    pub importance: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsReport {
    pub trained_at: DateTime<Utc>,
    pub train_end: NaiveDate,
    pub test_start: Option<NaiveDate>,
    pub horizons: Vec<usize>,
    /// Scores on the training hold-out window
    pub holdout: Vec<ForecastMetrics>,
    /// Scores aggregated over walk-forward folds, when a run was stored
    pub walk_forward: Option<Vec<ForecastMetrics>>,
    pub backtest: Option<BacktestSummary>,
    /// Top features of the median model per horizon
    pub feature_importance: BTreeMap<usize, Vec<FeatureImportance>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthStatus {
    pub status: String,
    pub models_loaded: bool,
    pub data_loaded: bool,
    pub horizons: Vec<usize>,
    pub symbols: usize,
}

const TOP_FEATURES: usize = 20;

pub struct PredictionService {
    models: Option<ForecastModels>,
    frame: Option<FeatureFrame>,
    validation: Option<WalkForwardReport>,
    calendar: TradingCalendar,
    history_days: usize,
}

impl PredictionService {
    pub fn new(history_days: usize) -> Self {
        Self {
            models: None,
            frame: None,
            validation: None,
            calendar: TradingCalendar::new(),
            history_days,
        }
    }

    pub fn with_models(mut self, models: ForecastModels) -> Self {
        self.models = Some(models);
        self
    }

    pub fn with_features(mut self, frame: FeatureFrame) -> Self {
        self.frame = Some(frame);
        self
    }

    pub fn with_validation(mut self, report: WalkForwardReport) -> Self {
        self.validation = Some(report);
        self
    }

    /// Load whatever artifacts exist; missing pieces leave the service degraded
    pub fn load(config: &Config) -> Self {
        let mut service = Self::new(config.api.history_days);
        let models_dir = config.models.models_path();

        match ForecastModels::load(&models_dir) {
            Ok(models) => service.models = Some(models),
            Err(e) => warn!("Models unavailable: {}", e),
        }

        let features_path = config.data.processed_path(&config.features.output_file);
        match load_parquet(&features_path) {
            Ok(frame) => service.frame = Some(frame),
            Err(e) => warn!("Feature data unavailable: {}", e),
        }

        let validation_path = models_dir.join(VALIDATION_FILE);
        if validation_path.exists() {
            match read_json::<WalkForwardReport>(&validation_path) {
                Ok(report) => service.validation = Some(report),
                Err(e) => warn!("Ignoring unreadable {}: {}", validation_path.display(), e),
            }
        }

        let health = service.health();
        info!(
            "Prediction service {}: models={}, data={}, {} symbols",
            health.status, health.models_loaded, health.data_loaded, health.symbols
        );
        service
    }

    fn ready(&self) -> Result<(&ForecastModels, &FeatureFrame)> {
        let models = self
            .models
            .as_ref()
            .ok_or_else(|| ForecastError::ServiceUnavailable("models are not loaded".into()))?;
        let frame = self
            .frame
            .as_ref()
            .ok_or_else(|| ForecastError::ServiceUnavailable("feature data is not loaded".into()))?;
        if models.feature_names() != frame.names.as_slice() {
            return Err(ForecastError::ServiceUnavailable(
                "feature data does not match the trained models".into(),
            ));
        }
        Ok((models, frame))
    }

    fn forecast(&self, models: &ForecastModels, symbol: &str, row: &FeatureRow, horizon: usize) -> Result<HorizonForecast> {
        let model = models
            .price
            .get(&horizon)
            .ok_or_else(|| ForecastError::NotFound(format!("no model trained for horizon {}", horizon)))?;
        let prediction = model.predict(&row.values)?;

        let to_price = |log_return: f64| row.raw_close * log_return.exp();
        let to_band = |ci: ConfidenceInterval| ConfidenceInterval {
            lower: to_price(ci.lower),
            upper: to_price(ci.upper),
        };

        let predicted_volume = models
            .volume
            .get(&horizon)
            .map(|m| m.predict(&row.values))
            .transpose()?;
        let liquidity_regime = predicted_volume.map(|v| models.liquidity.classify(symbol, v));

        Ok(HorizonForecast {
            horizon,
            target_date: self.calendar.add_trading_days(row.date, horizon),
            median_log_return: prediction.median,
            predicted_price: to_price(prediction.median),
            ci_80: to_band(prediction.ci_80),
            ci_95: to_band(prediction.ci_95),
            quantiles: prediction
                .levels
                .iter()
                .map(|(quantile, log_return)| QuantilePoint {
                    quantile: *quantile,
                    log_return: *log_return,
                    price: to_price(*log_return),
                })
                .collect(),
            predicted_volume,
            liquidity_regime,
        })
    }

    pub fn predict(&self, symbol: &str, horizons: &[usize]) -> Result<PredictionResult> {
        let horizons = validate_horizons(horizons)?;
        let symbol = normalize_symbol(symbol)?;
        let (models, frame) = self.ready()?;
        let row = frame
            .latest(&symbol)
            .ok_or_else(|| ForecastError::NotFound(format!("unknown symbol {}", symbol)))?;

        let forecasts = horizons
            .iter()
            .map(|&h| self.forecast(models, &symbol, row, h))
            .collect::<Result<Vec<_>>>()?;

        Ok(PredictionResult {
            symbol,
            current_price: row.raw_close,
            current_date: row.date,
            forecasts,
        })
    }

    pub fn predict_batch(&self, symbols: &[String], horizons: &[usize]) -> Result<BatchPrediction> {
        let horizons = validate_horizons(horizons)?;
        if symbols.is_empty() {
            return Err(ForecastError::Validation("at least one symbol is required".into()));
        }
        self.ready()?;

        let mut predictions = Vec::new();
        let mut errors = Vec::new();
        for symbol in symbols {
            match self.predict(symbol, &horizons) {
                Ok(result) => predictions.push(result),
                Err(e) => errors.push(BatchError {
                    symbol: symbol.clone(),
                    error: e.kind().to_string(),
                    message: e.to_string(),
                }),
            }
        }
        Ok(BatchPrediction { predictions, errors })
    }

    pub fn visualization(&self, symbol: &str, horizons: &[usize]) -> Result<VisualizationData> {
        let prediction = self.predict(symbol, horizons)?;
        let (_, frame) = self.ready()?;

        let rows: Vec<&FeatureRow> = frame.rows_for(&prediction.symbol).collect();
        let start = rows.len().saturating_sub(self.history_days);
        let history = rows[start..]
            .iter()
            .map(|r| HistoryPoint {
                date: r.date,
                close: r.raw_close,
                volume: r.volume,
            })
            .collect();

        let forecast = prediction
            .forecasts
            .iter()
            .map(|f| ForecastPoint {
                date: f.target_date,
                horizon: f.horizon,
                price: f.predicted_price,
                lower_80: f.ci_80.lower,
                upper_80: f.ci_80.upper,
                lower_95: f.ci_95.lower,
                upper_95: f.ci_95.upper,
            })
            .collect();

        Ok(VisualizationData {
            symbol: prediction.symbol,
            history,
            forecast,
        })
    }

    pub fn metrics(&self) -> Result<MetricsReport> {
        let models = self
            .models
            .as_ref()
            .ok_or_else(|| ForecastError::ServiceUnavailable("models are not loaded".into()))?;
        let manifest = &models.manifest;

        let feature_importance = models
            .feature_importance()
            .into_iter()
            .map(|(h, ranked)| {
                let top = ranked
                    .into_iter()
                    .take(TOP_FEATURES)
                    .map(|(feature, importance)| FeatureImportance { feature, importance })
                    .collect();
                (h, top)
            })
            .collect();

        Ok(MetricsReport {
            trained_at: manifest.trained_at,
            train_end: manifest.train_end,
            test_start: manifest.test_start,
            horizons: models.horizons(),
            holdout: manifest.evaluation.clone(),
            walk_forward: self.validation.as_ref().map(|r| r.metrics.clone()),
            backtest: self.validation.as_ref().and_then(|r| r.backtest.clone()),
            feature_importance,
        })
    }

    pub fn symbols(&self) -> Result<Vec<String>> {
        self.frame
            .as_ref()
            .map(|f| f.symbols())
            .ok_or_else(|| ForecastError::ServiceUnavailable("feature data is not loaded".into()))
    }

    pub fn health(&self) -> HealthStatus {
        let models_loaded = self.models.is_some();
        let data_loaded = self.frame.is_some();
        HealthStatus {
            status: if self.ready().is_ok() { "healthy" } else { "degraded" }.to_string(),
            models_loaded,
            data_loaded,
            horizons: self.models.as_ref().map(|m| m.horizons()).unwrap_or_default(),
            symbols: self.frame.as_ref().map(|f| f.symbols().len()).unwrap_or(0),
        }
    }
}

/// Sorted, de-duplicated horizons, each within `1..=MAX_HORIZON`
pub fn validate_horizons(horizons: &[usize]) -> Result<Vec<usize>> {
    if horizons.is_empty() {
        return Err(ForecastError::Validation("at least one horizon is required".into()));
    }
    if let Some(bad) = horizons.iter().find(|h| **h == 0 || **h > MAX_HORIZON) {
        return Err(ForecastError::Validation(format!(
            "horizon {} outside 1..={}",
            bad, MAX_HORIZON
        )));
    }
    let mut out = horizons.to_vec();
    out.sort_unstable();
    out.dedup();
    Ok(out)
}

fn normalize_symbol(symbol: &str) -> Result<String> {
    let symbol = crate::data::schema::normalize_symbol(symbol);
    if symbol.is_empty() {
        return Err(ForecastError::Validation("symbol must not be empty".into()));
    }
    Ok(symbol)
}
