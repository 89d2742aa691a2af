//! Forecasting models
//!
//! Provides:
//! - Gradient-boosted regression trees with pinball and squared loss
//! - Per-horizon quantile forecasters of cumulative log return with
//!   monotone quantiles and 80%/95% intervals
//! - Volume forecasters and the liquidity classifier
//! - Offline training on a purged time split and JSON artifact storage

pub mod gbm;
pub mod price;
pub mod store;
pub mod trainer;
pub mod volume;

#[cfg(test)]
mod tests;

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::validation::metrics::ForecastMetrics;

pub use gbm::{GradientBoostedTrees, Loss};
pub use price::{confidence_intervals, enforce_monotone, QuantileForecaster, QuantilePrediction};
pub use trainer::{log_predictions, Dataset, ModelTrainer};
pub use volume::{LiquidityClassifier, VolumeForecaster, VolumeThresholds};

/// Description of a trained model set
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelManifest {
    pub trained_at: DateTime<Utc>,
    pub horizons: Vec<usize>,
    pub quantiles: Vec<f64>,
    pub feature_names: Vec<String>,
    pub symbols: Vec<String>,
    pub train_rows: usize,
    /// Last feature date used for fitting
    pub train_end: NaiveDate,
    /// First date of the hold-out window, if any
    pub test_start: Option<NaiveDate>,
    /// Hold-out scores per horizon
    pub evaluation: Vec<ForecastMetrics>,
}

/// Everything the prediction service needs, loaded once and shared read-only
#[derive(Debug, Clone)]
pub struct ForecastModels {
    pub manifest: ModelManifest,
    pub price: BTreeMap<usize, QuantileForecaster>,
    pub volume: BTreeMap<usize, VolumeForecaster>,
    pub liquidity: LiquidityClassifier,
}

impl ForecastModels {
    pub fn horizons(&self) -> Vec<usize> {
        self.price.keys().copied().collect()
    }

    pub fn feature_names(&self) -> &[String] {
        &self.manifest.feature_names
    }

    /// Median-model importance per horizon
    pub fn feature_importance(&self) -> BTreeMap<usize, Vec<(String, f64)>> {
        self.price
            .iter()
            .map(|(h, model)| (*h, model.feature_importance()))
            .collect()
    }
}
