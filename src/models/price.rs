//! Per-horizon quantile forecaster of cumulative log returns

use serde::{Deserialize, Serialize};
use tracing::info;

use super::gbm::{GradientBoostedTrees, Loss};
use crate::config::BoostingConfig;
use crate::error::{ForecastError, Result};
use crate::types::ConfidenceInterval;

/// Standard normal quantiles used to widen the 80% band to 95%
const Z_80: f64 = 1.281_551_565_545;
const Z_95: f64 = 1.959_963_984_540;

const QUANTILE_EPS: f64 = 1e-9;

/// Quantile levels with their predicted log returns, ascending in both
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuantilePrediction {
    pub levels: Vec<(f64, f64)>,
    pub median: f64,
    pub ci_80: ConfidenceInterval,
    pub ci_95: ConfidenceInterval,
}

fn find_level(levels: &[(f64, f64)], q: f64) -> Option<f64> {
    levels
        .iter()
        .find(|(level, _)| (level - q).abs() < QUANTILE_EPS)
        .map(|(_, v)| *v)
}

/// Sort predicted values so they are non-decreasing in the quantile level
pub fn enforce_monotone(values: &mut [f64]) {
    values.sort_by(|a, b| a.total_cmp(b));
}

/// Build the 80% and 95% intervals from monotone quantile predictions
///
/// The 95% band uses the 0.025/0.975 models when trained; otherwise each side
/// of the 80% band is stretched around the median by `z_0.975 / z_0.9`.
pub fn confidence_intervals(levels: &[(f64, f64)]) -> Result<(f64, ConfidenceInterval, ConfidenceInterval)> {
    let get = |q: f64| {
        find_level(levels, q)
            .ok_or_else(|| ForecastError::Model(format!("quantile {} was not trained", q)))
    };
    let median = get(0.5)?;
    let ci_80 = ConfidenceInterval {
        lower: get(0.1)?,
        upper: get(0.9)?,
    };
    let ci_95 = match (find_level(levels, 0.025), find_level(levels, 0.975)) {
        (Some(lower), Some(upper)) => ConfidenceInterval { lower, upper },
        _ => {
            let scale = Z_95 / Z_80;
            ConfidenceInterval {
                lower: median - (median - ci_80.lower) * scale,
                upper: median + (ci_80.upper - median) * scale,
            }
        }
    };
    Ok((median, ci_80, ci_95))
}

/// One pinball-loss ensemble per quantile level for a single horizon
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuantileForecaster {
    pub horizon: usize,
    pub quantiles: Vec<f64>,
    pub feature_names: Vec<String>,
    models: Vec<GradientBoostedTrees>,
}

impl QuantileForecaster {
    pub fn fit(
        horizon: usize,
        x: &[Vec<f64>],
        y: &[f64],
        quantiles: &[f64],
        feature_names: &[String],
        config: &BoostingConfig,
    ) -> Result<Self> {
        let mut quantiles = quantiles.to_vec();
        quantiles.sort_by(|a, b| a.total_cmp(b));
        quantiles.dedup_by(|a, b| (*a - *b).abs() < QUANTILE_EPS);
        for required in [0.1, 0.5, 0.9] {
            if !quantiles.iter().any(|q| (q - required).abs() < QUANTILE_EPS) {
                return Err(ForecastError::Model(format!("quantile {} is required", required)));
            }
        }

        let models = quantiles
            .iter()
            .map(|q| GradientBoostedTrees::fit(x, y, Loss::Quantile(*q), config))
            .collect::<Result<Vec<_>>>()?;

        info!(
            "Trained {}-day forecaster: {} quantiles on {} rows",
            horizon,
            quantiles.len(),
            y.len()
        );

        Ok(Self {
            horizon,
            quantiles,
            feature_names: feature_names.to_vec(),
            models,
        })
    }

    /// Raw model outputs, one per level, possibly crossing
    pub fn predict_raw(&self, row: &[f64]) -> Result<Vec<f64>> {
        self.models.iter().map(|m| m.predict(row)).collect()
    }

    pub fn predict(&self, row: &[f64]) -> Result<QuantilePrediction> {
        let mut values = self.predict_raw(row)?;
        enforce_monotone(&mut values);
        let levels: Vec<(f64, f64)> = self.quantiles.iter().copied().zip(values).collect();
        let (median, ci_80, ci_95) = confidence_intervals(&levels)?;
        Ok(QuantilePrediction {
            levels,
            median,
            ci_80,
            ci_95,
        })
    }

    /// Gain importance of the median model, sorted descending
    pub fn feature_importance(&self) -> Vec<(String, f64)> {
        let median = self
            .quantiles
            .iter()
            .position(|q| (q - 0.5).abs() < QUANTILE_EPS)
            .and_then(|i| self.models.get(i));
        let mut ranked: Vec<(String, f64)> = match median {
            Some(model) => self
                .feature_names
                .iter()
                .cloned()
                .zip(model.feature_importance())
                .collect(),
            None => Vec::new(),
        };
        ranked.sort_by(|a, b| b.1.total_cmp(&a.1));
        ranked
    }
}
