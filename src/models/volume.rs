//! Volume forecasting and liquidity classification

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::info;

use super::gbm::{GradientBoostedTrees, Loss};
use crate::config::BoostingConfig;
use crate::error::{ForecastError, Result};
use crate::features::indicators::quantile;
use crate::types::LiquidityRegime;

/// Squared-loss ensemble on `ln(1 + volume[t+h])`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VolumeForecaster {
    pub horizon: usize,
    model: GradientBoostedTrees,
}

impl VolumeForecaster {
    pub fn fit(horizon: usize, x: &[Vec<f64>], log_volume: &[f64], config: &BoostingConfig) -> Result<Self> {
        let model = GradientBoostedTrees::fit(x, log_volume, Loss::Squared, config)?;
        info!("Trained {}-day volume model on {} rows", horizon, log_volume.len());
        Ok(Self { horizon, model })
    }

    /// Predicted share volume, never negative
    pub fn predict(&self, row: &[f64]) -> Result<f64> {
        Ok(self.model.predict(row)?.exp_m1().max(0.0))
    }
}

/// Q20/Q80 volume boundaries
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VolumeThresholds {
    pub q20: f64,
    pub q80: f64,
}

impl VolumeThresholds {
    pub fn from_volumes(volumes: &[f64]) -> Option<Self> {
        let finite: Vec<f64> = volumes.iter().copied().filter(|v| v.is_finite()).collect();
        if finite.is_empty() {
            return None;
        }
        Some(Self {
            q20: quantile(&finite, 0.2),
            q80: quantile(&finite, 0.8),
        })
    }

    pub fn classify(&self, volume: f64) -> LiquidityRegime {
        LiquidityRegime::classify(volume, self.q20, self.q80)
    }
}

/// Maps predicted volume to a regime using boundaries frozen at training
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LiquidityClassifier {
    per_symbol: BTreeMap<String, VolumeThresholds>,
    global: VolumeThresholds,
}

impl LiquidityClassifier {
    /// Fit from (symbol, volume) observations of the training window
    pub fn fit<'a, I>(observations: I) -> Result<Self>
    where
        I: IntoIterator<Item = (&'a str, f64)>,
    {
        let mut by_symbol: BTreeMap<String, Vec<f64>> = BTreeMap::new();
        let mut all = Vec::new();
        for (symbol, volume) in observations {
            by_symbol.entry(symbol.to_string()).or_default().push(volume);
            all.push(volume);
        }

        let global = VolumeThresholds::from_volumes(&all)
            .ok_or_else(|| ForecastError::Model("no volume observations for liquidity thresholds".into()))?;
        let per_symbol = by_symbol
            .into_iter()
            .filter_map(|(symbol, volumes)| VolumeThresholds::from_volumes(&volumes).map(|t| (symbol, t)))
            .collect::<BTreeMap<_, _>>();

        info!(
            "Liquidity thresholds for {} symbols (global Q20={:.0}, Q80={:.0})",
            per_symbol.len(),
            global.q20,
            global.q80
        );
        Ok(Self { per_symbol, global })
    }

    pub fn thresholds(&self, symbol: &str) -> VolumeThresholds {
        self.per_symbol.get(symbol).copied().unwrap_or(self.global)
    }

    pub fn classify(&self, symbol: &str, volume: f64) -> LiquidityRegime {
        self.thresholds(symbol).classify(volume)
    }

    pub fn knows(&self, symbol: &str) -> bool {
        self.per_symbol.contains_key(symbol)
    }
}
