//! Offline training on a purged time split

use std::collections::BTreeMap;

use chrono::{NaiveDate, Utc};
use tracing::{info, warn};

use super::{
    ForecastModels, LiquidityClassifier, ModelManifest, QuantileForecaster, VolumeForecaster,
};
use crate::config::ModelConfig;
use crate::error::{ForecastError, Result};
use crate::features::FeatureFrame;
use crate::types::MAX_HORIZON;
use crate::validation::metrics::{ForecastMetrics, PredictionLog};

/// Feature rows and targets selected from a frame
#[derive(Debug, Clone, Default)]
pub struct Dataset {
    pub rows: Vec<usize>,
    pub x: Vec<Vec<f64>>,
    pub y: Vec<f64>,
}

impl Dataset {
    pub fn len(&self) -> usize {
        self.y.len()
    }

    pub fn is_empty(&self) -> bool {
        self.y.is_empty()
    }

    /// Training rows dated in `[from, cutoff)` whose target date is also
    /// strictly before `cutoff`
    pub fn purged(
        frame: &FeatureFrame,
        targets: &[Option<f64>],
        target_dates: &[Option<NaiveDate>],
        from: Option<NaiveDate>,
        cutoff: Option<NaiveDate>,
    ) -> Self {
        let before = |d: NaiveDate| cutoff.is_none_or_before(d);
        Self::collect(frame, targets, |i| {
            let date = frame.rows[i].date;
            from.map_or(true, |f| date >= f)
                && before(date)
                && target_dates[i].is_some_and(before)
        })
    }

    /// Rows dated in `[from, to]` that have a realised target
    pub fn window(
        frame: &FeatureFrame,
        targets: &[Option<f64>],
        from: NaiveDate,
        to: Option<NaiveDate>,
    ) -> Self {
        Self::collect(frame, targets, |i| {
            let date = frame.rows[i].date;
            date >= from && to.map_or(true, |t| date <= t)
        })
    }

    fn collect<F: Fn(usize) -> bool>(frame: &FeatureFrame, targets: &[Option<f64>], keep: F) -> Self {
        let mut out = Dataset::default();
        for (i, target) in targets.iter().enumerate() {
            if let Some(y) = target {
                if keep(i) {
                    out.rows.push(i);
                    out.x.push(frame.rows[i].values.clone());
                    out.y.push(*y);
                }
            }
        }
        out
    }
}

/// Predict every row of `data` and pair it with its target
pub fn log_predictions(
    forecaster: &QuantileForecaster,
    frame: &FeatureFrame,
    data: &Dataset,
) -> Result<PredictionLog> {
    let mut log = PredictionLog::default();
    for ((&i, x), y) in data.rows.iter().zip(&data.x).zip(&data.y) {
        let row = &frame.rows[i];
        log.push(&row.symbol, row.date, *y, &forecaster.predict(x)?);
    }
    Ok(log)
}

trait CutoffExt {
    fn is_none_or_before(&self, date: NaiveDate) -> bool;
}

impl CutoffExt for Option<NaiveDate> {
    fn is_none_or_before(&self, date: NaiveDate) -> bool {
        self.map_or(true, |c| date < c)
    }
}

/// Fits the full model set for every configured horizon
pub struct ModelTrainer {
    config: ModelConfig,
}

impl ModelTrainer {
    pub fn new(config: ModelConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ModelConfig {
        &self.config
    }

    fn check_horizon(h: usize) -> Result<()> {
        if h == 0 || h > MAX_HORIZON {
            return Err(ForecastError::Validation(format!(
                "horizon {} outside 1..={}",
                h, MAX_HORIZON
            )));
        }
        Ok(())
    }

    /// Quantile forecaster for `horizon` on purged rows in `[from, cutoff)`
    pub fn fit_price(
        &self,
        frame: &FeatureFrame,
        horizon: usize,
        from: Option<NaiveDate>,
        cutoff: Option<NaiveDate>,
    ) -> Result<QuantileForecaster> {
        Self::check_horizon(horizon)?;
        let data = Dataset::purged(
            frame,
            &frame.return_targets(horizon),
            &frame.target_dates(horizon),
            from,
            cutoff,
        );
        if data.is_empty() {
            return Err(ForecastError::InsufficientData {
                required: 1,
                actual: 0,
            });
        }
        QuantileForecaster::fit(
            horizon,
            &data.x,
            &data.y,
            &self.config.quantiles,
            &frame.names,
            &self.config.price,
        )
    }

    pub fn fit_volume(
        &self,
        frame: &FeatureFrame,
        horizon: usize,
        from: Option<NaiveDate>,
        cutoff: Option<NaiveDate>,
    ) -> Result<VolumeForecaster> {
        Self::check_horizon(horizon)?;
        let data = Dataset::purged(
            frame,
            &frame.volume_targets(horizon),
            &frame.target_dates(horizon),
            from,
            cutoff,
        );
        if data.is_empty() {
            return Err(ForecastError::InsufficientData {
                required: 1,
                actual: 0,
            });
        }
        VolumeForecaster::fit(horizon, &data.x, &data.y, &self.config.volume)
    }

    /// Median and interval predictions against realised returns
    pub fn evaluate(
        forecaster: &QuantileForecaster,
        frame: &FeatureFrame,
        from: NaiveDate,
        to: Option<NaiveDate>,
    ) -> Result<PredictionLog> {
        let data = Dataset::window(frame, &frame.return_targets(forecaster.horizon), from, to);
        log_predictions(forecaster, frame, &data)
    }

    /// Train every horizon on the leading dates and score on the trailing
    /// `test_size` share of dates
    pub fn train(&self, frame: &FeatureFrame) -> Result<ForecastModels> {
        let dates = frame.unique_dates();
        if dates.len() < 2 {
            return Err(ForecastError::InsufficientData {
                required: 2,
                actual: dates.len(),
            });
        }

        let test_size = self.config.test_size.clamp(0.0, 0.9);
        let split = ((dates.len() as f64) * (1.0 - test_size)).floor() as usize;
        let split = split.clamp(1, dates.len());
        let test_start = dates.get(split).copied();
        let train_end = dates[split - 1];
        info!(
            "Training on {} dates up to {}, holding out {} dates",
            split,
            train_end,
            dates.len() - split
        );

        let mut price = BTreeMap::new();
        let mut volume = BTreeMap::new();
        let mut evaluation = Vec::new();
        let train_rows = frame
            .rows
            .iter()
            .filter(|r| test_start.is_none_or_before(r.date))
            .count();

        for &h in &self.config.horizons {
            let forecaster = self.fit_price(frame, h, None, test_start)?;
            if let Some(start) = test_start {
                let log = Self::evaluate(&forecaster, frame, start, None)?;
                match ForecastMetrics::from_log(h, &log) {
                    Some(metrics) => {
                        info!(
                            "{}-day hold-out: RMSE {:.5}, direction {:.1}%, 80% coverage {:.1}%",
                            h,
                            metrics.rmse,
                            metrics.directional_accuracy * 100.0,
                            metrics.coverage_80 * 100.0
                        );
                        evaluation.push(metrics);
                    }
                    None => warn!("{}-day hold-out window has no realised targets", h),
                }
            }
            price.insert(h, forecaster);
            volume.insert(h, self.fit_volume(frame, h, None, test_start)?);
        }

        let liquidity = LiquidityClassifier::fit(
            frame
                .rows
                .iter()
                .filter(|r| test_start.is_none_or_before(r.date))
                .map(|r| (r.symbol.as_str(), r.volume)),
        )?;

        let mut quantiles = self.config.quantiles.clone();
        quantiles.sort_by(|a, b| a.total_cmp(b));

        let manifest = ModelManifest {
            trained_at: Utc::now(),
            horizons: price.keys().copied().collect(),
            quantiles,
            feature_names: frame.names.clone(),
            symbols: frame.symbols(),
            train_rows,
            train_end,
            test_start,
            evaluation,
        };

        Ok(ForecastModels {
            manifest,
            price,
            volume,
            liquidity,
        })
    }
}
