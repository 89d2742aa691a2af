//! Walk-forward validation
//!
//! Provides:
//! - Fold generation over unique trading dates (expanding or rolling)
//! - Purged per-fold training and out-of-sample scoring
//! - Accuracy and interval metrics per horizon
//! - A long-only / long-short backtest of the shortest horizon
//!
//! Every fold trains only on rows dated before its test window and whose
//! targets are realised before it, so `train_end < test_start` always holds.

pub mod backtest;
pub mod metrics;


use std::collections::BTreeMap;
use std::path::Path;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::config::{ModelConfig, ValidationConfig, WindowMode};
use crate::error::{ForecastError, Result};
use crate::features::FeatureFrame;
use crate::models::store::write_json;
use crate::models::{log_predictions, Dataset, QuantileForecaster};

pub use backtest::{Backtester, BacktestSummary};
pub use metrics::{ForecastMetrics, PredictionLog, PredictionRecord};

/// Date bounds of one fold, all inclusive
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationFold {
    pub index: usize,
    pub train_start: NaiveDate,
    pub train_end: NaiveDate,
    pub test_start: NaiveDate,
    pub test_end: NaiveDate,
}

/// What happened to one (fold, horizon) pair
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FoldOutcome {
    pub fold: ValidationFold,
    pub horizon: usize,
    pub train_rows: usize,
    pub test_rows: usize,
    /// Scores on this fold's test window alone
    pub metrics: Option<ForecastMetrics>,
    /// Reason the pair was not evaluated
    pub skipped: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WalkForwardReport {
    pub folds: Vec<FoldOutcome>,
    pub metrics: Vec<ForecastMetrics>,
    pub backtest: Option<BacktestSummary>,
}

impl WalkForwardReport {
    pub fn evaluated_folds(&self) -> usize {
        self.folds.iter().filter(|f| f.skipped.is_none()).count()
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        write_json(path, self)?;
        info!("Saved walk-forward report to {}", path.display());
        Ok(())
    }
}

pub struct WalkForwardValidator {
    config: ValidationConfig,
}

impl WalkForwardValidator {
    pub fn new(config: ValidationConfig) -> Self {
        Self { config }
    }

    /// Folds with a full test window of `step_size` dates
    pub fn folds(&self, dates: &[NaiveDate]) -> Vec<ValidationFold> {
        let initial = self.config.initial_train_size.max(1);
        let step = self.config.step_size.max(1);
        let mut folds = Vec::new();
        let mut t1 = initial;

        while t1 + step <= dates.len() {
            if self.config.max_splits.is_some_and(|max| folds.len() >= max) {
                break;
            }
            let t0 = match self.config.window {
                WindowMode::Expanding => 0,
                WindowMode::Rolling => t1 - initial,
            };
            folds.push(ValidationFold {
                index: folds.len(),
                train_start: dates[t0],
                train_end: dates[t1 - 1],
                test_start: dates[t1],
                test_end: dates[t1 + step - 1],
            });
            t1 += step;
        }
        folds
    }

    /// Retrain and score every fold for every configured horizon
    pub fn run(&self, frame: &FeatureFrame, models: &ModelConfig) -> Result<WalkForwardReport> {
        let dates = frame.unique_dates();
        let folds = self.folds(&dates);
        if folds.is_empty() {
            return Err(ForecastError::InsufficientData {
                required: self.config.initial_train_size + self.config.step_size,
                actual: dates.len(),
            });
        }
        info!("Walk-forward over {} folds ({:?} window)", folds.len(), self.config.window);

        let mut price_config = models.price.clone();
        if let Some(n) = self.config.fold_estimators {
            price_config.n_estimators = n;
        }

        let mut outcomes = Vec::new();
        let mut logs: BTreeMap<usize, PredictionLog> = BTreeMap::new();

        for &h in &models.horizons {
            let targets = frame.return_targets(h);
            let target_dates = frame.target_dates(h);

            for fold in &folds {
                let train = Dataset::purged(
                    frame,
                    &targets,
                    &target_dates,
                    Some(fold.train_start),
                    Some(fold.test_start),
                );
                let test = Dataset::window(frame, &targets, fold.test_start, Some(fold.test_end));
                let mut outcome = FoldOutcome {
                    fold: *fold,
                    horizon: h,
                    train_rows: train.len(),
                    test_rows: test.len(),
                    metrics: None,
                    skipped: None,
                };

                if train.len() < self.config.min_train_samples || test.len() < self.config.min_test_samples {
                    let reason = format!(
                        "{} train / {} test rows, need {} / {}",
                        train.len(),
                        test.len(),
                        self.config.min_train_samples,
                        self.config.min_test_samples
                    );
                    warn!("Skipping fold {} for {}-day horizon: {}", fold.index, h, reason);
                    outcome.skipped = Some(reason);
                    outcomes.push(outcome);
                    continue;
                }

                let forecaster =
                    QuantileForecaster::fit(h, &train.x, &train.y, &models.quantiles, &frame.names, &price_config)?;
                let fold_log = log_predictions(&forecaster, frame, &test)?;
                outcome.metrics = ForecastMetrics::from_log(h, &fold_log);
                logs.entry(h).or_default().extend(fold_log);
                outcomes.push(outcome);
            }
        }

        let metrics: Vec<ForecastMetrics> = logs
            .iter()
            .filter_map(|(h, log)| ForecastMetrics::from_log(*h, log))
            .collect();
        for m in &metrics {
            info!(
                "{}-day: n={} RMSE {:.5} MAE {:.5} direction {:.1}% 80% cov {:.1}% 95% cov {:.1}%",
                m.horizon,
                m.samples,
                m.rmse,
                m.mae,
                m.directional_accuracy * 100.0,
                m.coverage_80 * 100.0,
                m.coverage_95 * 100.0
            );
        }

        let backtest = logs
            .iter()
            .next()
            .and_then(|(_, log)| {
                Backtester::new(self.config.strategy, self.config.transaction_cost).run(&log.records)
            });

        let report = WalkForwardReport {
            folds: outcomes,
            metrics,
            backtest,
        };
        info!(
            "Walk-forward complete: {} of {} fold/horizon pairs evaluated",
            report.evaluated_folds(),
            report.folds.len()
        );
        Ok(report)
    }
}
