//! Forecast accuracy and trading performance metrics

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::models::QuantilePrediction;
use crate::types::ConfidenceInterval;

pub const TRADING_DAYS_PER_YEAR: f64 = 252.0;

/// One out-of-sample prediction next to its realised log return
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionRecord {
    pub symbol: String,
    pub date: NaiveDate,
    pub truth: f64,
    pub median: f64,
    pub ci_80: ConfidenceInterval,
    pub ci_95: ConfidenceInterval,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PredictionLog {
    pub records: Vec<PredictionRecord>,
}

impl PredictionLog {
    pub fn push(&mut self, symbol: &str, date: NaiveDate, truth: f64, prediction: &QuantilePrediction) {
        self.records.push(PredictionRecord {
            symbol: symbol.to_string(),
            date,
            truth,
            median: prediction.median,
            ci_80: prediction.ci_80,
            ci_95: prediction.ci_95,
        });
    }

    pub fn extend(&mut self, other: PredictionLog) {
        self.records.extend(other.records);
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Sign with zero mapped to zero
fn sign(v: f64) -> f64 {
    if v > 0.0 {
        1.0
    } else if v < 0.0 {
        -1.0
    } else {
        0.0
    }
}

pub fn rmse(truth: &[f64], pred: &[f64]) -> f64 {
    let n = truth.len().min(pred.len());
    if n == 0 {
        return f64::NAN;
    }
    let sse: f64 = truth.iter().zip(pred).map(|(t, p)| (t - p).powi(2)).sum();
    (sse / n as f64).sqrt()
}

pub fn mae(truth: &[f64], pred: &[f64]) -> f64 {
    let n = truth.len().min(pred.len());
    if n == 0 {
        return f64::NAN;
    }
    truth.iter().zip(pred).map(|(t, p)| (t - p).abs()).sum::<f64>() / n as f64
}

/// Mean absolute percentage error in percent over non-zero truths
pub fn mape(truth: &[f64], pred: &[f64]) -> Option<f64> {
    let errors: Vec<f64> = truth
        .iter()
        .zip(pred)
        .filter(|(t, _)| **t != 0.0)
        .map(|(t, p)| ((t - p) / t).abs())
        .collect();
    if errors.is_empty() {
        None
    } else {
        Some(errors.iter().sum::<f64>() / errors.len() as f64 * 100.0)
    }
}

/// Share of predictions with the same sign as the outcome
pub fn directional_accuracy(truth: &[f64], pred: &[f64]) -> f64 {
    let n = truth.len().min(pred.len());
    if n == 0 {
        return f64::NAN;
    }
    let correct = truth.iter().zip(pred).filter(|(t, p)| sign(**t) == sign(**p)).count();
    correct as f64 / n as f64
}

/// Share of predictions above `threshold` whose outcome is also above it
pub fn hit_rate(truth: &[f64], pred: &[f64], threshold: f64) -> f64 {
    let positives: Vec<f64> = truth
        .iter()
        .zip(pred)
        .filter(|(_, p)| **p > threshold)
        .map(|(t, _)| *t)
        .collect();
    if positives.is_empty() {
        return 0.0;
    }
    positives.iter().filter(|t| **t > threshold).count() as f64 / positives.len() as f64
}

/// Share of outcomes falling inside their interval
pub fn coverage(truth: &[f64], intervals: &[ConfidenceInterval]) -> f64 {
    let n = truth.len().min(intervals.len());
    if n == 0 {
        return f64::NAN;
    }
    truth.iter().zip(intervals).filter(|(t, ci)| ci.contains(**t)).count() as f64 / n as f64
}

pub fn mean_width(intervals: &[ConfidenceInterval]) -> f64 {
    if intervals.is_empty() {
        return f64::NAN;
    }
    intervals.iter().map(|ci| ci.width()).sum::<f64>() / intervals.len() as f64
}

/// Annualised Sharpe ratio of daily returns with a zero risk-free rate
pub fn sharpe_ratio(returns: &[f64]) -> f64 {
    if returns.is_empty() {
        return 0.0;
    }
    let n = returns.len() as f64;
    let mean = returns.iter().sum::<f64>() / n;
    let std = (returns.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / n).sqrt();
    if std == 0.0 {
        0.0
    } else {
        mean / std * TRADING_DAYS_PER_YEAR.sqrt()
    }
}

/// Deepest fall of an equity curve from its running peak, as a non-positive fraction
pub fn max_drawdown(equity: &[f64]) -> f64 {
    let mut peak = f64::NEG_INFINITY;
    let mut worst = 0.0;
    for &value in equity {
        peak = peak.max(value);
        if peak > 0.0 {
            worst = f64::min(worst, (value - peak) / peak);
        }
    }
    worst
}

/// Out-of-sample accuracy for one horizon
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastMetrics {
    pub horizon: usize,
    pub samples: usize,
    pub rmse: f64,
    pub mae: f64,
    pub mape: Option<f64>,
    pub directional_accuracy: f64,
    pub hit_rate: f64,
    pub coverage_80: f64,
    pub coverage_95: f64,
    pub width_80: f64,
    pub width_95: f64,
}

impl ForecastMetrics {
    /// `None` when the log is empty
    pub fn from_log(horizon: usize, log: &PredictionLog) -> Option<Self> {
        if log.is_empty() {
            return None;
        }
        let truth: Vec<f64> = log.records.iter().map(|r| r.truth).collect();
        let median: Vec<f64> = log.records.iter().map(|r| r.median).collect();
        let ci_80: Vec<ConfidenceInterval> = log.records.iter().map(|r| r.ci_80).collect();
        let ci_95: Vec<ConfidenceInterval> = log.records.iter().map(|r| r.ci_95).collect();

        Some(Self {
            horizon,
            samples: truth.len(),
            rmse: rmse(&truth, &median),
            mae: mae(&truth, &median),
            mape: mape(&truth, &median),
            directional_accuracy: directional_accuracy(&truth, &median),
            hit_rate: hit_rate(&truth, &median, 0.0),
            coverage_80: coverage(&truth, &ci_80),
            coverage_95: coverage(&truth, &ci_95),
            width_80: mean_width(&ci_80),
            width_95: mean_width(&ci_95),
        })
    }
}
