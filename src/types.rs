//! Core domain types

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Forecast horizons are trading days ahead, 1 through `MAX_HORIZON`
pub const MAX_HORIZON: usize = 5;

/// Daily price bar for one listed stock
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceBar {
    pub date: NaiveDate,
    pub symbol: String,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
    /// Number of transactions in the session
    pub transactions: Option<f64>,
    /// Traded capital in TND
    pub turnover: Option<f64>,
}

/// Daily market index level (TUNINDEX and sector indices)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexBar {
    pub date: NaiveDate,
    pub code: String,
    pub value: f64,
}

/// Cash dividend detached on `ex_date`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DividendEvent {
    pub symbol: String,
    pub ex_date: NaiveDate,
    pub amount: f64,
}

/// Price bar after dividend back-adjustment
///
/// `open`/`high`/`low`/`close` are adjusted, `raw_close` is the traded close.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdjustedBar {
    pub date: NaiveDate,
    pub symbol: String,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub raw_close: f64,
    pub volume: f64,
    pub transactions: Option<f64>,
    pub turnover: Option<f64>,
    /// Cumulative multiplier applied to raw prices
    pub adj_factor: f64,
}

impl AdjustedBar {
    /// Wrap a raw bar with a unit factor
    pub fn from_raw(bar: &PriceBar) -> Self {
        Self {
            date: bar.date,
            symbol: bar.symbol.clone(),
            open: bar.open,
            high: bar.high,
            low: bar.low,
            close: bar.close,
            raw_close: bar.close,
            volume: bar.volume,
            transactions: bar.transactions,
            turnover: bar.turnover,
            adj_factor: 1.0,
        }
    }

    /// Scale prices by an additional multiplier
    pub fn scale(&mut self, multiplier: f64) {
        self.open *= multiplier;
        self.high *= multiplier;
        self.low *= multiplier;
        self.close *= multiplier;
        self.adj_factor *= multiplier;
    }
}

/// Liquidity bucket from volume percentiles
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LiquidityRegime {
    Low,
    Normal,
    High,
}

impl LiquidityRegime {
    pub fn code(&self) -> u8 {
        match self {
            LiquidityRegime::Low => 0,
            LiquidityRegime::Normal => 1,
            LiquidityRegime::High => 2,
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(LiquidityRegime::Low),
            1 => Some(LiquidityRegime::Normal),
            2 => Some(LiquidityRegime::High),
            _ => None,
        }
    }

    /// Classify against (q20, q80) boundaries
    pub fn classify(volume: f64, q20: f64, q80: f64) -> Self {
        if volume < q20 {
            LiquidityRegime::Low
        } else if volume > q80 {
            LiquidityRegime::High
        } else {
            LiquidityRegime::Normal
        }
    }
}

impl std::fmt::Display for LiquidityRegime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LiquidityRegime::Low => write!(f, "Low"),
            LiquidityRegime::Normal => write!(f, "Normal"),
            LiquidityRegime::High => write!(f, "High"),
        }
    }
}

/// Price interval in TND
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ConfidenceInterval {
    pub lower: f64,
    pub upper: f64,
}

impl ConfidenceInterval {
    pub fn width(&self) -> f64 {
        self.upper - self.lower
    }

    pub fn contains(&self, value: f64) -> bool {
        value >= self.lower && value <= self.upper
    }
}

/// One quantile of the forecast distribution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuantilePoint {
    pub quantile: f64,
    pub log_return: f64,
    pub price: f64,
}

/// Forecast for a single horizon
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HorizonForecast {
    pub horizon: usize,
    /// Trading day the forecast refers to
    pub target_date: NaiveDate,
    /// Median cumulative log return from the current close
    pub median_log_return: f64,
    /// Median price, `current_price * exp(median_log_return)`
    pub predicted_price: f64,
    pub ci_80: ConfidenceInterval,
    pub ci_95: ConfidenceInterval,
    pub quantiles: Vec<QuantilePoint>,
    pub predicted_volume: Option<f64>,
    pub liquidity_regime: Option<LiquidityRegime>,
}

/// Full response for one symbol
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionResult {
    pub symbol: String,
    pub current_price: f64,
    pub current_date: NaiveDate,
    pub forecasts: Vec<HorizonForecast>,
}

impl PredictionResult {
    pub fn horizon(&self, h: usize) -> Option<&HorizonForecast> {
        self.forecasts.iter().find(|f| f.horizon == h)
    }
}
