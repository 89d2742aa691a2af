//! Feature engineering
//!
//! Provides:
//! - Independent transformers behind [`FeatureTransformer`] (price, volume,
//!   market, calendar)
//! - [`FeaturePipeline`] applying them per symbol and dropping warm-up rows
//! - [`FeatureFrame`] with target construction for training
//! - Parquet persistence of the feature matrix
//!
//! No feature at date `d` reads a bar dated after `d`. Targets read bars
//! strictly after `d` and are never part of the feature columns.

pub mod calendar;
pub mod indicators;
pub mod market;
pub mod price;
pub mod store;
pub mod volume;


use std::collections::{BTreeMap, BTreeSet};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::calendar::TradingCalendar;
use crate::config::FeatureConfig;
use crate::error::{ForecastError, Result};
use crate::types::{AdjustedBar, IndexBar};

pub use calendar::CalendarFeatures;
pub use market::MarketFeatures;
pub use price::PriceFeatures;
pub use store::{load_parquet, save_parquet};
pub use volume::VolumeFeatures;

/// Shared inputs beyond a symbol's own bars
#[derive(Debug, Clone, Default)]
pub struct FeatureContext {
    /// Benchmark log return keyed by date
    pub market_returns: BTreeMap<NaiveDate, f64>,
    pub calendar: TradingCalendar,
}

impl FeatureContext {
    /// Build from an index series sorted by date
    pub fn new(index: &[IndexBar]) -> Self {
        let market_returns = index
            .windows(2)
            .filter(|w| w[0].value > 0.0 && w[1].value > 0.0)
            .map(|w| (w[1].date, (w[1].value / w[0].value).ln()))
            .collect();
        Self {
            market_returns,
            calendar: TradingCalendar::new(),
        }
    }

    pub fn has_market(&self) -> bool {
        !self.market_returns.is_empty()
    }
}

/// One family of derived columns
pub trait FeatureTransformer: Send + Sync {
    fn name(&self) -> &'static str;

    /// Output column names, in order
    fn columns(&self) -> Vec<String>;

    /// One column per name, each `bars.len()` long, for a single symbol
    /// sorted by date
    fn transform(&self, bars: &[AdjustedBar], ctx: &FeatureContext) -> Vec<Vec<f64>>;

    /// Leading rows whose values are not fully defined
    fn warmup(&self) -> usize;

    /// Whether warm-up rows must be dropped for this family
    fn required(&self) -> bool {
        true
    }
}

/// Features for one (symbol, date)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureRow {
    pub symbol: String,
    pub date: NaiveDate,
    /// Adjusted close, used for return targets
    pub close: f64,
    /// Traded close, used to express forecasts in TND
    pub raw_close: f64,
    pub volume: f64,
    pub values: Vec<f64>,
}

/// Feature matrix sorted by (symbol, date)
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeatureFrame {
    pub names: Vec<String>,
    pub rows: Vec<FeatureRow>,
}

impl FeatureFrame {
    pub fn new(names: Vec<String>, mut rows: Vec<FeatureRow>) -> Self {
        rows.sort_by(|a, b| a.symbol.cmp(&b.symbol).then(a.date.cmp(&b.date)));
        Self { names, rows }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn symbols(&self) -> Vec<String> {
        let mut symbols: Vec<String> = self.rows.iter().map(|r| r.symbol.clone()).collect();
        symbols.dedup();
        symbols
    }

    pub fn unique_dates(&self) -> Vec<NaiveDate> {
        self.rows
            .iter()
            .map(|r| r.date)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    pub fn rows_for<'a>(&'a self, symbol: &'a str) -> impl Iterator<Item = &'a FeatureRow> + 'a {
        self.rows.iter().filter(move |r| r.symbol == symbol)
    }

    /// Most recent row of a symbol
    pub fn latest(&self, symbol: &str) -> Option<&FeatureRow> {
        self.rows.iter().rev().find(|r| r.symbol == symbol)
    }

    /// Row index `h` rows ahead within the same symbol
    fn ahead(&self, i: usize, h: usize) -> Option<&FeatureRow> {
        let row = &self.rows[i];
        self.rows.get(i + h).filter(|r| r.symbol == row.symbol)
    }

    /// Cumulative log return `ln(close[t+h] / close[t])`, `None` at the tail
    pub fn return_targets(&self, h: usize) -> Vec<Option<f64>> {
        (0..self.rows.len())
            .map(|i| {
                let now = self.rows[i].close;
                self.ahead(i, h)
                    .filter(|next| next.close > 0.0 && now > 0.0)
                    .map(|next| (next.close / now).ln())
            })
            .collect()
    }

    /// `ln(1 + volume[t+h])`
    pub fn volume_targets(&self, h: usize) -> Vec<Option<f64>> {
        (0..self.rows.len())
            .map(|i| self.ahead(i, h).map(|next| next.volume.max(0.0).ln_1p()))
            .collect()
    }

    /// Date whose bar the `h`-ahead target reads
    pub fn target_dates(&self, h: usize) -> Vec<Option<NaiveDate>> {
        (0..self.rows.len())
            .map(|i| self.ahead(i, h).map(|next| next.date))
            .collect()
    }
}

/// Ordered set of transformers
pub struct FeaturePipeline {
    transformers: Vec<Box<dyn FeatureTransformer>>,
}

impl FeaturePipeline {
    /// Default families: price, volume, market, calendar
    pub fn new(config: &FeatureConfig) -> Self {
        Self::empty()
            .with_transformer(Box::new(PriceFeatures::new(config.clone())))
            .with_transformer(Box::new(VolumeFeatures::new(config.clone())))
            .with_transformer(Box::new(MarketFeatures::new(config.beta_window)))
            .with_transformer(Box::new(CalendarFeatures))
    }

    pub fn empty() -> Self {
        Self {
            transformers: Vec::new(),
        }
    }

    pub fn with_transformer(mut self, transformer: Box<dyn FeatureTransformer>) -> Self {
        self.transformers.push(transformer);
        self
    }

    pub fn feature_names(&self) -> Vec<String> {
        self.transformers.iter().flat_map(|t| t.columns()).collect()
    }

    /// Rows dropped at the start of each symbol
    pub fn warmup(&self) -> usize {
        self.transformers
            .iter()
            .filter(|t| t.required())
            .map(|t| t.warmup())
            .max()
            .unwrap_or(0)
    }

    /// Features for one symbol, warm-up rows removed
    pub fn transform_symbol(&self, bars: &[AdjustedBar], ctx: &FeatureContext) -> Result<Vec<FeatureRow>> {
        let names = self.feature_names();
        let mut columns: Vec<Vec<f64>> = Vec::with_capacity(names.len());
        for transformer in &self.transformers {
            let produced = transformer.transform(bars, ctx);
            if produced.len() != transformer.columns().len()
                || produced.iter().any(|c| c.len() != bars.len())
            {
                return Err(ForecastError::Internal(format!(
                    "transformer {} produced a misaligned output",
                    transformer.name()
                )));
            }
            columns.extend(produced);
        }

        let warmup = self.warmup();
        let rows = bars
            .iter()
            .enumerate()
            .skip(warmup)
            .map(|(i, bar)| FeatureRow {
                symbol: bar.symbol.clone(),
                date: bar.date,
                close: bar.close,
                raw_close: bar.raw_close,
                volume: bar.volume,
                values: columns
                    .iter()
                    .map(|c| if c[i].is_finite() { c[i] } else { f64::NAN })
                    .collect(),
            })
            .collect();
        Ok(rows)
    }

    /// Features for all symbols; `bars` sorted by (symbol, date)
    pub fn transform(&self, bars: &[AdjustedBar], index: &[IndexBar]) -> Result<FeatureFrame> {
        let ctx = FeatureContext::new(index);
        let warmup = self.warmup();
        let mut rows = Vec::new();
        let mut short = 0usize;

        for series in bars.chunk_by(|a, b| a.symbol == b.symbol) {
            if series.len() <= warmup {
                debug!("{}: {} bars, below warm-up of {}", series[0].symbol, series.len(), warmup);
                short += 1;
                continue;
            }
            rows.extend(self.transform_symbol(series, &ctx)?);
        }

        if rows.is_empty() {
            return Err(ForecastError::InsufficientData {
                required: warmup + 1,
                actual: bars.len(),
            });
        }

        let frame = FeatureFrame::new(self.feature_names(), rows);
        info!(
            "Built {} feature rows x {} columns ({} symbols skipped for short history)",
            frame.len(),
            frame.names.len(),
            short
        );
        Ok(frame)
    }
}
