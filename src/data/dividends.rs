//! Dividend back-adjustment
//!
//! For each cash dividend detached on `ex_date`, every bar dated before
//! `ex_date` is multiplied by `1 - amount / close_before_ex`, where
//! `close_before_ex` is the last traded close strictly before `ex_date`.
//! Multipliers of successive dividends compound.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::quality::{IssueKind, QualityIssue, Severity, ValidationReport};
use super::schema::normalize_symbol;
use crate::error::{ForecastError, Result};
use crate::types::{AdjustedBar, DividendEvent, PriceBar};

/// Multiplier for one event against a single-symbol series sorted by date
///
/// Returns `Ok(None)` when no bar precedes the ex-date.
pub fn event_multiplier(bars: &[PriceBar], event: &DividendEvent) -> Result<Option<f64>> {
    let prev_close = match bars.iter().rev().find(|b| b.date < event.ex_date) {
        Some(bar) => bar.close,
        None => return Ok(None),
    };

    if event.amount <= 0.0 {
        return Err(ForecastError::Data(format!(
            "{} dividend on {} is not positive: {}",
            event.symbol, event.ex_date, event.amount
        )));
    }
    if prev_close <= 0.0 || event.amount >= prev_close {
        return Err(ForecastError::Data(format!(
            "{} dividend {} on {} is not below the prior close {}",
            event.symbol, event.amount, event.ex_date, prev_close
        )));
    }
    Ok(Some(1.0 - event.amount / prev_close))
}

fn apply(adjusted: &mut [AdjustedBar], event: &DividendEvent, multiplier: f64) {
    for bar in adjusted.iter_mut().filter(|b| b.date < event.ex_date) {
        bar.scale(multiplier);
    }
}

fn sorted_desc<'a>(events: impl Iterator<Item = &'a DividendEvent>) -> Vec<&'a DividendEvent> {
    let mut events: Vec<&DividendEvent> = events.collect();
    events.sort_by(|a, b| b.ex_date.cmp(&a.ex_date));
    events
}

/// Adjust one symbol's series (sorted ascending by date)
///
/// Fails on the first event whose amount is not below the prior close.
pub fn adjust_series(bars: &[PriceBar], dividends: &[DividendEvent]) -> Result<Vec<AdjustedBar>> {
    let mut adjusted: Vec<AdjustedBar> = bars.iter().map(AdjustedBar::from_raw).collect();
    for event in sorted_desc(dividends.iter()) {
        match event_multiplier(bars, event)? {
            Some(multiplier) => apply(&mut adjusted, event, multiplier),
            None => debug!("{}: no bar before ex-date {}", event.symbol, event.ex_date),
        }
    }
    Ok(adjusted)
}

/// Batch adjuster over many symbols
#[derive(Debug, Clone, Default)]
pub struct DividendAdjuster {
    by_symbol: HashMap<String, Vec<DividendEvent>>,
}

impl DividendAdjuster {
    pub fn new(events: Vec<DividendEvent>) -> Self {
        let mut by_symbol: HashMap<String, Vec<DividendEvent>> = HashMap::new();
        for event in events {
            by_symbol
                .entry(normalize_symbol(&event.symbol))
                .or_default()
                .push(event);
        }
        Self { by_symbol }
    }

    pub fn num_events(&self) -> usize {
        self.by_symbol.values().map(Vec::len).sum()
    }

    /// Adjust all bars; rejected events go to the report and are skipped
    ///
    /// `bars` must be sorted by (symbol, date).
    pub fn adjust_all(&self, bars: &[PriceBar], report: &mut ValidationReport) -> Vec<AdjustedBar> {
        let mut output = Vec::with_capacity(bars.len());
        let mut rejected = Vec::new();
        let mut applied = 0usize;
        let mut seen = std::collections::HashSet::new();

        for series in bars.chunk_by(|a, b| a.symbol == b.symbol) {
            let symbol = normalize_symbol(&series[0].symbol);
            seen.insert(symbol.clone());
            let mut adjusted: Vec<AdjustedBar> = series.iter().map(AdjustedBar::from_raw).collect();

            if let Some(events) = self.by_symbol.get(&symbol) {
                for event in sorted_desc(events.iter()) {
                    match event_multiplier(series, event) {
                        Ok(Some(multiplier)) => {
                            apply(&mut adjusted, event, multiplier);
                            applied += 1;
                        }
                        Ok(None) => debug!("{}: no bar before ex-date {}", symbol, event.ex_date),
                        Err(e) => {
                            warn!("Rejected dividend: {}", e);
                            rejected.push(e.to_string());
                        }
                    }
                }
            }
            output.extend(adjusted);
        }

        let unknown: Vec<&String> = self.by_symbol.keys().filter(|s| !seen.contains(*s)).collect();
        if !unknown.is_empty() {
            warn!("{} dividend symbols have no price history", unknown.len());
        }

        if !rejected.is_empty() {
            report.record(QualityIssue {
                kind: IssueKind::RejectedDividend,
                severity: Severity::High,
                count: rejected.len(),
                message: format!("Rejected {} dividends not below the prior close", rejected.len()),
                details: rejected,
            });
        }
        info!("Applied {} dividend adjustments", applied);
        output
    }
}

/// Statistics over an adjusted dataset
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdjustmentSummary {
    pub total_symbols: usize,
    pub symbols_adjusted: usize,
    pub adjusted_rows: usize,
    pub avg_factor: Option<f64>,
    pub min_factor: f64,
    pub max_factor: f64,
}

pub fn summarize(adjusted: &[AdjustedBar]) -> AdjustmentSummary {
    let mut symbols: HashMap<&str, bool> = HashMap::new();
    let mut adjusted_rows = 0usize;
    let mut factor_sum = 0.0;
    let mut min_factor = f64::INFINITY;
    let mut max_factor = f64::NEG_INFINITY;

    for bar in adjusted {
        let is_adjusted = (bar.adj_factor - 1.0).abs() > f64::EPSILON;
        let entry = symbols.entry(bar.symbol.as_str()).or_insert(false);
        *entry |= is_adjusted;
        if is_adjusted {
            adjusted_rows += 1;
            factor_sum += bar.adj_factor;
        }
        min_factor = min_factor.min(bar.adj_factor);
        max_factor = max_factor.max(bar.adj_factor);
    }

    AdjustmentSummary {
        total_symbols: symbols.len(),
        symbols_adjusted: symbols.values().filter(|v| **v).count(),
        adjusted_rows,
        avg_factor: (adjusted_rows > 0).then(|| factor_sum / adjusted_rows as f64),
        min_factor: if adjusted.is_empty() { 1.0 } else { min_factor },
        max_factor: if adjusted.is_empty() { 1.0 } else { max_factor },
    }
}
