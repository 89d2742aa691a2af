//! Data quality checks and the ingestion validation report

use std::collections::{BTreeMap, HashSet};
use std::path::Path;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::config::DataConfig;
use crate::error::Result;
use crate::types::PriceBar;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueKind {
    Duplicates,
    Outliers,
    MissingValues,
    DateGaps,
    ZeroVolume,
    InvalidOhlc,
    NonPositivePrice,
    RejectedDividend,
    UnreadableRows,
    UnreadableFile,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityIssue {
    #[serde(rename = "type")]
    pub kind: IssueKind,
    pub severity: Severity,
    pub count: usize,
    pub message: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub details: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReportSummary {
    pub duplicates: usize,
    pub outliers: usize,
    pub missing_values: usize,
    pub date_gaps: usize,
    pub zero_volume_days: usize,
    pub invalid_ohlc: usize,
    pub excluded_rows: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub dataset: String,
    pub total_rows: usize,
    pub num_symbols: usize,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub issues: Vec<QualityIssue>,
    pub summary: ReportSummary,
}

impl ValidationReport {
    pub fn new(dataset: impl Into<String>) -> Self {
        Self {
            dataset: dataset.into(),
            ..Default::default()
        }
    }

    pub fn record(&mut self, issue: QualityIssue) {
        self.issues.push(issue);
    }

    pub fn exclude(&mut self, rows: usize) {
        self.summary.excluded_rows += rows;
    }

    pub fn issue(&self, kind: IssueKind) -> Option<&QualityIssue> {
        self.issues.iter().find(|i| i.kind == kind)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        info!("Validation report saved to {}", path.display());
        Ok(())
    }
}

/// Read-only checks over a price dataset
#[derive(Debug, Clone)]
pub struct DataQualityValidator {
    /// Day-over-day ratio threshold (`|pct| + 1`)
    pub outlier_threshold: f64,
    pub max_gap_days: i64,
}

impl Default for DataQualityValidator {
    fn default() -> Self {
        Self {
            outlier_threshold: 10.0,
            max_gap_days: 7,
        }
    }
}

impl DataQualityValidator {
    pub fn from_config(config: &DataConfig) -> Self {
        Self {
            outlier_threshold: config.outlier_threshold,
            max_gap_days: config.max_gap_days,
        }
    }

    /// Rows sharing a (date, symbol) key, all copies counted
    pub fn check_duplicates(&self, bars: &[PriceBar]) -> usize {
        let mut counts: BTreeMap<(&str, NaiveDate), usize> = BTreeMap::new();
        for bar in bars {
            *counts.entry((bar.symbol.as_str(), bar.date)).or_default() += 1;
        }
        counts.values().filter(|c| **c > 1).sum()
    }

    /// Closes whose move from the previous close exceeds the ratio threshold
    ///
    /// Expects bars sorted by (symbol, date).
    pub fn check_outliers(&self, bars: &[PriceBar]) -> usize {
        bars.windows(2)
            .filter(|w| w[0].symbol == w[1].symbol && w[0].close > 0.0)
            .filter(|w| ((w[1].close / w[0].close) - 1.0).abs() + 1.0 > self.outlier_threshold)
            .count()
    }

    /// Calendar gaps above `max_gap_days`, per symbol
    pub fn check_date_gaps(&self, bars: &[PriceBar]) -> BTreeMap<String, Vec<i64>> {
        let mut gaps: BTreeMap<String, Vec<i64>> = BTreeMap::new();
        for w in bars.windows(2) {
            if w[0].symbol != w[1].symbol {
                continue;
            }
            let days = (w[1].date - w[0].date).num_days();
            if days > self.max_gap_days {
                gaps.entry(w[1].symbol.clone()).or_default().push(days);
            }
        }
        gaps
    }

    pub fn check_zero_volume(&self, bars: &[PriceBar]) -> (usize, f64) {
        let zero = bars.iter().filter(|b| b.volume == 0.0).count();
        let pct = if bars.is_empty() {
            0.0
        } else {
            zero as f64 / bars.len() as f64 * 100.0
        };
        (zero, pct)
    }

    /// Rows where high/low do not bound open and close
    pub fn check_ohlc(&self, bars: &[PriceBar]) -> usize {
        bars.iter()
            .filter(|b| {
                b.high < b.low
                    || b.high < b.open
                    || b.high < b.close
                    || b.low > b.open
                    || b.low > b.close
            })
            .count()
    }

    pub fn check_missing(&self, bars: &[PriceBar]) -> BTreeMap<&'static str, usize> {
        let mut missing = BTreeMap::new();
        let transactions = bars.iter().filter(|b| b.transactions.is_none()).count();
        let turnover = bars.iter().filter(|b| b.turnover.is_none()).count();
        if transactions > 0 {
            missing.insert("transactions", transactions);
        }
        if turnover > 0 {
            missing.insert("turnover", turnover);
        }
        missing
    }

    /// Run every check and append findings to `report`
    pub fn validate(&self, bars: &[PriceBar], report: &mut ValidationReport) {
        info!("Running validation on {}", report.dataset);

        report.total_rows = bars.len();
        report.num_symbols = bars.iter().map(|b| b.symbol.as_str()).collect::<HashSet<_>>().len();
        report.start_date = bars.iter().map(|b| b.date).min();
        report.end_date = bars.iter().map(|b| b.date).max();

        let duplicates = self.check_duplicates(bars);
        if duplicates > 0 {
            warn!("{}: found {} duplicate rows", report.dataset, duplicates);
            report.record(QualityIssue {
                kind: IssueKind::Duplicates,
                severity: Severity::High,
                count: duplicates,
                message: format!("Found {} duplicate (date, symbol) rows", duplicates),
                details: Vec::new(),
            });
        }

        let outliers = self.check_outliers(bars);
        if outliers > 0 {
            warn!("{}: found {} outliers in close", report.dataset, outliers);
            report.record(QualityIssue {
                kind: IssueKind::Outliers,
                severity: Severity::Medium,
                count: outliers,
                message: format!(
                    "Found {} price jumps >{}x in close",
                    outliers, self.outlier_threshold
                ),
                details: Vec::new(),
            });
        }

        let missing = self.check_missing(bars);
        let missing_total: usize = missing.values().sum();
        if missing_total > 0 {
            report.record(QualityIssue {
                kind: IssueKind::MissingValues,
                severity: Severity::Low,
                count: missing_total,
                message: format!("Missing values in {} columns", missing.len()),
                details: missing.iter().map(|(k, v)| format!("{}: {}", k, v)).collect(),
            });
        }

        let gaps = self.check_date_gaps(bars);
        let gap_total: usize = gaps.values().map(Vec::len).sum();
        if gap_total > 0 {
            info!("{}: found date gaps in {} symbols", report.dataset, gaps.len());
            report.record(QualityIssue {
                kind: IssueKind::DateGaps,
                severity: Severity::Low,
                count: gap_total,
                message: format!(
                    "Found {} date gaps >{} days in {} symbols",
                    gap_total,
                    self.max_gap_days,
                    gaps.len()
                ),
                details: gaps.keys().cloned().collect(),
            });
        }

        let (zero_volume, zero_pct) = self.check_zero_volume(bars);
        if zero_volume > 0 {
            report.record(QualityIssue {
                kind: IssueKind::ZeroVolume,
                severity: Severity::Low,
                count: zero_volume,
                message: format!("Found {} zero-volume days ({:.2}%)", zero_volume, zero_pct),
                details: Vec::new(),
            });
        }

        let invalid = self.check_ohlc(bars);
        if invalid > 0 {
            warn!("{}: {} rows with inconsistent OHLC", report.dataset, invalid);
            report.record(QualityIssue {
                kind: IssueKind::InvalidOhlc,
                severity: Severity::Medium,
                count: invalid,
                message: format!("Found {} rows where high/low do not bound open/close", invalid),
                details: Vec::new(),
            });
        }

        report.summary.duplicates = duplicates;
        report.summary.outliers = outliers;
        report.summary.missing_values = missing_total;
        report.summary.date_gaps = gaps.len();
        report.summary.zero_volume_days = zero_volume;
        report.summary.invalid_ohlc = invalid;

        info!(
            "Validation complete: {} issues found",
            report.issues.len()
        );
    }
}

/// Sort, drop duplicate keys (first kept) and repair non-positive prices
///
/// Non-positive open/high/low/close values are forward filled within the
/// symbol, then back filled. Rows whose close cannot be repaired are dropped.
pub fn clean_bars(mut bars: Vec<PriceBar>, report: &mut ValidationReport) -> Vec<PriceBar> {
    bars.sort_by(|a, b| a.symbol.cmp(&b.symbol).then(a.date.cmp(&b.date)));

    let before = bars.len();
    bars.dedup_by(|b, a| a.symbol == b.symbol && a.date == b.date);
    let dropped_dupes = before - bars.len();
    report.exclude(dropped_dupes);

    let mut repaired = 0usize;
    let mut cleaned = Vec::with_capacity(bars.len());
    for series in bars.chunk_by_mut(|a, b| a.symbol == b.symbol) {
        repaired += fill_non_positive(series, |b| &mut b.close);
        repaired += fill_non_positive(series, |b| &mut b.open);
        repaired += fill_non_positive(series, |b| &mut b.high);
        repaired += fill_non_positive(series, |b| &mut b.low);
        cleaned.extend(series.iter().filter(|b| b.close > 0.0).cloned());
    }

    let unrepairable = bars.len() - cleaned.len();
    if repaired > 0 || unrepairable > 0 {
        warn!("Repaired {} non-positive prices, dropped {} rows", repaired, unrepairable);
        report.record(QualityIssue {
            kind: IssueKind::NonPositivePrice,
            severity: Severity::Medium,
            count: repaired + unrepairable,
            message: format!(
                "Filled {} non-positive prices, excluded {} rows without a usable close",
                repaired, unrepairable
            ),
            details: Vec::new(),
        });
        report.exclude(unrepairable);
    }
    cleaned
}

fn fill_non_positive<F>(series: &mut [PriceBar], field: F) -> usize
where
    F: Fn(&mut PriceBar) -> &mut f64,
{
    let mut filled = 0;
    let mut last: Option<f64> = None;
    for bar in series.iter_mut() {
        let value = field(bar);
        if *value > 0.0 {
            last = Some(*value);
        } else if let Some(prev) = last {
            *value = prev;
            filled += 1;
        }
    }
    let mut next: Option<f64> = None;
    for bar in series.iter_mut().rev() {
        let value = field(bar);
        if *value > 0.0 {
            next = Some(*value);
        } else if let Some(following) = next {
            *value = following;
            filled += 1;
        }
    }
    filled
}
