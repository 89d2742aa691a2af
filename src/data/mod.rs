//! Market data ingestion
//!
//! Provides:
//! - Locale-aware loaders for CSV/TXT quotation files and Excel dividend files
//! - Data quality validation with a JSON report
//! - Dividend back-adjustment of price series
//!
//! ```text
//! price files ─┐
//!              ├→ validate → clean → adjust dividends → adjusted_prices.csv
//! dividends  ──┘                                      → validation_report.json
//! ```

pub mod dividends;
pub mod loaders;
pub mod quality;
pub mod schema;


use std::fs::File;
use std::path::Path;

use tracing::{info, warn};

pub use dividends::{adjust_series, event_multiplier, summarize, AdjustmentSummary, DividendAdjuster};
pub use loaders::{load_dividends, load_index_bars, load_price_bars, DataFormat, Loaded, Table};
pub use quality::{
    clean_bars, DataQualityValidator, IssueKind, QualityIssue, Severity, ValidationReport,
};

use schema::normalize_symbol;

use crate::config::DataConfig;
use crate::error::{ForecastError, Result};
use crate::types::{AdjustedBar, DividendEvent, IndexBar, PriceBar};

pub const ADJUSTED_FILE: &str = "adjusted_prices.csv";
pub const INDEX_FILE: &str = "index.csv";
pub const REPORT_FILE: &str = "validation_report.json";
pub const SUMMARY_FILE: &str = "adjustment_summary.json";

/// Output of the ingestion stage
#[derive(Debug, Clone)]
pub struct MarketData {
    /// Sorted by (symbol, date)
    pub bars: Vec<AdjustedBar>,
    /// Benchmark index, sorted by date
    pub index: Vec<IndexBar>,
    pub report: ValidationReport,
    pub summary: AdjustmentSummary,
}

impl MarketData {
    pub fn symbols(&self) -> Vec<String> {
        let mut symbols: Vec<String> = self.bars.iter().map(|b| b.symbol.clone()).collect();
        symbols.dedup();
        symbols
    }

    /// Write adjusted bars, index, report and summary under `dir`
    pub fn save(&self, dir: &Path) -> Result<()> {
        std::fs::create_dir_all(dir)?;
        write_records(&dir.join(ADJUSTED_FILE), &self.bars)?;
        if !self.index.is_empty() {
            write_records(&dir.join(INDEX_FILE), &self.index)?;
        }
        self.report.save(&dir.join(REPORT_FILE))?;
        std::fs::write(
            dir.join(SUMMARY_FILE),
            serde_json::to_string_pretty(&self.summary)?,
        )?;
        info!("Saved {} adjusted bars to {}", self.bars.len(), dir.display());
        Ok(())
    }
}

/// Load every configured file, validate, clean and adjust for dividends
///
/// Unreadable files and rows are recorded in the report; only an empty
/// result is an error.
pub fn ingest(config: &DataConfig) -> Result<MarketData> {
    let mut report = ValidationReport::new("bvmt_quotations");

    let mut prices: Loaded<PriceBar> = Loaded::default();
    for file in &config.price_files {
        let path = config.resolve(file);
        match load_price_bars(&path) {
            Ok(loaded) => prices.merge(loaded),
            Err(e) => {
                warn!("Failed to load {}: {}", path.display(), e);
                record_unreadable_file(&mut report, &path, &e);
            }
        }
    }

    let mut dividends: Vec<DividendEvent> = Vec::new();
    for file in &config.dividend_files {
        let path = config.resolve(file);
        match load_dividends(&path) {
            Ok(loaded) => {
                report.exclude(loaded.skipped);
                dividends.extend(loaded.records);
            }
            Err(e) => {
                warn!("Failed to load {}: {}", path.display(), e);
                record_unreadable_file(&mut report, &path, &e);
            }
        }
    }

    let index = match &config.index_file {
        Some(file) => {
            let path = config.resolve(file);
            match load_index_bars(&path, Some(&config.market_index)) {
                Ok(loaded) => sorted_index(loaded.records),
                Err(e) => {
                    warn!("Failed to load index {}: {}", path.display(), e);
                    record_unreadable_file(&mut report, &path, &e);
                    Vec::new()
                }
            }
        }
        None => Vec::new(),
    };

    build_market_data(prices, dividends, index, &DataQualityValidator::from_config(config), report)
}

/// Shared tail of ingestion, usable with in-memory inputs
pub fn build_market_data(
    prices: Loaded<PriceBar>,
    dividends: Vec<DividendEvent>,
    index: Vec<IndexBar>,
    validator: &DataQualityValidator,
    mut report: ValidationReport,
) -> Result<MarketData> {
    if prices.skipped > 0 {
        report.record(QualityIssue {
            kind: IssueKind::UnreadableRows,
            severity: Severity::Medium,
            count: prices.skipped,
            message: format!("Skipped {} rows without date, symbol or close", prices.skipped),
            details: Vec::new(),
        });
        report.exclude(prices.skipped);
    }

    let mut bars = prices.records;
    for bar in &mut bars {
        bar.symbol = normalize_symbol(&bar.symbol);
    }
    bars.sort_by(|a, b| a.symbol.cmp(&b.symbol).then(a.date.cmp(&b.date)));
    validator.validate(&bars, &mut report);

    let cleaned = clean_bars(bars, &mut report);
    if cleaned.is_empty() {
        return Err(ForecastError::Data("no usable price bars loaded".to_string()));
    }

    let adjuster = DividendAdjuster::new(dividends);
    info!("Adjusting {} symbols for {} dividend events", count_symbols(&cleaned), adjuster.num_events());
    let adjusted = adjuster.adjust_all(&cleaned, &mut report);
    let summary = summarize(&adjusted);
    info!(
        "Ingested {} bars for {} symbols ({} adjusted by dividends)",
        adjusted.len(),
        summary.total_symbols,
        summary.symbols_adjusted
    );

    Ok(MarketData {
        bars: adjusted,
        index,
        report,
        summary,
    })
}

fn count_symbols(bars: &[PriceBar]) -> usize {
    bars.chunk_by(|a, b| a.symbol == b.symbol).count()
}

fn record_unreadable_file(report: &mut ValidationReport, path: &Path, err: &ForecastError) {
    report.record(QualityIssue {
        kind: IssueKind::UnreadableFile,
        severity: Severity::High,
        count: 1,
        message: format!("Could not read {}", path.display()),
        details: vec![err.to_string()],
    });
}

fn sorted_index(mut index: Vec<IndexBar>) -> Vec<IndexBar> {
    index.sort_by_key(|b| b.date);
    index.dedup_by_key(|b| b.date);
    index
}

fn write_records<T: serde::Serialize>(path: &Path, records: &[T]) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)?;
    for record in records {
        writer.serialize(record)?;
    }
    writer.flush()?;
    Ok(())
}

fn read_records<T: serde::de::DeserializeOwned>(path: &Path) -> Result<Vec<T>> {
    let file = File::open(path).map_err(|e| {
        ForecastError::Data(format!("cannot open {}: {}", path.display(), e))
    })?;
    let mut reader = csv::Reader::from_reader(file);
    let mut records = Vec::new();
    for record in reader.deserialize() {
        records.push(record?);
    }
    Ok(records)
}

/// Read adjusted bars and the optional index written by [`MarketData::save`]
pub fn load_processed(dir: &Path) -> Result<(Vec<AdjustedBar>, Vec<IndexBar>)> {
    let mut bars: Vec<AdjustedBar> = read_records(&dir.join(ADJUSTED_FILE))?;
    bars.sort_by(|a, b| a.symbol.cmp(&b.symbol).then(a.date.cmp(&b.date)));
    let index_path = dir.join(INDEX_FILE);
    let index = if index_path.exists() {
        sorted_index(read_records(&index_path)?)
    } else {
        Vec::new()
    };
    Ok((bars, index))
}
