//! File loaders for quotation, index and dividend exports
//!
//! Every format is first read into a string [`Table`]; record parsing is
//! shared. The format is picked from the file extension.

use std::fs::File;
use std::path::Path;

use calamine::{open_workbook_auto, Data, Reader};
use chrono::{Duration, NaiveDate};
use tracing::{debug, info, warn};

use super::schema::{col, decode_field, normalize_symbol, ColumnMap, DIVIDEND_ALIASES, QUOTE_ALIASES};
use crate::error::{ForecastError, Result};
use crate::types::{DividendEvent, IndexBar, PriceBar};

/// Supported input formats
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataFormat {
    /// `;` separated exports (2022 onwards)
    Csv,
    /// Tab or whitespace separated exports (2012-2021)
    Txt,
    /// Dividend workbooks
    Excel,
}

impl DataFormat {
    pub fn from_path(path: &Path) -> Result<Self> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_lowercase())
            .unwrap_or_default();
        match ext.as_str() {
            "csv" => Ok(DataFormat::Csv),
            "txt" => Ok(DataFormat::Txt),
            "xls" | "xlsx" => Ok(DataFormat::Excel),
            other => Err(ForecastError::Data(format!(
                "unsupported file type '.{}' for {}",
                other,
                path.display()
            ))),
        }
    }
}

/// Header row plus string cells
#[derive(Debug, Clone, Default)]
pub struct Table {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl Table {
    /// Read any supported file into a table
    pub fn read(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(ForecastError::Data(format!("file not found: {}", path.display())));
        }
        match DataFormat::from_path(path)? {
            DataFormat::Csv => read_delimited(path, b';'),
            DataFormat::Txt => read_txt(path),
            DataFormat::Excel => read_excel(path),
        }
    }
}

/// Parsed records with the count of rows that could not be used
#[derive(Debug, Clone)]
pub struct Loaded<T> {
    pub records: Vec<T>,
    pub skipped: usize,
    /// Optional cells filled with a default (open/high/low from close, volume 0)
    pub filled: usize,
}

impl<T> Default for Loaded<T> {
    fn default() -> Self {
        Self {
            records: Vec::new(),
            skipped: 0,
            filled: 0,
        }
    }
}

impl<T> Loaded<T> {
    pub fn merge(&mut self, other: Loaded<T>) {
        self.records.extend(other.records);
        self.skipped += other.skipped;
        self.filled += other.filled;
    }
}

fn read_delimited(path: &Path, delimiter: u8) -> Result<Table> {
    let file = File::open(path)?;
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(file);

    let headers = reader.byte_headers()?.iter().map(decode_field).collect();
    let mut rows = Vec::new();
    for record in reader.byte_records() {
        match record {
            Ok(record) => rows.push(record.iter().map(decode_field).collect()),
            Err(e) => warn!("{}: skipping malformed line: {}", path.display(), e),
        }
    }
    Ok(Table { headers, rows })
}

fn read_txt(path: &Path) -> Result<Table> {
    let tabbed = read_delimited(path, b'\t')?;
    if tabbed.headers.len() > 1 {
        return Ok(tabbed);
    }

    debug!("{}: tab separator failed, splitting on whitespace", path.display());
    let bytes = std::fs::read(path)?;
    let text = decode_field(&bytes);
    let mut lines = text
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.chars().all(|c| c == '-' || c.is_whitespace()));

    let headers: Vec<String> = match lines.next() {
        Some(header) => header.split_whitespace().map(str::to_string).collect(),
        None => return Ok(Table::default()),
    };

    let mut rows = Vec::new();
    let mut bad = 0usize;
    for line in lines {
        let cells: Vec<String> = line.split_whitespace().map(str::to_string).collect();
        if cells.len() == headers.len() {
            rows.push(cells);
        } else {
            bad += 1;
        }
    }
    if bad > 0 {
        warn!("{}: skipped {} lines with a wrong field count", path.display(), bad);
    }
    Ok(Table { headers, rows })
}

fn read_excel(path: &Path) -> Result<Table> {
    let mut workbook = open_workbook_auto(path)?;
    let range = workbook
        .worksheet_range_at(0)
        .ok_or_else(|| ForecastError::Excel(format!("{} has no worksheet", path.display())))??;

    let mut rows = range
        .rows()
        .map(|row| row.iter().map(excel_cell).collect::<Vec<String>>())
        .filter(|row| row.iter().any(|c| !c.trim().is_empty()));

    let headers = rows.next().unwrap_or_default();
    Ok(Table {
        headers,
        rows: rows.collect(),
    })
}

fn excel_cell(cell: &Data) -> String {
    match cell {
        Data::String(s) => s.clone(),
        Data::Float(f) => f.to_string(),
        Data::Int(i) => i.to_string(),
        Data::Bool(b) => b.to_string(),
        Data::DateTime(dt) => excel_serial_to_date(dt.as_f64())
            .map(|d| d.format("%Y-%m-%d").to_string())
            .unwrap_or_default(),
        Data::DateTimeIso(s) => s.clone(),
        _ => String::new(),
    }
}

/// Excel serial day numbers count from 1899-12-30
pub fn excel_serial_to_date(serial: f64) -> Option<NaiveDate> {
    if !serial.is_finite() || serial < 1.0 {
        return None;
    }
    NaiveDate::from_ymd_opt(1899, 12, 30)?.checked_add_signed(Duration::days(serial.floor() as i64))
}

/// Parse quotation rows; rows without date, symbol or close are skipped
pub fn parse_price_bars(table: &Table) -> Result<Loaded<PriceBar>> {
    let map = ColumnMap::resolve(&table.headers, QUOTE_ALIASES);
    map.require(&[col::DATE, col::SYMBOL, col::CLOSE])?;

    let mut loaded = Loaded::default();
    for row in &table.rows {
        let (date, symbol, close) = match (
            map.date(row, col::DATE),
            map.cell(row, col::SYMBOL),
            map.number(row, col::CLOSE),
        ) {
            (Some(d), Some(s), Some(c)) => (d, normalize_symbol(s), c),
            _ => {
                loaded.skipped += 1;
                continue;
            }
        };

        let mut fill = |column: &str, default: f64| match map.number(row, column) {
            Some(v) => v,
            None => {
                loaded.filled += 1;
                default
            }
        };
        let open = fill(col::OPEN, close);
        let high = fill(col::HIGH, close);
        let low = fill(col::LOW, close);
        let volume = fill(col::VOLUME, 0.0);

        loaded.records.push(PriceBar {
            date,
            symbol,
            open,
            high,
            low,
            close,
            volume,
            transactions: map.number(row, col::TRANSACTIONS),
            turnover: map.number(row, col::TURNOVER),
        });
    }
    Ok(loaded)
}

/// Parse index rows, optionally keeping a single index code
pub fn parse_index_bars(table: &Table, code: Option<&str>) -> Result<Loaded<IndexBar>> {
    let map = ColumnMap::resolve(&table.headers, QUOTE_ALIASES);
    map.require(&[col::DATE, col::VALUE])?;

    let mut loaded = Loaded::default();
    for row in &table.rows {
        let row_code = map
            .cell(row, col::INDEX_CODE)
            .or_else(|| map.cell(row, col::INDEX_NAME))
            .unwrap_or_default()
            .to_string();
        if let Some(wanted) = code {
            if !row_code.is_empty() && !row_code.eq_ignore_ascii_case(wanted) {
                continue;
            }
        }
        match (map.date(row, col::DATE), map.number(row, col::VALUE)) {
            (Some(date), Some(value)) if value > 0.0 => loaded.records.push(IndexBar {
                date,
                code: row_code,
                value,
            }),
            _ => loaded.skipped += 1,
        }
    }
    Ok(loaded)
}

/// Parse dividend rows; rows missing symbol, ex-date or amount are skipped
pub fn parse_dividends(table: &Table) -> Result<Loaded<DividendEvent>> {
    let map = ColumnMap::resolve(&table.headers, DIVIDEND_ALIASES);
    map.require(&[col::SYMBOL, col::EX_DATE, col::DIVIDEND])?;

    let mut loaded = Loaded::default();
    for row in &table.rows {
        match (
            map.cell(row, col::SYMBOL),
            map.date(row, col::EX_DATE),
            map.number(row, col::DIVIDEND),
        ) {
            (Some(symbol), Some(ex_date), Some(amount)) => loaded.records.push(DividendEvent {
                symbol: normalize_symbol(symbol),
                ex_date,
                amount,
            }),
            _ => loaded.skipped += 1,
        }
    }
    Ok(loaded)
}

pub fn load_price_bars(path: &Path) -> Result<Loaded<PriceBar>> {
    info!("Loading price file: {}", path.display());
    let loaded = parse_price_bars(&Table::read(path)?)?;
    info!(
        "Loaded {} bars from {} ({} skipped)",
        loaded.records.len(),
        path.display(),
        loaded.skipped
    );
    Ok(loaded)
}

pub fn load_index_bars(path: &Path, code: Option<&str>) -> Result<Loaded<IndexBar>> {
    info!("Loading index file: {}", path.display());
    parse_index_bars(&Table::read(path)?, code)
}

pub fn load_dividends(path: &Path) -> Result<Loaded<DividendEvent>> {
    info!("Loading dividend file: {}", path.display());
    let loaded = parse_dividends(&Table::read(path)?)?;
    info!("Loaded {} dividends from {}", loaded.records.len(), path.display());
    Ok(loaded)
}
