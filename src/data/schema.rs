//! Column alias tables and cell parsing
//!
//! Exchange exports use French headers (`SEANCE`, `CLOTURE`, ...) while
//! later files and hand-made extracts use English ones. Headers are resolved
//! once per file through an explicit alias table.

use chrono::{NaiveDate, NaiveDateTime};
use std::collections::HashMap;

use crate::error::{ForecastError, Result};

/// Canonical column names
pub mod col {
    pub const DATE: &str = "date";
    pub const GROUP: &str = "group";
    pub const SYMBOL: &str = "symbol";
    pub const NAME: &str = "name";
    pub const OPEN: &str = "open";
    pub const HIGH: &str = "high";
    pub const LOW: &str = "low";
    pub const CLOSE: &str = "close";
    pub const VOLUME: &str = "volume";
    pub const TRANSACTIONS: &str = "transactions";
    pub const TURNOVER: &str = "turnover";
    pub const INDEX_CODE: &str = "index_code";
    pub const INDEX_NAME: &str = "index_name";
    pub const VALUE: &str = "value";
    pub const PREV_VALUE: &str = "prev_value";
    pub const CHANGE_PCT: &str = "change_pct";
    pub const COMPANY: &str = "company";
    pub const EX_DATE: &str = "ex_date";
    pub const DIVIDEND: &str = "dividend";
}

/// Quotation and index files; keys are trimmed upper-case headers
pub const QUOTE_ALIASES: &[(&str, &str)] = &[
    ("SEANCE", col::DATE),
    ("DATE", col::DATE),
    ("GROUPE", col::GROUP),
    ("CODE", col::SYMBOL),
    ("SYMBOL", col::SYMBOL),
    ("VALEUR", col::NAME),
    ("NAME", col::NAME),
    ("OUVERTURE", col::OPEN),
    ("OPEN", col::OPEN),
    ("CLOTURE", col::CLOSE),
    ("CLOSE", col::CLOSE),
    ("PLUS_BAS", col::LOW),
    ("LOW", col::LOW),
    ("PLUS_HAUT", col::HIGH),
    ("HIGH", col::HIGH),
    ("QUANTITE_NEGOCIEE", col::VOLUME),
    ("VOLUME", col::VOLUME),
    ("NB_TRANSACTION", col::TRANSACTIONS),
    ("NUM_TRADES", col::TRANSACTIONS),
    ("CAPITAUX", col::TURNOVER),
    ("TURNOVER", col::TURNOVER),
    ("CODE_INDICE", col::INDEX_CODE),
    ("LIB_INDICE", col::INDEX_NAME),
    ("INDICE_JOUR", col::VALUE),
    ("INDICE_VEILLE", col::PREV_VALUE),
    ("VARIATION_VEILLE", col::CHANGE_PCT),
    ("INDICE_PLUS_HAUT", col::HIGH),
    ("INDICE_PLUS_BAS", col::LOW),
    ("INDICE_OUV", col::OPEN),
];

/// Dividend files
pub const DIVIDEND_ALIASES: &[(&str, &str)] = &[
    ("CODE", col::SYMBOL),
    ("SYMBOLE", col::SYMBOL),
    ("SYMBOL", col::SYMBOL),
    ("VALEUR", col::SYMBOL),
    ("SOCIETE", col::COMPANY),
    ("SOCIÉTÉ", col::COMPANY),
    ("RAISON_SOCIALE", col::COMPANY),
    ("NOM", col::COMPANY),
    ("DATE_DETACHEMENT", col::EX_DATE),
    ("DATE DÉTACHEMENT", col::EX_DATE),
    ("DATE DETACHEMENT", col::EX_DATE),
    ("EX_DATE", col::EX_DATE),
    ("DATE", col::EX_DATE),
    ("DIVIDENDE", col::DIVIDEND),
    ("MONTANT", col::DIVIDEND),
    ("DIVIDEND", col::DIVIDEND),
];

/// Header positions resolved against an alias table
#[derive(Debug, Clone, Default)]
pub struct ColumnMap {
    positions: HashMap<&'static str, usize>,
}

impl ColumnMap {
    /// First matching header wins when two aliases resolve to the same column
    pub fn resolve<S: AsRef<str>>(headers: &[S], aliases: &[(&str, &'static str)]) -> Self {
        let mut positions = HashMap::new();
        for (idx, header) in headers.iter().enumerate() {
            let key = normalize_header(header.as_ref());
            if let Some((_, canonical)) = aliases.iter().find(|(alias, _)| *alias == key) {
                positions.entry(*canonical).or_insert(idx);
            }
        }
        Self { positions }
    }

    pub fn position(&self, column: &str) -> Option<usize> {
        self.positions.get(column).copied()
    }

    pub fn has(&self, column: &str) -> bool {
        self.positions.contains_key(column)
    }

    /// Fail with the missing canonical names
    pub fn require(&self, columns: &[&str]) -> Result<()> {
        let missing: Vec<&str> = columns.iter().copied().filter(|c| !self.has(c)).collect();
        if missing.is_empty() {
            Ok(())
        } else {
            Err(ForecastError::Data(format!(
                "missing required columns: {}",
                missing.join(", ")
            )))
        }
    }

    /// Raw cell for a canonical column, `None` when absent or blank
    pub fn cell<'a, S: AsRef<str>>(&self, row: &'a [S], column: &str) -> Option<&'a str> {
        let idx = self.position(column)?;
        let value = row.get(idx)?.as_ref().trim();
        if is_null(value) {
            None
        } else {
            Some(value)
        }
    }

    pub fn number<S: AsRef<str>>(&self, row: &[S], column: &str) -> Option<f64> {
        self.cell(row, column).and_then(parse_number)
    }

    pub fn date<S: AsRef<str>>(&self, row: &[S], column: &str) -> Option<NaiveDate> {
        self.cell(row, column).and_then(parse_date)
    }
}

/// Canonical ticker form shared by ingestion and requests
pub fn normalize_symbol(symbol: &str) -> String {
    symbol.trim().to_uppercase()
}

pub fn normalize_header(header: &str) -> String {
    header.trim().trim_start_matches('\u{feff}').to_uppercase()
}

fn is_null(value: &str) -> bool {
    matches!(value, "" | "NA" | "N/A" | "null" | "NULL" | "nan" | "NaN" | "-")
}

/// Day-first dates as published by the exchange, with ISO fallbacks
pub fn parse_date(value: &str) -> Option<NaiveDate> {
    let value = value.trim();
    // `%Y` accepts two digits, so short years must be routed explicitly
    let short_year = value.contains('/') && value.rsplit('/').next().is_some_and(|y| y.len() == 2);
    let formats: &[&str] = if short_year {
        &["%d/%m/%y"]
    } else {
        &["%d/%m/%Y", "%Y-%m-%d", "%d-%m-%Y", "%d.%m.%Y"]
    };
    for fmt in formats {
        if let Ok(date) = NaiveDate::parse_from_str(value, fmt) {
            return Some(date);
        }
    }
    for fmt in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%d/%m/%Y %H:%M:%S"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(value, fmt) {
            return Some(dt.date());
        }
    }
    None
}

/// Numbers with either decimal separator and optional space grouping
pub fn parse_number(value: &str) -> Option<f64> {
    let cleaned: String = value
        .trim()
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '\u{a0}' && *c != '\u{202f}')
        .collect();
    if cleaned.is_empty() || is_null(&cleaned) {
        return None;
    }
    let normalized = if cleaned.contains(',') && cleaned.contains('.') {
        cleaned.replace(',', "")
    } else {
        cleaned.replace(',', ".")
    };
    normalized.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Decode a raw field, falling back to Latin-1 for legacy exports
pub fn decode_field(bytes: &[u8]) -> String {
    match std::str::from_utf8(bytes) {
        Ok(s) => s.to_string(),
        Err(_) => bytes.iter().map(|&b| b as char).collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_french_headers_resolve() {
        let headers = vec![
            " SEANCE ", "GROUPE", "CODE", "VALEUR", "OUVERTURE", "CLOTURE", "PLUS_BAS",
            "PLUS_HAUT", "QUANTITE_NEGOCIEE", "NB_TRANSACTION", "CAPITAUX",
        ];
        let map = ColumnMap::resolve(&headers, QUOTE_ALIASES);
        assert_eq!(map.position(col::DATE), Some(0));
        assert_eq!(map.position(col::SYMBOL), Some(2));
        assert_eq!(map.position(col::CLOSE), Some(5));
        assert_eq!(map.position(col::VOLUME), Some(8));
        assert!(map.require(&[col::DATE, col::SYMBOL, col::CLOSE]).is_ok());
    }

    #[test]
    fn test_english_headers_resolve_case_insensitive() {
        let headers = vec!["date", "Symbol", "open", "high", "low", "Close", "volume"];
        let map = ColumnMap::resolve(&headers, QUOTE_ALIASES);
        assert_eq!(map.position(col::CLOSE), Some(5));
        assert!(!map.has(col::TURNOVER));
    }

    #[test]
    fn test_require_reports_missing() {
        let map = ColumnMap::resolve(&["SEANCE", "CODE"], QUOTE_ALIASES);
        let err = map.require(&[col::DATE, col::CLOSE]).unwrap_err();
        assert!(err.to_string().contains("close"));
    }

    #[test]
    fn test_dividend_headers_with_accents() {
        let headers = vec!["Code", "Société", "Date Détachement", "Montant"];
        let map = ColumnMap::resolve(&headers, DIVIDEND_ALIASES);
        assert_eq!(map.position(col::SYMBOL), Some(0));
        assert_eq!(map.position(col::COMPANY), Some(1));
        assert_eq!(map.position(col::EX_DATE), Some(2));
        assert_eq!(map.position(col::DIVIDEND), Some(3));
    }

    #[test]
    fn test_parse_date_formats() {
        let expected = NaiveDate::from_ymd_opt(2023, 6, 15).unwrap();
        assert_eq!(parse_date("15/06/2023"), Some(expected));
        assert_eq!(parse_date("15/06/23"), Some(expected));
        assert_eq!(parse_date("2023-06-15"), Some(expected));
        assert_eq!(parse_date("2023-06-15 00:00:00"), Some(expected));
        assert_eq!(parse_date("June 15"), None);
    }

    #[test]
    fn test_parse_number_locales() {
        assert_eq!(parse_number("12,345"), Some(12.345));
        assert_eq!(parse_number("12.345"), Some(12.345));
        assert_eq!(parse_number("1 234,5"), Some(1234.5));
        assert_eq!(parse_number("1,234.5"), Some(1234.5));
        assert_eq!(parse_number("N/A"), None);
        assert_eq!(parse_number(""), None);
    }

    #[test]
    fn test_cell_treats_blank_as_missing() {
        let map = ColumnMap::resolve(&["CODE", "CLOTURE"], QUOTE_ALIASES);
        let row = vec!["SFBT".to_string(), "  ".to_string()];
        assert_eq!(map.cell(&row, col::SYMBOL), Some("SFBT"));
        assert_eq!(map.number(&row, col::CLOSE), None);
    }

    #[test]
    fn test_decode_latin1_field() {
        let bytes = [b'S', b'O', b'C', b'I', 0xC9, b'T', 0xC9];
        assert_eq!(decode_field(&bytes), "SOCIÉTÉ");
    }
}
