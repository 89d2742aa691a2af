//! Parquet persistence of the feature matrix
//!
//! Layout: `symbol` (utf8), `date` (date32), `close`, `raw_close`, `volume`,
//! then one float64 column per feature in frame order. The feature names
//! are also written to a sibling `<stem>.features.json`.

use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use arrow::array::{Array, ArrayRef, Date32Array, Float64Array, StringArray};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use chrono::NaiveDate;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use parquet::arrow::ArrowWriter;
use tracing::info;

use super::{FeatureFrame, FeatureRow};
use crate::error::{ForecastError, Result};

const META_COLUMNS: [&str; 5] = ["symbol", "date", "close", "raw_close", "volume"];

fn epoch() -> NaiveDate {
    NaiveDate::from_ymd_opt(1970, 1, 1).unwrap_or_default()
}

pub fn save_parquet(frame: &FeatureFrame, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let mut fields = vec![
        Field::new("symbol", DataType::Utf8, false),
        Field::new("date", DataType::Date32, false),
        Field::new("close", DataType::Float64, false),
        Field::new("raw_close", DataType::Float64, false),
        Field::new("volume", DataType::Float64, false),
    ];
    fields.extend(frame.names.iter().map(|n| Field::new(n, DataType::Float64, true)));
    let schema = Arc::new(Schema::new(fields));

    let epoch = epoch();
    let mut columns: Vec<ArrayRef> = vec![
        Arc::new(StringArray::from_iter_values(frame.rows.iter().map(|r| r.symbol.as_str()))),
        Arc::new(Date32Array::from_iter_values(
            frame.rows.iter().map(|r| (r.date - epoch).num_days() as i32),
        )),
        Arc::new(Float64Array::from_iter_values(frame.rows.iter().map(|r| r.close))),
        Arc::new(Float64Array::from_iter_values(frame.rows.iter().map(|r| r.raw_close))),
        Arc::new(Float64Array::from_iter_values(frame.rows.iter().map(|r| r.volume))),
    ];
    for col in 0..frame.names.len() {
        columns.push(Arc::new(Float64Array::from_iter_values(
            frame.rows.iter().map(|r| r.values[col]),
        )));
    }

    let batch = RecordBatch::try_new(schema.clone(), columns)?;
    let file = File::create(path)?;
    let mut writer = ArrowWriter::try_new(file, schema, None)?;
    writer.write(&batch)?;
    writer.close()?;
    std::fs::write(feature_list_path(path), serde_json::to_string_pretty(&frame.names)?)?;

    info!("Saved {} feature rows to {}", frame.len(), path.display());
    Ok(())
}

/// Sibling JSON file listing the feature columns of a Parquet file
pub fn feature_list_path(path: &Path) -> PathBuf {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "features".to_string());
    path.with_file_name(format!("{}.features.json", stem))
}

fn float_column<'a>(batch: &'a RecordBatch, idx: usize) -> Result<&'a Float64Array> {
    batch
        .column(idx)
        .as_any()
        .downcast_ref::<Float64Array>()
        .ok_or_else(|| ForecastError::Data(format!("column {} is not float64", idx)))
}

pub fn load_parquet(path: &Path) -> Result<FeatureFrame> {
    let file = File::open(path).map_err(|e| {
        ForecastError::Data(format!("cannot open feature file {}: {}", path.display(), e))
    })?;
    let reader = ParquetRecordBatchReaderBuilder::try_new(file)?.build()?;

    let mut names: Option<Vec<String>> = None;
    let mut rows = Vec::new();
    let epoch = epoch();

    for batch in reader {
        let batch = batch?;
        let schema = batch.schema();
        if schema.fields().len() < META_COLUMNS.len() {
            return Err(ForecastError::Data(format!(
                "feature file {} has {} columns, expected at least {}",
                path.display(),
                schema.fields().len(),
                META_COLUMNS.len()
            )));
        }
        for (i, expected) in META_COLUMNS.iter().enumerate() {
            if schema.field(i).name() != expected {
                return Err(ForecastError::Data(format!(
                    "unexpected column {} at position {}",
                    schema.field(i).name(),
                    i
                )));
            }
        }
        let batch_names: Vec<String> = schema.fields()[META_COLUMNS.len()..]
            .iter()
            .map(|f| f.name().clone())
            .collect();
        let names = names.get_or_insert_with(|| batch_names.clone());
        if *names != batch_names {
            return Err(ForecastError::Data("feature columns differ between batches".into()));
        }

        let symbols = batch
            .column(0)
            .as_any()
            .downcast_ref::<StringArray>()
            .ok_or_else(|| ForecastError::Data("symbol column is not utf8".into()))?;
        let dates = batch
            .column(1)
            .as_any()
            .downcast_ref::<Date32Array>()
            .ok_or_else(|| ForecastError::Data("date column is not date32".into()))?;
        let closes = float_column(&batch, 2)?;
        let raw_closes = float_column(&batch, 3)?;
        let volumes = float_column(&batch, 4)?;
        let features: Vec<&Float64Array> = (META_COLUMNS.len()..batch.num_columns())
            .map(|i| float_column(&batch, i))
            .collect::<Result<_>>()?;

        for r in 0..batch.num_rows() {
            rows.push(FeatureRow {
                symbol: symbols.value(r).to_string(),
                date: epoch + chrono::Duration::days(dates.value(r) as i64),
                close: closes.value(r),
                raw_close: raw_closes.value(r),
                volume: volumes.value(r),
                values: features
                    .iter()
                    .map(|c| if c.is_null(r) { f64::NAN } else { c.value(r) })
                    .collect(),
            });
        }
    }

    let frame = FeatureFrame::new(names.unwrap_or_default(), rows);
    info!("Loaded {} feature rows from {}", frame.len(), path.display());
    Ok(frame)
}
