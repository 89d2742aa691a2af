//! Error types for the forecaster

use thiserror::Error;

/// Crate-wide result alias
pub type Result<T> = std::result::Result<T, ForecastError>;

#[derive(Error, Debug)]
pub enum ForecastError {
    /// Malformed or inconsistent input rows
    #[error("Data error: {0}")]
    Data(String),

    /// Out-of-range request parameters
    #[error("Validation error: {0}")]
    Validation(String),

    /// Unknown symbol or model
    #[error("Not found: {0}")]
    NotFound(String),

    /// Models or data not loaded yet
    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("Model error: {0}")]
    Model(String),

    #[error("Insufficient data: need at least {required} rows, got {actual}")]
    InsufficientData { required: usize, actual: usize },

    #[error("Config error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Excel error: {0}")]
    Excel(String),

    #[error("Parquet error: {0}")]
    Parquet(#[from] parquet::errors::ParquetError),

    #[error("Arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<config::ConfigError> for ForecastError {
    fn from(err: config::ConfigError) -> Self {
        ForecastError::Config(err.to_string())
    }
}

impl From<calamine::Error> for ForecastError {
    fn from(err: calamine::Error) -> Self {
        ForecastError::Excel(err.to_string())
    }
}

impl ForecastError {
    /// Short machine-readable kind used in API error bodies
    pub fn kind(&self) -> &'static str {
        match self {
            ForecastError::Data(_) => "data_error",
            ForecastError::Validation(_) => "validation_error",
            ForecastError::NotFound(_) => "not_found",
            ForecastError::ServiceUnavailable(_) => "service_unavailable",
            ForecastError::Model(_) => "model_error",
            ForecastError::InsufficientData { .. } => "insufficient_data",
            ForecastError::Config(_) => "config_error",
            ForecastError::Internal(_) => "internal_error",
            ForecastError::Io(_) => "io_error",
            ForecastError::Csv(_) => "csv_error",
            ForecastError::Excel(_) => "excel_error",
            ForecastError::Parquet(_) | ForecastError::Arrow(_) => "parquet_error",
            ForecastError::Json(_) => "json_error",
        }
    }

    /// Whether the error comes from the caller's input rather than the server
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            ForecastError::Validation(_) | ForecastError::NotFound(_)
        )
    }
}
