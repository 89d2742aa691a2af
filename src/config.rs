//! Configuration
//!
//! Layered sources: struct defaults, an optional TOML file, then `BVMT__`
//! prefixed environment variables (`BVMT__API__PORT=9000`).

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::Result;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub data: DataConfig,
    pub features: FeatureConfig,
    pub models: ModelConfig,
    pub validation: ValidationConfig,
    pub api: ApiConfig,
    pub logging: LoggingConfig,
}

impl Config {
    /// Load config from file (if present) and environment
    pub fn load(path: &str) -> Result<Self> {
        dotenvy::dotenv().ok();

        let settings = config::Config::builder()
            .add_source(config::File::with_name(path).required(false))
            .add_source(
                config::Environment::with_prefix("BVMT")
                    .prefix_separator("__")
                    .separator("__"),
            )
            .build()?;

        let config: Config = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings that would make training or serving meaningless
    pub fn validate(&self) -> Result<()> {
        use crate::error::ForecastError;

        if self.models.horizons.is_empty()
            || self
                .models
                .horizons
                .iter()
                .any(|h| *h == 0 || *h > crate::types::MAX_HORIZON)
        {
            return Err(ForecastError::Config(format!(
                "horizons must be within 1..={}",
                crate::types::MAX_HORIZON
            )));
        }
        for q in &self.models.quantiles {
            if !(*q > 0.0 && *q < 1.0) {
                return Err(ForecastError::Config(format!(
                    "quantile {} outside (0, 1)",
                    q
                )));
            }
        }
        for required in [0.1, 0.5, 0.9] {
            if !self
                .models
                .quantiles
                .iter()
                .any(|q| (q - required).abs() < 1e-9)
            {
                return Err(ForecastError::Config(format!(
                    "quantile {} is required for the median and 80% interval",
                    required
                )));
            }
        }
        if self.validation.step_size == 0 {
            return Err(ForecastError::Config("validation.step_size must be > 0".into()));
        }
        Ok(())
    }
}

/// Expand `~` and environment variables in a configured path
pub fn expand_path(path: &str) -> PathBuf {
    match shellexpand::full(path) {
        Ok(expanded) => PathBuf::from(expanded.into_owned()),
        Err(_) => PathBuf::from(path),
    }
}

/// Input files and ingestion thresholds
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DataConfig {
    /// Directory holding raw exchange exports
    pub raw_dir: String,
    /// Output directory for adjusted data, features and reports
    pub processed_dir: String,
    /// Price files, relative to `raw_dir` unless absolute
    pub price_files: Vec<String>,
    /// Dividend files (Excel or CSV)
    pub dividend_files: Vec<String>,
    /// Optional index file for market features
    pub index_file: Option<String>,
    /// Index code used as the market benchmark
    pub market_index: String,
    /// Day-over-day ratio (`|pct change| + 1`) flagged as an outlier
    pub outlier_threshold: f64,
    /// Calendar gap in days reported as missing data
    pub max_gap_days: i64,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            raw_dir: "data/raw".to_string(),
            processed_dir: "data/processed".to_string(),
            price_files: Vec::new(),
            dividend_files: Vec::new(),
            index_file: None,
            market_index: "TUNINDEX".to_string(),
            outlier_threshold: 10.0,
            max_gap_days: 7,
        }
    }
}

impl DataConfig {
    pub fn resolve(&self, file: &str) -> PathBuf {
        let path = expand_path(file);
        if path.is_absolute() {
            path
        } else {
            expand_path(&self.raw_dir).join(path)
        }
    }

    pub fn processed_path(&self, name: &str) -> PathBuf {
        expand_path(&self.processed_dir).join(name)
    }
}

/// Indicator windows
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FeatureConfig {
    pub sma_periods: Vec<usize>,
    pub ema_spans: Vec<usize>,
    pub rsi_period: usize,
    pub macd_fast: usize,
    pub macd_slow: usize,
    pub macd_signal: usize,
    pub bollinger_period: usize,
    pub bollinger_std: f64,
    pub momentum_periods: Vec<usize>,
    pub volatility_window: usize,
    pub zscore_window: usize,
    pub volume_ma_window: usize,
    pub volume_momentum_periods: Vec<usize>,
    /// Trailing bars used for per-symbol Q20/Q80 volume thresholds
    pub liquidity_window: usize,
    pub liquidity_min_periods: usize,
    /// Trailing bars used for volatility regime percentiles
    pub regime_window: usize,
    pub beta_window: usize,
    /// Parquet file name under the processed directory
    pub output_file: String,
}

impl Default for FeatureConfig {
    fn default() -> Self {
        Self {
            sma_periods: vec![5, 10, 20, 50],
            ema_spans: vec![12, 26],
            rsi_period: 14,
            macd_fast: 12,
            macd_slow: 26,
            macd_signal: 9,
            bollinger_period: 20,
            bollinger_std: 2.0,
            momentum_periods: vec![1, 5, 10, 20],
            volatility_window: 20,
            zscore_window: 20,
            volume_ma_window: 20,
            volume_momentum_periods: vec![1, 5, 10],
            liquidity_window: 252,
            liquidity_min_periods: 20,
            regime_window: 252,
            beta_window: 60,
            output_file: "features.parquet".to_string(),
        }
    }
}

/// Gradient boosting hyperparameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BoostingConfig {
    pub n_estimators: usize,
    pub learning_rate: f64,
    pub max_depth: usize,
    /// Minimum rows in a leaf
    pub min_samples_leaf: usize,
    /// Row sampling fraction per tree
    pub subsample: f64,
    /// Feature sampling fraction per tree
    pub colsample: f64,
    /// L2 regularisation on leaf values
    pub lambda: f64,
    /// Minimum gain required to split
    pub gamma: f64,
    /// Candidate thresholds per feature
    pub max_bins: usize,
    pub seed: u64,
}

impl Default for BoostingConfig {
    fn default() -> Self {
        Self {
            n_estimators: 500,
            learning_rate: 0.05,
            max_depth: 6,
            min_samples_leaf: 3,
            subsample: 0.8,
            colsample: 0.8,
            lambda: 1.0,
            gamma: 0.1,
            max_bins: 64,
            seed: 42,
        }
    }
}

impl BoostingConfig {
    /// Defaults for the volume regressors
    pub fn volume_defaults() -> Self {
        Self {
            n_estimators: 300,
            max_depth: 5,
            min_samples_leaf: 5,
            gamma: 0.0,
            ..Self::default()
        }
    }
}

/// Training setup
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    pub models_dir: String,
    pub horizons: Vec<usize>,
    pub quantiles: Vec<f64>,
    /// Fraction of trailing dates held out by `train`
    pub test_size: f64,
    pub price: BoostingConfig,
    pub volume: BoostingConfig,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            models_dir: "models".to_string(),
            horizons: vec![1, 2, 3, 4, 5],
            quantiles: vec![0.025, 0.1, 0.5, 0.9, 0.975],
            test_size: 0.2,
            price: BoostingConfig::default(),
            volume: BoostingConfig::volume_defaults(),
        }
    }
}

impl ModelConfig {
    pub fn models_path(&self) -> PathBuf {
        expand_path(&self.models_dir)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WindowMode {
    Expanding,
    Rolling,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BacktestStrategy {
    LongOnly,
    LongShort,
}

/// Walk-forward settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationConfig {
    /// Trading dates in the first training window (~5 years)
    pub initial_train_size: usize,
    /// Trading dates each fold advances by, also the test window length
    pub step_size: usize,
    pub max_splits: Option<usize>,
    pub window: WindowMode,
    /// Rows required in a fold's train set
    pub min_train_samples: usize,
    /// Rows required in a fold's test set
    pub min_test_samples: usize,
    pub strategy: BacktestStrategy,
    pub transaction_cost: f64,
    /// Boosting rounds per fold, smaller than full training
    pub fold_estimators: Option<usize>,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            initial_train_size: 1260,
            step_size: 5,
            max_splits: None,
            window: WindowMode::Expanding,
            min_train_samples: 200,
            min_test_samples: 5,
            strategy: BacktestStrategy::LongOnly,
            transaction_cost: 0.001,
            fold_estimators: Some(100),
        }
    }
}

/// HTTP server
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub host: String,
    pub port: u16,
    /// History bars returned by the visualization endpoint
    pub history_days: usize,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            history_days: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter when `RUST_LOG` is unset
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}
