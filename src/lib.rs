//! BVMT Stock Forecaster
//!
//! Multi-horizon (1-5 trading days) quantile forecasts of closing price and
//! volume for stocks listed on the Bourse des Valeurs Mobilières de Tunis.
//!
//! ## Architecture
//!
//! ```text
//! Raw CSV/TXT/Excel → Data (load, validate, dividend-adjust) → Features (Parquet)
//!                                                                  ↓
//!                      Validation (walk-forward, backtest) ← Models (quantile GBM)
//!                                                                  ↓
//!                                            Service (PredictionService) → API
//! ```

pub mod api;
pub mod calendar;
pub mod config;
pub mod data;
pub mod error;
pub mod features;
pub mod models;
pub mod service;
pub mod types;
pub mod validation;

#[cfg(test)]
mod config_tests;
#[cfg(test)]
pub(crate) mod test_support;
