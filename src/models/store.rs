//! JSON artifacts for a trained model set
//!
//! ```text
//! models/
//!   manifest.json
//!   liquidity.json
//!   price/horizon_{h}.json
//!   volume/horizon_{h}.json
//! ```

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{info, warn};

use super::{ForecastModels, LiquidityClassifier, ModelManifest, QuantileForecaster, VolumeForecaster};
use crate::error::{ForecastError, Result};

pub const MANIFEST_FILE: &str = "manifest.json";
pub const LIQUIDITY_FILE: &str = "liquidity.json";
pub const VALIDATION_FILE: &str = "validation.json";

pub fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let writer = BufWriter::new(File::create(path)?);
    serde_json::to_writer_pretty(writer, value)?;
    Ok(())
}

pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let reader = BufReader::new(File::open(path)?);
    Ok(serde_json::from_reader(reader)?)
}

fn horizon_file(dir: &Path, family: &str, horizon: usize) -> PathBuf {
    dir.join(family).join(format!("horizon_{}.json", horizon))
}

impl ForecastModels {
    pub fn save(&self, dir: &Path) -> Result<()> {
        for (h, model) in &self.price {
            write_json(&horizon_file(dir, "price", *h), model)?;
        }
        for (h, model) in &self.volume {
            write_json(&horizon_file(dir, "volume", *h), model)?;
        }
        write_json(&dir.join(LIQUIDITY_FILE), &self.liquidity)?;
        write_json(&dir.join(MANIFEST_FILE), &self.manifest)?;
        info!("Saved {} horizon models to {}", self.price.len(), dir.display());
        Ok(())
    }

    pub fn load(dir: &Path) -> Result<Self> {
        let manifest_path = dir.join(MANIFEST_FILE);
        if !manifest_path.exists() {
            return Err(ForecastError::NotFound(format!(
                "no trained models in {}",
                dir.display()
            )));
        }
        let manifest: ModelManifest = read_json(&manifest_path)?;

        let mut price = BTreeMap::new();
        let mut volume = BTreeMap::new();
        for &h in &manifest.horizons {
            let model: QuantileForecaster = read_json(&horizon_file(dir, "price", h))?;
            if model.feature_names != manifest.feature_names {
                return Err(ForecastError::Model(format!(
                    "{}-day model was trained on a different feature set",
                    h
                )));
            }
            price.insert(h, model);

            let volume_path = horizon_file(dir, "volume", h);
            if volume_path.exists() {
                let model: VolumeForecaster = read_json(&volume_path)?;
                volume.insert(h, model);
            } else {
                warn!("No volume model for horizon {}", h);
            }
        }
        let liquidity: LiquidityClassifier = read_json(&dir.join(LIQUIDITY_FILE))?;

        info!(
            "Loaded models for horizons {:?} trained at {}",
            manifest.horizons, manifest.trained_at
        );
        Ok(Self {
            manifest,
            price,
            volume,
            liquidity,
        })
    }
}
