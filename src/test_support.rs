//! Synthetic market data shared by unit tests

use std::sync::{Arc, OnceLock};

use chrono::NaiveDate;

use crate::calendar::TradingCalendar;
use crate::config::{BoostingConfig, FeatureConfig, ModelConfig};
use crate::features::{FeatureFrame, FeaturePipeline, FeatureRow};
use crate::models::ModelTrainer;
use crate::service::PredictionService;
use crate::types::AdjustedBar;

/// Linear congruential generator yielding values in [0, 1)
pub struct Lcg(u64);

impl Lcg {
    pub fn new(seed: u64) -> Self {
        Self(seed.wrapping_add(0x9E37_79B9_7F4A_7C15))
    }

    pub fn uniform(&mut self) -> f64 {
        self.0 = self.0.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
        ((self.0 >> 33) as f64) / (1u64 << 31) as f64
    }

    /// Roughly unit-variance noise
    pub fn noise(&mut self) -> f64 {
        (self.uniform() - 0.5) * 3.46
    }
}

pub fn trading_dates(start: NaiveDate, n: usize) -> Vec<NaiveDate> {
    let cal = TradingCalendar::new();
    let mut day = start;
    while !cal.is_trading_day(day) {
        day = cal.next_trading_day(day);
    }
    let mut out = Vec::with_capacity(n);
    for _ in 0..n {
        out.push(day);
        day = cal.next_trading_day(day);
    }
    out
}

/// Daily volatility alternating between calm and wild blocks of 40 days
pub fn regime_volatility(t: usize) -> f64 {
    if (t / 40) % 2 == 0 {
        0.002
    } else {
        0.03
    }
}

/// Frame with columns `volatility`, `momentum`, `noise` whose return
/// dispersion follows `volatility`
pub fn synthetic_frame(symbols: &[&str], days: usize) -> FeatureFrame {
    let dates = trading_dates(NaiveDate::from_ymd_opt(2020, 1, 2).unwrap(), days);
    let mut rows = Vec::new();
    for (s, symbol) in symbols.iter().enumerate() {
        let mut rng = Lcg::new(s as u64 + 1);
        let mut close = 10.0 + 5.0 * s as f64;
        let mut last_return = 0.0;
        for (t, date) in dates.iter().enumerate() {
            let vol = regime_volatility(t);
            if t > 0 {
                last_return = rng.noise() * vol;
                close *= last_return.exp();
            }
            let volume = 1000.0 * (1.0 + rng.uniform()) * if vol > 0.01 { 5.0 } else { 1.0 };
            rows.push(FeatureRow {
                symbol: symbol.to_string(),
                date: *date,
                close,
                raw_close: close,
                volume,
                values: vec![regime_volatility(t + 1), last_return, rng.uniform()],
            });
        }
    }
    FeatureFrame::new(
        vec!["volatility".to_string(), "momentum".to_string(), "noise".to_string()],
        rows,
    )
}

pub fn fast_boosting() -> BoostingConfig {
    BoostingConfig {
        n_estimators: 40,
        learning_rate: 0.1,
        max_depth: 3,
        min_samples_leaf: 10,
        subsample: 1.0,
        colsample: 1.0,
        lambda: 1.0,
        gamma: 0.0,
        max_bins: 32,
        seed: 1,
    }
}

pub fn fast_models(horizons: Vec<usize>) -> ModelConfig {
    ModelConfig {
        horizons,
        price: fast_boosting(),
        volume: fast_boosting(),
        ..ModelConfig::default()
    }
}

/// Random-walk bars whose daily volatility is `vol_of(t)`
pub fn random_walk<F: Fn(usize) -> f64>(symbol: &str, n: usize, base: f64, seed: u64, vol_of: F) -> Vec<AdjustedBar> {
    let dates = trading_dates(NaiveDate::from_ymd_opt(2021, 1, 4).unwrap(), n);
    let mut rng = Lcg::new(seed);
    let mut close = base;
    dates
        .into_iter()
        .enumerate()
        .map(|(t, date)| {
            let vol = vol_of(t);
            close *= (rng.noise() * vol).exp();
            let volume = (2000.0 * (0.5 + rng.uniform())).round();
            AdjustedBar {
                date,
                symbol: symbol.to_string(),
                open: close * (1.0 + rng.noise() * vol * 0.3),
                high: close * (1.0 + vol),
                low: close * (1.0 - vol),
                close,
                raw_close: close,
                volume,
                transactions: Some((volume / 20.0).max(1.0)),
                turnover: Some(volume * close),
                adj_factor: 1.0,
            }
        })
        .collect()
}

/// Daily volatility of the `MIXED` symbol, alternating in 30-day blocks
fn mixed_volatility(t: usize) -> f64 {
    if (t / 30) % 2 == 0 {
        0.003
    } else {
        0.03
    }
}

/// Bars for `CALM`, `WILD` and `MIXED`, sorted by (symbol, date)
pub fn market_bars(n: usize) -> Vec<AdjustedBar> {
    let mut bars = random_walk("CALM", n, 10.0, 11, |_| 0.003);
    bars.extend(random_walk("MIXED", n, 25.0, 13, mixed_volatility));
    bars.extend(random_walk("WILD", n, 40.0, 17, |_| 0.03));
    bars
}

/// Service trained once on `market_bars(300)` for horizons 1..=3
pub fn trained_service() -> Arc<PredictionService> {
    static SERVICE: OnceLock<Arc<PredictionService>> = OnceLock::new();
    SERVICE
        .get_or_init(|| {
            let frame = FeaturePipeline::new(&FeatureConfig::default())
                .transform(&market_bars(300), &[])
                .unwrap();
            let models = ModelTrainer::new(fast_models(vec![1, 2, 3])).train(&frame).unwrap();
            Arc::new(PredictionService::new(30).with_models(models).with_features(frame))
        })
        .clone()
}
