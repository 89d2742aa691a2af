//! Price-derived technical features
//!
//! Level-type indicators are expressed relative to the close so that one
//! model can be pooled across symbols trading at different prices.

use super::indicators::{
    bollinger, ema, lag, log_change, macd, pct_change, quantile, rolling_std, rsi, sma,
};
use super::{FeatureContext, FeatureTransformer};
use crate::config::FeatureConfig;
use crate::types::AdjustedBar;

pub struct PriceFeatures {
    config: FeatureConfig,
}

impl PriceFeatures {
    pub fn new(config: FeatureConfig) -> Self {
        Self { config }
    }
}

fn ratio(num: &[f64], den: &[f64]) -> Vec<f64> {
    num.iter()
        .zip(den)
        .map(|(n, d)| if *d != 0.0 { n / d - 1.0 } else { f64::NAN })
        .collect()
}

fn relative(values: &[f64], closes: &[f64]) -> Vec<f64> {
    values
        .iter()
        .zip(closes)
        .map(|(v, c)| if *c > 0.0 { v / c } else { f64::NAN })
        .collect()
}

/// Regime code per bar: 0 below the trailing 33rd percentile, 2 above the
/// 67th, 1 otherwise. Percentiles use the trailing `window` values up to and
/// including the bar.
pub fn volatility_regime(volatility: &[f64], window: usize, min_periods: usize) -> Vec<f64> {
    let mut out = vec![f64::NAN; volatility.len()];
    for i in 0..volatility.len() {
        if !volatility[i].is_finite() {
            continue;
        }
        let start = (i + 1).saturating_sub(window);
        let history: Vec<f64> = volatility[start..=i]
            .iter()
            .copied()
            .filter(|v| v.is_finite())
            .collect();
        if history.len() < min_periods {
            continue;
        }
        let p33 = quantile(&history, 0.33);
        let p67 = quantile(&history, 0.67);
        out[i] = if p33 < p67 && volatility[i] < p33 {
            0.0
        } else if p33 < p67 && volatility[i] > p67 {
            2.0
        } else {
            1.0
        };
    }
    out
}

impl FeatureTransformer for PriceFeatures {
    fn name(&self) -> &'static str {
        "price"
    }

    fn columns(&self) -> Vec<String> {
        let c = &self.config;
        let mut cols = vec!["log_return".to_string(), "return".to_string()];
        cols.extend(c.sma_periods.iter().map(|p| format!("close_sma_{}", p)));
        cols.extend(c.ema_spans.iter().map(|s| format!("close_ema_{}", s)));
        cols.push(format!("rsi_{}", c.rsi_period));
        cols.extend(["macd", "macd_signal", "macd_hist"].map(String::from));
        cols.extend(["bb_width", "bb_pct_b"].map(String::from));
        cols.extend(c.momentum_periods.iter().map(|p| format!("momentum_{}", p)));
        cols.extend(c.momentum_periods.iter().map(|p| format!("log_return_lag_{}", p)));
        cols.push(format!("volatility_{}", c.volatility_window));
        cols.push(format!("zscore_{}", c.zscore_window));
        cols.extend(
            ["vol_regime", "vol_regime_low", "vol_regime_normal", "vol_regime_high"]
                .map(String::from),
        );
        cols
    }

    fn transform(&self, bars: &[AdjustedBar], _ctx: &FeatureContext) -> Vec<Vec<f64>> {
        let c = &self.config;
        let closes: Vec<f64> = bars.iter().map(|b| b.close).collect();
        let log_returns = log_change(&closes, 1);

        let mut out = vec![log_returns.clone(), pct_change(&closes, 1)];

        for &p in &c.sma_periods {
            out.push(ratio(&closes, &sma(&closes, p)));
        }
        for &s in &c.ema_spans {
            out.push(ratio(&closes, &ema(&closes, s)));
        }

        out.push(rsi(&closes, c.rsi_period));

        let (line, signal, hist) = macd(&closes, c.macd_fast, c.macd_slow, c.macd_signal);
        out.push(relative(&line, &closes));
        out.push(relative(&signal, &closes));
        out.push(relative(&hist, &closes));

        let (middle, upper, lower) = bollinger(&closes, c.bollinger_period, c.bollinger_std);
        out.push(
            (0..closes.len())
                .map(|i| {
                    if middle[i] != 0.0 {
                        (upper[i] - lower[i]) / middle[i]
                    } else {
                        f64::NAN
                    }
                })
                .collect(),
        );
        out.push(
            (0..closes.len())
                .map(|i| {
                    let band = upper[i] - lower[i];
                    if band > 0.0 {
                        (closes[i] - lower[i]) / band
                    } else {
                        f64::NAN
                    }
                })
                .collect(),
        );

        for &p in &c.momentum_periods {
            out.push(pct_change(&closes, p));
        }
        for &p in &c.momentum_periods {
            out.push(lag(&log_returns, p));
        }

        let volatility = rolling_std(&log_returns, c.volatility_window);
        out.push(volatility.clone());

        let mean = sma(&closes, c.zscore_window);
        let std = rolling_std(&closes, c.zscore_window);
        out.push(
            (0..closes.len())
                .map(|i| {
                    if std[i] > 0.0 {
                        (closes[i] - mean[i]) / std[i]
                    } else if std[i] == 0.0 {
                        0.0
                    } else {
                        f64::NAN
                    }
                })
                .collect(),
        );

        let regime = volatility_regime(&volatility, c.regime_window, c.volatility_window);
        out.push(regime.clone());
        for code in [0.0, 1.0, 2.0] {
            out.push(
                regime
                    .iter()
                    .map(|r| if r.is_nan() { f64::NAN } else if *r == code { 1.0 } else { 0.0 })
                    .collect(),
            );
        }

        out
    }

    fn warmup(&self) -> usize {
        let c = &self.config;
        let max_sma = c.sma_periods.iter().copied().max().unwrap_or(1);
        let max_momentum = c.momentum_periods.iter().copied().max().unwrap_or(0);
        [
            max_sma.saturating_sub(1),
            c.bollinger_period.saturating_sub(1),
            c.zscore_window.saturating_sub(1),
            c.rsi_period,
            max_momentum + 1,
            // regime needs a full window of volatility values
            (2 * c.volatility_window).saturating_sub(1),
        ]
        .into_iter()
        .max()
        .unwrap_or(0)
    }
}
