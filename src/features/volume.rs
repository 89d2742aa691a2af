//! Volume and liquidity features

use super::indicators::{quantile, rolling, sma};
use super::{FeatureContext, FeatureTransformer};
use crate::config::FeatureConfig;
use crate::types::{AdjustedBar, LiquidityRegime};

pub struct VolumeFeatures {
    config: FeatureConfig,
}

impl VolumeFeatures {
    pub fn new(config: FeatureConfig) -> Self {
        Self { config }
    }
}

/// Per-bar (Q20, Q80) of the trailing `window` volumes, the bar included
pub fn trailing_thresholds(volumes: &[f64], window: usize, min_periods: usize) -> Vec<Option<(f64, f64)>> {
    (0..volumes.len())
        .map(|i| {
            let start = (i + 1).saturating_sub(window);
            let history: Vec<f64> = volumes[start..=i]
                .iter()
                .copied()
                .filter(|v| v.is_finite())
                .collect();
            if history.len() < min_periods.max(1) {
                None
            } else {
                Some((quantile(&history, 0.2), quantile(&history, 0.8)))
            }
        })
        .collect()
}

fn safe_div(num: f64, den: f64) -> f64 {
    if den != 0.0 && num.is_finite() && den.is_finite() {
        num / den
    } else {
        f64::NAN
    }
}

impl FeatureTransformer for VolumeFeatures {
    fn name(&self) -> &'static str {
        "volume"
    }

    fn columns(&self) -> Vec<String> {
        let c = &self.config;
        let mut cols = vec![
            "log_volume".to_string(),
            format!("log_volume_ma_{}", c.volume_ma_window),
            "volume_ratio".to_string(),
        ];
        cols.extend(c.volume_momentum_periods.iter().map(|p| format!("volume_momentum_{}", p)));
        cols.extend(
            [
                "liquidity_regime",
                "liquidity_low",
                "liquidity_normal",
                "liquidity_high",
                "liquidity_q20",
                "liquidity_q80",
                "log_avg_trade_size",
                "turnover_ratio",
                "spread_proxy",
                "vpt_norm",
                "log_dollar_volume",
            ]
            .map(String::from),
        );
        cols
    }

    fn transform(&self, bars: &[AdjustedBar], _ctx: &FeatureContext) -> Vec<Vec<f64>> {
        let c = &self.config;
        let n = bars.len();
        let volumes: Vec<f64> = bars.iter().map(|b| b.volume.max(0.0)).collect();
        let log_volumes: Vec<f64> = volumes.iter().map(|v| v.ln_1p()).collect();
        let volume_ma = sma(&volumes, c.volume_ma_window);

        let mut out = vec![
            log_volumes.clone(),
            volume_ma.iter().map(|v| v.ln_1p()).collect(),
            volumes.iter().zip(&volume_ma).map(|(v, m)| safe_div(*v, *m)).collect(),
        ];

        for &p in &c.volume_momentum_periods {
            out.push(
                (0..n)
                    .map(|i| if i < p { f64::NAN } else { log_volumes[i] - log_volumes[i - p] })
                    .collect(),
            );
        }

        let thresholds = trailing_thresholds(&volumes, c.liquidity_window, c.liquidity_min_periods);
        let regimes: Vec<Option<LiquidityRegime>> = thresholds
            .iter()
            .zip(&volumes)
            .map(|(t, v)| t.map(|(q20, q80)| LiquidityRegime::classify(*v, q20, q80)))
            .collect();
        out.push(regimes.iter().map(|r| r.map_or(f64::NAN, |r| r.code() as f64)).collect());
        for target in [LiquidityRegime::Low, LiquidityRegime::Normal, LiquidityRegime::High] {
            out.push(
                regimes
                    .iter()
                    .map(|r| r.map_or(f64::NAN, |r| if r == target { 1.0 } else { 0.0 }))
                    .collect(),
            );
        }
        out.push(thresholds.iter().map(|t| t.map_or(f64::NAN, |(q20, _)| q20.ln_1p())).collect());
        out.push(thresholds.iter().map(|t| t.map_or(f64::NAN, |(_, q80)| q80.ln_1p())).collect());

        out.push(
            bars.iter()
                .map(|b| match b.transactions {
                    Some(t) if t > 0.0 => (b.volume.max(0.0) / t).ln_1p(),
                    _ => f64::NAN,
                })
                .collect(),
        );

        let turnover: Vec<f64> = bars.iter().map(|b| b.turnover.unwrap_or(f64::NAN)).collect();
        let turnover_ma = rolling(&turnover, c.volume_ma_window, c.volume_ma_window / 2, |w| {
            w.iter().sum::<f64>() / w.len() as f64
        });
        out.push(turnover.iter().zip(&turnover_ma).map(|(t, m)| safe_div(*t, *m)).collect());

        out.push(bars.iter().map(|b| safe_div(b.high - b.low, b.close)).collect());

        // volume-weighted mean return over the MA window
        let window = c.volume_ma_window.max(1);
        out.push(
            (0..n)
                .map(|i| {
                    if i < window {
                        return f64::NAN;
                    }
                    let mut weighted = 0.0;
                    let mut total = 0.0;
                    for j in (i + 1 - window)..=i {
                        let ret = safe_div(bars[j].close, bars[j - 1].close) - 1.0;
                        if ret.is_finite() {
                            weighted += ret * volumes[j];
                            total += volumes[j];
                        }
                    }
                    if total > 0.0 {
                        weighted / total
                    } else {
                        0.0
                    }
                })
                .collect(),
        );

        let dollar_volume: Vec<f64> = bars.iter().map(|b| b.raw_close * b.volume.max(0.0)).collect();
        out.push(sma(&dollar_volume, c.volume_ma_window).iter().map(|v| v.ln_1p()).collect());

        out
    }

    fn warmup(&self) -> usize {
        let c = &self.config;
        let max_momentum = c.volume_momentum_periods.iter().copied().max().unwrap_or(0);
        [c.volume_ma_window, max_momentum, c.liquidity_min_periods.saturating_sub(1)]
            .into_iter()
            .max()
            .unwrap_or(0)
    }
}
