//! Market-relative features against the benchmark index
//!
//! Without an index series every column is NaN; the family is optional and
//! does not drive the warm-up cut.

use super::indicators::{log_change, rolling_corr_beta};
use super::{FeatureContext, FeatureTransformer};
use crate::types::AdjustedBar;

pub struct MarketFeatures {
    window: usize,
}

impl MarketFeatures {
    pub fn new(window: usize) -> Self {
        Self { window }
    }
}

impl FeatureTransformer for MarketFeatures {
    fn name(&self) -> &'static str {
        "market"
    }

    fn columns(&self) -> Vec<String> {
        vec![
            "market_return".to_string(),
            "relative_strength".to_string(),
            format!("market_corr_{}", self.window),
            format!("market_beta_{}", self.window),
        ]
    }

    fn transform(&self, bars: &[AdjustedBar], ctx: &FeatureContext) -> Vec<Vec<f64>> {
        let n = bars.len();
        if !ctx.has_market() {
            return vec![vec![f64::NAN; n]; 4];
        }

        let closes: Vec<f64> = bars.iter().map(|b| b.close).collect();
        let stock = log_change(&closes, 1);
        let market: Vec<f64> = bars
            .iter()
            .map(|b| ctx.market_returns.get(&b.date).copied().unwrap_or(f64::NAN))
            .collect();
        let relative = stock.iter().zip(&market).map(|(s, m)| s - m).collect();
        let (corr, beta) = rolling_corr_beta(&market, &stock, self.window);

        vec![market, relative, corr, beta]
    }

    fn warmup(&self) -> usize {
        self.window
    }

    fn required(&self) -> bool {
        false
    }
}
