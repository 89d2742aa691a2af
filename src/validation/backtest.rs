//! Signal backtest on out-of-sample median forecasts

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::info;

use super::metrics::{max_drawdown, sharpe_ratio, PredictionRecord, TRADING_DAYS_PER_YEAR};
use crate::config::BacktestStrategy;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BacktestSummary {
    pub strategy: BacktestStrategy,
    pub observations: usize,
    pub total_return: f64,
    pub annualized_return: f64,
    pub sharpe_ratio: f64,
    pub max_drawdown: f64,
    pub win_rate: f64,
    pub avg_win: f64,
    pub avg_loss: f64,
    /// Sum of absolute position changes
    pub num_trades: f64,
}

pub struct Backtester {
    strategy: BacktestStrategy,
    transaction_cost: f64,
}

impl Backtester {
    pub fn new(strategy: BacktestStrategy, transaction_cost: f64) -> Self {
        Self {
            strategy,
            transaction_cost,
        }
    }

    fn signal(&self, median: f64) -> f64 {
        match self.strategy {
            BacktestStrategy::LongOnly => {
                if median > 0.0 {
                    1.0
                } else {
                    0.0
                }
            }
            BacktestStrategy::LongShort => {
                if median > 0.0 {
                    1.0
                } else if median < 0.0 {
                    -1.0
                } else {
                    0.0
                }
            }
        }
    }

    /// Net log return per record in (date, symbol) order
    ///
    /// Each symbol starts flat; every change of position pays
    /// `transaction_cost` per unit changed.
    pub fn net_returns(&self, records: &[PredictionRecord]) -> (Vec<f64>, f64) {
        let mut ordered: Vec<&PredictionRecord> = records.iter().collect();
        ordered.sort_by(|a, b| a.date.cmp(&b.date).then_with(|| a.symbol.cmp(&b.symbol)));

        let mut positions: HashMap<&str, f64> = HashMap::new();
        let mut trades = 0.0;
        let returns = ordered
            .into_iter()
            .map(|r| {
                let signal = self.signal(r.median);
                let previous = positions.insert(r.symbol.as_str(), signal).unwrap_or(0.0);
                let change = (signal - previous).abs();
                trades += change;
                signal * r.truth - change * self.transaction_cost
            })
            .collect();
        (returns, trades)
    }

    pub fn run(&self, records: &[PredictionRecord]) -> Option<BacktestSummary> {
        if records.is_empty() {
            return None;
        }
        let (returns, trades) = self.net_returns(records);
        let n = returns.len() as f64;

        let mut log_equity = 0.0;
        let equity: Vec<f64> = returns
            .iter()
            .map(|r| {
                log_equity += r;
                log_equity.exp()
            })
            .collect();
        let final_equity = equity.last().copied().unwrap_or(1.0);

        let wins: Vec<f64> = returns.iter().copied().filter(|r| *r > 0.0).collect();
        let losses: Vec<f64> = returns.iter().copied().filter(|r| *r < 0.0).collect();
        let avg = |v: &[f64]| if v.is_empty() { 0.0 } else { v.iter().sum::<f64>() / v.len() as f64 };

        let summary = BacktestSummary {
            strategy: self.strategy,
            observations: returns.len(),
            total_return: final_equity - 1.0,
            annualized_return: final_equity.powf(TRADING_DAYS_PER_YEAR / n) - 1.0,
            sharpe_ratio: sharpe_ratio(&returns),
            max_drawdown: max_drawdown(&equity),
            win_rate: wins.len() as f64 / n,
            avg_win: avg(&wins),
            avg_loss: avg(&losses),
            num_trades: trades,
        };

        info!(
            "Backtest ({:?}): total {:.2}%, Sharpe {:.2}, max drawdown {:.2}%, win rate {:.1}%",
            self.strategy,
            summary.total_return * 100.0,
            summary.sharpe_ratio,
            summary.max_drawdown * 100.0,
            summary.win_rate * 100.0
        );
        Some(summary)
    }
}
