//! Gradient-boosted regression trees
//!
//! Each round fits a depth-limited tree to the negative loss gradient on a
//! histogram of pre-binned feature values. For pinball loss the leaf value is
//! then replaced by the α-quantile of the residuals falling in the leaf.
//! Missing values take the child direction learned at each split.

use rand::rngs::StdRng;
use rand::seq::index;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::BoostingConfig;
use crate::error::{ForecastError, Result};
use crate::features::indicators::{mean, quantile, quantile_sorted};

const NAN_BIN: u16 = u16::MAX;
const MAX_BINS: usize = 1024;

/// Training objective
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Loss {
    Squared,
    /// Pinball loss at level α
    Quantile(f64),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
enum Node {
    Leaf {
        value: f64,
    },
    Split {
        feature: usize,
        threshold: f64,
        nan_left: bool,
        left: usize,
        right: usize,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Tree {
    nodes: Vec<Node>,
}

impl Tree {
    fn predict(&self, row: &[f64]) -> f64 {
        let mut idx = 0;
        loop {
            match &self.nodes[idx] {
                Node::Leaf { value } => return *value,
                Node::Split {
                    feature,
                    threshold,
                    nan_left,
                    left,
                    right,
                } => {
                    let v = row[*feature];
                    let go_left = if v.is_finite() { v <= *threshold } else { *nan_left };
                    idx = if go_left { *left } else { *right };
                }
            }
        }
    }
}

/// Candidate thresholds and per-row bin indices for every feature
///
/// Bin `k` holds values `v <= thresholds[k]` above the previous threshold;
/// bin `thresholds.len()` holds everything larger.
struct Binned {
    thresholds: Vec<Vec<f64>>,
    bins: Vec<Vec<u16>>,
}

impl Binned {
    fn new(x: &[Vec<f64>], n_features: usize, max_bins: usize) -> Self {
        let mut thresholds = Vec::with_capacity(n_features);
        let mut bins = Vec::with_capacity(n_features);

        for f in 0..n_features {
            let mut sorted: Vec<f64> = x.iter().map(|r| r[f]).filter(|v| v.is_finite()).collect();
            sorted.sort_by(|a, b| a.total_cmp(b));
            let mut unique = sorted.clone();
            unique.dedup();

            let cuts = if unique.len() <= max_bins {
                unique
            } else {
                let mut cuts: Vec<f64> = (1..max_bins)
                    .map(|k| quantile_sorted(&sorted, k as f64 / max_bins as f64))
                    .collect();
                cuts.dedup();
                cuts
            };

            bins.push(
                x.iter()
                    .map(|r| {
                        let v = r[f];
                        if v.is_finite() {
                            cuts.partition_point(|t| *t < v) as u16
                        } else {
                            NAN_BIN
                        }
                    })
                    .collect(),
            );
            thresholds.push(cuts);
        }

        Self { thresholds, bins }
    }
}

struct SplitCandidate {
    feature: usize,
    bin: usize,
    nan_left: bool,
    gain: f64,
}

struct TreeBuilder<'a> {
    binned: &'a Binned,
    gradient: &'a [f64],
    residual: &'a [f64],
    features: &'a [usize],
    loss: Loss,
    config: &'a BoostingConfig,
    nodes: Vec<Node>,
    gains: Vec<f64>,
}

impl<'a> TreeBuilder<'a> {
    fn score(&self, g: f64, n: usize) -> f64 {
        g * g / (n as f64 + self.config.lambda)
    }

    fn best_split(&self, rows: &[usize]) -> Option<SplitCandidate> {
        let min_leaf = self.config.min_samples_leaf.max(1);
        if rows.len() < 2 * min_leaf {
            return None;
        }
        let total_g: f64 = rows.iter().map(|&r| self.gradient[r]).sum();
        let total_n = rows.len();
        let parent = self.score(total_g, total_n);
        let mut best: Option<SplitCandidate> = None;

        for &f in self.features {
            let m = self.binned.thresholds[f].len();
            if m == 0 {
                continue;
            }
            let bins = &self.binned.bins[f];
            let mut sum = vec![0.0; m + 1];
            let mut count = vec![0usize; m + 1];
            let mut nan_g = 0.0;
            let mut nan_n = 0usize;
            for &r in rows {
                let b = bins[r];
                if b == NAN_BIN {
                    nan_g += self.gradient[r];
                    nan_n += 1;
                } else {
                    sum[b as usize] += self.gradient[r];
                    count[b as usize] += 1;
                }
            }

            let mut left_g = 0.0;
            let mut left_n = 0usize;
            for k in 0..m {
                left_g += sum[k];
                left_n += count[k];
                if count[k] == 0 {
                    continue;
                }
                for nan_left in [false, true] {
                    if nan_left && nan_n == 0 {
                        continue;
                    }
                    let (lg, ln) = if nan_left {
                        (left_g + nan_g, left_n + nan_n)
                    } else {
                        (left_g, left_n)
                    };
                    let (rg, rn) = (total_g - lg, total_n - ln);
                    if ln < min_leaf || rn < min_leaf {
                        continue;
                    }
                    let gain = self.score(lg, ln) + self.score(rg, rn) - parent;
                    if gain > self.config.gamma.max(1e-12)
                        && best.as_ref().map_or(true, |b| gain > b.gain)
                    {
                        best = Some(SplitCandidate {
                            feature: f,
                            bin: k,
                            nan_left,
                            gain,
                        });
                    }
                }
            }
        }
        best
    }

    fn leaf_value(&self, rows: &[usize]) -> f64 {
        match self.loss {
            Loss::Squared => {
                let g: f64 = rows.iter().map(|&r| self.gradient[r]).sum();
                g / (rows.len() as f64 + self.config.lambda)
            }
            Loss::Quantile(alpha) => {
                let residuals: Vec<f64> = rows.iter().map(|&r| self.residual[r]).collect();
                let q = quantile(&residuals, alpha);
                if q.is_finite() { q } else { 0.0 }
            }
        }
    }

    /// Grow the subtree for `rows`, returning its node index
    fn grow(&mut self, rows: Vec<usize>, depth: usize) -> usize {
        let idx = self.nodes.len();
        self.nodes.push(Node::Leaf { value: 0.0 });

        let split = if depth < self.config.max_depth {
            self.best_split(&rows)
        } else {
            None
        };

        match split {
            Some(s) => {
                let binned = self.binned;
                let bins = &binned.bins[s.feature];
                let (left, right): (Vec<usize>, Vec<usize>) = rows.into_iter().partition(|&r| {
                    let b = bins[r];
                    if b == NAN_BIN { s.nan_left } else { (b as usize) <= s.bin }
                });
                self.gains[s.feature] += s.gain;
                let left = self.grow(left, depth + 1);
                let right = self.grow(right, depth + 1);
                self.nodes[idx] = Node::Split {
                    feature: s.feature,
                    threshold: binned.thresholds[s.feature][s.bin],
                    nan_left: s.nan_left,
                    left,
                    right,
                };
            }
            None => {
                self.nodes[idx] = Node::Leaf {
                    value: self.leaf_value(&rows),
                };
            }
        }
        idx
    }
}

/// Boosted tree ensemble for one target and one loss
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GradientBoostedTrees {
    loss: Loss,
    base_score: f64,
    learning_rate: f64,
    n_features: usize,
    trees: Vec<Tree>,
    importance: Vec<f64>,
}

impl GradientBoostedTrees {
    pub fn fit(x: &[Vec<f64>], y: &[f64], loss: Loss, config: &BoostingConfig) -> Result<Self> {
        if x.is_empty() {
            return Err(ForecastError::InsufficientData {
                required: 1,
                actual: 0,
            });
        }
        if x.len() != y.len() {
            return Err(ForecastError::Model(format!(
                "{} feature rows but {} targets",
                x.len(),
                y.len()
            )));
        }
        let n_features = x[0].len();
        if n_features == 0 || x.iter().any(|r| r.len() != n_features) {
            return Err(ForecastError::Model("feature rows have inconsistent width".into()));
        }
        if y.iter().any(|v| !v.is_finite()) {
            return Err(ForecastError::Model("targets must be finite".into()));
        }
        if let Loss::Quantile(alpha) = loss {
            if !(alpha > 0.0 && alpha < 1.0) {
                return Err(ForecastError::Model(format!("quantile {} outside (0, 1)", alpha)));
            }
        }
        if config.n_estimators == 0 || config.learning_rate <= 0.0 {
            return Err(ForecastError::Model(
                "n_estimators and learning_rate must be positive".into(),
            ));
        }

        let n = y.len();
        let binned = Binned::new(x, n_features, config.max_bins.clamp(2, MAX_BINS));
        let base_score = match loss {
            Loss::Squared => mean(y),
            Loss::Quantile(alpha) => quantile(y, alpha),
        };

        let mut current = vec![base_score; n];
        let mut rng = StdRng::seed_from_u64(config.seed);
        let n_rows = ((n as f64 * config.subsample.clamp(0.0, 1.0)).round() as usize).clamp(1, n);
        let n_cols = ((n_features as f64 * config.colsample.clamp(0.0, 1.0)).round() as usize)
            .clamp(1, n_features);

        let mut trees = Vec::with_capacity(config.n_estimators);
        let mut importance = vec![0.0; n_features];

        for _ in 0..config.n_estimators {
            let residual: Vec<f64> = y.iter().zip(&current).map(|(t, p)| t - p).collect();
            let gradient: Vec<f64> = match loss {
                Loss::Squared => residual.clone(),
                Loss::Quantile(alpha) => residual
                    .iter()
                    .map(|r| if *r > 0.0 { alpha } else { alpha - 1.0 })
                    .collect(),
            };

            let mut rows: Vec<usize> = if n_rows < n {
                index::sample(&mut rng, n, n_rows).into_vec()
            } else {
                (0..n).collect()
            };
            rows.sort_unstable();
            let mut features: Vec<usize> = if n_cols < n_features {
                index::sample(&mut rng, n_features, n_cols).into_vec()
            } else {
                (0..n_features).collect()
            };
            features.sort_unstable();

            let mut builder = TreeBuilder {
                binned: &binned,
                gradient: &gradient,
                residual: &residual,
                features: &features,
                loss,
                config,
                nodes: Vec::new(),
                gains: vec![0.0; n_features],
            };
            builder.grow(rows, 0);
            let TreeBuilder { nodes, gains, .. } = builder;

            for (total, gain) in importance.iter_mut().zip(&gains) {
                *total += gain;
            }
            let tree = Tree { nodes };
            for (pred, row) in current.iter_mut().zip(x) {
                *pred += config.learning_rate * tree.predict(row);
            }
            trees.push(tree);
        }

        debug!(
            "Fitted {} trees on {} rows x {} features ({:?})",
            trees.len(),
            n,
            n_features,
            loss
        );

        Ok(Self {
            loss,
            base_score,
            learning_rate: config.learning_rate,
            n_features,
            trees,
            importance,
        })
    }

    pub fn predict(&self, row: &[f64]) -> Result<f64> {
        if row.len() != self.n_features {
            return Err(ForecastError::Model(format!(
                "expected {} features, got {}",
                self.n_features,
                row.len()
            )));
        }
        Ok(self.base_score
            + self.learning_rate * self.trees.iter().map(|t| t.predict(row)).sum::<f64>())
    }

    pub fn predict_batch(&self, rows: &[Vec<f64>]) -> Result<Vec<f64>> {
        rows.iter().map(|r| self.predict(r)).collect()
    }

    /// Split gain per feature, normalised to sum to one
    pub fn feature_importance(&self) -> Vec<f64> {
        let total: f64 = self.importance.iter().sum();
        if total > 0.0 {
            self.importance.iter().map(|g| g / total).collect()
        } else {
            vec![0.0; self.n_features]
        }
    }

    pub fn n_features(&self) -> usize {
        self.n_features
    }

    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_config() -> BoostingConfig {
        BoostingConfig {
            n_estimators: 60,
            learning_rate: 0.1,
            max_depth: 3,
            min_samples_leaf: 10,
            subsample: 1.0,
            colsample: 1.0,
            lambda: 1.0,
            gamma: 0.0,
            max_bins: 32,
            seed: 7,
        }
    }

    fn uniform(n: usize, seed: u64) -> Vec<f64> {
        let mut state = seed;
        (0..n)
            .map(|_| {
                state = state.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
                ((state >> 33) as f64) / (1u64 << 31) as f64
            })
            .collect()
    }

    #[test]
    fn test_squared_loss_learns_step() {
        let xs = uniform(300, 1);
        let x: Vec<Vec<f64>> = xs.iter().map(|v| vec![*v, 0.0]).collect();
        let y: Vec<f64> = xs.iter().map(|v| if *v > 0.5 { 1.0 } else { 0.0 }).collect();

        let model = GradientBoostedTrees::fit(&x, &y, Loss::Squared, &small_config()).unwrap();
        assert!(model.predict(&[0.9, 0.0]).unwrap() > 0.9);
        assert!(model.predict(&[0.1, 0.0]).unwrap() < 0.1);

        let importance = model.feature_importance();
        assert!(importance[0] > 0.99);
        assert_eq!(importance[1], 0.0);
    }

    #[test]
    fn test_quantile_loss_coverage() {
        let noise = uniform(600, 3);
        let xs = uniform(600, 4);
        let x: Vec<Vec<f64>> = xs.iter().map(|v| vec![*v]).collect();
        let y: Vec<f64> = xs.iter().zip(&noise).map(|(v, e)| v + (e - 0.5) * (0.2 + v)).collect();

        let model = GradientBoostedTrees::fit(&x, &y, Loss::Quantile(0.9), &small_config()).unwrap();
        let preds = model.predict_batch(&x).unwrap();
        let below = preds.iter().zip(&y).filter(|(p, t)| *t <= *p).count() as f64 / y.len() as f64;
        assert!(below > 0.8 && below < 0.97, "coverage {}", below);
    }

    #[test]
    fn test_missing_values_follow_learned_direction() {
        let xs = uniform(200, 5);
        let x: Vec<Vec<f64>> = xs
            .iter()
            .enumerate()
            .map(|(i, v)| vec![if i % 2 == 0 { f64::NAN } else { *v }])
            .collect();
        let y: Vec<f64> = (0..200).map(|i| if i % 2 == 0 { 5.0 } else { 0.0 }).collect();

        let model = GradientBoostedTrees::fit(&x, &y, Loss::Squared, &small_config()).unwrap();
        assert!(model.predict(&[f64::NAN]).unwrap() > 4.5);
        assert!(model.predict(&[0.3]).unwrap() < 0.5);
    }

    #[test]
    fn test_seeded_fit_is_deterministic_and_serializable() {
        let xs = uniform(150, 9);
        let x: Vec<Vec<f64>> = xs.iter().map(|v| vec![*v, v * v, 1.0 - v]).collect();
        let y: Vec<f64> = xs.iter().map(|v| (v * 6.0).sin()).collect();
        let config = BoostingConfig {
            subsample: 0.7,
            colsample: 0.67,
            ..small_config()
        };

        let a = GradientBoostedTrees::fit(&x, &y, Loss::Quantile(0.5), &config).unwrap();
        let b = GradientBoostedTrees::fit(&x, &y, Loss::Quantile(0.5), &config).unwrap();
        assert_eq!(a, b);

        let json = serde_json::to_string(&a).unwrap();
        let restored: GradientBoostedTrees = serde_json::from_str(&json).unwrap();
        let row = [0.4, 0.16, 0.6];
        assert!((a.predict(&row).unwrap() - restored.predict(&row).unwrap()).abs() < 1e-12);
        assert_eq!(restored.n_trees(), 60);
    }

    #[test]
    fn test_fit_rejects_bad_input() {
        let config = small_config();
        assert!(GradientBoostedTrees::fit(&[], &[], Loss::Squared, &config).is_err());
        assert!(GradientBoostedTrees::fit(&[vec![1.0]], &[1.0, 2.0], Loss::Squared, &config).is_err());
        assert!(GradientBoostedTrees::fit(&[vec![1.0]], &[1.0], Loss::Quantile(1.5), &config).is_err());

        let model = GradientBoostedTrees::fit(&[vec![1.0], vec![2.0]], &[1.0, 2.0], Loss::Squared, &config).unwrap();
        assert!(matches!(model.predict(&[1.0, 2.0]), Err(ForecastError::Model(_))));
    }
}
