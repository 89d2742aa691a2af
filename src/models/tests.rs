//! Tests for forecasters, training and artifact storage

use super::*;
use crate::error::ForecastError;
use crate::test_support::{fast_boosting, fast_models, synthetic_frame};
use crate::types::{ConfidenceInterval, LiquidityRegime};

fn close(a: f64, b: f64) -> bool {
    (a - b).abs() < 1e-9
}

#[test]
fn test_enforce_monotone_sorts_crossings() {
    let mut values = vec![0.02, -0.01, 0.01, 0.005, 0.03];
    enforce_monotone(&mut values);
    assert_eq!(values, vec![-0.01, 0.005, 0.01, 0.02, 0.03]);
}

#[test]
fn test_confidence_intervals_from_trained_tails() {
    let levels = vec![(0.025, -0.05), (0.1, -0.02), (0.5, 0.0), (0.9, 0.03), (0.975, 0.06)];
    let (median, ci_80, ci_95) = confidence_intervals(&levels).unwrap();
    assert_eq!(median, 0.0);
    assert_eq!(ci_80, ConfidenceInterval { lower: -0.02, upper: 0.03 });
    assert_eq!(ci_95, ConfidenceInterval { lower: -0.05, upper: 0.06 });
}

#[test]
fn test_confidence_intervals_widened_without_tails() {
    let levels = vec![(0.1, -0.02), (0.5, 0.01), (0.9, 0.03)];
    let (median, ci_80, ci_95) = confidence_intervals(&levels).unwrap();
    let scale = 1.959_963_984_540 / 1.281_551_565_545;
    assert!(close(ci_95.lower, median - 0.03 * scale));
    assert!(close(ci_95.upper, median + 0.02 * scale));
    assert!(ci_95.lower < ci_80.lower && ci_95.upper > ci_80.upper);

    assert!(matches!(
        confidence_intervals(&[(0.5, 0.0)]),
        Err(ForecastError::Model(_))
    ));
}

#[test]
fn test_quantile_forecaster_is_monotone_and_tracks_volatility() {
    let frame = synthetic_frame(&["AAA", "BBB"], 400);
    let trainer = ModelTrainer::new(fast_models(vec![1]));
    let forecaster = trainer.fit_price(&frame, 1, None, None).unwrap();
    assert_eq!(forecaster.quantiles, vec![0.025, 0.1, 0.5, 0.9, 0.975]);

    for row in frame.rows.iter().step_by(7) {
        let p = forecaster.predict(&row.values).unwrap();
        for pair in p.levels.windows(2) {
            assert!(pair[0].1 <= pair[1].1, "quantiles cross at {}", row.date);
        }
        assert!(p.ci_95.lower <= p.ci_80.lower && p.ci_80.lower <= p.median);
        assert!(p.median <= p.ci_80.upper && p.ci_80.upper <= p.ci_95.upper);
    }

    let calm = forecaster.predict(&[0.002, 0.0, 0.5]).unwrap();
    let wild = forecaster.predict(&[0.03, 0.0, 0.5]).unwrap();
    assert!(calm.ci_80.width() < wild.ci_80.width());

    assert_eq!(forecaster.feature_importance().len(), 3);
}

#[test]
fn test_forecaster_requires_core_quantiles() {
    let x = vec![vec![1.0]; 20];
    let y = vec![0.0; 20];
    let err = QuantileForecaster::fit(1, &x, &y, &[0.25, 0.5, 0.75], &["f".to_string()], &fast_boosting());
    assert!(matches!(err, Err(ForecastError::Model(_))));
}

#[test]
fn test_volume_forecaster_non_negative() {
    let x: Vec<Vec<f64>> = (0..100).map(|i| vec![(i % 10) as f64]).collect();
    let y: Vec<f64> = x.iter().map(|r| (r[0] * 100.0).ln_1p()).collect();
    let model = VolumeForecaster::fit(1, &x, &y, &fast_boosting()).unwrap();
    let high = model.predict(&[9.0]).unwrap();
    let low = model.predict(&[0.0]).unwrap();
    assert!(low >= 0.0);
    assert!(high > 500.0 && high < 1300.0, "predicted {}", high);
}

#[test]
fn test_liquidity_classifier_per_symbol_with_fallback() {
    let mut observations = Vec::new();
    for v in 1..=100 {
        observations.push(("BIG", v as f64 * 1000.0));
        observations.push(("SMALL", v as f64));
    }
    let classifier = LiquidityClassifier::fit(observations.iter().map(|(s, v)| (*s, *v))).unwrap();

    assert_eq!(classifier.classify("SMALL", 90.0), LiquidityRegime::High);
    assert_eq!(classifier.classify("BIG", 90.0), LiquidityRegime::Low);
    assert_eq!(classifier.classify("BIG", 50_000.0), LiquidityRegime::Normal);
    assert!(!classifier.knows("NEW"));
    // unseen symbols fall back to thresholds over all observations
    let global = classifier.thresholds("NEW");
    assert!(global.q20 < global.q80);
    assert_eq!(classifier.classify("NEW", 0.5), LiquidityRegime::Low);

    let empty: Vec<(&str, f64)> = Vec::new();
    assert!(LiquidityClassifier::fit(empty).is_err());
}

#[test]
fn test_purged_dataset_targets_stay_before_cutoff() {
    let frame = synthetic_frame(&["AAA"], 120);
    let dates = frame.unique_dates();
    let cutoff = dates[80];
    let h = 3;
    let target_dates = frame.target_dates(h);
    let data = Dataset::purged(&frame, &frame.return_targets(h), &target_dates, None, Some(cutoff));

    assert_eq!(data.len(), 80 - h);
    for &i in &data.rows {
        assert!(frame.rows[i].date < cutoff);
        assert!(target_dates[i].unwrap() < cutoff);
    }
}

#[test]
fn test_trainer_splits_scores_and_round_trips() {
    let frame = synthetic_frame(&["AAA", "BBB"], 250);
    let config = fast_models(vec![1, 2]);
    let models = ModelTrainer::new(config).train(&frame).unwrap();

    let manifest = &models.manifest;
    assert_eq!(manifest.horizons, vec![1, 2]);
    assert_eq!(manifest.symbols, vec!["AAA".to_string(), "BBB".to_string()]);
    let test_start = manifest.test_start.unwrap();
    assert!(manifest.train_end < test_start);
    assert_eq!(manifest.train_rows, 2 * 200);
    assert_eq!(manifest.evaluation.len(), 2);
    assert!(manifest.evaluation[0].samples > 0);
    assert_eq!(models.volume.len(), 2);

    let dir = tempfile::tempdir().unwrap();
    models.save(dir.path()).unwrap();
    let loaded = ForecastModels::load(dir.path()).unwrap();
    assert_eq!(loaded.horizons(), vec![1, 2]);
    assert_eq!(loaded.feature_names(), models.feature_names());
    assert_eq!(loaded.manifest.test_start, manifest.test_start);

    let row = &frame.rows[10].values;
    let a = models.price[&1].predict(row).unwrap();
    let b = loaded.price[&1].predict(row).unwrap();
    assert!(close(a.median, b.median));
    assert!(close(a.ci_80.width(), b.ci_80.width()));
    let t = models.liquidity.thresholds("AAA");
    assert!(close(loaded.liquidity.thresholds("AAA").q80, t.q80));
}

#[test]
fn test_load_without_models_is_not_found() {
    let dir = tempfile::tempdir().unwrap();
    let err = ForecastModels::load(dir.path()).unwrap_err();
    assert!(matches!(err, ForecastError::NotFound(_)));
}

#[test]
fn test_trainer_rejects_bad_horizon() {
    let frame = synthetic_frame(&["AAA"], 60);
    let trainer = ModelTrainer::new(fast_models(vec![1]));
    assert!(matches!(
        trainer.fit_price(&frame, 6, None, None),
        Err(ForecastError::Validation(_))
    ));
}
