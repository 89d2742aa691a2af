//! Tests for the prediction service

use super::*;
use crate::calendar::TradingCalendar;
use crate::config::{DataConfig, FeatureConfig};
use crate::features::FeaturePipeline;
use crate::models::ModelTrainer;
use crate::test_support::{fast_models, random_walk, synthetic_frame, trained_service};

fn relative_width(ci: &ConfidenceInterval) -> f64 {
    (ci.upper / ci.lower).ln()
}

#[test]
fn test_predict_converts_to_price_space() {
    let service = trained_service();
    let result = service.predict("calm", &[3, 1, 1]).unwrap();

    assert_eq!(result.symbol, "CALM");
    assert_eq!(result.forecasts.len(), 2);
    assert_eq!(result.forecasts[0].horizon, 1);
    assert_eq!(result.forecasts[1].horizon, 3);

    let cal = TradingCalendar::new();
    for f in &result.forecasts {
        assert_eq!(f.target_date, cal.add_trading_days(result.current_date, f.horizon));
        assert!((f.predicted_price - result.current_price * f.median_log_return.exp()).abs() < 1e-9);
        assert!(f.ci_95.lower <= f.ci_80.lower && f.ci_80.lower <= f.predicted_price);
        assert!(f.predicted_price <= f.ci_80.upper && f.ci_80.upper <= f.ci_95.upper);
        assert_eq!(f.quantiles.len(), 5);
        for pair in f.quantiles.windows(2) {
            assert!(pair[0].price <= pair[1].price);
        }
        assert!(f.predicted_volume.unwrap() >= 0.0);
        assert!(f.liquidity_regime.is_some());
    }
}

#[test]
fn test_calm_symbol_gets_narrower_interval() {
    let service = trained_service();
    let calm = service.predict("CALM", &[1]).unwrap();
    let wild = service.predict("WILD", &[1]).unwrap();

    let calm_width = relative_width(&calm.forecasts[0].ci_80);
    let wild_width = relative_width(&wild.forecasts[0].ci_80);
    assert!(calm_width < wild_width, "calm {} vs wild {}", calm_width, wild_width);
}

#[test]
fn test_unknown_symbol_is_not_found() {
    let service = trained_service();
    assert!(matches!(service.predict("ZZZZ", &[1]), Err(ForecastError::NotFound(_))));
    assert!(matches!(service.predict("  ", &[1]), Err(ForecastError::Validation(_))));
}

#[test]
fn test_horizon_bounds() {
    let service = trained_service();
    assert!(matches!(service.predict("CALM", &[6]), Err(ForecastError::Validation(_))));
    assert!(matches!(service.predict("CALM", &[0]), Err(ForecastError::Validation(_))));
    assert!(matches!(service.predict("CALM", &[]), Err(ForecastError::Validation(_))));
    // valid horizon without a trained model
    assert!(matches!(service.predict("CALM", &[5]), Err(ForecastError::NotFound(_))));

    assert_eq!(validate_horizons(&[3, 1, 3]).unwrap(), vec![1, 3]);
}

#[test]
fn test_batch_reports_errors_inline() {
    let service = trained_service();
    let symbols = vec!["CALM".to_string(), "ZZZZ".to_string(), "wild".to_string()];
    let batch = service.predict_batch(&symbols, &[1, 2]).unwrap();

    assert_eq!(batch.predictions.len(), 2);
    assert_eq!(batch.errors.len(), 1);
    assert_eq!(batch.errors[0].symbol, "ZZZZ");
    assert_eq!(batch.errors[0].error, "not_found");

    assert!(matches!(service.predict_batch(&[], &[1]), Err(ForecastError::Validation(_))));
}

#[test]
fn test_visualization_history_and_path() {
    let service = trained_service();
    let chart = service.visualization("MIXED", &[1, 2, 3]).unwrap();

    assert_eq!(chart.symbol, "MIXED");
    assert_eq!(chart.history.len(), 30);
    assert!(chart.history.windows(2).all(|w| w[0].date < w[1].date));
    assert_eq!(chart.forecast.len(), 3);

    let last = chart.history.last().unwrap().date;
    assert!(chart.forecast[0].date > last);
    for p in &chart.forecast {
        assert!(p.lower_95 <= p.lower_80 && p.upper_80 <= p.upper_95);
    }
}

#[test]
fn test_metrics_and_symbols() {
    let service = trained_service();
    let report = service.metrics().unwrap();

    assert_eq!(report.horizons, vec![1, 2, 3]);
    assert_eq!(report.holdout.len(), 3);
    assert!(report.walk_forward.is_none());
    let top = &report.feature_importance[&1];
    assert!(!top.is_empty() && top.len() <= 20);
    assert!(top.windows(2).all(|w| w[0].importance >= w[1].importance));

    assert_eq!(
        service.symbols().unwrap(),
        vec!["CALM".to_string(), "MIXED".to_string(), "WILD".to_string()]
    );

    let health = service.health();
    assert_eq!(health.status, "healthy");
    assert_eq!(health.symbols, 3);
}

#[test]
fn test_unloaded_service_is_unavailable() {
    let service = PredictionService::new(30);
    assert!(matches!(
        service.predict("CALM", &[1]),
        Err(ForecastError::ServiceUnavailable(_))
    ));
    assert!(matches!(service.metrics(), Err(ForecastError::ServiceUnavailable(_))));
    assert!(matches!(service.symbols(), Err(ForecastError::ServiceUnavailable(_))));

    let health = service.health();
    assert_eq!(health.status, "degraded");
    assert!(!health.models_loaded && !health.data_loaded);
}

#[test]
fn test_mismatched_features_are_unavailable() {
    let service = trained_service();
    let models = service.models.clone().unwrap();
    let other = PredictionService::new(30)
        .with_models(models)
        .with_features(synthetic_frame(&["AAA"], 30));

    assert!(matches!(
        other.predict("AAA", &[1]),
        Err(ForecastError::ServiceUnavailable(_))
    ));
    assert_eq!(other.health().status, "degraded");
}

#[test]
fn test_load_degrades_without_artifacts() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = Config::default();
    config.models.models_dir = dir.path().join("models").display().to_string();
    config.data.processed_dir = dir.path().join("processed").display().to_string();

    let service = PredictionService::load(&config);
    let health = service.health();
    assert!(!health.models_loaded);
    assert!(!health.data_loaded);
}

#[test]
fn test_lowercase_codes_ingested_then_predicted() {
    let dir = tempfile::tempdir().unwrap();
    let mut csv = String::from("SEANCE;CODE;CLOTURE;QUANTITE_NEGOCIEE\n");
    let mut bars = random_walk("calm", 250, 10.0, 11, |_| 0.003);
    bars.extend(random_walk("wild", 250, 40.0, 17, |_| 0.03));
    for b in &bars {
        csv.push_str(&format!("{};{};{:.4};{}\n", b.date.format("%d/%m/%Y"), b.symbol, b.close, b.volume));
    }
    std::fs::write(dir.path().join("histo.csv"), csv).unwrap();

    let config = DataConfig {
        raw_dir: dir.path().display().to_string(),
        processed_dir: dir.path().join("processed").display().to_string(),
        price_files: vec!["histo.csv".to_string()],
        dividend_files: Vec::new(),
        ..Default::default()
    };
    let market = crate::data::ingest(&config).unwrap();
    assert_eq!(market.symbols(), vec!["CALM".to_string(), "WILD".to_string()]);

    let frame = FeaturePipeline::new(&FeatureConfig::default())
        .transform(&market.bars, &market.index)
        .unwrap();
    let models = ModelTrainer::new(fast_models(vec![1])).train(&frame).unwrap();
    let service = PredictionService::new(30).with_models(models).with_features(frame);

    assert_eq!(service.symbols().unwrap(), vec!["CALM".to_string(), "WILD".to_string()]);
    let result = service.predict("calm", &[1]).unwrap();
    assert_eq!(result.symbol, "CALM");
    assert_eq!(service.predict(" Wild ", &[1]).unwrap().symbol, "WILD");
}
