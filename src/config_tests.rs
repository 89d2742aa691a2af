//! Tests for configuration

#[cfg(test)]
mod tests {
    use super::super::config::*;
    use std::io::Write;

    #[test]
    fn test_feature_config_default() {
        let config = FeatureConfig::default();
        assert_eq!(config.sma_periods, vec![5, 10, 20, 50]);
        assert_eq!(config.rsi_period, 14);
        assert_eq!(
            (config.macd_fast, config.macd_slow, config.macd_signal),
            (12, 26, 9)
        );
        assert_eq!(config.bollinger_period, 20);
        assert_eq!(config.bollinger_std, 2.0);
        assert_eq!(config.beta_window, 60);
    }

    #[test]
    fn test_model_config_default() {
        let config = ModelConfig::default();
        assert_eq!(config.horizons, vec![1, 2, 3, 4, 5]);
        assert_eq!(config.quantiles, vec![0.025, 0.1, 0.5, 0.9, 0.975]);
        assert_eq!(config.price.n_estimators, 500);
        assert_eq!(config.price.max_depth, 6);
        assert_eq!(config.volume.n_estimators, 300);
        assert_eq!(config.volume.max_depth, 5);
        assert_eq!(config.volume.min_samples_leaf, 5);
    }

    #[test]
    fn test_validation_config_defaults() {
        let config: ValidationConfig = toml::from_str("").unwrap();
        assert_eq!(config.initial_train_size, 1260);
        assert_eq!(config.step_size, 5);
        assert!(config.max_splits.is_none());
        assert_eq!(config.window, WindowMode::Expanding);
        assert_eq!(config.strategy, BacktestStrategy::LongOnly);
        assert_eq!(config.transaction_cost, 0.001);
    }

    #[test]
    fn test_validation_config_deserialize() {
        let toml_str = r#"
initial_train_size = 500
step_size = 10
max_splits = 4
window = "rolling"
strategy = "long_short"
"#;
        let config: ValidationConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.initial_train_size, 500);
        assert_eq!(config.step_size, 10);
        assert_eq!(config.max_splits, Some(4));
        assert_eq!(config.window, WindowMode::Rolling);
        assert_eq!(config.strategy, BacktestStrategy::LongShort);
    }

    #[test]
    fn test_boosting_config_partial() {
        let toml_str = r#"
n_estimators = 50
learning_rate = 0.1
"#;
        let config: BoostingConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.n_estimators, 50);
        assert_eq!(config.learning_rate, 0.1);
        assert_eq!(config.subsample, 0.8);
        assert_eq!(config.seed, 42);
    }

    #[test]
    fn test_data_config_defaults() {
        let config: DataConfig = toml::from_str(r#"price_files = ["histo_2023.csv"]"#).unwrap();
        assert_eq!(config.price_files, vec!["histo_2023.csv".to_string()]);
        assert!(config.dividend_files.is_empty());
        assert_eq!(config.market_index, "TUNINDEX");
        assert_eq!(config.outlier_threshold, 10.0);
        assert_eq!(config.max_gap_days, 7);
    }

    #[test]
    fn test_data_config_resolve() {
        let config = DataConfig {
            raw_dir: "/srv/bvmt/raw".to_string(),
            ..Default::default()
        };
        assert_eq!(
            config.resolve("histo.csv"),
            std::path::PathBuf::from("/srv/bvmt/raw/histo.csv")
        );
        assert_eq!(
            config.resolve("/tmp/other.csv"),
            std::path::PathBuf::from("/tmp/other.csv")
        );
    }

    #[test]
    fn test_api_config_defaults() {
        let config: ApiConfig = toml::from_str("port = 9000").unwrap();
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 9000);
        assert_eq!(config.history_days, 30);
    }

    #[test]
    fn test_full_config_from_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
[models]
horizons = [1, 3]
models_dir = "/tmp/bvmt-models"

[models.price]
n_estimators = 20

[logging]
level = "debug"
"#
        )
        .unwrap();

        let config = Config::load(file.path().to_str().unwrap()).unwrap();
        assert_eq!(config.models.horizons, vec![1, 3]);
        assert_eq!(config.models.price.n_estimators, 20);
        assert_eq!(config.models.volume.n_estimators, 300);
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.features.rsi_period, 14);
    }

    #[test]
    fn test_config_rejects_bad_horizon() {
        let mut config = Config::default();
        config.models.horizons = vec![1, 7];
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_requires_core_quantiles() {
        let mut config = Config::default();
        config.models.quantiles = vec![0.1, 0.9];
        assert!(config.validate().is_err());

        config.models.quantiles = vec![0.1, 0.5, 0.9];
        assert!(config.validate().is_ok());
    }
}
