//! BVMT Stock Forecaster
//!
//! Command-line entry point: ingestion, feature building, training,
//! walk-forward validation, one-off predictions and the HTTP API.

use std::sync::Arc;

use anyhow::Context;
use bvmt_forecaster::{
    api::{self, AppState},
    config::{expand_path, Config},
    data,
    features::{load_parquet, save_parquet, FeaturePipeline},
    models::{store::VALIDATION_FILE, ModelTrainer},
    service::{default_horizons, PredictionService},
    validation::WalkForwardValidator,
};
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(name = "bvmt-forecaster")]
#[command(about = "Multi-horizon price and volume forecasts for BVMT stocks")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file path
    #[arg(short, long, default_value = "config.toml")]
    config: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Load raw quotations and dividends, validate and adjust them
    Ingest,
    /// Build the feature matrix from ingested data
    Features,
    /// Train quantile price and volume models
    Train,
    /// Run walk-forward validation and the backtest
    Validate,
    /// Forecast one symbol from the stored models
    Predict {
        symbol: String,
        /// Comma-separated horizons in trading days
        #[arg(long, value_delimiter = ',')]
        horizons: Vec<usize>,
        /// Print the raw JSON result
        #[arg(long)]
        json: bool,
    },
    /// Start the HTTP API
    Serve {
        #[arg(long)]
        host: Option<String>,
        #[arg(short, long)]
        port: Option<u16>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let mut config = Config::load(&cli.config)
        .with_context(|| format!("loading configuration from {}", cli.config))?;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.logging.level));
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(filter)
        .init();

    match cli.command {
        Commands::Ingest => ingest(&config),
        Commands::Features => build_features(&config),
        Commands::Train => train(&config),
        Commands::Validate => validate(&config),
        Commands::Predict { symbol, horizons, json } => predict(&config, &symbol, horizons, json),
        Commands::Serve { host, port } => {
            if let Some(host) = host {
                config.api.host = host;
            }
            if let Some(port) = port {
                config.api.port = port;
            }
            serve(config).await
        }
    }
}

fn ingest(config: &Config) -> anyhow::Result<()> {
    let market = data::ingest(&config.data)?;
    let dir = expand_path(&config.data.processed_dir);
    market.save(&dir)?;

    let report = &market.report;
    println!("\n📥 Ingestion complete\n");
    println!("Symbols:          {}", market.symbols().len());
    println!("Bars:             {}", market.bars.len());
    println!("Index points:     {}", market.index.len());
    println!("Quality issues:   {}", report.issues.len());
    println!("Rows excluded:    {}", report.summary.excluded_rows);
    println!("Dividend-adjusted symbols: {}", market.summary.symbols_adjusted);
    Ok(())
}

fn build_features(config: &Config) -> anyhow::Result<()> {
    let dir = expand_path(&config.data.processed_dir);
    let (bars, index) = data::load_processed(&dir).context("run `ingest` first")?;
    let frame = FeaturePipeline::new(&config.features).transform(&bars, &index)?;
    let path = config.data.processed_path(&config.features.output_file);
    save_parquet(&frame, &path)?;

    println!("\n🧮 Features written to {}\n", path.display());
    println!("Rows:     {}", frame.len());
    println!("Columns:  {}", frame.names.len());
    println!("Symbols:  {}", frame.symbols().len());
    Ok(())
}

fn train(config: &Config) -> anyhow::Result<()> {
    let path = config.data.processed_path(&config.features.output_file);
    let frame = load_parquet(&path).context("run `features` first")?;
    let models = ModelTrainer::new(config.models.clone()).train(&frame)?;
    let dir = config.models.models_path();
    models.save(&dir)?;

    println!("\n🎯 Models saved to {}\n", dir.display());
    print_metrics_header();
    for m in &models.manifest.evaluation {
        print_metrics_row(m);
    }
    Ok(())
}

fn validate(config: &Config) -> anyhow::Result<()> {
    let path = config.data.processed_path(&config.features.output_file);
    let frame = load_parquet(&path).context("run `features` first")?;
    let report = WalkForwardValidator::new(config.validation.clone()).run(&frame, &config.models)?;
    let out = config.models.models_path().join(VALIDATION_FILE);
    std::fs::create_dir_all(config.models.models_path())?;
    report.save(&out)?;

    println!(
        "\n🔁 Walk-forward: {} of {} fold/horizon pairs evaluated\n",
        report.evaluated_folds(),
        report.folds.len()
    );
    print_metrics_header();
    for m in &report.metrics {
        print_metrics_row(m);
    }
    if let Some(bt) = &report.backtest {
        println!("\nBacktest ({:?}, {} observations)", bt.strategy, bt.observations);
        println!("Total return:      {:>8.2}%", bt.total_return * 100.0);
        println!("Annualized return: {:>8.2}%", bt.annualized_return * 100.0);
        println!("Sharpe ratio:      {:>8.2}", bt.sharpe_ratio);
        println!("Max drawdown:      {:>8.2}%", bt.max_drawdown * 100.0);
        println!("Win rate:          {:>8.1}%", bt.win_rate * 100.0);
        println!("Trades:            {:>8.0}", bt.num_trades);
    }
    Ok(())
}

fn predict(config: &Config, symbol: &str, horizons: Vec<usize>, json: bool) -> anyhow::Result<()> {
    let horizons = if horizons.is_empty() { default_horizons() } else { horizons };
    let service = PredictionService::load(config);
    let result = service.predict(symbol, &horizons)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
        return Ok(());
    }

    println!(
        "\n📈 {} close {:.3} TND on {}\n",
        result.symbol, result.current_price, result.current_date
    );
    println!(
        "{:>3} {:>12} {:>10} {:>21} {:>21} {:>10}",
        "h", "Date", "Median", "80% CI", "95% CI", "Liquidity"
    );
    println!("{}", "-".repeat(82));
    for f in &result.forecasts {
        println!(
            "{:>3} {:>12} {:>10.3} {:>10.3}-{:<10.3} {:>10.3}-{:<10.3} {:>10}",
            f.horizon,
            f.target_date.to_string(),
            f.predicted_price,
            f.ci_80.lower,
            f.ci_80.upper,
            f.ci_95.lower,
            f.ci_95.upper,
            f.liquidity_regime.map(|r| r.to_string()).unwrap_or_else(|| "-".to_string())
        );
    }
    Ok(())
}

async fn serve(config: Config) -> anyhow::Result<()> {
    let service = PredictionService::load(&config);
    let state = Arc::new(AppState::new(config, service));
    api::serve(state).await?;
    Ok(())
}

fn print_metrics_header() {
    println!(
        "{:>3} {:>6} {:>9} {:>9} {:>8} {:>8} {:>8}",
        "h", "n", "RMSE", "MAE", "Dir %", "Cov80", "Cov95"
    );
    println!("{}", "-".repeat(57));
}

fn print_metrics_row(m: &bvmt_forecaster::validation::ForecastMetrics) {
    println!(
        "{:>3} {:>6} {:>9.5} {:>9.5} {:>8.1} {:>8.1} {:>8.1}",
        m.horizon,
        m.samples,
        m.rmse,
        m.mae,
        m.directional_accuracy * 100.0,
        m.coverage_80 * 100.0,
        m.coverage_95 * 100.0
    );
}
