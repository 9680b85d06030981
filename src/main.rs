use anyhow::{anyhow, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use stock_forecaster::config::{load_config, render_config, TargetKind, TrainingConfig};
use stock_forecaster::database::open_store;
use stock_forecaster::ml::{EvaluationMetrics, ModelArtifacts, ModelHandle, PredictionOutput};
use stock_forecaster::pipeline::{check_freshness, run_training};

#[derive(Parser)]
#[command(name = "stock-forecaster")]
#[command(version)]
#[command(about = "Train and serve a global gradient-boosted stock forecaster", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file path
    #[arg(short, long, default_value = "config.toml")]
    config: PathBuf,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long)]
    json_logs: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the dataset, train and write artifacts
    Train {
        /// regression or classification
        #[arg(short, long)]
        target: Option<TargetKind>,
        /// Bars ahead for the target
        #[arg(long)]
        horizon: Option<usize>,
        /// Artifact directory
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Worker threads for tree building
        #[arg(short, long)]
        jobs: Option<usize>,
        /// Randomized search candidates (0 disables)
        #[arg(long)]
        search_iter: Option<usize>,
        /// Copy existing artifacts here before overwriting
        #[arg(long)]
        backup_dir: Option<PathBuf>,
        /// Add market-relative features
        #[arg(long)]
        market_features: bool,
        /// Train even if the data freshness check fails
        #[arg(long)]
        skip_check: bool,
    },
    /// Predict the next move of one asset from stored bars
    Predict {
        /// Asset symbol
        symbol: String,
        /// Artifact directory (defaults to output_dir)
        #[arg(short, long)]
        artifacts: Option<PathBuf>,
    },
    /// Validate that the bar store is fresh enough to train on
    CheckData,
    /// Print metadata of a trained model
    Inspect {
        /// Artifact directory (defaults to output_dir)
        #[arg(short, long)]
        artifacts: Option<PathBuf>,
    },
    /// Write the effective configuration as TOML
    InitConfig {
        /// Destination file
        #[arg(short, long, default_value = "config.toml")]
        output: PathBuf,
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging; RUST_LOG wins over --verbose
    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    if cli.json_logs {
        let subscriber = FmtSubscriber::builder()
            .with_env_filter(filter)
            .json()
            .with_target(false)
            .finish();
        tracing::subscriber::set_global_default(subscriber)?;
    } else {
        let subscriber = FmtSubscriber::builder()
            .with_env_filter(filter)
            .with_target(false)
            .with_thread_ids(false)
            .with_file(false)
            .with_line_number(false)
            .finish();
        tracing::subscriber::set_global_default(subscriber)?;
    }

    info!("Stock Forecaster v{}", env!("CARGO_PKG_VERSION"));
    let config = load_config(&cli.config)?;

    match cli.command {
        Commands::Train {
            target,
            horizon,
            output,
            jobs,
            search_iter,
            backup_dir,
            market_features,
            skip_check,
        } => {
            let config = TrainingOverrides {
                target,
                horizon,
                output,
                jobs,
                search_iter,
                backup_dir,
                market_features,
            }
            .apply(config)?;
            train(&config, skip_check).await?;
        }
        Commands::Predict { symbol, artifacts } => {
            let dir = artifacts.unwrap_or_else(|| config.output_dir.clone());
            predict(&config, &dir, &symbol).await?;
        }
        Commands::CheckData => {
            let store = open_store(&config).await?;
            let report = check_freshness(store.as_ref(), &config, Utc::now()).await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
            if !report.is_fresh() {
                return Err(anyhow!("data check failed: {}", report.problems.join("; ")));
            }
        }
        Commands::Inspect { artifacts } => {
            let dir = artifacts.unwrap_or_else(|| config.output_dir.clone());
            inspect(&dir)?;
        }
        Commands::InitConfig { output, force } => {
            if output.exists() && !force {
                return Err(anyhow!("{} exists, pass --force to overwrite", output.display()));
            }
            std::fs::write(&output, render_config(&config)?)?;
            info!("Wrote configuration to {}", output.display());
        }
    }

    Ok(())
}

/// Command-line values layered over the loaded configuration
struct TrainingOverrides {
    target: Option<TargetKind>,
    horizon: Option<usize>,
    output: Option<PathBuf>,
    jobs: Option<usize>,
    search_iter: Option<usize>,
    backup_dir: Option<PathBuf>,
    market_features: bool,
}

impl TrainingOverrides {
    fn apply(self, mut config: TrainingConfig) -> Result<TrainingConfig> {
        // unset [model] fields follow the new target's defaults
        if let Some(kind) = self.target {
            config.target.kind = kind;
        }
        if let Some(horizon) = self.horizon {
            config.target.horizon = horizon;
        }
        if let Some(output) = self.output {
            config.output_dir = output;
        }
        if let Some(jobs) = self.jobs {
            config.job_count = jobs;
        }
        if let Some(iterations) = self.search_iter {
            config.search.iterations = iterations;
        }
        if self.backup_dir.is_some() {
            config.backup_dir = self.backup_dir;
        }
        if self.market_features {
            config.features.market_features = true;
        }
        config
            .validate()
            .map_err(|errors| anyhow!("invalid configuration: {}", errors.join(", ")))?;
        Ok(config)
    }
}

async fn train(config: &TrainingConfig, skip_check: bool) -> Result<()> {
    info!("═══════════════════════════════════════════════════");
    info!("Global Model Training");
    info!("═══════════════════════════════════════════════════");
    info!("Target: {} (horizon {})", config.target.kind.as_str(), config.target.horizon);
    info!("Output: {}", config.output_dir.display());

    let store = open_store(config).await?;

    let report = check_freshness(store.as_ref(), config, Utc::now()).await?;
    if !report.is_fresh() {
        if skip_check {
            warn!("Data check failed, continuing because --skip-check was given");
        } else {
            return Err(anyhow!("data check failed: {}", report.problems.join("; ")));
        }
    }

    let summary = run_training(store.as_ref(), config, Utc::now()).await?;

    info!("═══════════════════════════════════════════════════");
    info!("✓ Model {} saved to {}", summary.model_version, summary.output_dir.display());
    info!(
        "  {} assets ({} skipped), {} train / {} test rows",
        summary.assets_trained, summary.assets_skipped, summary.train_rows, summary.test_rows
    );
    info!("  Best iteration: {}", summary.best_iteration);
    info!("  Test: {}", summary.metrics.headline());
    if let Some(backup) = &summary.backup {
        info!("  Previous model backed up to {}", backup.display());
    }
    Ok(())
}

async fn predict(config: &TrainingConfig, dir: &Path, symbol: &str) -> Result<()> {
    let store = open_store(config).await?;
    let handle = ModelHandle::new(dir);
    let prediction = handle.predict_from_store(store.as_ref(), symbol).await?;

    match &prediction.output {
        PredictionOutput::Return {
            predicted_return,
            predicted_price,
        } => info!(
            "{}: {:+.3}% over {} bars -> {:.2} (from {:.2})",
            prediction.symbol,
            predicted_return * 100.0,
            prediction.horizon,
            predicted_price,
            prediction.current_price
        ),
        PredictionOutput::Direction {
            direction,
            probabilities,
        } => info!(
            "{}: {} over {} bars (down {:.1}%, neutral {:.1}%, up {:.1}%)",
            prediction.symbol,
            direction.as_str(),
            prediction.horizon,
            probabilities[0] * 100.0,
            probabilities[1] * 100.0,
            probabilities[2] * 100.0
        ),
    }
    println!("{}", serde_json::to_string_pretty(&prediction)?);
    Ok(())
}

fn inspect(dir: &Path) -> Result<()> {
    let artifacts = ModelArtifacts::load(dir)?;
    let meta = &artifacts.metadata;

    println!("Model:        {}", meta.model_version());
    println!("Trained:      {}", meta.training_date.format("%Y-%m-%d %H:%M:%S UTC"));
    println!("Target:       {} (horizon {})", meta.target.kind.as_str(), meta.target.horizon);
    println!("Split cutoff: {}", meta.split_cutoff.format("%Y-%m-%d"));
    println!("Samples:      {} train / {} test", meta.train_samples, meta.test_samples);
    println!(
        "Assets:       {} trained, {} skipped",
        meta.assets_trained.len(),
        meta.assets_skipped.len()
    );
    println!(
        "Rounds:       {} (best iteration {})",
        artifacts.model.n_rounds(),
        meta.best_iteration
    );
    match &meta.metrics {
        EvaluationMetrics::Regression(m) => println!(
            "Test:         RMSE {:.6}, MAE {:.6}, direction {:.1}%",
            m.rmse,
            m.mae,
            m.directional_accuracy * 100.0
        ),
        EvaluationMetrics::Classification(m) => {
            println!("Test:         accuracy {:.1}%", m.accuracy * 100.0);
            for report in &m.per_class {
                println!(
                    "  {:<8} precision {:.3} recall {:.3} f1 {:.3} (n={})",
                    report.class.as_str(),
                    report.precision,
                    report.recall,
                    report.f1,
                    report.support
                );
            }
        }
    }

    let mut ranked: Vec<(&String, f64)> = artifacts
        .feature_names
        .iter()
        .zip(meta.feature_importance.iter().copied())
        .collect();
    ranked.sort_by(|a, b| b.1.total_cmp(&a.1));
    println!("Top features:");
    for (name, importance) in ranked.iter().take(10) {
        println!("  {:<16} {:.4}", name, importance);
    }
    Ok(())
}
