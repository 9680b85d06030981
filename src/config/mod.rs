pub mod settings;

pub use settings::*;

use config::{Config, Environment, File};
use std::path::Path;
use tracing::{debug, info};

use crate::error::{ForecastError, Result};

/// Load the training configuration.
///
/// Layering, lowest precedence first: built-in defaults, the TOML file at
/// `path` (optional when it does not exist), `FORECASTER__*` environment
/// variables, then the `POSTGRES_*` connection variables used by the
/// deployment containers. A `.env` file is honoured if present.
pub fn load_config(path: &Path) -> Result<TrainingConfig> {
    if dotenvy::dotenv().is_ok() {
        debug!("Loaded environment from .env");
    }

    let builder = Config::builder()
        .add_source(File::from(path).required(false))
        .add_source(
            Environment::with_prefix("FORECASTER")
                .prefix_separator("__")
                .separator("__"),
        )
        .set_override_option("host", std::env::var("POSTGRES_SERVER").ok())
        .and_then(|b| b.set_override_option("port", std::env::var("POSTGRES_PORT").ok()))
        .and_then(|b| b.set_override_option("database", std::env::var("POSTGRES_DB").ok()))
        .and_then(|b| b.set_override_option("user", std::env::var("POSTGRES_USER").ok()))
        .and_then(|b| b.set_override_option("password", std::env::var("POSTGRES_PASSWORD").ok()))
        .map_err(config_error)?;

    let config: TrainingConfig = builder
        .build()
        .map_err(config_error)?
        .try_deserialize()
        .map_err(config_error)?;

    config
        .validate()
        .map_err(|errors| ForecastError::InvalidConfig(errors.join(", ")))?;

    info!(
        "Configuration loaded: db={}@{}:{}/{}, output={}, jobs={}",
        config.user,
        config.host,
        config.port,
        config.database,
        config.output_dir.display(),
        config.job_count
    );
    Ok(config)
}

/// Render a configuration as TOML, e.g. to seed a fresh `config.toml`
pub fn render_config(config: &TrainingConfig) -> Result<String> {
    toml::to_string_pretty(config).map_err(|e| ForecastError::InvalidConfig(e.to_string()))
}

fn config_error(e: config::ConfigError) -> ForecastError {
    ForecastError::InvalidConfig(e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_missing_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = load_config(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config.target.horizon, 5);
        assert_eq!(config.features.sma_windows, vec![10, 20, 50]);
    }

    #[test]
    fn test_file_values_override_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(
            file,
            r#"
job_count = 2
output_dir = "/tmp/artifacts"

[target]
kind = "classification"
horizon = 12

[features]
return_lags = [1, 3, 6, 12]
"#
        )
        .unwrap();

        let config = load_config(&path).unwrap();
        assert_eq!(config.job_count, 2);
        assert_eq!(config.target.kind, TargetKind::Classification);
        assert_eq!(config.target.horizon, 12);
        assert_eq!(config.features.return_lags, vec![1, 3, 6, 12]);
        // untouched nested defaults survive
        assert_eq!(config.features.rsi_period, 14);
        assert_eq!(config.dataset.split_quantile, 0.8);
    }

    #[test]
    fn test_invalid_file_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "job_count = 0\n").unwrap();
        let err = load_config(&path).unwrap_err();
        assert!(matches!(err, ForecastError::InvalidConfig(_)));
    }

    #[test]
    fn test_rendered_config_loads_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let mut original = TrainingConfig::default();
        original.target.horizon = 9;
        std::fs::write(&path, render_config(&original).unwrap()).unwrap();
        let loaded = load_config(&path).unwrap();
        assert_eq!(loaded.target.horizon, 9);
        assert_eq!(loaded.features, original.features);
    }
}
