use thiserror::Error;

pub type Result<T> = std::result::Result<T, ForecastError>;

/// Errors surfaced by the training and inference core
#[derive(Error, Debug)]
pub enum ForecastError {
    #[error("insufficient data for {symbol}: {available} bars, need {required}")]
    InsufficientData {
        symbol: String,
        available: usize,
        required: usize,
    },

    #[error("no asset produced usable feature rows")]
    EmptyDataset,

    #[error("storage error: {0}")]
    Storage(#[from] sqlx::Error),

    #[error("artifact i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("feature mismatch: {0}")]
    FeatureMismatch(String),

    #[error("unknown asset: {0}")]
    UnknownAsset(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("training failed: {0}")]
    Training(String),
}

