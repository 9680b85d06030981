//! Global stock-movement forecaster: technical features over many assets,
//! one chronological split, a gradient-boosted model and its artifacts.

pub mod config;
pub mod database;
pub mod error;
pub mod indicators;
pub mod ml;
pub mod pipeline;
pub mod types;

pub use error::{ForecastError, Result};
