use chrono::{DateTime, Datelike, Utc};
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::config::{FeatureConfig, TargetKind, TargetSettings};
use crate::error::{ForecastError, Result};
use crate::indicators::{
    bollinger_series, forward_return, macd_series, pct_change, rsi_series, sma_distance_series,
    volatility_series, volume_ratio_series,
};
use crate::types::BarSeries;

/// Direction bucket of a forward return
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Direction {
    Down = 0,
    Neutral = 1,
    Up = 2,
}

impl Direction {
    pub const ALL: [Direction; 3] = [Direction::Down, Direction::Neutral, Direction::Up];

    pub fn from_return(forward: f64, target: &TargetSettings) -> Self {
        if forward > target.up_threshold {
            Direction::Up
        } else if forward < target.down_threshold {
            Direction::Down
        } else {
            Direction::Neutral
        }
    }

    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    pub fn label(self) -> f64 {
        self as usize as f64
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Down => "DOWN",
            Direction::Neutral => "NEUTRAL",
            Direction::Up => "UP",
        }
    }
}

/// Ordered feature column names for a configuration.
///
/// The asset code always comes first; the order here is the order of every
/// feature row and of `feature_names.json`.
pub fn feature_names(config: &FeatureConfig) -> Vec<String> {
    let mut names = vec!["ticker_id".to_string()];
    names.extend(config.return_lags.iter().map(|lag| format!("ret_{}", lag)));
    names.extend(config.sma_windows.iter().map(|w| format!("dist_sma_{}", w)));
    names.extend(
        ["rsi", "macd", "macd_signal", "macd_diff", "bb_width", "bb_position"]
            .iter()
            .map(|s| s.to_string()),
    );
    names.push(format!("volatility_{}", config.volatility_window));
    names.push("vol_ratio".to_string());
    if config.calendar_features {
        names.push("dayofweek".to_string());
        names.push("month".to_string());
    }
    if config.market_features {
        let w = momentum_window(config);
        names.push("market_ret_1".to_string());
        names.push(format!("market_ret_{}", w));
        names.push(format!("rel_strength_{}", w));
    }
    names
}

/// Leading rows of every series that cannot have a complete feature row
pub fn warmup_period(config: &FeatureConfig) -> usize {
    let max_lag = config.return_lags.iter().copied().max().unwrap_or(0);
    let max_sma = config.sma_windows.iter().copied().max().unwrap_or(1);
    [
        max_lag,
        max_sma.saturating_sub(1),
        config.rsi_period,
        config.bollinger_window - 1,
        config.volatility_window,
        config.volume_window - 1,
    ]
    .into_iter()
    .max()
    .unwrap_or(0)
}

fn momentum_window(config: &FeatureConfig) -> usize {
    config.return_lags.iter().copied().max().unwrap_or(1)
}

/// Row-major feature table with aligned targets and timestamps
#[derive(Debug, Clone, Default)]
pub struct FeatureFrame {
    columns: Vec<String>,
    values: Vec<f64>,
    targets: Vec<f64>,
    timestamps: Vec<DateTime<Utc>>,
}

impl FeatureFrame {
    pub fn new(columns: Vec<String>) -> Self {
        Self {
            columns,
            ..Self::default()
        }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn n_rows(&self) -> usize {
        self.targets.len()
    }

    pub fn n_cols(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    pub fn row(&self, i: usize) -> &[f64] {
        let n = self.n_cols();
        &self.values[i * n..(i + 1) * n]
    }

    pub fn targets(&self) -> &[f64] {
        &self.targets
    }

    pub fn timestamps(&self) -> &[DateTime<Utc>] {
        &self.timestamps
    }

    pub fn push_row(&mut self, values: &[f64], target: f64, timestamp: DateTime<Utc>) {
        debug_assert_eq!(values.len(), self.n_cols());
        self.values.extend_from_slice(values);
        self.targets.push(target);
        self.timestamps.push(timestamp);
    }

    /// Drop every row whose features or target are not finite
    pub fn discard_incomplete(self) -> Self {
        let keep: Vec<usize> = (0..self.n_rows())
            .filter(|&i| self.targets[i].is_finite() && self.row(i).iter().all(|v| v.is_finite()))
            .collect();
        self.select(&keep)
    }

    /// New frame holding `indices` in the given order
    pub fn select(&self, indices: &[usize]) -> Self {
        let mut out = FeatureFrame::new(self.columns.clone());
        out.values.reserve(indices.len() * self.n_cols());
        for &i in indices {
            out.push_row(self.row(i), self.targets[i], self.timestamps[i]);
        }
        out
    }

    pub fn append(&mut self, other: FeatureFrame) -> Result<()> {
        if self.columns != other.columns {
            return Err(ForecastError::FeatureMismatch(format!(
                "cannot append frame with columns {:?} to {:?}",
                other.columns, self.columns
            )));
        }
        self.values.extend(other.values);
        self.targets.extend(other.targets);
        self.timestamps.extend(other.timestamps);
        Ok(())
    }

    pub fn to_array(&self) -> Array2<f64> {
        Array2::from_shape_vec((self.n_rows(), self.n_cols()), self.values.clone())
            .unwrap_or_else(|_| Array2::zeros((0, self.n_cols())))
    }
}

/// Market index returns keyed by timestamp, left-joined onto each asset
#[derive(Debug, Clone, Default)]
pub struct MarketContext {
    returns: HashMap<DateTime<Utc>, (f64, f64)>,
}

impl MarketContext {
    pub fn from_series(series: &BarSeries, config: &FeatureConfig) -> Self {
        let closes = series.closes();
        let short = pct_change(&closes, 1);
        let long = pct_change(&closes, momentum_window(config));
        let returns = series
            .timestamps()
            .into_iter()
            .zip(short.into_iter().zip(long))
            .collect();
        Self { returns }
    }

    pub fn len(&self) -> usize {
        self.returns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.returns.is_empty()
    }

    fn at(&self, ts: &DateTime<Utc>) -> (f64, f64) {
        self.returns.get(ts).copied().unwrap_or((f64::NAN, f64::NAN))
    }
}

/// Most recent complete feature row of one asset
#[derive(Debug, Clone)]
pub struct LatestFeatures {
    pub values: Vec<f64>,
    pub timestamp: DateTime<Utc>,
    pub close: f64,
}

/// Turns one asset's bars into feature rows and targets
pub struct FeatureAssembler<'a> {
    features: &'a FeatureConfig,
    target: &'a TargetSettings,
    min_bars: usize,
}

impl<'a> FeatureAssembler<'a> {
    pub fn new(features: &'a FeatureConfig, target: &'a TargetSettings, min_bars: usize) -> Self {
        Self {
            features,
            target,
            min_bars,
        }
    }

    pub fn columns(&self) -> Vec<String> {
        feature_names(self.features)
    }

    /// Training rows: features at `t`, target from `t + horizon`.
    ///
    /// Warm-up rows and the final `horizon` rows are discarded, never filled.
    pub fn assemble(
        &self,
        series: &BarSeries,
        asset_code: usize,
        market: Option<&MarketContext>,
    ) -> Result<FeatureFrame> {
        if series.len() < self.min_bars {
            return Err(ForecastError::InsufficientData {
                symbol: series.symbol().to_string(),
                available: series.len(),
                required: self.min_bars,
            });
        }

        let columns = self.feature_columns(series, asset_code, market)?;
        let targets = self.target_column(&series.closes());
        let timestamps = series.timestamps();

        let mut frame = FeatureFrame::new(self.columns());
        let mut row = vec![0.0; columns.len()];
        for (i, ts) in timestamps.iter().enumerate() {
            for (slot, column) in row.iter_mut().zip(&columns) {
                *slot = column[i];
            }
            frame.push_row(&row, targets[i], *ts);
        }

        let frame = frame.discard_incomplete();
        if frame.is_empty() {
            return Err(ForecastError::InsufficientData {
                symbol: series.symbol().to_string(),
                available: series.len(),
                required: warmup_period(self.features) + self.target.horizon + 1,
            });
        }
        Ok(frame)
    }

    /// Inference row: the newest bar whose features are all populated
    pub fn latest_row(
        &self,
        series: &BarSeries,
        asset_code: usize,
        market: Option<&MarketContext>,
    ) -> Result<LatestFeatures> {
        let required = warmup_period(self.features) + 1;
        let insufficient = || ForecastError::InsufficientData {
            symbol: series.symbol().to_string(),
            available: series.len(),
            required,
        };
        if series.len() < required {
            return Err(insufficient());
        }

        let columns = self.feature_columns(series, asset_code, market)?;
        let i = (0..series.len())
            .rev()
            .find(|&i| columns.iter().all(|c| c[i].is_finite()))
            .ok_or_else(insufficient)?;
        let bar = &series.bars()[i];
        Ok(LatestFeatures {
            values: columns.iter().map(|c| c[i]).collect(),
            timestamp: bar.timestamp,
            close: bar.close,
        })
    }

    fn target_column(&self, closes: &[f64]) -> Vec<f64> {
        let forward = forward_return(closes, self.target.horizon);
        match self.target.kind {
            TargetKind::Regression => forward,
            TargetKind::Classification => forward
                .into_iter()
                .map(|r| {
                    if r.is_nan() {
                        f64::NAN
                    } else {
                        Direction::from_return(r, self.target).label()
                    }
                })
                .collect(),
        }
    }

    /// Column-major feature values in `feature_names` order
    fn feature_columns(
        &self,
        series: &BarSeries,
        asset_code: usize,
        market: Option<&MarketContext>,
    ) -> Result<Vec<Vec<f64>>> {
        let f = self.features;
        let n = series.len();
        let closes = series.closes();
        let timestamps = series.timestamps();

        let mut columns: Vec<Vec<f64>> = Vec::with_capacity(32);
        columns.push(vec![asset_code as f64; n]);

        let returns: Vec<Vec<f64>> = f
            .return_lags
            .iter()
            .map(|lag| pct_change(&closes, *lag))
            .collect();
        columns.extend(returns.iter().cloned());
        for w in &f.sma_windows {
            columns.push(sma_distance_series(&closes, *w));
        }

        columns.push(rsi_series(&closes, f.rsi_period));
        let macd = macd_series(&closes, f.macd_fast, f.macd_slow, f.macd_signal);
        columns.push(macd.macd);
        columns.push(macd.signal);
        columns.push(macd.histogram);
        let bands = bollinger_series(&closes, f.bollinger_window, f.bollinger_std);
        columns.push(bands.width);
        columns.push(bands.position);
        columns.push(volatility_series(&closes, f.volatility_window));
        columns.push(volume_ratio_series(&series.volumes(), f.volume_window));

        if f.calendar_features {
            columns.push(
                timestamps
                    .iter()
                    .map(|ts| ts.weekday().num_days_from_monday() as f64)
                    .collect(),
            );
            columns.push(timestamps.iter().map(|ts| ts.month() as f64).collect());
        }

        if f.market_features {
            let market = market.ok_or_else(|| {
                ForecastError::InvalidConfig(
                    "market features are enabled but no market series was loaded".to_string(),
                )
            })?;
            let lag = momentum_window(f);
            let asset_momentum = match f.return_lags.iter().position(|l| *l == lag) {
                Some(idx) => returns[idx].clone(),
                None => pct_change(&closes, lag),
            };
            let joined: Vec<(f64, f64)> = timestamps.iter().map(|ts| market.at(ts)).collect();
            columns.push(joined.iter().map(|(short, _)| *short).collect());
            columns.push(joined.iter().map(|(_, long)| *long).collect());
            columns.push(
                asset_momentum
                    .iter()
                    .zip(&joined)
                    .map(|(asset, (_, long))| asset - long)
                    .collect(),
            );
        }

        Ok(columns)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::fixtures::{day, linear_series, random_walk_series};
    use crate::types::{Bar, BarSeries};

    fn regression_target(horizon: usize) -> TargetSettings {
        TargetSettings {
            horizon,
            ..TargetSettings::default()
        }
    }

    #[test]
    fn test_default_layout() {
        let names = feature_names(&FeatureConfig::default());
        assert_eq!(names.len(), 18);
        assert_eq!(names[0], "ticker_id");
        assert_eq!(&names[1..5], &["ret_1", "ret_5", "ret_10", "ret_20"]);
        assert_eq!(names[5], "dist_sma_10");
        assert_eq!(names[17], "month");
        assert_eq!(warmup_period(&FeatureConfig::default()), 49);
    }

    #[test]
    fn test_row_count_and_alignment() {
        let features = FeatureConfig::default();
        let target = regression_target(5);
        let series = linear_series("aaa", 200, 100.0, 1.0);
        let frame = FeatureAssembler::new(&features, &target, 100)
            .assemble(&series, 3, None)
            .unwrap();

        assert_eq!(frame.n_rows(), 200 - 49 - 5);
        assert_eq!(frame.timestamps()[0], day(49));
        assert_eq!(*frame.timestamps().last().unwrap(), day(194));
        assert!(frame.row(0).iter().all(|v| v.is_finite()));
        assert_eq!(frame.row(0)[0], 3.0);

        // linear closes: forward return is exactly h / close
        for (i, ts) in frame.timestamps().iter().enumerate() {
            let t = (*ts - day(0)).num_days() as f64;
            assert!((frame.targets()[i] - 5.0 / (100.0 + t)).abs() < 1e-6);
        }
    }

    #[test]
    fn test_no_row_uses_future_closes() {
        let features = FeatureConfig::default();
        let target = regression_target(5);
        let assembler = FeatureAssembler::new(&features, &target, 100);
        let full = random_walk_series("aaa", 160, 11);
        let frame = assembler.assemble(&full, 0, None).unwrap();

        // recompute the row for one timestamp from the truncated history
        let cut = 120;
        let truncated = full.bars()[..=cut].to_vec();
        let latest = assembler
            .latest_row(&BarSeries::new("aaa", truncated), 0, None)
            .unwrap();
        let idx = frame
            .timestamps()
            .iter()
            .position(|ts| *ts == latest.timestamp)
            .unwrap();
        for (a, b) in frame.row(idx).iter().zip(&latest.values) {
            assert!((a - b).abs() < 1e-12);
        }
    }

    #[test]
    fn test_short_series_is_rejected() {
        let features = FeatureConfig::default();
        let target = regression_target(5);
        let series = linear_series("tiny", 80, 10.0, 0.1);
        let err = FeatureAssembler::new(&features, &target, 100)
            .assemble(&series, 0, None)
            .unwrap_err();
        assert!(matches!(
            err,
            ForecastError::InsufficientData { available: 80, required: 100, .. }
        ));
    }

    #[test]
    fn test_classification_labels() {
        let features = FeatureConfig::default();
        let target = TargetSettings {
            kind: TargetKind::Classification,
            horizon: 1,
            ..TargetSettings::default()
        };
        let series = random_walk_series("aaa", 300, 3);
        let frame = FeatureAssembler::new(&features, &target, 100)
            .assemble(&series, 0, None)
            .unwrap();
        assert!(frame.targets().iter().all(|y| [0.0, 1.0, 2.0].contains(y)));
        assert_eq!(Direction::from_return(0.004, &target), Direction::Up);
        assert_eq!(Direction::from_return(-0.004, &target), Direction::Down);
        assert_eq!(Direction::from_return(0.003, &target), Direction::Neutral);
    }

    #[test]
    fn test_rsi_bounded_and_calendar_values() {
        let features = FeatureConfig::default();
        let target = regression_target(5);
        let series = random_walk_series("aaa", 250, 8);
        let frame = FeatureAssembler::new(&features, &target, 100)
            .assemble(&series, 0, None)
            .unwrap();
        let rsi_col = frame.columns().iter().position(|c| c == "rsi").unwrap();
        let dow_col = frame.columns().iter().position(|c| c == "dayofweek").unwrap();
        for i in 0..frame.n_rows() {
            let row = frame.row(i);
            assert!((0.0..=100.0).contains(&row[rsi_col]));
            assert!((0.0..=6.0).contains(&row[dow_col]));
        }
    }

    #[test]
    fn test_market_join_leaves_gaps_out() {
        let features = FeatureConfig {
            market_features: true,
            ..FeatureConfig::default()
        };
        let target = regression_target(5);
        let asset = linear_series("aaa", 200, 100.0, 1.0);
        // market series missing the first 100 days
        let market_bars: Vec<Bar> = linear_series("spy", 200, 300.0, 0.5)
            .bars()
            .iter()
            .skip(100)
            .cloned()
            .collect();
        let market = MarketContext::from_series(&BarSeries::new("spy", market_bars), &features);
        let assembler = FeatureAssembler::new(&features, &target, 100);
        let frame = assembler.assemble(&asset, 0, Some(&market)).unwrap();

        assert_eq!(frame.n_cols(), 21);
        // market_ret_20 needs 20 prior market bars
        assert_eq!(frame.timestamps()[0], day(120));
        assert!(assembler.assemble(&asset, 0, None).is_err());
    }

    #[test]
    fn test_frame_append_checks_columns() {
        let mut a = FeatureFrame::new(vec!["x".to_string()]);
        a.push_row(&[1.0], 0.5, day(0));
        let mut b = FeatureFrame::new(vec!["x".to_string()]);
        b.push_row(&[f64::NAN], 0.5, day(1));
        b.push_row(&[2.0], f64::NAN, day(2));
        a.append(b).unwrap();
        assert_eq!(a.n_rows(), 3);
        assert_eq!(a.discard_incomplete().n_rows(), 1);
        assert!(FeatureFrame::new(vec!["y".to_string()])
            .append(FeatureFrame::new(vec!["x".to_string()]))
            .is_err());
    }
}
