//! Rolling technical indicators over a single asset's series.
//!
//! Windowed indicators are small streaming structs whose `update` returns
//! `None` until the window is fully populated. The `*_series` helpers map a
//! slice to an aligned vector with `NaN` in the warm-up positions; those rows
//! are discarded downstream, never imputed.

pub mod ema;
pub mod rsi;
pub mod macd;
pub mod bollinger;
pub mod returns;
pub mod volume;

pub use ema::*;
pub use rsi::*;
pub use macd::*;
pub use bollinger::*;
pub use returns::*;
pub use volume::*;

use std::collections::VecDeque;

/// Guards denominators that can legitimately reach zero
pub const EPSILON: f64 = 1e-8;

/// Fixed-length window over the most recent values
#[derive(Debug, Clone)]
pub struct RollingWindow {
    period: usize,
    values: VecDeque<f64>,
}

impl RollingWindow {
    pub fn new(period: usize) -> Self {
        Self {
            period,
            values: VecDeque::with_capacity(period),
        }
    }

    pub fn push(&mut self, value: f64) {
        self.values.push_back(value);
        if self.values.len() > self.period {
            self.values.pop_front();
        }
    }

    pub fn is_full(&self) -> bool {
        self.values.len() == self.period
    }

    pub fn mean(&self) -> Option<f64> {
        if !self.is_full() {
            return None;
        }
        Some(self.values.iter().sum::<f64>() / self.period as f64)
    }

    /// Sample standard deviation (n - 1 denominator)
    pub fn std(&self) -> Option<f64> {
        if !self.is_full() || self.period < 2 {
            return None;
        }
        let mean = self.mean()?;
        let variance = self
            .values
            .iter()
            .map(|v| (v - mean).powi(2))
            .sum::<f64>()
            / (self.period - 1) as f64;
        Some(variance.sqrt())
    }

    pub fn clear(&mut self) {
        self.values.clear();
    }
}

/// Simple moving average, `NaN` for the first `period - 1` positions
pub fn sma_series(values: &[f64], period: usize) -> Vec<f64> {
    let mut window = RollingWindow::new(period);
    values
        .iter()
        .map(|v| {
            window.push(*v);
            window.mean().unwrap_or(f64::NAN)
        })
        .collect()
}

/// Rolling sample standard deviation. A `NaN` input restarts the window.
pub fn rolling_std_series(values: &[f64], period: usize) -> Vec<f64> {
    let mut window = RollingWindow::new(period);
    values
        .iter()
        .map(|v| {
            if v.is_nan() {
                window.clear();
                return f64::NAN;
            }
            window.push(*v);
            window.std().unwrap_or(f64::NAN)
        })
        .collect()
}

/// `close / sma - 1` for each window length
pub fn sma_distance_series(closes: &[f64], period: usize) -> Vec<f64> {
    sma_series(closes, period)
        .iter()
        .zip(closes)
        .map(|(sma, close)| close / sma - 1.0)
        .collect()
}
