use super::{RollingWindow, EPSILON};

/// Relative strength index over simple rolling means of gains and losses.
///
/// The first value is produced once `period` one-bar changes are available,
/// i.e. on the `period + 1`-th price.
#[derive(Debug, Clone)]
pub struct RSI {
    prev_price: Option<f64>,
    gains: RollingWindow,
    losses: RollingWindow,
    value: Option<f64>,
}

impl RSI {
    pub fn new(period: usize) -> Self {
        Self {
            prev_price: None,
            gains: RollingWindow::new(period),
            losses: RollingWindow::new(period),
            value: None,
        }
    }

    pub fn update(&mut self, price: f64) -> Option<f64> {
        if let Some(prev) = self.prev_price {
            let change = price - prev;
            self.gains.push(change.max(0.0));
            self.losses.push((-change).max(0.0));

            if let (Some(avg_gain), Some(avg_loss)) = (self.gains.mean(), self.losses.mean()) {
                self.value = Some(rsi_from_averages(avg_gain, avg_loss));
            }
        }

        self.prev_price = Some(price);
        self.value
    }
}

/// `100 - 100 / (1 + gain / (loss + eps))`
pub fn rsi_from_averages(avg_gain: f64, avg_loss: f64) -> f64 {
    let rs = avg_gain / (avg_loss + EPSILON);
    100.0 - 100.0 / (1.0 + rs)
}

pub fn rsi_series(closes: &[f64], period: usize) -> Vec<f64> {
    let mut rsi = RSI::new(period);
    closes
        .iter()
        .map(|c| rsi.update(*c).unwrap_or(f64::NAN))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::fixtures::random_walk_series;

    #[test]
    fn test_rsi_warmup_length() {
        let closes: Vec<f64> = (0..20).map(|i| 100.0 + i as f64).collect();
        let rsi = rsi_series(&closes, 14);
        assert!(rsi[..14].iter().all(|v| v.is_nan()));
        assert!(rsi[14].is_finite());
    }

    #[test]
    fn test_rsi_only_gains_near_100() {
        let closes: Vec<f64> = (0..30).map(|i| 50.0 + i as f64).collect();
        let rsi = rsi_series(&closes, 14);
        assert!(rsi[29] > 99.99 && rsi[29] <= 100.0);
    }

    #[test]
    fn test_rsi_only_losses_is_zero() {
        let closes: Vec<f64> = (0..30).map(|i| 100.0 - i as f64).collect();
        let rsi = rsi_series(&closes, 14);
        assert!(rsi[29].abs() < 1e-9);
    }

    #[test]
    fn test_rsi_bounded_for_positive_prices() {
        for seed in 0..5 {
            let series = random_walk_series("rw", 500, seed);
            let rsi = rsi_series(&series.closes(), 14);
            for value in rsi.iter().filter(|v| !v.is_nan()) {
                assert!((0.0..=100.0).contains(value), "rsi out of range: {}", value);
            }
        }
    }

    #[test]
    fn test_rsi_known_value() {
        // 14 changes: 7 gains of 1, 7 losses of 1 -> RSI 50
        let mut closes = vec![100.0];
        for i in 0..14 {
            let last = *closes.last().unwrap();
            closes.push(if i % 2 == 0 { last + 1.0 } else { last - 1.0 });
        }
        let rsi = rsi_series(&closes, 14);
        assert!((rsi[14] - 50.0).abs() < 1e-4);
    }
}
