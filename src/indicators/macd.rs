use super::ema::ema_series;

/// Aligned MACD columns
#[derive(Debug, Clone)]
pub struct MACDSeries {
    pub macd: Vec<f64>,
    pub signal: Vec<f64>,
    pub histogram: Vec<f64>,
}

/// `EMA(fast) - EMA(slow)`, its `EMA(signal)` and the difference of the two.
/// Every EMA starts at the first value, so there is no warm-up gap.
pub fn macd_series(closes: &[f64], fast: usize, slow: usize, signal: usize) -> MACDSeries {
    let fast_ema = ema_series(closes, fast);
    let slow_ema = ema_series(closes, slow);
    let macd: Vec<f64> = fast_ema.iter().zip(&slow_ema).map(|(f, s)| f - s).collect();
    let signal = ema_series(&macd, signal);
    let histogram = macd.iter().zip(&signal).map(|(m, s)| m - s).collect();

    MACDSeries {
        macd,
        signal,
        histogram,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reference_ema(values: &[f64], span: usize) -> Vec<f64> {
        let alpha = 2.0 / (span as f64 + 1.0);
        let mut prev = values[0];
        let mut out = vec![prev];
        for v in &values[1..] {
            prev = alpha * v + (1.0 - alpha) * prev;
            out.push(prev);
        }
        out
    }

    #[test]
    fn test_macd_defined_from_first_bar() {
        let closes: Vec<f64> = (0..60).map(|i| 100.0 + (i as f64).sin()).collect();
        let series = macd_series(&closes, 12, 26, 9);
        assert_eq!(series.macd[0], 0.0);
        assert!(series.signal.iter().all(|v| v.is_finite()));
    }

    #[test]
    fn test_macd_matches_first_value_ema_recursion() {
        let closes: Vec<f64> = (0..120)
            .map(|i| 100.0 + i as f64 * 0.25 + (i as f64 * 0.3).sin() * 4.0)
            .collect();
        let series = macd_series(&closes, 12, 26, 9);

        let fast = reference_ema(&closes, 12);
        let slow = reference_ema(&closes, 26);
        let macd: Vec<f64> = fast.iter().zip(&slow).map(|(f, s)| f - s).collect();
        let signal = reference_ema(&macd, 9);

        for i in [0, 1, 25, 49, 119] {
            assert!((series.macd[i] - macd[i]).abs() < 1e-10, "macd at {}", i);
            assert!((series.signal[i] - signal[i]).abs() < 1e-10, "signal at {}", i);
            assert!((series.histogram[i] - (macd[i] - signal[i])).abs() < 1e-10);
        }
    }

    #[test]
    fn test_constant_price_has_zero_macd() {
        let series = macd_series(&[10.0; 50], 12, 26, 9);
        assert!(series.macd.iter().all(|v| v.abs() < 1e-12));
        assert!(series.histogram.iter().all(|v| v.abs() < 1e-12));
    }
}
