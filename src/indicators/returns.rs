use super::rolling_std_series;

/// `value[t] / value[t - lag] - 1`, `NaN` for the first `lag` positions
pub fn pct_change(values: &[f64], lag: usize) -> Vec<f64> {
    (0..values.len())
        .map(|i| {
            if i < lag || lag == 0 {
                f64::NAN
            } else {
                values[i] / values[i - lag] - 1.0
            }
        })
        .collect()
}

/// `value[t + horizon] / value[t] - 1`, `NaN` for the last `horizon` positions
pub fn forward_return(values: &[f64], horizon: usize) -> Vec<f64> {
    (0..values.len())
        .map(|i| match values.get(i + horizon) {
            Some(future) if horizon > 0 => future / values[i] - 1.0,
            _ => f64::NAN,
        })
        .collect()
}

/// Rolling sample stddev of one-bar returns. The first value lands on index
/// `window`, since the return series itself starts one bar late.
pub fn volatility_series(closes: &[f64], window: usize) -> Vec<f64> {
    rolling_std_series(&pct_change(closes, 1), window)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pct_change() {
        let values = [100.0, 110.0, 121.0];
        let r1 = pct_change(&values, 1);
        assert!(r1[0].is_nan());
        assert!((r1[1] - 0.1).abs() < 1e-12);
        assert!((r1[2] - 0.1).abs() < 1e-12);
        let r2 = pct_change(&values, 2);
        assert!((r2[2] - 0.21).abs() < 1e-12);
    }

    #[test]
    fn test_forward_return_tail_is_nan() {
        let values = [1.0, 2.0, 4.0, 8.0];
        let fwd = forward_return(&values, 2);
        assert!((fwd[0] - 3.0).abs() < 1e-12);
        assert!((fwd[1] - 3.0).abs() < 1e-12);
        assert!(fwd[2].is_nan());
        assert!(fwd[3].is_nan());
    }

    #[test]
    fn test_volatility_warmup() {
        let closes: Vec<f64> = (0..40).map(|i| 100.0 * 1.01_f64.powi(i) + (i % 3) as f64).collect();
        let vol = volatility_series(&closes, 20);
        assert!(vol[..20].iter().all(|v| v.is_nan()));
        assert!(vol[20].is_finite());
    }
}
