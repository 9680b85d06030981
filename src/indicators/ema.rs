/// Exponential moving average with smoothing `2 / (period + 1)`, started at
/// the first observed value: `ema[0] = v[0]`, `ema[t] = a*v[t] + (1-a)*ema[t-1]`.
#[derive(Debug, Clone)]
pub struct EMA {
    alpha: f64,
    value: Option<f64>,
}

impl EMA {
    pub fn new(period: usize) -> Self {
        Self {
            alpha: 2.0 / (period as f64 + 1.0),
            value: None,
        }
    }

    pub fn update(&mut self, price: f64) -> f64 {
        let next = match self.value {
            Some(prev) => self.alpha * price + (1.0 - self.alpha) * prev,
            None => price,
        };
        self.value = Some(next);
        next
    }
}

/// Aligned EMA series. `NaN` inputs map to `NaN` and leave the average untouched.
pub fn ema_series(values: &[f64], period: usize) -> Vec<f64> {
    let mut ema = EMA::new(period);
    values
        .iter()
        .map(|v| if v.is_nan() { f64::NAN } else { ema.update(*v) })
        .collect()
}
