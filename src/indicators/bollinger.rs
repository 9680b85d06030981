use super::{RollingWindow, EPSILON};

#[derive(Debug, Clone)]
pub struct BollingerBands {
    std_dev_multiplier: f64,
    window: RollingWindow,
}

impl BollingerBands {
    pub fn new(period: usize, std_dev_multiplier: f64) -> Self {
        Self {
            std_dev_multiplier,
            window: RollingWindow::new(period),
        }
    }

    pub fn update(&mut self, price: f64) -> Option<BollingerOutput> {
        self.window.push(price);

        let middle = self.window.mean()?;
        let std_dev = self.window.std()?;

        let deviation = std_dev * self.std_dev_multiplier;
        let upper = middle + deviation;
        let lower = middle - deviation;

        Some(BollingerOutput {
            upper,
            middle,
            lower,
            // (upper - lower) / middle
            width: (upper - lower) / middle,
            position: band_position(price, lower, upper),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BollingerOutput {
    pub upper: f64,
    pub middle: f64,
    pub lower: f64,
    pub width: f64,
    pub position: f64,
}

/// Where `close` sits between the bands: ~0 at the lower band, ~1 at the upper
pub fn band_position(close: f64, lower: f64, upper: f64) -> f64 {
    (close - lower) / (upper - lower + EPSILON)
}

#[derive(Debug, Clone)]
pub struct BollingerSeries {
    pub width: Vec<f64>,
    pub position: Vec<f64>,
}

pub fn bollinger_series(closes: &[f64], period: usize, num_std: f64) -> BollingerSeries {
    let mut bands = BollingerBands::new(period, num_std);
    let mut out = BollingerSeries {
        width: Vec::with_capacity(closes.len()),
        position: Vec::with_capacity(closes.len()),
    };
    for close in closes {
        match bands.update(*close) {
            Some(o) => {
                out.width.push(o.width);
                out.position.push(o.position);
            }
            None => {
                out.width.push(f64::NAN);
                out.position.push(f64::NAN);
            }
        }
    }
    out
}
