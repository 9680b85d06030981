pub mod bar;

pub use bar::*;

#[cfg(test)]
pub(crate) mod fixtures {
    use chrono::{DateTime, Duration, TimeZone, Utc};
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    use super::{Bar, BarSeries};

    pub fn day(n: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap() + Duration::days(n)
    }

    /// Close rises by `step` each bar starting at `start`, no noise
    pub fn linear_series(symbol: &str, n: usize, start: f64, step: f64) -> BarSeries {
        let bars = (0..n)
            .map(|i| {
                let close = start + step * i as f64;
                Bar {
                    timestamp: day(i as i64),
                    open: close - step / 2.0,
                    high: close + 0.5,
                    low: close - 0.5,
                    close,
                    volume: 10_000.0,
                }
            })
            .collect();
        BarSeries::new(symbol, bars)
    }

    /// Seeded geometric random walk with strictly positive prices
    pub fn random_walk_series(symbol: &str, n: usize, seed: u64) -> BarSeries {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut close = 100.0_f64;
        let bars = (0..n)
            .map(|i| {
                let ret: f64 = rng.gen_range(-0.03..0.03);
                let open = close;
                close *= 1.0 + ret;
                let high = open.max(close) * (1.0 + rng.gen_range(0.0..0.01));
                let low = open.min(close) * (1.0 - rng.gen_range(0.0..0.01));
                Bar {
                    timestamp: day(i as i64),
                    open,
                    high,
                    low,
                    close,
                    volume: rng.gen_range(5_000.0..50_000.0),
                }
            })
            .collect();
        BarSeries::new(symbol, bars)
    }
}
