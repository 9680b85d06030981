use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One OHLCV observation for one asset
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

/// Time-ordered bars of a single asset.
///
/// Construction sorts ascending by timestamp and collapses duplicate
/// timestamps, keeping the observation that was loaded last.
#[derive(Debug, Clone, Default)]
pub struct BarSeries {
    symbol: String,
    bars: Vec<Bar>,
}

impl BarSeries {
    pub fn new(symbol: impl Into<String>, mut bars: Vec<Bar>) -> Self {
        // stable sort keeps load order among equal timestamps
        bars.sort_by_key(|b| b.timestamp);
        let mut deduped: Vec<Bar> = Vec::with_capacity(bars.len());
        for bar in bars {
            match deduped.last_mut() {
                Some(last) if last.timestamp == bar.timestamp => *last = bar,
                _ => deduped.push(bar),
            }
        }
        Self {
            symbol: symbol.into(),
            bars: deduped,
        }
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn bars(&self) -> &[Bar] {
        &self.bars
    }

    pub fn len(&self) -> usize {
        self.bars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    pub fn last(&self) -> Option<&Bar> {
        self.bars.last()
    }

    pub fn last_n(&self, n: usize) -> &[Bar] {
        let len = self.bars.len();
        if n >= len {
            &self.bars[..]
        } else {
            &self.bars[len - n..]
        }
    }

    pub fn timestamps(&self) -> Vec<DateTime<Utc>> {
        self.bars.iter().map(|b| b.timestamp).collect()
    }

    pub fn closes(&self) -> Vec<f64> {
        self.bars.iter().map(|b| b.close).collect()
    }

    pub fn volumes(&self) -> Vec<f64> {
        self.bars.iter().map(|b| b.volume).collect()
    }

    /// Keep only the most recent `n` bars
    pub fn tail(&self, n: usize) -> Self {
        Self {
            symbol: self.symbol.clone(),
            bars: self.last_n(n).to_vec(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn bar_at(day: i64, close: f64) -> Bar {
        Bar {
            timestamp: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap() + Duration::days(day),
            open: close,
            high: close + 1.0,
            low: close - 1.0,
            close,
            volume: 1000.0,
        }
    }

    #[test]
    fn test_series_sorted_ascending() {
        let series = BarSeries::new("aapl", vec![bar_at(3, 3.0), bar_at(1, 1.0), bar_at(2, 2.0)]);
        assert_eq!(series.closes(), vec![1.0, 2.0, 3.0]);
        assert_eq!(series.symbol(), "aapl");
    }

    #[test]
    fn test_duplicate_timestamps_keep_last_loaded() {
        let series = BarSeries::new(
            "msft",
            vec![bar_at(1, 1.0), bar_at(2, 2.0), bar_at(2, 20.0), bar_at(3, 3.0)],
        );
        assert_eq!(series.len(), 3);
        assert_eq!(series.closes(), vec![1.0, 20.0, 3.0]);
        let ts = series.timestamps();
        assert!(ts.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_tail() {
        let series = BarSeries::new("x", (0..10).map(|d| bar_at(d, d as f64)).collect());
        let tail = series.tail(3);
        assert_eq!(tail.closes(), vec![7.0, 8.0, 9.0]);
        assert_eq!(series.tail(50).len(), 10);
    }
}
