use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::{ForecastError, Result};

/// Stable symbol -> integer code mapping.
///
/// Codes are assigned over the sorted, de-duplicated symbol list, so the
/// same universe always encodes the same way regardless of load order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(into = "EncoderFile", try_from = "EncoderFile")]
pub struct AssetEncoder {
    classes: Vec<String>,
}

#[derive(Serialize, Deserialize)]
struct EncoderFile {
    mapping: BTreeMap<String, usize>,
}

impl AssetEncoder {
    pub fn fit<S: AsRef<str>>(symbols: &[S]) -> Self {
        let mut classes: Vec<String> = symbols.iter().map(|s| s.as_ref().to_string()).collect();
        classes.sort();
        classes.dedup();
        Self { classes }
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }

    pub fn classes(&self) -> &[String] {
        &self.classes
    }

    pub fn encode(&self, symbol: &str) -> Result<usize> {
        self.classes
            .binary_search_by(|c| c.as_str().cmp(symbol))
            .map_err(|_| ForecastError::UnknownAsset(symbol.to_string()))
    }

    pub fn decode(&self, code: usize) -> Option<&str> {
        self.classes.get(code).map(String::as_str)
    }
}

impl From<AssetEncoder> for EncoderFile {
    fn from(encoder: AssetEncoder) -> Self {
        let mapping = encoder
            .classes
            .into_iter()
            .enumerate()
            .map(|(code, symbol)| (symbol, code))
            .collect();
        EncoderFile { mapping }
    }
}

impl TryFrom<EncoderFile> for AssetEncoder {
    type Error = String;

    fn try_from(file: EncoderFile) -> std::result::Result<Self, Self::Error> {
        // BTreeMap iterates in symbol order, which must also be code order
        let mut classes = Vec::with_capacity(file.mapping.len());
        for (expected, (symbol, code)) in file.mapping.into_iter().enumerate() {
            if code != expected {
                return Err(format!(
                    "encoder code {} for {} breaks sorted ordering (expected {})",
                    code, symbol, expected
                ));
            }
            classes.push(symbol);
        }
        Ok(Self { classes })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_follow_sorted_order() {
        let encoder = AssetEncoder::fit(&["msft", "aapl", "goog", "aapl"]);
        assert_eq!(encoder.len(), 3);
        assert_eq!(encoder.encode("aapl").unwrap(), 0);
        assert_eq!(encoder.encode("goog").unwrap(), 1);
        assert_eq!(encoder.encode("msft").unwrap(), 2);
        assert_eq!(encoder.decode(1), Some("goog"));
    }

    #[test]
    fn test_independent_of_input_order() {
        let a = AssetEncoder::fit(&["c", "a", "b"]);
        let b = AssetEncoder::fit(&["b", "c", "a"]);
        assert_eq!(a, b);
    }

    #[test]
    fn test_unknown_symbol() {
        let encoder = AssetEncoder::fit(&["aapl"]);
        assert!(matches!(encoder.encode("tsla"), Err(ForecastError::UnknownAsset(_))));
    }

    #[test]
    fn test_json_mapping() {
        let encoder = AssetEncoder::fit(&["b", "a"]);
        let json = serde_json::to_string(&encoder).unwrap();
        assert_eq!(json, r#"{"mapping":{"a":0,"b":1}}"#);
        let back: AssetEncoder = serde_json::from_str(&json).unwrap();
        assert_eq!(back, encoder);
        assert!(serde_json::from_str::<AssetEncoder>(r#"{"mapping":{"a":1,"b":0}}"#).is_err());
    }
}
