//! Blink duration classification
//!
//! Maps a completed blink's closed-eye time onto a category symbol. Each band
//! bound is inclusive on the lower category: with the default bands exactly
//! 1.0s is `S` and exactly 2.0s is `L`.

use crate::config::{DurationBand, EngineConfig};

/// Short blink symbol
pub const SHORT: char = 'S';
/// Long blink symbol
pub const LONG: char = 'L';
/// Extra-long blink symbol
pub const EXTRA_LONG: char = 'X';

/// Classifier over an ordered list of duration bands
#[derive(Debug, Clone, PartialEq)]
pub struct DurationClassifier {
    bands: Vec<DurationBand>,
    overflow_symbol: char,
}

impl Default for DurationClassifier {
    fn default() -> Self {
        Self::from_config(&EngineConfig::default())
    }
}

impl DurationClassifier {
    /// Bands must be strictly ascending; `EngineConfig::validate` checks this
    pub fn new(bands: Vec<DurationBand>, overflow_symbol: char) -> Self {
        Self {
            bands,
            overflow_symbol,
        }
    }

    pub fn from_config(config: &EngineConfig) -> Self {
        Self::new(config.duration_bands.clone(), config.overflow_symbol)
    }

    /// Category symbol for a blink of `duration_seconds`
    pub fn classify(&self, duration_seconds: f64) -> char {
        self.bands
            .iter()
            .find(|band| duration_seconds <= band.max_seconds)
            .map(|band| band.symbol)
            .unwrap_or(self.overflow_symbol)
    }

    /// All symbols this classifier can produce, shortest first
    pub fn symbols(&self) -> Vec<char> {
        self.bands
            .iter()
            .map(|band| band.symbol)
            .chain(std::iter::once(self.overflow_symbol))
            .collect()
    }
}
