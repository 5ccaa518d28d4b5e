//! Engine configuration
//!
//! The closed-eye threshold belongs to the detector's calibration and the
//! duration bands to the product, so neither is hard-coded in the engine.

use crate::error::BlinkError;
use serde::{Deserialize, Serialize};

/// Default EAR at or below which the eye counts as closed
pub const DEFAULT_EAR_THRESHOLD: f64 = 0.21;

/// Default symbol for blinks longer than every configured band
pub const DEFAULT_OVERFLOW_SYMBOL: char = 'X';

/// Default seconds a reaped session waits for `end_session` before eviction
pub const DEFAULT_REAPED_RETENTION_SECS: f64 = 300.0;

/// Upper bound (inclusive) of one duration category
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DurationBand {
    pub max_seconds: f64,
    pub symbol: char,
}

impl DurationBand {
    pub const fn new(max_seconds: f64, symbol: char) -> Self {
        Self {
            max_seconds,
            symbol,
        }
    }
}

fn default_bands() -> Vec<DurationBand> {
    vec![DurationBand::new(1.0, 'S'), DurationBand::new(2.0, 'L')]
}

/// Configuration shared by the registry, state machine and classifier
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// EAR at or below this value is read as closed
    pub ear_threshold: f64,
    /// Lowest EAR accepted as a sane reading
    pub ear_min: f64,
    /// Highest EAR accepted as a sane reading
    pub ear_max: f64,
    /// Ascending category bands; bounds are inclusive on the lower category
    pub duration_bands: Vec<DurationBand>,
    /// Symbol for durations above the last band
    pub overflow_symbol: char,
    /// Close sessions that receive nothing for this many seconds
    pub idle_timeout_secs: Option<f64>,
    /// Drop reaped sessions still uncollected after this many seconds
    pub reaped_retention_secs: f64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            ear_threshold: DEFAULT_EAR_THRESHOLD,
            ear_min: 0.0,
            ear_max: 1.0,
            duration_bands: default_bands(),
            overflow_symbol: DEFAULT_OVERFLOW_SYMBOL,
            idle_timeout_secs: None,
            reaped_retention_secs: DEFAULT_REAPED_RETENTION_SECS,
        }
    }
}

impl EngineConfig {
    /// Override the closed-eye threshold
    pub fn with_ear_threshold(mut self, threshold: f64) -> Self {
        self.ear_threshold = threshold;
        self
    }

    /// Enable idle reaping after `secs` seconds without measurements
    pub fn with_idle_timeout(mut self, secs: f64) -> Self {
        self.idle_timeout_secs = Some(secs);
        self
    }

    /// Keep reaped sessions collectable for `secs` seconds
    pub fn with_reaped_retention(mut self, secs: f64) -> Self {
        self.reaped_retention_secs = secs;
        self
    }

    /// Replace the duration bands and overflow symbol
    pub fn with_bands(mut self, bands: Vec<DurationBand>, overflow_symbol: char) -> Self {
        self.duration_bands = bands;
        self.overflow_symbol = overflow_symbol;
        self
    }

    /// Check internal consistency
    pub fn validate(&self) -> Result<(), BlinkError> {
        if !self.ear_min.is_finite() || !self.ear_max.is_finite() || self.ear_min >= self.ear_max {
            return Err(BlinkError::InvalidConfig(format!(
                "EAR range must be finite and non-empty, got [{}, {}]",
                self.ear_min, self.ear_max
            )));
        }

        if !self.ear_threshold.is_finite()
            || self.ear_threshold < self.ear_min
            || self.ear_threshold > self.ear_max
        {
            return Err(BlinkError::InvalidConfig(format!(
                "EAR threshold {} outside [{}, {}]",
                self.ear_threshold, self.ear_min, self.ear_max
            )));
        }

        let mut previous = 0.0;
        for band in &self.duration_bands {
            if !band.max_seconds.is_finite() || band.max_seconds <= previous {
                return Err(BlinkError::InvalidConfig(format!(
                    "Duration bands must be positive and strictly ascending (band '{}' at {})",
                    band.symbol, band.max_seconds
                )));
            }
            previous = band.max_seconds;
        }

        if let Some(timeout) = self.idle_timeout_secs {
            if !timeout.is_finite() || timeout <= 0.0 {
                return Err(BlinkError::InvalidConfig(format!(
                    "Idle timeout must be positive, got {}",
                    timeout
                )));
            }
        }

        if !self.reaped_retention_secs.is_finite() || self.reaped_retention_secs <= 0.0 {
            return Err(BlinkError::InvalidConfig(format!(
                "Reaped retention must be positive, got {}",
                self.reaped_retention_secs
            )));
        }

        Ok(())
    }

    /// Load and validate a configuration from JSON
    pub fn from_json(json: &str) -> Result<Self, BlinkError> {
        let config: EngineConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize configuration to JSON
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}
