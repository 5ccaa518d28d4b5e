//! Blink state machine
//!
//! Per-session transition logic. A single frame crossing the threshold is
//! enough to change state; smoothing is the detector's job.
//!
//! Losing the face while the eye is closed abandons the closure: the engine
//! cannot tell a long blink from an occluded face, so it records nothing
//! rather than a fabricated duration.

use crate::classifier::DurationClassifier;
use crate::clock::elapsed_secs;
use crate::config::EngineConfig;
use crate::error::BlinkError;
use crate::types::{BlinkEvent, EyeReading, EyeState, Measurement};
use chrono::{DateTime, Utc};

/// Result of feeding one reading to the state machine
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transition {
    pub next: EyeState,
    /// Closed-eye time of a blink completed by this reading
    pub blink_seconds: Option<f64>,
    /// A closure in progress was dropped because the face was lost
    pub abandoned: bool,
}

/// Pure transition table over `(state, reading, now)`
pub fn next_state(state: EyeState, reading: EyeReading, now: DateTime<Utc>) -> Transition {
    let mut blink_seconds = None;
    let mut abandoned = false;

    let next = match (state, reading) {
        (_, EyeReading::NoFace) => {
            abandoned = matches!(state, EyeState::Closed { .. });
            EyeState::Unknown
        }
        (EyeState::Closed { since }, EyeReading::Open) => {
            blink_seconds = Some(elapsed_secs(since, now));
            EyeState::Open
        }
        (EyeState::Closed { since }, EyeReading::Closed) => EyeState::Closed { since },
        (EyeState::Unknown | EyeState::Open, EyeReading::Open) => EyeState::Open,
        (EyeState::Unknown | EyeState::Open, EyeReading::Closed) => EyeState::Closed { since: now },
    };

    Transition {
        next,
        blink_seconds,
        abandoned,
    }
}

/// Outcome of a full step, with the blink already categorized
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Step {
    pub next: EyeState,
    pub blink: Option<BlinkEvent>,
    pub abandoned: bool,
}

/// Threshold, sanity range and classifier bundled for per-measurement use
#[derive(Debug, Clone)]
pub struct BlinkStateMachine {
    ear_threshold: f64,
    ear_min: f64,
    ear_max: f64,
    classifier: DurationClassifier,
}

impl Default for BlinkStateMachine {
    fn default() -> Self {
        Self::from_config(&EngineConfig::default())
    }
}

impl BlinkStateMachine {
    pub fn from_config(config: &EngineConfig) -> Self {
        Self {
            ear_threshold: config.ear_threshold,
            ear_min: config.ear_min,
            ear_max: config.ear_max,
            classifier: DurationClassifier::from_config(config),
        }
    }

    pub fn classifier(&self) -> &DurationClassifier {
        &self.classifier
    }

    /// Validate a measurement and apply the closed-eye threshold
    pub fn read(&self, measurement: Measurement) -> Result<EyeReading, BlinkError> {
        match measurement {
            Measurement::NoFace => Ok(EyeReading::NoFace),
            Measurement::Ear(ear) if !ear.is_finite() => Err(BlinkError::InvalidMeasurement(
                format!("EAR must be a finite number, got {}", ear),
            )),
            Measurement::Ear(ear) if ear < self.ear_min || ear > self.ear_max => {
                Err(BlinkError::InvalidMeasurement(format!(
                    "EAR {} outside [{}, {}]",
                    ear, self.ear_min, self.ear_max
                )))
            }
            Measurement::Ear(ear) if ear <= self.ear_threshold => Ok(EyeReading::Closed),
            Measurement::Ear(_) => Ok(EyeReading::Open),
        }
    }

    /// Validate, transition and classify in one go.
    ///
    /// An invalid measurement is rejected before any state is computed, so the
    /// caller's state is untouched on error.
    pub fn step(
        &self,
        state: EyeState,
        measurement: Measurement,
        now: DateTime<Utc>,
    ) -> Result<Step, BlinkError> {
        let reading = self.read(measurement)?;
        let transition = next_state(state, reading, now);

        let blink = transition.blink_seconds.map(|duration_seconds| BlinkEvent {
            duration_seconds,
            category: self.classifier.classify(duration_seconds),
        });

        Ok(Step {
            next: transition.next,
            blink,
            abandoned: transition.abandoned,
        })
    }
}
