//! Core types for the blink session engine
//!
//! This module defines the data that flows through the engine: incoming
//! measurements, the per-session eye state, emitted blink events and the
//! summaries returned when a session ends.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single per-frame reading handed over by the landmark detector
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Measurement {
    /// Eye Aspect Ratio for the frame
    Ear(f64),
    /// The detector found no face in the frame
    NoFace,
}

/// A measurement tagged with the frame it came from.
///
/// The frame id is used for logging and duplicate suppression only; ordering
/// is always arrival order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub measurement: Measurement,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frame_id: Option<String>,
}

impl Sample {
    pub fn ear(value: f64) -> Self {
        Self {
            measurement: Measurement::Ear(value),
            frame_id: None,
        }
    }

    pub fn no_face() -> Self {
        Self {
            measurement: Measurement::NoFace,
            frame_id: None,
        }
    }

    pub fn with_frame_id(mut self, frame_id: impl Into<String>) -> Self {
        self.frame_id = Some(frame_id.into());
        self
    }
}

/// How a measurement reads once the closed-eye threshold is applied
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EyeReading {
    Open,
    Closed,
    NoFace,
}

/// Eye state tracked per session.
///
/// The closure start only exists while the eye is closed, so a stale
/// timestamp cannot outlive the closure it belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum EyeState {
    /// Before the first valid measurement, or after the face was lost
    #[default]
    Unknown,
    Open,
    Closed { since: DateTime<Utc> },
}

impl EyeState {
    pub fn as_str(&self) -> &'static str {
        match self {
            EyeState::Unknown => "unknown",
            EyeState::Open => "open",
            EyeState::Closed { .. } => "closed",
        }
    }

    /// Start of the current closure, present only in the `Closed` state
    pub fn closed_since(&self) -> Option<DateTime<Utc>> {
        match self {
            EyeState::Closed { since } => Some(*since),
            _ => None,
        }
    }
}

/// Session lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Active,
    Closed,
}

/// A completed blink, folded into the session sequence as soon as it is emitted
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BlinkEvent {
    /// Closed-eye time in seconds
    pub duration_seconds: f64,
    /// Category symbol assigned by the duration classifier
    pub category: char,
}

/// Outcome of an accepted submission
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SubmitAck {
    pub accepted: bool,
    /// True when the frame repeated the previous frame id and was not re-applied
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub duplicate: bool,
    /// Blink completed by this measurement, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blink: Option<BlinkEvent>,
    /// True when this measurement ended a closure without a completed blink
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub abandoned: bool,
}

/// Result returned when a session is ended
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSummary {
    pub session_id: String,
    /// Category symbols in emission order
    pub blink_sequence: String,
    /// Seconds between start and end
    pub session_duration: f64,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    pub frames_accepted: u64,
    pub no_face_frames: u64,
    /// Closures lost to a no-face frame before the eye reopened
    pub blinks_abandoned: u64,
    /// True when the session was closed by the idle sweep rather than by the caller
    pub reaped: bool,
}

/// Process-lifetime counters, reported by the health probe
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EngineStats {
    pub total_received: u64,
    pub total_accepted: u64,
    pub total_rejected: u64,
    pub blinks_recorded: u64,
    pub blinks_abandoned: u64,
    pub sessions_started: u64,
    pub sessions_completed: u64,
    pub sessions_reaped: u64,
    /// Reaped sessions dropped after nobody collected them
    pub sessions_evicted: u64,
    pub last_measurement_at: Option<DateTime<Utc>>,
}

/// Liveness report; carries no session semantics beyond "is one active"
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthReport {
    pub status: String,
    pub producer: String,
    pub version: String,
    pub active_session: bool,
    pub stats: EngineStats,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_closed_since_only_in_closed_state() {
        let t = Utc.with_ymd_and_hms(2024, 1, 15, 12, 0, 0).unwrap();
        assert_eq!(EyeState::Unknown.closed_since(), None);
        assert_eq!(EyeState::Open.closed_since(), None);
        assert_eq!(EyeState::Closed { since: t }.closed_since(), Some(t));
    }

    #[test]
    fn test_eye_state_serialization() {
        let json = serde_json::to_value(EyeState::Open).unwrap();
        assert_eq!(json["state"], "open");
    }

    #[test]
    fn test_submit_ack_omits_defaults() {
        let ack = SubmitAck {
            accepted: true,
            duplicate: false,
            blink: None,
            abandoned: false,
        };
        let json = serde_json::to_string(&ack).unwrap();
        assert_eq!(json, r#"{"accepted":true}"#);
    }

    #[test]
    fn test_submit_ack_reports_abandoned_closure() {
        let ack = SubmitAck {
            accepted: true,
            duplicate: false,
            blink: None,
            abandoned: true,
        };
        let json = serde_json::to_string(&ack).unwrap();
        assert_eq!(json, r#"{"accepted":true,"abandoned":true}"#);
    }

    #[test]
    fn test_sample_builders() {
        let sample = Sample::ear(0.3).with_frame_id("42");
        assert_eq!(sample.measurement, Measurement::Ear(0.3));
        assert_eq!(sample.frame_id.as_deref(), Some("42"));
        assert_eq!(Sample::no_face().measurement, Measurement::NoFace);
    }
}
