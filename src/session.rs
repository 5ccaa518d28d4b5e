//! Per-session state
//!
//! A `Session` is owned by the registry for its whole life and only changes
//! in response to submitted measurements, the idle sweep, or an explicit end.

use crate::accumulator::BlinkSequence;
use crate::clock::elapsed_secs;
use crate::error::BlinkError;
use crate::state_machine::BlinkStateMachine;
use crate::types::{EyeState, Measurement, Sample, SessionStatus, SessionSummary, SubmitAck};
use chrono::{DateTime, Utc};
use tracing::debug;

/// One bounded blink-recording session
#[derive(Debug, Clone)]
pub struct Session {
    id: String,
    status: SessionStatus,
    started_at: DateTime<Utc>,
    ended_at: Option<DateTime<Utc>>,
    last_seen_at: DateTime<Utc>,
    eye_state: EyeState,
    sequence: BlinkSequence,
    last_frame_id: Option<String>,
    frames_accepted: u64,
    no_face_frames: u64,
    blinks_abandoned: u64,
    reaped: bool,
}

impl Session {
    pub fn new(id: String, now: DateTime<Utc>) -> Self {
        Self {
            id,
            status: SessionStatus::Active,
            started_at: now,
            ended_at: None,
            last_seen_at: now,
            eye_state: EyeState::Unknown,
            sequence: BlinkSequence::new(),
            last_frame_id: None,
            frames_accepted: 0,
            no_face_frames: 0,
            blinks_abandoned: 0,
            reaped: false,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn status(&self) -> SessionStatus {
        self.status
    }

    pub fn is_active(&self) -> bool {
        self.status == SessionStatus::Active
    }

    pub fn eye_state(&self) -> EyeState {
        self.eye_state
    }

    pub fn sequence(&self) -> &BlinkSequence {
        &self.sequence
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn ended_at(&self) -> Option<DateTime<Utc>> {
        self.ended_at
    }

    pub fn last_seen_at(&self) -> DateTime<Utc> {
        self.last_seen_at
    }

    /// Feed one sample through the state machine.
    ///
    /// Nothing is mutated unless the sample is accepted.
    pub fn apply(
        &mut self,
        machine: &BlinkStateMachine,
        sample: &Sample,
        now: DateTime<Utc>,
    ) -> Result<SubmitAck, BlinkError> {
        if !self.is_active() {
            return Err(BlinkError::SessionClosed(self.id.clone()));
        }

        // A repeated frame id never bypasses validation
        machine.read(sample.measurement)?;

        if sample.frame_id.is_some() && sample.frame_id == self.last_frame_id {
            debug!(
                session_id = %self.id,
                frame_id = sample.frame_id.as_deref().unwrap_or_default(),
                "Duplicate frame ignored"
            );
            return Ok(SubmitAck {
                accepted: true,
                duplicate: true,
                blink: None,
                abandoned: false,
            });
        }

        let step = machine.step(self.eye_state, sample.measurement, now)?;

        if step.next != self.eye_state {
            debug!(
                session_id = %self.id,
                from = self.eye_state.as_str(),
                to = step.next.as_str(),
                "Eye state changed"
            );
        }

        self.eye_state = step.next;
        self.last_seen_at = now;
        self.last_frame_id = sample.frame_id.clone();
        self.frames_accepted += 1;

        if sample.measurement == Measurement::NoFace {
            self.no_face_frames += 1;
        }

        if step.abandoned {
            self.blinks_abandoned += 1;
            debug!(session_id = %self.id, "Face lost during closure, blink abandoned");
        }

        if let Some(blink) = step.blink {
            self.sequence.push(blink.category);
            debug!(
                session_id = %self.id,
                duration_seconds = blink.duration_seconds,
                category = %blink.category,
                "Blink recorded"
            );
        }

        Ok(SubmitAck {
            accepted: true,
            duplicate: false,
            blink: step.blink,
            abandoned: step.abandoned,
        })
    }

    /// Close the session. A closure still in progress is dropped, not categorized.
    ///
    /// Closing an already closed session keeps its original end time.
    pub fn close(&mut self, now: DateTime<Utc>, reaped: bool) {
        if !self.is_active() {
            return;
        }
        self.status = SessionStatus::Closed;
        self.ended_at = Some(now);
        self.eye_state = EyeState::Unknown;
        self.reaped = reaped;
    }

    /// True when no measurement has arrived for longer than `timeout_secs`
    pub fn is_idle(&self, now: DateTime<Utc>, timeout_secs: f64) -> bool {
        self.is_active() && elapsed_secs(self.last_seen_at, now) > timeout_secs
    }

    /// True for a reaped session nobody collected within `retention_secs`
    pub fn is_evictable(&self, now: DateTime<Utc>, retention_secs: f64) -> bool {
        match self.ended_at {
            Some(ended_at) if self.reaped => elapsed_secs(ended_at, now) > retention_secs,
            _ => false,
        }
    }

    /// Summary of a closed session; `None` while still active
    pub fn summary(&self) -> Option<SessionSummary> {
        let ended_at = self.ended_at?;
        Some(SessionSummary {
            session_id: self.id.clone(),
            blink_sequence: self.sequence.to_string(),
            session_duration: elapsed_secs(self.started_at, ended_at),
            started_at: self.started_at,
            ended_at,
            frames_accepted: self.frames_accepted,
            no_face_frames: self.no_face_frames,
            blinks_abandoned: self.blinks_abandoned,
            reaped: self.reaped,
        })
    }
}
