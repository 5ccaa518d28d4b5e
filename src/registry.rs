//! Session registry
//!
//! The registry is the public API of the engine. It owns every session,
//! enforces the single-active-session policy and serializes all operations
//! behind one lock, so measurements for a session are applied strictly in
//! arrival order. The clock is read while that lock is held, so arrival order
//! and timestamp order agree.
//!
//! Create one registry per process and share it by `Arc`:
//!
//! ```ignore
//! let registry = SessionRegistry::new(EngineConfig::default())?;
//! let id = registry.start_session()?;
//! registry.submit(&id, Sample::ear(0.12))?;
//! registry.submit(&id, Sample::ear(0.31))?;
//! let summary = registry.end_session(&id)?;
//! ```

use crate::clock::{Clock, SystemClock};
use crate::config::EngineConfig;
use crate::error::BlinkError;
use crate::session::Session;
use crate::state_machine::BlinkStateMachine;
use crate::types::{EngineStats, HealthReport, Sample, SessionStatus, SessionSummary, SubmitAck};
use crate::{ENGINE_VERSION, PRODUCER_NAME};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

#[derive(Debug, Default)]
struct RegistryState {
    sessions: HashMap<String, Session>,
    stats: EngineStats,
}

impl RegistryState {
    fn active_session_id(&self) -> Option<&str> {
        self.sessions
            .values()
            .find(|session| session.is_active())
            .map(Session::id)
    }
}

/// Owner of all blink sessions for one process
pub struct SessionRegistry {
    config: EngineConfig,
    machine: BlinkStateMachine,
    clock: Arc<dyn Clock>,
    state: Mutex<RegistryState>,
}

impl SessionRegistry {
    /// Create a registry on the wall clock
    pub fn new(config: EngineConfig) -> Result<Self, BlinkError> {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// Create a registry on an injected clock
    pub fn with_clock(config: EngineConfig, clock: Arc<dyn Clock>) -> Result<Self, BlinkError> {
        config.validate()?;
        Ok(Self {
            machine: BlinkStateMachine::from_config(&config),
            config,
            clock,
            state: Mutex::new(RegistryState::default()),
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Open a new session. Fails while another session is active.
    pub fn start_session(&self) -> Result<String, BlinkError> {
        let mut state = self.state.lock();

        if let Some(active) = state.active_session_id() {
            warn!(active_session = active, "Start rejected, session already active");
            return Err(BlinkError::SessionAlreadyActive(active.to_string()));
        }

        let id = Uuid::new_v4().to_string();
        let session = Session::new(id.clone(), self.clock.now());
        state.sessions.insert(id.clone(), session);
        state.stats.sessions_started += 1;

        info!(session_id = %id, "Session started");
        Ok(id)
    }

    /// Route one sample to the session's state machine
    pub fn submit(&self, session_id: &str, sample: Sample) -> Result<SubmitAck, BlinkError> {
        let mut state = self.state.lock();
        let now = self.clock.now();
        let RegistryState { sessions, stats } = &mut *state;

        stats.total_received += 1;

        let result = match sessions.get_mut(session_id) {
            Some(session) => session.apply(&self.machine, &sample, now),
            None => Err(BlinkError::UnknownSession(session_id.to_string())),
        };

        match &result {
            Ok(ack) => {
                stats.total_accepted += 1;
                stats.last_measurement_at = Some(now);
                if ack.blink.is_some() {
                    stats.blinks_recorded += 1;
                }
                if ack.abandoned {
                    stats.blinks_abandoned += 1;
                }
            }
            Err(err) => {
                stats.total_rejected += 1;
                warn!(
                    session_id,
                    frame_id = sample.frame_id.as_deref().unwrap_or("unknown"),
                    code = err.code(),
                    "Measurement rejected: {}",
                    err
                );
            }
        }

        result
    }

    /// Close the session, return its summary and forget it.
    ///
    /// Sessions already closed by the idle sweep are collected the same way.
    pub fn end_session(&self, session_id: &str) -> Result<SessionSummary, BlinkError> {
        let mut state = self.state.lock();
        let now = self.clock.now();

        let mut session = state
            .sessions
            .remove(session_id)
            .ok_or_else(|| BlinkError::UnknownSession(session_id.to_string()))?;

        session.close(now, false);
        let summary = session
            .summary()
            .ok_or_else(|| BlinkError::SessionClosed(session_id.to_string()))?;

        state.stats.sessions_completed += 1;

        info!(
            session_id,
            blink_sequence = %summary.blink_sequence,
            session_duration = summary.session_duration,
            "Session ended"
        );
        Ok(summary)
    }

    /// Close every active session idle past the configured timeout.
    ///
    /// Returns the ids closed by this sweep. Closed sessions stay until
    /// `end_session` collects them or `reaped_retention_secs` passes, after
    /// which they are evicted. A no-op when no timeout is configured.
    pub fn sweep_idle(&self) -> Vec<String> {
        let Some(timeout) = self.config.idle_timeout_secs else {
            return Vec::new();
        };

        let mut state = self.state.lock();
        let now = self.clock.now();
        let retention = self.config.reaped_retention_secs;

        let before = state.sessions.len();
        state.sessions.retain(|id, session| {
            let evict = session.is_evictable(now, retention);
            if evict {
                warn!(session_id = %id, reaped_retention_secs = retention, "Uncollected session evicted");
            }
            !evict
        });
        state.stats.sessions_evicted += (before - state.sessions.len()) as u64;

        let mut reaped = Vec::new();
        for session in state.sessions.values_mut() {
            if session.is_idle(now, timeout) {
                session.close(now, true);
                warn!(session_id = session.id(), idle_timeout_secs = timeout, "Idle session reaped");
                reaped.push(session.id().to_string());
            }
        }

        state.stats.sessions_reaped += reaped.len() as u64;
        reaped
    }

    /// Status of a known session
    pub fn session_status(&self, session_id: &str) -> Option<SessionStatus> {
        self.state
            .lock()
            .sessions
            .get(session_id)
            .map(Session::status)
    }

    /// Id of the currently active session, if any
    pub fn active_session(&self) -> Option<String> {
        self.state.lock().active_session_id().map(str::to_string)
    }

    pub fn stats(&self) -> EngineStats {
        self.state.lock().stats.clone()
    }

    /// Liveness report with process-lifetime counters
    pub fn health(&self) -> HealthReport {
        let state = self.state.lock();
        HealthReport {
            status: "running".to_string(),
            producer: PRODUCER_NAME.to_string(),
            version: ENGINE_VERSION.to_string(),
            active_session: state.active_session_id().is_some(),
            stats: state.stats.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use chrono::{DateTime, TimeZone, Utc};
    use pretty_assertions::assert_eq;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::time::Duration;

    fn registry_with_clock(config: EngineConfig) -> (SessionRegistry, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2024, 1, 15, 12, 0, 0).unwrap(),
        ));
        let registry = SessionRegistry::with_clock(config, clock.clone()).unwrap();
        (registry, clock)
    }

    #[test]
    fn test_end_to_end_short_and_extra_long() {
        let (registry, clock) = registry_with_clock(EngineConfig::default());
        let id = registry.start_session().unwrap();

        registry.submit(&id, Sample::ear(0.1)).unwrap();
        clock.advance_secs(0.5);
        registry.submit(&id, Sample::ear(0.3)).unwrap();
        clock.advance_secs(0.5);
        registry.submit(&id, Sample::ear(0.1)).unwrap();
        clock.advance_secs(1.6);
        registry.submit(&id, Sample::ear(0.3)).unwrap();

        let summary = registry.end_session(&id).unwrap();
        assert_eq!(summary.blink_sequence, "SX");
        assert!((summary.session_duration - 2.6).abs() < 1e-6);
        assert_eq!(summary.frames_accepted, 4);
    }

    #[test]
    fn test_single_active_session() {
        let (registry, _clock) = registry_with_clock(EngineConfig::default());
        let first = registry.start_session().unwrap();

        let err = registry.start_session().unwrap_err();
        assert!(matches!(err, BlinkError::SessionAlreadyActive(ref id) if *id == first));
        assert_eq!(registry.active_session(), Some(first.clone()));

        registry.end_session(&first).unwrap();
        assert!(registry.start_session().is_ok());
    }

    #[test]
    fn test_end_twice_is_unknown() {
        let (registry, _clock) = registry_with_clock(EngineConfig::default());
        let id = registry.start_session().unwrap();

        registry.end_session(&id).unwrap();
        assert!(matches!(
            registry.end_session(&id),
            Err(BlinkError::UnknownSession(_))
        ));
    }

    #[test]
    fn test_submit_after_end_is_rejected() {
        let (registry, _clock) = registry_with_clock(EngineConfig::default());
        let id = registry.start_session().unwrap();
        registry.end_session(&id).unwrap();

        let err = registry.submit(&id, Sample::ear(0.3)).unwrap_err();
        assert!(matches!(err, BlinkError::UnknownSession(_)));
        assert_eq!(registry.stats().total_rejected, 1);
    }

    #[test]
    fn test_abandoned_blink_not_recorded() {
        let (registry, clock) = registry_with_clock(EngineConfig::default());
        let id = registry.start_session().unwrap();

        registry.submit(&id, Sample::ear(0.1)).unwrap();
        clock.advance_secs(0.2);
        registry.submit(&id, Sample::no_face()).unwrap();
        clock.advance_secs(0.2);
        registry.submit(&id, Sample::ear(0.3)).unwrap();

        let summary = registry.end_session(&id).unwrap();
        assert_eq!(summary.blink_sequence, "");
        assert_eq!(summary.blinks_abandoned, 1);
        assert_eq!(summary.no_face_frames, 1);
    }

    #[test]
    fn test_in_progress_blink_dropped_at_end() {
        let (registry, clock) = registry_with_clock(EngineConfig::default());
        let id = registry.start_session().unwrap();

        registry.submit(&id, Sample::ear(0.3)).unwrap();
        clock.advance_secs(0.1);
        registry.submit(&id, Sample::ear(0.1)).unwrap();
        clock.advance_secs(0.4);

        assert_eq!(registry.end_session(&id).unwrap().blink_sequence, "");
    }

    #[test]
    fn test_invalid_measurement_does_not_mutate() {
        let (registry, clock) = registry_with_clock(EngineConfig::default());
        let id = registry.start_session().unwrap();

        registry.submit(&id, Sample::ear(0.1)).unwrap();
        clock.advance_secs(0.3);
        assert!(matches!(
            registry.submit(&id, Sample::ear(-4.0)),
            Err(BlinkError::InvalidMeasurement(_))
        ));
        clock.advance_secs(0.3);
        registry.submit(&id, Sample::ear(0.3)).unwrap();

        let summary = registry.end_session(&id).unwrap();
        assert_eq!(summary.blink_sequence, "S");
        assert_eq!(summary.frames_accepted, 2);
    }

    #[test]
    fn test_sequence_length_matches_completed_blinks() {
        let (registry, clock) = registry_with_clock(EngineConfig::default());
        let id = registry.start_session().unwrap();

        let script = [0.3, 0.1, 0.3, 0.1, 0.1, 0.1, 0.1, 0.3, 0.1, -1.0, 0.3, 0.1, 0.3];
        let mut completed = 0;
        for ear in script {
            clock.advance_secs(0.4);
            let sample = if ear < 0.0 {
                Sample::no_face()
            } else {
                Sample::ear(ear)
            };
            if registry.submit(&id, sample).unwrap().blink.is_some() {
                completed += 1;
            }
        }

        let summary = registry.end_session(&id).unwrap();
        assert_eq!(summary.blink_sequence.len(), completed);
        assert_eq!(summary.blink_sequence, "SLS");
        assert_eq!(summary.blinks_abandoned, 1);
    }

    #[test]
    fn test_idle_sweep_closes_session() {
        let (registry, clock) = registry_with_clock(EngineConfig::default().with_idle_timeout(5.0));
        let id = registry.start_session().unwrap();
        registry.submit(&id, Sample::ear(0.1)).unwrap();

        clock.advance_secs(4.0);
        assert!(registry.sweep_idle().is_empty());

        clock.advance_secs(2.0);
        assert_eq!(registry.sweep_idle(), vec![id.clone()]);
        assert_eq!(registry.session_status(&id), Some(SessionStatus::Closed));

        assert!(matches!(
            registry.submit(&id, Sample::ear(0.3)),
            Err(BlinkError::SessionClosed(_))
        ));

        let next = registry.start_session().unwrap();
        assert_ne!(next, id);

        let summary = registry.end_session(&id).unwrap();
        assert!(summary.reaped);
        assert_eq!(summary.blink_sequence, "");
        assert!((summary.session_duration - 6.0).abs() < 1e-6);
        assert_eq!(registry.stats().sessions_reaped, 1);
    }

    #[test]
    fn test_uncollected_reaped_session_is_evicted() {
        let config = EngineConfig::default()
            .with_idle_timeout(5.0)
            .with_reaped_retention(10.0);
        let (registry, clock) = registry_with_clock(config);
        let id = registry.start_session().unwrap();

        clock.advance_secs(6.0);
        assert_eq!(registry.sweep_idle(), vec![id.clone()]);

        clock.advance_secs(10.0);
        registry.sweep_idle();
        assert_eq!(registry.session_status(&id), Some(SessionStatus::Closed));

        let next = registry.start_session().unwrap();
        clock.advance_secs(1.0);
        registry.submit(&next, Sample::ear(0.3)).unwrap();
        registry.sweep_idle();

        assert_eq!(registry.session_status(&id), None);
        assert_eq!(registry.session_status(&next), Some(SessionStatus::Active));
        assert!(matches!(
            registry.end_session(&id),
            Err(BlinkError::UnknownSession(_))
        ));
        let stats = registry.stats();
        assert_eq!(stats.sessions_reaped, 1);
        assert_eq!(stats.sessions_evicted, 1);
    }

    #[test]
    fn test_abandoned_blinks_counted_while_session_runs() {
        let (registry, clock) = registry_with_clock(EngineConfig::default());
        let id = registry.start_session().unwrap();

        registry.submit(&id, Sample::ear(0.1)).unwrap();
        clock.advance_secs(0.2);
        let ack = registry.submit(&id, Sample::no_face()).unwrap();
        assert!(ack.abandoned);
        assert_eq!(registry.health().stats.blinks_abandoned, 1);

        registry.end_session(&id).unwrap();
        assert_eq!(registry.stats().blinks_abandoned, 1);
    }

    /// Clock that advances one second per read and stalls on one chosen read
    struct StallingClock {
        base: DateTime<Utc>,
        reads: AtomicU64,
        stall_on: u64,
    }

    impl Clock for StallingClock {
        fn now(&self) -> DateTime<Utc> {
            let n = self.reads.fetch_add(1, Ordering::SeqCst);
            if n == self.stall_on {
                std::thread::sleep(Duration::from_millis(300));
            }
            self.base + chrono::Duration::seconds(n as i64)
        }
    }

    #[test]
    fn test_timestamps_follow_lock_order() {
        // reads: 0 start, 1 open, 2 stalled open, 3 closed, 4 end
        let clock = Arc::new(StallingClock {
            base: Utc.with_ymd_and_hms(2024, 1, 15, 12, 0, 0).unwrap(),
            reads: AtomicU64::new(0),
            stall_on: 2,
        });
        let registry = Arc::new(SessionRegistry::with_clock(EngineConfig::default(), clock).unwrap());
        let id = registry.start_session().unwrap();
        registry.submit(&id, Sample::ear(0.3)).unwrap();

        let slow = {
            let registry = Arc::clone(&registry);
            let id = id.clone();
            std::thread::spawn(move || registry.submit(&id, Sample::ear(0.3)).unwrap())
        };
        std::thread::sleep(Duration::from_millis(100));
        let closed = registry.submit(&id, Sample::ear(0.1)).unwrap();
        let reopened = slow.join().unwrap();

        assert_eq!(reopened.blink, None);
        assert_eq!(closed.blink, None);
        let summary = registry.end_session(&id).unwrap();
        assert_eq!(summary.blink_sequence, "");
        assert_eq!(registry.stats().blinks_recorded, 0);
    }

    #[test]
    fn test_sweep_without_timeout_is_noop() {
        let (registry, clock) = registry_with_clock(EngineConfig::default());
        let id = registry.start_session().unwrap();
        clock.advance_secs(3600.0);
        assert!(registry.sweep_idle().is_empty());
        assert_eq!(registry.session_status(&id), Some(SessionStatus::Active));
    }

    #[test]
    fn test_health_report() {
        let (registry, _clock) = registry_with_clock(EngineConfig::default());
        assert!(!registry.health().active_session);

        let id = registry.start_session().unwrap();
        registry.submit(&id, Sample::ear(0.3)).unwrap();

        let health = registry.health();
        assert_eq!(health.status, "running");
        assert!(health.active_session);
        assert_eq!(health.stats.total_received, 1);
        assert_eq!(health.stats.total_accepted, 1);
        assert!(health.stats.last_measurement_at.is_some());
    }

    #[test]
    fn test_rejects_invalid_config() {
        let config = EngineConfig::default().with_ear_threshold(f64::NAN);
        assert!(matches!(
            SessionRegistry::new(config),
            Err(BlinkError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_registry_is_shareable_across_threads() {
        let registry = Arc::new(SessionRegistry::new(EngineConfig::default()).unwrap());
        let id = registry.start_session().unwrap();

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let registry = Arc::clone(&registry);
                let id = id.clone();
                std::thread::spawn(move || {
                    for _ in 0..25 {
                        registry.submit(&id, Sample::ear(0.3)).unwrap();
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(registry.stats().total_accepted, 100);
        assert_eq!(registry.end_session(&id).unwrap().frames_accepted, 100);
    }
}
