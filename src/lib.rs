//! BlinkTalk Engine - blink session engine for live Eye Aspect Ratio streams
//!
//! The engine turns per-frame EAR readings from an external landmark detector
//! into a compact record of blink events for one bounded session:
//! session registry → blink state machine → duration classifier → sequence.
//!
//! ## Modules
//!
//! - **Registry**: session lifecycle, single-active-session policy, idle reaping
//! - **State machine**: Open / Closed / Unknown transitions and the no-face policy
//! - **Classifier**: blink duration to category symbol (`S`, `L`, `X`)
//! - **Protocol**: JSON request/response encoding of the engine operations

pub mod accumulator;
pub mod classifier;
pub mod clock;
pub mod config;
pub mod error;
pub mod protocol;
pub mod registry;
pub mod session;
pub mod state_machine;
pub mod types;

// FFI bindings for C interop (always available for cdylib/staticlib builds)
pub mod ffi;

pub use accumulator::BlinkSequence;
pub use classifier::DurationClassifier;
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{DurationBand, EngineConfig};
pub use error::BlinkError;
pub use registry::SessionRegistry;
pub use state_machine::BlinkStateMachine;
pub use types::{BlinkEvent, EyeState, Measurement, Sample, SessionSummary, SubmitAck};

/// Engine version reported by the health probe and the CLI
pub const ENGINE_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Producer name reported by the health probe
pub const PRODUCER_NAME: &str = "blinktalk-engine";
