//! JSON request/response protocol
//!
//! Transport-neutral encoding of the engine's three operations plus a health
//! probe. The CLI speaks it as NDJSON over stdio and the FFI layer accepts it
//! as a single JSON string, so any thin transport can sit in front.
//!
//! Requests:
//! - `{"op": "start_session"}`
//! - `{"op": "submit_measurement", "session_id": "...", "ear": 0.27, "frame_id": 17}`
//! - `{"op": "submit_measurement", "session_id": "...", "no_face": true}`
//! - `{"op": "end_session", "session_id": "..."}`
//! - `{"op": "health"}`
//!
//! Failures are reported as `{"error": {"code": "...", "message": "..."}}`.

use crate::error::BlinkError;
use crate::registry::SessionRegistry;
use crate::types::{HealthReport, Measurement, Sample, SessionSummary, SubmitAck};
use serde::{Deserialize, Serialize};

/// Protocol identifier reported by `schema` and `doctor`
pub const PROTOCOL_VERSION: &str = "blinktalk.session.v1";

/// Frame identifiers arrive as either numbers or strings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FrameId {
    Number(u64),
    Text(String),
}

impl From<FrameId> for String {
    fn from(frame_id: FrameId) -> Self {
        match frame_id {
            FrameId::Number(n) => n.to_string(),
            FrameId::Text(s) => s,
        }
    }
}

/// An incoming request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Request {
    StartSession,
    SubmitMeasurement {
        session_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        ear: Option<f64>,
        #[serde(default)]
        no_face: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        frame_id: Option<FrameId>,
    },
    EndSession {
        session_id: String,
    },
    Health,
}

/// Build a sample from the wire fields; exactly one of `ear`/`no_face` must be set
pub fn sample_from_wire(
    ear: Option<f64>,
    no_face: bool,
    frame_id: Option<FrameId>,
) -> Result<Sample, BlinkError> {
    let measurement = match (ear, no_face) {
        (Some(value), false) => Measurement::Ear(value),
        (None, true) => Measurement::NoFace,
        (Some(_), true) => {
            return Err(BlinkError::InvalidMeasurement(
                "ear and no_face are mutually exclusive".to_string(),
            ))
        }
        (None, false) => {
            return Err(BlinkError::InvalidMeasurement(
                "either ear or no_face must be provided".to_string(),
            ))
        }
    };

    Ok(Sample {
        measurement,
        frame_id: frame_id.map(String::from),
    })
}

/// Error body carried by failed responses
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
}

impl From<&BlinkError> for ErrorBody {
    fn from(err: &BlinkError) -> Self {
        ErrorBody {
            code: err.code().to_string(),
            message: err.to_string(),
        }
    }
}

/// An outgoing response
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Response {
    Started { session_id: String },
    Submitted(SubmitAck),
    Ended(SessionSummary),
    Health(HealthReport),
    Error { error: ErrorBody },
}

impl Response {
    pub fn is_error(&self) -> bool {
        matches!(self, Response::Error { .. })
    }
}

impl From<BlinkError> for Response {
    fn from(err: BlinkError) -> Self {
        Response::Error {
            error: ErrorBody::from(&err),
        }
    }
}

/// Parse one JSON request. Malformed payloads become `InvalidMeasurement`.
pub fn parse_request(json: &str) -> Result<Request, BlinkError> {
    serde_json::from_str(json)
        .map_err(|e| BlinkError::InvalidMeasurement(format!("Malformed request: {}", e)))
}

/// Execute a request against the registry
pub fn handle_request(registry: &SessionRegistry, request: Request) -> Response {
    let result = match request {
        Request::StartSession => registry
            .start_session()
            .map(|session_id| Response::Started { session_id }),
        Request::SubmitMeasurement {
            session_id,
            ear,
            no_face,
            frame_id,
        } => sample_from_wire(ear, no_face, frame_id)
            .and_then(|sample| registry.submit(&session_id, sample))
            .map(Response::Submitted),
        Request::EndSession { session_id } => {
            registry.end_session(&session_id).map(Response::Ended)
        }
        Request::Health => Ok(Response::Health(registry.health())),
    };

    result.unwrap_or_else(Response::from)
}

/// Handle one JSON line and return the JSON response; never fails
pub fn handle_line(registry: &SessionRegistry, line: &str) -> String {
    let response = match parse_request(line) {
        Ok(request) => handle_request(registry, request),
        Err(err) => Response::from(err),
    };
    encode_response(&response)
}

/// Serialize a response, falling back to a fixed error body
pub fn encode_response(response: &Response) -> String {
    serde_json::to_string(response).unwrap_or_else(|e| {
        format!(
            r#"{{"error":{{"code":"ENCODING_ERROR","message":"{}"}}}}"#,
            e.to_string().replace('"', "'")
        )
    })
}
