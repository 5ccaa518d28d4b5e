//! Error types for the blink session engine

use thiserror::Error;

/// Errors that can occur while driving a blink session.
///
/// Every variant is local to the call that produced it: a failed operation
/// leaves registry and session state exactly as it was.
#[derive(Debug, Error)]
pub enum BlinkError {
    #[error("A session is already active: {0}")]
    SessionAlreadyActive(String),

    #[error("Unknown session: {0}")]
    UnknownSession(String),

    #[error("Session is closed: {0}")]
    SessionClosed(String),

    #[error("Invalid measurement: {0}")]
    InvalidMeasurement(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

impl BlinkError {
    /// Stable machine-readable code used on the wire, over FFI and by the CLI
    pub fn code(&self) -> &'static str {
        match self {
            BlinkError::SessionAlreadyActive(_) => "SESSION_ALREADY_ACTIVE",
            BlinkError::UnknownSession(_) => "UNKNOWN_SESSION",
            BlinkError::SessionClosed(_) => "SESSION_CLOSED",
            BlinkError::InvalidMeasurement(_) => "INVALID_MEASUREMENT",
            BlinkError::InvalidConfig(_) => "INVALID_CONFIG",
            BlinkError::Json(_) => "INVALID_CONFIG",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes_are_stable() {
        assert_eq!(
            BlinkError::SessionAlreadyActive("a".into()).code(),
            "SESSION_ALREADY_ACTIVE"
        );
        assert_eq!(BlinkError::UnknownSession("a".into()).code(), "UNKNOWN_SESSION");
        assert_eq!(BlinkError::SessionClosed("a".into()).code(), "SESSION_CLOSED");
        assert_eq!(
            BlinkError::InvalidMeasurement("nan".into()).code(),
            "INVALID_MEASUREMENT"
        );
    }

    #[test]
    fn test_error_display() {
        let err = BlinkError::UnknownSession("sess-1".to_string());
        assert_eq!(err.to_string(), "Unknown session: sess-1");
    }
}
