//! Error taxonomy for the distribution engine.
//!
//! - [`ValidationError`]: malformed event record at construction or decode time
//! - [`TransportError`]: a write to one client connection failed
//! - [`ProtocolError`]: an inbound client control frame could not be understood
//!
//! Bus failures live next to the bus abstraction (`briefcast_bus::BusError`).
//! None of these ever cross from one connection or session into another.

use thiserror::Error;

/// A malformed event record.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// `proof_layer.confidence` outside `[0, 1]` (or not a number).
    #[error("confidence {0} is outside [0, 1]")]
    ConfidenceOutOfRange(f64),

    /// A required text field was empty.
    #[error("field `{0}` must not be empty")]
    EmptyField(&'static str),

    /// The schema version string is not `MAJOR.MINOR.PATCH[-pre][+build]`.
    #[error("malformed schema version: {0}")]
    MalformedSchemaVersion(String),

    /// The record was produced by an incompatible major schema version.
    #[error("unsupported schema major version: {0}")]
    UnsupportedSchemaVersion(String),

    /// JSON could not be decoded into a record (includes unknown enum members).
    #[error("failed to decode event record: {0}")]
    Json(#[from] serde_json::Error),
}

/// A failed write to one client connection.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// The connection's outbound queue is full (slow consumer).
    #[error("outbound queue full for connection {0}")]
    QueueFull(String),

    /// The connection's writer has gone away.
    #[error("connection {0} is closed")]
    Closed(String),
}

/// An inbound client control frame that could not be understood.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// The frame was not valid JSON or did not match a known frame shape.
    #[error("malformed control frame: {0}")]
    Malformed(#[from] serde_json::Error),

    /// The frame arrived as binary data that is not UTF-8.
    #[error("non-UTF-8 frame ({0} bytes)")]
    NonUtf8(usize),
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn confidence_display() {
        let err = ValidationError::ConfidenceOutOfRange(1.1);
        assert_eq!(err.to_string(), "confidence 1.1 is outside [0, 1]");
    }

    #[test]
    fn empty_field_display() {
        let err = ValidationError::EmptyField("content.summary");
        assert!(err.to_string().contains("content.summary"));
    }

    #[test]
    fn json_error_from_conversion() {
        let json_err = serde_json::from_str::<serde_json::Value>("{bad}").unwrap_err();
        let err: ValidationError = json_err.into();
        assert_matches!(err, ValidationError::Json(_));
    }

    #[test]
    fn transport_error_names_connection() {
        let err = TransportError::Closed("conn-9".into());
        assert_eq!(err.to_string(), "connection conn-9 is closed");
    }

    #[test]
    fn protocol_error_from_json() {
        let json_err = serde_json::from_str::<serde_json::Value>("nope").unwrap_err();
        let err: ProtocolError = json_err.into();
        assert!(err.to_string().starts_with("malformed control frame"));
    }
}
