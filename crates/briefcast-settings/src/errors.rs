//! Settings error types.

use thiserror::Error;

/// Errors that can occur when loading settings.
#[derive(Debug, Error)]
pub enum SettingsError {
    /// The settings file exists but could not be read.
    #[error("failed to read settings file: {0}")]
    Io(#[from] std::io::Error),
    /// The settings file is not valid JSON or has wrongly-typed fields.
    #[error("failed to parse settings JSON: {0}")]
    Json(#[from] serde_json::Error),
    /// A value parsed but is unusable (e.g. a zero heartbeat interval).
    #[error("invalid settings value: {0}")]
    InvalidValue(String),
}

/// Result type for settings operations.
pub type Result<T> = std::result::Result<T, SettingsError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_error_from_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let err: SettingsError = io_err.into();
        assert!(matches!(err, SettingsError::Io(_)));
        assert!(err.to_string().contains("denied"));
    }

    #[test]
    fn json_error_display() {
        let json_err = serde_json::from_str::<serde_json::Value>("{bad}").unwrap_err();
        let err = SettingsError::from(json_err);
        assert!(err.to_string().starts_with("failed to parse settings JSON"));
    }

    #[test]
    fn invalid_value_display() {
        let err = SettingsError::InvalidValue("server.heartbeatIntervalMs must be > 0".into());
        assert_eq!(
            err.to_string(),
            "invalid settings value: server.heartbeatIntervalMs must be > 0"
        );
    }
}
