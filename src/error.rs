//! Error types for sotto.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SottoError {
    // Configuration errors
    #[error("Configuration file not found at {path}")]
    ConfigFileNotFound { path: String },

    #[error("Invalid configuration value for {key}: {message}")]
    ConfigInvalidValue { key: String, message: String },

    #[error("Configuration error: {0}")]
    Config(#[from] toml::de::Error),

    // Wire protocol errors (fatal for the connection)
    #[error("Malformed event header: {message}")]
    MalformedHeader { message: String },

    #[error("Truncated event payload: expected {expected} bytes, got {actual}")]
    TruncatedPayload { expected: usize, actual: usize },

    #[error("Protocol error: {message}")]
    Protocol { message: String },

    // Session errors (reported to the client, connection survives)
    #[error("Event '{event}' not valid in state {state}")]
    InvalidState { event: String, state: String },

    #[error("Unsupported audio format: {message}")]
    UnsupportedFormat { message: String },

    // Engine errors
    #[error("Engine unavailable: {message}")]
    EngineUnavailable { message: String },

    #[error("Decode failed: {message}")]
    DecodeFailed { message: String },

    #[error("Decode timed out after {ms}ms")]
    DecodeTimeout { ms: u64 },

    // Dispatcher errors
    #[error("Session limit reached ({limit} active)")]
    ResourceExhausted { limit: usize },

    // General I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // Generic error for cases not covered above
    #[error("{0}")]
    Other(String),
}

impl SottoError {
    /// Stable machine-readable code carried in outgoing Error events.
    ///
    /// Clients branch on this, not on the message text: `protocol-error`
    /// means give up the connection, `invalid-state` and `decode-failed`
    /// mean the session survives, `resource-exhausted` means try later.
    pub fn code(&self) -> &'static str {
        match self {
            SottoError::MalformedHeader { .. }
            | SottoError::TruncatedPayload { .. }
            | SottoError::Protocol { .. } => "protocol-error",
            SottoError::InvalidState { .. } => "invalid-state",
            SottoError::UnsupportedFormat { .. } => "unsupported-format",
            SottoError::EngineUnavailable { .. } => "engine-unavailable",
            SottoError::DecodeFailed { .. } | SottoError::DecodeTimeout { .. } => "decode-failed",
            SottoError::ResourceExhausted { .. } => "resource-exhausted",
            _ => "internal-error",
        }
    }

    /// Whether this error desynchronizes the byte stream.
    ///
    /// Fatal errors close the connection after a best-effort Error event;
    /// everything else is reported and the connection keeps going.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            SottoError::MalformedHeader { .. }
                | SottoError::TruncatedPayload { .. }
                | SottoError::Protocol { .. }
                | SottoError::Io(_)
        )
    }
}

// Type alias for convenience
pub type Result<T> = std::result::Result<T, SottoError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn test_malformed_header_display() {
        let error = SottoError::MalformedHeader {
            message: "not valid JSON".to_string(),
        };
        assert_eq!(error.to_string(), "Malformed event header: not valid JSON");
    }

    #[test]
    fn test_truncated_payload_display() {
        let error = SottoError::TruncatedPayload {
            expected: 3200,
            actual: 100,
        };
        assert_eq!(
            error.to_string(),
            "Truncated event payload: expected 3200 bytes, got 100"
        );
    }

    #[test]
    fn test_invalid_state_display() {
        let error = SottoError::InvalidState {
            event: "audio-chunk".to_string(),
            state: "AwaitingStart".to_string(),
        };
        assert_eq!(
            error.to_string(),
            "Event 'audio-chunk' not valid in state AwaitingStart"
        );
    }

    #[test]
    fn test_decode_timeout_display() {
        let error = SottoError::DecodeTimeout { ms: 30000 };
        assert_eq!(error.to_string(), "Decode timed out after 30000ms");
    }

    #[test]
    fn test_resource_exhausted_display() {
        let error = SottoError::ResourceExhausted { limit: 10 };
        assert_eq!(error.to_string(), "Session limit reached (10 active)");
    }

    #[test]
    fn test_codes_are_stable() {
        assert_eq!(
            SottoError::MalformedHeader {
                message: String::new()
            }
            .code(),
            "protocol-error"
        );
        assert_eq!(
            SottoError::TruncatedPayload {
                expected: 1,
                actual: 0
            }
            .code(),
            "protocol-error"
        );
        assert_eq!(
            SottoError::InvalidState {
                event: String::new(),
                state: String::new()
            }
            .code(),
            "invalid-state"
        );
        assert_eq!(
            SottoError::DecodeFailed {
                message: String::new()
            }
            .code(),
            "decode-failed"
        );
        assert_eq!(SottoError::DecodeTimeout { ms: 1 }.code(), "decode-failed");
        assert_eq!(
            SottoError::ResourceExhausted { limit: 1 }.code(),
            "resource-exhausted"
        );
        assert_eq!(
            SottoError::Other("x".to_string()).code(),
            "internal-error"
        );
    }

    #[test]
    fn test_fatal_classification() {
        assert!(
            SottoError::MalformedHeader {
                message: String::new()
            }
            .is_fatal()
        );
        assert!(
            SottoError::Protocol {
                message: String::new()
            }
            .is_fatal()
        );
        assert!(
            !SottoError::InvalidState {
                event: String::new(),
                state: String::new()
            }
            .is_fatal()
        );
        assert!(
            !SottoError::DecodeFailed {
                message: String::new()
            }
            .is_fatal()
        );
        assert!(!SottoError::ResourceExhausted { limit: 1 }.is_fatal());
    }

    #[test]
    fn test_from_io_error() {
        let io_error = io::Error::new(io::ErrorKind::NotFound, "file not found");
        let error: SottoError = io_error.into();
        assert!(error.to_string().contains("file not found"));
        assert!(error.is_fatal());
    }

    #[test]
    fn test_from_toml_error() {
        let toml_str = "invalid = toml = syntax";
        let toml_error = toml::from_str::<toml::Value>(toml_str).unwrap_err();
        let error: SottoError = toml_error.into();
        assert!(error.to_string().contains("Configuration error"));
    }

    #[test]
    fn test_error_is_send_and_sync() {
        fn assert_send<T: Send>() {}
        fn assert_sync<T: Sync>() {}

        assert_send::<SottoError>();
        assert_sync::<SottoError>();
    }

    #[test]
    fn test_result_type_alias() {
        fn returns_result() -> Result<i32> {
            Ok(42)
        }
        assert_eq!(returns_result().unwrap(), 42);
    }
}
