//! Error types for rewind.

use thiserror::Error;

/// Result type alias using rewind's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for rewind operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Database operation failed (wraps sqlx::Error)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// A ledger row names a collection that is not registered for replay
    #[error("Replay configuration error: {0}")]
    ReplayConfiguration(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid input (malformed history entry, ledger row, document or patch)
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),

    /// No resolvable acting user
    #[error("Unauthorized: {0}")]
    Unauthorized(String),
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_not_found() {
        let err = Error::NotFound("annotation 42".to_string());
        assert_eq!(err.to_string(), "Not found: annotation 42");
    }

    #[test]
    fn test_error_display_replay_configuration() {
        let err = Error::ReplayConfiguration("unknown collection 'widget'".to_string());
        assert_eq!(
            err.to_string(),
            "Replay configuration error: unknown collection 'widget'"
        );
    }

    #[test]
    fn test_error_display_invalid_input() {
        let err = Error::InvalidInput("action name is empty".to_string());
        assert_eq!(err.to_string(), "Invalid input: action name is empty");
    }

    #[test]
    fn test_error_display_unauthorized() {
        let err = Error::Unauthorized("You must be logged in.".to_string());
        assert_eq!(err.to_string(), "Unauthorized: You must be logged in.");
    }

    #[test]
    fn test_error_display_config() {
        let err = Error::Config("PORT is not a number".to_string());
        assert_eq!(err.to_string(), "Configuration error: PORT is not a number");
    }

    #[test]
    fn test_from_serde_json_error() {
        let json_err = serde_json::from_str::<i32>("not a number").unwrap_err();
        let err: Error = json_err.into();
        match err {
            Error::Serialization(msg) => assert!(!msg.is_empty()),
            _ => panic!("Expected Serialization error"),
        }
    }

    #[test]
    fn test_from_sqlx_error() {
        let err: Error = sqlx::Error::RowNotFound.into();
        assert!(err.to_string().starts_with("Database error:"));
    }

    #[test]
    fn test_error_is_send_sync() {
        fn assert_send<T: Send>() {}
        fn assert_sync<T: Sync>() {}

        assert_send::<Error>();
        assert_sync::<Error>();
    }
}
