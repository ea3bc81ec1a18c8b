//! Error types for the SMS relay.

/// Top-level error type for engine operations that touch the stores.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Database-related errors.
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("Connection pool error: {0}")]
    Pool(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Entity not found: {entity} with id {id}")]
    NotFound { entity: String, id: String },

    #[error("Migration failed: {0}")]
    Migration(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Failures talking to a destination.
///
/// Every variant is recoverable: delivery paths queue the message for retry,
/// poll paths treat the destination as having no task this cycle.
#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    #[error("Transport failure: {0}")]
    Transport(String),

    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Malformed response ({reason}): {body}")]
    Parse { reason: String, body: String },
}

impl From<reqwest::Error> for DeliveryError {
    fn from(e: reqwest::Error) -> Self {
        Self::Transport(e.to_string())
    }
}

impl DeliveryError {
    /// Raw response body, when the failure happened after one was read.
    pub fn body(&self) -> Option<&str> {
        match self {
            Self::Transport(_) => None,
            Self::Status { body, .. } | Self::Parse { body, .. } => Some(body),
        }
    }
}

/// A destination answered, but not with a command we may honour.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProtocolError {
    #[error("No task")]
    NoTask,

    #[error("No task: secret mismatch")]
    SecretMismatch,

    #[error("No task: unrecognised task '{0}'")]
    UnknownTask(String),
}

/// Result type alias for the relay.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delivery_error_exposes_body() {
        let err = DeliveryError::Status {
            status: 502,
            body: "bad gateway".into(),
        };
        assert_eq!(err.body(), Some("bad gateway"));
        assert!(DeliveryError::Transport("refused".into()).body().is_none());
    }

    #[test]
    fn protocol_errors_read_as_no_task() {
        assert!(ProtocolError::SecretMismatch.to_string().starts_with("No task"));
        assert_eq!(
            ProtocolError::UnknownTask("reboot".into()).to_string(),
            "No task: unrecognised task 'reboot'"
        );
    }
}
