use thiserror::Error;

pub type Result<T> = std::result::Result<T, StoreError>;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Store API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("Database error: {0}")]
    Database(String),

    #[error("Invalid identifier: {0}")]
    InvalidIdentifier(String),

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Store configuration error: {0}")]
    Config(String),
}

impl StoreError {
    /// Whether the same call may succeed if simply repeated.
    pub fn is_transient(&self) -> bool {
        match self {
            StoreError::Network(_) => true,
            StoreError::Api { status, .. } => *status == 408 || *status == 429 || *status >= 500,
            StoreError::Database(message) => is_transient_db_message(message),
            StoreError::InvalidIdentifier(_) | StoreError::Decode(_) | StoreError::Config(_) => false,
        }
    }
}

/// Connection-level and serialization failures reported by Postgres.
fn is_transient_db_message(message: &str) -> bool {
    let msg = message.to_lowercase();

    msg.contains("connection")
        || msg.contains("timeout")
        || msg.contains("timed out")
        || msg.contains("broken pipe")
        || msg.contains("could not serialize")
        || msg.contains("deadlock detected")
        || msg.contains("too many clients")
        || msg.contains("server closed the connection")
        || msg.contains("ssl error")
        || msg.contains("network error")
}

impl From<reqwest::Error> for StoreError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            StoreError::Decode(err.to_string())
        } else {
            StoreError::Network(err.to_string())
        }
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Io(e) => StoreError::Network(e.to_string()),
            sqlx::Error::PoolTimedOut => StoreError::Network("connection pool timed out".to_string()),
            sqlx::Error::ColumnDecode { .. } | sqlx::Error::Decode(_) => StoreError::Decode(err.to_string()),
            other => StoreError::Database(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(StoreError::Network("reset".into()).is_transient());
        assert!(StoreError::Api { status: 503, message: String::new() }.is_transient());
        assert!(!StoreError::Api { status: 409, message: String::new() }.is_transient());
        assert!(StoreError::Database("deadlock detected".into()).is_transient());
        assert!(StoreError::Database("server closed the connection unexpectedly".into()).is_transient());
        assert!(!StoreError::Database("column \"x\" does not exist".into()).is_transient());
        assert!(!StoreError::InvalidIdentifier("a;b".into()).is_transient());
    }
}
