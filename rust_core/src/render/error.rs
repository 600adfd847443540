use thiserror::Error;

pub type Result<T> = std::result::Result<T, RenderError>;

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Render timed out: {0}")]
    Timeout(String),

    #[error("Renderer API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("Renderer unavailable: {0}")]
    Unavailable(String),
}

impl RenderError {
    /// Transient failures are worth another attempt with a fresh session.
    pub fn is_transient(&self) -> bool {
        match self {
            RenderError::Network(_) | RenderError::Timeout(_) => true,
            RenderError::Api { status, .. } => *status == 429 || *status >= 500,
            RenderError::Unavailable(_) => false,
        }
    }

    /// The backend refused the account itself: quota spent or credentials
    /// rejected. Nothing succeeds until the account changes state.
    pub fn rejects_account(&self) -> bool {
        matches!(self, RenderError::Api { status: 401 | 402 | 403 | 429, .. })
    }
}

impl From<reqwest::Error> for RenderError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            RenderError::Timeout(err.to_string())
        } else {
            RenderError::Network(err.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(RenderError::Network("reset".into()).is_transient());
        assert!(RenderError::Timeout("80s".into()).is_transient());
        assert!(RenderError::Api { status: 503, message: String::new() }.is_transient());
        assert!(RenderError::Api { status: 429, message: String::new() }.is_transient());
        assert!(!RenderError::Api { status: 401, message: String::new() }.is_transient());
        assert!(!RenderError::Unavailable("circuit open".into()).is_transient());
    }

    #[test]
    fn test_account_rejection() {
        assert!(RenderError::Api { status: 429, message: String::new() }.rejects_account());
        assert!(RenderError::Api { status: 401, message: String::new() }.rejects_account());
        assert!(!RenderError::Api { status: 502, message: String::new() }.rejects_account());
        assert!(!RenderError::Timeout("80s".into()).rejects_account());
    }
}
