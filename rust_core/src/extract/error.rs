use thiserror::Error;

/// Failure to turn one payload block, payload object or card into a record.
/// Always local to that item; extraction carries on with the rest.
#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("Payload array starting at byte {0} is not terminated")]
    UnterminatedPayload(usize),

    #[error("Payload JSON parse failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Payload object dropped: {0}")]
    PayloadObject(String),

    #[error("Card dropped: {0}")]
    Card(String),

    #[error("Invalid selector '{selector}': {message}")]
    Selector { selector: String, message: String },

    #[error("Invalid site base URL: {0}")]
    BaseUrl(String),
}
