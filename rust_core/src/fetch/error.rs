use crate::render::RenderError;
use crate::retry::Transient;
use thiserror::Error;

/// Why a single render attempt was rejected.
#[derive(Debug, Error)]
pub enum AttemptError {
    #[error("Block page returned")]
    Blocked,

    #[error("Structural mismatch: found {found} markers, need {required}")]
    StructuralMismatch { found: usize, required: usize },

    #[error("Unexpected status {0}")]
    Status(u16),

    #[error(transparent)]
    Render(#[from] RenderError),
}

impl AttemptError {
    /// Block pages escalate to the next egress country instead of simply
    /// retrying.
    pub fn escalates_egress(&self) -> bool {
        matches!(self, AttemptError::Blocked)
    }
}

impl Transient for AttemptError {
    /// Bad pages may come out right with a fresh session. Renderer errors
    /// such as a rejected API key will not.
    fn is_transient(&self) -> bool {
        match self {
            AttemptError::Blocked | AttemptError::StructuralMismatch { .. } | AttemptError::Status(_) => true,
            AttemptError::Render(e) => e.is_transient(),
        }
    }
}

/// Every strategy (and the fallback, when allowed) failed to produce an
/// acceptable page.
#[derive(Debug, Error)]
#[error("Fetch failed after {attempts} attempts: {reason}")]
pub struct FetchFailure {
    pub reason: String,
    pub attempts: u32,
}
