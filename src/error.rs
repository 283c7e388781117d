use std::time::Duration;
use thiserror::Error;

/// Conditions callers are expected to branch on.
///
/// Plumbing failures (I/O, HTTP, JSON) travel as `anyhow::Error`; these are the
/// ones a CLI or the scheduler reacts to specifically.
#[derive(Debug, Error)]
pub enum TownError {
    #[error("no agent named '{0}'")]
    AgentNotFound(String),

    #[error("no location named '{0}'")]
    LocationNotFound(String),

    #[error("generation timed out after {0:?}")]
    GenerationTimeout(Duration),

    #[error("generation failed: {0}")]
    Generation(String),
}

impl TownError {
    /// True for the lookup failures that should be shown to a user rather than logged.
    pub fn is_not_found(&self) -> bool {
        matches!(self, TownError::AgentNotFound(_) | TownError::LocationNotFound(_))
    }
}
