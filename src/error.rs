//! Error and outcome types shared by the stores.

use serde::Serialize;

/// Errors surfaced by store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Preset not found: {0}")]
    PresetNotFound(String),

    #[error("API key unavailable: {0:#}")]
    Credentials(anyhow::Error),

    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Why a mutation was not applied.
#[derive(Serialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum Rejection {
    /// A response is streaming in; conversation state is locked.
    Busy,
    NotFound,
}

/// Result of a guarded mutation.
#[must_use]
#[derive(Serialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(tag = "status", content = "reason", rename_all = "camelCase")]
pub enum Outcome {
    Applied,
    Rejected(Rejection),
}

impl Outcome {
    pub fn is_applied(self) -> bool {
        matches!(self, Outcome::Applied)
    }
}
