use thiserror::Error;

use crate::plan::TaskCategory;
use crate::time::TimeParseError;

/// Failure taxonomy shared by the planner, ledger and storage layers.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Referenced record does not exist or belongs to another owner.
    #[error("{kind} `{id}` not found")]
    NotFound { kind: &'static str, id: String },

    /// A mutating action was attempted without a resolvable owner.
    #[error("no authenticated owner for this operation")]
    Unauthorized,

    /// Regimen-provisioned tasks cannot be removed by the end user.
    #[error("task `{id}` is a system task and cannot be deleted")]
    SystemTask { id: String },

    /// The category only holds regimen-provisioned tasks.
    #[error("category {0:?} does not accept custom tasks")]
    ClosedCategory(TaskCategory),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid time: {0}")]
    InvalidTime(#[from] TimeParseError),
}

impl EngineError {
    pub fn not_found(kind: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            kind,
            id: id.into(),
        }
    }

    /// Errors the caller can trigger on purpose; these are logged as warnings
    /// rather than failures of the storage collaborator.
    pub fn is_expected(&self) -> bool {
        matches!(
            self,
            Self::NotFound { .. }
                | Self::Unauthorized
                | Self::SystemTask { .. }
                | Self::ClosedCategory(_)
        )
    }
}

pub type Result<T, E = EngineError> = std::result::Result<T, E>;
