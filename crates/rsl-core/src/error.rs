//! ---
//! rsl_section: "01-core-functionality"
//! rsl_subsection: "module"
//! rsl_type: "source"
//! rsl_scope: "code"
//! rsl_description: "Lifecycle error taxonomy."
//! rsl_version: "v0.0.0-prealpha"
//! rsl_owner: "tbd"
//! ---
use std::fmt;

use rsl_inventory::{InventoryError, RecordError};
use serde::Serialize;
use thiserror::Error;

/// Result alias for lifecycle operations.
pub type Result<T> = std::result::Result<T, LifecycleError>;

/// Every failure a lifecycle operation can report.
#[derive(Debug, Error)]
pub enum LifecycleError {
    /// Malformed input. Raised before any external call is made.
    #[error("validation failed: {0}")]
    Validation(String),
    /// Identifier, address, or hostname already claimed.
    #[error("conflict: {0}")]
    Conflict(String),
    /// Storage pool unhealthy or short on capacity.
    #[error("insufficient resources: {0}")]
    Resource(String),
    /// A collaborator call failed; earlier steps may already be applied.
    #[error("{stage} failed: {message}")]
    ExternalTool { stage: String, message: String },
    #[error("not found: {0}")]
    NotFound(String),
    /// The operator declined a destructive prompt.
    #[error("operation declined by operator")]
    ConfirmationDeclined,
    #[error("inventory store error: {0}")]
    Store(#[source] InventoryError),
    #[error("no free station id in {start}..={end}")]
    RangeExhausted { start: u32, end: u32 },
}

impl LifecycleError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict(message.into())
    }

    /// Wrap a collaborator failure, keeping the full context chain.
    pub fn external(stage: impl fmt::Display, err: anyhow::Error) -> Self {
        Self::ExternalTool {
            stage: stage.to_string(),
            message: format!("{err:#}"),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            LifecycleError::Validation(_) => ErrorKind::Validation,
            LifecycleError::Conflict(_) => ErrorKind::Conflict,
            LifecycleError::Resource(_) => ErrorKind::Resource,
            LifecycleError::ExternalTool { .. } => ErrorKind::ExternalTool,
            LifecycleError::NotFound(_) => ErrorKind::NotFound,
            LifecycleError::ConfirmationDeclined => ErrorKind::ConfirmationDeclined,
            LifecycleError::Store(_) => ErrorKind::StoreIo,
            LifecycleError::RangeExhausted { .. } => ErrorKind::RangeExhausted,
        }
    }
}

impl From<InventoryError> for LifecycleError {
    fn from(err: InventoryError) -> Self {
        match err {
            InventoryError::NotFound(id) => LifecycleError::NotFound(format!("station {id}")),
            InventoryError::InvalidRecord(inner) => LifecycleError::Validation(inner.to_string()),
            other => LifecycleError::Store(other),
        }
    }
}

impl From<RecordError> for LifecycleError {
    fn from(err: RecordError) -> Self {
        LifecycleError::Validation(err.to_string())
    }
}

/// Flat classification used in structured outcomes and bulk reports.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Validation,
    Conflict,
    Resource,
    ExternalTool,
    NotFound,
    ConfirmationDeclined,
    StoreIo,
    RangeExhausted,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Validation => "validation",
            ErrorKind::Conflict => "conflict",
            ErrorKind::Resource => "resource",
            ErrorKind::ExternalTool => "external_tool",
            ErrorKind::NotFound => "not_found",
            ErrorKind::ConfirmationDeclined => "confirmation_declined",
            ErrorKind::StoreIo => "store_io",
            ErrorKind::RangeExhausted => "range_exhausted",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
