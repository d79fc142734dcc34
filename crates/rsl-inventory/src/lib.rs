//! ---
//! rsl_section: "03-persistence-logging"
//! rsl_subsection: "module"
//! rsl_type: "source"
//! rsl_scope: "code"
//! rsl_description: "Authoritative station inventory and lifecycle journal."
//! rsl_version: "v0.0.0-prealpha"
//! rsl_owner: "tbd"
//! ---
//! The inventory is the single source of truth for which stations exist.
//! Every mutation is preceded by a backup copy and written atomically.

use thiserror::Error;

pub mod backup;
pub mod codec;
pub mod journal;
pub mod memory;
pub mod record;
pub mod store;

pub use backup::BackupRotation;
pub use journal::{Journal, JournalEntry, JournalOutcome};
pub use memory::MemoryInventory;
pub use record::{
    validate_address, validate_station_id, validate_station_name, RecordError, StationFilter,
    StationRecord, StationStatus,
};
pub use store::{CsvInventory, InventoryBackend, UpsertOutcome, ValidationReport, Violation};

/// Result alias for inventory operations.
pub type Result<T> = std::result::Result<T, InventoryError>;

/// Errors surfaced by the inventory store and journal.
#[derive(Debug, Error)]
pub enum InventoryError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),
    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("inventory header mismatch: expected '{expected}', found '{found}'")]
    HeaderMismatch { expected: String, found: String },
    #[error("malformed inventory row at line {line}: {reason}")]
    MalformedRow { line: u64, reason: String },
    #[error("station {0} not found in inventory")]
    NotFound(u32),
    #[error(transparent)]
    InvalidRecord(#[from] RecordError),
    #[error("failed to persist inventory: {0}")]
    Persist(#[from] tempfile::PersistError),
}
