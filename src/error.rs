use thiserror::Error;

/// Failures surfaced by the attendance ledger.
///
/// Every variant is scoped to the single operation that produced it; the
/// persisted state is left as it was before the call.
#[derive(Error, Debug)]
pub enum LedgerError {
    /// Bad input shape or values (date ordering, empty required field, empty selection).
    #[error("validation failed: {0}")]
    Validation(String),

    /// Import source is missing required fields for the selected kind.
    #[error("import source missing required fields: {}", missing.join(", "))]
    Schema { missing: Vec<String> },

    /// Import source could not be opened or parsed.
    #[error("failed to read import source: {0}")]
    SourceRead(String),

    /// Durable read or write failure.
    #[error("storage error: {0}")]
    Storage(#[from] rusqlite::Error),
}

impl LedgerError {
    pub fn validation(message: impl Into<String>) -> Self {
        LedgerError::Validation(message.into())
    }

    /// Stable code used on the IPC wire.
    pub fn code(&self) -> &'static str {
        match self {
            LedgerError::Validation(_) => "validation_failed",
            LedgerError::Schema { .. } => "schema_mismatch",
            LedgerError::SourceRead(_) => "source_read_failed",
            LedgerError::Storage(_) => "storage_failed",
        }
    }
}

pub type LedgerResult<T> = Result<T, LedgerError>;
