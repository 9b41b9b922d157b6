//! Database error types.

use thiserror::Error;

/// SQLSTATE code reported for unique-constraint violations.
pub const UNIQUE_VIOLATION_CODE: &str = "23505";

/// Errors that can occur when using the database.
#[derive(Error, Debug)]
pub enum DbError {
    /// The backend cannot be reached.
    #[error("Database unavailable")]
    Unavailable,

    /// Failed to read or write a snapshot.
    #[error("Snapshot I/O failed: {0}")]
    Io(#[from] std::io::Error),

    /// Failed to (de)serialize a row.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A row was not a JSON object or had no `id` column.
    #[error("Row in {table} has no id column")]
    MissingId { table: String },

    /// A unique column already holds this value.
    #[error("Duplicate value for {table}.{column}: {value}")]
    UniqueViolation {
        table: String,
        column: String,
        value: String,
    },

    /// No row with this id.
    #[error("No row in {table} with id {id}")]
    NotFound { table: String, id: String },
}

impl DbError {
    /// Postgres-style error code, where one applies.
    pub fn code(&self) -> Option<&'static str> {
        match self {
            DbError::UniqueViolation { .. } => Some(UNIQUE_VIOLATION_CODE),
            _ => None,
        }
    }

    /// Check if this is a unique-constraint violation.
    pub fn is_unique_violation(&self) -> bool {
        matches!(self, DbError::UniqueViolation { .. })
    }
}
