/// hospdb Error Module
///
/// This module defines the error types for the hospdb crate. Connection
/// failures are classified separately (see `ConnectFailure`) because the
/// query and mutation helpers report them as outcomes rather than errors.
use crate::core::db::ConnectFailure;
use postgres::error::SqlState;
use thiserror::Error;

/// Error type for the hospdb crate.
///
/// Covers:
/// - SQL execution faults reported by PostgreSQL (syntax, constraints)
/// - Result shaping problems (column list mismatches)
/// - Schema helper misuse (invalid table names, empty drop lists)
/// - Configuration loading and validation
/// - CLI usage errors
#[derive(Error, Debug)]
pub enum HospdbError {
    /// Errors reported by the PostgreSQL client, including SQL faults
    #[error("Database error: {0}")]
    Database(#[from] postgres::Error),

    /// A connection attempt failed (only surfaced by `try_connect` callers)
    #[error("Connection error: {0}")]
    Connection(ConnectFailure),

    /// Query result shaping errors
    #[error("Query error: {0}")]
    Query(String),

    /// Schema bootstrap misuse
    #[error("Schema error: {0}")]
    Schema(String),

    /// Configuration loading and validation errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// File system and I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML parsing errors
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    /// Command-line usage errors
    #[error("Command error: {0}")]
    Command(String),
}

impl HospdbError {
    /// SQLSTATE of the underlying database fault, if any.
    pub fn sql_state(&self) -> Option<&SqlState> {
        match self {
            HospdbError::Database(e) => e.code(),
            _ => None,
        }
    }

    /// True when the database rejected a duplicate key.
    pub fn is_unique_violation(&self) -> bool {
        self.sql_state() == Some(&SqlState::UNIQUE_VIOLATION)
    }

    /// True when the database rejected a row referencing a missing parent.
    pub fn is_foreign_key_violation(&self) -> bool {
        self.sql_state() == Some(&SqlState::FOREIGN_KEY_VIOLATION)
    }

    /// True when a CHECK constraint (e.g. non-negative amounts) was violated.
    pub fn is_check_violation(&self) -> bool {
        self.sql_state() == Some(&SqlState::CHECK_VIOLATION)
    }
}

impl From<ConnectFailure> for HospdbError {
    fn from(failure: ConnectFailure) -> Self {
        HospdbError::Connection(failure)
    }
}

/// Type alias for Result to use HospdbError as the error type.
pub type Result<T> = std::result::Result<T, HospdbError>;
