//! # Database and Ledger Error Types
//!
//! ## Error Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Error Propagation                                    │
//! │                                                                         │
//! │  SQLite Error (sqlx::Error)                                            │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  DbError ← categorized by constraint kind / extended result code       │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  LedgerError ← what services return, tagged with an ErrorKind          │
//! │       │        (storage details only reachable through source())        │
//! │       ▼                                                                 │
//! │  Surrounding service layer maps kind() to client messages              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use pawn_core::{CoreError, ErrorKind, ValidationError};
use thiserror::Error;

/// SQLite extended result codes the ledger reacts to.
const SQLITE_BUSY: &str = "5";
const SQLITE_LOCKED: &str = "6";
const SQLITE_BUSY_RECOVERY: &str = "261";
const SQLITE_BUSY_SNAPSHOT: &str = "517";
const SQLITE_CONSTRAINT_TRIGGER: &str = "1811";

// =============================================================================
// DbError
// =============================================================================

/// Database operation errors.
///
/// These errors wrap sqlx errors and categorize them so the service layer
/// can decide between `Conflict`, `NotFound` and an opaque storage failure.
#[derive(Debug, Error)]
pub enum DbError {
    /// Entity not found in database.
    #[error("{entity} not found: {id}")]
    NotFound { entity: String, id: String },

    /// Unique constraint violation.
    ///
    /// ## When This Occurs
    /// - Second open session for a register or user
    /// - Two movements racing for the same sequence number
    #[error("Duplicate {field}: '{value}' already exists")]
    UniqueViolation { field: String, value: String },

    /// Foreign key constraint violation.
    #[error("Foreign key violation: {message}")]
    ForeignKeyViolation { message: String },

    /// CHECK constraint violation (conservation, payment split).
    #[error("Check constraint violation: {message}")]
    CheckViolation { message: String },

    /// A trigger rejected a change to an append-only or posted row.
    #[error("Immutable record: {message}")]
    ImmutableRecord { message: String },

    /// The database stayed locked past the busy timeout.
    #[error("Database busy: {0}")]
    Busy(String),

    /// Database connection failed.
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Migration failed.
    #[error("Migration failed: {0}")]
    MigrationFailed(String),

    /// Query execution failed.
    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// Pool exhausted (all connections in use).
    #[error("Connection pool exhausted")]
    PoolExhausted,

    /// Internal database error.
    #[error("Internal database error: {0}")]
    Internal(String),
}

impl DbError {
    /// Creates a NotFound error for a given entity type and ID.
    pub fn not_found(entity: impl Into<String>, id: impl Into<String>) -> Self {
        DbError::NotFound {
            entity: entity.into(),
            id: id.into(),
        }
    }

    /// Creates a UniqueViolation error.
    pub fn duplicate(field: impl Into<String>, value: impl Into<String>) -> Self {
        DbError::UniqueViolation {
            field: field.into(),
            value: value.into(),
        }
    }
}

/// Convert sqlx errors to DbError.
///
/// ## Error Mapping
/// ```text
/// sqlx::Error::RowNotFound            → DbError::NotFound
/// Database, kind UniqueViolation      → DbError::UniqueViolation
/// Database, kind ForeignKeyViolation  → DbError::ForeignKeyViolation
/// Database, kind CheckViolation       → DbError::CheckViolation
/// Database, code 1811 (trigger)       → DbError::ImmutableRecord
/// Database, code 5/6/261/517          → DbError::Busy
/// sqlx::Error::PoolTimedOut           → DbError::PoolExhausted
/// Other                               → DbError::Internal
/// ```
impl From<sqlx::Error> for DbError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => DbError::NotFound {
                entity: "Record".to_string(),
                id: "unknown".to_string(),
            },

            sqlx::Error::Database(db_err) => {
                let message = db_err.message().to_string();
                let code = db_err.code().map(|c| c.into_owned()).unwrap_or_default();

                match db_err.kind() {
                    sqlx::error::ErrorKind::UniqueViolation => {
                        // "UNIQUE constraint failed: cash_sessions.register_id"
                        let field = message
                            .split("constraint failed: ")
                            .nth(1)
                            .unwrap_or("unknown")
                            .to_string();
                        DbError::UniqueViolation {
                            field,
                            value: "unknown".to_string(),
                        }
                    }
                    sqlx::error::ErrorKind::ForeignKeyViolation => {
                        DbError::ForeignKeyViolation { message }
                    }
                    sqlx::error::ErrorKind::CheckViolation => DbError::CheckViolation { message },
                    _ => match code.as_str() {
                        SQLITE_CONSTRAINT_TRIGGER => DbError::ImmutableRecord { message },
                        SQLITE_BUSY | SQLITE_LOCKED | SQLITE_BUSY_RECOVERY | SQLITE_BUSY_SNAPSHOT => {
                            DbError::Busy(message)
                        }
                        _ => DbError::QueryFailed(message),
                    },
                }
            }

            sqlx::Error::PoolTimedOut => DbError::PoolExhausted,

            sqlx::Error::PoolClosed => DbError::ConnectionFailed("Pool is closed".to_string()),

            _ => DbError::Internal(err.to_string()),
        }
    }
}

impl From<sqlx::migrate::MigrateError> for DbError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        DbError::MigrationFailed(err.to_string())
    }
}

/// Result type for database operations.
pub type DbResult<T> = Result<T, DbError>;

// =============================================================================
// LedgerError
// =============================================================================

/// What every ledger service operation returns.
///
/// Callers match on [`LedgerError::kind`], never on the message. Storage
/// failures display as an opaque "storage failure"; the underlying
/// [`DbError`] stays reachable through `std::error::Error::source`.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// A pure ledger rule rejected the request.
    #[error(transparent)]
    Domain(#[from] CoreError),

    /// Referenced row does not exist.
    #[error("{entity} not found: {id}")]
    NotFound { entity: String, id: String },

    /// A concurrency guard tripped. Safe to retry after re-reading state.
    #[error("{entity} {id} conflict: {reason}")]
    Conflict {
        entity: String,
        id: String,
        reason: String,
    },

    /// An external collaborator (item, customer, audit) failed.
    #[error("{service} failed: {message}")]
    Collaborator {
        service: &'static str,
        message: String,
    },

    /// Storage failed in a way no caller can act on.
    #[error("storage failure")]
    Storage(#[source] DbError),
}

impl LedgerError {
    pub fn not_found(entity: impl Into<String>, id: impl Into<String>) -> Self {
        LedgerError::NotFound {
            entity: entity.into(),
            id: id.into(),
        }
    }

    pub fn conflict(entity: impl Into<String>, id: impl Into<String>, reason: impl Into<String>) -> Self {
        LedgerError::Conflict {
            entity: entity.into(),
            id: id.into(),
            reason: reason.into(),
        }
    }

    pub fn collaborator(service: &'static str, message: impl Into<String>) -> Self {
        LedgerError::Collaborator {
            service,
            message: message.into(),
        }
    }

    /// The taxonomy tag callers match on.
    pub fn kind(&self) -> ErrorKind {
        match self {
            LedgerError::Domain(err) => err.kind(),
            LedgerError::NotFound { .. } => ErrorKind::NotFound,
            LedgerError::Conflict { .. } => ErrorKind::Conflict,
            LedgerError::Collaborator { .. } | LedgerError::Storage(_) => ErrorKind::Internal,
        }
    }

    /// Only `Conflict` is worth retrying.
    pub fn is_retryable(&self) -> bool {
        self.kind().is_retryable()
    }
}

impl From<DbError> for LedgerError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::NotFound { entity, id } => LedgerError::NotFound { entity, id },
            DbError::UniqueViolation { field, .. } => {
                LedgerError::conflict("record", field, "uniqueness guard")
            }
            DbError::ImmutableRecord { message } => {
                LedgerError::conflict("record", "immutable", message)
            }
            DbError::Busy(_) => LedgerError::conflict("database", "sqlite", "database busy"),
            other => LedgerError::Storage(other),
        }
    }
}

impl From<sqlx::Error> for LedgerError {
    fn from(err: sqlx::Error) -> Self {
        DbError::from(err).into()
    }
}

impl From<ValidationError> for LedgerError {
    fn from(err: ValidationError) -> Self {
        LedgerError::Domain(err.into())
    }
}

/// Result type for ledger service operations.
pub type LedgerResult<T> = Result<T, LedgerError>;

// =============================================================================
// Unit Tests
// =============================================================================
