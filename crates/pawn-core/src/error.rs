//! # Error Types
//!
//! Domain-specific error types for pawn-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  pawn-core errors (this file)                                          │
//! │  ├── ErrorKind        - Tag the caller matches on                      │
//! │  ├── CoreError        - Ledger rule violations                         │
//! │  └── ValidationError  - Input validation failures                      │
//! │                                                                         │
//! │  pawn-db errors (separate crate)                                       │
//! │  ├── DbError          - Database operation failures                    │
//! │  └── LedgerError      - What services return (has a kind())            │
//! │                                                                         │
//! │  Flow: ValidationError → CoreError → LedgerError → service layer       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Design Principles
//! 1. Use `thiserror` for derive macros (not manual impl)
//! 2. Include context in error messages (loan id, status, amounts)
//! 3. Callers match on [`ErrorKind`], never on message text
//! 4. Storage details never leak into a kind

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::money::Money;

// =============================================================================
// Error Kind
// =============================================================================

/// Error taxonomy shared by every ledger operation.
///
/// ## Retry Policy
/// ```text
/// InvalidInput   ── fix the request          ── never retried
/// InvalidStatus  ── entity in wrong state    ── never retried
/// InvalidAmount  ── money invariant violated ── never retried
/// Conflict       ── concurrency guard        ── retry after re-read
/// NotFound       ── referenced row missing   ── never retried
/// Internal       ── storage / collaborator   ── caller decides
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    InvalidInput,
    InvalidStatus,
    InvalidAmount,
    Conflict,
    NotFound,
    Internal,
}

impl ErrorKind {
    /// Only concurrency conflicts are worth retrying unchanged.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ErrorKind::Conflict)
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ErrorKind::InvalidInput => "invalid_input",
            ErrorKind::InvalidStatus => "invalid_status",
            ErrorKind::InvalidAmount => "invalid_amount",
            ErrorKind::Conflict => "conflict",
            ErrorKind::NotFound => "not_found",
            ErrorKind::Internal => "internal",
        };
        f.write_str(name)
    }
}

// =============================================================================
// Core Error
// =============================================================================

/// Ledger rule violations.
///
/// These errors come out of the pure functions in this crate and are
/// carried unchanged through the service layer.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Operation is not legal from the entity's current state.
    ///
    /// ## When This Occurs
    /// - Renewing a paid, confiscated or cancelled loan
    /// - Confiscating a loan that is not overdue (or still in grace)
    /// - Recording a movement on a closed cash session
    #[error("{entity} {id} is {status}, cannot {operation}")]
    InvalidStatus {
        entity: &'static str,
        id: String,
        status: String,
        operation: &'static str,
    },

    /// A payment or movement amount violates a money invariant.
    ///
    /// ## User Workflow
    /// ```text
    /// Payoff quote: 1150.00
    ///      │
    ///      ▼
    /// Customer hands over 1150.01
    ///      │
    ///      ▼
    /// InvalidAmount { reason: "payment 1150.01 exceeds payoff 1150.00" }
    /// ```
    #[error("Invalid amount: {reason}")]
    InvalidAmount { reason: String },

    /// Journal lines do not balance.
    #[error("Entry is unbalanced: debits {debit} != credits {credit}")]
    Unbalanced { debit: Money, credit: Money },

    /// Validation error (wraps ValidationError).
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

impl CoreError {
    /// Creates an InvalidStatus error.
    pub fn invalid_status(
        entity: &'static str,
        id: impl Into<String>,
        status: impl std::fmt::Display,
        operation: &'static str,
    ) -> Self {
        CoreError::InvalidStatus {
            entity,
            id: id.into(),
            status: status.to_string(),
            operation,
        }
    }

    /// Creates an InvalidAmount error.
    pub fn invalid_amount(reason: impl Into<String>) -> Self {
        CoreError::InvalidAmount {
            reason: reason.into(),
        }
    }

    /// Returns the taxonomy tag for this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            CoreError::InvalidStatus { .. } => ErrorKind::InvalidStatus,
            CoreError::InvalidAmount { .. } => ErrorKind::InvalidAmount,
            CoreError::Unbalanced { .. } => ErrorKind::InvalidInput,
            CoreError::Validation(_) => ErrorKind::InvalidInput,
        }
    }
}

// =============================================================================
// Validation Error
// =============================================================================

/// Input validation errors.
///
/// These errors occur when request data doesn't meet requirements.
/// Used for early validation before ledger rules run.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// A required field is missing or empty.
    #[error("{field} is required")]
    Required { field: String },

    /// Field value is too long.
    #[error("{field} must be at most {max} characters")]
    TooLong { field: String, max: usize },

    /// Numeric value is out of range.
    #[error("{field} must be between {min} and {max}")]
    OutOfRange { field: String, min: i64, max: i64 },

    /// Value must be positive.
    #[error("{field} must be positive")]
    MustBePositive { field: String },

    /// Invalid format (e.g., invalid UUID).
    #[error("{field} has invalid format: {reason}")]
    InvalidFormat { field: String, reason: String },

    /// Cross-field rule violation.
    #[error("{field}: {reason}")]
    Inconsistent { field: String, reason: String },
}

impl ValidationError {
    /// Creates an Inconsistent error.
    pub fn inconsistent(field: impl Into<String>, reason: impl Into<String>) -> Self {
        ValidationError::Inconsistent {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

// =============================================================================
// Result Type Alias
// =============================================================================

/// Convenience type alias for Results with CoreError.
pub type CoreResult<T> = Result<T, CoreError>;

// =============================================================================
// Unit Tests
// =============================================================================
