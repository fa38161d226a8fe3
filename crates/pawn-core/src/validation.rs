//! # Validation Module
//!
//! Input validation for ledger requests.
//!
//! ## Validation Strategy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Validation Layers                                  │
//! │                                                                         │
//! │  Layer 1: Surrounding service layer                                    │
//! │  ├── Authentication, request shape                                     │
//! │  └── Customer / item existence                                         │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 2: Ledger services (pawn-db)                                    │
//! │  ├── THIS MODULE: field rules                                          │
//! │  └── Ledger rules (loan, allocation, accounting modules)               │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 3: Database (SQLite)                                            │
//! │  ├── CHECK constraints (conservation, payment split)                   │
//! │  ├── Partial UNIQUE indexes (one open session)                         │
//! │  └── Triggers (append-only movements, posted entries)                  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use crate::error::ValidationError;
use crate::money::Money;
use crate::types::Rate;

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Rates above 100% per period are rejected as typos.
pub const MAX_RATE_BPS: u32 = 10_000;

/// Upper bound for free-text notes and reasons.
pub const MAX_NOTES_LEN: usize = 1_000;

// =============================================================================
// String Validators
// =============================================================================

/// Validates that an identifier-like field is present.
///
/// ## Example
/// ```rust
/// use pawn_core::validation::validate_required;
///
/// assert!(validate_required("register_id", "REG-01").is_ok());
/// assert!(validate_required("register_id", "   ").is_err());
/// ```
pub fn validate_required(field: &str, value: &str) -> ValidationResult<()> {
    if value.trim().is_empty() {
        return Err(ValidationError::Required {
            field: field.to_string(),
        });
    }

    if value.len() > 100 {
        return Err(ValidationError::TooLong {
            field: field.to_string(),
            max: 100,
        });
    }

    Ok(())
}

/// Validates optional free text (notes, reversal reasons).
pub fn validate_notes(field: &str, notes: Option<&str>) -> ValidationResult<()> {
    match notes {
        Some(text) if text.len() > MAX_NOTES_LEN => Err(ValidationError::TooLong {
            field: field.to_string(),
            max: MAX_NOTES_LEN,
        }),
        _ => Ok(()),
    }
}

/// Validates a mandatory reason (reversals, cancellations).
pub fn validate_reason(reason: &str) -> ValidationResult<()> {
    if reason.trim().is_empty() {
        return Err(ValidationError::Required {
            field: "reason".to_string(),
        });
    }
    validate_notes("reason", Some(reason))
}

// =============================================================================
// Numeric Validators
// =============================================================================

/// Validates a money amount that must be strictly positive.
///
/// ## Example
/// ```rust
/// use pawn_core::money::Money;
/// use pawn_core::validation::validate_positive_amount;
///
/// assert!(validate_positive_amount("loan_amount", Money::from_cents(1)).is_ok());
/// assert!(validate_positive_amount("loan_amount", Money::zero()).is_err());
/// ```
pub fn validate_positive_amount(field: &str, amount: Money) -> ValidationResult<()> {
    if !amount.is_positive() {
        return Err(ValidationError::MustBePositive {
            field: field.to_string(),
        });
    }
    Ok(())
}

/// Validates a money amount that may be zero (opening float, closing count).
pub fn validate_non_negative_amount(field: &str, amount: Money) -> ValidationResult<()> {
    if amount.is_negative() {
        return Err(ValidationError::OutOfRange {
            field: field.to_string(),
            min: 0,
            max: i64::MAX,
        });
    }
    Ok(())
}

/// Validates a periodic rate in basis points.
///
/// ## Rules
/// - Zero is allowed (interest-free promotional loans)
/// - Must not exceed [`MAX_RATE_BPS`]
pub fn validate_rate(field: &str, rate: Rate) -> ValidationResult<()> {
    if rate.bps() > MAX_RATE_BPS {
        return Err(ValidationError::OutOfRange {
            field: field.to_string(),
            min: 0,
            max: MAX_RATE_BPS as i64,
        });
    }
    Ok(())
}

/// Validates a loan term in days.
pub fn validate_term_days(term_days: i64) -> ValidationResult<()> {
    if term_days <= 0 {
        return Err(ValidationError::MustBePositive {
            field: "term_days".to_string(),
        });
    }
    Ok(())
}

// =============================================================================
// UUID Validators
// =============================================================================

/// Validates a UUID string format.
///
/// ## Example
/// ```rust
/// use pawn_core::validation::validate_uuid;
///
/// assert!(validate_uuid("550e8400-e29b-41d4-a716-446655440000").is_ok());
/// assert!(validate_uuid("not-a-uuid").is_err());
/// ```
pub fn validate_uuid(id: &str) -> ValidationResult<()> {
    if id.trim().is_empty() {
        return Err(ValidationError::Required {
            field: "id".to_string(),
        });
    }

    uuid::Uuid::parse_str(id).map_err(|_| ValidationError::InvalidFormat {
        field: "id".to_string(),
        reason: "must be a valid UUID".to_string(),
    })?;

    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_required() {
        assert!(validate_required("user_id", "cashier-1").is_ok());
        assert!(validate_required("user_id", "").is_err());
        assert!(validate_required("user_id", &"x".repeat(101)).is_err());
    }

    #[test]
    fn test_validate_amounts() {
        assert!(validate_positive_amount("amount", Money::from_cents(1)).is_ok());
        assert!(validate_positive_amount("amount", Money::from_cents(-1)).is_err());
        assert!(validate_non_negative_amount("opening", Money::zero()).is_ok());
        assert!(validate_non_negative_amount("opening", Money::from_cents(-1)).is_err());
    }

    #[test]
    fn test_validate_rate() {
        assert!(validate_rate("interest_rate", Rate::zero()).is_ok());
        assert!(validate_rate("interest_rate", Rate::from_bps(10_000)).is_ok());
        assert!(validate_rate("interest_rate", Rate::from_bps(10_001)).is_err());
    }

    #[test]
    fn test_validate_term_and_reason() {
        assert!(validate_term_days(30).is_ok());
        assert!(validate_term_days(0).is_err());
        assert!(validate_reason("customer dispute").is_ok());
        assert!(validate_reason("  ").is_err());
        assert!(validate_notes("notes", Some(&"n".repeat(1_001))).is_err());
        assert!(validate_notes("notes", None).is_ok());
    }

    #[test]
    fn test_validate_uuid() {
        assert!(validate_uuid("550e8400-e29b-41d4-a716-446655440000").is_ok());
        assert!(validate_uuid("").is_err());
        assert!(validate_uuid("123").is_err());
    }
}
