//! # Cash Session Rules
//!
//! Running balance and reconciliation math for register sessions.
//!
//! ## Reconciliation
//! ```text
//!  opening_amount        500.00
//!  + Σ income            820.00   (payments, sales)
//!  − Σ expense         1,000.00   (disbursements, refunds)
//!  ───────────────────────────
//!  expected_amount       320.00
//!  closing_amount        315.00   (counted by the operator)
//!  difference             −5.00   (short)
//! ```

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};
use crate::money::Money;
use crate::types::{CashMovement, CashSession, MovementType};

/// Balance after applying one movement to the prior balance.
///
/// Income adds, expense subtracts.
pub fn next_balance(prior: Money, movement_type: MovementType, amount: Money) -> Money {
    match movement_type {
        MovementType::Income => prior + amount,
        MovementType::Expense => prior - amount,
    }
}

/// Balance the next movement builds on: the last movement's
/// `balance_after`, or the opening amount for an empty session.
pub fn prior_balance(session: &CashSession, last: Option<&CashMovement>) -> Money {
    last.map(CashMovement::balance_after)
        .unwrap_or_else(|| session.opening_amount())
}

/// Validates a movement before it is appended.
///
/// ## Errors
/// - `InvalidStatus` when the session is closed
/// - `InvalidAmount` when the amount is not positive
pub fn check_movement(session: &CashSession, amount: Money) -> CoreResult<()> {
    if !session.is_open() {
        return Err(CoreError::invalid_status(
            "CashSession",
            &session.id,
            session.status,
            "record movement",
        ));
    }
    if !amount.is_positive() {
        return Err(CoreError::invalid_amount(format!(
            "cash movement amount must be positive, got {}",
            amount
        )));
    }
    Ok(())
}

/// Income/expense totals of a session's journal.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MovementTotals {
    pub income: Money,
    pub expense: Money,
    pub income_count: i64,
    pub expense_count: i64,
}

impl MovementTotals {
    /// Totals over a full movement journal.
    pub fn from_movements(movements: &[CashMovement]) -> Self {
        movements.iter().fold(MovementTotals::default(), |mut acc, m| {
            match m.movement_type {
                MovementType::Income => {
                    acc.income += m.amount();
                    acc.income_count += 1;
                }
                MovementType::Expense => {
                    acc.expense += m.amount();
                    acc.expense_count += 1;
                }
            }
            acc
        })
    }

    /// `income − expense`.
    pub fn net(&self) -> Money {
        self.income - self.expense
    }
}

/// Figures written on close.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reconciliation {
    pub expected: Money,
    pub closing: Money,
    /// `closing − expected`: positive is over, negative is short.
    pub difference: Money,
}

/// Reconciles a counted closing amount against the journal.
pub fn reconcile(opening: Money, totals: &MovementTotals, closing: Money) -> Reconciliation {
    let expected = opening + totals.net();
    Reconciliation {
        expected,
        closing,
        difference: closing - expected,
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{PaymentMethod, SessionStatus};
    use chrono::Utc;

    fn session(opening: i64) -> CashSession {
        CashSession {
            id: "cs-1".to_string(),
            session_number: "CS-20240301-0001".to_string(),
            branch_id: "branch-1".to_string(),
            register_id: "reg-1".to_string(),
            user_id: "clerk".to_string(),
            status: SessionStatus::Open,
            opening_amount_cents: opening,
            closing_amount_cents: None,
            expected_amount_cents: None,
            difference_cents: None,
            opened_at: Utc::now(),
            closed_at: None,
            notes: None,
        }
    }

    fn movement(sequence: i64, movement_type: MovementType, amount: i64, after: i64) -> CashMovement {
        CashMovement {
            id: format!("mv-{}", sequence),
            session_id: "cs-1".to_string(),
            sequence,
            movement_type,
            amount_cents: amount,
            payment_method: PaymentMethod::Cash,
            reference_type: None,
            reference_id: None,
            description: None,
            balance_after_cents: after,
            created_by: "clerk".to_string(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_running_balance() {
        let s = session(50_000);
        assert_eq!(prior_balance(&s, None).cents(), 50_000);

        let first = next_balance(prior_balance(&s, None), MovementType::Income, Money::from_cents(82_000));
        assert_eq!(first.cents(), 132_000);

        let mv = movement(1, MovementType::Income, 82_000, first.cents());
        let second = next_balance(prior_balance(&s, Some(&mv)), MovementType::Expense, Money::from_cents(100_000));
        assert_eq!(second.cents(), 32_000);
    }

    #[test]
    fn test_reconcile() {
        let movements = vec![
            movement(1, MovementType::Income, 82_000, 132_000),
            movement(2, MovementType::Expense, 100_000, 32_000),
        ];
        let totals = MovementTotals::from_movements(&movements);
        assert_eq!(totals.income_count, 1);
        assert_eq!(totals.net().cents(), -18_000);

        let result = reconcile(Money::from_cents(50_000), &totals, Money::from_cents(31_500));
        assert_eq!(result.expected.cents(), 32_000);
        assert_eq!(result.difference.cents(), -500);
    }

    #[test]
    fn test_check_movement() {
        let mut s = session(0);
        assert!(check_movement(&s, Money::from_cents(1)).is_ok());
        assert!(check_movement(&s, Money::zero()).is_err());
        s.status = SessionStatus::Closed;
        let err = check_movement(&s, Money::from_cents(1)).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::InvalidStatus);
    }
}
