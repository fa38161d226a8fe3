//! # Payment Allocator
//!
//! Splits an incoming payment across the loan's balance buckets and applies
//! or reverts the split.
//!
//! ## Waterfall
//! ```text
//!   amount ──► late_fee_remaining ──► interest_remaining ──► principal_remaining
//!                 (capped)               (capped)               (capped)
//!                                                                   │
//!                                          leftover > 0 ──► InvalidAmount
//! ```
//!
//! Overpayment is never accepted: callers quote the payoff amount first.

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};
use crate::money::Money;
use crate::types::{Loan, Payment};

/// How a payment amount is split across the buckets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Allocation {
    pub late_fee: Money,
    pub interest: Money,
    pub principal: Money,
    /// True when every bucket is zero after applying the allocation.
    pub fully_paid: bool,
}

impl Allocation {
    /// Sum of the three parts.
    pub fn total(&self) -> Money {
        self.late_fee + self.interest + self.principal
    }

    /// The split stored on a payment row.
    pub fn from_payment(payment: &Payment) -> Self {
        Allocation {
            late_fee: Money::from_cents(payment.late_fee_cents),
            interest: Money::from_cents(payment.interest_cents),
            principal: Money::from_cents(payment.principal_cents),
            fully_paid: false,
        }
    }
}

/// Computes the split of `amount` against the loan's current buckets.
///
/// ## Example
/// ```rust
/// # use pawn_core::allocation::allocate;
/// # use pawn_core::money::Money;
/// # fn check(loan: &pawn_core::types::Loan) {
/// // late fee 50, interest 100, principal 1000, paying 120
/// let split = allocate(loan, Money::from_cents(120)).unwrap();
/// assert_eq!(split.late_fee.cents(), 50);
/// assert_eq!(split.interest.cents(), 70);
/// assert_eq!(split.principal.cents(), 0);
/// # }
/// ```
///
/// ## Errors
/// `InvalidAmount` when `amount <= 0` or exceeds the payoff amount.
pub fn allocate(loan: &Loan, amount: Money) -> CoreResult<Allocation> {
    if !amount.is_positive() {
        return Err(CoreError::invalid_amount(format!(
            "payment amount must be positive, got {}",
            amount
        )));
    }

    let payoff = loan.payoff_amount();
    if amount > payoff {
        return Err(CoreError::invalid_amount(format!(
            "payment {} exceeds payoff {}",
            amount, payoff
        )));
    }

    let mut available = amount;
    let late_fee = available.min(loan.late_fee_remaining());
    available -= late_fee;
    let interest = available.min(loan.interest_remaining());
    available -= interest;
    let principal = available.min(loan.principal_remaining());
    available -= principal;

    debug_assert!(available.is_zero());

    Ok(Allocation {
        late_fee,
        interest,
        principal,
        fully_paid: amount == payoff,
    })
}

/// Subtracts the allocation from the loan's buckets.
///
/// Status changes are left to the caller (`loan::transition`).
pub fn apply(loan: &mut Loan, allocation: &Allocation) {
    loan.late_fee_remaining_cents -= allocation.late_fee.cents();
    loan.interest_remaining_cents -= allocation.interest.cents();
    loan.principal_remaining_cents -= allocation.principal.cents();
    loan.amount_paid_cents += allocation.total().cents();
}

/// Adds a previously applied allocation back to the loan's buckets.
///
/// ## Errors
/// `InvalidAmount` if the loan has less paid than the allocation being
/// reverted, which means the stored split does not belong to this loan.
pub fn revert(loan: &mut Loan, allocation: &Allocation) -> CoreResult<()> {
    if allocation.total().cents() > loan.amount_paid_cents {
        return Err(CoreError::invalid_amount(format!(
            "cannot revert {} from loan {} with {} paid",
            allocation.total(),
            loan.id,
            loan.amount_paid()
        )));
    }
    loan.late_fee_remaining_cents += allocation.late_fee.cents();
    loan.interest_remaining_cents += allocation.interest.cents();
    loan.principal_remaining_cents += allocation.principal.cents();
    loan.amount_paid_cents -= allocation.total().cents();
    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::loan::tests::sample_loan;

    fn loan_with_buckets(late_fee: i64, interest: i64, principal: i64) -> Loan {
        let mut loan = sample_loan(principal);
        loan.interest_amount_cents = interest;
        loan.interest_remaining_cents = interest;
        loan.total_amount_cents = principal + interest;
        loan.late_fee_amount_cents = late_fee;
        loan.late_fee_remaining_cents = late_fee;
        assert!(loan.is_conserved());
        loan
    }

    #[test]
    fn test_allocation_order() {
        let mut loan = loan_with_buckets(50, 100, 1_000);
        let split = allocate(&loan, Money::from_cents(120)).unwrap();
        assert_eq!(split.late_fee.cents(), 50);
        assert_eq!(split.interest.cents(), 70);
        assert_eq!(split.principal.cents(), 0);
        assert!(!split.fully_paid);

        apply(&mut loan, &split);
        assert_eq!(loan.interest_remaining_cents, 30);
        assert_eq!(loan.late_fee_remaining_cents, 0);
        assert!(loan.is_conserved());
    }

    #[test]
    fn test_full_payoff() {
        let mut loan = loan_with_buckets(50, 100, 1_000);
        let split = allocate(&loan, Money::from_cents(1_150)).unwrap();
        assert!(split.fully_paid);
        apply(&mut loan, &split);
        assert!(loan.is_settled());
        assert!(loan.is_conserved());
    }

    #[test]
    fn test_rejects_overpayment_and_non_positive() {
        let loan = loan_with_buckets(50, 100, 1_000);
        let over = allocate(&loan, Money::from_cents(1_151)).unwrap_err();
        assert_eq!(over.kind(), ErrorKind::InvalidAmount);
        assert_eq!(
            allocate(&loan, Money::zero()).unwrap_err().kind(),
            ErrorKind::InvalidAmount
        );
        assert_eq!(
            allocate(&loan, Money::from_cents(-5)).unwrap_err().kind(),
            ErrorKind::InvalidAmount
        );
    }

    #[test]
    fn test_revert_restores_buckets() {
        let mut loan = loan_with_buckets(50, 100, 1_000);
        let before = loan.clone();
        let split = allocate(&loan, Money::from_cents(600)).unwrap();
        apply(&mut loan, &split);
        revert(&mut loan, &split).unwrap();
        assert_eq!(loan, before);

        assert!(revert(&mut loan, &split).is_err());
    }

    #[test]
    fn test_conservation_over_sequence() {
        let mut loan = loan_with_buckets(75, 333, 10_000);
        for amount in [1, 74, 200, 58, 4_000, 6_075] {
            let split = allocate(&loan, Money::from_cents(amount)).unwrap();
            assert_eq!(split.total().cents(), amount);
            apply(&mut loan, &split);
            assert!(loan.is_conserved());
        }
        assert!(loan.is_settled());
    }
}
