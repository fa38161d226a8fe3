//! # Installment Planner
//!
//! Derives the repayment schedule of an installment loan and keeps each
//! installment's paid state in step with the loan's balance.
//!
//! ## Split
//! ```text
//! total_amount 1300.00, interest 300.00, 3 installments
//!
//!  #   total     interest   principal
//!  1   433.33     100.00     333.33
//!  2   433.33     100.00     333.33
//!  3   433.34     100.00     333.34   ◄── total remainder lands here
//!     ───────    ───────    ───────
//!     1300.00     300.00    1000.00
//! ```

use chrono::{DateTime, Duration, Utc};

use crate::error::{CoreResult, ValidationError};
use crate::money::Money;
use crate::types::{Installment, Loan, PaymentPlanType};

/// Generates the schedule for a loan.
///
/// Returns an empty schedule for single-payment loans and for installment
/// loans that request no installments without requiring a minimum payment.
///
/// ## Errors
/// `InvalidInput` when the plan requires a minimum payment but has no
/// installments.
pub fn generate_schedule(loan: &Loan) -> CoreResult<Vec<Installment>> {
    if loan.payment_plan_type == PaymentPlanType::SinglePayment {
        return Ok(Vec::new());
    }

    let count = loan.number_of_installments;
    if count <= 0 {
        if loan.requires_minimum_payment {
            return Err(ValidationError::MustBePositive {
                field: "number_of_installments".to_string(),
            }
            .into());
        }
        return Ok(Vec::new());
    }

    let total = loan.total_amount();
    let interest_total = loan.interest_amount();
    let totals = total.split_evenly(count as usize);

    // Interest follows the cumulative total, so each installment's interest
    // stays within [0, share] and the last one closes exactly on the total.
    let mut cumulative = Money::zero();
    let mut interest_allocated = Money::zero();
    let mut schedule = Vec::with_capacity(totals.len());
    for (index, share) in totals.iter().enumerate() {
        let number = index as i64 + 1;
        cumulative += *share;
        let interest_to_date = cumulative.proportion(interest_total, total);
        let interest = interest_to_date - interest_allocated;
        interest_allocated = interest_to_date;

        schedule.push(Installment {
            id: format!("{}-{:03}", loan.id, number),
            loan_id: loan.id.clone(),
            installment_number: number,
            due_date: installment_due_date(loan, number),
            principal_cents: (*share - interest).cents(),
            interest_cents: interest.cents(),
            total_cents: share.cents(),
            amount_paid_cents: 0,
            is_paid: false,
            paid_date: None,
        });
    }

    Ok(schedule)
}

/// Due dates are spread evenly across the term; the last one is the loan's
/// due date.
fn installment_due_date(loan: &Loan, number: i64) -> DateTime<Utc> {
    if number >= loan.number_of_installments {
        return loan.due_date;
    }
    let offset = loan.term_days * number / loan.number_of_installments;
    loan.start_date + Duration::days(offset)
}

/// Distributes the principal+interest paid so far over the schedule in
/// order.
///
/// Payments and reversals both call this with the loan's new total, so the
/// schedule never drifts from the loan's buckets. Returns true when any
/// installment changed.
pub fn apply_paid_total(installments: &mut [Installment], paid: Money, now: DateTime<Utc>) -> bool {
    let mut remaining = paid.max(Money::zero());
    let mut changed = false;

    for installment in installments.iter_mut() {
        let applied = remaining.min(installment.total());
        remaining -= applied;

        let is_paid = applied == installment.total();
        let paid_date = match (is_paid, installment.is_paid) {
            (true, true) => installment.paid_date,
            (true, false) => Some(now),
            (false, _) => None,
        };

        if installment.amount_paid_cents != applied.cents() || installment.is_paid != is_paid {
            changed = true;
        }
        installment.amount_paid_cents = applied.cents();
        installment.is_paid = is_paid;
        installment.paid_date = paid_date;
    }

    changed
}

/// Sum of installment totals; equals the loan's `total_amount`.
pub fn schedule_total(installments: &[Installment]) -> Money {
    installments.iter().map(Installment::total).sum()
}

/// First installment not yet fully paid.
pub fn next_due(installments: &[Installment]) -> Option<&Installment> {
    installments.iter().find(|i| !i.is_paid)
}

// =============================================================================
// Unit Tests
// =============================================================================
