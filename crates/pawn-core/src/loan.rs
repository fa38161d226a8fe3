//! # Loan Rules
//!
//! Origination math, overdue recomputation, late-fee accrual, the status
//! state machine and renewal successor construction.
//!
//! ## Lifecycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Loan Lifecycle                                  │
//! │                                                                         │
//! │  originate()        ──► Loan { active | pending }                      │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  apply_accrual(as_of) on every read and before every mutation          │
//! │       │   days_overdue  = whole days past due_date                     │
//! │       │   late_fee      = rate × principal_remaining × periods         │
//! │       │   (re-derived each time, never accumulated)                    │
//! │       ▼                                                                 │
//! │  allocation::apply  ──► paid       (all buckets zero)                  │
//! │  renewal_successor  ──► renewed    (old row closed, new row created)   │
//! │  ensure_confiscable ──► confiscated                                    │
//! │  ensure_cancellable ──► cancelled                                      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Everything here is pure: callers supply the clock reading and the
//! identifiers, and persist the returned values themselves.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult, ValidationError};
use crate::money::Money;
use crate::types::{Loan, LoanStatus, PaymentMethod, PaymentPlanType, Rate};
use crate::validation::{
    validate_notes, validate_positive_amount, validate_rate, validate_required,
    validate_term_days, ValidationResult,
};

// =============================================================================
// Policy
// =============================================================================

/// Branch-wide loan limits and accrual parameters.
///
/// Loaded from the `[loans]` section of the ledger configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoanPolicy {
    pub min_loan_cents: i64,
    pub max_loan_cents: i64,
    pub min_term_days: i64,
    pub max_term_days: i64,
    /// Length of one late-fee period in days.
    pub late_fee_period_days: i64,
    /// Days past due before the first late-fee period starts.
    pub late_fee_grace_days: i64,
    /// Days past due before collateral may be confiscated.
    pub confiscation_grace_days: i64,
}

impl Default for LoanPolicy {
    fn default() -> Self {
        LoanPolicy {
            min_loan_cents: 10_00,
            max_loan_cents: 1_000_000_00,
            min_term_days: 1,
            max_term_days: 365,
            late_fee_period_days: 30,
            late_fee_grace_days: 0,
            confiscation_grace_days: 30,
        }
    }
}

impl LoanPolicy {
    /// Rejects inverted limits and zero periods.
    pub fn validate(&self) -> ValidationResult<()> {
        if self.min_loan_cents <= 0 || self.min_loan_cents > self.max_loan_cents {
            return Err(ValidationError::inconsistent(
                "loans.min_loan_cents",
                "must be positive and not above max_loan_cents",
            ));
        }
        if self.min_term_days <= 0 || self.min_term_days > self.max_term_days {
            return Err(ValidationError::inconsistent(
                "loans.min_term_days",
                "must be positive and not above max_term_days",
            ));
        }
        if self.late_fee_period_days <= 0 {
            return Err(ValidationError::MustBePositive {
                field: "loans.late_fee_period_days".to_string(),
            });
        }
        if self.late_fee_grace_days < 0 || self.confiscation_grace_days < 0 {
            return Err(ValidationError::inconsistent(
                "loans.grace_days",
                "grace windows cannot be negative",
            ));
        }
        Ok(())
    }

    /// Checks amount and term against the branch limits and, when given,
    /// the stricter limits of the collateral's category.
    pub fn check_limits(
        &self,
        amount: Money,
        term_days: i64,
        category: Option<&CategoryLimits>,
    ) -> ValidationResult<()> {
        let (min_amount, max_amount, min_term, max_term) = match category {
            Some(limits) => (
                limits.min_loan_cents.max(self.min_loan_cents),
                limits.max_loan_cents.min(self.max_loan_cents),
                limits.min_term_days.max(self.min_term_days),
                limits.max_term_days.min(self.max_term_days),
            ),
            None => (
                self.min_loan_cents,
                self.max_loan_cents,
                self.min_term_days,
                self.max_term_days,
            ),
        };

        if amount.cents() < min_amount || amount.cents() > max_amount {
            return Err(ValidationError::OutOfRange {
                field: "loan_amount".to_string(),
                min: min_amount,
                max: max_amount,
            });
        }
        if term_days < min_term || term_days > max_term {
            return Err(ValidationError::OutOfRange {
                field: "term_days".to_string(),
                min: min_term,
                max: max_term,
            });
        }
        Ok(())
    }
}

/// Per-category limits supplied by the item catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryLimits {
    pub category: String,
    pub min_loan_cents: i64,
    pub max_loan_cents: i64,
    pub min_term_days: i64,
    pub max_term_days: i64,
}

// =============================================================================
// Origination
// =============================================================================

/// Request to originate a loan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewLoan {
    pub branch_id: String,
    pub customer_id: String,
    pub item_id: String,
    pub loan_amount: Money,
    pub interest_rate: Rate,
    pub late_fee_rate: Rate,
    pub term_days: i64,
    pub payment_plan_type: PaymentPlanType,
    pub number_of_installments: i64,
    pub requires_minimum_payment: bool,
    pub disbursement_method: PaymentMethod,
    /// Defaults to the clock reading when absent.
    pub start_date: Option<DateTime<Utc>>,
    /// Collateral category limits, when the catalog defines them.
    pub category_limits: Option<CategoryLimits>,
    /// Create the loan `pending`; money moves on a later disbursement.
    pub defer_disbursement: bool,
    pub notes: Option<String>,
    pub created_by: String,
}

/// Number of rate periods charged at origination.
///
/// Single-payment loans carry one flat period; installment loans carry one
/// period per installment.
pub fn interest_periods(plan: PaymentPlanType, number_of_installments: i64) -> i64 {
    match plan {
        PaymentPlanType::SinglePayment => 1,
        PaymentPlanType::Installments => number_of_installments.max(1),
    }
}

/// Interest charged at issuance.
///
/// ## Example
/// ```rust
/// use pawn_core::loan::origination_interest;
/// use pawn_core::money::Money;
/// use pawn_core::types::{PaymentPlanType, Rate};
///
/// let principal = Money::from_cents(100_000);
/// let rate = Rate::from_bps(1_000);
/// assert_eq!(origination_interest(principal, rate, PaymentPlanType::SinglePayment, 0).cents(), 10_000);
/// assert_eq!(origination_interest(principal, rate, PaymentPlanType::Installments, 3).cents(), 30_000);
/// ```
pub fn origination_interest(
    principal: Money,
    rate: Rate,
    plan: PaymentPlanType,
    number_of_installments: i64,
) -> Money {
    principal.apply_rate_times(rate, interest_periods(plan, number_of_installments))
}

/// Validates a loan request and builds the row to persist.
///
/// ## Rules
/// - `loan_amount > 0`, `interest_rate` within bounds, `term_days > 0`
/// - amount and term inside policy and category limits (`InvalidInput`)
/// - installment plans need at least one installment when a minimum
///   payment is required
pub fn originate(
    request: &NewLoan,
    policy: &LoanPolicy,
    id: String,
    loan_number: String,
    now: DateTime<Utc>,
) -> CoreResult<Loan> {
    validate_required("branch_id", &request.branch_id)?;
    validate_required("customer_id", &request.customer_id)?;
    validate_required("item_id", &request.item_id)?;
    validate_required("created_by", &request.created_by)?;
    validate_positive_amount("loan_amount", request.loan_amount)?;
    validate_rate("interest_rate", request.interest_rate)?;
    validate_rate("late_fee_rate", request.late_fee_rate)?;
    validate_term_days(request.term_days)?;
    validate_notes("notes", request.notes.as_deref())?;
    policy.check_limits(
        request.loan_amount,
        request.term_days,
        request.category_limits.as_ref(),
    )?;
    validate_installment_count(
        request.payment_plan_type,
        request.number_of_installments,
        request.requires_minimum_payment,
    )?;

    let start_date = request.start_date.unwrap_or(now);
    let interest = origination_interest(
        request.loan_amount,
        request.interest_rate,
        request.payment_plan_type,
        request.number_of_installments,
    );
    let total = request.loan_amount + interest;
    let status = if request.defer_disbursement {
        LoanStatus::Pending
    } else {
        LoanStatus::Active
    };

    Ok(Loan {
        id,
        loan_number,
        branch_id: request.branch_id.clone(),
        customer_id: request.customer_id.clone(),
        item_id: request.item_id.clone(),
        loan_amount_cents: request.loan_amount.cents(),
        interest_rate_bps: request.interest_rate.bps(),
        late_fee_rate_bps: request.late_fee_rate.bps(),
        interest_amount_cents: interest.cents(),
        total_amount_cents: total.cents(),
        late_fee_amount_cents: 0,
        principal_remaining_cents: request.loan_amount.cents(),
        interest_remaining_cents: interest.cents(),
        late_fee_remaining_cents: 0,
        amount_paid_cents: 0,
        payment_plan_type: request.payment_plan_type,
        number_of_installments: installment_count(
            request.payment_plan_type,
            request.number_of_installments,
        ),
        requires_minimum_payment: request.requires_minimum_payment,
        term_days: request.term_days,
        disbursement_method: request.disbursement_method,
        start_date,
        due_date: start_date + Duration::days(request.term_days),
        status,
        days_overdue: 0,
        renewal_count: 0,
        renewed_from_id: None,
        paid_date: None,
        confiscated_date: None,
        cancelled_date: None,
        notes: request.notes.clone(),
        created_by: request.created_by.clone(),
        created_at: now,
        updated_at: now,
        version: 0,
    })
}

fn installment_count(plan: PaymentPlanType, requested: i64) -> i64 {
    match plan {
        PaymentPlanType::SinglePayment => 0,
        PaymentPlanType::Installments => requested.max(0),
    }
}

fn validate_installment_count(
    plan: PaymentPlanType,
    number_of_installments: i64,
    requires_minimum_payment: bool,
) -> ValidationResult<()> {
    if plan == PaymentPlanType::Installments
        && number_of_installments <= 0
        && requires_minimum_payment
    {
        return Err(ValidationError::MustBePositive {
            field: "number_of_installments".to_string(),
        });
    }
    if number_of_installments > 120 {
        return Err(ValidationError::OutOfRange {
            field: "number_of_installments".to_string(),
            min: 0,
            max: 120,
        });
    }
    Ok(())
}

// =============================================================================
// Overdue and Late Fees
// =============================================================================

/// Derives `(days_overdue, status)` for a loan as of a point in time.
///
/// Only `active`/`overdue` loans move; every other status is returned
/// unchanged. A settled loan is never overdue.
///
/// ## Example
/// ```text
/// due_date = Mar 01 00:00
/// as_of    = Mar 04 12:00  ──► (3, Overdue)
/// as_of    = Mar 01 00:00  ──► (0, Active)
/// ```
pub fn recompute_overdue(loan: &Loan, as_of: DateTime<Utc>) -> (i64, LoanStatus) {
    if !loan.status.is_open() {
        return (loan.days_overdue, loan.status);
    }
    if loan.is_settled() || as_of <= loan.due_date {
        return (0, LoanStatus::Active);
    }
    let days = (as_of - loan.due_date).num_days();
    (days, LoanStatus::Overdue)
}

/// Number of late-fee periods charged for `days_overdue`.
///
/// Partial periods count as whole ones; nothing is charged inside the grace
/// window.
pub fn late_fee_periods(days_overdue: i64, policy: &LoanPolicy) -> i64 {
    let chargeable = days_overdue - policy.late_fee_grace_days;
    if chargeable <= 0 {
        return 0;
    }
    let period = policy.late_fee_period_days.max(1);
    (chargeable + period - 1) / period
}

/// Late fee owed for the given overdue days, at the loan's current rate and
/// remaining principal.
///
/// The result is never below what the customer already paid toward late
/// fees, so a shrinking principal cannot turn collected fees negative.
pub fn accrued_late_fee(loan: &Loan, days_overdue: i64, policy: &LoanPolicy) -> Money {
    let periods = late_fee_periods(days_overdue, policy);
    let derived = loan
        .principal_remaining()
        .apply_rate_times(loan.late_fee_rate(), periods);
    derived.max(loan.late_fee_paid())
}

/// Recomputes overdue days, status and late fee in place.
///
/// Idempotent: calling it twice with the same `as_of` leaves the loan
/// unchanged the second time. Returns true when anything changed.
pub fn apply_accrual(loan: &mut Loan, as_of: DateTime<Utc>, policy: &LoanPolicy) -> bool {
    if !loan.status.is_open() {
        return false;
    }

    let (days, status) = recompute_overdue(loan, as_of);
    let fee = accrued_late_fee(loan, days, policy);
    let paid = loan.late_fee_paid();
    let remaining = fee - paid;

    let changed = days != loan.days_overdue
        || status != loan.status
        || fee.cents() != loan.late_fee_amount_cents
        || remaining.cents() != loan.late_fee_remaining_cents;

    loan.days_overdue = days;
    loan.status = status;
    loan.late_fee_amount_cents = fee.cents();
    loan.late_fee_remaining_cents = remaining.cents();
    changed
}

/// Payoff figures for a loan at a point in time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayoffQuote {
    pub principal: Money,
    pub interest: Money,
    pub late_fee: Money,
    pub total: Money,
    pub days_overdue: i64,
    pub as_of: DateTime<Utc>,
}

/// Quotes the exact amount that settles the loan at `as_of`.
pub fn payoff_quote(loan: &Loan, as_of: DateTime<Utc>, policy: &LoanPolicy) -> PayoffQuote {
    let mut projected = loan.clone();
    apply_accrual(&mut projected, as_of, policy);
    PayoffQuote {
        principal: projected.principal_remaining(),
        interest: projected.interest_remaining(),
        late_fee: projected.late_fee_remaining(),
        total: projected.payoff_amount(),
        days_overdue: projected.days_overdue,
        as_of,
    }
}

// =============================================================================
// State Machine
// =============================================================================

/// Moves the loan to `next`, or fails with `InvalidStatus`.
pub fn transition(
    loan: &mut Loan,
    next: LoanStatus,
    operation: &'static str,
    now: DateTime<Utc>,
) -> CoreResult<()> {
    if !loan.status.can_transition_to(next) {
        return Err(CoreError::invalid_status("Loan", &loan.id, loan.status, operation));
    }
    loan.status = next;
    loan.updated_at = now;
    match next {
        LoanStatus::Paid => loan.paid_date = Some(now),
        LoanStatus::Confiscated => loan.confiscated_date = Some(now),
        LoanStatus::Cancelled => loan.cancelled_date = Some(now),
        LoanStatus::Active | LoanStatus::Overdue => loan.paid_date = None,
        _ => {}
    }
    Ok(())
}

/// Payments are only accepted on open loans.
pub fn ensure_payable(loan: &Loan) -> CoreResult<()> {
    if !loan.status.is_open() {
        return Err(CoreError::invalid_status("Loan", &loan.id, loan.status, "accept payment"));
    }
    Ok(())
}

/// Confiscation needs an overdue loan past the confiscation grace window.
pub fn ensure_confiscable(loan: &Loan, policy: &LoanPolicy) -> CoreResult<()> {
    if loan.status != LoanStatus::Overdue
        || loan.days_overdue < policy.confiscation_grace_days
    {
        let status = if loan.status == LoanStatus::Overdue {
            format!("overdue {} of {} grace days", loan.days_overdue, policy.confiscation_grace_days)
        } else {
            loan.status.to_string()
        };
        return Err(CoreError::invalid_status("Loan", &loan.id, status, "confiscate"));
    }
    Ok(())
}

/// A loan can be withdrawn while pending, or while active with no payments.
pub fn ensure_cancellable(loan: &Loan) -> CoreResult<()> {
    let untouched = loan.status == LoanStatus::Active && loan.amount_paid_cents == 0;
    if loan.status != LoanStatus::Pending && !untouched {
        return Err(CoreError::invalid_status("Loan", &loan.id, loan.status, "cancel"));
    }
    Ok(())
}

// =============================================================================
// Renewal
// =============================================================================

/// Terms of a renewal request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenewalTerms {
    pub new_term_days: i64,
    /// Settle interest and late fee with a companion payment; otherwise they
    /// are capitalized into the successor's principal.
    pub pay_interest: bool,
    pub new_interest_rate: Option<Rate>,
}

/// Renewal is legal only from `active` or `overdue`.
pub fn ensure_renewable(loan: &Loan) -> CoreResult<()> {
    if !loan.status.can_transition_to(LoanStatus::Renewed) {
        return Err(CoreError::invalid_status("Loan", &loan.id, loan.status, "renew"));
    }
    Ok(())
}

/// Amount moved into the successor's principal when interest is not paid.
pub fn capitalized_amount(loan: &Loan, terms: &RenewalTerms) -> Money {
    if terms.pay_interest {
        Money::zero()
    } else {
        loan.interest_remaining() + loan.late_fee_remaining()
    }
}

/// Builds the successor loan of a renewal.
///
/// The predecessor must already reflect any companion payment. The successor
/// starts at `now`, inherits plan and collateral, and charges a fresh
/// interest period on its (possibly capitalized) principal.
pub fn renewal_successor(
    previous: &Loan,
    terms: &RenewalTerms,
    policy: &LoanPolicy,
    id: String,
    loan_number: String,
    created_by: &str,
    now: DateTime<Utc>,
) -> CoreResult<Loan> {
    ensure_renewable(previous)?;
    validate_term_days(terms.new_term_days)?;
    if let Some(rate) = terms.new_interest_rate {
        validate_rate("interest_rate", rate)?;
    }
    if terms.new_term_days < policy.min_term_days || terms.new_term_days > policy.max_term_days {
        return Err(ValidationError::OutOfRange {
            field: "new_term_days".to_string(),
            min: policy.min_term_days,
            max: policy.max_term_days,
        }
        .into());
    }
    let outstanding_charges = previous.interest_remaining() + previous.late_fee_remaining();
    if terms.pay_interest && !outstanding_charges.is_zero() {
        return Err(CoreError::invalid_amount(
            "interest and late fee must be settled before renewing with pay_interest",
        ));
    }

    let principal = previous.principal_remaining() + capitalized_amount(previous, terms);
    let rate = terms.new_interest_rate.unwrap_or_else(|| previous.interest_rate());
    let interest = origination_interest(
        principal,
        rate,
        previous.payment_plan_type,
        previous.number_of_installments,
    );

    Ok(Loan {
        id,
        loan_number,
        branch_id: previous.branch_id.clone(),
        customer_id: previous.customer_id.clone(),
        item_id: previous.item_id.clone(),
        loan_amount_cents: principal.cents(),
        interest_rate_bps: rate.bps(),
        late_fee_rate_bps: previous.late_fee_rate_bps,
        interest_amount_cents: interest.cents(),
        total_amount_cents: (principal + interest).cents(),
        late_fee_amount_cents: 0,
        principal_remaining_cents: principal.cents(),
        interest_remaining_cents: interest.cents(),
        late_fee_remaining_cents: 0,
        amount_paid_cents: 0,
        payment_plan_type: previous.payment_plan_type,
        number_of_installments: previous.number_of_installments,
        requires_minimum_payment: previous.requires_minimum_payment,
        term_days: terms.new_term_days,
        disbursement_method: previous.disbursement_method,
        start_date: now,
        due_date: now + Duration::days(terms.new_term_days),
        status: LoanStatus::Active,
        days_overdue: 0,
        renewal_count: previous.renewal_count + 1,
        renewed_from_id: Some(previous.id.clone()),
        paid_date: None,
        confiscated_date: None,
        cancelled_date: None,
        notes: previous.notes.clone(),
        created_by: created_by.to_string(),
        created_at: now,
        updated_at: now,
        version: 0,
    })
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use chrono::TimeZone;

    pub(crate) fn at(day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, day, 10, 0, 0).unwrap()
    }

    pub(crate) fn request(amount_cents: i64) -> NewLoan {
        NewLoan {
            branch_id: "branch-1".to_string(),
            customer_id: "cust-1".to_string(),
            item_id: "item-1".to_string(),
            loan_amount: Money::from_cents(amount_cents),
            interest_rate: Rate::from_bps(1_000),
            late_fee_rate: Rate::from_bps(500),
            term_days: 10,
            payment_plan_type: PaymentPlanType::SinglePayment,
            number_of_installments: 0,
            requires_minimum_payment: false,
            disbursement_method: PaymentMethod::Cash,
            start_date: Some(at(1)),
            category_limits: None,
            defer_disbursement: false,
            notes: None,
            created_by: "clerk".to_string(),
        }
    }

    pub(crate) fn sample_loan(amount_cents: i64) -> Loan {
        originate(
            &request(amount_cents),
            &LoanPolicy::default(),
            "loan-1".to_string(),
            "LN-2024-000001".to_string(),
            at(1),
        )
        .unwrap()
    }

    #[test]
    fn test_originate_single_payment() {
        let loan = sample_loan(100_000);
        assert_eq!(loan.interest_amount_cents, 10_000);
        assert_eq!(loan.total_amount_cents, 110_000);
        assert_eq!(loan.principal_remaining_cents, 100_000);
        assert_eq!(loan.interest_remaining_cents, 10_000);
        assert_eq!(loan.status, LoanStatus::Active);
        assert_eq!(loan.due_date, at(11));
        assert!(loan.is_conserved());
    }

    #[test]
    fn test_originate_installments_cumulative_interest() {
        let mut req = request(100_000);
        req.payment_plan_type = PaymentPlanType::Installments;
        req.number_of_installments = 4;
        req.requires_minimum_payment = true;
        let loan = originate(&req, &LoanPolicy::default(), "l".into(), "n".into(), at(1)).unwrap();
        assert_eq!(loan.interest_amount_cents, 40_000);
        assert_eq!(loan.number_of_installments, 4);
    }

    #[test]
    fn test_originate_rejects_bad_input() {
        let policy = LoanPolicy::default();
        let mut zero = request(0);
        zero.loan_amount = Money::zero();
        assert!(originate(&zero, &policy, "l".into(), "n".into(), at(1)).is_err());

        let mut no_term = request(100_000);
        no_term.term_days = 0;
        assert!(originate(&no_term, &policy, "l".into(), "n".into(), at(1)).is_err());

        let mut missing_installments = request(100_000);
        missing_installments.payment_plan_type = PaymentPlanType::Installments;
        missing_installments.requires_minimum_payment = true;
        let err = originate(&missing_installments, &policy, "l".into(), "n".into(), at(1))
            .unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::InvalidInput);
    }

    #[test]
    fn test_category_limits_are_stricter() {
        let mut req = request(600_000);
        req.category_limits = Some(CategoryLimits {
            category: "electronics".to_string(),
            min_loan_cents: 1_000,
            max_loan_cents: 500_000,
            min_term_days: 7,
            max_term_days: 60,
        });
        let err = originate(&req, &LoanPolicy::default(), "l".into(), "n".into(), at(1))
            .unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::InvalidInput);

        req.loan_amount = Money::from_cents(400_000);
        req.term_days = 5;
        assert!(originate(&req, &LoanPolicy::default(), "l".into(), "n".into(), at(1)).is_err());
    }

    #[test]
    fn test_recompute_overdue() {
        let loan = sample_loan(100_000);
        assert_eq!(recompute_overdue(&loan, at(11)), (0, LoanStatus::Active));
        assert_eq!(recompute_overdue(&loan, at(14)), (3, LoanStatus::Overdue));

        let mut paid = loan.clone();
        paid.status = LoanStatus::Paid;
        assert_eq!(recompute_overdue(&paid, at(20)), (0, LoanStatus::Paid));
    }

    #[test]
    fn test_late_fee_periods_round_up() {
        let policy = LoanPolicy {
            late_fee_period_days: 30,
            late_fee_grace_days: 5,
            ..LoanPolicy::default()
        };
        assert_eq!(late_fee_periods(5, &policy), 0);
        assert_eq!(late_fee_periods(6, &policy), 1);
        assert_eq!(late_fee_periods(35, &policy), 1);
        assert_eq!(late_fee_periods(36, &policy), 2);
    }

    #[test]
    fn test_apply_accrual_is_idempotent() {
        let policy = LoanPolicy::default();
        let mut loan = sample_loan(100_000);

        assert!(apply_accrual(&mut loan, at(14), &policy));
        // 5% of 1000.00 for one period
        assert_eq!(loan.late_fee_amount_cents, 5_000);
        assert_eq!(loan.late_fee_remaining_cents, 5_000);
        assert!(loan.is_conserved());

        let snapshot = loan.clone();
        assert!(!apply_accrual(&mut loan, at(14), &policy));
        assert_eq!(loan, snapshot);
    }

    #[test]
    fn test_accrual_never_below_paid_fee() {
        let policy = LoanPolicy::default();
        let mut loan = sample_loan(100_000);
        apply_accrual(&mut loan, at(14), &policy);

        // Customer paid the whole late fee and most of the principal
        loan.late_fee_remaining_cents = 0;
        loan.interest_remaining_cents = 0;
        loan.principal_remaining_cents = 10_000;
        loan.amount_paid_cents = 105_000;
        assert!(loan.is_conserved());

        apply_accrual(&mut loan, at(14), &policy);
        assert_eq!(loan.late_fee_amount_cents, 5_000);
        assert_eq!(loan.late_fee_remaining_cents, 0);
        assert!(loan.is_conserved());
    }

    #[test]
    fn test_payoff_quote_includes_accrual() {
        let loan = sample_loan(100_000);
        let quote = payoff_quote(&loan, at(14), &LoanPolicy::default());
        assert_eq!(quote.total.cents(), 115_000);
        assert_eq!(quote.days_overdue, 3);
        // the stored loan is untouched
        assert_eq!(loan.late_fee_amount_cents, 0);
    }

    #[test]
    fn test_confiscation_requires_grace() {
        let policy = LoanPolicy {
            confiscation_grace_days: 5,
            ..LoanPolicy::default()
        };
        let mut loan = sample_loan(100_000);
        assert!(ensure_confiscable(&loan, &policy).is_err());

        apply_accrual(&mut loan, at(14), &policy);
        assert!(ensure_confiscable(&loan, &policy).is_err());

        apply_accrual(&mut loan, at(17), &policy);
        assert!(ensure_confiscable(&loan, &policy).is_ok());
        transition(&mut loan, LoanStatus::Confiscated, "confiscate", at(17)).unwrap();
        assert_eq!(loan.confiscated_date, Some(at(17)));
    }

    #[test]
    fn test_renewal_capitalizes_unpaid_interest() {
        let policy = LoanPolicy::default();
        let loan = sample_loan(100_000);
        let terms = RenewalTerms {
            new_term_days: 30,
            pay_interest: false,
            new_interest_rate: Some(Rate::from_bps(800)),
        };
        let next = renewal_successor(&loan, &terms, &policy, "l2".into(), "n2".into(), "clerk", at(5))
            .unwrap();
        assert_eq!(next.loan_amount_cents, 110_000);
        assert_eq!(next.interest_amount_cents, 8_800);
        assert_eq!(next.renewal_count, 1);
        assert_eq!(next.renewed_from_id.as_deref(), Some("loan-1"));
        assert_eq!(next.due_date, at(5) + Duration::days(30));
        assert!(next.is_conserved());
    }

    #[test]
    fn test_renewal_rejected_from_terminal_status() {
        let mut loan = sample_loan(100_000);
        loan.status = LoanStatus::Paid;
        let terms = RenewalTerms {
            new_term_days: 30,
            pay_interest: false,
            new_interest_rate: None,
        };
        let err = renewal_successor(&loan, &terms, &LoanPolicy::default(), "l".into(), "n".into(), "c", at(5))
            .unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::InvalidStatus);
    }

    #[test]
    fn test_cancellation_rules() {
        let mut loan = sample_loan(100_000);
        assert!(ensure_cancellable(&loan).is_ok());
        loan.amount_paid_cents = 1;
        assert!(ensure_cancellable(&loan).is_err());
        loan.status = LoanStatus::Pending;
        assert!(ensure_cancellable(&loan).is_ok());
    }
}
