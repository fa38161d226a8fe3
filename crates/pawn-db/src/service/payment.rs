//! # Payment Service
//!
//! Takes payments against loans and reverses them.
//!
//! ## Payment Flow (one transaction)
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  loan = get(loan_id)          apply_accrual(now)                       │
//! │       │                                                                 │
//! │       ▼  allocate(amount)     late fee → interest → principal          │
//! │       ▼  apply + maybe transition(paid)                                │
//! │       ▼  installments follow the collected principal + interest        │
//! │       ▼  UPDATE loans ... WHERE version = ?        (else Conflict)     │
//! │       ▼  INSERT payment  PY-YYYY-NNNNNN                                │
//! │       ▼  cash only: income movement in the session                     │
//! │       ▼  posting entry  Dr cash|bank / Cr receivable, income           │
//! │       ▼  payoff: customer + item collaborators                         │
//! │       ▼  audit, COMMIT                                                 │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! A reversal replays the stored split backwards; it never re-runs the
//! allocator.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use pawn_core::accounting::{payment_lines, EntryDraft};
use pawn_core::allocation::{self, Allocation};
use pawn_core::loan::{apply_accrual, ensure_payable, transition};
use pawn_core::numbering::NumberKind;
use pawn_core::schedule::apply_paid_total;
use pawn_core::validation::{validate_notes, validate_reason, validate_required};
use pawn_core::{ItemStatus, Loan, LoanStatus, Money, Payment, PaymentMethod};
use serde::{Deserialize, Serialize};
use sqlx::{SqliteConnection, SqlitePool};
use tracing::{info, warn};

use super::accounting::{post_in_tx, reverse_references_in_tx};
use super::cash::{record_in_tx, resolve_session, NewMovement};
use super::{audit, new_id, reference, LedgerSettings};
use crate::collaborators::{AuditEvent, Collaborators, CreditDelta};
use crate::error::{LedgerError, LedgerResult};
use crate::repository::{installment, loan as loans, payment as repo, sequence};

// =============================================================================
// Requests
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewPayment {
    pub loan_id: String,
    pub amount: Money,
    pub payment_method: PaymentMethod,
    /// Session for cash payments; defaults to the operator's open session.
    pub session_id: Option<String>,
    pub reference: Option<String>,
    pub notes: Option<String>,
    pub created_by: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReversePayment {
    pub reason: String,
    /// Session the cash refund comes out of; defaults to the operator's
    /// open session.
    pub session_id: Option<String>,
    pub reversed_by: String,
}

// =============================================================================
// In-transaction helpers
// =============================================================================

/// Shared dependencies of the in-transaction helpers.
pub(crate) struct TxContext<'a> {
    pub settings: &'a LedgerSettings,
    pub collaborators: &'a Collaborators,
    pub now: DateTime<Utc>,
}

/// Applies a payment to `loan` (already accrued to `now`) and writes
/// everything it touches on the caller's connection.
///
/// On success `loan` reflects the stored row, including its new version.
pub(crate) async fn pay_in_tx(
    conn: &mut SqliteConnection,
    ctx: &TxContext<'_>,
    loan: &mut Loan,
    request: &NewPayment,
) -> LedgerResult<Payment> {
    ensure_payable(loan)?;
    let split = allocation::allocate(loan, request.amount)?;

    allocation::apply(loan, &split);
    loan.updated_at = ctx.now;
    if split.fully_paid {
        transition(loan, LoanStatus::Paid, "accept payment", ctx.now)?;
        loan.days_overdue = 0;
    }
    sync_installments(conn, loan, ctx.now).await?;

    if !loans::update_versioned(&mut *conn, loan).await? {
        warn!(loan_id = %loan.id, version = loan.version, "Payment lost a race on the loan row");
        return Err(LedgerError::conflict("Loan", &loan.id, "loan changed concurrently"));
    }
    loan.version += 1;

    let session_id = if request.payment_method.is_cash() {
        let session = resolve_session(conn, request.session_id.as_deref(), &request.created_by).await?;
        Some(session.id)
    } else {
        None
    };

    let payment = Payment {
        id: new_id(),
        payment_number: sequence::next_number(conn, NumberKind::Payment, ctx.now).await?,
        loan_id: loan.id.clone(),
        session_id: session_id.clone(),
        amount_cents: split.total().cents(),
        principal_cents: split.principal.cents(),
        interest_cents: split.interest.cents(),
        late_fee_cents: split.late_fee.cents(),
        payment_method: request.payment_method,
        loan_balance_after_cents: loan.payoff_amount().cents(),
        reference: request.reference.clone(),
        notes: request.notes.clone(),
        is_reversed: false,
        reversed_at: None,
        reversal_reason: None,
        created_by: request.created_by.clone(),
        created_at: ctx.now,
    };
    repo::insert(&mut *conn, &payment).await?;

    if let Some(session_id) = &session_id {
        let movement = NewMovement::income(split.total(), &request.created_by)
            .referencing(reference::PAYMENT, &payment.id)
            .described(format!("Payment {} on {}", payment.payment_number, loan.loan_number));
        record_in_tx(conn, session_id, &movement, ctx.now).await?;
    }

    let draft = EntryDraft {
        branch_id: loan.branch_id.clone(),
        entry_date: ctx.now,
        description: format!("Payment {} on loan {}", payment.payment_number, loan.loan_number),
        reference_type: Some(reference::PAYMENT.to_string()),
        reference_id: Some(payment.id.clone()),
        lines: payment_lines(&ctx.settings.accounts, &split, request.payment_method),
        created_by: request.created_by.clone(),
    };
    post_in_tx(conn, &draft, None, ctx.now).await?;

    if split.fully_paid {
        ctx.collaborators
            .customers
            .update_credit_info(&loan.customer_id, CreditDelta::paid_off(loan.loan_amount()))
            .await
            .map_err(|message| LedgerError::collaborator("customer service", message))?;
        ctx.collaborators
            .items
            .update_status(&loan.item_id, ItemStatus::Redeemed)
            .await
            .map_err(|message| LedgerError::collaborator("item service", message))?;
    }

    info!(
        payment_number = %payment.payment_number,
        loan_number = %loan.loan_number,
        late_fee = %split.late_fee,
        interest = %split.interest,
        principal = %split.principal,
        fully_paid = split.fully_paid,
        "Applied payment"
    );
    Ok(payment)
}

/// Re-derives installment progress from the loan's collected principal and
/// interest and writes any changes.
pub(crate) async fn sync_installments(
    conn: &mut SqliteConnection,
    loan: &Loan,
    now: DateTime<Utc>,
) -> LedgerResult<()> {
    let mut schedule = installment::list_for_loan(&mut *conn, &loan.id).await?;
    if schedule.is_empty() {
        return Ok(());
    }
    if apply_paid_total(&mut schedule, loan.scheduled_amount_paid(), now) {
        installment::update_progress(conn, &schedule).await?;
    }
    Ok(())
}

// =============================================================================
// Service
// =============================================================================

/// Payments and payment reversals.
#[derive(Debug, Clone)]
pub struct PaymentService {
    pool: SqlitePool,
    settings: Arc<LedgerSettings>,
    collaborators: Collaborators,
}

impl PaymentService {
    pub fn new(pool: SqlitePool, settings: Arc<LedgerSettings>, collaborators: Collaborators) -> Self {
        PaymentService {
            pool,
            settings,
            collaborators,
        }
    }

    fn context(&self, now: DateTime<Utc>) -> TxContext<'_> {
        TxContext {
            settings: &self.settings,
            collaborators: &self.collaborators,
            now,
        }
    }

    /// Takes a payment against an open loan.
    ///
    /// ## Errors
    /// - `NotFound` for an unknown loan or session
    /// - `InvalidStatus` when the loan is not active/overdue, or a cash
    ///   payment has no open session
    /// - `InvalidAmount` for `amount <= 0` or more than the payoff amount
    /// - `Conflict` when the loan changed concurrently
    pub async fn create_payment(&self, request: NewPayment) -> LedgerResult<Payment> {
        validate_required("created_by", &request.created_by)?;
        validate_notes("notes", request.notes.as_deref())?;

        let now = self.collaborators.clock.now();
        let ctx = self.context(now);
        let mut tx = self.pool.begin().await?;

        let mut loan = loans::get(&mut *tx, &request.loan_id).await?;
        let before = loan.clone();
        apply_accrual(&mut loan, now, &self.settings.policy);

        let payment = pay_in_tx(&mut tx, &ctx, &mut loan, &request).await?;

        audit(
            &self.collaborators,
            AuditEvent::new("payment", "loan", &loan.id, &request.created_by)
                .with_snapshots(Some(&before), Some(&loan)),
        )
        .await?;

        tx.commit().await?;
        Ok(payment)
    }

    /// Reverses a payment: the stored split goes back into the loan's
    /// buckets and a reversing entry is posted.
    ///
    /// Principal and interest return to their pre-payment values. The late
    /// fee is then re-derived as of now, so when the clock has moved since
    /// the payment it reflects the current overdue days and the restored
    /// principal rather than the figure at payment time.
    ///
    /// ## Errors
    /// - `NotFound` for an unknown payment
    /// - `Conflict` when the payment is already reversed, or the loan has
    ///   reached `confiscated`, `renewed` or `cancelled`
    /// - `InvalidStatus` for a cash payment with no open session to refund from
    pub async fn reverse_payment(&self, payment_id: &str, request: ReversePayment) -> LedgerResult<Payment> {
        validate_reason(&request.reason)?;
        validate_required("reversed_by", &request.reversed_by)?;

        let now = self.collaborators.clock.now();
        let mut tx = self.pool.begin().await?;

        let payment = repo::get(&mut *tx, payment_id).await?;
        if payment.is_reversed {
            return Err(LedgerError::conflict("Payment", payment_id, "payment already reversed"));
        }

        let mut loan = loans::get(&mut *tx, &payment.loan_id).await?;
        if loan.status.is_terminal() {
            warn!(payment_id, loan_status = %loan.status, "Reversal refused on closed loan");
            return Err(LedgerError::conflict(
                "Payment",
                payment_id,
                format!("loan {} is {}", loan.loan_number, loan.status),
            ));
        }
        let before = loan.clone();
        let was_paid = loan.status == LoanStatus::Paid;

        allocation::revert(&mut loan, &Allocation::from_payment(&payment))?;
        loan.updated_at = now;
        if was_paid {
            transition(&mut loan, LoanStatus::Active, "reverse payment", now)?;
        }
        apply_accrual(&mut loan, now, &self.settings.policy);
        sync_installments(&mut tx, &loan, now).await?;

        if !loans::update_versioned(&mut *tx, &loan).await? {
            return Err(LedgerError::conflict("Loan", &loan.id, "loan changed concurrently"));
        }
        loan.version += 1;

        if !repo::mark_reversed(&mut *tx, payment_id, now, &request.reason).await? {
            return Err(LedgerError::conflict("Payment", payment_id, "payment already reversed"));
        }

        reverse_references_in_tx(
            &mut tx,
            reference::PAYMENT,
            payment_id,
            &format!("Reversal of payment {}: {}", payment.payment_number, request.reason),
            &request.reversed_by,
            now,
        )
        .await?;

        if payment.payment_method.is_cash() {
            let session = resolve_session(&mut tx, request.session_id.as_deref(), &request.reversed_by).await?;
            let movement = NewMovement::expense(payment.amount(), &request.reversed_by)
                .referencing(reference::PAYMENT_REVERSAL, payment_id)
                .described(format!("Refund of payment {}", payment.payment_number));
            record_in_tx(&mut tx, &session.id, &movement, now).await?;
        }

        if was_paid {
            let reopened = CreditDelta {
                outstanding: loan.loan_amount(),
                loans_paid_off: -1,
                loans_defaulted: 0,
            };
            self.collaborators
                .customers
                .update_credit_info(&loan.customer_id, reopened)
                .await
                .map_err(|message| LedgerError::collaborator("customer service", message))?;
            self.collaborators
                .items
                .update_status(&loan.item_id, ItemStatus::Pawned)
                .await
                .map_err(|message| LedgerError::collaborator("item service", message))?;
        }

        let reversed = repo::get(&mut *tx, payment_id).await?;
        audit(
            &self.collaborators,
            AuditEvent::new("reverse", "payment", payment_id, &request.reversed_by)
                .with_snapshots(Some(&before), Some(&loan)),
        )
        .await?;

        tx.commit().await?;
        info!(
            payment_number = %payment.payment_number,
            loan_number = %loan.loan_number,
            loan_status = %loan.status,
            "Reversed payment"
        );
        Ok(reversed)
    }

    pub async fn get_payment(&self, payment_id: &str) -> LedgerResult<Payment> {
        Ok(repo::get(&self.pool, payment_id).await?)
    }

    pub async fn list_for_loan(&self, loan_id: &str) -> LedgerResult<Vec<Payment>> {
        Ok(repo::list_for_loan(&self.pool, loan_id).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::accounting as ledger_repo;
    use crate::service::testing::{file_harness, harness, loan_request, remove_scratch, Harness, CASHIER};
    use crate::service::OpenSession;
    use pawn_core::{ErrorKind, PaymentPlanType};

    fn pay(loan_id: &str, cents: i64, method: PaymentMethod) -> NewPayment {
        NewPayment {
            loan_id: loan_id.to_string(),
            amount: Money::from_cents(cents),
            payment_method: method,
            session_id: None,
            reference: None,
            notes: None,
            created_by: CASHIER.to_string(),
        }
    }

    fn reversal(reason: &str) -> ReversePayment {
        ReversePayment {
            reason: reason.to_string(),
            session_id: None,
            reversed_by: CASHIER.to_string(),
        }
    }

    async fn loan_with_drawer(h: &Harness, amount_cents: i64) -> Loan {
        h.open_drawer().await;
        h.ledger.loans().create_loan(loan_request(amount_cents)).await.unwrap()
    }

    async fn stored(h: &Harness, id: &str) -> Loan {
        loans::get(h.ledger.database().pool(), id).await.unwrap()
    }

    #[tokio::test]
    async fn test_partial_payment_allocates_interest_first() {
        let h = harness().await;
        let loan = loan_with_drawer(&h, 100_000).await;

        let payment = h
            .ledger
            .payments()
            .create_payment(pay(&loan.id, 12_000, PaymentMethod::Cash))
            .await
            .unwrap();

        assert_eq!(payment.payment_number, "PY-2024-000001");
        assert_eq!(payment.interest_cents, 10_000);
        assert_eq!(payment.principal_cents, 2_000);
        assert_eq!(payment.late_fee_cents, 0);
        assert_eq!(payment.loan_balance_after_cents, 98_000);
        assert!(payment.session_id.is_some());

        let after = stored(&h, &loan.id).await;
        assert!(after.is_conserved());
        assert_eq!(after.status, LoanStatus::Active);
        assert_eq!(after.interest_remaining_cents, 0);
        assert_eq!(after.principal_remaining_cents, 98_000);
    }

    #[tokio::test]
    async fn test_overdue_allocation_order_late_fee_first() {
        let h = harness().await;
        let loan = loan_with_drawer(&h, 100_000).await;

        // Due Mar 11; on Mar 12 one late-fee period (5% of 1,000.00) has accrued.
        h.set_day(12);
        let payment = h
            .ledger
            .payments()
            .create_payment(pay(&loan.id, 12_000, PaymentMethod::Card))
            .await
            .unwrap();

        assert_eq!(payment.late_fee_cents, 5_000);
        assert_eq!(payment.interest_cents, 7_000);
        assert_eq!(payment.principal_cents, 0);
        assert!(payment.session_id.is_none());

        let after = stored(&h, &loan.id).await;
        assert_eq!(after.status, LoanStatus::Overdue);
        assert_eq!(after.interest_remaining_cents, 3_000);
        assert!(after.is_conserved());
    }

    #[tokio::test]
    async fn test_full_payoff_marks_paid_and_notifies() {
        let h = harness().await;
        let loan = loan_with_drawer(&h, 100_000).await;

        let quote = h.ledger.loans().payoff_quote(&loan.id).await.unwrap();
        assert_eq!(quote.total.cents(), 110_000);

        h.ledger
            .payments()
            .create_payment(pay(&loan.id, quote.total.cents(), PaymentMethod::Cash))
            .await
            .unwrap();

        let after = stored(&h, &loan.id).await;
        assert_eq!(after.status, LoanStatus::Paid);
        assert!(after.paid_date.is_some());
        assert!(after.is_settled());
        assert!(after.is_conserved());

        let credits = h.recorder.credits();
        assert!(credits.iter().any(|(_, d)| d.loans_paid_off == 1));
        assert!(h
            .recorder
            .items()
            .contains(&(loan.item_id.clone(), ItemStatus::Redeemed)));

        let err = h
            .ledger
            .payments()
            .create_payment(pay(&loan.id, 1, PaymentMethod::Cash))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidStatus);
    }

    #[tokio::test]
    async fn test_overpayment_rejected_without_side_effects() {
        let h = harness().await;
        let loan = loan_with_drawer(&h, 100_000).await;
        let pool = h.ledger.database().pool();
        let entries_before: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM accounting_entries")
            .fetch_one(pool)
            .await
            .unwrap();

        let err = h
            .ledger
            .payments()
            .create_payment(pay(&loan.id, 110_001, PaymentMethod::Cash))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidAmount);

        let err = h
            .ledger
            .payments()
            .create_payment(pay(&loan.id, 0, PaymentMethod::Cash))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidAmount);

        let after = stored(&h, &loan.id).await;
        assert_eq!(after, loan);
        let payments: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM payments")
            .fetch_one(pool)
            .await
            .unwrap();
        let entries_after: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM accounting_entries")
            .fetch_one(pool)
            .await
            .unwrap();
        assert_eq!(payments, 0);
        assert_eq!(entries_after, entries_before);
    }

    #[tokio::test]
    async fn test_cash_payment_needs_open_session() {
        let h = harness().await;
        let mut request = loan_request(100_000);
        request.disbursement_method = PaymentMethod::Transfer;
        let loan = h.ledger.loans().create_loan(request).await.unwrap();

        let err = h
            .ledger
            .payments()
            .create_payment(pay(&loan.id, 1_000, PaymentMethod::Cash))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidStatus);
        assert_eq!(stored(&h, &loan.id).await, loan);

        h.ledger
            .payments()
            .create_payment(pay(&loan.id, 1_000, PaymentMethod::Transfer))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_payment_posts_balanced_entry_and_movement() {
        let h = harness().await;
        let loan = loan_with_drawer(&h, 100_000).await;
        let payment = h
            .ledger
            .payments()
            .create_payment(pay(&loan.id, 30_000, PaymentMethod::Cash))
            .await
            .unwrap();

        let pool = h.ledger.database().pool();
        let entries = ledger_repo::entries_for_reference(pool, reference::PAYMENT, &payment.id)
            .await
            .unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].total_debit_cents, 30_000);
        assert_eq!(entries[0].total_credit_cents, 30_000);

        let session_id = payment.session_id.clone().unwrap();
        let summary = h.ledger.cash().summary(&session_id).await.unwrap();
        // 1,000.00 opening − 1,000.00 disbursed + 300.00 collected
        assert_eq!(summary.current_balance.cents(), 30_000);
        assert_eq!(summary.totals.income_count, 1);
    }

    #[tokio::test]
    async fn test_conservation_over_payment_sequence() {
        let h = harness().await;
        let loan = loan_with_drawer(&h, 100_000).await;
        h.set_day(15);
        for cents in [2_500, 7_000, 40_000, 1] {
            h.ledger
                .payments()
                .create_payment(pay(&loan.id, cents, PaymentMethod::Cash))
                .await
                .unwrap();
            assert!(stored(&h, &loan.id).await.is_conserved());
        }
    }

    #[tokio::test]
    async fn test_reversal_restores_buckets_exactly() {
        let h = harness().await;
        let loan = loan_with_drawer(&h, 100_000).await;
        h.set_day(12);
        h.ledger.loans().refresh_overdue(&loan.id).await.unwrap();
        let before = stored(&h, &loan.id).await;

        let payment = h
            .ledger
            .payments()
            .create_payment(pay(&loan.id, 12_000, PaymentMethod::Cash))
            .await
            .unwrap();
        let reversed = h
            .ledger
            .payments()
            .reverse_payment(&payment.id, reversal("wrong loan"))
            .await
            .unwrap();
        assert!(reversed.is_reversed);
        assert_eq!(reversed.reversal_reason.as_deref(), Some("wrong loan"));

        let after = stored(&h, &loan.id).await;
        assert_eq!(after.principal_remaining_cents, before.principal_remaining_cents);
        assert_eq!(after.interest_remaining_cents, before.interest_remaining_cents);
        assert_eq!(after.late_fee_remaining_cents, before.late_fee_remaining_cents);
        assert_eq!(after.amount_paid_cents, 0);
        assert!(after.is_conserved());

        let err = h
            .ledger
            .payments()
            .reverse_payment(&payment.id, reversal("again"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);

        let pool = h.ledger.database().pool();
        let entries = ledger_repo::entries_for_reference(pool, reference::PAYMENT, &payment.id)
            .await
            .unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[1].reverses_entry_id.as_deref(), Some(entries[0].id.as_str()));
    }

    #[tokio::test]
    async fn test_reversing_payoff_reopens_loan() {
        let h = harness().await;
        let loan = loan_with_drawer(&h, 100_000).await;
        let payment = h
            .ledger
            .payments()
            .create_payment(pay(&loan.id, 110_000, PaymentMethod::Cash))
            .await
            .unwrap();
        assert_eq!(stored(&h, &loan.id).await.status, LoanStatus::Paid);

        h.ledger
            .payments()
            .reverse_payment(&payment.id, reversal("bounced"))
            .await
            .unwrap();

        let after = stored(&h, &loan.id).await;
        assert_eq!(after.status, LoanStatus::Active);
        assert!(after.paid_date.is_none());
        assert_eq!(after.payoff_amount().cents(), 110_000);
        assert!(h.recorder.items().contains(&(loan.item_id.clone(), ItemStatus::Pawned)));
    }

    #[tokio::test]
    async fn test_reversal_refused_after_confiscation() {
        let h = harness().await;
        let loan = loan_with_drawer(&h, 100_000).await;
        let payment = h
            .ledger
            .payments()
            .create_payment(pay(&loan.id, 5_000, PaymentMethod::Card))
            .await
            .unwrap();

        // Due Mar 11, confiscable 30 days later.
        h.clock.advance(chrono::Duration::days(45));
        h.ledger
            .loans()
            .confiscate(&loan.id, Some("abandoned".into()), CASHIER)
            .await
            .unwrap();

        let err = h
            .ledger
            .payments()
            .reverse_payment(&payment.id, reversal("late"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);
    }

    #[tokio::test]
    async fn test_installments_follow_payments() {
        let h = harness().await;
        h.open_drawer().await;
        let mut request = loan_request(90_000);
        request.payment_plan_type = PaymentPlanType::Installments;
        request.number_of_installments = 3;
        request.requires_minimum_payment = true;
        request.term_days = 90;
        let loan = h.ledger.loans().create_loan(request).await.unwrap();
        // 900.00 + 3 × 10% interest = 1,170.00, three installments of 390.00
        assert_eq!(loan.total_amount_cents, 117_000);

        h.ledger
            .payments()
            .create_payment(pay(&loan.id, 39_000, PaymentMethod::Cash))
            .await
            .unwrap();

        let schedule = h.ledger.loans().installments(&loan.id).await.unwrap();
        assert_eq!(schedule.len(), 3);
        assert!(schedule[0].is_paid);
        assert!(!schedule[1].is_paid);
        assert_eq!(schedule.iter().map(|i| i.total_cents).sum::<i64>(), 117_000);
    }

    #[tokio::test]
    async fn test_reversal_after_clock_moves_rederives_late_fee() {
        let h = harness().await;
        let loan = loan_with_drawer(&h, 100_000).await;

        h.set_day(5);
        let payment = h
            .ledger
            .payments()
            .create_payment(pay(&loan.id, 12_000, PaymentMethod::Cash))
            .await
            .unwrap();
        assert_eq!(stored(&h, &loan.id).await.principal_remaining_cents, 98_000);

        // Due Mar 11; by Mar 12 one late-fee period has accrued
        h.set_day(12);
        h.ledger
            .payments()
            .reverse_payment(&payment.id, reversal("bounced"))
            .await
            .unwrap();

        let after = stored(&h, &loan.id).await;
        assert_eq!(after.principal_remaining_cents, 100_000);
        assert_eq!(after.interest_remaining_cents, 10_000);
        assert_eq!(after.amount_paid_cents, 0);
        assert_eq!(after.status, LoanStatus::Overdue);
        assert_eq!(after.days_overdue, 1);
        // 5% of the restored principal, not of the 980.00 left after payment
        assert_eq!(after.late_fee_amount_cents, 5_000);
        assert_eq!(after.late_fee_remaining_cents, 5_000);
        assert!(after.is_conserved());
    }

    #[tokio::test]
    async fn test_cash_payment_into_another_operators_session_is_refused() {
        let h = harness().await;
        let loan = loan_with_drawer(&h, 100_000).await;
        let other = h
            .ledger
            .cash()
            .open_session(OpenSession {
                register_id: "register-2".to_string(),
                user_id: "cashier-2".to_string(),
                opening_amount: Money::from_cents(50_000),
                notes: None,
            })
            .await
            .unwrap();

        let mut request = pay(&loan.id, 12_000, PaymentMethod::Cash);
        request.session_id = Some(other.id.clone());
        let err = h.ledger.payments().create_payment(request).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);

        assert!(h.ledger.payments().list_for_loan(&loan.id).await.unwrap().is_empty());
        assert_eq!(stored(&h, &loan.id).await.amount_paid_cents, 0);
        assert!(h.ledger.cash().list_movements(&other.id).await.unwrap().is_empty());

        let own = h.ledger.cash().current_session_for_user(CASHIER).await.unwrap().unwrap();
        let mut request = pay(&loan.id, 12_000, PaymentMethod::Cash);
        request.session_id = Some(own.id.clone());
        let payment = h.ledger.payments().create_payment(request).await.unwrap();
        assert_eq!(payment.session_id, Some(own.id));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_payments_keep_loan_conserved() {
        let (h, path) = file_harness().await;
        let loan = loan_with_drawer(&h, 100_000).await;

        let mut tasks = Vec::new();
        for _ in 0..8 {
            let ledger = h.ledger.clone();
            let request = pay(&loan.id, 10_000, PaymentMethod::Cash);
            tasks.push(tokio::spawn(async move { ledger.payments().create_payment(request).await }));
        }

        let mut succeeded = 0i64;
        for task in tasks {
            match task.await.unwrap() {
                Ok(_) => succeeded += 1,
                Err(err) => assert_eq!(err.kind(), ErrorKind::Conflict, "{}", err),
            }
        }
        assert!(succeeded >= 1);

        let after = stored(&h, &loan.id).await;
        assert_eq!(after.amount_paid_cents, succeeded * 10_000);
        assert!(after.is_conserved());
        let payments = h.ledger.payments().list_for_loan(&loan.id).await.unwrap();
        assert_eq!(payments.len() as i64, succeeded);

        // disbursement emptied the 1,000.00 drawer; one income per committed payment
        let session = h.ledger.cash().current_session_for_user(CASHIER).await.unwrap().unwrap();
        let movements = h.ledger.cash().list_movements(&session.id).await.unwrap();
        assert_eq!(movements.len() as i64, 1 + succeeded);
        assert_eq!(
            movements.last().map(|m| m.balance_after_cents),
            Some(succeeded * 10_000)
        );

        remove_scratch(h, path).await;
    }
}
