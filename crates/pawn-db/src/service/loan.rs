//! # Loan Ledger
//!
//! Origination, disbursement, renewal, confiscation, cancellation and
//! overdue maintenance of loans.
//!
//! ## Lifecycle Writes
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  create_loan ──► loan + schedule ──► (active) cash expense + entry      │
//! │  disburse    ──► pending → active ──► cash expense + entry              │
//! │  renew       ──► [companion payment] ──► old: renewed                   │
//! │                  successor loan + schedule ──► [capitalization entry]   │
//! │  confiscate  ──► confiscated ──► Dr inventory / Cr receivable           │
//! │  cancel      ──► cancelled ──► reverse disbursement + cash back         │
//! │  sweep       ──► accrual persisted per past-due loan                    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Reads never write: [`LoanLedger::get_loan`] applies the as-of accrual to
//! the returned copy only.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use pawn_core::accounting::{capitalization_lines, confiscation_lines, disbursement_lines, EntryDraft, JournalLine};
use pawn_core::loan::{
    self as rules, apply_accrual, ensure_cancellable, ensure_confiscable, ensure_renewable, transition, NewLoan,
    PayoffQuote, RenewalTerms,
};
use pawn_core::numbering::NumberKind;
use pawn_core::schedule::generate_schedule;
use pawn_core::validation::{validate_notes, validate_reason, validate_required};
use pawn_core::{CoreError, Installment, ItemStatus, Loan, LoanStatus, Money, Payment, PaymentMethod, Rate};
use serde::{Deserialize, Serialize};
use sqlx::{SqliteConnection, SqlitePool};
use tracing::{debug, info, warn};

use super::accounting::{post_in_tx, reverse_references_in_tx};
use super::cash::{record_in_tx, resolve_session, NewMovement};
use super::payment::{pay_in_tx, NewPayment, TxContext};
use super::{audit, new_id, reference, LedgerSettings};
use crate::collaborators::{AuditEvent, Collaborators, CreditDelta};
use crate::error::{LedgerError, LedgerResult};
use crate::repository::{installment, loan as repo, sequence, LoanRepository};

// =============================================================================
// Requests and results
// =============================================================================

/// Renewal request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenewLoan {
    pub new_term_days: i64,
    /// Settle interest and late fee now; otherwise they are capitalized.
    pub pay_interest: bool,
    pub new_interest_rate: Option<Rate>,
    /// Method of the companion payment when `pay_interest` is set.
    pub payment_method: PaymentMethod,
    pub session_id: Option<String>,
    pub created_by: String,
}

impl RenewLoan {
    fn terms(&self) -> RenewalTerms {
        RenewalTerms {
            new_term_days: self.new_term_days,
            pay_interest: self.pay_interest,
            new_interest_rate: self.new_interest_rate,
        }
    }
}

/// What a renewal produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenewalOutcome {
    /// The renewed loan, now in `renewed`.
    pub previous: Loan,
    pub successor: Loan,
    /// Companion payment when interest was paid.
    pub payment: Option<Payment>,
    /// Interest and late fee rolled into the successor's principal.
    pub capitalized: Money,
}

/// Result of one overdue sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SweepReport {
    pub examined: usize,
    pub updated: usize,
    /// Loans skipped because another writer got there first.
    pub conflicts: usize,
}

// =============================================================================
// In-transaction helpers
// =============================================================================

/// Moves the principal out: cash expense (cash only) and the disbursement
/// entry.
async fn disburse_in_tx(
    conn: &mut SqliteConnection,
    settings: &LedgerSettings,
    loan: &Loan,
    operator: &str,
    now: DateTime<Utc>,
) -> LedgerResult<()> {
    let principal = loan.loan_amount();
    if loan.disbursement_method.is_cash() {
        let session = resolve_session(conn, None, operator).await?;
        let movement = NewMovement::expense(principal, operator)
            .referencing(reference::LOAN_DISBURSEMENT, &loan.id)
            .described(format!("Disbursement of loan {}", loan.loan_number));
        record_in_tx(conn, &session.id, &movement, now).await?;
    }

    let draft = EntryDraft {
        branch_id: loan.branch_id.clone(),
        entry_date: now,
        description: format!("Disbursement of loan {}", loan.loan_number),
        reference_type: Some(reference::LOAN_DISBURSEMENT.to_string()),
        reference_id: Some(loan.id.clone()),
        lines: disbursement_lines(&settings.accounts, principal, loan.disbursement_method),
        created_by: operator.to_string(),
    };
    post_in_tx(conn, &draft, None, now).await?;
    Ok(())
}

async fn insert_with_schedule(conn: &mut SqliteConnection, loan: &Loan) -> LedgerResult<Vec<Installment>> {
    let schedule = generate_schedule(loan)?;
    repo::insert(&mut *conn, loan).await?;
    installment::insert_all(conn, &schedule).await?;
    Ok(schedule)
}

async fn save(conn: &mut SqliteConnection, loan: &mut Loan) -> LedgerResult<()> {
    if !repo::update_versioned(&mut *conn, loan).await? {
        warn!(loan_id = %loan.id, version = loan.version, "Loan update lost a race");
        return Err(LedgerError::conflict("Loan", &loan.id, "loan changed concurrently"));
    }
    loan.version += 1;
    Ok(())
}

fn post_draft(
    loan: &Loan,
    kind: &str,
    description: String,
    lines: Vec<JournalLine>,
    user: &str,
    now: DateTime<Utc>,
) -> EntryDraft {
    EntryDraft {
        branch_id: loan.branch_id.clone(),
        entry_date: now,
        description,
        reference_type: Some(kind.to_string()),
        reference_id: Some(loan.id.clone()),
        lines,
        created_by: user.to_string(),
    }
}

// =============================================================================
// Service
// =============================================================================

/// Loan lifecycle operations.
#[derive(Debug, Clone)]
pub struct LoanLedger {
    pool: SqlitePool,
    settings: Arc<LedgerSettings>,
    collaborators: Collaborators,
}

impl LoanLedger {
    pub fn new(pool: SqlitePool, settings: Arc<LedgerSettings>, collaborators: Collaborators) -> Self {
        LoanLedger {
            pool,
            settings,
            collaborators,
        }
    }

    async fn set_item(&self, item_id: &str, status: ItemStatus) -> LedgerResult<()> {
        self.collaborators
            .items
            .update_status(item_id, status)
            .await
            .map_err(|message| LedgerError::collaborator("item service", message))
    }

    async fn update_credit(&self, customer_id: &str, delta: CreditDelta) -> LedgerResult<()> {
        self.collaborators
            .customers
            .update_credit_info(customer_id, delta)
            .await
            .map_err(|message| LedgerError::collaborator("customer service", message))
    }

    // =========================================================================
    // Origination
    // =========================================================================

    /// Originates a loan and, unless deferred, disburses it.
    ///
    /// ## Errors
    /// - `InvalidInput` for amounts, rates or terms outside policy
    /// - `InvalidStatus` for a cash disbursement with no open session
    pub async fn create_loan(&self, request: NewLoan) -> LedgerResult<Loan> {
        let now = self.collaborators.clock.now();
        let mut tx = self.pool.begin().await?;

        let loan_number = sequence::next_number(&mut tx, NumberKind::Loan, now).await?;
        let loan = rules::originate(&request, &self.settings.policy, new_id(), loan_number, now)?;
        let schedule = insert_with_schedule(&mut tx, &loan).await?;

        if loan.status == LoanStatus::Active {
            disburse_in_tx(&mut tx, &self.settings, &loan, &request.created_by, now).await?;
        }

        self.set_item(&loan.item_id, ItemStatus::Pawned).await?;
        if loan.status == LoanStatus::Active {
            self.update_credit(&loan.customer_id, CreditDelta::opened(loan.loan_amount()))
                .await?;
        }

        let stored = repo::get(&mut *tx, &loan.id).await?;
        audit(
            &self.collaborators,
            AuditEvent::new("create", "loan", &loan.id, &request.created_by)
                .with_snapshots(None::<&Loan>, Some(&stored)),
        )
        .await?;

        tx.commit().await?;
        info!(
            loan_number = %stored.loan_number,
            status = %stored.status,
            principal = %stored.loan_amount(),
            total = %stored.total_amount(),
            installments = schedule.len(),
            "Created loan"
        );
        Ok(stored)
    }

    /// Moves a `pending` loan to `active` and pays the principal out.
    pub async fn disburse(&self, loan_id: &str, user_id: &str) -> LedgerResult<Loan> {
        validate_required("user_id", user_id)?;
        let now = self.collaborators.clock.now();
        let mut tx = self.pool.begin().await?;

        let mut loan = repo::get(&mut *tx, loan_id).await?;
        let before = loan.clone();
        transition(&mut loan, LoanStatus::Active, "disburse", now)?;
        save(&mut tx, &mut loan).await?;
        disburse_in_tx(&mut tx, &self.settings, &loan, user_id, now).await?;

        self.update_credit(&loan.customer_id, CreditDelta::opened(loan.loan_amount()))
            .await?;
        audit(
            &self.collaborators,
            AuditEvent::new("disburse", "loan", loan_id, user_id).with_snapshots(Some(&before), Some(&loan)),
        )
        .await?;

        tx.commit().await?;
        info!(loan_number = %loan.loan_number, "Disbursed loan");
        Ok(loan)
    }

    // =========================================================================
    // Renewal
    // =========================================================================

    /// Closes a loan into a successor.
    ///
    /// With `pay_interest` a companion payment settles the outstanding
    /// interest and late fee first; without it they are capitalized into the
    /// successor's principal.
    ///
    /// ## Errors
    /// - `InvalidStatus` unless the loan is `active` or `overdue`
    /// - `InvalidInput` for a term outside policy
    /// - `Conflict` when the loan changed or was renewed concurrently
    pub async fn renew(&self, loan_id: &str, request: RenewLoan) -> LedgerResult<RenewalOutcome> {
        validate_required("created_by", &request.created_by)?;
        let now = self.collaborators.clock.now();
        let ctx = TxContext {
            settings: &self.settings,
            collaborators: &self.collaborators,
            now,
        };
        let terms = request.terms();
        let mut tx = self.pool.begin().await?;

        let mut loan = repo::get(&mut *tx, loan_id).await?;
        let before = loan.clone();
        apply_accrual(&mut loan, now, &self.settings.policy);
        ensure_renewable(&loan)?;

        let charges = loan.interest_remaining() + loan.late_fee_remaining();
        let payment = if request.pay_interest && charges.is_positive() {
            let companion = NewPayment {
                loan_id: loan.id.clone(),
                amount: charges,
                payment_method: request.payment_method,
                session_id: request.session_id.clone(),
                reference: None,
                notes: Some(format!("Interest settled on renewal of {}", loan.loan_number)),
                created_by: request.created_by.clone(),
            };
            Some(pay_in_tx(&mut tx, &ctx, &mut loan, &companion).await?)
        } else {
            None
        };

        let capitalized = rules::capitalized_amount(&loan, &terms);
        let (interest, late_fee) = (loan.interest_remaining(), loan.late_fee_remaining());
        let successor_number = sequence::next_number(&mut tx, NumberKind::Loan, now).await?;
        let successor = rules::renewal_successor(
            &loan,
            &terms,
            &self.settings.policy,
            new_id(),
            successor_number,
            &request.created_by,
            now,
        )?;

        transition(&mut loan, LoanStatus::Renewed, "renew", now)?;
        save(&mut tx, &mut loan).await?;
        insert_with_schedule(&mut tx, &successor).await?;

        if capitalized.is_positive() {
            let draft = post_draft(
                &successor,
                reference::LOAN_RENEWAL,
                format!("Charges of {} capitalized into {}", loan.loan_number, successor.loan_number),
                capitalization_lines(&self.settings.accounts, interest, late_fee),
                &request.created_by,
                now,
            );
            post_in_tx(&mut tx, &draft, None, now).await?;
        }

        let outstanding = successor.loan_amount() - loan.loan_amount();
        if !outstanding.is_zero() {
            let delta = CreditDelta {
                outstanding,
                loans_paid_off: 0,
                loans_defaulted: 0,
            };
            self.update_credit(&loan.customer_id, delta).await?;
        }
        audit(
            &self.collaborators,
            AuditEvent::new("renew", "loan", loan_id, &request.created_by)
                .with_snapshots(Some(&before), Some(&successor)),
        )
        .await?;

        tx.commit().await?;
        info!(
            previous = %loan.loan_number,
            successor = %successor.loan_number,
            capitalized = %capitalized,
            renewal_count = successor.renewal_count,
            "Renewed loan"
        );
        Ok(RenewalOutcome {
            previous: loan,
            successor,
            payment,
            capitalized,
        })
    }

    // =========================================================================
    // Confiscation
    // =========================================================================

    /// Forfeits the collateral of a loan past the confiscation grace window.
    pub async fn confiscate(&self, loan_id: &str, notes: Option<String>, user_id: &str) -> LedgerResult<Loan> {
        validate_required("user_id", user_id)?;
        validate_notes("notes", notes.as_deref())?;
        let now = self.collaborators.clock.now();
        let mut tx = self.pool.begin().await?;

        let mut loan = repo::get(&mut *tx, loan_id).await?;
        let before = loan.clone();
        apply_accrual(&mut loan, now, &self.settings.policy);
        ensure_confiscable(&loan, &self.settings.policy)?;

        transition(&mut loan, LoanStatus::Confiscated, "confiscate", now)?;
        if notes.is_some() {
            loan.notes = notes;
        }
        save(&mut tx, &mut loan).await?;

        let lines = confiscation_lines(&self.settings.accounts, loan.principal_remaining());
        if !lines.is_empty() {
            let draft = post_draft(
                &loan,
                reference::LOAN_CONFISCATION,
                format!("Confiscation of loan {}", loan.loan_number),
                lines,
                user_id,
                now,
            );
            post_in_tx(&mut tx, &draft, None, now).await?;
        }

        self.set_item(&loan.item_id, ItemStatus::Forfeited).await?;
        self.update_credit(&loan.customer_id, CreditDelta::defaulted(loan.loan_amount()))
            .await?;
        audit(
            &self.collaborators,
            AuditEvent::new("confiscate", "loan", loan_id, user_id).with_snapshots(Some(&before), Some(&loan)),
        )
        .await?;

        tx.commit().await?;
        info!(
            loan_number = %loan.loan_number,
            days_overdue = loan.days_overdue,
            principal = %loan.principal_remaining(),
            "Confiscated collateral"
        );
        Ok(loan)
    }

    // =========================================================================
    // Cancellation
    // =========================================================================

    /// Withdraws a pending loan, or an active one nothing has been paid on.
    ///
    /// An active loan's disbursement entry is reversed and cash paid out is
    /// taken back into the operator's open session. Renewal successors
    /// cannot be cancelled.
    pub async fn cancel(&self, loan_id: &str, reason: &str, user_id: &str) -> LedgerResult<Loan> {
        validate_reason(reason)?;
        validate_required("user_id", user_id)?;
        let now = self.collaborators.clock.now();
        let mut tx = self.pool.begin().await?;

        let mut loan = repo::get(&mut *tx, loan_id).await?;
        let before = loan.clone();
        apply_accrual(&mut loan, now, &self.settings.policy);
        ensure_cancellable(&loan)?;
        if loan.renewed_from_id.is_some() {
            return Err(CoreError::invalid_status("Loan", loan_id, "renewal successor", "cancel").into());
        }
        let was_disbursed = loan.status == LoanStatus::Active;

        transition(&mut loan, LoanStatus::Cancelled, "cancel", now)?;
        loan.notes = Some(format!("Cancelled: {}", reason.trim()));
        save(&mut tx, &mut loan).await?;

        if was_disbursed {
            reverse_references_in_tx(
                &mut tx,
                reference::LOAN_DISBURSEMENT,
                loan_id,
                &format!("Cancellation of loan {}", loan.loan_number),
                user_id,
                now,
            )
            .await?;

            if loan.disbursement_method.is_cash() {
                let session = resolve_session(&mut tx, None, user_id).await?;
                let movement = NewMovement::income(loan.loan_amount(), user_id)
                    .referencing(reference::LOAN_CANCELLATION, loan_id)
                    .described(format!("Cancellation of loan {}", loan.loan_number));
                record_in_tx(&mut tx, &session.id, &movement, now).await?;
            }
        }

        self.set_item(&loan.item_id, ItemStatus::Redeemed).await?;
        if was_disbursed {
            let delta = CreditDelta {
                outstanding: -loan.loan_amount(),
                loans_paid_off: 0,
                loans_defaulted: 0,
            };
            self.update_credit(&loan.customer_id, delta).await?;
        }
        audit(
            &self.collaborators,
            AuditEvent::new("cancel", "loan", loan_id, user_id).with_snapshots(Some(&before), Some(&loan)),
        )
        .await?;

        tx.commit().await?;
        info!(loan_number = %loan.loan_number, was_disbursed, "Cancelled loan");
        Ok(loan)
    }

    // =========================================================================
    // Overdue maintenance
    // =========================================================================

    /// Persists the accrual of one loan as of now. Returns true when the
    /// stored row changed.
    pub async fn refresh_overdue(&self, loan_id: &str) -> LedgerResult<bool> {
        let now = self.collaborators.clock.now();
        let mut tx = self.pool.begin().await?;

        let mut loan = repo::get(&mut *tx, loan_id).await?;
        if !apply_accrual(&mut loan, now, &self.settings.policy) {
            return Ok(false);
        }
        loan.updated_at = now;
        save(&mut tx, &mut loan).await?;
        tx.commit().await?;

        debug!(
            loan_number = %loan.loan_number,
            status = %loan.status,
            days_overdue = loan.days_overdue,
            late_fee = %loan.late_fee_amount(),
            "Refreshed overdue state"
        );
        Ok(true)
    }

    /// Persists the accrual of every past-due loan, one transaction each.
    ///
    /// A loan that changes underneath the sweep is counted and skipped; the
    /// next sweep picks it up.
    pub async fn sweep_overdue(&self) -> LedgerResult<SweepReport> {
        let now = self.collaborators.clock.now();
        let candidates = repo::list_past_due(&self.pool, now).await?;
        let mut report = SweepReport {
            examined: candidates.len(),
            ..SweepReport::default()
        };

        for loan in candidates {
            match self.refresh_overdue(&loan.id).await {
                Ok(true) => report.updated += 1,
                Ok(false) => {}
                Err(err) if err.is_retryable() => {
                    warn!(loan_number = %loan.loan_number, error = %err, "Skipped loan in overdue sweep");
                    report.conflicts += 1;
                }
                Err(err) => return Err(err),
            }
        }

        info!(
            examined = report.examined,
            updated = report.updated,
            conflicts = report.conflicts,
            "Overdue sweep finished"
        );
        Ok(report)
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// The loan with overdue days and late fee as of now.
    pub async fn get_loan(&self, loan_id: &str) -> LedgerResult<Loan> {
        let mut loan = repo::get(&self.pool, loan_id).await?;
        apply_accrual(&mut loan, self.collaborators.clock.now(), &self.settings.policy);
        Ok(loan)
    }

    pub async fn payoff_quote(&self, loan_id: &str) -> LedgerResult<PayoffQuote> {
        let loan = repo::get(&self.pool, loan_id).await?;
        Ok(rules::payoff_quote(&loan, self.collaborators.clock.now(), &self.settings.policy))
    }

    pub async fn installments(&self, loan_id: &str) -> LedgerResult<Vec<Installment>> {
        Ok(installment::list_for_loan(&self.pool, loan_id).await?)
    }

    /// Every loan of the renewal chain ending at `loan_id`, oldest first.
    pub async fn renewal_chain(&self, loan_id: &str) -> LedgerResult<Vec<Loan>> {
        Ok(LoanRepository::new(self.pool.clone()).renewal_chain(loan_id).await?)
    }

    pub async fn list_for_customer(&self, customer_id: &str) -> LedgerResult<Vec<Loan>> {
        Ok(LoanRepository::new(self.pool.clone()).list_for_customer(customer_id).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::RecordingCollaborator;
    use crate::repository::accounting as ledger_repo;
    use crate::service::testing::{at, harness, loan_request, CASHIER};
    use crate::service::Ledger;
    use chrono::Duration;
    use pawn_core::{Clock, ErrorKind};

    fn renewal(pay_interest: bool, days: i64) -> RenewLoan {
        RenewLoan {
            new_term_days: days,
            pay_interest,
            new_interest_rate: None,
            payment_method: PaymentMethod::Cash,
            session_id: None,
            created_by: CASHIER.to_string(),
        }
    }

    async fn count(ledger: &Ledger, table: &str) -> i64 {
        sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {table}"))
            .fetch_one(ledger.database().pool())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_create_loan_disburses_cash() {
        let h = harness().await;
        let session = h.open_drawer().await;

        let loan = h.ledger.loans().create_loan(loan_request(100_000)).await.unwrap();
        assert_eq!(loan.loan_number, "LN-2024-000001");
        assert_eq!(loan.status, LoanStatus::Active);
        assert_eq!(loan.interest_amount_cents, 10_000);
        assert_eq!(loan.total_amount_cents, 110_000);
        assert_eq!(loan.due_date, at(11));
        assert!(loan.is_conserved());

        let summary = h.ledger.cash().summary(&session.id).await.unwrap();
        assert_eq!(summary.current_balance.cents(), 0);
        assert_eq!(summary.totals.expense.cents(), 100_000);

        let pool = h.ledger.database().pool();
        let entries = ledger_repo::entries_for_reference(pool, reference::LOAN_DISBURSEMENT, &loan.id)
            .await
            .unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].total_debit_cents, 100_000);

        assert_eq!(h.recorder.items(), vec![(loan.item_id.clone(), ItemStatus::Pawned)]);
        assert_eq!(h.recorder.credits()[0].1, CreditDelta::opened(loan.loan_amount()));
        assert!(h.recorder.audits().iter().any(|e| e.action == "create"));
    }

    #[tokio::test]
    async fn test_cash_loan_without_session_leaves_nothing() {
        let h = harness().await;
        let err = h.ledger.loans().create_loan(loan_request(100_000)).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidStatus);
        assert_eq!(count(&h.ledger, "loans").await, 0);
        assert_eq!(count(&h.ledger, "accounting_entries").await, 0);

        // The number drawn by the failed attempt was rolled back too.
        h.open_drawer().await;
        let loan = h.ledger.loans().create_loan(loan_request(100_000)).await.unwrap();
        assert_eq!(loan.loan_number, "LN-2024-000001");
    }

    #[tokio::test]
    async fn test_policy_limits_rejected() {
        let h = harness().await;
        h.open_drawer().await;
        let err = h.ledger.loans().create_loan(loan_request(500)).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);

        let mut request = loan_request(100_000);
        request.term_days = 0;
        let err = h.ledger.loans().create_loan(request).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
    }

    #[tokio::test]
    async fn test_installment_schedule_persisted() {
        let h = harness().await;
        let mut request = loan_request(100_000);
        request.disbursement_method = PaymentMethod::Transfer;
        request.payment_plan_type = pawn_core::PaymentPlanType::Installments;
        request.number_of_installments = 4;
        request.term_days = 120;
        let loan = h.ledger.loans().create_loan(request).await.unwrap();

        let schedule = h.ledger.loans().installments(&loan.id).await.unwrap();
        assert_eq!(schedule.len(), 4);
        assert_eq!(schedule.iter().map(|i| i.total_cents).sum::<i64>(), loan.total_amount_cents);
        assert_eq!(schedule.last().map(|i| i.due_date), Some(loan.due_date));
    }

    #[tokio::test]
    async fn test_minimum_loan_with_many_installments() {
        let h = harness().await;
        let mut request = loan_request(1_000);
        request.disbursement_method = PaymentMethod::Transfer;
        request.payment_plan_type = pawn_core::PaymentPlanType::Installments;
        request.number_of_installments = 68;
        request.term_days = 340;
        request.interest_rate = pawn_core::Rate::from_bps(500);
        let loan = h.ledger.loans().create_loan(request).await.unwrap();

        let schedule = h.ledger.loans().installments(&loan.id).await.unwrap();
        assert_eq!(schedule.len(), 68);
        assert!(schedule.iter().all(|i| i.principal_cents >= 0 && i.interest_cents >= 0));
        assert_eq!(schedule.iter().map(|i| i.principal_cents).sum::<i64>(), 1_000);
        assert_eq!(schedule.iter().map(|i| i.total_cents).sum::<i64>(), loan.total_amount_cents);
    }

    #[tokio::test]
    async fn test_deferred_loan_disbursed_later() {
        let h = harness().await;
        let session = h.open_drawer().await;
        let mut request = loan_request(50_000);
        request.defer_disbursement = true;

        let loan = h.ledger.loans().create_loan(request).await.unwrap();
        assert_eq!(loan.status, LoanStatus::Pending);
        assert_eq!(count(&h.ledger, "cash_movements").await, 0);
        assert!(h.recorder.credits().is_empty());

        let err = h
            .ledger
            .payments()
            .create_payment(crate::service::NewPayment {
                loan_id: loan.id.clone(),
                amount: Money::from_cents(1_000),
                payment_method: PaymentMethod::Cash,
                session_id: None,
                reference: None,
                notes: None,
                created_by: CASHIER.to_string(),
            })
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidStatus);

        let active = h.ledger.loans().disburse(&loan.id, CASHIER).await.unwrap();
        assert_eq!(active.status, LoanStatus::Active);
        assert_eq!(active.version, 1);
        let summary = h.ledger.cash().summary(&session.id).await.unwrap();
        assert_eq!(summary.current_balance.cents(), 50_000);

        let err = h.ledger.loans().disburse(&loan.id, CASHIER).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidStatus);
    }

    #[tokio::test]
    async fn test_renewal_capitalizes_charges() {
        let h = harness().await;
        h.open_drawer().await;
        let loan = h.ledger.loans().create_loan(loan_request(100_000)).await.unwrap();

        h.set_day(12);
        let outcome = h.ledger.loans().renew(&loan.id, renewal(false, 30)).await.unwrap();

        // 100.00 interest + 50.00 late fee rolled into principal
        assert_eq!(outcome.capitalized.cents(), 15_000);
        assert!(outcome.payment.is_none());
        assert_eq!(outcome.previous.status, LoanStatus::Renewed);

        let successor = &outcome.successor;
        assert_eq!(successor.loan_amount_cents, 115_000);
        assert_eq!(successor.interest_amount_cents, 11_500);
        assert_eq!(successor.renewal_count, 1);
        assert_eq!(successor.renewed_from_id.as_deref(), Some(loan.id.as_str()));
        assert_eq!(successor.due_date, at(12) + Duration::days(30));
        assert_eq!(successor.loan_number, "LN-2024-000002");

        let pool = h.ledger.database().pool();
        let entries = ledger_repo::entries_for_reference(pool, reference::LOAN_RENEWAL, &successor.id)
            .await
            .unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].total_debit_cents, 15_000);

        let chain = h.ledger.loans().renewal_chain(&successor.id).await.unwrap();
        assert_eq!(chain.len(), 2);
        assert_eq!(chain[0].id, loan.id);

        let err = h.ledger.loans().renew(&loan.id, renewal(false, 30)).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidStatus);
    }

    #[tokio::test]
    async fn test_renewal_with_interest_payment() {
        let h = harness().await;
        let session = h.open_drawer().await;
        let loan = h.ledger.loans().create_loan(loan_request(100_000)).await.unwrap();

        h.set_day(5);
        let mut request = renewal(true, 20);
        request.new_interest_rate = Some(Rate::from_bps(800));
        let outcome = h.ledger.loans().renew(&loan.id, request).await.unwrap();

        let payment = outcome.payment.expect("companion payment");
        assert_eq!(payment.interest_cents, 10_000);
        assert_eq!(payment.principal_cents, 0);
        assert!(outcome.capitalized.is_zero());
        assert_eq!(outcome.successor.loan_amount_cents, 100_000);
        assert_eq!(outcome.successor.interest_amount_cents, 8_000);

        let summary = h.ledger.cash().summary(&session.id).await.unwrap();
        assert_eq!(summary.current_balance.cents(), 10_000);
        assert_eq!(count(&h.ledger, "accounting_entries").await, 2);
    }

    #[tokio::test]
    async fn test_renewal_rejects_term_outside_policy() {
        let h = harness().await;
        h.open_drawer().await;
        let loan = h.ledger.loans().create_loan(loan_request(100_000)).await.unwrap();

        let err = h.ledger.loans().renew(&loan.id, renewal(false, 400)).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
        let stored = h.ledger.loans().get_loan(&loan.id).await.unwrap();
        assert_eq!(stored.status, LoanStatus::Active);
        assert_eq!(count(&h.ledger, "loans").await, 1);
    }

    #[tokio::test]
    async fn test_confiscation_needs_grace_window() {
        let h = harness().await;
        h.open_drawer().await;
        let loan = h.ledger.loans().create_loan(loan_request(100_000)).await.unwrap();

        h.set_day(20);
        let err = h.ledger.loans().confiscate(&loan.id, None, CASHIER).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidStatus);

        h.set_day(1);
        h.clock.advance(Duration::days(45));
        let confiscated = h
            .ledger
            .loans()
            .confiscate(&loan.id, Some("unclaimed".into()), CASHIER)
            .await
            .unwrap();
        assert_eq!(confiscated.status, LoanStatus::Confiscated);
        assert!(confiscated.confiscated_date.is_some());
        assert_eq!(confiscated.notes.as_deref(), Some("unclaimed"));

        let pool = h.ledger.database().pool();
        let entries = ledger_repo::entries_for_reference(pool, reference::LOAN_CONFISCATION, &loan.id)
            .await
            .unwrap();
        assert_eq!(entries[0].total_debit_cents, 100_000);
        assert!(h.recorder.items().contains(&(loan.item_id.clone(), ItemStatus::Forfeited)));
        assert!(h.recorder.credits().iter().any(|(_, d)| d.loans_defaulted == 1));

        let receivable = h
            .ledger
            .accounting()
            .get_account_balance("1300", h.clock.now())
            .await
            .unwrap();
        assert!(receivable.is_zero());
    }

    #[tokio::test]
    async fn test_cancel_reverses_disbursement() {
        let h = harness().await;
        let session = h.open_drawer().await;
        let loan = h.ledger.loans().create_loan(loan_request(100_000)).await.unwrap();

        let cancelled = h
            .ledger
            .loans()
            .cancel(&loan.id, "customer changed their mind", CASHIER)
            .await
            .unwrap();
        assert_eq!(cancelled.status, LoanStatus::Cancelled);
        assert!(cancelled.cancelled_date.is_some());

        let summary = h.ledger.cash().summary(&session.id).await.unwrap();
        assert_eq!(summary.current_balance.cents(), 100_000);

        let pool = h.ledger.database().pool();
        let entries = ledger_repo::entries_for_reference(pool, reference::LOAN_DISBURSEMENT, &loan.id)
            .await
            .unwrap();
        assert_eq!(entries.len(), 2);
        let trial = h.ledger.accounting().trial_balance(h.clock.now()).await.unwrap();
        assert!(trial.is_balanced());
        let receivable = h
            .ledger
            .accounting()
            .get_account_balance("1300", h.clock.now())
            .await
            .unwrap();
        assert!(receivable.is_zero());
        assert!(h.recorder.items().contains(&(loan.item_id.clone(), ItemStatus::Redeemed)));

        let err = h.ledger.loans().cancel(&loan.id, "again", CASHIER).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidStatus);
    }

    #[tokio::test]
    async fn test_cancel_refused_after_payment() {
        let h = harness().await;
        h.open_drawer().await;
        let loan = h.ledger.loans().create_loan(loan_request(100_000)).await.unwrap();
        h.ledger
            .payments()
            .create_payment(crate::service::NewPayment {
                loan_id: loan.id.clone(),
                amount: Money::from_cents(5_000),
                payment_method: PaymentMethod::Card,
                session_id: None,
                reference: None,
                notes: None,
                created_by: CASHIER.to_string(),
            })
            .await
            .unwrap();

        let err = h.ledger.loans().cancel(&loan.id, "too late", CASHIER).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidStatus);
    }

    #[tokio::test]
    async fn test_refresh_overdue_is_idempotent() {
        let h = harness().await;
        h.open_drawer().await;
        let loan = h.ledger.loans().create_loan(loan_request(100_000)).await.unwrap();

        h.set_day(20);
        let preview = h.ledger.loans().get_loan(&loan.id).await.unwrap();
        assert_eq!(preview.status, LoanStatus::Overdue);
        assert_eq!(preview.days_overdue, 9);
        assert_eq!(preview.late_fee_remaining_cents, 5_000);
        // Reads never write.
        let stored = repo::get(h.ledger.database().pool(), &loan.id).await.unwrap();
        assert_eq!(stored.status, LoanStatus::Active);

        assert!(h.ledger.loans().refresh_overdue(&loan.id).await.unwrap());
        assert!(!h.ledger.loans().refresh_overdue(&loan.id).await.unwrap());

        let stored = repo::get(h.ledger.database().pool(), &loan.id).await.unwrap();
        assert_eq!(stored.version, 1);
        assert_eq!(stored.days_overdue, 9);
        assert!(stored.is_conserved());

        let quote = h.ledger.loans().payoff_quote(&loan.id).await.unwrap();
        assert_eq!(quote.total.cents(), 115_000);
    }

    #[tokio::test]
    async fn test_stale_version_loses() {
        let h = harness().await;
        h.open_drawer().await;
        let loan = h.ledger.loans().create_loan(loan_request(100_000)).await.unwrap();

        h.set_day(20);
        h.ledger.loans().refresh_overdue(&loan.id).await.unwrap();

        let mut stale = loan.clone();
        stale.notes = Some("edited from a stale copy".into());
        let written = repo::update_versioned(h.ledger.database().pool(), &stale).await.unwrap();
        assert!(!written);
    }

    #[tokio::test]
    async fn test_sweep_updates_past_due_loans() {
        let h = harness().await;
        h.open_drawer().await;
        let short = h.ledger.loans().create_loan(loan_request(20_000)).await.unwrap();
        let mut long = loan_request(20_000);
        long.term_days = 60;
        h.ledger.loans().create_loan(long).await.unwrap();

        h.set_day(25);
        let report = h.ledger.loans().sweep_overdue().await.unwrap();
        assert_eq!(
            report,
            SweepReport {
                examined: 1,
                updated: 1,
                conflicts: 0
            }
        );
        let stored = repo::get(h.ledger.database().pool(), &short.id).await.unwrap();
        assert_eq!(stored.status, LoanStatus::Overdue);

        let again = h.ledger.loans().sweep_overdue().await.unwrap();
        assert_eq!(again.updated, 0);
    }

    #[tokio::test]
    async fn test_collaborator_failure_rolls_back() {
        let h = harness().await;
        h.open_drawer().await;
        let failing = Arc::new(RecordingCollaborator::failing("item service down"));
        let ledger = Ledger::new(
            h.ledger.database().clone(),
            h.ledger.settings().clone(),
            Collaborators::default()
                .with_clock(h.clock.clone())
                .with_items(failing.clone()),
        );

        let err = ledger.loans().create_loan(loan_request(100_000)).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Internal);
        assert_eq!(failing.items().len(), 1);
        assert_eq!(count(&h.ledger, "loans").await, 0);
        assert_eq!(count(&h.ledger, "cash_movements").await, 0);
        assert_eq!(count(&h.ledger, "accounting_entries").await, 0);
    }
}
