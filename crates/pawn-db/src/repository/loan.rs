//! # Loan Repository
//!
//! Persistence for loans.
//!
//! ## Optimistic Concurrency
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  read loan (version = 7)                                               │
//! │       │                                                                 │
//! │       ▼  pure rules mutate the in-memory copy                          │
//! │  UPDATE loans SET ..., version = 8 WHERE id = ? AND version = 7        │
//! │       │                                                                 │
//! │       ├── 1 row  ──► committed with the rest of the transaction        │
//! │       └── 0 rows ──► someone else won: Conflict, caller re-reads       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Loans are never deleted; a trigger rejects `DELETE` and any update of a
//! loan that already reached `renewed`, `confiscated` or `cancelled`.

use chrono::{DateTime, Utc};
use pawn_core::{Installment, Loan};
use sqlx::{SqliteExecutor, SqlitePool};
use tracing::debug;

use crate::error::{DbError, DbResult};
use crate::repository::installment;

/// Inserts a new loan row.
pub async fn insert<'e, E: SqliteExecutor<'e>>(executor: E, loan: &Loan) -> DbResult<()> {
    debug!(id = %loan.id, loan_number = %loan.loan_number, "Inserting loan");

    sqlx::query(
        r#"
        INSERT INTO loans (
            id, loan_number, branch_id, customer_id, item_id,
            loan_amount_cents, interest_rate_bps, late_fee_rate_bps,
            interest_amount_cents, total_amount_cents, late_fee_amount_cents,
            principal_remaining_cents, interest_remaining_cents,
            late_fee_remaining_cents, amount_paid_cents,
            payment_plan_type, number_of_installments, requires_minimum_payment,
            term_days, disbursement_method,
            start_date, due_date, status, days_overdue, renewal_count, renewed_from_id,
            paid_date, confiscated_date, cancelled_date, notes,
            created_by, created_at, updated_at, version
        ) VALUES (
            ?1, ?2, ?3, ?4, ?5,
            ?6, ?7, ?8,
            ?9, ?10, ?11,
            ?12, ?13,
            ?14, ?15,
            ?16, ?17, ?18,
            ?19, ?20,
            ?21, ?22, ?23, ?24, ?25, ?26,
            ?27, ?28, ?29, ?30,
            ?31, ?32, ?33, ?34
        )
        "#,
    )
    .bind(&loan.id)
    .bind(&loan.loan_number)
    .bind(&loan.branch_id)
    .bind(&loan.customer_id)
    .bind(&loan.item_id)
    .bind(loan.loan_amount_cents)
    .bind(loan.interest_rate_bps)
    .bind(loan.late_fee_rate_bps)
    .bind(loan.interest_amount_cents)
    .bind(loan.total_amount_cents)
    .bind(loan.late_fee_amount_cents)
    .bind(loan.principal_remaining_cents)
    .bind(loan.interest_remaining_cents)
    .bind(loan.late_fee_remaining_cents)
    .bind(loan.amount_paid_cents)
    .bind(loan.payment_plan_type)
    .bind(loan.number_of_installments)
    .bind(loan.requires_minimum_payment)
    .bind(loan.term_days)
    .bind(loan.disbursement_method)
    .bind(loan.start_date)
    .bind(loan.due_date)
    .bind(loan.status)
    .bind(loan.days_overdue)
    .bind(loan.renewal_count)
    .bind(&loan.renewed_from_id)
    .bind(loan.paid_date)
    .bind(loan.confiscated_date)
    .bind(loan.cancelled_date)
    .bind(&loan.notes)
    .bind(&loan.created_by)
    .bind(loan.created_at)
    .bind(loan.updated_at)
    .bind(loan.version)
    .execute(executor)
    .await?;

    Ok(())
}

/// Fetches a loan by id.
pub async fn find<'e, E: SqliteExecutor<'e>>(executor: E, id: &str) -> DbResult<Option<Loan>> {
    let loan = sqlx::query_as::<_, Loan>("SELECT * FROM loans WHERE id = ?1")
        .bind(id)
        .fetch_optional(executor)
        .await?;
    Ok(loan)
}

/// Fetches a loan by id, failing with `NotFound`.
pub async fn get<'e, E: SqliteExecutor<'e>>(executor: E, id: &str) -> DbResult<Loan> {
    find(executor, id)
        .await?
        .ok_or_else(|| DbError::not_found("Loan", id))
}

/// Writes every mutable column of `loan` if the stored version still equals
/// `loan.version`, bumping it by one.
///
/// Returns `false` when the guard matched no row.
pub async fn update_versioned<'e, E: SqliteExecutor<'e>>(executor: E, loan: &Loan) -> DbResult<bool> {
    debug!(id = %loan.id, version = loan.version, status = %loan.status, "Updating loan");

    let result = sqlx::query(
        r#"
        UPDATE loans SET
            interest_rate_bps = ?1,
            late_fee_rate_bps = ?2,
            late_fee_amount_cents = ?3,
            principal_remaining_cents = ?4,
            interest_remaining_cents = ?5,
            late_fee_remaining_cents = ?6,
            amount_paid_cents = ?7,
            status = ?8,
            days_overdue = ?9,
            paid_date = ?10,
            confiscated_date = ?11,
            cancelled_date = ?12,
            notes = ?13,
            updated_at = ?14,
            version = version + 1
        WHERE id = ?15 AND version = ?16
        "#,
    )
    .bind(loan.interest_rate_bps)
    .bind(loan.late_fee_rate_bps)
    .bind(loan.late_fee_amount_cents)
    .bind(loan.principal_remaining_cents)
    .bind(loan.interest_remaining_cents)
    .bind(loan.late_fee_remaining_cents)
    .bind(loan.amount_paid_cents)
    .bind(loan.status)
    .bind(loan.days_overdue)
    .bind(loan.paid_date)
    .bind(loan.confiscated_date)
    .bind(loan.cancelled_date)
    .bind(&loan.notes)
    .bind(loan.updated_at)
    .bind(&loan.id)
    .bind(loan.version)
    .execute(executor)
    .await?;

    Ok(result.rows_affected() == 1)
}

/// Loans still accruing (`active` or `overdue`) whose due date has passed.
pub async fn list_past_due<'e, E: SqliteExecutor<'e>>(
    executor: E,
    as_of: DateTime<Utc>,
) -> DbResult<Vec<Loan>> {
    let loans = sqlx::query_as::<_, Loan>(
        r#"
        SELECT * FROM loans
        WHERE status IN ('active', 'overdue') AND due_date < ?1
        ORDER BY due_date, id
        "#,
    )
    .bind(as_of)
    .fetch_all(executor)
    .await?;
    Ok(loans)
}

/// The loan created by renewing `previous_id`, if any.
pub async fn find_successor<'e, E: SqliteExecutor<'e>>(
    executor: E,
    previous_id: &str,
) -> DbResult<Option<Loan>> {
    let loan = sqlx::query_as::<_, Loan>("SELECT * FROM loans WHERE renewed_from_id = ?1")
        .bind(previous_id)
        .fetch_optional(executor)
        .await?;
    Ok(loan)
}

// =============================================================================
// Read-only handle
// =============================================================================

/// Read access to loans for callers outside a ledger transaction.
///
/// Rows are returned as stored; [`crate::service::LoanLedger::get_loan`]
/// applies the as-of accrual on top.
#[derive(Debug, Clone)]
pub struct LoanRepository {
    pool: SqlitePool,
}

impl LoanRepository {
    pub fn new(pool: SqlitePool) -> Self {
        LoanRepository { pool }
    }

    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<Loan>> {
        find(&self.pool, id).await
    }

    pub async fn get_by_number(&self, loan_number: &str) -> DbResult<Option<Loan>> {
        let loan = sqlx::query_as::<_, Loan>("SELECT * FROM loans WHERE loan_number = ?1")
            .bind(loan_number)
            .fetch_optional(&self.pool)
            .await?;
        Ok(loan)
    }

    /// Loans of a customer, newest first.
    pub async fn list_for_customer(&self, customer_id: &str) -> DbResult<Vec<Loan>> {
        let loans = sqlx::query_as::<_, Loan>(
            "SELECT * FROM loans WHERE customer_id = ?1 ORDER BY created_at DESC, id",
        )
        .bind(customer_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(loans)
    }

    /// Renewal chain ending at `loan_id`, oldest first.
    pub async fn renewal_chain(&self, loan_id: &str) -> DbResult<Vec<Loan>> {
        let mut chain = Vec::new();
        let mut next = Some(loan_id.to_string());
        while let Some(id) = next {
            let loan = get(&self.pool, &id).await?;
            next = loan.renewed_from_id.clone();
            chain.push(loan);
        }
        chain.reverse();
        Ok(chain)
    }

    pub async fn successor_of(&self, loan_id: &str) -> DbResult<Option<Loan>> {
        find_successor(&self.pool, loan_id).await
    }

    pub async fn installments(&self, loan_id: &str) -> DbResult<Vec<Installment>> {
        installment::list_for_loan(&self.pool, loan_id).await
    }
}
