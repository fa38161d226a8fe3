//! # Payment Repository
//!
//! Payments are immutable once written. The only permitted update flips
//! `is_reversed` from 0 to 1 (with `reversed_at` and `reversal_reason`),
//! enforced by triggers.

use chrono::{DateTime, Utc};
use pawn_core::Payment;
use sqlx::{SqliteExecutor, SqlitePool};
use tracing::debug;

use crate::error::{DbError, DbResult};

pub async fn insert<'e, E: SqliteExecutor<'e>>(executor: E, payment: &Payment) -> DbResult<()> {
    debug!(
        id = %payment.id,
        payment_number = %payment.payment_number,
        loan_id = %payment.loan_id,
        amount_cents = payment.amount_cents,
        "Inserting payment"
    );

    sqlx::query(
        r#"
        INSERT INTO payments (
            id, payment_number, loan_id, session_id,
            amount_cents, principal_cents, interest_cents, late_fee_cents,
            payment_method, loan_balance_after_cents, reference, notes,
            is_reversed, reversed_at, reversal_reason, created_by, created_at
        ) VALUES (
            ?1, ?2, ?3, ?4,
            ?5, ?6, ?7, ?8,
            ?9, ?10, ?11, ?12,
            ?13, ?14, ?15, ?16, ?17
        )
        "#,
    )
    .bind(&payment.id)
    .bind(&payment.payment_number)
    .bind(&payment.loan_id)
    .bind(&payment.session_id)
    .bind(payment.amount_cents)
    .bind(payment.principal_cents)
    .bind(payment.interest_cents)
    .bind(payment.late_fee_cents)
    .bind(payment.payment_method)
    .bind(payment.loan_balance_after_cents)
    .bind(&payment.reference)
    .bind(&payment.notes)
    .bind(payment.is_reversed)
    .bind(payment.reversed_at)
    .bind(&payment.reversal_reason)
    .bind(&payment.created_by)
    .bind(payment.created_at)
    .execute(executor)
    .await?;

    Ok(())
}

pub async fn find<'e, E: SqliteExecutor<'e>>(executor: E, id: &str) -> DbResult<Option<Payment>> {
    let payment = sqlx::query_as::<_, Payment>("SELECT * FROM payments WHERE id = ?1")
        .bind(id)
        .fetch_optional(executor)
        .await?;
    Ok(payment)
}

pub async fn get<'e, E: SqliteExecutor<'e>>(executor: E, id: &str) -> DbResult<Payment> {
    find(executor, id)
        .await?
        .ok_or_else(|| DbError::not_found("Payment", id))
}

/// Flips the reversal flag if it is still clear.
///
/// Returns `false` when the payment was already reversed.
pub async fn mark_reversed<'e, E: SqliteExecutor<'e>>(
    executor: E,
    id: &str,
    at: DateTime<Utc>,
    reason: &str,
) -> DbResult<bool> {
    let result = sqlx::query(
        r#"
        UPDATE payments
        SET is_reversed = 1, reversed_at = ?1, reversal_reason = ?2
        WHERE id = ?3 AND is_reversed = 0
        "#,
    )
    .bind(at)
    .bind(reason)
    .bind(id)
    .execute(executor)
    .await?;

    Ok(result.rows_affected() == 1)
}

pub async fn list_for_loan<'e, E: SqliteExecutor<'e>>(executor: E, loan_id: &str) -> DbResult<Vec<Payment>> {
    let payments = sqlx::query_as::<_, Payment>(
        "SELECT * FROM payments WHERE loan_id = ?1 ORDER BY created_at, payment_number",
    )
    .bind(loan_id)
    .fetch_all(executor)
    .await?;
    Ok(payments)
}

/// Read access to payments.
#[derive(Debug, Clone)]
pub struct PaymentRepository {
    pool: SqlitePool,
}

impl PaymentRepository {
    pub fn new(pool: SqlitePool) -> Self {
        PaymentRepository { pool }
    }

    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<Payment>> {
        find(&self.pool, id).await
    }

    pub async fn get_by_number(&self, payment_number: &str) -> DbResult<Option<Payment>> {
        let payment = sqlx::query_as::<_, Payment>("SELECT * FROM payments WHERE payment_number = ?1")
            .bind(payment_number)
            .fetch_optional(&self.pool)
            .await?;
        Ok(payment)
    }

    pub async fn list_for_loan(&self, loan_id: &str) -> DbResult<Vec<Payment>> {
        list_for_loan(&self.pool, loan_id).await
    }
}
