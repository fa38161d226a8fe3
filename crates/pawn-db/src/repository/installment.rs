//! # Installment Repository
//!
//! Installment rows are written once at origination; afterwards only their
//! paid progress changes, derived from the loan's collected principal and
//! interest.

use pawn_core::Installment;
use sqlx::{SqliteConnection, SqliteExecutor};
use tracing::debug;

use crate::error::DbResult;

/// Inserts a whole schedule.
pub async fn insert_all(conn: &mut SqliteConnection, installments: &[Installment]) -> DbResult<()> {
    for item in installments {
        sqlx::query(
            r#"
            INSERT INTO installments (
                id, loan_id, installment_number, due_date,
                principal_cents, interest_cents, total_cents,
                amount_paid_cents, is_paid, paid_date
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            "#,
        )
        .bind(&item.id)
        .bind(&item.loan_id)
        .bind(item.installment_number)
        .bind(item.due_date)
        .bind(item.principal_cents)
        .bind(item.interest_cents)
        .bind(item.total_cents)
        .bind(item.amount_paid_cents)
        .bind(item.is_paid)
        .bind(item.paid_date)
        .execute(&mut *conn)
        .await?;
    }

    if let Some(first) = installments.first() {
        debug!(loan_id = %first.loan_id, count = installments.len(), "Inserted schedule");
    }
    Ok(())
}

/// Schedule of a loan in installment order.
pub async fn list_for_loan<'e, E: SqliteExecutor<'e>>(executor: E, loan_id: &str) -> DbResult<Vec<Installment>> {
    let rows = sqlx::query_as::<_, Installment>(
        "SELECT * FROM installments WHERE loan_id = ?1 ORDER BY installment_number",
    )
    .bind(loan_id)
    .fetch_all(executor)
    .await?;
    Ok(rows)
}

/// Persists paid progress for each installment.
pub async fn update_progress(conn: &mut SqliteConnection, installments: &[Installment]) -> DbResult<()> {
    for item in installments {
        sqlx::query(
            r#"
            UPDATE installments
            SET amount_paid_cents = ?1, is_paid = ?2, paid_date = ?3
            WHERE id = ?4
            "#,
        )
        .bind(item.amount_paid_cents)
        .bind(item.is_paid)
        .bind(item.paid_date)
        .bind(&item.id)
        .execute(&mut *conn)
        .await?;
    }
    Ok(())
}
