//! # Cash Repository
//!
//! Cash sessions and their append-only movement journal.
//!
//! ## Guards
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  open      partial UNIQUE (register_id) / (user_id) WHERE status='open' │
//! │  append    UNIQUE (session_id, sequence), trigger: session must be open │
//! │  close     UPDATE ... WHERE id = ? AND status = 'open'                 │
//! │  history   movements: no UPDATE, no DELETE (triggers)                  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Utc};
use pawn_core::cash::{MovementTotals, Reconciliation};
use pawn_core::{CashMovement, CashSession, Money};
use sqlx::{SqliteExecutor, SqlitePool};
use tracing::debug;

use crate::error::{DbError, DbResult};

// =============================================================================
// Sessions
// =============================================================================

pub async fn insert_session<'e, E: SqliteExecutor<'e>>(executor: E, session: &CashSession) -> DbResult<()> {
    debug!(
        id = %session.id,
        register_id = %session.register_id,
        user_id = %session.user_id,
        "Inserting cash session"
    );

    sqlx::query(
        r#"
        INSERT INTO cash_sessions (
            id, session_number, branch_id, register_id, user_id, status,
            opening_amount_cents, closing_amount_cents, expected_amount_cents,
            difference_cents, opened_at, closed_at, notes
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
        "#,
    )
    .bind(&session.id)
    .bind(&session.session_number)
    .bind(&session.branch_id)
    .bind(&session.register_id)
    .bind(&session.user_id)
    .bind(session.status)
    .bind(session.opening_amount_cents)
    .bind(session.closing_amount_cents)
    .bind(session.expected_amount_cents)
    .bind(session.difference_cents)
    .bind(session.opened_at)
    .bind(session.closed_at)
    .bind(&session.notes)
    .execute(executor)
    .await?;

    Ok(())
}

pub async fn find_session<'e, E: SqliteExecutor<'e>>(executor: E, id: &str) -> DbResult<Option<CashSession>> {
    let session = sqlx::query_as::<_, CashSession>("SELECT * FROM cash_sessions WHERE id = ?1")
        .bind(id)
        .fetch_optional(executor)
        .await?;
    Ok(session)
}

pub async fn get_session<'e, E: SqliteExecutor<'e>>(executor: E, id: &str) -> DbResult<CashSession> {
    find_session(executor, id)
        .await?
        .ok_or_else(|| DbError::not_found("CashSession", id))
}

pub async fn find_open_for_user<'e, E: SqliteExecutor<'e>>(
    executor: E,
    user_id: &str,
) -> DbResult<Option<CashSession>> {
    let session = sqlx::query_as::<_, CashSession>(
        "SELECT * FROM cash_sessions WHERE user_id = ?1 AND status = 'open'",
    )
    .bind(user_id)
    .fetch_optional(executor)
    .await?;
    Ok(session)
}

pub async fn find_open_for_register<'e, E: SqliteExecutor<'e>>(
    executor: E,
    register_id: &str,
) -> DbResult<Option<CashSession>> {
    let session = sqlx::query_as::<_, CashSession>(
        "SELECT * FROM cash_sessions WHERE register_id = ?1 AND status = 'open'",
    )
    .bind(register_id)
    .fetch_optional(executor)
    .await?;
    Ok(session)
}

/// Closes the session if it is still open.
///
/// Returns `false` when another close won the race.
pub async fn close_session<'e, E: SqliteExecutor<'e>>(
    executor: E,
    id: &str,
    reconciliation: &Reconciliation,
    closed_at: DateTime<Utc>,
    notes: Option<&str>,
) -> DbResult<bool> {
    let result = sqlx::query(
        r#"
        UPDATE cash_sessions SET
            status = 'closed',
            closing_amount_cents = ?1,
            expected_amount_cents = ?2,
            difference_cents = ?3,
            closed_at = ?4,
            notes = COALESCE(?5, notes)
        WHERE id = ?6 AND status = 'open'
        "#,
    )
    .bind(reconciliation.closing.cents())
    .bind(reconciliation.expected.cents())
    .bind(reconciliation.difference.cents())
    .bind(closed_at)
    .bind(notes)
    .bind(id)
    .execute(executor)
    .await?;

    Ok(result.rows_affected() == 1)
}

// =============================================================================
// Movements
// =============================================================================

pub async fn insert_movement<'e, E: SqliteExecutor<'e>>(executor: E, movement: &CashMovement) -> DbResult<()> {
    debug!(
        session_id = %movement.session_id,
        sequence = movement.sequence,
        movement_type = %movement.movement_type,
        amount_cents = movement.amount_cents,
        "Appending cash movement"
    );

    sqlx::query(
        r#"
        INSERT INTO cash_movements (
            id, session_id, sequence, movement_type, amount_cents, payment_method,
            reference_type, reference_id, description, balance_after_cents,
            created_by, created_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
        "#,
    )
    .bind(&movement.id)
    .bind(&movement.session_id)
    .bind(movement.sequence)
    .bind(movement.movement_type)
    .bind(movement.amount_cents)
    .bind(movement.payment_method)
    .bind(&movement.reference_type)
    .bind(&movement.reference_id)
    .bind(&movement.description)
    .bind(movement.balance_after_cents)
    .bind(&movement.created_by)
    .bind(movement.created_at)
    .execute(executor)
    .await?;

    Ok(())
}

/// Most recent movement of a session.
pub async fn last_movement<'e, E: SqliteExecutor<'e>>(
    executor: E,
    session_id: &str,
) -> DbResult<Option<CashMovement>> {
    let movement = sqlx::query_as::<_, CashMovement>(
        "SELECT * FROM cash_movements WHERE session_id = ?1 ORDER BY sequence DESC LIMIT 1",
    )
    .bind(session_id)
    .fetch_optional(executor)
    .await?;
    Ok(movement)
}

pub async fn list_movements<'e, E: SqliteExecutor<'e>>(
    executor: E,
    session_id: &str,
) -> DbResult<Vec<CashMovement>> {
    let movements = sqlx::query_as::<_, CashMovement>(
        "SELECT * FROM cash_movements WHERE session_id = ?1 ORDER BY sequence",
    )
    .bind(session_id)
    .fetch_all(executor)
    .await?;
    Ok(movements)
}

/// Income and expense totals of a session's journal.
pub async fn movement_totals<'e, E: SqliteExecutor<'e>>(executor: E, session_id: &str) -> DbResult<MovementTotals> {
    let (income, expense, income_count, expense_count): (i64, i64, i64, i64) = sqlx::query_as(
        r#"
        SELECT
            COALESCE(SUM(CASE WHEN movement_type = 'income' THEN amount_cents END), 0),
            COALESCE(SUM(CASE WHEN movement_type = 'expense' THEN amount_cents END), 0),
            COUNT(CASE WHEN movement_type = 'income' THEN 1 END),
            COUNT(CASE WHEN movement_type = 'expense' THEN 1 END)
        FROM cash_movements
        WHERE session_id = ?1
        "#,
    )
    .bind(session_id)
    .fetch_one(executor)
    .await?;

    Ok(MovementTotals {
        income: Money::from_cents(income),
        expense: Money::from_cents(expense),
        income_count,
        expense_count,
    })
}

/// Read access to sessions and movements.
#[derive(Debug, Clone)]
pub struct CashRepository {
    pool: SqlitePool,
}

impl CashRepository {
    pub fn new(pool: SqlitePool) -> Self {
        CashRepository { pool }
    }

    pub async fn get_session(&self, id: &str) -> DbResult<Option<CashSession>> {
        find_session(&self.pool, id).await
    }

    pub async fn open_session_for_register(&self, register_id: &str) -> DbResult<Option<CashSession>> {
        find_open_for_register(&self.pool, register_id).await
    }

    /// Sessions of a branch opened in `[from, to)`, oldest first.
    pub async fn list_sessions(
        &self,
        branch_id: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> DbResult<Vec<CashSession>> {
        let sessions = sqlx::query_as::<_, CashSession>(
            r#"
            SELECT * FROM cash_sessions
            WHERE branch_id = ?1 AND opened_at >= ?2 AND opened_at < ?3
            ORDER BY opened_at, id
            "#,
        )
        .bind(branch_id)
        .bind(from)
        .bind(to)
        .fetch_all(&self.pool)
        .await?;
        Ok(sessions)
    }

    /// Movements pointing at a ledger document (loan, payment).
    pub async fn movements_for_reference(
        &self,
        reference_type: &str,
        reference_id: &str,
    ) -> DbResult<Vec<CashMovement>> {
        let movements = sqlx::query_as::<_, CashMovement>(
            r#"
            SELECT * FROM cash_movements
            WHERE reference_type = ?1 AND reference_id = ?2
            ORDER BY created_at, sequence
            "#,
        )
        .bind(reference_type)
        .bind(reference_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(movements)
    }
}
