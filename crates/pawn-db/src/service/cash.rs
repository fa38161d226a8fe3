//! # Cash Session Ledger
//!
//! Register sessions and their running cash balance.
//!
//! ## Session Lifecycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  open_session(register, user, opening)                                 │
//! │       │   one open session per register and per user                  │
//! │       ▼                                                                 │
//! │  ┌──────────────────────── open ─────────────────────────┐             │
//! │  │ movement #1  income   +150.00  balance 1150.00        │             │
//! │  │ movement #2  expense  -400.00  balance  750.00        │             │
//! │  │ ...                                                    │             │
//! │  └────────────────────────────────────────────────────────┘             │
//! │       │                                                                 │
//! │       ▼  close_session(counted)                                        │
//! │  expected   = opening + Σincome − Σexpense                             │
//! │  difference = counted − expected                                       │
//! │  status     = closed      (guarded: WHERE status = 'open')             │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::sync::Arc;

use chrono::{DateTime, Utc};
use pawn_core::cash::{check_movement, next_balance, prior_balance, reconcile, MovementTotals};
use pawn_core::numbering::NumberKind;
use pawn_core::validation::{validate_non_negative_amount, validate_notes, validate_required};
use pawn_core::{CashMovement, CashSession, CoreError, Money, MovementType, PaymentMethod, SessionStatus};
use serde::{Deserialize, Serialize};
use sqlx::{SqliteConnection, SqlitePool};
use tracing::{info, warn};

use super::{audit, new_id, LedgerSettings};
use crate::collaborators::{AuditEvent, Collaborators};
use crate::error::{LedgerError, LedgerResult};
use crate::repository::{cash as repo, sequence};

// =============================================================================
// Requests
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenSession {
    pub register_id: String,
    pub user_id: String,
    pub opening_amount: Money,
    pub notes: Option<String>,
}

/// A movement to append to a session's journal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewMovement {
    pub movement_type: MovementType,
    pub amount: Money,
    pub payment_method: PaymentMethod,
    pub reference_type: Option<String>,
    pub reference_id: Option<String>,
    pub description: Option<String>,
    pub created_by: String,
}

impl NewMovement {
    pub fn income(amount: Money, created_by: impl Into<String>) -> Self {
        Self::new(MovementType::Income, amount, created_by)
    }

    pub fn expense(amount: Money, created_by: impl Into<String>) -> Self {
        Self::new(MovementType::Expense, amount, created_by)
    }

    fn new(movement_type: MovementType, amount: Money, created_by: impl Into<String>) -> Self {
        NewMovement {
            movement_type,
            amount,
            payment_method: PaymentMethod::Cash,
            reference_type: None,
            reference_id: None,
            description: None,
            created_by: created_by.into(),
        }
    }

    pub fn referencing(mut self, reference_type: &str, reference_id: &str) -> Self {
        self.reference_type = Some(reference_type.to_string());
        self.reference_id = Some(reference_id.to_string());
        self
    }

    pub fn described(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// Live figures for a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSummary {
    pub session: CashSession,
    pub totals: MovementTotals,
    /// Balance after the last movement (the opening amount when there is none).
    pub current_balance: Money,
}

// =============================================================================
// In-transaction helpers
// =============================================================================

/// Appends a movement to an open session on the caller's connection.
///
/// ## Errors
/// - `NotFound` for an unknown session
/// - `InvalidStatus` when the session is closed
/// - `InvalidAmount` when `amount <= 0`
/// - `Conflict` when a concurrent append took the same sequence number
pub(crate) async fn record_in_tx(
    conn: &mut SqliteConnection,
    session_id: &str,
    request: &NewMovement,
    now: DateTime<Utc>,
) -> LedgerResult<CashMovement> {
    let session = repo::get_session(&mut *conn, session_id).await?;
    check_movement(&session, request.amount)?;

    let last = repo::last_movement(&mut *conn, session_id).await?;
    let prior = prior_balance(&session, last.as_ref());
    let balance = next_balance(prior, request.movement_type, request.amount);

    let movement = CashMovement {
        id: new_id(),
        session_id: session.id.clone(),
        sequence: last.as_ref().map_or(1, |m| m.sequence + 1),
        movement_type: request.movement_type,
        amount_cents: request.amount.cents(),
        payment_method: request.payment_method,
        reference_type: request.reference_type.clone(),
        reference_id: request.reference_id.clone(),
        description: request.description.clone(),
        balance_after_cents: balance.cents(),
        created_by: request.created_by.clone(),
        created_at: now,
    };
    repo::insert_movement(&mut *conn, &movement).await?;

    info!(
        session_id,
        sequence = movement.sequence,
        movement_type = %movement.movement_type,
        amount = %request.amount,
        balance_after = %balance,
        "Recorded cash movement"
    );
    Ok(movement)
}

/// Resolves the session a cash operation should use: the one supplied, or
/// the operator's open session.
///
/// A supplied session must belong to the operator; the register's drawer is
/// theirs only while they hold it open.
///
/// ## Errors
/// - `NotFound` for an unknown session
/// - `Conflict` when the supplied session belongs to another operator
/// - `InvalidStatus` when the operator has no open session
pub(crate) async fn resolve_session(
    conn: &mut SqliteConnection,
    session_id: Option<&str>,
    operator: &str,
) -> LedgerResult<CashSession> {
    match session_id {
        Some(id) => {
            let session = repo::get_session(&mut *conn, id).await?;
            if session.user_id != operator {
                warn!(
                    session_id = id,
                    register_id = %session.register_id,
                    owner = %session.user_id,
                    operator,
                    "Cash operation against another operator's session"
                );
                return Err(LedgerError::conflict(
                    "CashSession",
                    id,
                    format!("held by {} on {}", session.user_id, session.register_id),
                ));
            }
            Ok(session)
        }
        None => repo::find_open_for_user(&mut *conn, operator).await?.ok_or_else(|| {
            CoreError::invalid_status("CashSession", operator, "none open", "record cash movement").into()
        }),
    }
}

// =============================================================================
// Service
// =============================================================================

/// Opens, feeds and closes cash register sessions.
#[derive(Debug, Clone)]
pub struct CashLedger {
    pool: SqlitePool,
    settings: Arc<LedgerSettings>,
    collaborators: Collaborators,
}

impl CashLedger {
    pub fn new(pool: SqlitePool, settings: Arc<LedgerSettings>, collaborators: Collaborators) -> Self {
        CashLedger {
            pool,
            settings,
            collaborators,
        }
    }

    /// Opens a session for a register and operator.
    ///
    /// ## Errors
    /// - `InvalidInput` for a negative opening amount or missing ids
    /// - `Conflict` when the register or the user already has an open
    ///   session (checked first, enforced by partial unique indexes)
    pub async fn open_session(&self, request: OpenSession) -> LedgerResult<CashSession> {
        validate_required("register_id", &request.register_id)?;
        validate_required("user_id", &request.user_id)?;
        validate_non_negative_amount("opening_amount", request.opening_amount)?;
        validate_notes("notes", request.notes.as_deref())?;

        let now = self.collaborators.clock.now();
        let mut tx = self.pool.begin().await?;

        if let Some(existing) = repo::find_open_for_register(&mut *tx, &request.register_id).await? {
            warn!(register_id = %request.register_id, session = %existing.session_number, "Register already open");
            return Err(LedgerError::conflict(
                "CashSession",
                existing.id,
                format!("register {} already has an open session", request.register_id),
            ));
        }
        if let Some(existing) = repo::find_open_for_user(&mut *tx, &request.user_id).await? {
            warn!(user_id = %request.user_id, session = %existing.session_number, "User already has a drawer");
            return Err(LedgerError::conflict(
                "CashSession",
                existing.id,
                format!("user {} already has an open session", request.user_id),
            ));
        }

        let session_number = sequence::next_number(&mut tx, NumberKind::CashSession, now).await?;
        let session = CashSession {
            id: new_id(),
            session_number,
            branch_id: self.settings.branch_id.clone(),
            register_id: request.register_id.clone(),
            user_id: request.user_id.clone(),
            status: SessionStatus::Open,
            opening_amount_cents: request.opening_amount.cents(),
            closing_amount_cents: None,
            expected_amount_cents: None,
            difference_cents: None,
            opened_at: now,
            closed_at: None,
            notes: request.notes.clone(),
        };
        repo::insert_session(&mut *tx, &session).await?;

        audit(
            &self.collaborators,
            AuditEvent::new("open", "cash_session", &session.id, &session.user_id)
                .with_snapshots::<(), _>(None, Some(&session)),
        )
        .await?;

        tx.commit().await?;
        info!(
            session_number = %session.session_number,
            register_id = %session.register_id,
            opening = %request.opening_amount,
            "Opened cash session"
        );
        Ok(session)
    }

    /// Appends a movement to an open session.
    pub async fn record_movement(&self, session_id: &str, request: NewMovement) -> LedgerResult<CashMovement> {
        validate_required("created_by", &request.created_by)?;
        validate_notes("description", request.description.as_deref())?;

        let now = self.collaborators.clock.now();
        let mut tx = self.pool.begin().await?;
        let movement = record_in_tx(&mut tx, session_id, &request, now).await?;
        tx.commit().await?;
        Ok(movement)
    }

    /// Closes a session against the counted drawer amount.
    ///
    /// ## Errors
    /// - `NotFound` for an unknown session
    /// - `InvalidInput` for a negative closing amount
    /// - `Conflict` when the session is already closed, including when a
    ///   concurrent close wins between the read and the guarded update
    pub async fn close_session(
        &self,
        session_id: &str,
        closing_amount: Money,
        notes: Option<String>,
        closed_by: &str,
    ) -> LedgerResult<CashSession> {
        validate_non_negative_amount("closing_amount", closing_amount)?;
        validate_notes("notes", notes.as_deref())?;

        let now = self.collaborators.clock.now();
        let mut tx = self.pool.begin().await?;

        let before = repo::get_session(&mut *tx, session_id).await?;
        if !before.is_open() {
            return Err(LedgerError::conflict("CashSession", session_id, "session already closed"));
        }

        let totals = repo::movement_totals(&mut *tx, session_id).await?;
        let reconciliation = reconcile(before.opening_amount(), &totals, closing_amount);

        let closed = repo::close_session(&mut *tx, session_id, &reconciliation, now, notes.as_deref()).await?;
        if !closed {
            warn!(session_id, "Close lost the race");
            return Err(LedgerError::conflict("CashSession", session_id, "session already closed"));
        }
        let after = repo::get_session(&mut *tx, session_id).await?;

        audit(
            &self.collaborators,
            AuditEvent::new("close", "cash_session", session_id, closed_by)
                .with_snapshots(Some(&before), Some(&after)),
        )
        .await?;

        tx.commit().await?;
        info!(
            session_number = %after.session_number,
            expected = %reconciliation.expected,
            closing = %reconciliation.closing,
            difference = %reconciliation.difference,
            "Closed cash session"
        );
        Ok(after)
    }

    /// Movement totals and current balance of a session.
    pub async fn summary(&self, session_id: &str) -> LedgerResult<SessionSummary> {
        let session = repo::get_session(&self.pool, session_id).await?;
        let totals = repo::movement_totals(&self.pool, session_id).await?;
        let last = repo::last_movement(&self.pool, session_id).await?;
        let current_balance = prior_balance(&session, last.as_ref());
        Ok(SessionSummary {
            session,
            totals,
            current_balance,
        })
    }

    /// The operator's open session, if any.
    pub async fn current_session_for_user(&self, user_id: &str) -> LedgerResult<Option<CashSession>> {
        Ok(repo::find_open_for_user(&self.pool, user_id).await?)
    }

    /// A session's journal in sequence order.
    pub async fn list_movements(&self, session_id: &str) -> LedgerResult<Vec<CashMovement>> {
        if repo::find_session(&self.pool, session_id).await?.is_none() {
            return Err(LedgerError::not_found("CashSession", session_id));
        }
        Ok(repo::list_movements(&self.pool, session_id).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::testing::{file_harness, harness, remove_scratch, CASHIER, REGISTER};
    use pawn_core::{Clock, ErrorKind};

    fn open(register: &str, user: &str) -> OpenSession {
        OpenSession {
            register_id: register.to_string(),
            user_id: user.to_string(),
            opening_amount: Money::from_cents(100_000),
            notes: None,
        }
    }

    #[tokio::test]
    async fn test_open_numbers_session() {
        let h = harness().await;
        let session = h.open_drawer().await;
        assert_eq!(session.session_number, "CS-20240301-0001");
        assert!(session.is_open());
        assert_eq!(session.opening_amount().cents(), 100_000);
    }

    #[tokio::test]
    async fn test_session_exclusivity_and_reopen_after_close() {
        let h = harness().await;
        let cash = h.ledger.cash();
        let first = h.open_drawer().await;

        let err = cash.open_session(open(REGISTER, "cashier-2")).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);

        let err = cash.open_session(open("register-2", CASHIER)).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);

        cash.close_session(&first.id, Money::from_cents(100_000), None, CASHIER)
            .await
            .unwrap();
        let second = cash.open_session(open(REGISTER, "cashier-2")).await.unwrap();
        assert_eq!(second.session_number, "CS-20240301-0002");
    }

    #[tokio::test]
    async fn test_unique_index_blocks_second_open_session() {
        let h = harness().await;
        let first = h.open_drawer().await;

        let mut clone = first.clone();
        clone.id = new_id();
        clone.session_number = "CS-manual".to_string();
        let err = LedgerError::from(
            repo::insert_session(h.ledger.database().pool(), &clone)
                .await
                .unwrap_err(),
        );
        assert_eq!(err.kind(), ErrorKind::Conflict);
    }

    #[tokio::test]
    async fn test_running_balance() {
        let h = harness().await;
        let cash = h.ledger.cash();
        let session = h.open_drawer().await;

        let m1 = cash
            .record_movement(&session.id, NewMovement::income(Money::from_cents(15_000), CASHIER))
            .await
            .unwrap();
        let m2 = cash
            .record_movement(&session.id, NewMovement::expense(Money::from_cents(40_000), CASHIER))
            .await
            .unwrap();

        assert_eq!((m1.sequence, m1.balance_after_cents), (1, 115_000));
        assert_eq!((m2.sequence, m2.balance_after_cents), (2, 75_000));

        let summary = cash.summary(&session.id).await.unwrap();
        assert_eq!(summary.current_balance.cents(), 75_000);
        assert_eq!(summary.totals.income_count, 1);
        assert_eq!(summary.totals.expense.cents(), 40_000);
    }

    #[tokio::test]
    async fn test_movement_rules() {
        let h = harness().await;
        let cash = h.ledger.cash();
        let session = h.open_drawer().await;

        let err = cash
            .record_movement(&session.id, NewMovement::income(Money::zero(), CASHIER))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidAmount);

        let err = cash
            .record_movement("missing", NewMovement::income(Money::from_cents(1), CASHIER))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);

        cash.close_session(&session.id, Money::from_cents(100_000), None, CASHIER)
            .await
            .unwrap();
        let err = cash
            .record_movement(&session.id, NewMovement::income(Money::from_cents(1), CASHIER))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidStatus);
    }

    #[tokio::test]
    async fn test_close_reconciles_and_rejects_second_close() {
        let h = harness().await;
        let cash = h.ledger.cash();
        let session = h.open_drawer().await;
        cash.record_movement(&session.id, NewMovement::income(Money::from_cents(25_000), CASHIER))
            .await
            .unwrap();
        cash.record_movement(&session.id, NewMovement::expense(Money::from_cents(5_000), CASHIER))
            .await
            .unwrap();

        let closed = cash
            .close_session(&session.id, Money::from_cents(119_000), Some("short".into()), CASHIER)
            .await
            .unwrap();
        assert_eq!(closed.status, SessionStatus::Closed);
        assert_eq!(closed.expected_amount_cents, Some(120_000));
        assert_eq!(closed.difference_cents, Some(-1_000));
        assert_eq!(closed.notes.as_deref(), Some("short"));

        let err = cash
            .close_session(&session.id, Money::from_cents(119_000), None, CASHIER)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);
    }

    #[tokio::test]
    async fn test_close_guard_loses_race() {
        let h = harness().await;
        let session = h.open_drawer().await;
        let pool = h.ledger.database().pool();
        let reconciliation = reconcile(session.opening_amount(), &MovementTotals::default(), Money::zero());

        assert!(repo::close_session(pool, &session.id, &reconciliation, h.clock.now(), None)
            .await
            .unwrap());
        assert!(!repo::close_session(pool, &session.id, &reconciliation, h.clock.now(), None)
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_movements_are_append_only() {
        let h = harness().await;
        let session = h.open_drawer().await;
        let movement = h
            .ledger
            .cash()
            .record_movement(&session.id, NewMovement::income(Money::from_cents(500), CASHIER))
            .await
            .unwrap();

        let result = sqlx::query("DELETE FROM cash_movements WHERE id = ?1")
            .bind(&movement.id)
            .execute(h.ledger.database().pool())
            .await;
        assert_eq!(LedgerError::from(result.unwrap_err()).kind(), ErrorKind::Conflict);

        let movements = h.ledger.cash().list_movements(&session.id).await.unwrap();
        assert_eq!(movements.len(), 1);
        assert_eq!(
            h.ledger.cash().current_session_for_user(CASHIER).await.unwrap().map(|s| s.id),
            Some(session.id)
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_opens_leave_one_session_per_register() {
        let (h, path) = file_harness().await;

        let mut tasks = Vec::new();
        for n in 0..8 {
            let ledger = h.ledger.clone();
            tasks.push(tokio::spawn(async move {
                ledger.cash().open_session(open(REGISTER, &format!("cashier-{}", n))).await
            }));
        }

        let mut winners = Vec::new();
        for task in tasks {
            match task.await.unwrap() {
                Ok(session) => winners.push(session),
                Err(err) => assert_eq!(err.kind(), ErrorKind::Conflict, "{}", err),
            }
        }
        assert_eq!(winners.len(), 1);

        let open_now = repo::find_open_for_register(h.ledger.database().pool(), REGISTER)
            .await
            .unwrap()
            .map(|s| s.id);
        assert_eq!(open_now, Some(winners[0].id.clone()));

        remove_scratch(h, path).await;
    }

    #[tokio::test]
    async fn test_supplied_session_must_belong_to_operator() {
        let h = harness().await;
        let session = h.open_drawer().await;
        let mut conn = h.ledger.database().pool().acquire().await.unwrap();

        let err = resolve_session(&mut conn, Some(&session.id), "cashier-2").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);

        let resolved = resolve_session(&mut conn, Some(&session.id), CASHIER).await.unwrap();
        assert_eq!(resolved.id, session.id);
        let resolved = resolve_session(&mut conn, None, CASHIER).await.unwrap();
        assert_eq!(resolved.id, session.id);

        let err = resolve_session(&mut conn, None, "cashier-2").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidStatus);
    }
}
