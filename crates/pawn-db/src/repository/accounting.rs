//! # Accounting Repository
//!
//! Chart of accounts and journal entries.
//!
//! ## Posting Protocol
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  1. insert_entry(header, is_posted = 0)                                │
//! │  2. insert_line(...) × n                                               │
//! │  3. mark_posted(entry)   ← trigger re-checks Σdebit = Σcredit = header │
//! │                                                                         │
//! │  All three steps share the caller's transaction. After step 3 the     │
//! │  header and its lines are immutable.                                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Utc};
use pawn_core::{Account, AccountType, AccountingEntry, AccountingEntryLine, Money};
use sqlx::{SqliteExecutor, SqlitePool};
use tracing::debug;

use crate::error::{DbError, DbResult};

// =============================================================================
// Accounts
// =============================================================================

pub async fn find_account<'e, E: SqliteExecutor<'e>>(executor: E, id: &str) -> DbResult<Option<Account>> {
    let account = sqlx::query_as::<_, Account>("SELECT * FROM accounts WHERE id = ?1")
        .bind(id)
        .fetch_optional(executor)
        .await?;
    Ok(account)
}

pub async fn list_accounts<'e, E: SqliteExecutor<'e>>(executor: E) -> DbResult<Vec<Account>> {
    let accounts = sqlx::query_as::<_, Account>("SELECT * FROM accounts ORDER BY code")
        .fetch_all(executor)
        .await?;
    Ok(accounts)
}

pub async fn insert_account<'e, E: SqliteExecutor<'e>>(executor: E, account: &Account) -> DbResult<()> {
    sqlx::query(
        "INSERT INTO accounts (id, code, name, account_type, is_active) VALUES (?1, ?2, ?3, ?4, ?5)",
    )
    .bind(&account.id)
    .bind(&account.code)
    .bind(&account.name)
    .bind(account.account_type)
    .bind(account.is_active)
    .execute(executor)
    .await?;
    Ok(())
}

pub async fn set_account_active<'e, E: SqliteExecutor<'e>>(executor: E, id: &str, active: bool) -> DbResult<()> {
    let result = sqlx::query("UPDATE accounts SET is_active = ?1 WHERE id = ?2")
        .bind(active)
        .bind(id)
        .execute(executor)
        .await?;
    if result.rows_affected() == 0 {
        return Err(DbError::not_found("Account", id));
    }
    Ok(())
}

// =============================================================================
// Entries
// =============================================================================

/// Inserts an entry header. Callers insert it unposted and post it after
/// its lines are in place.
pub async fn insert_entry<'e, E: SqliteExecutor<'e>>(executor: E, entry: &AccountingEntry) -> DbResult<()> {
    debug!(
        id = %entry.id,
        entry_number = %entry.entry_number,
        total_debit_cents = entry.total_debit_cents,
        "Inserting accounting entry"
    );

    sqlx::query(
        r#"
        INSERT INTO accounting_entries (
            id, entry_number, branch_id, entry_date, description,
            reference_type, reference_id, total_debit_cents, total_credit_cents,
            is_posted, posted_at, reverses_entry_id, created_by, created_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)
        "#,
    )
    .bind(&entry.id)
    .bind(&entry.entry_number)
    .bind(&entry.branch_id)
    .bind(entry.entry_date)
    .bind(&entry.description)
    .bind(&entry.reference_type)
    .bind(&entry.reference_id)
    .bind(entry.total_debit_cents)
    .bind(entry.total_credit_cents)
    .bind(entry.is_posted)
    .bind(entry.posted_at)
    .bind(&entry.reverses_entry_id)
    .bind(&entry.created_by)
    .bind(entry.created_at)
    .execute(executor)
    .await?;

    Ok(())
}

pub async fn insert_line<'e, E: SqliteExecutor<'e>>(executor: E, line: &AccountingEntryLine) -> DbResult<()> {
    sqlx::query(
        r#"
        INSERT INTO accounting_entry_lines (
            id, entry_id, line_number, account_id, line_type, amount_cents, description
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
        "#,
    )
    .bind(&line.id)
    .bind(&line.entry_id)
    .bind(line.line_number)
    .bind(&line.account_id)
    .bind(line.line_type)
    .bind(line.amount_cents)
    .bind(&line.description)
    .execute(executor)
    .await?;
    Ok(())
}

/// Posts an unposted entry. The balance trigger aborts if the lines do not
/// match the header.
pub async fn mark_posted<'e, E: SqliteExecutor<'e>>(executor: E, id: &str, at: DateTime<Utc>) -> DbResult<bool> {
    let result = sqlx::query(
        "UPDATE accounting_entries SET is_posted = 1, posted_at = ?1 WHERE id = ?2 AND is_posted = 0",
    )
    .bind(at)
    .bind(id)
    .execute(executor)
    .await?;
    Ok(result.rows_affected() == 1)
}

pub async fn find_entry<'e, E: SqliteExecutor<'e>>(executor: E, id: &str) -> DbResult<Option<AccountingEntry>> {
    let entry = sqlx::query_as::<_, AccountingEntry>("SELECT * FROM accounting_entries WHERE id = ?1")
        .bind(id)
        .fetch_optional(executor)
        .await?;
    Ok(entry)
}

pub async fn get_entry<'e, E: SqliteExecutor<'e>>(executor: E, id: &str) -> DbResult<AccountingEntry> {
    find_entry(executor, id)
        .await?
        .ok_or_else(|| DbError::not_found("AccountingEntry", id))
}

pub async fn lines_for_entry<'e, E: SqliteExecutor<'e>>(
    executor: E,
    entry_id: &str,
) -> DbResult<Vec<AccountingEntryLine>> {
    let lines = sqlx::query_as::<_, AccountingEntryLine>(
        "SELECT * FROM accounting_entry_lines WHERE entry_id = ?1 ORDER BY line_number",
    )
    .bind(entry_id)
    .fetch_all(executor)
    .await?;
    Ok(lines)
}

/// Entries that point at a ledger document, oldest first.
pub async fn entries_for_reference<'e, E: SqliteExecutor<'e>>(
    executor: E,
    reference_type: &str,
    reference_id: &str,
) -> DbResult<Vec<AccountingEntry>> {
    let entries = sqlx::query_as::<_, AccountingEntry>(
        r#"
        SELECT * FROM accounting_entries
        WHERE reference_type = ?1 AND reference_id = ?2
        ORDER BY created_at, entry_number
        "#,
    )
    .bind(reference_type)
    .bind(reference_id)
    .fetch_all(executor)
    .await?;
    Ok(entries)
}

pub async fn find_reversal_of<'e, E: SqliteExecutor<'e>>(
    executor: E,
    entry_id: &str,
) -> DbResult<Option<AccountingEntry>> {
    let entry = sqlx::query_as::<_, AccountingEntry>(
        "SELECT * FROM accounting_entries WHERE reverses_entry_id = ?1",
    )
    .bind(entry_id)
    .fetch_optional(executor)
    .await?;
    Ok(entry)
}

// =============================================================================
// Balances
// =============================================================================

/// `(Σdebit, Σcredit)` of an account over posted entries dated `<= as_of`.
pub async fn account_totals<'e, E: SqliteExecutor<'e>>(
    executor: E,
    account_id: &str,
    as_of: DateTime<Utc>,
) -> DbResult<(Money, Money)> {
    let (debit, credit): (i64, i64) = sqlx::query_as(
        r#"
        SELECT
            COALESCE(SUM(CASE WHEN l.line_type = 'debit' THEN l.amount_cents END), 0),
            COALESCE(SUM(CASE WHEN l.line_type = 'credit' THEN l.amount_cents END), 0)
        FROM accounting_entry_lines l
        JOIN accounting_entries e ON e.id = l.entry_id
        WHERE l.account_id = ?1 AND e.is_posted = 1 AND e.entry_date <= ?2
        "#,
    )
    .bind(account_id)
    .bind(as_of)
    .fetch_one(executor)
    .await?;

    Ok((Money::from_cents(debit), Money::from_cents(credit)))
}

/// One row of the trial balance.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct AccountTotalsRow {
    pub account_id: String,
    pub code: String,
    pub name: String,
    pub account_type: AccountType,
    pub debit_cents: i64,
    pub credit_cents: i64,
}

/// Debit and credit totals for every account (inactive ones included, so
/// historical postings still show up).
pub async fn all_account_totals<'e, E: SqliteExecutor<'e>>(
    executor: E,
    as_of: DateTime<Utc>,
) -> DbResult<Vec<AccountTotalsRow>> {
    let rows = sqlx::query_as::<_, AccountTotalsRow>(
        r#"
        SELECT
            a.id AS account_id,
            a.code AS code,
            a.name AS name,
            a.account_type AS account_type,
            COALESCE(SUM(CASE WHEN l.line_type = 'debit' THEN l.amount_cents END), 0) AS debit_cents,
            COALESCE(SUM(CASE WHEN l.line_type = 'credit' THEN l.amount_cents END), 0) AS credit_cents
        FROM accounts a
        LEFT JOIN accounting_entry_lines l ON l.account_id = a.id
            AND l.entry_id IN (
                SELECT id FROM accounting_entries WHERE is_posted = 1 AND entry_date <= ?1
            )
        GROUP BY a.id, a.code, a.name, a.account_type
        ORDER BY a.code
        "#,
    )
    .bind(as_of)
    .fetch_all(executor)
    .await?;
    Ok(rows)
}

/// Read access to the chart and the journal.
#[derive(Debug, Clone)]
pub struct AccountingRepository {
    pool: SqlitePool,
}

impl AccountingRepository {
    pub fn new(pool: SqlitePool) -> Self {
        AccountingRepository { pool }
    }

    pub async fn accounts(&self) -> DbResult<Vec<Account>> {
        list_accounts(&self.pool).await
    }

    pub async fn get_account(&self, id: &str) -> DbResult<Option<Account>> {
        find_account(&self.pool, id).await
    }

    pub async fn get_entry(&self, id: &str) -> DbResult<Option<AccountingEntry>> {
        find_entry(&self.pool, id).await
    }

    pub async fn lines(&self, entry_id: &str) -> DbResult<Vec<AccountingEntryLine>> {
        lines_for_entry(&self.pool, entry_id).await
    }

    pub async fn entries_for_reference(
        &self,
        reference_type: &str,
        reference_id: &str,
    ) -> DbResult<Vec<AccountingEntry>> {
        entries_for_reference(&self.pool, reference_type, reference_id).await
    }
}
