//! # Accounting Poster
//!
//! Writes balanced, posted journal entries and answers balance queries.
//!
//! ## Posting
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  EntryDraft { lines }                                                  │
//! │       │                                                                 │
//! │       ▼  validate_lines        ≥2 lines, positive, Σdebit = Σcredit    │
//! │       ▼  accounts exist and are active            (else NotFound)      │
//! │       ▼  JE-YYYYMMDD-NNNN from the entry date                          │
//! │       ▼  header (unposted) → lines → mark_posted (trigger re-checks)   │
//! │                                                                         │
//! │  Corrections never update: reverse_entry() posts the mirror image and  │
//! │  links it through reverses_entry_id (unique, so at most once).         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::sync::Arc;

use chrono::{DateTime, Utc};
use pawn_core::accounting::{reversal_lines, validate_lines, EntryDraft};
use pawn_core::numbering::NumberKind;
use pawn_core::validation::validate_reason;
use pawn_core::{AccountType, AccountingEntry, AccountingEntryLine, CoreError, Money};
use serde::{Deserialize, Serialize};
use sqlx::{SqliteConnection, SqlitePool};
use tracing::{info, warn};

use super::{audit, new_id, LedgerSettings};
use crate::collaborators::{AuditEvent, Collaborators};
use crate::error::{LedgerError, LedgerResult};
use crate::repository::{accounting as repo, sequence};

// =============================================================================
// In-transaction helpers
// =============================================================================

/// Validates, numbers, writes and posts `draft` on the caller's connection.
pub(crate) async fn post_in_tx(
    conn: &mut SqliteConnection,
    draft: &EntryDraft,
    reverses_entry_id: Option<&str>,
    now: DateTime<Utc>,
) -> LedgerResult<AccountingEntry> {
    let (debit, credit) = validate_lines(&draft.lines)?;

    for line in &draft.lines {
        match repo::find_account(&mut *conn, &line.account_id).await? {
            Some(account) if account.is_active => {}
            _ => return Err(LedgerError::not_found("Account", &line.account_id)),
        }
    }

    let entry_number = sequence::next_number(conn, NumberKind::JournalEntry, draft.entry_date).await?;
    let mut entry = AccountingEntry {
        id: new_id(),
        entry_number,
        branch_id: draft.branch_id.clone(),
        entry_date: draft.entry_date,
        description: draft.description.clone(),
        reference_type: draft.reference_type.clone(),
        reference_id: draft.reference_id.clone(),
        total_debit_cents: debit.cents(),
        total_credit_cents: credit.cents(),
        is_posted: false,
        posted_at: None,
        reverses_entry_id: reverses_entry_id.map(str::to_string),
        created_by: draft.created_by.clone(),
        created_at: now,
    };
    repo::insert_entry(&mut *conn, &entry).await?;

    for (index, line) in draft.lines.iter().enumerate() {
        let row = AccountingEntryLine {
            id: new_id(),
            entry_id: entry.id.clone(),
            line_number: index as i64 + 1,
            account_id: line.account_id.clone(),
            line_type: line.line_type,
            amount_cents: line.amount.cents(),
            description: line.description.clone(),
        };
        repo::insert_line(&mut *conn, &row).await?;
    }

    if !repo::mark_posted(&mut *conn, &entry.id, now).await? {
        return Err(LedgerError::conflict("AccountingEntry", &entry.id, "already posted"));
    }
    entry.is_posted = true;
    entry.posted_at = Some(now);

    info!(
        entry_number = %entry.entry_number,
        reference_type = ?entry.reference_type,
        total_cents = debit.cents(),
        "Posted accounting entry"
    );
    Ok(entry)
}

/// Posts the mirror image of a posted entry.
///
/// `Conflict` when the entry was already reversed.
pub(crate) async fn reverse_in_tx(
    conn: &mut SqliteConnection,
    original: &AccountingEntry,
    description: String,
    created_by: &str,
    now: DateTime<Utc>,
) -> LedgerResult<AccountingEntry> {
    if !original.is_posted {
        return Err(CoreError::invalid_status("AccountingEntry", &original.id, "draft", "reverse").into());
    }
    if repo::find_reversal_of(&mut *conn, &original.id).await?.is_some() {
        return Err(LedgerError::conflict("AccountingEntry", &original.id, "entry already reversed"));
    }

    let lines = repo::lines_for_entry(&mut *conn, &original.id).await?;
    let draft = EntryDraft {
        branch_id: original.branch_id.clone(),
        entry_date: now,
        description,
        reference_type: original.reference_type.clone(),
        reference_id: original.reference_id.clone(),
        lines: reversal_lines(&lines),
        created_by: created_by.to_string(),
    };
    post_in_tx(conn, &draft, Some(&original.id), now).await
}

/// Reverses every not-yet-reversed entry pointing at a document.
pub(crate) async fn reverse_references_in_tx(
    conn: &mut SqliteConnection,
    reference_type: &str,
    reference_id: &str,
    description: &str,
    created_by: &str,
    now: DateTime<Utc>,
) -> LedgerResult<Vec<AccountingEntry>> {
    let entries = repo::entries_for_reference(&mut *conn, reference_type, reference_id).await?;
    let mut reversals = Vec::new();
    for entry in entries {
        if entry.reverses_entry_id.is_some() || !entry.is_posted {
            continue;
        }
        if repo::find_reversal_of(&mut *conn, &entry.id).await?.is_some() {
            continue;
        }
        let reversal = reverse_in_tx(
            conn,
            &entry,
            format!("{description} ({})", entry.entry_number),
            created_by,
            now,
        )
        .await?;
        reversals.push(reversal);
    }
    Ok(reversals)
}

// =============================================================================
// Trial balance
// =============================================================================

/// Balance of one account in a trial balance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrialBalanceRow {
    pub account_id: String,
    pub code: String,
    pub name: String,
    pub account_type: AccountType,
    /// `Σdebit − Σcredit` when positive, else zero.
    pub debit: Money,
    /// `Σcredit − Σdebit` when positive, else zero.
    pub credit: Money,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrialBalance {
    pub as_of: DateTime<Utc>,
    pub rows: Vec<TrialBalanceRow>,
    pub total_debit: Money,
    pub total_credit: Money,
}

impl TrialBalance {
    pub fn is_balanced(&self) -> bool {
        self.total_debit == self.total_credit
    }
}

// =============================================================================
// Service
// =============================================================================

/// Posts journal entries and reports balances.
#[derive(Debug, Clone)]
pub struct AccountingPoster {
    pool: SqlitePool,
    settings: Arc<LedgerSettings>,
    collaborators: Collaborators,
}

impl AccountingPoster {
    pub fn new(pool: SqlitePool, settings: Arc<LedgerSettings>, collaborators: Collaborators) -> Self {
        AccountingPoster {
            pool,
            settings,
            collaborators,
        }
    }

    /// Posts a manual entry.
    ///
    /// ## Errors
    /// - `InvalidInput` for fewer than two lines, non-positive amounts, a
    ///   missing side or `Σdebit != Σcredit`
    /// - `NotFound` for unknown or inactive accounts
    pub async fn post(&self, draft: EntryDraft) -> LedgerResult<AccountingEntry> {
        let now = self.collaborators.clock.now();
        let mut tx = self.pool.begin().await?;

        let entry = post_in_tx(&mut tx, &draft, None, now).await?;
        audit(
            &self.collaborators,
            AuditEvent::new("post", "accounting_entry", &entry.id, &draft.created_by)
                .with_snapshots::<(), _>(None, Some(&entry)),
        )
        .await?;

        tx.commit().await?;
        Ok(entry)
    }

    /// `Σdebit − Σcredit` over posted entries dated on or before `as_of`.
    pub async fn get_account_balance(&self, account_id: &str, as_of: DateTime<Utc>) -> LedgerResult<Money> {
        if repo::find_account(&self.pool, account_id).await?.is_none() {
            return Err(LedgerError::not_found("Account", account_id));
        }
        let (debit, credit) = repo::account_totals(&self.pool, account_id, as_of).await?;
        Ok(debit - credit)
    }

    /// Posts the mirror image of `entry_id`.
    ///
    /// ## Errors
    /// - `NotFound` for an unknown entry
    /// - `Conflict` when the entry was already reversed
    pub async fn reverse_entry(&self, entry_id: &str, reason: &str, user_id: &str) -> LedgerResult<AccountingEntry> {
        validate_reason(reason)?;
        let now = self.collaborators.clock.now();
        let mut tx = self.pool.begin().await?;

        let original = repo::get_entry(&mut *tx, entry_id).await?;
        let reversal = reverse_in_tx(
            &mut tx,
            &original,
            format!("Reversal of {}: {}", original.entry_number, reason),
            user_id,
            now,
        )
        .await
        .inspect_err(|err| {
            if err.is_retryable() {
                warn!(entry_id, "Entry reversal lost a race");
            }
        })?;

        audit(
            &self.collaborators,
            AuditEvent::new("reverse_entry", "accounting_entry", entry_id, user_id)
                .with_snapshots(Some(&original), Some(&reversal)),
        )
        .await?;

        tx.commit().await?;
        Ok(reversal)
    }

    /// Every account's balance as of a date, split into debit and credit
    /// columns.
    pub async fn trial_balance(&self, as_of: DateTime<Utc>) -> LedgerResult<TrialBalance> {
        let rows = repo::all_account_totals(&self.pool, as_of).await?;

        let mut total_debit = Money::zero();
        let mut total_credit = Money::zero();
        let rows: Vec<TrialBalanceRow> = rows
            .into_iter()
            .map(|row| {
                let net = Money::from_cents(row.debit_cents - row.credit_cents);
                let (debit, credit) = if net.is_negative() {
                    (Money::zero(), -net)
                } else {
                    (net, Money::zero())
                };
                total_debit += debit;
                total_credit += credit;
                TrialBalanceRow {
                    account_id: row.account_id,
                    code: row.code,
                    name: row.name,
                    account_type: row.account_type,
                    debit,
                    credit,
                }
            })
            .collect();

        if total_debit != total_credit {
            warn!(%total_debit, %total_credit, "Trial balance does not agree");
        }

        Ok(TrialBalance {
            as_of,
            rows,
            total_debit,
            total_credit,
        })
    }

    /// Branch this poster stamps on manual entries.
    pub fn branch_id(&self) -> &str {
        &self.settings.branch_id
    }
}
