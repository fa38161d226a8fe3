//! # Accounting Rules
//!
//! Double-entry validation and the posting templates for ledger events.
//!
//! ## Templates
//! ```text
//! ┌──────────────────┬──────────────────────────┬──────────────────────────┐
//! │ Event            │ Debit                    │ Credit                   │
//! ├──────────────────┼──────────────────────────┼──────────────────────────┤
//! │ Disbursement     │ loans receivable         │ cash | bank              │
//! │ Payment          │ cash | bank              │ loans receivable (princ.)│
//! │                  │                          │ interest income          │
//! │                  │                          │ late-fee income          │
//! │ Refund/reversal  │ sides of the original entry swapped                 │
//! │ Capitalization   │ loans receivable         │ interest / late-fee inc. │
//! │ Confiscation     │ inventory                │ loans receivable         │
//! └──────────────────┴──────────────────────────┴──────────────────────────┘
//! ```
//! Zero-amount lines are omitted from every template.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::allocation::Allocation;
use crate::error::{CoreError, CoreResult, ValidationError};
use crate::money::Money;
use crate::types::{AccountingEntryLine, EntryLineType, PaymentMethod};

// =============================================================================
// Account Map
// =============================================================================

/// Chart-of-accounts ids the templates post to.
///
/// Loaded from the `[accounts]` section of the ledger configuration; the
/// defaults match the chart seeded by the migrations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AccountMap {
    pub cash: String,
    pub bank: String,
    pub loans_receivable: String,
    pub inventory: String,
    pub interest_income: String,
    pub late_fee_income: String,
}

impl Default for AccountMap {
    fn default() -> Self {
        AccountMap {
            cash: "1100".to_string(),
            bank: "1200".to_string(),
            loans_receivable: "1300".to_string(),
            inventory: "1400".to_string(),
            interest_income: "4100".to_string(),
            late_fee_income: "4200".to_string(),
        }
    }
}

impl AccountMap {
    /// Account that money moves through for a payment method.
    pub fn settlement_account(&self, method: PaymentMethod) -> &str {
        match method {
            PaymentMethod::Cash => &self.cash,
            PaymentMethod::Card | PaymentMethod::Transfer => &self.bank,
        }
    }
}

// =============================================================================
// Journal Lines
// =============================================================================

/// A line of an entry that has not been written yet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JournalLine {
    pub account_id: String,
    pub line_type: EntryLineType,
    pub amount: Money,
    pub description: Option<String>,
}

impl JournalLine {
    pub fn debit(account_id: impl Into<String>, amount: Money) -> Self {
        JournalLine {
            account_id: account_id.into(),
            line_type: EntryLineType::Debit,
            amount,
            description: None,
        }
    }

    pub fn credit(account_id: impl Into<String>, amount: Money) -> Self {
        JournalLine {
            account_id: account_id.into(),
            line_type: EntryLineType::Credit,
            amount,
            description: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// Everything needed to post an entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntryDraft {
    pub branch_id: String,
    pub entry_date: DateTime<Utc>,
    pub description: String,
    pub reference_type: Option<String>,
    pub reference_id: Option<String>,
    pub lines: Vec<JournalLine>,
    pub created_by: String,
}

/// Checks the double-entry rules and returns `(total_debit, total_credit)`.
///
/// ## Rules
/// - at least two lines
/// - every amount strictly positive
/// - both sides present
/// - `Σdebit == Σcredit`
///
/// ## Example
/// ```rust
/// use pawn_core::accounting::{validate_lines, JournalLine};
/// use pawn_core::money::Money;
///
/// let ok = vec![
///     JournalLine::debit("1100", Money::from_cents(100)),
///     JournalLine::credit("4100", Money::from_cents(60)),
///     JournalLine::credit("4200", Money::from_cents(40)),
/// ];
/// assert!(validate_lines(&ok).is_ok());
///
/// let unbalanced = vec![
///     JournalLine::debit("1100", Money::from_cents(100)),
///     JournalLine::credit("4100", Money::from_cents(90)),
/// ];
/// assert!(validate_lines(&unbalanced).is_err());
/// ```
pub fn validate_lines(lines: &[JournalLine]) -> CoreResult<(Money, Money)> {
    if lines.len() < 2 {
        return Err(ValidationError::inconsistent("lines", "an entry needs at least two lines").into());
    }

    let mut debit = Money::zero();
    let mut credit = Money::zero();
    for line in lines {
        if line.account_id.trim().is_empty() {
            return Err(ValidationError::Required {
                field: "account_id".to_string(),
            }
            .into());
        }
        if !line.amount.is_positive() {
            return Err(ValidationError::MustBePositive {
                field: "line amount".to_string(),
            }
            .into());
        }
        match line.line_type {
            EntryLineType::Debit => debit += line.amount,
            EntryLineType::Credit => credit += line.amount,
        }
    }

    if debit.is_zero() || credit.is_zero() {
        return Err(ValidationError::inconsistent("lines", "an entry needs both debit and credit lines").into());
    }
    if debit != credit {
        return Err(CoreError::Unbalanced { debit, credit });
    }
    Ok((debit, credit))
}

fn push_nonzero(lines: &mut Vec<JournalLine>, line: JournalLine) {
    if line.amount.is_positive() {
        lines.push(line);
    }
}

// =============================================================================
// Templates
// =============================================================================

/// Dr loans receivable / Cr cash or bank.
pub fn disbursement_lines(accounts: &AccountMap, principal: Money, method: PaymentMethod) -> Vec<JournalLine> {
    vec![
        JournalLine::debit(&accounts.loans_receivable, principal).with_description("Loan principal"),
        JournalLine::credit(accounts.settlement_account(method), principal)
            .with_description("Loan disbursement"),
    ]
}

/// Dr cash or bank / Cr receivable, interest income, late-fee income.
pub fn payment_lines(accounts: &AccountMap, split: &Allocation, method: PaymentMethod) -> Vec<JournalLine> {
    let mut lines = vec![JournalLine::debit(accounts.settlement_account(method), split.total())
        .with_description("Payment received")];
    push_nonzero(
        &mut lines,
        JournalLine::credit(&accounts.loans_receivable, split.principal).with_description("Principal"),
    );
    push_nonzero(
        &mut lines,
        JournalLine::credit(&accounts.interest_income, split.interest).with_description("Interest"),
    );
    push_nonzero(
        &mut lines,
        JournalLine::credit(&accounts.late_fee_income, split.late_fee).with_description("Late fee"),
    );
    lines
}

/// Dr loans receivable / Cr interest and late-fee income for charges rolled
/// into a renewed loan's principal.
pub fn capitalization_lines(accounts: &AccountMap, interest: Money, late_fee: Money) -> Vec<JournalLine> {
    let mut lines = Vec::new();
    push_nonzero(
        &mut lines,
        JournalLine::debit(&accounts.loans_receivable, interest + late_fee)
            .with_description("Capitalized charges"),
    );
    push_nonzero(
        &mut lines,
        JournalLine::credit(&accounts.interest_income, interest).with_description("Interest"),
    );
    push_nonzero(
        &mut lines,
        JournalLine::credit(&accounts.late_fee_income, late_fee).with_description("Late fee"),
    );
    lines
}

/// Dr inventory / Cr loans receivable for the forfeited principal.
pub fn confiscation_lines(accounts: &AccountMap, principal_remaining: Money) -> Vec<JournalLine> {
    if !principal_remaining.is_positive() {
        return Vec::new();
    }
    vec![
        JournalLine::debit(&accounts.inventory, principal_remaining).with_description("Forfeited collateral"),
        JournalLine::credit(&accounts.loans_receivable, principal_remaining)
            .with_description("Loan written off to inventory"),
    ]
}

/// Mirror image of a posted entry's lines.
pub fn reversal_lines(original: &[AccountingEntryLine]) -> Vec<JournalLine> {
    original
        .iter()
        .map(|line| JournalLine {
            account_id: line.account_id.clone(),
            line_type: line.line_type.opposite(),
            amount: line.amount(),
            description: line.description.clone(),
        })
        .collect()
}

/// Mirror image of unposted lines (payment refunds, disbursement reversals).
pub fn reversed(lines: Vec<JournalLine>) -> Vec<JournalLine> {
    lines
        .into_iter()
        .map(|mut line| {
            line.line_type = line.line_type.opposite();
            line
        })
        .collect()
}

// =============================================================================
// Unit Tests
// =============================================================================
