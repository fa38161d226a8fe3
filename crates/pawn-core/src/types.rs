//! # Domain Types
//!
//! Ledger entities and their status enums.
//!
//! ## Type Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Domain Types                                    │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────┐       │
//! │  │      Loan       │   │    Payment      │   │  CashSession    │       │
//! │  │  ─────────────  │   │  ─────────────  │   │  ─────────────  │       │
//! │  │  loan_number    │◄──│  loan_id (FK)   │   │  register_id    │       │
//! │  │  3 buckets      │   │  split (3 parts)│──►│  opening_amount │       │
//! │  │  status         │   │  is_reversed    │   │  status         │       │
//! │  └───────┬─────────┘   └─────────────────┘   └───────┬─────────┘       │
//! │          │ owns                                      │ owns             │
//! │  ┌───────▼─────────┐   ┌─────────────────┐   ┌───────▼─────────┐       │
//! │  │  Installment    │   │ AccountingEntry │   │  CashMovement   │       │
//! │  │  principal      │   │  ≥ 2 lines      │   │  balance_after  │       │
//! │  │  interest       │   │  Σdr == Σcr     │   │  append-only    │       │
//! │  └─────────────────┘   └─────────────────┘   └─────────────────┘       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Storage Convention
//! Money fields are stored as integer cents (`*_cents`) and rates as basis
//! points (`*_bps`). Accessors such as [`Loan::principal_remaining`] return the
//! typed [`Money`]/[`Rate`] views.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::ValidationError;
use crate::money::Money;

// =============================================================================
// Rate
// =============================================================================

/// A rate represented in basis points (bps).
///
/// ## Why Basis Points?
/// 1 basis point = 0.01% = 1/10000
/// 350 bps = 3.5% monthly interest, a typical pawn rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Rate(u32);

impl Rate {
    /// Creates a rate from basis points.
    #[inline]
    pub const fn from_bps(bps: u32) -> Self {
        Rate(bps)
    }

    /// Returns the rate in basis points.
    #[inline]
    pub const fn bps(&self) -> u32 {
        self.0
    }

    /// Returns the rate as a percentage (for display only).
    #[inline]
    pub fn percentage(&self) -> f64 {
        self.0 as f64 / 100.0
    }

    /// Zero rate.
    #[inline]
    pub const fn zero() -> Self {
        Rate(0)
    }

    /// Checks if rate is zero.
    #[inline]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }
}

impl Default for Rate {
    fn default() -> Self {
        Rate::zero()
    }
}

/// Implements `as_str`, `Display` and `FromStr` for a storage enum.
macro_rules! string_enum {
    ($name:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        impl $name {
            /// Returns the storage representation.
            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text),+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = ValidationError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok($name::$variant),)+
                    other => Err(ValidationError::InvalidFormat {
                        field: stringify!($name).to_string(),
                        reason: format!("unknown value '{}'", other),
                    }),
                }
            }
        }
    };
}

// =============================================================================
// Loan Status
// =============================================================================

/// Lifecycle status of a loan.
///
/// ## State Machine
/// ```text
///            ┌──────────► cancelled
///            │               ▲
///  pending ──┴──► active ────┤
///                 │  ▲       ├──► paid ◄──┐
///        past due │  │ paid  │            │
///                 ▼  │ down  ├──► renewed │ (successor loan created)
///                overdue ────┤            │
///                            ├──► paid ───┘
///                            └──► confiscated
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(type_name = "TEXT", rename_all = "lowercase"))]
#[serde(rename_all = "snake_case")]
pub enum LoanStatus {
    /// Approved but not yet disbursed.
    Pending,
    /// Disbursed and not past due.
    Active,
    /// Past due date without full settlement.
    Overdue,
    /// Fully settled.
    Paid,
    /// Closed into a successor loan.
    Renewed,
    /// Collateral forfeited to the shop.
    Confiscated,
    /// Withdrawn before any payment.
    Cancelled,
}

string_enum!(LoanStatus {
    Pending => "pending",
    Active => "active",
    Overdue => "overdue",
    Paid => "paid",
    Renewed => "renewed",
    Confiscated => "confiscated",
    Cancelled => "cancelled",
});

impl LoanStatus {
    /// Loans that still carry an open balance and accrue late fees.
    pub fn is_open(&self) -> bool {
        matches!(self, LoanStatus::Active | LoanStatus::Overdue)
    }

    /// Statuses no operation can leave.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            LoanStatus::Renewed | LoanStatus::Confiscated | LoanStatus::Cancelled
        )
    }

    /// Returns true if the state machine allows `self → next`.
    pub fn can_transition_to(&self, next: LoanStatus) -> bool {
        use LoanStatus::*;
        match (self, next) {
            (Pending, Active) | (Pending, Cancelled) => true,
            (Active, Overdue) | (Overdue, Active) => true,
            (Active, Paid) | (Overdue, Paid) => true,
            (Active, Renewed) | (Overdue, Renewed) => true,
            (Overdue, Confiscated) => true,
            (Active, Cancelled) => true,
            // Only a payment reversal reopens a paid loan
            (Paid, Active) | (Paid, Overdue) => true,
            _ => false,
        }
    }
}

// =============================================================================
// Payment Plan Type
// =============================================================================

/// How the loan is expected to be repaid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(type_name = "TEXT", rename_all = "snake_case"))]
#[serde(rename_all = "snake_case")]
pub enum PaymentPlanType {
    /// One flat interest period, everything due at `due_date`.
    SinglePayment,
    /// One interest period per installment, scheduled payments.
    Installments,
}

string_enum!(PaymentPlanType {
    SinglePayment => "single_payment",
    Installments => "installments",
});

impl Default for PaymentPlanType {
    fn default() -> Self {
        PaymentPlanType::SinglePayment
    }
}

// =============================================================================
// Payment Method
// =============================================================================

/// How money changed hands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(type_name = "TEXT", rename_all = "snake_case"))]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    /// Physical cash through a register.
    Cash,
    /// Card payment on an external terminal.
    Card,
    /// Bank transfer.
    Transfer,
}

string_enum!(PaymentMethod {
    Cash => "cash",
    Card => "card",
    Transfer => "transfer",
});

impl PaymentMethod {
    /// Cash goes through the register and needs an open session.
    pub fn is_cash(&self) -> bool {
        matches!(self, PaymentMethod::Cash)
    }
}

// =============================================================================
// Cash Session / Movement enums
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(type_name = "TEXT", rename_all = "lowercase"))]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Open,
    Closed,
}

string_enum!(SessionStatus {
    Open => "open",
    Closed => "closed",
});

/// Direction of a cash movement relative to the register.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(type_name = "TEXT", rename_all = "lowercase"))]
#[serde(rename_all = "snake_case")]
pub enum MovementType {
    /// Money into the drawer (payments, sales).
    Income,
    /// Money out of the drawer (disbursements, refunds).
    Expense,
}

string_enum!(MovementType {
    Income => "income",
    Expense => "expense",
});

// =============================================================================
// Accounting enums
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(type_name = "TEXT", rename_all = "lowercase"))]
#[serde(rename_all = "snake_case")]
pub enum EntryLineType {
    Debit,
    Credit,
}

string_enum!(EntryLineType {
    Debit => "debit",
    Credit => "credit",
});

impl EntryLineType {
    /// The opposite side, used by reversing entries.
    pub fn opposite(&self) -> Self {
        match self {
            EntryLineType::Debit => EntryLineType::Credit,
            EntryLineType::Credit => EntryLineType::Debit,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(type_name = "TEXT", rename_all = "lowercase"))]
#[serde(rename_all = "snake_case")]
pub enum AccountType {
    Asset,
    Liability,
    Equity,
    Income,
    Expense,
}

string_enum!(AccountType {
    Asset => "asset",
    Liability => "liability",
    Equity => "equity",
    Income => "income",
    Expense => "expense",
});

// =============================================================================
// Item Status (collaborator contract)
// =============================================================================

/// Collateral status the ledger asks the item service to set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemStatus {
    /// Held as collateral for an open loan.
    Pawned,
    /// Returned to the customer after payoff.
    Redeemed,
    /// Forfeited to the shop, sellable inventory.
    Forfeited,
}

string_enum!(ItemStatus {
    Pawned => "pawned",
    Redeemed => "redeemed",
    Forfeited => "forfeited",
});

// =============================================================================
// Loan
// =============================================================================

/// A collateralized loan.
///
/// ## Balance Buckets
/// The outstanding balance is kept in three buckets that payments drain in
/// a fixed order (late fee → interest → principal). Money is conserved:
/// `principal_remaining + interest_remaining + late_fee_remaining +
/// amount_paid == total_amount + late_fee_amount`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct Loan {
    pub id: String,
    /// Business identifier (`LN-YYYY-NNNNNN`).
    pub loan_number: String,
    pub branch_id: String,
    pub customer_id: String,
    /// Collateral item (owned by the item service).
    pub item_id: String,

    pub loan_amount_cents: i64,
    /// Interest per rate period in basis points.
    pub interest_rate_bps: u32,
    /// Late fee per late-fee period in basis points of remaining principal.
    pub late_fee_rate_bps: u32,
    pub interest_amount_cents: i64,
    /// Principal + interest at issuance.
    pub total_amount_cents: i64,
    /// Late fee accrued so far (derived from `days_overdue`).
    pub late_fee_amount_cents: i64,

    pub principal_remaining_cents: i64,
    pub interest_remaining_cents: i64,
    pub late_fee_remaining_cents: i64,
    pub amount_paid_cents: i64,

    pub payment_plan_type: PaymentPlanType,
    pub number_of_installments: i64,
    pub requires_minimum_payment: bool,
    pub term_days: i64,
    pub disbursement_method: PaymentMethod,

    pub start_date: DateTime<Utc>,
    pub due_date: DateTime<Utc>,
    pub status: LoanStatus,
    pub days_overdue: i64,
    pub renewal_count: i64,
    /// Loan this one was renewed from (back reference, not owning).
    pub renewed_from_id: Option<String>,

    pub paid_date: Option<DateTime<Utc>>,
    pub confiscated_date: Option<DateTime<Utc>>,
    pub cancelled_date: Option<DateTime<Utc>>,
    pub notes: Option<String>,

    pub created_by: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Optimistic-concurrency counter, bumped by every update.
    pub version: i64,
}

impl Loan {
    #[inline]
    pub fn loan_amount(&self) -> Money {
        Money::from_cents(self.loan_amount_cents)
    }

    #[inline]
    pub fn interest_rate(&self) -> Rate {
        Rate::from_bps(self.interest_rate_bps)
    }

    #[inline]
    pub fn late_fee_rate(&self) -> Rate {
        Rate::from_bps(self.late_fee_rate_bps)
    }

    #[inline]
    pub fn interest_amount(&self) -> Money {
        Money::from_cents(self.interest_amount_cents)
    }

    #[inline]
    pub fn total_amount(&self) -> Money {
        Money::from_cents(self.total_amount_cents)
    }

    #[inline]
    pub fn late_fee_amount(&self) -> Money {
        Money::from_cents(self.late_fee_amount_cents)
    }

    #[inline]
    pub fn principal_remaining(&self) -> Money {
        Money::from_cents(self.principal_remaining_cents)
    }

    #[inline]
    pub fn interest_remaining(&self) -> Money {
        Money::from_cents(self.interest_remaining_cents)
    }

    #[inline]
    pub fn late_fee_remaining(&self) -> Money {
        Money::from_cents(self.late_fee_remaining_cents)
    }

    #[inline]
    pub fn amount_paid(&self) -> Money {
        Money::from_cents(self.amount_paid_cents)
    }

    /// Late fees already collected.
    #[inline]
    pub fn late_fee_paid(&self) -> Money {
        self.late_fee_amount() - self.late_fee_remaining()
    }

    /// Principal and interest collected so far (drives installment status).
    #[inline]
    pub fn scheduled_amount_paid(&self) -> Money {
        self.total_amount() - self.principal_remaining() - self.interest_remaining()
    }

    /// Sum of all three remaining buckets.
    #[inline]
    pub fn payoff_amount(&self) -> Money {
        self.principal_remaining() + self.interest_remaining() + self.late_fee_remaining()
    }

    /// True when every bucket is drained.
    #[inline]
    pub fn is_settled(&self) -> bool {
        self.payoff_amount().is_zero()
    }

    /// Checks the conservation-of-money invariant.
    pub fn is_conserved(&self) -> bool {
        self.principal_remaining_cents
            + self.interest_remaining_cents
            + self.late_fee_remaining_cents
            + self.amount_paid_cents
            == self.total_amount_cents + self.late_fee_amount_cents
    }
}

// =============================================================================
// Installment
// =============================================================================

/// One scheduled repayment of a loan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct Installment {
    pub id: String,
    pub loan_id: String,
    /// 1-based position in the schedule.
    pub installment_number: i64,
    pub due_date: DateTime<Utc>,
    pub principal_cents: i64,
    pub interest_cents: i64,
    pub total_cents: i64,
    pub amount_paid_cents: i64,
    pub is_paid: bool,
    pub paid_date: Option<DateTime<Utc>>,
}

impl Installment {
    #[inline]
    pub fn total(&self) -> Money {
        Money::from_cents(self.total_cents)
    }

    #[inline]
    pub fn amount_paid(&self) -> Money {
        Money::from_cents(self.amount_paid_cents)
    }
}

// =============================================================================
// Payment
// =============================================================================

/// A payment against a loan.
///
/// Immutable once created except for the one-way reversal flag. The split
/// (`principal + interest + late_fee == amount`) is stored so a reversal
/// restores the exact buckets without recomputing anything.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct Payment {
    pub id: String,
    /// Business identifier (`PY-YYYY-NNNNNN`).
    pub payment_number: String,
    pub loan_id: String,
    /// Cash session the money went through (cash payments only).
    pub session_id: Option<String>,
    pub amount_cents: i64,
    pub principal_cents: i64,
    pub interest_cents: i64,
    pub late_fee_cents: i64,
    pub payment_method: PaymentMethod,
    /// Loan payoff right after this payment (point-in-time snapshot).
    pub loan_balance_after_cents: i64,
    pub reference: Option<String>,
    pub notes: Option<String>,
    pub is_reversed: bool,
    pub reversed_at: Option<DateTime<Utc>>,
    pub reversal_reason: Option<String>,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
}

impl Payment {
    #[inline]
    pub fn amount(&self) -> Money {
        Money::from_cents(self.amount_cents)
    }

    #[inline]
    pub fn loan_balance_after(&self) -> Money {
        Money::from_cents(self.loan_balance_after_cents)
    }
}

// =============================================================================
// Cash Session
// =============================================================================

/// A bounded period during which one operator owns a register's cash.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct CashSession {
    pub id: String,
    /// Business identifier (`CS-YYYYMMDD-NNNN`).
    pub session_number: String,
    pub branch_id: String,
    pub register_id: String,
    pub user_id: String,
    pub status: SessionStatus,
    pub opening_amount_cents: i64,
    pub closing_amount_cents: Option<i64>,
    pub expected_amount_cents: Option<i64>,
    pub difference_cents: Option<i64>,
    pub opened_at: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,
    pub notes: Option<String>,
}

impl CashSession {
    #[inline]
    pub fn opening_amount(&self) -> Money {
        Money::from_cents(self.opening_amount_cents)
    }

    #[inline]
    pub fn closing_amount(&self) -> Option<Money> {
        self.closing_amount_cents.map(Money::from_cents)
    }

    #[inline]
    pub fn expected_amount(&self) -> Option<Money> {
        self.expected_amount_cents.map(Money::from_cents)
    }

    #[inline]
    pub fn difference(&self) -> Option<Money> {
        self.difference_cents.map(Money::from_cents)
    }

    #[inline]
    pub fn is_open(&self) -> bool {
        self.status == SessionStatus::Open
    }
}

// =============================================================================
// Cash Movement
// =============================================================================

/// Append-only journal line of a cash session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct CashMovement {
    pub id: String,
    pub session_id: String,
    /// 1-based order inside the session.
    pub sequence: i64,
    pub movement_type: MovementType,
    pub amount_cents: i64,
    pub payment_method: PaymentMethod,
    /// What caused the movement: "loan", "payment", "sale", ...
    pub reference_type: Option<String>,
    pub reference_id: Option<String>,
    pub description: Option<String>,
    /// Running drawer balance after this movement.
    pub balance_after_cents: i64,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
}

impl CashMovement {
    #[inline]
    pub fn amount(&self) -> Money {
        Money::from_cents(self.amount_cents)
    }

    #[inline]
    pub fn balance_after(&self) -> Money {
        Money::from_cents(self.balance_after_cents)
    }
}

// =============================================================================
// Accounting
// =============================================================================

/// Chart-of-accounts row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct Account {
    pub id: String,
    pub code: String,
    pub name: String,
    pub account_type: AccountType,
    pub is_active: bool,
}

/// Header of a double-entry journal entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct AccountingEntry {
    pub id: String,
    /// Business identifier (`JE-YYYYMMDD-NNNN`).
    pub entry_number: String,
    pub branch_id: String,
    pub entry_date: DateTime<Utc>,
    pub description: String,
    pub reference_type: Option<String>,
    pub reference_id: Option<String>,
    pub total_debit_cents: i64,
    pub total_credit_cents: i64,
    pub is_posted: bool,
    pub posted_at: Option<DateTime<Utc>>,
    /// Set on reversing entries: the entry being reversed.
    pub reverses_entry_id: Option<String>,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
}

impl AccountingEntry {
    #[inline]
    pub fn total_debit(&self) -> Money {
        Money::from_cents(self.total_debit_cents)
    }

    #[inline]
    pub fn total_credit(&self) -> Money {
        Money::from_cents(self.total_credit_cents)
    }
}

/// One debit or credit line of an entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct AccountingEntryLine {
    pub id: String,
    pub entry_id: String,
    pub line_number: i64,
    pub account_id: String,
    pub line_type: EntryLineType,
    pub amount_cents: i64,
    pub description: Option<String>,
}

impl AccountingEntryLine {
    #[inline]
    pub fn amount(&self) -> Money {
        Money::from_cents(self.amount_cents)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rate_from_bps() {
        let rate = Rate::from_bps(350);
        assert_eq!(rate.bps(), 350);
        assert!((rate.percentage() - 3.5).abs() < 0.001);
        assert!(Rate::default().is_zero());
    }

    #[test]
    fn test_status_round_trip_text() {
        assert_eq!(LoanStatus::Confiscated.to_string(), "confiscated");
        assert_eq!("overdue".parse::<LoanStatus>().unwrap(), LoanStatus::Overdue);
        assert!("closed".parse::<LoanStatus>().is_err());
        assert_eq!(
            "single_payment".parse::<PaymentPlanType>().unwrap(),
            PaymentPlanType::SinglePayment
        );
    }

    #[test]
    fn test_loan_state_machine() {
        use LoanStatus::*;
        assert!(Pending.can_transition_to(Active));
        assert!(Active.can_transition_to(Overdue));
        assert!(Overdue.can_transition_to(Active));
        assert!(Overdue.can_transition_to(Confiscated));
        assert!(!Active.can_transition_to(Confiscated));
        assert!(!Paid.can_transition_to(Renewed));
        assert!(!Confiscated.can_transition_to(Active));
        assert!(!Cancelled.can_transition_to(Active));
        assert!(Renewed.is_terminal());
        assert!(!Paid.is_open());
    }

    #[test]
    fn test_opposite_side() {
        assert_eq!(EntryLineType::Debit.opposite(), EntryLineType::Credit);
        assert_eq!(EntryLineType::Credit.opposite(), EntryLineType::Debit);
    }
}
