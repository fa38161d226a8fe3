//! # Numbering
//!
//! Business identifiers for ledger documents.
//!
//! ```text
//!  Kind          Format               Sequence resets
//!  ───────────   ──────────────────   ───────────────
//!  Loan          LN-YYYY-NNNNNN       yearly
//!  Payment       PY-YYYY-NNNNNN       yearly
//!  Sale          SL-YYYY-NNNNNN       yearly
//!  JournalEntry  JE-YYYYMMDD-NNNN     daily
//!  CashSession   CS-YYYYMMDD-NNNN     daily
//! ```
//!
//! The counter itself lives in the database (`sequences` table) and is
//! incremented inside the caller's transaction; this module only names the
//! counters and formats their values.

use chrono::{DateTime, Utc};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NumberKind {
    Loan,
    Payment,
    Sale,
    JournalEntry,
    CashSession,
}

impl NumberKind {
    fn prefix(&self) -> &'static str {
        match self {
            NumberKind::Loan => "LN",
            NumberKind::Payment => "PY",
            NumberKind::Sale => "SL",
            NumberKind::JournalEntry => "JE",
            NumberKind::CashSession => "CS",
        }
    }

    fn is_daily(&self) -> bool {
        matches!(self, NumberKind::JournalEntry | NumberKind::CashSession)
    }

    fn period(&self, at: DateTime<Utc>) -> String {
        if self.is_daily() {
            at.format("%Y%m%d").to_string()
        } else {
            at.format("%Y").to_string()
        }
    }

    /// Name of the counter row for the period containing `at`.
    ///
    /// ```rust
    /// use chrono::{TimeZone, Utc};
    /// use pawn_core::numbering::NumberKind;
    ///
    /// let at = Utc.with_ymd_and_hms(2024, 3, 9, 12, 0, 0).unwrap();
    /// assert_eq!(NumberKind::Loan.sequence_key(at), "LN-2024");
    /// assert_eq!(NumberKind::JournalEntry.sequence_key(at), "JE-20240309");
    /// ```
    pub fn sequence_key(&self, at: DateTime<Utc>) -> String {
        format!("{}-{}", self.prefix(), self.period(at))
    }

    /// Formats counter value `value` for the period containing `at`.
    pub fn format(&self, at: DateTime<Utc>, value: i64) -> String {
        if self.is_daily() {
            format!("{}-{}-{:04}", self.prefix(), self.period(at), value)
        } else {
            format!("{}-{}-{:06}", self.prefix(), self.period(at), value)
        }
    }
}
