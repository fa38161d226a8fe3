//! # Money Module
//!
//! Provides the `Money` type for handling monetary values safely.
//!
//! ## Why Integer Money?
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  THE FLOATING POINT PROBLEM                                             │
//! │                                                                         │
//! │  In floating point:                                                     │
//! │    0.1 + 0.2 = 0.30000000000000004  ❌ WRONG!                           │
//! │                                                                         │
//! │  A loan of $100.00 paid in 3 installments:                              │
//! │    $33.33 × 3 = $99.99              → Lost $0.01!                      │
//! │                                                                         │
//! │  OUR SOLUTION: Integer Cents + Explicit Remainders                      │
//! │    10000 cents split 3 ways = [3333, 3333, 3334]                        │
//! │    The remainder lands on the LAST part, the sum is exact              │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust
//! use pawn_core::money::Money;
//!
//! let principal = Money::from_cents(100_000); // $1,000.00
//! let fee = Money::from_cents(5_000);
//! let payoff = principal + fee;
//! assert_eq!(payoff.cents(), 105_000);
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign, Mul, Neg, Sub, SubAssign};

use crate::types::Rate;

// =============================================================================
// Money Type
// =============================================================================

/// Represents a monetary value in the smallest currency unit (cents).
///
/// ## Design Decisions
/// - **i64 (signed)**: Allows negative values for deltas and differences
///   (e.g. a cash session that closes short)
/// - **Single field tuple struct**: Zero-cost abstraction over i64
///
/// ## Where Money is Used
/// ```text
/// ┌─────────────────────────────────────────────────────────────────────────┐
/// │  Loan.loan_amount ──► interest ──► total_amount ──► installments       │
/// │                                                                         │
/// │  Payment.amount ──► allocate() ──► late fee / interest / principal     │
/// │                                                                         │
/// │  CashMovement.amount ──► balance_after ──► session reconciliation      │
/// │                                                                         │
/// │  EntryLine.amount ──► Σ debit == Σ credit                              │
/// └─────────────────────────────────────────────────────────────────────────┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Money(i64);

impl Money {
    /// Creates a Money value from cents (the smallest currency unit).
    ///
    /// ## Example
    /// ```rust
    /// use pawn_core::money::Money;
    ///
    /// let amount = Money::from_cents(1099); // Represents $10.99
    /// assert_eq!(amount.cents(), 1099);
    /// ```
    #[inline]
    pub const fn from_cents(cents: i64) -> Self {
        Money(cents)
    }

    /// Creates a Money value from major and minor units.
    ///
    /// For negative amounts only the major unit should be negative:
    /// `from_major_minor(-5, 50)` is -5.50.
    #[inline]
    pub const fn from_major_minor(major: i64, minor: i64) -> Self {
        if major < 0 {
            Money(major * 100 - minor)
        } else {
            Money(major * 100 + minor)
        }
    }

    /// Returns the value in cents.
    #[inline]
    pub const fn cents(&self) -> i64 {
        self.0
    }

    /// Returns the major unit portion.
    #[inline]
    pub const fn major(&self) -> i64 {
        self.0 / 100
    }

    /// Returns the minor unit portion (always 0-99).
    #[inline]
    pub const fn minor(&self) -> i64 {
        (self.0 % 100).abs()
    }

    /// Returns zero money value.
    #[inline]
    pub const fn zero() -> Self {
        Money(0)
    }

    /// Checks if the value is zero.
    #[inline]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }

    /// Checks if the value is positive (greater than zero).
    #[inline]
    pub const fn is_positive(&self) -> bool {
        self.0 > 0
    }

    /// Checks if the value is negative (less than zero).
    #[inline]
    pub const fn is_negative(&self) -> bool {
        self.0 < 0
    }

    /// Returns the absolute value.
    #[inline]
    pub const fn abs(&self) -> Self {
        Money(self.0.abs())
    }

    /// Applies a rate once, rounding half away from zero to whole cents.
    ///
    /// ## Implementation
    /// Integer math: `(|amount| * bps + 5000) / 10000`, sign restored after.
    /// The +5000 provides rounding (5000/10000 = 0.5).
    ///
    /// ## Example
    /// ```rust
    /// use pawn_core::money::Money;
    /// use pawn_core::types::Rate;
    ///
    /// let principal = Money::from_cents(100_000); // $1,000.00
    /// let rate = Rate::from_bps(1000);            // 10% per period
    /// assert_eq!(principal.apply_rate(rate).cents(), 10_000);
    /// ```
    pub fn apply_rate(&self, rate: Rate) -> Money {
        self.apply_rate_times(rate, 1)
    }

    /// Applies a rate for `periods` periods in one rounding step.
    ///
    /// Rounding once over the whole product (instead of per period) keeps
    /// `apply_rate_times(r, n)` independent of how the periods are counted.
    ///
    /// ```rust
    /// use pawn_core::money::Money;
    /// use pawn_core::types::Rate;
    ///
    /// let principal = Money::from_cents(33_333);
    /// let fee = principal.apply_rate_times(Rate::from_bps(150), 3);
    /// // 333.33 × 1.5% × 3 = 14.999985 → 15.00
    /// assert_eq!(fee.cents(), 1_500);
    /// ```
    pub fn apply_rate_times(&self, rate: Rate, periods: i64) -> Money {
        // i128 prevents overflow on large principals over many periods
        let magnitude = self.0.unsigned_abs() as i128 * rate.bps() as i128 * periods as i128;
        let rounded = (magnitude + 5000) / 10000;
        let signed = if self.0 < 0 { -rounded } else { rounded };
        Money::from_cents(signed as i64)
    }

    /// Multiplies money by a count.
    #[inline]
    pub const fn times(&self, count: i64) -> Self {
        Money(self.0 * count)
    }

    /// Splits the amount into `parts` equal shares.
    ///
    /// Every share is `amount / parts` truncated; the remainder is added to
    /// the last share so the shares always sum to the original amount.
    /// Returns an empty vector when `parts` is zero.
    ///
    /// ```rust
    /// use pawn_core::money::Money;
    ///
    /// let shares = Money::from_cents(10_000).split_evenly(3);
    /// let cents: Vec<i64> = shares.iter().map(|m| m.cents()).collect();
    /// assert_eq!(cents, vec![3333, 3333, 3334]);
    /// ```
    pub fn split_evenly(&self, parts: usize) -> Vec<Money> {
        if parts == 0 {
            return Vec::new();
        }

        let share = self.0 / parts as i64;
        let mut shares = vec![Money(share); parts];
        let allocated = share * parts as i64;
        if let Some(last) = shares.last_mut() {
            last.0 += self.0 - allocated;
        }
        shares
    }

    /// Returns the share of `self` that corresponds to `part / whole`,
    /// rounded half away from zero. Returns zero when `whole` is zero.
    pub fn proportion(&self, part: Money, whole: Money) -> Money {
        if whole.is_zero() {
            return Money::zero();
        }
        let numerator = self.0 as i128 * part.0 as i128;
        let denominator = whole.0 as i128;
        let half = denominator.abs() / 2;
        let rounded = if (numerator < 0) != (denominator < 0) {
            (numerator - half * numerator.signum()) / denominator
        } else {
            (numerator + half * numerator.signum()) / denominator
        };
        Money::from_cents(rounded as i64)
    }

    /// Subtracts, never going below zero.
    #[inline]
    pub fn saturating_sub(&self, other: Money) -> Money {
        Money((self.0 - other.0).max(0))
    }
}

// =============================================================================
// Trait Implementations
// =============================================================================

/// Display implementation shows money as `1234.56` (no currency symbol).
///
/// The shop's currency symbol and grouping belong to the presentation layer.
impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        write!(f, "{}{}.{:02}", sign, self.major().abs(), self.minor())
    }
}

impl Default for Money {
    fn default() -> Self {
        Money::zero()
    }
}

impl Add for Money {
    type Output = Self;

    #[inline]
    fn add(self, other: Self) -> Self {
        Money(self.0 + other.0)
    }
}

impl AddAssign for Money {
    #[inline]
    fn add_assign(&mut self, other: Self) {
        self.0 += other.0;
    }
}

impl Sub for Money {
    type Output = Self;

    #[inline]
    fn sub(self, other: Self) -> Self {
        Money(self.0 - other.0)
    }
}

impl SubAssign for Money {
    #[inline]
    fn sub_assign(&mut self, other: Self) {
        self.0 -= other.0;
    }
}

impl Neg for Money {
    type Output = Self;

    #[inline]
    fn neg(self) -> Self {
        Money(-self.0)
    }
}

impl Mul<i64> for Money {
    type Output = Self;

    #[inline]
    fn mul(self, count: i64) -> Self {
        Money(self.0 * count)
    }
}

impl Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Self {
        iter.fold(Money::zero(), |acc, m| acc + m)
    }
}

impl<'a> Sum<&'a Money> for Money {
    fn sum<I: Iterator<Item = &'a Money>>(iter: I) -> Self {
        iter.fold(Money::zero(), |acc, m| acc + *m)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
