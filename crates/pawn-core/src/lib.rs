//! # pawn-core: Pure Ledger Rules for the Pawnshop Engine
//!
//! This crate is the **heart** of the pawn ledger. It contains the money
//! rules as pure functions with zero I/O dependencies.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Pawn Ledger Architecture                         │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │              Surrounding service layer (HTTP, UI)               │   │
//! │  │    customers, items, reports, auth  (external collaborators)   │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │ function calls                         │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │                pawn-db (transactional services)                 │   │
//! │  │    LoanLedger, PaymentService, CashLedger, AccountingPoster     │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │               ★ pawn-core (THIS CRATE) ★                        │   │
//! │  │                                                                 │   │
//! │  │   ┌──────────┐ ┌──────────┐ ┌────────────┐ ┌──────────────┐    │   │
//! │  │   │   loan   │ │ schedule │ │ allocation │ │  accounting  │    │   │
//! │  │   │ accrual  │ │ planner  │ │ waterfall  │ │  templates   │    │   │
//! │  │   └──────────┘ └──────────┘ └────────────┘ └──────────────┘    │   │
//! │  │   ┌──────────┐ ┌──────────┐ ┌────────────┐ ┌──────────────┐    │   │
//! │  │   │   cash   │ │  money   │ │ numbering  │ │    clock     │    │   │
//! │  │   └──────────┘ └──────────┘ └────────────┘ └──────────────┘    │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO DATABASE • NO NETWORK • PURE FUNCTIONS           │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`types`] - Ledger rows (Loan, Payment, CashSession, ...) and enums
//! - [`money`] - Money type with integer arithmetic (no floating point!)
//! - [`loan`] - Origination, overdue recompute, late fees, renewal
//! - [`schedule`] - Installment planner
//! - [`allocation`] - Payment waterfall
//! - [`cash`] - Register balance and reconciliation
//! - [`accounting`] - Double-entry validation and posting templates
//! - [`numbering`] - Document number formats
//! - [`clock`] - Injectable time source
//! - [`error`] - Domain error types and the [`ErrorKind`] taxonomy
//! - [`validation`] - Field rules
//!
//! ## Example Usage
//!
//! ```rust
//! use pawn_core::money::Money;
//! use pawn_core::types::Rate;
//!
//! // 3.5% monthly interest on a 1,000.00 loan
//! let principal = Money::from_cents(100_000);
//! let interest = principal.apply_rate(Rate::from_bps(350));
//! assert_eq!(interest.cents(), 3_500);
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod accounting;
pub mod allocation;
pub mod cash;
pub mod clock;
pub mod error;
pub mod loan;
pub mod money;
pub mod numbering;
pub mod schedule;
pub mod types;
pub mod validation;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{CoreError, CoreResult, ErrorKind, ValidationError};
pub use money::Money;
pub use types::*;
