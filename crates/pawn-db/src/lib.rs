//! # pawn-db: Storage and Services for the Pawn Ledger
//!
//! SQLite storage (sqlx) and the transactional ledger services built on the
//! pure rules in `pawn-core`.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Pawn Ledger Data Flow                            │
//! │                                                                         │
//! │  Service layer (HTTP handler, admin job, seed binary)                  │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                     pawn-db (THIS CRATE)                        │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────────┐    ┌───────────────┐    ┌──────────────┐  │   │
//! │  │   │   Services    │    │ Repositories  │    │  Migrations  │  │   │
//! │  │   │ (service/)    │    │ (repository/) │    │  (embedded)  │  │   │
//! │  │   │               │    │               │    │              │  │   │
//! │  │   │ LoanLedger    │───►│ loan          │    │ 001_ledger   │  │   │
//! │  │   │ PaymentSvc    │    │ payment, cash │    │ 002_chart    │  │   │
//! │  │   │ CashLedger    │    │ accounting    │    │              │  │   │
//! │  │   │ Accounting    │    │ sequence      │    │              │  │   │
//! │  │   └───────┬───────┘    └───────────────┘    └──────────────┘  │   │
//! │  │           │ item / customer / audit                            │   │
//! │  │           ▼                                                    │   │
//! │  │   Collaborators (traits, injected)                             │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                     SQLite Database (WAL)                       │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`pool`] - Connection pool creation and configuration
//! - [`migrations`] - Embedded schema and chart of accounts
//! - [`config`] - `ledger.toml` loading with environment overrides
//! - [`error`] - Storage errors and the service error taxonomy
//! - [`repository`] - Row-level queries, generic over the executor
//! - [`service`] - One transaction per ledger operation
//! - [`collaborators`] - Item, customer and audit seams
//!
//! ## Usage
//!
//! ```rust,ignore
//! use pawn_db::{Collaborators, Database, Ledger, LedgerConfig};
//!
//! let config = LedgerConfig::load(None)?;
//! let db = Database::new(config.db_config()).await?;
//! let ledger = Ledger::new(db, config.ledger_settings(), Collaborators::default());
//!
//! let loan = ledger.loans().create_loan(request).await?;
//! let payment = ledger.payments().create_payment(payment).await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod collaborators;
pub mod config;
pub mod error;
pub mod migrations;
pub mod pool;
pub mod repository;
pub mod service;

// =============================================================================
// Re-exports
// =============================================================================

pub use collaborators::{
    AuditEvent, AuditLogger, Collaborators, CreditDelta, CustomerService, ItemService, RecordingCollaborator,
};
pub use config::LedgerConfig;
pub use error::{DbError, LedgerError, LedgerResult};
pub use pool::{Database, DbConfig};
pub use service::{
    AccountingPoster, CashLedger, Ledger, LedgerSettings, LoanLedger, NewMovement, NewPayment, OpenSession,
    PaymentService, RenewLoan, RenewalOutcome, ReversePayment, SessionSummary, SweepReport, TrialBalance,
};

// Read-only repository handles for reporting callers
pub use repository::{AccountingRepository, CashRepository, LoanRepository, PaymentRepository};
