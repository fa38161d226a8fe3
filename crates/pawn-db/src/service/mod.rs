//! # Ledger Services
//!
//! Transactional operations over the ledger tables.
//!
//! ## Transaction Shape
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    One Operation = One Transaction                      │
//! │                                                                         │
//! │  pool.begin()                                                          │
//! │     │                                                                   │
//! │     ├── read rows (loan, session, payment)                             │
//! │     ├── pawn-core rules (accrue, allocate, transition, reconcile)      │
//! │     ├── guarded writes (version / status / is_reversed)                │
//! │     ├── cash movement   (cash methods only)                            │
//! │     ├── accounting entry (header + lines + post)                       │
//! │     ├── collaborators   (item, customer, audit)                        │
//! │     │                                                                   │
//! │     ├── Ok  ──► commit()                                               │
//! │     └── Err ──► transaction dropped = rollback                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every query inside an operation runs on the transaction's connection.
//! Services that need each other's steps share the `*_in_tx` helpers rather
//! than calling each other's public methods, which would open a second
//! transaction.

pub mod accounting;
pub mod cash;
pub mod loan;
pub mod payment;

use std::sync::Arc;

use pawn_core::accounting::AccountMap;
use pawn_core::loan::LoanPolicy;
use uuid::Uuid;

use crate::collaborators::{AuditEvent, Collaborators};
use crate::error::{LedgerError, LedgerResult};
use crate::pool::Database;

pub use accounting::{AccountingPoster, TrialBalance, TrialBalanceRow};
pub use cash::{CashLedger, NewMovement, OpenSession, SessionSummary};
pub use loan::{LoanLedger, RenewLoan, RenewalOutcome, SweepReport};
pub use payment::{NewPayment, PaymentService, ReversePayment};

/// Branch-level settings shared by every service.
#[derive(Debug, Clone, Default)]
pub struct LedgerSettings {
    pub branch_id: String,
    pub policy: LoanPolicy,
    pub accounts: AccountMap,
}

/// Entry point bundling the database, settings and collaborators.
///
/// ## Example
/// ```rust,ignore
/// let config = LedgerConfig::load(None)?;
/// let db = Database::new(config.db_config()).await?;
/// let ledger = Ledger::new(db, config.ledger_settings(), Collaborators::default());
///
/// let session = ledger.cash().open_session(open).await?;
/// let loan = ledger.loans().create_loan(request).await?;
/// ```
#[derive(Debug, Clone)]
pub struct Ledger {
    db: Database,
    settings: Arc<LedgerSettings>,
    collaborators: Collaborators,
}

impl Ledger {
    pub fn new(db: Database, settings: LedgerSettings, collaborators: Collaborators) -> Self {
        Ledger {
            db,
            settings: Arc::new(settings),
            collaborators,
        }
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    pub fn settings(&self) -> &LedgerSettings {
        &self.settings
    }

    pub fn loans(&self) -> LoanLedger {
        LoanLedger::new(self.db.pool().clone(), self.settings.clone(), self.collaborators.clone())
    }

    pub fn payments(&self) -> PaymentService {
        PaymentService::new(self.db.pool().clone(), self.settings.clone(), self.collaborators.clone())
    }

    pub fn cash(&self) -> CashLedger {
        CashLedger::new(self.db.pool().clone(), self.settings.clone(), self.collaborators.clone())
    }

    pub fn accounting(&self) -> AccountingPoster {
        AccountingPoster::new(self.db.pool().clone(), self.settings.clone(), self.collaborators.clone())
    }
}

// =============================================================================
// Shared helpers
// =============================================================================

/// Reference types stamped on cash movements and accounting entries.
pub mod reference {
    pub const LOAN_DISBURSEMENT: &str = "loan_disbursement";
    pub const LOAN_CANCELLATION: &str = "loan_cancellation";
    pub const LOAN_RENEWAL: &str = "loan_renewal";
    pub const LOAN_CONFISCATION: &str = "loan_confiscation";
    pub const PAYMENT: &str = "payment";
    pub const PAYMENT_REVERSAL: &str = "payment_reversal";
}

pub(crate) fn new_id() -> String {
    Uuid::new_v4().to_string()
}

pub(crate) async fn audit(collaborators: &Collaborators, event: AuditEvent) -> LedgerResult<()> {
    collaborators
        .audit
        .record(event)
        .await
        .map_err(|message| LedgerError::collaborator("audit logger", message))
}

// =============================================================================
// Test fixtures
// =============================================================================
