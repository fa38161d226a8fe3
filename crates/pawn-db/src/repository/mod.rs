//! # Repository Module
//!
//! SQL for the ledger tables.
//!
//! ## Repository Pattern
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Repository Pattern                                   │
//! │                                                                         │
//! │  Service (one transaction per operation)                               │
//! │       │                                                                 │
//! │       │  loan::get(&mut *tx, id)                                       │
//! │       │  loan::update_versioned(&mut *tx, &loan)                       │
//! │       ▼                                                                 │
//! │  repository::loan                                                      │
//! │  ├── free functions over any SQLite executor (pool or transaction)    │
//! │  └── LoanRepository { pool } for read-only callers                    │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  SQLite Database                                                       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Writes never go through a repository struct: they take the caller's
//! transaction so every ledger mutation commits or rolls back as one unit.
//! Guards that can lose a race (`version`, `status = 'open'`,
//! `is_reversed = 0`) return `bool` and leave the `Conflict` decision to the
//! service.
//!
//! ## Available Repositories
//!
//! - [`LoanRepository`] - Loans and installments
//! - [`PaymentRepository`] - Payments
//! - [`CashRepository`] - Cash sessions and movements
//! - [`AccountingRepository`] - Chart of accounts and journal entries
//! - [`sequence`] - Document number counters

pub mod accounting;
pub mod cash;
pub mod installment;
pub mod loan;
pub mod payment;
pub mod sequence;

pub use accounting::AccountingRepository;
pub use cash::CashRepository;
pub use loan::LoanRepository;
pub use payment::PaymentRepository;
