//! # External Collaborators
//!
//! Services the ledger calls but does not own: the item catalog, customer
//! credit tracking and the audit log.
//!
//! ## Call Order
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  BEGIN                                                                  │
//! │    ledger writes (loan, payment, cash, accounting)                     │
//! │    ItemService / CustomerService / AuditLogger                         │
//! │         │                                                               │
//! │         ├── Ok  ──► COMMIT                                             │
//! │         └── Err ──► ROLLBACK, LedgerError::Collaborator                │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Collaborators run before the commit, so a failing collaborator leaves no
//! ledger state behind. Implementations must not call back into the ledger
//! from inside these methods.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use pawn_core::{Clock, ItemStatus, Money, SystemClock};
use serde::{Deserialize, Serialize};
use tracing::info;

/// Error returned by a collaborator.
pub type CollaboratorResult = Result<(), String>;

// =============================================================================
// Item Service
// =============================================================================

/// Tracks the custody status of pawned items.
#[async_trait]
pub trait ItemService: Send + Sync {
    async fn update_status(&self, item_id: &str, status: ItemStatus) -> CollaboratorResult;
}

/// Item service that accepts every update.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopItemService;

#[async_trait]
impl ItemService for NoopItemService {
    async fn update_status(&self, _item_id: &str, _status: ItemStatus) -> CollaboratorResult {
        Ok(())
    }
}

// =============================================================================
// Customer Service
// =============================================================================

/// Change to a customer's credit record caused by a ledger event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreditDelta {
    /// Change in outstanding debt (negative when the customer pays down).
    pub outstanding: Money,
    pub loans_paid_off: i64,
    pub loans_defaulted: i64,
}

impl CreditDelta {
    pub fn opened(principal: Money) -> Self {
        CreditDelta {
            outstanding: principal,
            loans_paid_off: 0,
            loans_defaulted: 0,
        }
    }

    pub fn paid_off(amount: Money) -> Self {
        CreditDelta {
            outstanding: -amount,
            loans_paid_off: 1,
            loans_defaulted: 0,
        }
    }

    pub fn defaulted(written_off: Money) -> Self {
        CreditDelta {
            outstanding: -written_off,
            loans_paid_off: 0,
            loans_defaulted: 1,
        }
    }
}

/// Customer credit bookkeeping.
#[async_trait]
pub trait CustomerService: Send + Sync {
    async fn update_credit_info(&self, customer_id: &str, delta: CreditDelta) -> CollaboratorResult;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoopCustomerService;

#[async_trait]
impl CustomerService for NoopCustomerService {
    async fn update_credit_info(&self, _customer_id: &str, _delta: CreditDelta) -> CollaboratorResult {
        Ok(())
    }
}

// =============================================================================
// Audit Logger
// =============================================================================

/// One audited ledger mutation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEvent {
    pub action: String,
    pub entity_type: String,
    pub entity_id: String,
    pub user_id: String,
    pub before: Option<serde_json::Value>,
    pub after: Option<serde_json::Value>,
}

impl AuditEvent {
    pub fn new(
        action: impl Into<String>,
        entity_type: impl Into<String>,
        entity_id: impl Into<String>,
        user_id: impl Into<String>,
    ) -> Self {
        AuditEvent {
            action: action.into(),
            entity_type: entity_type.into(),
            entity_id: entity_id.into(),
            user_id: user_id.into(),
            before: None,
            after: None,
        }
    }

    /// Attaches before/after snapshots. Values that fail to serialize are
    /// recorded as `null`.
    pub fn with_snapshots<B: Serialize, A: Serialize>(mut self, before: Option<&B>, after: Option<&A>) -> Self {
        self.before = before.map(snapshot);
        self.after = after.map(snapshot);
        self
    }
}

fn snapshot<T: Serialize>(value: &T) -> serde_json::Value {
    serde_json::to_value(value).unwrap_or(serde_json::Value::Null)
}

/// Sink for audit events.
#[async_trait]
pub trait AuditLogger: Send + Sync {
    async fn record(&self, event: AuditEvent) -> CollaboratorResult;
}

/// Writes audit events to the `audit` tracing target.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingAuditLogger;

#[async_trait]
impl AuditLogger for TracingAuditLogger {
    async fn record(&self, event: AuditEvent) -> CollaboratorResult {
        info!(
            target: "audit",
            action = %event.action,
            entity_type = %event.entity_type,
            entity_id = %event.entity_id,
            user_id = %event.user_id,
            after = ?event.after,
            "ledger mutation"
        );
        Ok(())
    }
}

// =============================================================================
// Bundle
// =============================================================================

/// Everything a ledger service needs from outside the database.
#[derive(Clone)]
pub struct Collaborators {
    pub items: Arc<dyn ItemService>,
    pub customers: Arc<dyn CustomerService>,
    pub audit: Arc<dyn AuditLogger>,
    pub clock: Arc<dyn Clock>,
}

impl Collaborators {
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_items(mut self, items: Arc<dyn ItemService>) -> Self {
        self.items = items;
        self
    }

    pub fn with_customers(mut self, customers: Arc<dyn CustomerService>) -> Self {
        self.customers = customers;
        self
    }

    pub fn with_audit(mut self, audit: Arc<dyn AuditLogger>) -> Self {
        self.audit = audit;
        self
    }
}

impl Default for Collaborators {
    fn default() -> Self {
        Collaborators {
            items: Arc::new(NoopItemService),
            customers: Arc::new(NoopCustomerService),
            audit: Arc::new(TracingAuditLogger),
            clock: Arc::new(SystemClock),
        }
    }
}

impl std::fmt::Debug for Collaborators {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Collaborators").finish_non_exhaustive()
    }
}

// =============================================================================
// Recording
// =============================================================================

/// Collaborator that remembers every call, optionally failing them all.
///
/// Used by the service tests and handy for dry runs.
#[derive(Debug, Default)]
pub struct RecordingCollaborator {
    pub item_updates: Mutex<Vec<(String, ItemStatus)>>,
    pub credit_updates: Mutex<Vec<(String, CreditDelta)>>,
    pub audit_events: Mutex<Vec<AuditEvent>>,
    fail_with: Option<String>,
}

impl RecordingCollaborator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every call returns `Err(message)` after being recorded.
    pub fn failing(message: impl Into<String>) -> Self {
        RecordingCollaborator {
            fail_with: Some(message.into()),
            ..Self::default()
        }
    }

    fn outcome(&self) -> CollaboratorResult {
        match &self.fail_with {
            Some(message) => Err(message.clone()),
            None => Ok(()),
        }
    }

    pub fn items(&self) -> Vec<(String, ItemStatus)> {
        self.item_updates.lock().unwrap_or_else(|p| p.into_inner()).clone()
    }

    pub fn credits(&self) -> Vec<(String, CreditDelta)> {
        self.credit_updates.lock().unwrap_or_else(|p| p.into_inner()).clone()
    }

    pub fn audits(&self) -> Vec<AuditEvent> {
        self.audit_events.lock().unwrap_or_else(|p| p.into_inner()).clone()
    }
}

#[async_trait]
impl ItemService for RecordingCollaborator {
    async fn update_status(&self, item_id: &str, status: ItemStatus) -> CollaboratorResult {
        self.item_updates
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .push((item_id.to_string(), status));
        self.outcome()
    }
}

#[async_trait]
impl CustomerService for RecordingCollaborator {
    async fn update_credit_info(&self, customer_id: &str, delta: CreditDelta) -> CollaboratorResult {
        self.credit_updates
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .push((customer_id.to_string(), delta));
        self.outcome()
    }
}

#[async_trait]
impl AuditLogger for RecordingCollaborator {
    async fn record(&self, event: AuditEvent) -> CollaboratorResult {
        self.audit_events
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .push(event);
        self.outcome()
    }
}
