//! # Schema Migrations
//!
//! The ledger schema and default chart of accounts, embedded at compile time.
//!
//! ```text
//! migrations/sqlite/
//! ├── 001_ledger_schema.sql       tables, partial unique indexes, triggers
//! └── 002_chart_of_accounts.sql   1100 cash … 5100 cost of goods sold
//! ```
//!
//! Applied migrations are recorded in `_sqlx_migrations`; running them again
//! is a no-op. Existing files are never edited, a change gets the next
//! number.

use pawn_core::accounting::AccountMap;
use sqlx::SqlitePool;
use tracing::{info, warn};

use crate::error::DbResult;
use crate::repository::accounting;

static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("../../migrations/sqlite");

/// Applies pending migrations.
pub async fn run_migrations(pool: &SqlitePool) -> DbResult<()> {
    MIGRATOR.run(pool).await?;
    info!(migrations = MIGRATOR.migrations.len(), "Ledger schema up to date");
    Ok(())
}

/// `(embedded, applied)` migration counts.
pub async fn migration_status(pool: &SqlitePool) -> DbResult<(usize, usize)> {
    let applied: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM _sqlx_migrations WHERE success = 1")
        .fetch_one(pool)
        .await
        .unwrap_or(0);
    Ok((MIGRATOR.migrations.len(), applied as usize))
}

/// Accounts named by `accounts` that are missing from the chart or inactive.
///
/// Postings against them would fail with `NotFound`, so callers check this
/// once at startup.
pub async fn missing_accounts(pool: &SqlitePool, accounts: &AccountMap) -> DbResult<Vec<String>> {
    let wanted = [
        &accounts.cash,
        &accounts.bank,
        &accounts.loans_receivable,
        &accounts.inventory,
        &accounts.interest_income,
        &accounts.late_fee_income,
    ];

    let mut missing = Vec::new();
    for id in wanted {
        match accounting::find_account(pool, id).await? {
            Some(account) if account.is_active => {}
            _ => missing.push(id.clone()),
        }
    }
    if !missing.is_empty() {
        warn!(?missing, "Configured accounts are not usable");
    }
    Ok(missing)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Database, DbConfig};

    #[tokio::test]
    async fn test_default_chart_covers_default_map() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let missing = missing_accounts(db.pool(), &AccountMap::default()).await.unwrap();
        assert!(missing.is_empty());
    }

    #[tokio::test]
    async fn test_inactive_and_unknown_accounts_reported() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        accounting::set_account_active(db.pool(), "1400", false).await.unwrap();
        let accounts = AccountMap {
            bank: "1299".to_string(),
            ..AccountMap::default()
        };

        let missing = missing_accounts(db.pool(), &accounts).await.unwrap();
        assert_eq!(missing, vec!["1299".to_string(), "1400".to_string()]);
    }

    #[tokio::test]
    async fn test_running_twice_is_noop() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        run_migrations(db.pool()).await.unwrap();
        let (embedded, applied) = migration_status(db.pool()).await.unwrap();
        assert_eq!(embedded, applied);
    }
}
