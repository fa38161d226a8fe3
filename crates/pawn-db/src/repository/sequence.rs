//! # Sequence Counters
//!
//! Gap-free per-period counters behind the document numbers.
//!
//! ```text
//!  sequences
//!  ┌──────────────┬───────┐
//!  │ name         │ value │
//!  ├──────────────┼───────┤
//!  │ LN-2024      │   42  │ ──► LN-2024-000042
//!  │ JE-20240309  │    3  │ ──► JE-20240309-0003
//!  └──────────────┴───────┘
//! ```
//!
//! The upsert runs on the caller's transaction, so a rolled-back operation
//! also rolls back its number and two writers can never draw the same value.

use chrono::{DateTime, Utc};
use pawn_core::numbering::NumberKind;
use sqlx::SqliteConnection;
use tracing::debug;

use crate::error::DbResult;

/// Increments and returns the counter `key`, starting at 1.
pub async fn next_value(conn: &mut SqliteConnection, key: &str) -> DbResult<i64> {
    let value: i64 = sqlx::query_scalar(
        r#"
        INSERT INTO sequences (name, value) VALUES (?1, 1)
        ON CONFLICT(name) DO UPDATE SET value = value + 1
        RETURNING value
        "#,
    )
    .bind(key)
    .fetch_one(&mut *conn)
    .await?;

    Ok(value)
}

/// Draws the next document number of `kind` for the period containing `at`.
pub async fn next_number(
    conn: &mut SqliteConnection,
    kind: NumberKind,
    at: DateTime<Utc>,
) -> DbResult<String> {
    let key = kind.sequence_key(at);
    let value = next_value(conn, &key).await?;
    let number = kind.format(at, value);
    debug!(%key, %number, "Allocated document number");
    Ok(number)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Database, DbConfig};
    use chrono::TimeZone;

    #[tokio::test]
    async fn test_numbers_are_sequential_per_period() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let mut conn = db.pool().acquire().await.unwrap();
        let march = Utc.with_ymd_and_hms(2024, 3, 9, 10, 0, 0).unwrap();
        let next_day = Utc.with_ymd_and_hms(2024, 3, 10, 10, 0, 0).unwrap();

        assert_eq!(
            next_number(&mut conn, NumberKind::Loan, march).await.unwrap(),
            "LN-2024-000001"
        );
        assert_eq!(
            next_number(&mut conn, NumberKind::Loan, next_day).await.unwrap(),
            "LN-2024-000002"
        );
        assert_eq!(
            next_number(&mut conn, NumberKind::JournalEntry, march).await.unwrap(),
            "JE-20240309-0001"
        );
        assert_eq!(
            next_number(&mut conn, NumberKind::JournalEntry, next_day).await.unwrap(),
            "JE-20240310-0001"
        );
    }

    #[tokio::test]
    async fn test_rolled_back_number_is_reused() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let at = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();

        let mut tx = db.pool().begin().await.unwrap();
        assert_eq!(next_value(&mut tx, "PY-2024").await.unwrap(), 1);
        tx.rollback().await.unwrap();

        let mut conn = db.pool().acquire().await.unwrap();
        assert_eq!(
            next_number(&mut conn, NumberKind::Payment, at).await.unwrap(),
            "PY-2024-000001"
        );
    }
}
