//! # Event Outbox Repository
//!
//! Domain events are written here in the same transaction as the change that
//! raised them, then delivered by [`crate::service::outbox::OutboxDispatcher`].
//!
//! ## The Outbox Pattern
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Outbox Pattern Implementation                        │
//! │                                                                         │
//! │  CHECKOUT / LIFECYCLE / SETTLEMENT                                     │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                   SINGLE TRANSACTION                            │   │
//! │  │                                                                 │   │
//! │  │  1. UPDATE store_items / INSERT orders / UPDATE settlements    │   │
//! │  │                                                                 │   │
//! │  │  2. INSERT INTO event_outbox (event_type, aggregate_id,        │   │
//! │  │                               payload)                         │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  COMMIT ← a rolled-back checkout never bills or notifies anyone        │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │            DISPATCHER (settle binary / service loop)            │   │
//! │  │                                                                 │   │
//! │  │  1. SELECT ... WHERE dispatched_at IS NULL ORDER BY created_at │   │
//! │  │  2. For each entry: hand the event to the sink                 │   │
//! │  │     ok   → dispatched_at = now                                 │   │
//! │  │     err  → attempts += 1, last_error = ?                       │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{Duration, Utc};
use sqlx::{SqliteConnection, SqlitePool};
use tracing::debug;
use uuid::Uuid;

use market_core::{DomainEvent, OutboxEntry};

use crate::error::DbResult;

const ENTRY_SELECT: &str = r#"
    SELECT id, event_type, aggregate_id, payload, attempts, last_error,
           created_at, attempted_at, dispatched_at
    FROM event_outbox
"#;

/// Repository for event outbox operations.
#[derive(Debug, Clone)]
pub struct OutboxRepository {
    pool: SqlitePool,
}

impl OutboxRepository {
    pub fn new(pool: SqlitePool) -> Self {
        OutboxRepository { pool }
    }

    /// Queues an event on the caller's transaction.
    ///
    /// ## Example
    /// ```rust,ignore
    /// let mut tx = pool.begin().await?;
    /// // ... state change ...
    /// OutboxRepository::append(&mut tx, &DomainEvent::OrderApproved { order_id }).await?;
    /// tx.commit().await?;
    /// ```
    pub async fn append(conn: &mut SqliteConnection, event: &DomainEvent) -> DbResult<OutboxEntry> {
        let entry = OutboxEntry {
            id: Uuid::new_v4().to_string(),
            event_type: event.event_type().to_string(),
            aggregate_id: event.aggregate_id().to_string(),
            payload: serde_json::to_string(event)?,
            attempts: 0,
            last_error: None,
            created_at: Utc::now(),
            attempted_at: None,
            dispatched_at: None,
        };

        debug!(
            event_type = %entry.event_type,
            aggregate_id = %entry.aggregate_id,
            "Queuing event"
        );

        sqlx::query(
            r#"
            INSERT INTO event_outbox (
                id, event_type, aggregate_id, payload,
                attempts, last_error, created_at, attempted_at, dispatched_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            "#,
        )
        .bind(&entry.id)
        .bind(&entry.event_type)
        .bind(&entry.aggregate_id)
        .bind(&entry.payload)
        .bind(entry.attempts)
        .bind(&entry.last_error)
        .bind(entry.created_at)
        .bind(entry.attempted_at)
        .bind(entry.dispatched_at)
        .execute(&mut *conn)
        .await?;

        Ok(entry)
    }

    /// Entries never attempted, oldest first.
    ///
    /// Failed entries are excluded so a batch of refusals cannot starve the
    /// events queued behind it.
    pub async fn get_pending(&self, limit: u32) -> DbResult<Vec<OutboxEntry>> {
        let entries = sqlx::query_as::<_, OutboxEntry>(&format!(
            "{ENTRY_SELECT} WHERE dispatched_at IS NULL AND attempts = 0 \
             ORDER BY created_at ASC, id ASC LIMIT ?1"
        ))
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(entries)
    }

    /// Parked entries whose delivery failed, oldest first.
    pub async fn list_failed(&self, limit: u32) -> DbResult<Vec<OutboxEntry>> {
        let entries = sqlx::query_as::<_, OutboxEntry>(&format!(
            "{ENTRY_SELECT} WHERE dispatched_at IS NULL AND attempts > 0 \
             ORDER BY created_at ASC, id ASC LIMIT ?1"
        ))
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(entries)
    }

    /// Every entry raised for one order or settlement, oldest first.
    pub async fn list_for_aggregate(&self, aggregate_id: &str) -> DbResult<Vec<OutboxEntry>> {
        let entries = sqlx::query_as::<_, OutboxEntry>(&format!(
            "{ENTRY_SELECT} WHERE aggregate_id = ?1 ORDER BY created_at ASC, id ASC"
        ))
        .bind(aggregate_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(entries)
    }

    /// Decodes the stored payload back into the event.
    pub fn decode(entry: &OutboxEntry) -> DbResult<DomainEvent> {
        Ok(serde_json::from_str(&entry.payload)?)
    }

    pub async fn mark_dispatched(&self, id: &str) -> DbResult<()> {
        sqlx::query(
            r#"
            UPDATE event_outbox SET
                dispatched_at = ?2,
                attempted_at = ?2
            WHERE id = ?1
            "#,
        )
        .bind(id)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Records a delivery failure and parks the entry.
    pub async fn mark_failed(&self, id: &str, error: &str) -> DbResult<()> {
        sqlx::query(
            r#"
            UPDATE event_outbox SET
                attempts = attempts + 1,
                last_error = ?2,
                attempted_at = ?3
            WHERE id = ?1
            "#,
        )
        .bind(id)
        .bind(error)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Puts a parked entry back in the pending queue.
    ///
    /// `attempts` restarts at zero; `last_error` is kept until the next
    /// attempt overwrites it. Returns `false` when the entry is unknown,
    /// already dispatched, or not failed.
    pub async fn requeue(&self, id: &str) -> DbResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE event_outbox SET attempts = 0
            WHERE id = ?1 AND dispatched_at IS NULL AND attempts > 0
            "#,
        )
        .bind(id)
        .execute(&self.pool)
        .await?;

        let requeued = result.rows_affected() == 1;
        if requeued {
            debug!(entry_id = %id, "Requeued outbox entry");
        }
        Ok(requeued)
    }

    pub async fn count_pending(&self) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM event_outbox WHERE dispatched_at IS NULL AND attempts = 0",
        )
        .fetch_one(&self.pool)
        .await?;

        Ok(count)
    }

    pub async fn count_failed(&self) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM event_outbox WHERE dispatched_at IS NULL AND attempts > 0",
        )
        .fetch_one(&self.pool)
        .await?;

        Ok(count)
    }

    /// Deletes entries dispatched more than `days_old` days ago.
    ///
    /// ## Returns
    /// Number of deleted entries.
    pub async fn cleanup_dispatched(&self, days_old: u32) -> DbResult<u64> {
        let cutoff = Utc::now() - Duration::days(i64::from(days_old));

        let result = sqlx::query(
            r#"
            DELETE FROM event_outbox
            WHERE dispatched_at IS NOT NULL
              AND dispatched_at < ?1
            "#,
        )
        .bind(cutoff)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Database, DbConfig};

    async fn queue(db: &Database, event: DomainEvent) -> OutboxEntry {
        let mut conn = db.pool().acquire().await.unwrap();
        OutboxRepository::append(&mut conn, &event).await.unwrap()
    }

    #[tokio::test]
    async fn test_append_and_dispatch() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let repo = db.outbox();

        let entry = queue(
            &db,
            DomainEvent::OrderApproved {
                order_id: "order-1".to_string(),
            },
        )
        .await;
        assert_eq!(entry.event_type, "ORDER_APPROVED");
        assert_eq!(entry.aggregate_id, "order-1");
        assert_eq!(repo.count_pending().await.unwrap(), 1);

        let pending = repo.get_pending(10).await.unwrap();
        assert_eq!(
            OutboxRepository::decode(&pending[0]).unwrap(),
            DomainEvent::OrderApproved {
                order_id: "order-1".to_string()
            }
        );

        repo.mark_failed(&entry.id, "billing unavailable").await.unwrap();
        assert!(repo.get_pending(10).await.unwrap().is_empty());
        assert_eq!(repo.count_pending().await.unwrap(), 0);
        assert_eq!(repo.count_failed().await.unwrap(), 1);

        let failed = repo.list_failed(10).await.unwrap();
        assert_eq!(failed[0].attempts, 1);
        assert_eq!(failed[0].last_error.as_deref(), Some("billing unavailable"));

        assert!(repo.requeue(&entry.id).await.unwrap());
        assert_eq!(repo.count_pending().await.unwrap(), 1);
        assert_eq!(repo.count_failed().await.unwrap(), 0);

        repo.mark_dispatched(&entry.id).await.unwrap();
        assert_eq!(repo.count_pending().await.unwrap(), 0);
        // Dispatched entries cannot be requeued
        assert!(!repo.requeue(&entry.id).await.unwrap());
        assert!(!repo.requeue("missing").await.unwrap());

        // Freshly dispatched entries are kept
        assert_eq!(repo.cleanup_dispatched(7).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_list_for_aggregate_keeps_order() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();

        queue(
            &db,
            DomainEvent::OrderApproved {
                order_id: "order-1".to_string(),
            },
        )
        .await;
        queue(
            &db,
            DomainEvent::OrderApproved {
                order_id: "order-2".to_string(),
            },
        )
        .await;
        queue(
            &db,
            DomainEvent::InvoiceLinesVoided {
                order_id: "order-1".to_string(),
            },
        )
        .await;

        let entries = db.outbox().list_for_aggregate("order-1").await.unwrap();
        let types: Vec<_> = entries.iter().map(|e| e.event_type.as_str()).collect();
        assert_eq!(types, vec!["ORDER_APPROVED", "INVOICE_LINES_VOIDED"]);
    }
}
