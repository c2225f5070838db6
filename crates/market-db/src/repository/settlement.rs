//! # Settlement Repository
//!
//! Monthly payout records for third-party stores and the sales aggregation
//! they are computed from.
//!
//! ## Period Key
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  UNIQUE (store_id, year, month)                                        │
//! │                                                                         │
//! │  PENDING / APPROVED / PROCESSING / TRANSFERRED  → period is settled    │
//! │  FAILED / CANCELLED                             → row is deleted on    │
//! │                                                   the next generate    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Utc};
use sqlx::{FromRow, SqliteConnection, SqlitePool};
use tracing::debug;

use market_core::settlement::settlement_sources_sql_list;
use market_core::{Settlement, SettlementAction, SettlementBasis, SettlementStatus};

use crate::error::DbResult;

const SETTLEMENT_SELECT: &str = r#"
    SELECT id, store_id, year, month, order_count, total_sales_cents,
           commission_bps, platform_fee_bps, commission_cents, platform_fee_cents,
           transfer_cents, status, failure_reason, transferred_at, created_at, updated_at
    FROM settlements
"#;

/// Qualifying orders of one store in one period.
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromRow)]
pub struct SalesAggregate {
    pub order_count: i64,
    pub total_cents: i64,
}

/// Repository for settlement database operations.
#[derive(Debug, Clone)]
pub struct SettlementRepository {
    pool: SqlitePool,
}

impl SettlementRepository {
    pub fn new(pool: SqlitePool) -> Self {
        SettlementRepository { pool }
    }

    pub async fn get_settlement(&self, id: &str) -> DbResult<Option<Settlement>> {
        let settlement = sqlx::query_as::<_, Settlement>(&format!("{SETTLEMENT_SELECT} WHERE id = ?1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(settlement)
    }

    /// The settlement occupying a period key, if any.
    pub async fn get_for_period(&self, store_id: &str, year: i32, month: u32) -> DbResult<Option<Settlement>> {
        let settlement = sqlx::query_as::<_, Settlement>(&format!(
            "{SETTLEMENT_SELECT} WHERE store_id = ?1 AND year = ?2 AND month = ?3"
        ))
        .bind(store_id)
        .bind(year)
        .bind(month)
        .fetch_optional(&self.pool)
        .await?;
        Ok(settlement)
    }

    /// Settlements of a store, latest period first.
    pub async fn list_for_store(&self, store_id: &str) -> DbResult<Vec<Settlement>> {
        let settlements = sqlx::query_as::<_, Settlement>(&format!(
            "{SETTLEMENT_SELECT} WHERE store_id = ?1 ORDER BY year DESC, month DESC"
        ))
        .bind(store_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(settlements)
    }

    /// All settlements of a period, optionally filtered by status.
    pub async fn list_for_period(
        &self,
        year: i32,
        month: u32,
        status: Option<SettlementStatus>,
    ) -> DbResult<Vec<Settlement>> {
        let settlements = sqlx::query_as::<_, Settlement>(&format!(
            "{SETTLEMENT_SELECT} WHERE year = ?1 AND month = ?2 AND (?3 IS NULL OR status = ?3) ORDER BY created_at"
        ))
        .bind(year)
        .bind(month)
        .bind(status)
        .fetch_all(&self.pool)
        .await?;
        Ok(settlements)
    }

    // =========================================================================
    // Transaction helpers
    // =========================================================================

    pub async fn settlement_in(conn: &mut SqliteConnection, id: &str) -> DbResult<Option<Settlement>> {
        let settlement = sqlx::query_as::<_, Settlement>(&format!("{SETTLEMENT_SELECT} WHERE id = ?1"))
            .bind(id)
            .fetch_optional(&mut *conn)
            .await?;
        Ok(settlement)
    }

    pub async fn period_in(
        conn: &mut SqliteConnection,
        store_id: &str,
        year: i32,
        month: u32,
    ) -> DbResult<Option<Settlement>> {
        let settlement = sqlx::query_as::<_, Settlement>(&format!(
            "{SETTLEMENT_SELECT} WHERE store_id = ?1 AND year = ?2 AND month = ?3"
        ))
        .bind(store_id)
        .bind(year)
        .bind(month)
        .fetch_optional(&mut *conn)
        .await?;
        Ok(settlement)
    }

    /// Frees the period key held by a FAILED or CANCELLED settlement.
    ///
    /// Returns the number of rows removed (0 or 1).
    pub async fn delete_regenerable_in(
        conn: &mut SqliteConnection,
        store_id: &str,
        year: i32,
        month: u32,
    ) -> DbResult<u64> {
        let result = sqlx::query(
            r#"
            DELETE FROM settlements
            WHERE store_id = ?1 AND year = ?2 AND month = ?3
              AND status IN ('FAILED', 'CANCELLED')
            "#,
        )
        .bind(store_id)
        .bind(year)
        .bind(month)
        .execute(&mut *conn)
        .await?;

        Ok(result.rows_affected())
    }

    /// Sums the store's qualifying orders in `[start, end)`.
    ///
    /// ## Basis
    /// - `Delivered`: DELIVERED orders dated by `delivered_at`
    /// - `Approved`: APPROVED, PREPARING, READY and DELIVERED orders dated by
    ///   `approved_at`
    pub async fn aggregate_sales_in(
        conn: &mut SqliteConnection,
        store_id: &str,
        basis: SettlementBasis,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> DbResult<SalesAggregate> {
        let sql = match basis {
            SettlementBasis::Delivered => {
                r#"
                SELECT COUNT(*) AS order_count, COALESCE(SUM(total_cents), 0) AS total_cents
                FROM orders
                WHERE store_id = ?1
                  AND status = 'DELIVERED'
                  AND delivered_at >= ?2 AND delivered_at < ?3
                "#
            }
            SettlementBasis::Approved => {
                r#"
                SELECT COUNT(*) AS order_count, COALESCE(SUM(total_cents), 0) AS total_cents
                FROM orders
                WHERE store_id = ?1
                  AND status IN ('APPROVED', 'PREPARING', 'READY', 'DELIVERED')
                  AND approved_at >= ?2 AND approved_at < ?3
                "#
            }
        };

        let aggregate = sqlx::query_as::<_, SalesAggregate>(sql)
            .bind(store_id)
            .bind(start)
            .bind(end)
            .fetch_one(&mut *conn)
            .await?;

        debug!(
            store_id = %store_id,
            basis = ?basis,
            orders = aggregate.order_count,
            total_cents = aggregate.total_cents,
            "Aggregated settlement sales"
        );
        Ok(aggregate)
    }

    pub async fn insert_in(conn: &mut SqliteConnection, settlement: &Settlement) -> DbResult<()> {
        sqlx::query(
            r#"
            INSERT INTO settlements (
                id, store_id, year, month, order_count, total_sales_cents,
                commission_bps, platform_fee_bps, commission_cents, platform_fee_cents,
                transfer_cents, status, failure_reason, transferred_at, created_at, updated_at
            ) VALUES (
                ?1, ?2, ?3, ?4, ?5, ?6,
                ?7, ?8, ?9, ?10,
                ?11, ?12, ?13, ?14, ?15, ?16
            )
            "#,
        )
        .bind(&settlement.id)
        .bind(&settlement.store_id)
        .bind(settlement.year)
        .bind(settlement.month)
        .bind(settlement.order_count)
        .bind(settlement.total_sales_cents)
        .bind(settlement.commission_bps)
        .bind(settlement.platform_fee_bps)
        .bind(settlement.commission_cents)
        .bind(settlement.platform_fee_cents)
        .bind(settlement.transfer_cents)
        .bind(settlement.status)
        .bind(&settlement.failure_reason)
        .bind(settlement.transferred_at)
        .bind(settlement.created_at)
        .bind(settlement.updated_at)
        .execute(&mut *conn)
        .await?;

        Ok(())
    }

    /// Compare-and-set status change for `action`. `true` when the row moved.
    ///
    /// `failure_reason` is recorded on Fail; `transferred_at` is stamped on
    /// MarkTransferred.
    pub async fn update_status_in(
        conn: &mut SqliteConnection,
        settlement_id: &str,
        action: SettlementAction,
        failure_reason: Option<&str>,
    ) -> DbResult<bool> {
        let now = Utc::now();
        let transferred_at = (action == SettlementAction::MarkTransferred).then_some(now);
        let failure_reason = (action == SettlementAction::Fail).then_some(failure_reason).flatten();

        let sql = format!(
            r#"
            UPDATE settlements SET
                status = ?2,
                updated_at = ?3,
                transferred_at = COALESCE(?4, transferred_at),
                failure_reason = COALESCE(?5, failure_reason)
            WHERE id = ?1 AND status IN ({})
            "#,
            settlement_sources_sql_list(action)
        );

        let result = sqlx::query(&sql)
            .bind(settlement_id)
            .bind(action.target())
            .bind(now)
            .bind(transferred_at)
            .bind(failure_reason)
            .execute(&mut *conn)
            .await?;

        Ok(result.rows_affected() == 1)
    }
}
