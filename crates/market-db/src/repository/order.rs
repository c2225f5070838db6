//! # Order Repository
//!
//! Persistence for orders and their line snapshots.
//!
//! ## Order Lifecycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Order Lifecycle                                   │
//! │                                                                         │
//! │  1. CREATE (checkout transaction)                                      │
//! │     └── next_order_number() → ORD-20261018-0007                        │
//! │     └── insert_order_in()   → Order + OrderItem snapshots              │
//! │                                                                         │
//! │  2. TRANSITION (lifecycle transaction)                                 │
//! │     └── update_status_in()                                             │
//! │         UPDATE orders SET status = :target ...                         │
//! │          WHERE id = :id AND status IN (:allowed sources)               │
//! │         0 rows → someone else moved it first, or the move is illegal   │
//! │                                                                         │
//! │  3. READ                                                               │
//! │     └── get_order() / get_order_items() / list_for_store()             │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, NaiveDate, Utc};
use sqlx::{SqliteConnection, SqlitePool};
use tracing::debug;

use market_core::lifecycle::sources_sql_list;
use market_core::{Order, OrderAction, OrderItem, OrderStatus};

use crate::error::DbResult;

const ORDER_SELECT: &str = r#"
    SELECT id, student_id, school_id, store_id, order_number, status,
           payment_mode, payment_method, installments, spread_across_period,
           total_cents, notes, rejection_reason, cancellation_reason,
           approved_at, delivered_at, created_at, updated_at
    FROM orders
"#;

const ITEM_SELECT: &str = r#"
    SELECT id, order_id, store_item_id, item_name_snapshot, unit_price_cents,
           quantity, subtotal_cents, created_at
    FROM order_items
"#;

/// Column changes that ride along with a status change.
#[derive(Debug, Clone, Default)]
pub struct StatusChange<'a> {
    pub reason: Option<&'a str>,
    pub approved_at: Option<DateTime<Utc>>,
    pub delivered_at: Option<DateTime<Utc>>,
}

/// Repository for order database operations.
#[derive(Debug, Clone)]
pub struct OrderRepository {
    pool: SqlitePool,
}

impl OrderRepository {
    pub fn new(pool: SqlitePool) -> Self {
        OrderRepository { pool }
    }

    /// Gets an order by ID.
    pub async fn get_order(&self, id: &str) -> DbResult<Option<Order>> {
        let order = sqlx::query_as::<_, Order>(&format!("{ORDER_SELECT} WHERE id = ?1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(order)
    }

    pub async fn get_by_number(&self, order_number: &str) -> DbResult<Option<Order>> {
        let order = sqlx::query_as::<_, Order>(&format!("{ORDER_SELECT} WHERE order_number = ?1"))
            .bind(order_number)
            .fetch_optional(&self.pool)
            .await?;
        Ok(order)
    }

    /// Line snapshots of an order, in insertion order.
    pub async fn get_order_items(&self, order_id: &str) -> DbResult<Vec<OrderItem>> {
        let items = sqlx::query_as::<_, OrderItem>(&format!(
            "{ITEM_SELECT} WHERE order_id = ?1 ORDER BY created_at, rowid"
        ))
        .bind(order_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(items)
    }

    /// Orders of a store, newest first, optionally filtered by status.
    pub async fn list_for_store(
        &self,
        store_id: &str,
        status: Option<OrderStatus>,
        limit: u32,
    ) -> DbResult<Vec<Order>> {
        let orders = sqlx::query_as::<_, Order>(&format!(
            r#"{ORDER_SELECT}
            WHERE store_id = ?1 AND (?2 IS NULL OR status = ?2)
            ORDER BY created_at DESC
            LIMIT ?3"#
        ))
        .bind(store_id)
        .bind(status)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(orders)
    }

    pub async fn list_for_student(&self, student_id: &str, limit: u32) -> DbResult<Vec<Order>> {
        let orders = sqlx::query_as::<_, Order>(&format!(
            "{ORDER_SELECT} WHERE student_id = ?1 ORDER BY created_at DESC LIMIT ?2"
        ))
        .bind(student_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(orders)
    }

    // =========================================================================
    // Transaction helpers
    // =========================================================================

    /// Order lookup inside a transaction.
    pub async fn order_in(conn: &mut SqliteConnection, id: &str) -> DbResult<Option<Order>> {
        let order = sqlx::query_as::<_, Order>(&format!("{ORDER_SELECT} WHERE id = ?1"))
            .bind(id)
            .fetch_optional(&mut *conn)
            .await?;
        Ok(order)
    }

    pub async fn order_items_in(conn: &mut SqliteConnection, order_id: &str) -> DbResult<Vec<OrderItem>> {
        let items = sqlx::query_as::<_, OrderItem>(&format!(
            "{ITEM_SELECT} WHERE order_id = ?1 ORDER BY created_at, rowid"
        ))
        .bind(order_id)
        .fetch_all(&mut *conn)
        .await?;
        Ok(items)
    }

    /// Next order number for `day`.
    ///
    /// Must run inside a transaction that already holds the write lock, so
    /// two checkouts cannot read the same sequence.
    pub async fn next_order_number(conn: &mut SqliteConnection, day: NaiveDate) -> DbResult<String> {
        let prefix = order_number_prefix(day);

        let last: i64 = sqlx::query_scalar(
            r#"
            SELECT COALESCE(MAX(CAST(substr(order_number, ?2) AS INTEGER)), 0)
            FROM orders
            WHERE order_number LIKE ?1 || '%'
            "#,
        )
        .bind(&prefix)
        .bind(prefix.len() as i64 + 1)
        .fetch_one(&mut *conn)
        .await?;

        Ok(format_order_number(day, last + 1))
    }

    /// Inserts an order with its line snapshots.
    pub async fn insert_order_in(
        conn: &mut SqliteConnection,
        order: &Order,
        items: &[OrderItem],
    ) -> DbResult<()> {
        debug!(id = %order.id, order_number = %order.order_number, "Inserting order");

        sqlx::query(
            r#"
            INSERT INTO orders (
                id, student_id, school_id, store_id, order_number, status,
                payment_mode, payment_method, installments, spread_across_period,
                total_cents, notes, rejection_reason, cancellation_reason,
                approved_at, delivered_at, created_at, updated_at
            ) VALUES (
                ?1, ?2, ?3, ?4, ?5, ?6,
                ?7, ?8, ?9, ?10,
                ?11, ?12, ?13, ?14,
                ?15, ?16, ?17, ?18
            )
            "#,
        )
        .bind(&order.id)
        .bind(&order.student_id)
        .bind(&order.school_id)
        .bind(&order.store_id)
        .bind(&order.order_number)
        .bind(order.status)
        .bind(order.payment_mode)
        .bind(order.payment_method)
        .bind(order.installments)
        .bind(order.spread_across_period)
        .bind(order.total_cents)
        .bind(&order.notes)
        .bind(&order.rejection_reason)
        .bind(&order.cancellation_reason)
        .bind(order.approved_at)
        .bind(order.delivered_at)
        .bind(order.created_at)
        .bind(order.updated_at)
        .execute(&mut *conn)
        .await?;

        for item in items {
            sqlx::query(
                r#"
                INSERT INTO order_items (
                    id, order_id, store_item_id, item_name_snapshot,
                    unit_price_cents, quantity, subtotal_cents, created_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                "#,
            )
            .bind(&item.id)
            .bind(&item.order_id)
            .bind(&item.store_item_id)
            .bind(&item.item_name_snapshot)
            .bind(item.unit_price_cents)
            .bind(item.quantity)
            .bind(item.subtotal_cents)
            .bind(item.created_at)
            .execute(&mut *conn)
            .await?;
        }

        Ok(())
    }

    /// Compare-and-set status change for `action`.
    ///
    /// Only matches while the order is in one of the action's source
    /// statuses. Returns `true` when the row moved.
    pub async fn update_status_in(
        conn: &mut SqliteConnection,
        order_id: &str,
        action: OrderAction,
        change: StatusChange<'_>,
    ) -> DbResult<bool> {
        let rejection_reason = (action == OrderAction::Reject).then_some(change.reason).flatten();
        let cancellation_reason = (action == OrderAction::Cancel).then_some(change.reason).flatten();

        let sql = format!(
            r#"
            UPDATE orders SET
                status = ?2,
                updated_at = ?3,
                approved_at = COALESCE(?4, approved_at),
                delivered_at = COALESCE(?5, delivered_at),
                rejection_reason = COALESCE(?6, rejection_reason),
                cancellation_reason = COALESCE(?7, cancellation_reason)
            WHERE id = ?1 AND status IN ({})
            "#,
            sources_sql_list(action)
        );

        let result = sqlx::query(&sql)
            .bind(order_id)
            .bind(action.target())
            .bind(Utc::now())
            .bind(change.approved_at)
            .bind(change.delivered_at)
            .bind(rejection_reason)
            .bind(cancellation_reason)
            .execute(&mut *conn)
            .await?;

        debug!(
            order_id = %order_id,
            action = %action,
            moved = result.rows_affected() == 1,
            "Order status compare-and-set"
        );
        Ok(result.rows_affected() == 1)
    }
}

fn order_number_prefix(day: NaiveDate) -> String {
    format!("ORD-{}-", day.format("%Y%m%d"))
}

/// Formats an order number: `ORD-YYYYMMDD-NNNN`.
///
/// ## Example
/// `ORD-20261018-0007`
pub fn format_order_number(day: NaiveDate, sequence: i64) -> String {
    format!("{}{:04}", order_number_prefix(day), sequence)
}
