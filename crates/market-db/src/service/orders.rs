//! # Order Lifecycle Service
//!
//! Applies [`OrderAction`]s to stored orders.
//!
//! ## Transition Transaction
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  BEGIN                                                                  │
//! │  1. UPDATE orders SET status = target ...                              │
//! │      WHERE id = ? AND status IN (sources)     ← compare-and-set        │
//! │     └── 0 rows → re-read: missing → OrderNotFound                      │
//! │                           present → InvalidTransition{current, action} │
//! │  2. Side effects                                                       │
//! │     └── deliver: delivered_at month already settled → AlreadySettled   │
//! │     └── reject / cancel: stock back for every line                     │
//! │     └── outbox events (approved, rejected, canceled, delivered,        │
//! │         invoice lines voided for deferred orders)                      │
//! │  COMMIT                                                                 │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Datelike, Utc};
use sqlx::{SqliteConnection, SqlitePool};
use tracing::{info, warn};

use market_core::validation::{validate_delivered_at, validate_reason};
use market_core::{CoreError, DomainEvent, Order, OrderAction, OrderItem, OrderStatus, SettlementBasis};

use crate::error::{DbError, ServiceResult};
use crate::pool::Database;
use crate::repository::catalog::CatalogRepository;
use crate::repository::order::{OrderRepository, StatusChange};
use crate::repository::outbox::OutboxRepository;
use crate::repository::settlement::SettlementRepository;

/// Drives orders through their lifecycle.
#[derive(Debug, Clone)]
pub struct OrderService {
    pool: SqlitePool,
    orders: OrderRepository,
}

impl OrderService {
    pub fn new(db: &Database) -> Self {
        OrderService {
            pool: db.pool().clone(),
            orders: db.orders(),
        }
    }

    // =========================================================================
    // Reads
    // =========================================================================

    pub async fn get_order(&self, order_id: &str) -> ServiceResult<Order> {
        self.orders
            .get_order(order_id)
            .await?
            .ok_or_else(|| CoreError::OrderNotFound(order_id.to_string()).into())
    }

    pub async fn get_order_by_number(&self, order_number: &str) -> ServiceResult<Order> {
        self.orders
            .get_by_number(order_number)
            .await?
            .ok_or_else(|| CoreError::OrderNotFound(order_number.to_string()).into())
    }

    pub async fn get_order_items(&self, order_id: &str) -> ServiceResult<Vec<OrderItem>> {
        Ok(self.orders.get_order_items(order_id).await?)
    }

    pub async fn list_orders_for_store(
        &self,
        store_id: &str,
        status: Option<OrderStatus>,
        limit: u32,
    ) -> ServiceResult<Vec<Order>> {
        Ok(self.orders.list_for_store(store_id, status, limit).await?)
    }

    /// A student's order history, newest first.
    pub async fn list_orders_for_student(&self, student_id: &str, limit: u32) -> ServiceResult<Vec<Order>> {
        Ok(self.orders.list_for_student(student_id, limit).await?)
    }

    // =========================================================================
    // Transitions
    // =========================================================================

    /// PIX/card payment confirmed by the gateway.
    pub async fn confirm_payment(&self, order_id: &str) -> ServiceResult<Order> {
        self.apply(order_id, OrderAction::ConfirmPayment, StatusChange::default())
            .await
    }

    pub async fn approve(&self, order_id: &str) -> ServiceResult<Order> {
        let change = StatusChange {
            approved_at: Some(Utc::now()),
            ..StatusChange::default()
        };
        self.apply(order_id, OrderAction::Approve, change).await
    }

    /// Rejects an order before approval and returns its stock.
    pub async fn reject(&self, order_id: &str, reason: &str) -> ServiceResult<Order> {
        let reason = validate_reason(reason)?;
        let change = StatusChange {
            reason: Some(&reason),
            ..StatusChange::default()
        };
        self.apply(order_id, OrderAction::Reject, change).await
    }

    pub async fn start_preparing(&self, order_id: &str) -> ServiceResult<Order> {
        self.apply(order_id, OrderAction::StartPreparing, StatusChange::default())
            .await
    }

    pub async fn mark_ready(&self, order_id: &str) -> ServiceResult<Order> {
        self.apply(order_id, OrderAction::MarkReady, StatusChange::default())
            .await
    }

    /// Cancels an approved order and returns its stock.
    pub async fn cancel(&self, order_id: &str, reason: &str) -> ServiceResult<Order> {
        let reason = validate_reason(reason)?;
        let change = StatusChange {
            reason: Some(&reason),
            ..StatusChange::default()
        };
        self.apply(order_id, OrderAction::Cancel, change).await
    }

    /// Hands the order to the buyer.
    ///
    /// `delivered_at` defaults to now and must lie between the order's
    /// creation and now. For stores settled on delivery it must not fall in
    /// a month that already has a live settlement (`AlreadySettled`).
    pub async fn deliver(&self, order_id: &str, delivered_at: Option<DateTime<Utc>>) -> ServiceResult<Order> {
        let now = Utc::now();
        let delivered_at = delivered_at.unwrap_or(now);

        // The status check is advisory; the compare-and-set in apply decides.
        // created_at never changes, so the timestamp check is final.
        let order = self.get_order(order_id).await?;
        if !OrderAction::Deliver.is_allowed_from(order.status) {
            warn!(
                order_id = %order_id,
                current = %order.status,
                attempted = %OrderAction::Deliver,
                "Rejected order transition"
            );
            return Err(CoreError::InvalidTransition {
                order_id: order_id.to_string(),
                current: order.status,
                attempted: OrderAction::Deliver,
            }
            .into());
        }
        validate_delivered_at(order.created_at, delivered_at, now)?;

        let change = StatusChange {
            delivered_at: Some(delivered_at),
            ..StatusChange::default()
        };
        self.apply(order_id, OrderAction::Deliver, change).await
    }

    async fn apply(&self, order_id: &str, action: OrderAction, change: StatusChange<'_>) -> ServiceResult<Order> {
        let reason = change.reason.map(str::to_string);
        let mut tx = self.pool.begin().await?;

        let moved = OrderRepository::update_status_in(&mut tx, order_id, action, change).await?;
        if !moved {
            let current = OrderRepository::order_in(&mut tx, order_id)
                .await?
                .ok_or_else(|| CoreError::OrderNotFound(order_id.to_string()))?;

            warn!(
                order_id = %order_id,
                current = %current.status,
                attempted = %action,
                "Rejected order transition"
            );
            return Err(CoreError::InvalidTransition {
                order_id: order_id.to_string(),
                current: current.status,
                attempted: action,
            }
            .into());
        }

        let order = OrderRepository::order_in(&mut tx, order_id)
            .await?
            .ok_or_else(|| CoreError::OrderNotFound(order_id.to_string()))?;

        if action == OrderAction::Deliver {
            ensure_period_open(&mut tx, &order).await?;
        }

        if action.reverses_sale() {
            for item in OrderRepository::order_items_in(&mut tx, order_id).await? {
                CatalogRepository::increment_stock_in(&mut tx, &item.store_item_id, item.quantity).await?;
            }
        }

        for event in events_for(&order, action, reason) {
            OutboxRepository::append(&mut tx, &event).await?;
        }

        tx.commit().await.map_err(DbError::from)?;

        info!(
            order_id = %order.id,
            order_number = %order.order_number,
            action = %action,
            status = %order.status,
            "Order transitioned"
        );
        Ok(order)
    }
}

/// Refuses a delivery that would land in an already-settled month.
///
/// Runs after the status write, so the check and a concurrent settlement
/// generation are serialized by the write lock.
async fn ensure_period_open(conn: &mut SqliteConnection, order: &Order) -> ServiceResult<()> {
    let Some(delivered_at) = order.delivered_at else {
        return Ok(());
    };
    let store = CatalogRepository::store_in(conn, &order.store_id)
        .await?
        .ok_or_else(|| CoreError::StoreNotFound(order.store_id.clone()))?;
    if !store.is_third_party() || store.settlement_basis != SettlementBasis::Delivered {
        return Ok(());
    }

    let (year, month) = (delivered_at.year(), delivered_at.month());
    match SettlementRepository::period_in(conn, &store.id, year, month).await? {
        Some(settlement) if !settlement.status.allows_regeneration() => {
            warn!(
                order_id = %order.id,
                store_id = %store.id,
                year,
                month,
                "Delivery falls in a settled period"
            );
            Err(CoreError::AlreadySettled {
                store_id: store.id,
                year,
                month,
            }
            .into())
        }
        _ => Ok(()),
    }
}

/// Events raised by a successful transition.
fn events_for(order: &Order, action: OrderAction, reason: Option<String>) -> Vec<DomainEvent> {
    let order_id = order.id.clone();
    let reason = reason.unwrap_or_default();

    let mut events = match action {
        OrderAction::Approve => vec![DomainEvent::OrderApproved { order_id: order_id.clone() }],
        OrderAction::Reject => vec![DomainEvent::OrderRejected {
            order_id: order_id.clone(),
            reason,
        }],
        OrderAction::Cancel => vec![DomainEvent::OrderCanceled {
            order_id: order_id.clone(),
            reason,
        }],
        OrderAction::Deliver => vec![DomainEvent::OrderDelivered {
            order_id: order_id.clone(),
            delivered_at: order.delivered_at.unwrap_or(order.updated_at),
        }],
        OrderAction::ConfirmPayment | OrderAction::StartPreparing | OrderAction::MarkReady => Vec::new(),
    };

    if action.reverses_sale() && order.is_deferred() {
        events.push(DomainEvent::InvoiceLinesVoided { order_id });
    }
    events
}
