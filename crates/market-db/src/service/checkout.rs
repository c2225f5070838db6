//! # Checkout Service
//!
//! Turns a cart into a durable order.
//!
//! ## Checkout Transaction
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    checkout(request)                                    │
//! │                                                                         │
//! │  0. Validate request (no I/O)                                          │
//! │     └── lines non-empty, quantities, merge duplicate lines             │
//! │     └── PaymentPlanRequest → PaymentPlan                               │
//! │                                                                         │
//! │  BEGIN                                                                  │
//! │  1. For each line: conditional stock decrement  ← first statement is   │
//! │     └── 0 rows → explain (store, item, stock)      a write: lock taken │
//! │                  → return Err (tx dropped = rollback)                  │
//! │  2. Load store (must be active), snapshot name + price                 │
//! │  3. total = Σ price × quantity                                         │
//! │  4. Payment plan                                                       │
//! │     ├── Immediate           PIX/CARD → PENDING_PAYMENT                 │
//! │     │                       BALANCE/CASH → PENDING_APPROVAL            │
//! │     ├── Installments{n}     2 ≤ n ≤ tier max for total                 │
//! │     └── SpreadAcrossPeriod  n = months until period end (min 1)        │
//! │  5. Order number ORD-YYYYMMDD-NNNN, INSERT order + items               │
//! │  6. Outbox: OrderCreated (+ InvoiceLinesRequested when deferred)       │
//! │  COMMIT                                                                 │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use sqlx::{SqliteConnection, SqlitePool};
use tracing::{debug, info};
use uuid::Uuid;

use market_core::cart::{Cart, CheckoutLine};
use market_core::installments::{resolve_max_installments, split_amount};
use market_core::payment::{check_installments, months_until_period_end, PaymentPlanRequest};
use market_core::validation::{normalize_notes, validate_quantity};
use market_core::{
    CoreError, DomainEvent, Money, Order, OrderItem, PaymentPlan, Store, ValidationError,
    MAX_CART_ITEMS, MAX_ITEM_QUANTITY,
};

use crate::error::{DbError, ServiceError, ServiceResult};
use crate::pool::Database;
use crate::repository::catalog::CatalogRepository;
use crate::repository::order::OrderRepository;
use crate::repository::outbox::OutboxRepository;
use crate::service::collaborators::AcademicCalendar;

/// A checkout as submitted by the buyer.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutRequest {
    pub student_id: String,
    pub store_id: String,
    pub items: Vec<CheckoutLine>,
    pub payment_plan: PaymentPlanRequest,
    pub notes: Option<String>,
}

/// Creates orders.
#[derive(Clone)]
pub struct CheckoutService {
    pool: SqlitePool,
    calendar: Arc<dyn AcademicCalendar>,
}

impl CheckoutService {
    pub fn new(db: &Database, calendar: Arc<dyn AcademicCalendar>) -> Self {
        CheckoutService {
            pool: db.pool().clone(),
            calendar,
        }
    }

    /// Checks out a client-side cart.
    pub async fn checkout_cart(
        &self,
        student_id: &str,
        cart: &Cart,
        payment_plan: PaymentPlanRequest,
        notes: Option<String>,
    ) -> ServiceResult<Order> {
        let store_id = cart
            .store_id
            .clone()
            .ok_or_else(|| ValidationError::required("items"))?;

        self.checkout(CheckoutRequest {
            student_id: student_id.to_string(),
            store_id,
            items: cart.to_checkout_lines(),
            payment_plan,
            notes,
        })
        .await
    }

    /// Creates an order, reserving stock for every line.
    ///
    /// Any error leaves the database untouched: no stock is taken, no order
    /// row exists and no event is queued.
    pub async fn checkout(&self, request: CheckoutRequest) -> ServiceResult<Order> {
        if request.student_id.trim().is_empty() {
            return Err(ValidationError::required("student_id").into());
        }
        let lines = merge_lines(&request.items)?;
        let plan = PaymentPlan::try_from(request.payment_plan)?;
        let notes = normalize_notes(request.notes.as_deref())?;

        debug!(
            store_id = %request.store_id,
            lines = lines.len(),
            plan = ?plan,
            "Starting checkout"
        );

        let mut tx = self.pool.begin().await?;

        for line in &lines {
            let reserved = CatalogRepository::try_decrement_stock(
                &mut tx,
                &line.store_item_id,
                &request.store_id,
                line.quantity,
            )
            .await?;

            if !reserved {
                return Err(explain_rejected_line(&mut tx, &request.store_id, line).await?.into());
            }
        }

        let store = active_store(&mut tx, &request.store_id).await?;

        let mut order_items = Vec::with_capacity(lines.len());
        let now = Utc::now();
        let order_id = Uuid::new_v4().to_string();

        for line in &lines {
            let item = CatalogRepository::item_in(&mut tx, &line.store_item_id)
                .await?
                .ok_or_else(|| CoreError::StoreItemNotFound(line.store_item_id.clone()))?;

            // Stored prices may predate MAX_PRICE_CENTS
            let subtotal = item
                .price()
                .checked_multiply_quantity(line.quantity)
                .ok_or_else(|| ValidationError::invalid("items", "line total out of range"))?;
            order_items.push(OrderItem {
                id: Uuid::new_v4().to_string(),
                order_id: order_id.clone(),
                store_item_id: item.id,
                item_name_snapshot: item.name,
                unit_price_cents: item.price_cents,
                quantity: line.quantity,
                subtotal_cents: subtotal.cents(),
                created_at: now,
            });
        }

        let total = order_items
            .iter()
            .try_fold(Money::zero(), |total, item| total.checked_add(item.subtotal()))
            .ok_or_else(|| ValidationError::invalid("items", "order total out of range"))?;

        let invoice_lines = match plan {
            PaymentPlan::Immediate { .. } => None,
            PaymentPlan::Installments { count } => {
                let rules = CatalogRepository::installment_rules_in(&mut tx, &store.id).await?;
                let max = resolve_max_installments(&rules, total);
                let count = check_installments(count, max)?;
                Some(split_amount(total, count))
            }
            PaymentPlan::SpreadAcrossPeriod => {
                let period_end = self.calendar.active_period_end(&store.school_id).ok_or_else(|| {
                    ValidationError::invalid("spread_across_period", "no active academic period")
                })?;
                let months = months_until_period_end(now.date_naive(), period_end);
                Some(split_amount(total, months))
            }
        };

        let order_number = OrderRepository::next_order_number(&mut tx, now.date_naive()).await?;

        let order = Order {
            id: order_id,
            student_id: request.student_id,
            school_id: store.school_id.clone(),
            store_id: store.id.clone(),
            order_number,
            status: plan.initial_status(),
            payment_mode: plan.mode(),
            payment_method: plan.method(),
            installments: match plan {
                PaymentPlan::Installments { count } => Some(count),
                _ => None,
            },
            spread_across_period: plan == PaymentPlan::SpreadAcrossPeriod,
            total_cents: total.cents(),
            notes,
            rejection_reason: None,
            cancellation_reason: None,
            approved_at: None,
            delivered_at: None,
            created_at: now,
            updated_at: now,
        };

        OrderRepository::insert_order_in(&mut tx, &order, &order_items).await?;

        OutboxRepository::append(
            &mut tx,
            &DomainEvent::OrderCreated {
                order_id: order.id.clone(),
                order_number: order.order_number.clone(),
                store_id: order.store_id.clone(),
                student_id: order.student_id.clone(),
                total_cents: order.total_cents,
                status: order.status,
            },
        )
        .await?;

        if let Some(amounts) = invoice_lines {
            OutboxRepository::append(
                &mut tx,
                &DomainEvent::InvoiceLinesRequested {
                    order_id: order.id.clone(),
                    student_id: order.student_id.clone(),
                    count: amounts.len() as u32,
                    amounts_cents: amounts.iter().map(Money::cents).collect(),
                },
            )
            .await?;
        }

        tx.commit().await.map_err(DbError::from)?;

        info!(
            order_id = %order.id,
            order_number = %order.order_number,
            total_cents = order.total_cents,
            status = %order.status,
            "Order created"
        );

        Ok(order)
    }
}

/// Validates quantities and merges lines for the same item.
fn merge_lines(items: &[CheckoutLine]) -> ServiceResult<Vec<CheckoutLine>> {
    if items.is_empty() {
        return Err(ValidationError::required("items").into());
    }

    let mut merged: Vec<CheckoutLine> = Vec::with_capacity(items.len());
    for line in items {
        validate_quantity(line.quantity)?;
        match merged.iter_mut().find(|m| m.store_item_id == line.store_item_id) {
            Some(existing) => existing.quantity += line.quantity,
            None => merged.push(line.clone()),
        }
    }

    if merged.len() > MAX_CART_ITEMS {
        return Err(CoreError::CartTooLarge { max: MAX_CART_ITEMS }.into());
    }
    if let Some(line) = merged.iter().find(|l| l.quantity > MAX_ITEM_QUANTITY) {
        return Err(CoreError::QuantityTooLarge {
            requested: line.quantity,
            max: MAX_ITEM_QUANTITY,
        }
        .into());
    }

    Ok(merged)
}

/// The store must exist and still sell.
async fn active_store(conn: &mut SqliteConnection, store_id: &str) -> ServiceResult<Store> {
    let store = CatalogRepository::store_in(conn, store_id)
        .await?
        .ok_or_else(|| CoreError::StoreNotFound(store_id.to_string()))?;

    if !store.is_active {
        return Err(CoreError::StoreInactive(store_id.to_string()).into());
    }
    Ok(store)
}

/// Reason a line could not be reserved. Store problems win over item ones.
async fn explain_rejected_line(
    conn: &mut SqliteConnection,
    store_id: &str,
    line: &CheckoutLine,
) -> ServiceResult<CoreError> {
    if let Err(err) = active_store(conn, store_id).await {
        return match err {
            ServiceError::Core(core) => Ok(core),
            other => Err(other),
        };
    }

    Ok(CatalogRepository::explain_failed_decrement(conn, &line.store_item_id, store_id, line.quantity).await?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merge_lines_sums_duplicates() {
        let merged = merge_lines(&[
            CheckoutLine::new("a", 2),
            CheckoutLine::new("b", 1),
            CheckoutLine::new("a", 3),
        ])
        .unwrap();

        assert_eq!(merged.len(), 2);
        assert_eq!(merged[0].store_item_id, "a");
        assert_eq!(merged[0].quantity, 5);
        assert_eq!(merged[1].quantity, 1);
    }

    #[test]
    fn test_merge_lines_rejects_bad_input() {
        assert!(merge_lines(&[]).is_err());
        assert!(merge_lines(&[CheckoutLine::new("a", 0)]).is_err());
        assert!(matches!(
            merge_lines(&[CheckoutLine::new("a", 600), CheckoutLine::new("a", 600)]),
            Err(ServiceError::Core(CoreError::QuantityTooLarge { requested: 1200, .. }))
        ));
    }
}
