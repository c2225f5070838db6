//! # Domain Types
//!
//! Core domain types of the school marketplace.
//!
//! ## Type Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Domain Types                                    │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────┐       │
//! │  │     Store       │   │   StoreItem     │   │ InstallmentRule │       │
//! │  │  ─────────────  │   │  ─────────────  │   │  ─────────────  │       │
//! │  │  school_id      │◄──│  store_id       │   │  store_id       │       │
//! │  │  store_type     │   │  price_cents    │   │  min_amount     │       │
//! │  │  commission_bps │   │  total_stock    │   │  max_install.   │       │
//! │  └─────────────────┘   └─────────────────┘   └─────────────────┘       │
//! │           ▲                                                             │
//! │           │                                                             │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────┐       │
//! │  │     Order       │◄──│   OrderItem     │   │   Settlement    │       │
//! │  │  ─────────────  │   │  ─────────────  │   │  ─────────────  │       │
//! │  │  order_number   │   │  name snapshot  │   │  store, y/m     │       │
//! │  │  status         │   │  price snapshot │   │  commission     │       │
//! │  │  total_cents    │   │  quantity       │   │  transfer       │       │
//! │  └─────────────────┘   └─────────────────┘   └─────────────────┘       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Dual-Key Identity Pattern
//! Every entity has a UUID `id` for relations; orders additionally carry a
//! human-readable `order_number` printed on pickup slips.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use ts_rs::TS;

use crate::money::Money;

// =============================================================================
// Rate
// =============================================================================

/// A percentage represented in basis points (bps).
///
/// ## Why Basis Points?
/// 1 basis point = 0.01% = 1/10000, so every configured commission or fee
/// stays an integer: 1000 bps = 10%, 250 bps = 2.5%.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Rate(u32);

impl Rate {
    /// 100% in basis points.
    pub const FULL_BPS: u32 = 10_000;

    /// Creates a rate from basis points.
    #[inline]
    pub const fn from_bps(bps: u32) -> Self {
        Rate(bps)
    }

    /// Creates a rate from a whole percentage.
    #[inline]
    pub const fn from_percent(percent: u32) -> Self {
        Rate(percent * 100)
    }

    /// Returns the rate in basis points.
    #[inline]
    pub const fn bps(&self) -> u32 {
        self.0
    }

    /// Returns the rate as a percentage (for display only).
    #[inline]
    pub fn percentage(&self) -> f64 {
        self.0 as f64 / 100.0
    }

    /// Zero rate.
    #[inline]
    pub const fn zero() -> Self {
        Rate(0)
    }

    /// Checks if the rate is zero.
    #[inline]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }

    /// Sum of two rates; saturates instead of wrapping.
    #[inline]
    pub const fn combined(self, other: Rate) -> Rate {
        Rate(self.0.saturating_add(other.0))
    }

    /// Whether the rate exceeds 100%.
    #[inline]
    pub const fn exceeds_full(&self) -> bool {
        self.0 > Self::FULL_BPS
    }
}

impl Default for Rate {
    fn default() -> Self {
        Rate::zero()
    }
}

// =============================================================================
// Store
// =============================================================================

/// Who operates a store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "SCREAMING_SNAKE_CASE"))]
#[ts(export)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StoreType {
    /// Run by the school itself (canteen, uniform shop). Never settled.
    Internal,
    /// Run by an external store owner who is paid out monthly.
    ThirdParty,
}

/// Which orders count as revenue for a settlement period.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "SCREAMING_SNAKE_CASE"))]
#[ts(export)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SettlementBasis {
    /// Only DELIVERED orders, dated by `delivered_at`.
    #[default]
    Delivered,
    /// APPROVED and later (excluding cancellations), dated by `approved_at`.
    Approved,
}

/// A marketplace store belonging to a school.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Store {
    pub id: String,
    pub school_id: String,
    pub name: String,
    pub store_type: StoreType,
    /// External store-owner account; `None` for INTERNAL stores.
    pub owner_id: Option<String>,
    /// Commission retained by the school, in basis points.
    pub commission_bps: u32,
    pub settlement_basis: SettlementBasis,
    /// Soft-delete flag. Historical orders keep resolving the store.
    pub is_active: bool,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

impl Store {
    /// Returns the commission as a Rate.
    #[inline]
    pub fn commission_rate(&self) -> Rate {
        Rate::from_bps(self.commission_bps)
    }

    #[inline]
    pub fn is_third_party(&self) -> bool {
        self.store_type == StoreType::ThirdParty
    }
}

// =============================================================================
// Store Item
// =============================================================================

/// How an item may be paid for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "SCREAMING_SNAKE_CASE"))]
#[ts(export)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ItemPaymentMode {
    MoneyOnly,
    /// Redeemed with gamification points; not purchasable through checkout.
    PointsOnly,
}

/// A product listed by a store.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct StoreItem {
    pub id: String,
    pub store_id: String,
    pub name: String,
    pub category: String,
    /// Price in cents.
    pub price_cents: i64,
    /// Remaining stock; `None` means unlimited.
    pub total_stock: Option<i64>,
    pub is_active: bool,
    pub payment_mode: ItemPaymentMode,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

impl StoreItem {
    /// Returns the price as Money.
    #[inline]
    pub fn price(&self) -> Money {
        Money::from_cents(self.price_cents)
    }

    #[inline]
    pub fn is_unlimited(&self) -> bool {
        self.total_stock.is_none()
    }

    /// Whether the item can go through a money checkout at all.
    #[inline]
    pub fn is_purchasable(&self) -> bool {
        self.is_active && self.payment_mode == ItemPaymentMode::MoneyOnly
    }

    /// Checks the current stock without reserving anything.
    pub fn has_stock_for(&self, quantity: i64) -> bool {
        match self.total_stock {
            None => true,
            Some(stock) => stock >= quantity,
        }
    }
}

// =============================================================================
// Installment Rule
// =============================================================================

/// A store-defined value tier: orders of at least `min_amount_cents` may be
/// split into up to `max_installments` payments.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct InstallmentRule {
    pub id: String,
    pub store_id: String,
    pub min_amount_cents: i64,
    pub max_installments: u32,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

impl InstallmentRule {
    #[inline]
    pub fn min_amount(&self) -> Money {
        Money::from_cents(self.min_amount_cents)
    }
}

// =============================================================================
// Order Status
// =============================================================================

/// Lifecycle status of an order. Transitions live in [`crate::lifecycle`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "SCREAMING_SNAKE_CASE"))]
#[ts(export)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    /// Waiting for an external payment (PIX/card) to be confirmed.
    PendingPayment,
    /// Paid or billed; waiting for the store to accept it.
    PendingApproval,
    Approved,
    Preparing,
    Ready,
    /// Terminal success.
    Delivered,
    /// Terminal failure after approval.
    Canceled,
    /// Terminal failure before approval.
    Rejected,
}

impl OrderStatus {
    pub const ALL: [OrderStatus; 8] = [
        OrderStatus::PendingPayment,
        OrderStatus::PendingApproval,
        OrderStatus::Approved,
        OrderStatus::Preparing,
        OrderStatus::Ready,
        OrderStatus::Delivered,
        OrderStatus::Canceled,
        OrderStatus::Rejected,
    ];

    /// Storage/wire representation.
    pub const fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::PendingPayment => "PENDING_PAYMENT",
            OrderStatus::PendingApproval => "PENDING_APPROVAL",
            OrderStatus::Approved => "APPROVED",
            OrderStatus::Preparing => "PREPARING",
            OrderStatus::Ready => "READY",
            OrderStatus::Delivered => "DELIVERED",
            OrderStatus::Canceled => "CANCELED",
            OrderStatus::Rejected => "REJECTED",
        }
    }

    /// Terminal orders are immutable.
    pub const fn is_terminal(&self) -> bool {
        matches!(
            self,
            OrderStatus::Delivered | OrderStatus::Canceled | OrderStatus::Rejected
        )
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Payment
// =============================================================================

/// When the buyer pays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "SCREAMING_SNAKE_CASE"))]
#[ts(export)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentMode {
    Immediate,
    /// Billed later through invoices.
    Deferred,
}

/// How an immediate payment is made.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "SCREAMING_SNAKE_CASE"))]
#[ts(export)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentMethod {
    /// Prepaid student balance.
    Balance,
    Pix,
    /// Recorded by staff at the counter.
    Cash,
    Card,
}

impl PaymentMethod {
    /// PIX and card payments are confirmed by the gateway after checkout.
    pub const fn requires_external_confirmation(&self) -> bool {
        matches!(self, PaymentMethod::Pix | PaymentMethod::Card)
    }
}

// =============================================================================
// Order
// =============================================================================

/// A marketplace purchase.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Order {
    pub id: String,
    /// Buyer.
    pub student_id: String,
    pub school_id: String,
    pub store_id: String,
    pub order_number: String,
    pub status: OrderStatus,
    pub payment_mode: PaymentMode,
    pub payment_method: Option<PaymentMethod>,
    /// Set for DEFERRED orders split into a fixed number of installments.
    pub installments: Option<u32>,
    /// Set for DEFERRED orders billed across the rest of the academic period.
    pub spread_across_period: bool,
    /// Sum of the line subtotals at creation. Never changes.
    pub total_cents: i64,
    pub notes: Option<String>,
    pub rejection_reason: Option<String>,
    pub cancellation_reason: Option<String>,
    #[ts(as = "Option<String>")]
    pub approved_at: Option<DateTime<Utc>>,
    #[ts(as = "Option<String>")]
    pub delivered_at: Option<DateTime<Utc>>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

impl Order {
    /// Returns the total as Money.
    #[inline]
    pub fn total(&self) -> Money {
        Money::from_cents(self.total_cents)
    }

    #[inline]
    pub fn is_deferred(&self) -> bool {
        self.payment_mode == PaymentMode::Deferred
    }
}

// =============================================================================
// Order Item
// =============================================================================

/// A line of an order.
/// Uses the snapshot pattern to freeze catalog data at checkout time.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct OrderItem {
    pub id: String,
    pub order_id: String,
    pub store_item_id: String,
    /// Item name at checkout (frozen).
    pub item_name_snapshot: String,
    /// Unit price in cents at checkout (frozen).
    pub unit_price_cents: i64,
    pub quantity: i64,
    /// unit_price × quantity.
    pub subtotal_cents: i64,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

impl OrderItem {
    #[inline]
    pub fn unit_price(&self) -> Money {
        Money::from_cents(self.unit_price_cents)
    }

    #[inline]
    pub fn subtotal(&self) -> Money {
        Money::from_cents(self.subtotal_cents)
    }
}

// =============================================================================
// Settlement
// =============================================================================

/// Payout status of a settlement. Transitions live in [`crate::settlement`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "SCREAMING_SNAKE_CASE"))]
#[ts(export)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SettlementStatus {
    Pending,
    Approved,
    Processing,
    /// Terminal success: money sent to the store owner.
    Transferred,
    /// Terminal failure; the period may be regenerated.
    Failed,
    /// Terminal failure; the period may be regenerated.
    Cancelled,
}

impl SettlementStatus {
    pub const ALL: [SettlementStatus; 6] = [
        SettlementStatus::Pending,
        SettlementStatus::Approved,
        SettlementStatus::Processing,
        SettlementStatus::Transferred,
        SettlementStatus::Failed,
        SettlementStatus::Cancelled,
    ];

    pub const fn as_str(&self) -> &'static str {
        match self {
            SettlementStatus::Pending => "PENDING",
            SettlementStatus::Approved => "APPROVED",
            SettlementStatus::Processing => "PROCESSING",
            SettlementStatus::Transferred => "TRANSFERRED",
            SettlementStatus::Failed => "FAILED",
            SettlementStatus::Cancelled => "CANCELLED",
        }
    }

    pub const fn is_terminal(&self) -> bool {
        matches!(
            self,
            SettlementStatus::Transferred | SettlementStatus::Failed | SettlementStatus::Cancelled
        )
    }

    /// FAILED and CANCELLED settlements free their period key.
    pub const fn allows_regeneration(&self) -> bool {
        matches!(self, SettlementStatus::Failed | SettlementStatus::Cancelled)
    }
}

impl fmt::Display for SettlementStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Monthly commission/fee rollup for one third-party store.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Settlement {
    pub id: String,
    pub store_id: String,
    pub year: i32,
    pub month: u32,
    pub order_count: i64,
    pub total_sales_cents: i64,
    /// Commission rate applied (snapshot of the store setting).
    pub commission_bps: u32,
    /// Platform fee rate applied (snapshot of the platform setting).
    pub platform_fee_bps: u32,
    pub commission_cents: i64,
    pub platform_fee_cents: i64,
    pub transfer_cents: i64,
    pub status: SettlementStatus,
    pub failure_reason: Option<String>,
    #[ts(as = "Option<String>")]
    pub transferred_at: Option<DateTime<Utc>>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

impl Settlement {
    #[inline]
    pub fn transfer(&self) -> Money {
        Money::from_cents(self.transfer_cents)
    }
}

// =============================================================================
// Event Outbox
// =============================================================================

/// An entry in the event outbox queue.
/// Written in the same transaction as the change that raised the event.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct OutboxEntry {
    pub id: String,
    /// Event name: "ORDER_CREATED", "SETTLEMENT_TRANSFERRED", etc.
    pub event_type: String,
    /// Order or settlement the event is about.
    pub aggregate_id: String,
    /// The serialized [`crate::events::DomainEvent`].
    pub payload: String,
    pub attempts: i64,
    pub last_error: Option<String>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "Option<String>")]
    pub attempted_at: Option<DateTime<Utc>>,
    #[ts(as = "Option<String>")]
    pub dispatched_at: Option<DateTime<Utc>>,
}

// =============================================================================
// Unit Tests
// =============================================================================
