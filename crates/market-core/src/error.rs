//! # Error Types
//!
//! Domain-specific error types for market-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  market-core errors (this file)                                        │
//! │  ├── CoreError        - Business rule violations                       │
//! │  └── ValidationError  - Malformed input (caller's fault)               │
//! │                                                                         │
//! │  market-db errors (separate crate)                                     │
//! │  ├── DbError          - Database operation failures                    │
//! │  └── ServiceError     - CoreError | DbError, returned by services      │
//! │                                                                         │
//! │  Flow: ValidationError → CoreError → ServiceError → caller             │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Retry Semantics
//! | Error                    | Who fixes it | Retried by core |
//! |--------------------------|--------------|-----------------|
//! | `Validation`             | caller       | never           |
//! | `InsufficientStock`      | buyer        | never           |
//! | `InstallmentsNotAllowed` | buyer        | never           |
//! | `InvalidTransition`      | programmer   | never (logged)  |
//! | `AlreadySettled`         | operator     | never           |
//! | `NegativeTransfer`       | operator     | never           |

use thiserror::Error;

use crate::lifecycle::OrderAction;
use crate::settlement::SettlementAction;
use crate::types::{OrderStatus, SettlementStatus};

// =============================================================================
// Core Error
// =============================================================================

/// Core business logic errors.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("Store not found: {0}")]
    StoreNotFound(String),

    /// Store was soft-deactivated and no longer sells.
    #[error("Store {0} is not active")]
    StoreInactive(String),

    #[error("Store item not found: {0}")]
    StoreItemNotFound(String),

    #[error("Order not found: {0}")]
    OrderNotFound(String),

    #[error("Settlement not found: {0}")]
    SettlementNotFound(String),

    /// A checkout line references an item of another store.
    ///
    /// ## When This Occurs
    /// The single-store cart invariant was bypassed by the client.
    #[error("Item {store_item_id} does not belong to store {store_id}")]
    ItemNotInStore {
        store_item_id: String,
        store_id: String,
    },

    /// Item is inactive or points-only.
    #[error("Item {store_item_id} cannot be purchased: {reason}")]
    ItemNotPurchasable {
        store_item_id: String,
        reason: String,
    },

    /// Not enough stock to cover the requested quantity.
    ///
    /// ## User Workflow
    /// ```text
    /// Checkout (qty: 4)
    ///      │
    ///      ▼
    /// Conditional decrement: stock=3 → 0 rows updated
    ///      │
    ///      ▼
    /// InsufficientStock { available: 3, requested: 4 }
    ///      │
    ///      ▼
    /// UI shows: "Only 3 left"
    /// ```
    #[error("Insufficient stock for {store_item_id}: available {available}, requested {requested}")]
    InsufficientStock {
        store_item_id: String,
        available: i64,
        requested: i64,
    },

    /// Installment count outside what the store's tiers allow for this total.
    #[error("{requested} installments not allowed (maximum {max})")]
    InstallmentsNotAllowed { requested: u32, max: u32 },

    /// Order status change not in the transition table.
    #[error("Order {order_id} is {current}, cannot {attempted}")]
    InvalidTransition {
        order_id: String,
        current: OrderStatus,
        attempted: OrderAction,
    },

    /// Settlement status change not in the transition table.
    #[error("Settlement {settlement_id} is {current}, cannot {attempted}")]
    InvalidSettlementTransition {
        settlement_id: String,
        current: SettlementStatus,
        attempted: SettlementAction,
    },

    /// A live settlement already exists for the period key.
    #[error("Store {store_id} already settled for {year}-{month:02}")]
    AlreadySettled {
        store_id: String,
        year: i32,
        month: u32,
    },

    /// Deductions would exceed the sales total: the commission or platform
    /// fee rate is misconfigured.
    #[error(
        "Deductions exceed sales: total {total_sales_cents}, commission {commission_bps} bps, platform fee {platform_fee_bps} bps"
    )]
    NegativeTransfer {
        total_sales_cents: i64,
        commission_bps: u32,
        platform_fee_bps: u32,
    },

    /// INTERNAL stores have no commission and are never settled.
    #[error("Store {store_id} is not a third-party store and cannot be settled")]
    NotSettleable { store_id: String },

    /// Cart already holds items from another store.
    #[error("Cart holds items from store {cart_store_id}, cannot add item from {item_store_id}")]
    CartStoreMismatch {
        cart_store_id: String,
        item_store_id: String,
    },

    /// Cart has exceeded maximum allowed lines.
    #[error("Cart cannot have more than {max} items")]
    CartTooLarge { max: usize },

    #[error("Item {0} is not in the cart")]
    CartItemMissing(String),

    #[error("Quantity {requested} exceeds maximum allowed ({max})")]
    QuantityTooLarge { requested: i64, max: i64 },

    /// Validation error (wraps ValidationError).
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

// =============================================================================
// Validation Error
// =============================================================================

/// Input validation errors.
///
/// These errors occur when caller input doesn't meet requirements.
/// Used for early validation before business logic runs.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// A required field is missing or empty.
    #[error("{field} is required")]
    Required { field: String },

    /// Field value is too long.
    #[error("{field} must be at most {max} characters")]
    TooLong { field: String, max: usize },

    /// Numeric value is out of range.
    #[error("{field} must be between {min} and {max}")]
    OutOfRange { field: String, min: i64, max: i64 },

    /// Value must be positive.
    #[error("{field} must be positive")]
    MustBePositive { field: String },

    /// Invalid format or combination (e.g. invalid UUID, conflicting plan fields).
    #[error("{field} has invalid format: {reason}")]
    InvalidFormat { field: String, reason: String },

    /// Duplicate value (e.g. two tiers with the same minimum amount).
    #[error("{field} '{value}' already exists")]
    Duplicate { field: String, value: String },
}

impl ValidationError {
    pub fn required(field: impl Into<String>) -> Self {
        ValidationError::Required {
            field: field.into(),
        }
    }

    pub fn invalid(field: impl Into<String>, reason: impl Into<String>) -> Self {
        ValidationError::InvalidFormat {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

// =============================================================================
// Result Type Alias
// =============================================================================

/// Convenience type alias for Results with CoreError.
pub type CoreResult<T> = Result<T, CoreError>;

// =============================================================================
// Unit Tests
// =============================================================================
