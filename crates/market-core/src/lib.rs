//! # market-core: Pure Business Logic for Campus Market
//!
//! Everything the school marketplace decides lives here as pure functions
//! with zero I/O dependencies.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                     Campus Market Architecture                          │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │              School web app (outside this workspace)            │   │
//! │  │    Catalog UI ──► Cart ──► Checkout ──► Order tracking          │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │               ★ market-core (THIS CRATE) ★                      │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────┐  ┌────────────┐  ┌───────────┐  ┌───────────┐ │   │
//! │  │   │   types   │  │installments│  │ lifecycle │  │settlement │ │   │
//! │  │   │   money   │  │  payment   │  │   cart    │  │  events   │ │   │
//! │  │   └───────────┘  └────────────┘  └───────────┘  └───────────┘ │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO DATABASE • NO NETWORK • PURE FUNCTIONS           │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │                   market-db (Database Layer)                    │   │
//! │  │      SQLite, repositories, checkout / lifecycle / settlement    │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`types`] - Domain records (Store, StoreItem, Order, Settlement, ...)
//! - [`money`] - Money type with integer arithmetic
//! - [`installments`] - Installment tier resolver
//! - [`payment`] - Payment plan parsing and initial order status
//! - [`cart`] - Single-store cart aggregate
//! - [`lifecycle`] - Order status machine
//! - [`settlement`] - Settlement math and payout status machine
//! - [`events`] - Domain events for the outbox
//! - [`error`] / [`validation`] - Typed errors and field rules
//!
//! ## Example Usage
//!
//! ```rust
//! use market_core::installments::resolve_installment_options;
//! use market_core::money::Money;
//!
//! // No tiers configured: installments are not offered
//! let options = resolve_installment_options(&[], Money::from_cents(12000));
//! assert!(options.is_empty());
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod cart;
pub mod error;
pub mod events;
pub mod installments;
pub mod lifecycle;
pub mod money;
pub mod payment;
pub mod settlement;
pub mod types;
pub mod validation;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use error::{CoreError, CoreResult, ValidationError};
pub use events::DomainEvent;
pub use lifecycle::OrderAction;
pub use money::Money;
pub use payment::PaymentPlan;
pub use settlement::SettlementAction;
pub use types::*;

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Maximum lines in a single cart or checkout.
pub const MAX_CART_ITEMS: usize = 100;

/// Maximum quantity of a single line.
///
/// ## Business Reason
/// Catches typos such as 1000 instead of 10 at the counter.
pub const MAX_ITEM_QUANTITY: i64 = 999;

/// Maximum unit price in cents (R$10 billion).
///
/// Keeps `price × MAX_ITEM_QUANTITY × MAX_CART_ITEMS` well inside `i64`.
pub const MAX_PRICE_CENTS: i64 = 1_000_000_000_000;
