//! # market-db: Database Layer for Campus Market
//!
//! SQLite persistence for the school marketplace and the transactional
//! services built on it.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Campus Market Data Flow                          │
//! │                                                                         │
//! │  Web handler / settle binary                                           │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                    market-db (THIS CRATE)                       │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────────┐    ┌───────────────┐    ┌──────────────┐  │   │
//! │  │   │   Services    │    │  Repositories │    │  Migrations  │  │   │
//! │  │   │               │    │               │    │  (embedded)  │  │   │
//! │  │   │ Checkout      │───►│ Catalog       │    │              │  │   │
//! │  │   │ Orders        │    │ Order         │    │ 001_market.. │  │   │
//! │  │   │ Settlement    │    │ Settlement    │    │              │  │   │
//! │  │   │ Outbox        │    │ Outbox        │    │              │  │   │
//! │  │   └───────────────┘    └───────────────┘    └──────────────┘  │   │
//! │  │            │                    │                              │   │
//! │  │            └──── Database (pool.rs, SqlitePool) ────┘          │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  SQLite (WAL)                                                          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`config`] - `MARKET_*` environment configuration
//! - [`pool`] - Connection pool creation and configuration
//! - [`migrations`] - Embedded database migrations
//! - [`error`] - Database and service error types
//! - [`repository`] - Repository implementations
//! - [`service`] - Checkout, order lifecycle, settlement, outbox dispatch
//!
//! ## Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use market_db::{CheckoutService, Database, FixedAcademicCalendar, MarketConfig};
//!
//! let config = MarketConfig::from_env()?;
//! let db = Database::new(config.db_config()).await?;
//!
//! let checkout = CheckoutService::new(&db, Arc::new(FixedAcademicCalendar::from_config(&config)));
//! let order = checkout.checkout(request).await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod config;
pub mod error;
pub mod migrations;
pub mod pool;
pub mod repository;
pub mod service;

// =============================================================================
// Re-exports
// =============================================================================

pub use config::{ConfigError, MarketConfig};
pub use error::{DbError, DbResult, ServiceError, ServiceResult};
pub use pool::{Database, DbConfig};

pub use repository::catalog::{CatalogRepository, NewStore, NewStoreItem};
pub use repository::order::OrderRepository;
pub use repository::outbox::OutboxRepository;
pub use repository::settlement::SettlementRepository;

pub use service::checkout::{CheckoutRequest, CheckoutService};
pub use service::collaborators::{
    AcademicCalendar, FixedAcademicCalendar, FixedPlatformSettings, PlatformSettings,
};
pub use service::orders::OrderService;
pub use service::outbox::{DispatchReport, EventSink, LoggingSink, OutboxDispatcher};
pub use service::settlement::{SettlementEngine, SettlementRun};
