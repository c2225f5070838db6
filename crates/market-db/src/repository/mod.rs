//! # Repository Module
//!
//! Database repository implementations for Campus Market.
//!
//! ## Repository Pattern
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Repository Layout                                    │
//! │                                                                         │
//! │  Service (checkout / orders / settlement)                              │
//! │       │                                                                 │
//! │       │  pool-level reads            transaction helpers               │
//! │       │  db.catalog().get_item(id)   CatalogRepository::               │
//! │       │                                try_decrement_stock(&mut tx, ..)│
//! │       ▼                                                                 │
//! │  CatalogRepository    stores, items, tiers, stock                      │
//! │  OrderRepository      orders, line snapshots, status CAS               │
//! │  SettlementRepository settlements, sales aggregation, status CAS       │
//! │  OutboxRepository     domain events awaiting delivery                  │
//! │       │                                                                 │
//! │       │  SQL                                                            │
//! │       ▼                                                                 │
//! │  SQLite Database                                                       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Methods taking `&self` run on the pool. Associated functions taking a
//! `&mut SqliteConnection` run on the caller's transaction, so a service can
//! compose several of them atomically.

pub mod catalog;
pub mod order;
pub mod outbox;
pub mod settlement;
