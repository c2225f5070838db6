//! # Services
//!
//! Transactional operations composed from the repositories.
//!
//! - [`checkout::CheckoutService`] - cart → order
//! - [`orders::OrderService`] - order lifecycle
//! - [`settlement::SettlementEngine`] - monthly settlements and payout status
//! - [`outbox::OutboxDispatcher`] - event delivery
//!
//! Every operation is one SQLite transaction and returns [`ServiceError`],
//! keeping business failures typed as [`CoreError`].
//!
//! [`ServiceError`]: crate::error::ServiceError
//! [`CoreError`]: market_core::CoreError

pub mod checkout;
pub mod collaborators;
pub mod orders;
pub mod outbox;
pub mod settlement;
