//! # Order Lifecycle
//!
//! The order status machine as an explicit transition table.
//!
//! ```text
//!                      confirm_payment
//!  PENDING_PAYMENT ───────────────────► PENDING_APPROVAL
//!        │   │                              │    │
//!        │   └──────── approve ─────────────┤    │ reject
//!        │ reject                           ▼    ▼
//!        │                              APPROVED  REJECTED ■
//!        ▼                              │  │  │
//!     REJECTED ■        start_preparing │  │  │ mark_ready
//!                                       ▼  │  ▼
//!                               PREPARING ─┼► READY
//!                                   │      │    │
//!                     cancel ◄──────┴──────┴────┴──────► deliver
//!                       │                                   │
//!                       ▼                                   ▼
//!                   CANCELED ■                          DELIVERED ■
//! ```
//!
//! ■ = terminal. Anything not in [`OrderAction::sources`] is rejected with
//! [`CoreError::InvalidTransition`]; the database layer enforces the same
//! table with a compare-and-swap on the stored status.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{CoreError, CoreResult};
use crate::types::OrderStatus;

/// A status-changing command on an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderAction {
    /// Gateway confirmed a PIX/card payment.
    ConfirmPayment,
    Approve,
    Reject,
    StartPreparing,
    MarkReady,
    Cancel,
    Deliver,
}

impl OrderAction {
    pub const ALL: [OrderAction; 7] = [
        OrderAction::ConfirmPayment,
        OrderAction::Approve,
        OrderAction::Reject,
        OrderAction::StartPreparing,
        OrderAction::MarkReady,
        OrderAction::Cancel,
        OrderAction::Deliver,
    ];

    /// Statuses this action may be applied to.
    pub const fn sources(&self) -> &'static [OrderStatus] {
        use OrderStatus::*;
        match self {
            OrderAction::ConfirmPayment => &[PendingPayment],
            OrderAction::Approve | OrderAction::Reject => &[PendingPayment, PendingApproval],
            OrderAction::StartPreparing => &[Approved],
            OrderAction::MarkReady => &[Approved, Preparing],
            OrderAction::Cancel | OrderAction::Deliver => &[Approved, Preparing, Ready],
        }
    }

    /// Status after a successful application.
    pub const fn target(&self) -> OrderStatus {
        match self {
            OrderAction::ConfirmPayment => OrderStatus::PendingApproval,
            OrderAction::Approve => OrderStatus::Approved,
            OrderAction::Reject => OrderStatus::Rejected,
            OrderAction::StartPreparing => OrderStatus::Preparing,
            OrderAction::MarkReady => OrderStatus::Ready,
            OrderAction::Cancel => OrderStatus::Canceled,
            OrderAction::Deliver => OrderStatus::Delivered,
        }
    }

    /// Whether the action undoes the sale: stock goes back and pending
    /// invoice lines are voided.
    pub const fn reverses_sale(&self) -> bool {
        matches!(self, OrderAction::Reject | OrderAction::Cancel)
    }

    /// Whether a non-empty reason must accompany the action.
    pub const fn requires_reason(&self) -> bool {
        self.reverses_sale()
    }

    pub fn is_allowed_from(&self, current: OrderStatus) -> bool {
        self.sources().contains(&current)
    }

    pub const fn as_str(&self) -> &'static str {
        match self {
            OrderAction::ConfirmPayment => "confirm_payment",
            OrderAction::Approve => "approve",
            OrderAction::Reject => "reject",
            OrderAction::StartPreparing => "start_preparing",
            OrderAction::MarkReady => "mark_ready",
            OrderAction::Cancel => "cancel",
            OrderAction::Deliver => "deliver",
        }
    }
}

impl fmt::Display for OrderAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Applies `action` to an order currently in `current`.
///
/// ## Returns
/// * `Ok(status)` - the new status
/// * `Err(CoreError::InvalidTransition)` - pair not in the table
pub fn transition(order_id: &str, current: OrderStatus, action: OrderAction) -> CoreResult<OrderStatus> {
    if action.is_allowed_from(current) {
        Ok(action.target())
    } else {
        Err(CoreError::InvalidTransition {
            order_id: order_id.to_string(),
            current,
            attempted: action,
        })
    }
}

/// SQL fragment listing the source statuses, e.g. `'APPROVED', 'READY'`.
///
/// Built only from the closed enum, never from caller input.
pub fn sources_sql_list(action: OrderAction) -> String {
    action
        .sources()
        .iter()
        .map(|s| format!("'{}'", s.as_str()))
        .collect::<Vec<_>>()
        .join(", ")
}

// =============================================================================
// Unit Tests
// =============================================================================
