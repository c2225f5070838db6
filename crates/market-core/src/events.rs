//! # Domain Events
//!
//! Facts the core publishes to its collaborators (billing, notifications).
//!
//! Events are written to the outbox table in the same transaction as the
//! change that raised them and delivered afterwards, so a rolled-back
//! checkout never notifies anyone.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::types::OrderStatus;

/// An event raised by the order lifecycle or the settlement engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DomainEvent {
    OrderCreated {
        order_id: String,
        order_number: String,
        store_id: String,
        student_id: String,
        total_cents: i64,
        status: OrderStatus,
    },
    /// Billing collaborator should create one invoice line per amount.
    InvoiceLinesRequested {
        order_id: String,
        student_id: String,
        count: u32,
        amounts_cents: Vec<i64>,
    },
    OrderApproved { order_id: String },
    OrderRejected { order_id: String, reason: String },
    OrderCanceled { order_id: String, reason: String },
    /// Billing collaborator should drop pending invoice lines of the order.
    InvoiceLinesVoided { order_id: String },
    OrderDelivered {
        order_id: String,
        #[ts(as = "String")]
        delivered_at: DateTime<Utc>,
    },
    SettlementGenerated {
        settlement_id: String,
        store_id: String,
        year: i32,
        month: u32,
        transfer_cents: i64,
    },
    SettlementTransferred {
        settlement_id: String,
        store_id: String,
        transfer_cents: i64,
    },
}

impl DomainEvent {
    /// Outbox `event_type` column value.
    pub const fn event_type(&self) -> &'static str {
        match self {
            DomainEvent::OrderCreated { .. } => "ORDER_CREATED",
            DomainEvent::InvoiceLinesRequested { .. } => "INVOICE_LINES_REQUESTED",
            DomainEvent::OrderApproved { .. } => "ORDER_APPROVED",
            DomainEvent::OrderRejected { .. } => "ORDER_REJECTED",
            DomainEvent::OrderCanceled { .. } => "ORDER_CANCELED",
            DomainEvent::InvoiceLinesVoided { .. } => "INVOICE_LINES_VOIDED",
            DomainEvent::OrderDelivered { .. } => "ORDER_DELIVERED",
            DomainEvent::SettlementGenerated { .. } => "SETTLEMENT_GENERATED",
            DomainEvent::SettlementTransferred { .. } => "SETTLEMENT_TRANSFERRED",
        }
    }

    /// Id of the order or settlement the event is about.
    pub fn aggregate_id(&self) -> &str {
        match self {
            DomainEvent::OrderCreated { order_id, .. }
            | DomainEvent::InvoiceLinesRequested { order_id, .. }
            | DomainEvent::OrderApproved { order_id }
            | DomainEvent::OrderRejected { order_id, .. }
            | DomainEvent::OrderCanceled { order_id, .. }
            | DomainEvent::InvoiceLinesVoided { order_id }
            | DomainEvent::OrderDelivered { order_id, .. } => order_id,
            DomainEvent::SettlementGenerated { settlement_id, .. }
            | DomainEvent::SettlementTransferred { settlement_id, .. } => settlement_id,
        }
    }
}
