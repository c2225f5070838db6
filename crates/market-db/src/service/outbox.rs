//! # Outbox Dispatcher
//!
//! Drains queued domain events to the billing and notification collaborators.
//!
//! ```text
//! get_pending(batch) ──► decode ──► sink.deliver(event)
//!                                     │
//!                          ok ────────┼──── err
//!                          ▼                 ▼
//!                   mark_dispatched     mark_failed(attempts += 1)
//!                                            │
//!                                            ▼
//!                                  parked until requeue_failed
//! ```
//!
//! Nothing is retried automatically. A failed entry leaves the pending
//! queue, so later events keep flowing while an operator looks at it.

use tracing::{debug, info, warn};

use market_core::DomainEvent;

use crate::error::DbResult;
use crate::repository::outbox::OutboxRepository;

/// Receiver of dispatched events.
pub trait EventSink: Send + Sync {
    /// Delivers one event. An `Err` parks the entry.
    fn deliver(&self, event: &DomainEvent) -> Result<(), String>;
}

/// Sink that only logs, for the settle binary and local runs.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingSink;

impl EventSink for LoggingSink {
    fn deliver(&self, event: &DomainEvent) -> Result<(), String> {
        info!(
            event_type = event.event_type(),
            aggregate_id = %event.aggregate_id(),
            "Event dispatched"
        );
        Ok(())
    }
}

/// Counts of one dispatch run.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DispatchReport {
    pub dispatched: usize,
    pub failed: usize,
}

/// Moves outbox entries to an [`EventSink`].
#[derive(Debug, Clone)]
pub struct OutboxDispatcher {
    outbox: OutboxRepository,
    batch_size: u32,
}

impl OutboxDispatcher {
    pub fn new(outbox: OutboxRepository, batch_size: u32) -> Self {
        OutboxDispatcher { outbox, batch_size }
    }

    /// Delivers up to one batch of pending events, oldest first.
    pub async fn dispatch_pending(&self, sink: &dyn EventSink) -> DbResult<DispatchReport> {
        let mut report = DispatchReport::default();
        let entries = self.outbox.get_pending(self.batch_size).await?;
        debug!(count = entries.len(), "Dispatching outbox entries");

        for entry in entries {
            let delivered = match OutboxRepository::decode(&entry) {
                Ok(event) => sink.deliver(&event),
                Err(err) => Err(err.to_string()),
            };

            match delivered {
                Ok(()) => {
                    self.outbox.mark_dispatched(&entry.id).await?;
                    report.dispatched += 1;
                }
                Err(error) => {
                    warn!(
                        entry_id = %entry.id,
                        event_type = %entry.event_type,
                        attempts = entry.attempts + 1,
                        error = %error,
                        "Event delivery failed"
                    );
                    self.outbox.mark_failed(&entry.id, &error).await?;
                    report.failed += 1;
                }
            }
        }

        Ok(report)
    }

    /// Returns every parked entry to the pending queue.
    pub async fn requeue_failed(&self) -> DbResult<usize> {
        let mut requeued = 0;
        loop {
            let failed = self.outbox.list_failed(self.batch_size).await?;
            if failed.is_empty() {
                break;
            }
            for entry in failed {
                if self.outbox.requeue(&entry.id).await? {
                    requeued += 1;
                }
            }
        }

        if requeued > 0 {
            info!(requeued, "Failed outbox entries requeued");
        }
        Ok(requeued)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Database, DbConfig};
    use std::sync::Mutex;

    /// Records events and refuses the ones of a given type.
    #[derive(Default)]
    struct RecordingSink {
        refuse: Option<&'static str>,
        seen: Mutex<Vec<String>>,
    }

    impl EventSink for RecordingSink {
        fn deliver(&self, event: &DomainEvent) -> Result<(), String> {
            if self.refuse == Some(event.event_type()) {
                return Err("collaborator unavailable".to_string());
            }
            if let Ok(mut seen) = self.seen.lock() {
                seen.push(event.event_type().to_string());
            }
            Ok(())
        }
    }

    async fn queue(db: &Database, events: Vec<DomainEvent>) {
        let mut conn = db.pool().acquire().await.unwrap();
        for event in events {
            OutboxRepository::append(&mut conn, &event).await.unwrap();
        }
    }

    fn approved(order_id: &str) -> DomainEvent {
        DomainEvent::OrderApproved {
            order_id: order_id.to_string(),
        }
    }

    #[tokio::test]
    async fn test_failed_delivery_is_parked() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        queue(
            &db,
            vec![
                approved("order-1"),
                DomainEvent::InvoiceLinesVoided {
                    order_id: "order-2".to_string(),
                },
            ],
        )
        .await;

        let dispatcher = OutboxDispatcher::new(db.outbox(), 10);
        let sink = RecordingSink {
            refuse: Some("INVOICE_LINES_VOIDED"),
            ..RecordingSink::default()
        };

        let report = dispatcher.dispatch_pending(&sink).await.unwrap();
        assert_eq!(report, DispatchReport { dispatched: 1, failed: 1 });
        assert_eq!(db.outbox().count_pending().await.unwrap(), 0);
        assert_eq!(db.outbox().count_failed().await.unwrap(), 1);

        // A healthy sink does not see the parked entry
        let report = dispatcher.dispatch_pending(&LoggingSink).await.unwrap();
        assert_eq!(report, DispatchReport::default());

        assert_eq!(dispatcher.requeue_failed().await.unwrap(), 1);
        let report = dispatcher.dispatch_pending(&LoggingSink).await.unwrap();
        assert_eq!(report.dispatched, 1);
        assert_eq!(db.outbox().count_pending().await.unwrap(), 0);
        assert_eq!(db.outbox().count_failed().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_refused_batch_does_not_block_later_events() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        queue(
            &db,
            vec![
                approved("order-1"),
                approved("order-2"),
                DomainEvent::OrderRejected {
                    order_id: "order-3".to_string(),
                    reason: "out of stock".to_string(),
                },
            ],
        )
        .await;

        // The whole first batch is refused
        let dispatcher = OutboxDispatcher::new(db.outbox(), 2);
        let sink = RecordingSink {
            refuse: Some("ORDER_APPROVED"),
            ..RecordingSink::default()
        };

        let report = dispatcher.dispatch_pending(&sink).await.unwrap();
        assert_eq!(report, DispatchReport { dispatched: 0, failed: 2 });

        let report = dispatcher.dispatch_pending(&sink).await.unwrap();
        assert_eq!(report, DispatchReport { dispatched: 1, failed: 0 });
        assert_eq!(*sink.seen.lock().unwrap(), vec!["ORDER_REJECTED".to_string()]);

        // Refused entries are not retried on their own
        let report = dispatcher.dispatch_pending(&sink).await.unwrap();
        assert_eq!(report, DispatchReport::default());

        let failed = db.outbox().list_failed(10).await.unwrap();
        assert_eq!(failed.len(), 2);
        assert!(failed.iter().all(|entry| entry.attempts == 1));
    }
}
