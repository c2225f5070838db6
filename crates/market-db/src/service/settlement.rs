//! # Settlement Engine
//!
//! Rolls a third-party store's monthly sales into a settlement and drives the
//! settlement's payout status.
//!
//! ## Generation Transaction
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  generate(store, year, month)                                          │
//! │                                                                         │
//! │  BEGIN                                                                  │
//! │  1. DELETE FAILED/CANCELLED row for the period   ← write lock first    │
//! │  2. Store must be THIRD_PARTY          else NotSettleable              │
//! │  3. Live row for the period?           yes → AlreadySettled            │
//! │  4. Σ qualifying orders in [month start, next month start)             │
//! │     basis DELIVERED → delivered_at, basis APPROVED → approved_at       │
//! │  5. compute_settlement(total, commission, platform fee)                │
//! │     └── deductions > total → NegativeTransfer                          │
//! │  6. INSERT (UNIQUE store/year/month → AlreadySettled)                  │
//! │  7. Outbox: SettlementGenerated                                        │
//! │  COMMIT                                                                 │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::sync::Arc;

use chrono::Utc;
use sqlx::SqlitePool;
use tracing::{debug, info, warn};
use uuid::Uuid;

use market_core::settlement::{compute_settlement, month_bounds};
use market_core::validation::validate_reason;
use market_core::{CoreError, DomainEvent, Money, Settlement, SettlementAction, SettlementStatus};

use crate::error::{DbError, ServiceError, ServiceResult};
use crate::pool::Database;
use crate::repository::catalog::CatalogRepository;
use crate::repository::outbox::OutboxRepository;
use crate::repository::settlement::SettlementRepository;
use crate::service::collaborators::PlatformSettings;

/// Outcome of a batch run over every settleable store.
#[derive(Debug, Default)]
pub struct SettlementRun {
    pub generated: Vec<Settlement>,
    /// Stores whose period was already settled.
    pub skipped: Vec<String>,
    /// Stores that failed, with the error.
    pub failed: Vec<(String, ServiceError)>,
}

/// Generates settlements and moves them through payout.
#[derive(Clone)]
pub struct SettlementEngine {
    pool: SqlitePool,
    catalog: CatalogRepository,
    settlements: SettlementRepository,
    platform: Arc<dyn PlatformSettings>,
}

impl SettlementEngine {
    pub fn new(db: &Database, platform: Arc<dyn PlatformSettings>) -> Self {
        SettlementEngine {
            pool: db.pool().clone(),
            catalog: db.catalog(),
            settlements: db.settlements(),
            platform,
        }
    }

    /// Generates the settlement of one store for one calendar month.
    pub async fn generate(&self, store_id: &str, year: i32, month: u32) -> ServiceResult<Settlement> {
        let (start, end) = month_bounds(year, month)?;
        let platform_fee = self.platform.platform_fee();
        let already_settled = || CoreError::AlreadySettled {
            store_id: store_id.to_string(),
            year,
            month,
        };

        let mut tx = self.pool.begin().await?;

        let replaced = SettlementRepository::delete_regenerable_in(&mut tx, store_id, year, month).await?;
        if replaced > 0 {
            debug!(store_id = %store_id, year, month, "Replacing failed settlement");
        }

        let store = CatalogRepository::store_in(&mut tx, store_id)
            .await?
            .ok_or_else(|| CoreError::StoreNotFound(store_id.to_string()))?;
        if !store.is_third_party() {
            return Err(CoreError::NotSettleable {
                store_id: store_id.to_string(),
            }
            .into());
        }

        if SettlementRepository::period_in(&mut tx, store_id, year, month)
            .await?
            .is_some()
        {
            return Err(already_settled().into());
        }

        let sales =
            SettlementRepository::aggregate_sales_in(&mut tx, store_id, store.settlement_basis, start, end)
                .await?;
        let breakdown = compute_settlement(
            Money::from_cents(sales.total_cents),
            store.commission_rate(),
            platform_fee,
        )?;

        let now = Utc::now();
        let settlement = Settlement {
            id: Uuid::new_v4().to_string(),
            store_id: store.id.clone(),
            year,
            month,
            order_count: sales.order_count,
            total_sales_cents: breakdown.total_sales.cents(),
            commission_bps: store.commission_bps,
            platform_fee_bps: platform_fee.bps(),
            commission_cents: breakdown.commission.cents(),
            platform_fee_cents: breakdown.platform_fee.cents(),
            transfer_cents: breakdown.transfer.cents(),
            status: SettlementStatus::Pending,
            failure_reason: None,
            transferred_at: None,
            created_at: now,
            updated_at: now,
        };

        match SettlementRepository::insert_in(&mut tx, &settlement).await {
            Ok(()) => {}
            Err(err) if err.is_unique_violation_on("settlements") => {
                return Err(already_settled().into());
            }
            Err(err) => return Err(err.into()),
        }

        OutboxRepository::append(
            &mut tx,
            &DomainEvent::SettlementGenerated {
                settlement_id: settlement.id.clone(),
                store_id: settlement.store_id.clone(),
                year,
                month,
                transfer_cents: settlement.transfer_cents,
            },
        )
        .await?;

        tx.commit().await.map_err(DbError::from)?;

        info!(
            settlement_id = %settlement.id,
            store_id = %settlement.store_id,
            year,
            month,
            orders = settlement.order_count,
            total_sales_cents = settlement.total_sales_cents,
            transfer_cents = settlement.transfer_cents,
            "Settlement generated"
        );
        Ok(settlement)
    }

    /// Generates the period for every active third-party store.
    ///
    /// Already-settled stores are skipped; other failures are collected and
    /// do not stop the run.
    pub async fn generate_for_period(&self, year: i32, month: u32) -> ServiceResult<SettlementRun> {
        month_bounds(year, month)?;

        let mut run = SettlementRun::default();
        for store in self.catalog.list_active_third_party_stores().await? {
            match self.generate(&store.id, year, month).await {
                Ok(settlement) => run.generated.push(settlement),
                Err(ServiceError::Core(CoreError::AlreadySettled { .. })) => {
                    warn!(store_id = %store.id, year, month, "Period already settled, skipping");
                    run.skipped.push(store.id);
                }
                Err(err) => {
                    warn!(store_id = %store.id, year, month, error = %err, "Settlement failed");
                    run.failed.push((store.id, err));
                }
            }
        }

        info!(
            year,
            month,
            generated = run.generated.len(),
            skipped = run.skipped.len(),
            failed = run.failed.len(),
            "Settlement run finished"
        );
        Ok(run)
    }

    // =========================================================================
    // Reads
    // =========================================================================

    pub async fn get_settlement(&self, settlement_id: &str) -> ServiceResult<Settlement> {
        self.settlements
            .get_settlement(settlement_id)
            .await?
            .ok_or_else(|| CoreError::SettlementNotFound(settlement_id.to_string()).into())
    }

    pub async fn get_settlement_for_period(
        &self,
        store_id: &str,
        year: i32,
        month: u32,
    ) -> ServiceResult<Option<Settlement>> {
        Ok(self.settlements.get_for_period(store_id, year, month).await?)
    }

    pub async fn list_for_store(&self, store_id: &str) -> ServiceResult<Vec<Settlement>> {
        Ok(self.settlements.list_for_store(store_id).await?)
    }

    /// Every store's settlement for a month, optionally by status. The
    /// back office works the payout queue from this list.
    pub async fn list_for_period(
        &self,
        year: i32,
        month: u32,
        status: Option<SettlementStatus>,
    ) -> ServiceResult<Vec<Settlement>> {
        Ok(self.settlements.list_for_period(year, month, status).await?)
    }

    // =========================================================================
    // Payout status
    // =========================================================================

    pub async fn approve(&self, settlement_id: &str) -> ServiceResult<Settlement> {
        self.apply(settlement_id, SettlementAction::Approve, None).await
    }

    pub async fn start_processing(&self, settlement_id: &str) -> ServiceResult<Settlement> {
        self.apply(settlement_id, SettlementAction::StartProcessing, None)
            .await
    }

    /// Money reached the store owner.
    pub async fn mark_transferred(&self, settlement_id: &str) -> ServiceResult<Settlement> {
        self.apply(settlement_id, SettlementAction::MarkTransferred, None)
            .await
    }

    /// Payout failed. The period can be generated again afterwards.
    pub async fn fail(&self, settlement_id: &str, reason: &str) -> ServiceResult<Settlement> {
        let reason = validate_reason(reason)?;
        self.apply(settlement_id, SettlementAction::Fail, Some(&reason))
            .await
    }

    pub async fn cancel(&self, settlement_id: &str) -> ServiceResult<Settlement> {
        self.apply(settlement_id, SettlementAction::Cancel, None).await
    }

    async fn apply(
        &self,
        settlement_id: &str,
        action: SettlementAction,
        failure_reason: Option<&str>,
    ) -> ServiceResult<Settlement> {
        let mut tx = self.pool.begin().await?;

        let moved =
            SettlementRepository::update_status_in(&mut tx, settlement_id, action, failure_reason).await?;

        let settlement = SettlementRepository::settlement_in(&mut tx, settlement_id)
            .await?
            .ok_or_else(|| CoreError::SettlementNotFound(settlement_id.to_string()))?;

        if !moved {
            warn!(
                settlement_id = %settlement_id,
                current = %settlement.status,
                attempted = %action,
                "Rejected settlement transition"
            );
            return Err(CoreError::InvalidSettlementTransition {
                settlement_id: settlement_id.to_string(),
                current: settlement.status,
                attempted: action,
            }
            .into());
        }

        if action == SettlementAction::MarkTransferred {
            OutboxRepository::append(
                &mut tx,
                &DomainEvent::SettlementTransferred {
                    settlement_id: settlement.id.clone(),
                    store_id: settlement.store_id.clone(),
                    transfer_cents: settlement.transfer_cents,
                },
            )
            .await?;
        }

        tx.commit().await.map_err(DbError::from)?;

        info!(
            settlement_id = %settlement.id,
            action = %action,
            status = %settlement.status,
            "Settlement transitioned"
        );
        Ok(settlement)
    }
}
