//! # Catalog Repository
//!
//! Source of truth for stores, store items, installment tiers and stock.
//!
//! ## Stock Mutations
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Conditional Stock Decrement                          │
//! │                                                                         │
//! │  UPDATE store_items                                                    │
//! │     SET total_stock = total_stock - :qty        (NULL stays NULL)      │
//! │   WHERE id = :item                                                     │
//! │     AND store_id = :store                                              │
//! │     AND is_active = 1 AND payment_mode = 'MONEY_ONLY'                  │
//! │     AND (total_stock IS NULL OR total_stock >= :qty)                   │
//! │                                                                         │
//! │  1 row  → reserved                                                     │
//! │  0 rows → re-read the item to say why (missing / other store /         │
//! │           not purchasable / insufficient stock)                        │
//! │                                                                         │
//! │  Two concurrent checkouts for the last unit: SQLite serializes the     │
//! │  writers, the second UPDATE sees stock 0 and matches nothing.          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Only checkout decrements; only rejection/cancellation increments.

use chrono::Utc;
use sqlx::{SqliteConnection, SqlitePool};
use tracing::{debug, info};
use uuid::Uuid;

use market_core::installments::{resolve_installment_options, resolve_max_installments, InstallmentOption};
use market_core::validation::{
    validate_commission_bps, validate_installment_rule, validate_name, validate_price_cents,
    validate_quantity, validate_stock,
};
use market_core::{
    CoreError, InstallmentRule, ItemPaymentMode, Money, SettlementBasis, Store, StoreItem,
    StoreType, ValidationError,
};

use crate::error::{DbError, DbResult, ServiceResult};

const STORE_SELECT: &str = r#"
    SELECT id, school_id, name, store_type, owner_id, commission_bps,
           settlement_basis, is_active, created_at, updated_at
    FROM stores
"#;

const ITEM_SELECT: &str = r#"
    SELECT id, store_id, name, category, price_cents, total_stock,
           is_active, payment_mode, created_at, updated_at
    FROM store_items
"#;

/// Fields for a new store.
#[derive(Debug, Clone)]
pub struct NewStore {
    pub school_id: String,
    pub name: String,
    pub store_type: StoreType,
    pub owner_id: Option<String>,
    pub commission_bps: u32,
    pub settlement_basis: SettlementBasis,
}

/// Fields for a new store item.
#[derive(Debug, Clone)]
pub struct NewStoreItem {
    pub store_id: String,
    pub name: String,
    pub category: String,
    pub price_cents: i64,
    pub total_stock: Option<i64>,
    pub payment_mode: ItemPaymentMode,
}

/// Repository for catalog database operations.
#[derive(Debug, Clone)]
pub struct CatalogRepository {
    pool: SqlitePool,
}

impl CatalogRepository {
    pub fn new(pool: SqlitePool) -> Self {
        CatalogRepository { pool }
    }

    // =========================================================================
    // Stores
    // =========================================================================

    /// Creates a store.
    ///
    /// THIRD_PARTY stores need an owner account; commission must be in
    /// `(0%, 100%]`.
    pub async fn insert_store(&self, new: NewStore) -> ServiceResult<Store> {
        validate_name("name", &new.name)?;
        validate_commission_bps(new.commission_bps)?;
        if new.store_type == StoreType::ThirdParty && new.owner_id.is_none() {
            return Err(ValidationError::required("owner_id").into());
        }

        let now = Utc::now();
        let store = Store {
            id: Uuid::new_v4().to_string(),
            school_id: new.school_id,
            name: new.name.trim().to_string(),
            store_type: new.store_type,
            owner_id: new.owner_id,
            commission_bps: new.commission_bps,
            settlement_basis: new.settlement_basis,
            is_active: true,
            created_at: now,
            updated_at: now,
        };

        sqlx::query(
            r#"
            INSERT INTO stores (
                id, school_id, name, store_type, owner_id, commission_bps,
                settlement_basis, is_active, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            "#,
        )
        .bind(&store.id)
        .bind(&store.school_id)
        .bind(&store.name)
        .bind(store.store_type)
        .bind(&store.owner_id)
        .bind(store.commission_bps)
        .bind(store.settlement_basis)
        .bind(store.is_active)
        .bind(store.created_at)
        .bind(store.updated_at)
        .execute(&self.pool)
        .await
        .map_err(DbError::from)?;

        info!(store_id = %store.id, store_type = ?store.store_type, "Store created");
        Ok(store)
    }

    /// Gets a store by ID, active or not.
    pub async fn get_store(&self, id: &str) -> DbResult<Option<Store>> {
        let store = sqlx::query_as::<_, Store>(&format!("{STORE_SELECT} WHERE id = ?1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(store)
    }

    /// Active THIRD_PARTY stores, the ones that settle.
    pub async fn list_active_third_party_stores(&self) -> DbResult<Vec<Store>> {
        let stores = sqlx::query_as::<_, Store>(&format!(
            "{STORE_SELECT} WHERE store_type = 'THIRD_PARTY' AND is_active = 1 ORDER BY created_at, id"
        ))
        .fetch_all(&self.pool)
        .await?;
        Ok(stores)
    }

    /// Soft-deactivates a store. Its orders stay resolvable.
    pub async fn deactivate_store(&self, id: &str) -> DbResult<()> {
        let result = sqlx::query("UPDATE stores SET is_active = 0, updated_at = ?2 WHERE id = ?1")
            .bind(id)
            .bind(Utc::now())
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Store", id));
        }
        info!(store_id = %id, "Store deactivated");
        Ok(())
    }

    /// Store lookup inside a transaction.
    pub async fn store_in(conn: &mut SqliteConnection, id: &str) -> DbResult<Option<Store>> {
        let store = sqlx::query_as::<_, Store>(&format!("{STORE_SELECT} WHERE id = ?1"))
            .bind(id)
            .fetch_optional(&mut *conn)
            .await?;
        Ok(store)
    }

    // =========================================================================
    // Items
    // =========================================================================

    pub async fn insert_item(&self, new: NewStoreItem) -> ServiceResult<StoreItem> {
        validate_name("name", &new.name)?;
        validate_price_cents(new.price_cents)?;
        validate_stock(new.total_stock)?;

        let now = Utc::now();
        let item = StoreItem {
            id: Uuid::new_v4().to_string(),
            store_id: new.store_id,
            name: new.name.trim().to_string(),
            category: new.category,
            price_cents: new.price_cents,
            total_stock: new.total_stock,
            is_active: true,
            payment_mode: new.payment_mode,
            created_at: now,
            updated_at: now,
        };

        sqlx::query(
            r#"
            INSERT INTO store_items (
                id, store_id, name, category, price_cents, total_stock,
                is_active, payment_mode, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            "#,
        )
        .bind(&item.id)
        .bind(&item.store_id)
        .bind(&item.name)
        .bind(&item.category)
        .bind(item.price_cents)
        .bind(item.total_stock)
        .bind(item.is_active)
        .bind(item.payment_mode)
        .bind(item.created_at)
        .bind(item.updated_at)
        .execute(&self.pool)
        .await
        .map_err(DbError::from)?;

        debug!(item_id = %item.id, store_id = %item.store_id, "Store item created");
        Ok(item)
    }

    /// Gets an item by ID.
    pub async fn get_item(&self, id: &str) -> DbResult<Option<StoreItem>> {
        let item = sqlx::query_as::<_, StoreItem>(&format!("{ITEM_SELECT} WHERE id = ?1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(item)
    }

    /// Items of a store, active first then by name.
    pub async fn list_items(&self, store_id: &str) -> DbResult<Vec<StoreItem>> {
        let items = sqlx::query_as::<_, StoreItem>(&format!(
            "{ITEM_SELECT} WHERE store_id = ?1 ORDER BY is_active DESC, name"
        ))
        .bind(store_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(items)
    }

    /// Changes the catalog price. Existing orders keep their snapshot.
    pub async fn update_price(&self, id: &str, price_cents: i64) -> ServiceResult<()> {
        validate_price_cents(price_cents)?;

        let result = sqlx::query("UPDATE store_items SET price_cents = ?2, updated_at = ?3 WHERE id = ?1")
            .bind(id)
            .bind(price_cents)
            .bind(Utc::now())
            .execute(&self.pool)
            .await
            .map_err(DbError::from)?;

        if result.rows_affected() == 0 {
            return Err(CoreError::StoreItemNotFound(id.to_string()).into());
        }
        Ok(())
    }

    /// Soft-deactivates an item. Order snapshots keep its name and price.
    pub async fn deactivate_item(&self, id: &str) -> DbResult<()> {
        let result = sqlx::query("UPDATE store_items SET is_active = 0, updated_at = ?2 WHERE id = ?1")
            .bind(id)
            .bind(Utc::now())
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("StoreItem", id));
        }
        Ok(())
    }

    /// Item lookup inside a transaction.
    pub async fn item_in(conn: &mut SqliteConnection, id: &str) -> DbResult<Option<StoreItem>> {
        let item = sqlx::query_as::<_, StoreItem>(&format!("{ITEM_SELECT} WHERE id = ?1"))
            .bind(id)
            .fetch_optional(&mut *conn)
            .await?;
        Ok(item)
    }

    // =========================================================================
    // Stock
    // =========================================================================

    /// Decrements stock by `quantity` unless that would go below zero.
    ///
    /// Unlimited items always succeed. Returns `InsufficientStock` (or the
    /// reason the item cannot be sold) without touching the row otherwise.
    pub async fn decrement_stock(&self, store_item_id: &str, quantity: i64) -> ServiceResult<()> {
        validate_quantity(quantity)?;
        let mut conn = self.pool.acquire().await.map_err(DbError::from)?;

        let item = Self::item_in(&mut conn, store_item_id)
            .await?
            .ok_or_else(|| CoreError::StoreItemNotFound(store_item_id.to_string()))?;

        if Self::try_decrement_stock(&mut conn, store_item_id, &item.store_id, quantity).await? {
            return Ok(());
        }
        Err(Self::explain_failed_decrement(&mut conn, store_item_id, &item.store_id, quantity)
            .await?
            .into())
    }

    /// Returns `quantity` units to stock (no-op for unlimited items).
    pub async fn increment_stock(&self, store_item_id: &str, quantity: i64) -> ServiceResult<()> {
        validate_quantity(quantity)?;
        let mut conn = self.pool.acquire().await.map_err(DbError::from)?;
        if !Self::increment_stock_in(&mut conn, store_item_id, quantity).await? {
            return Err(CoreError::StoreItemNotFound(store_item_id.to_string()).into());
        }
        Ok(())
    }

    /// The conditional decrement. `true` when the row was updated.
    pub async fn try_decrement_stock(
        conn: &mut SqliteConnection,
        store_item_id: &str,
        store_id: &str,
        quantity: i64,
    ) -> DbResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE store_items SET
                total_stock = total_stock - ?3,
                updated_at = ?4
            WHERE id = ?1
              AND store_id = ?2
              AND is_active = 1
              AND payment_mode = 'MONEY_ONLY'
              AND (total_stock IS NULL OR total_stock >= ?3)
            "#,
        )
        .bind(store_item_id)
        .bind(store_id)
        .bind(quantity)
        .bind(Utc::now())
        .execute(&mut *conn)
        .await?;

        debug!(
            item_id = %store_item_id,
            quantity,
            reserved = result.rows_affected() == 1,
            "Conditional stock decrement"
        );
        Ok(result.rows_affected() == 1)
    }

    /// Adds stock back. `true` when the item exists.
    pub async fn increment_stock_in(
        conn: &mut SqliteConnection,
        store_item_id: &str,
        quantity: i64,
    ) -> DbResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE store_items SET
                total_stock = total_stock + ?2,
                updated_at = ?3
            WHERE id = ?1
            "#,
        )
        .bind(store_item_id)
        .bind(quantity)
        .bind(Utc::now())
        .execute(&mut *conn)
        .await?;

        debug!(item_id = %store_item_id, quantity, "Stock restored");
        Ok(result.rows_affected() == 1)
    }

    /// Works out why a conditional decrement matched no row.
    pub async fn explain_failed_decrement(
        conn: &mut SqliteConnection,
        store_item_id: &str,
        store_id: &str,
        quantity: i64,
    ) -> DbResult<CoreError> {
        let Some(item) = Self::item_in(conn, store_item_id).await? else {
            return Ok(CoreError::StoreItemNotFound(store_item_id.to_string()));
        };

        if item.store_id != store_id {
            return Ok(CoreError::ItemNotInStore {
                store_item_id: store_item_id.to_string(),
                store_id: store_id.to_string(),
            });
        }

        if !item.is_active {
            return Ok(CoreError::ItemNotPurchasable {
                store_item_id: item.id,
                reason: "item is no longer available".to_string(),
            });
        }

        if item.payment_mode != ItemPaymentMode::MoneyOnly {
            return Ok(CoreError::ItemNotPurchasable {
                store_item_id: item.id,
                reason: "item is redeemable with points only".to_string(),
            });
        }

        Ok(CoreError::InsufficientStock {
            store_item_id: item.id,
            available: item.total_stock.unwrap_or(0),
            requested: quantity,
        })
    }

    // =========================================================================
    // Installment Tiers
    // =========================================================================

    /// Adds a tier. Tiers are unique per store by minimum amount.
    pub async fn insert_rule(
        &self,
        store_id: &str,
        min_amount_cents: i64,
        max_installments: u32,
    ) -> ServiceResult<InstallmentRule> {
        validate_installment_rule(min_amount_cents, max_installments)?;

        let rule = InstallmentRule {
            id: Uuid::new_v4().to_string(),
            store_id: store_id.to_string(),
            min_amount_cents,
            max_installments,
            created_at: Utc::now(),
        };

        let inserted = sqlx::query(
            r#"
            INSERT INTO installment_rules (id, store_id, min_amount_cents, max_installments, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
        )
        .bind(&rule.id)
        .bind(&rule.store_id)
        .bind(rule.min_amount_cents)
        .bind(rule.max_installments)
        .bind(rule.created_at)
        .execute(&self.pool)
        .await
        .map_err(DbError::from);

        match inserted {
            Ok(_) => Ok(rule),
            Err(e) if e.is_unique_violation_on("installment_rules") => Err(ValidationError::Duplicate {
                field: "min_amount".to_string(),
                value: min_amount_cents.to_string(),
            }
            .into()),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn list_rules(&self, store_id: &str) -> DbResult<Vec<InstallmentRule>> {
        let rules = sqlx::query_as::<_, InstallmentRule>(
            r#"
            SELECT id, store_id, min_amount_cents, max_installments, created_at
            FROM installment_rules
            WHERE store_id = ?1
            ORDER BY min_amount_cents
            "#,
        )
        .bind(store_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rules)
    }

    /// Tiers inside a transaction.
    pub async fn installment_rules_in(
        conn: &mut SqliteConnection,
        store_id: &str,
    ) -> DbResult<Vec<InstallmentRule>> {
        let rules = sqlx::query_as::<_, InstallmentRule>(
            r#"
            SELECT id, store_id, min_amount_cents, max_installments, created_at
            FROM installment_rules
            WHERE store_id = ?1
            "#,
        )
        .bind(store_id)
        .fetch_all(&mut *conn)
        .await?;
        Ok(rules)
    }

    pub async fn remove_installment_rule(&self, rule_id: &str) -> DbResult<()> {
        let result = sqlx::query("DELETE FROM installment_rules WHERE id = ?1")
            .bind(rule_id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(DbError::not_found("InstallmentRule", rule_id));
        }
        Ok(())
    }

    /// Maximum installment count the store allows for `amount`.
    pub async fn resolve_max_installments(&self, store_id: &str, amount: Money) -> DbResult<u32> {
        let rules = self.list_rules(store_id).await?;
        Ok(resolve_max_installments(&rules, amount))
    }

    /// Installment choices the store offers for `amount`.
    pub async fn installment_options(&self, store_id: &str, amount: Money) -> DbResult<Vec<InstallmentOption>> {
        let rules = self.list_rules(store_id).await?;
        Ok(resolve_installment_options(&rules, amount))
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ServiceError;
    use crate::pool::{Database, DbConfig};

    async fn setup() -> (Database, Store) {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let store = db
            .catalog()
            .insert_store(NewStore {
                school_id: "school-1".to_string(),
                name: "Papelaria Central".to_string(),
                store_type: StoreType::ThirdParty,
                owner_id: Some("owner-1".to_string()),
                commission_bps: 1000,
                settlement_basis: SettlementBasis::Delivered,
            })
            .await
            .unwrap();
        (db, store)
    }

    async fn item(db: &Database, store_id: &str, stock: Option<i64>) -> StoreItem {
        db.catalog()
            .insert_item(NewStoreItem {
                store_id: store_id.to_string(),
                name: "Caderno".to_string(),
                category: "Papelaria".to_string(),
                price_cents: 5000,
                total_stock: stock,
                payment_mode: ItemPaymentMode::MoneyOnly,
            })
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_store_round_trip() {
        let (db, store) = setup().await;
        let fetched = db.catalog().get_store(&store.id).await.unwrap().unwrap();
        assert_eq!(fetched.name, "Papelaria Central");
        assert!(fetched.is_third_party());
        assert_eq!(fetched.settlement_basis, SettlementBasis::Delivered);

        db.catalog().deactivate_store(&store.id).await.unwrap();
        let fetched = db.catalog().get_store(&store.id).await.unwrap().unwrap();
        assert!(!fetched.is_active);
        assert!(db.catalog().list_active_third_party_stores().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_third_party_store_requires_owner() {
        let (db, _) = setup().await;
        let result = db
            .catalog()
            .insert_store(NewStore {
                school_id: "school-1".to_string(),
                name: "Sem dono".to_string(),
                store_type: StoreType::ThirdParty,
                owner_id: None,
                commission_bps: 1000,
                settlement_basis: SettlementBasis::Delivered,
            })
            .await;
        assert!(matches!(result, Err(ServiceError::Core(CoreError::Validation(_)))));
    }

    #[tokio::test]
    async fn test_decrement_within_stock() {
        let (db, store) = setup().await;
        let it = item(&db, &store.id, Some(3)).await;

        db.catalog().decrement_stock(&it.id, 2).await.unwrap();
        let after = db.catalog().get_item(&it.id).await.unwrap().unwrap();
        assert_eq!(after.total_stock, Some(1));
    }

    #[tokio::test]
    async fn test_decrement_beyond_stock_leaves_row_untouched() {
        let (db, store) = setup().await;
        let it = item(&db, &store.id, Some(3)).await;

        let err = db.catalog().decrement_stock(&it.id, 4).await.unwrap_err();
        assert!(matches!(
            err,
            ServiceError::Core(CoreError::InsufficientStock {
                available: 3,
                requested: 4,
                ..
            })
        ));
        let after = db.catalog().get_item(&it.id).await.unwrap().unwrap();
        assert_eq!(after.total_stock, Some(3));
    }

    #[tokio::test]
    async fn test_unlimited_stock_always_succeeds() {
        let (db, store) = setup().await;
        let it = item(&db, &store.id, None).await;

        db.catalog().decrement_stock(&it.id, 999).await.unwrap();
        db.catalog().increment_stock(&it.id, 5).await.unwrap();
        let after = db.catalog().get_item(&it.id).await.unwrap().unwrap();
        assert!(after.is_unlimited());
    }

    #[tokio::test]
    async fn test_inactive_item_cannot_be_decremented() {
        let (db, store) = setup().await;
        let it = item(&db, &store.id, Some(3)).await;
        db.catalog().deactivate_item(&it.id).await.unwrap();

        let err = db.catalog().decrement_stock(&it.id, 1).await.unwrap_err();
        assert!(matches!(
            err,
            ServiceError::Core(CoreError::ItemNotPurchasable { .. })
        ));
    }

    #[tokio::test]
    async fn test_installment_rules() {
        let (db, store) = setup().await;
        db.catalog().insert_rule(&store.id, 0, 1).await.unwrap();
        db.catalog().insert_rule(&store.id, 10000, 6).await.unwrap();
        db.catalog().insert_rule(&store.id, 50000, 10).await.unwrap();

        let duplicate = db.catalog().insert_rule(&store.id, 10000, 3).await;
        assert!(matches!(
            duplicate,
            Err(ServiceError::Core(CoreError::Validation(ValidationError::Duplicate { .. })))
        ));
        assert!(db.catalog().insert_rule(&store.id, 0, 0).await.is_err());

        let max = db
            .catalog()
            .resolve_max_installments(&store.id, Money::from_cents(12000))
            .await
            .unwrap();
        assert_eq!(max, 6);

        let options = db
            .catalog()
            .installment_options(&store.id, Money::from_cents(12000))
            .await
            .unwrap();
        assert_eq!(options.len(), 5);
        assert_eq!(options.last().map(|o| o.installments), Some(6));

        let none = db
            .catalog()
            .resolve_max_installments(&store.id, Money::from_cents(9999))
            .await
            .unwrap();
        assert_eq!(none, 1);
    }
}
