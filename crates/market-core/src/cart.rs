//! # Cart Aggregate
//!
//! The buyer's shopping cart as an explicit value object.
//!
//! ## Cart Operations Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Cart Operations                                      │
//! │                                                                         │
//! │  Buyer Action             Method                  Cart Change           │
//! │  ────────────             ──────                  ───────────           │
//! │                                                                         │
//! │  Add item (same store) ──► add_item() ──────────► push / qty += n       │
//! │                                                                         │
//! │  Add item (other store) ─► add_item() ──────────► CartStoreMismatch     │
//! │                         └► replace_store_and_add() ► clear + push       │
//! │                                                                         │
//! │  Change quantity ────────► update_quantity() ───► qty = n (0 removes)   │
//! │                                                                         │
//! │  Remove ─────────────────► remove_item() ───────► retain                │
//! │                                                                         │
//! │  Checkout ───────────────► to_checkout_lines() ─► [{id, qty}]           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Invariants
//! - Every line belongs to the same store (`store_id`)
//! - Lines are unique by store item id (adding again increases quantity)
//! - Quantity per line is `1..=MAX_ITEM_QUANTITY`
//! - At most `MAX_CART_ITEMS` lines
//!
//! Totals are for display. Checkout never trusts them: it recomputes from
//! the catalog inside the transaction.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::error::{CoreError, CoreResult};
use crate::money::Money;
use crate::types::StoreItem;
use crate::validation::{validate_price_cents, validate_quantity};
use crate::{MAX_CART_ITEMS, MAX_ITEM_QUANTITY};

/// A line of the cart.
///
/// Name and price are frozen when the line is added so the cart renders
/// consistently; checkout re-reads both from the catalog.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct CartItem {
    pub store_item_id: String,
    pub name: String,
    pub unit_price_cents: i64,
    pub quantity: i64,
    #[ts(as = "String")]
    pub added_at: DateTime<Utc>,
}

impl CartItem {
    fn from_store_item(item: &StoreItem, quantity: i64) -> Self {
        CartItem {
            store_item_id: item.id.clone(),
            name: item.name.clone(),
            unit_price_cents: item.price_cents,
            quantity,
            added_at: Utc::now(),
        }
    }

    /// Unit price × quantity.
    pub fn line_total(&self) -> Money {
        Money::from_cents(self.unit_price_cents).multiply_quantity(self.quantity)
    }
}

/// A `{store_item_id, quantity}` pair sent to checkout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutLine {
    pub store_item_id: String,
    pub quantity: i64,
}

impl CheckoutLine {
    pub fn new(store_item_id: impl Into<String>, quantity: i64) -> Self {
        CheckoutLine {
            store_item_id: store_item_id.into(),
            quantity,
        }
    }
}

/// The shopping cart.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct Cart {
    /// Store every line belongs to; `None` while empty.
    pub store_id: Option<String>,
    pub items: Vec<CartItem>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

impl Cart {
    pub fn new() -> Self {
        Cart {
            store_id: None,
            items: Vec::new(),
            created_at: Utc::now(),
        }
    }

    /// Adds an item or increases its quantity.
    ///
    /// ## Errors
    /// - `CartStoreMismatch` if the cart holds another store's items
    /// - `ItemNotPurchasable` for inactive or points-only items
    /// - `QuantityTooLarge` / `CartTooLarge` past the limits
    pub fn add_item(&mut self, item: &StoreItem, quantity: i64) -> CoreResult<()> {
        validate_quantity(quantity)?;
        ensure_purchasable(item)?;

        if let Some(cart_store_id) = &self.store_id {
            if cart_store_id != &item.store_id {
                return Err(CoreError::CartStoreMismatch {
                    cart_store_id: cart_store_id.clone(),
                    item_store_id: item.store_id.clone(),
                });
            }
        }

        if let Some(line) = self.items.iter_mut().find(|l| l.store_item_id == item.id) {
            let new_qty = line.quantity + quantity;
            if new_qty > MAX_ITEM_QUANTITY {
                return Err(CoreError::QuantityTooLarge {
                    requested: new_qty,
                    max: MAX_ITEM_QUANTITY,
                });
            }
            line.quantity = new_qty;
            return Ok(());
        }

        if self.items.len() >= MAX_CART_ITEMS {
            return Err(CoreError::CartTooLarge { max: MAX_CART_ITEMS });
        }

        self.store_id = Some(item.store_id.clone());
        self.items.push(CartItem::from_store_item(item, quantity));
        Ok(())
    }

    /// Empties the cart, then adds `item`. Used when the buyer confirms
    /// switching stores.
    pub fn replace_store_and_add(&mut self, item: &StoreItem, quantity: i64) -> CoreResult<()> {
        validate_quantity(quantity)?;
        ensure_purchasable(item)?;
        self.clear();
        self.add_item(item, quantity)
    }

    /// Sets a line's quantity; zero removes the line.
    pub fn update_quantity(&mut self, store_item_id: &str, quantity: i64) -> CoreResult<()> {
        if quantity == 0 {
            return self.remove_item(store_item_id);
        }
        validate_quantity(quantity)?;

        let line = self
            .items
            .iter_mut()
            .find(|l| l.store_item_id == store_item_id)
            .ok_or_else(|| CoreError::CartItemMissing(store_item_id.to_string()))?;
        line.quantity = quantity;
        Ok(())
    }

    pub fn remove_item(&mut self, store_item_id: &str) -> CoreResult<()> {
        let initial_len = self.items.len();
        self.items.retain(|l| l.store_item_id != store_item_id);

        if self.items.len() == initial_len {
            return Err(CoreError::CartItemMissing(store_item_id.to_string()));
        }
        if self.items.is_empty() {
            self.store_id = None;
        }
        Ok(())
    }

    pub fn clear(&mut self) {
        self.items.clear();
        self.store_id = None;
        self.created_at = Utc::now();
    }

    pub fn item_count(&self) -> usize {
        self.items.len()
    }

    pub fn total_quantity(&self) -> i64 {
        self.items.iter().map(|l| l.quantity).sum()
    }

    /// Display total from the frozen line prices.
    pub fn total(&self) -> Money {
        self.items.iter().map(CartItem::line_total).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Lines for a checkout request. Prices are deliberately left out.
    pub fn to_checkout_lines(&self) -> Vec<CheckoutLine> {
        self.items
            .iter()
            .map(|l| CheckoutLine::new(l.store_item_id.clone(), l.quantity))
            .collect()
    }
}

impl Default for Cart {
    fn default() -> Self {
        Self::new()
    }
}

/// Cart totals summary for API responses.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct CartTotals {
    pub item_count: usize,
    pub total_quantity: i64,
    pub total_cents: i64,
}

impl From<&Cart> for CartTotals {
    fn from(cart: &Cart) -> Self {
        CartTotals {
            item_count: cart.item_count(),
            total_quantity: cart.total_quantity(),
            total_cents: cart.total().cents(),
        }
    }
}

fn ensure_purchasable(item: &StoreItem) -> CoreResult<()> {
    validate_price_cents(item.price_cents)?;
    if item.is_purchasable() {
        return Ok(());
    }
    let reason = if item.is_active {
        "item is redeemable with points only"
    } else {
        "item is no longer available"
    };
    Err(CoreError::ItemNotPurchasable {
        store_item_id: item.id.clone(),
        reason: reason.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ItemPaymentMode;

    fn store_item(id: &str, store_id: &str, price_cents: i64) -> StoreItem {
        StoreItem {
            id: id.to_string(),
            store_id: store_id.to_string(),
            name: format!("Item {id}"),
            category: "Papelaria".to_string(),
            price_cents,
            total_stock: None,
            is_active: true,
            payment_mode: ItemPaymentMode::MoneyOnly,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_cart_add_item() {
        let mut cart = Cart::new();
        cart.add_item(&store_item("1", "s-1", 999), 2).unwrap();

        assert_eq!(cart.item_count(), 1);
        assert_eq!(cart.total_quantity(), 2);
        assert_eq!(cart.total().cents(), 1998);
        assert_eq!(cart.store_id.as_deref(), Some("s-1"));
    }

    #[test]
    fn test_cart_add_same_item_increases_quantity() {
        let mut cart = Cart::new();
        let item = store_item("1", "s-1", 999);

        cart.add_item(&item, 2).unwrap();
        cart.add_item(&item, 3).unwrap();

        assert_eq!(cart.item_count(), 1);
        assert_eq!(cart.total_quantity(), 5);
    }

    #[test]
    fn test_cart_rejects_other_store() {
        let mut cart = Cart::new();
        cart.add_item(&store_item("1", "s-1", 999), 1).unwrap();

        let err = cart.add_item(&store_item("2", "s-2", 500), 1).unwrap_err();
        assert!(matches!(err, CoreError::CartStoreMismatch { .. }));
        assert_eq!(cart.item_count(), 1);
    }

    #[test]
    fn test_cart_replace_store() {
        let mut cart = Cart::new();
        cart.add_item(&store_item("1", "s-1", 999), 1).unwrap();
        cart.replace_store_and_add(&store_item("2", "s-2", 500), 3)
            .unwrap();

        assert_eq!(cart.store_id.as_deref(), Some("s-2"));
        assert_eq!(cart.to_checkout_lines(), vec![CheckoutLine::new("2", 3)]);
    }

    #[test]
    fn test_cart_rejects_unpurchasable_items() {
        let mut cart = Cart::new();
        let mut points = store_item("1", "s-1", 100);
        points.payment_mode = ItemPaymentMode::PointsOnly;
        let mut inactive = store_item("2", "s-1", 100);
        inactive.is_active = false;

        assert!(matches!(
            cart.add_item(&points, 1),
            Err(CoreError::ItemNotPurchasable { .. })
        ));
        assert!(cart.add_item(&inactive, 1).is_err());
        assert!(cart.is_empty());
        assert!(cart.store_id.is_none());
    }

    #[test]
    fn test_cart_rejects_price_past_limit() {
        let mut cart = Cart::new();
        let item = store_item("1", "s-1", i64::MAX / 2);

        assert!(matches!(cart.add_item(&item, 3), Err(CoreError::Validation(_))));
        assert!(cart.is_empty());
    }

    #[test]
    fn test_cart_quantity_limits() {
        let mut cart = Cart::new();
        let item = store_item("1", "s-1", 100);

        assert!(cart.add_item(&item, 0).is_err());
        cart.add_item(&item, MAX_ITEM_QUANTITY).unwrap();
        assert!(matches!(
            cart.add_item(&item, 1),
            Err(CoreError::QuantityTooLarge { .. })
        ));
    }

    #[test]
    fn test_cart_update_and_remove() {
        let mut cart = Cart::new();
        cart.add_item(&store_item("1", "s-1", 100), 1).unwrap();

        cart.update_quantity("1", 7).unwrap();
        assert_eq!(cart.total_quantity(), 7);
        assert!(matches!(
            cart.update_quantity("missing", 1),
            Err(CoreError::CartItemMissing(_))
        ));

        cart.update_quantity("1", 0).unwrap();
        assert!(cart.is_empty());
        assert!(cart.store_id.is_none());
    }

    #[test]
    fn test_cart_max_lines() {
        let mut cart = Cart::new();
        for i in 0..MAX_CART_ITEMS {
            cart.add_item(&store_item(&i.to_string(), "s-1", 100), 1)
                .unwrap();
        }
        assert!(matches!(
            cart.add_item(&store_item("overflow", "s-1", 100), 1),
            Err(CoreError::CartTooLarge { .. })
        ));
    }

    #[test]
    fn test_cart_totals() {
        let mut cart = Cart::new();
        cart.add_item(&store_item("1", "s-1", 5000), 2).unwrap();
        let totals = CartTotals::from(&cart);
        assert_eq!(totals.total_cents, 10000);
        assert_eq!(totals.item_count, 1);
    }
}
