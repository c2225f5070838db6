//! # Validation Module
//!
//! Input validation for the marketplace core.
//!
//! ## Validation Strategy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Validation Layers                                  │
//! │                                                                         │
//! │  Layer 1: Client (cart aggregate)                                      │
//! │  ├── Quantity and single-store checks                                  │
//! │  └── Immediate buyer feedback                                          │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 2: Services (market-db)                                         │
//! │  ├── Payment plan parsing (TryFrom)                                    │
//! │  └── THIS MODULE: field rules, re-checked server side                  │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 3: Database (SQLite)                                            │
//! │  ├── CHECK constraints                                                 │
//! │  ├── UNIQUE (order_number, tier per store, period key)                 │
//! │  └── Foreign key constraints                                           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Utc};

use crate::error::ValidationError;
use crate::types::Rate;
use crate::{MAX_ITEM_QUANTITY, MAX_PRICE_CENTS};

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Maximum length of rejection/cancellation reasons and order notes.
pub const MAX_REASON_LEN: usize = 500;

/// Maximum length of store and item names.
pub const MAX_NAME_LEN: usize = 200;

// =============================================================================
// String Validators
// =============================================================================

/// Validates a display name (store or item).
///
/// ## Example
/// ```rust
/// use market_core::validation::validate_name;
///
/// assert!(validate_name("name", "Caderno 96 folhas").is_ok());
/// assert!(validate_name("name", "  ").is_err());
/// ```
pub fn validate_name(field: &str, name: &str) -> ValidationResult<()> {
    let name = name.trim();

    if name.is_empty() {
        return Err(ValidationError::required(field));
    }

    if name.chars().count() > MAX_NAME_LEN {
        return Err(ValidationError::TooLong {
            field: field.to_string(),
            max: MAX_NAME_LEN,
        });
    }

    Ok(())
}

/// Validates a rejection or cancellation reason.
///
/// ## Returns
/// The trimmed reason.
pub fn validate_reason(reason: &str) -> ValidationResult<String> {
    let reason = reason.trim();

    if reason.is_empty() {
        return Err(ValidationError::required("reason"));
    }

    if reason.chars().count() > MAX_REASON_LEN {
        return Err(ValidationError::TooLong {
            field: "reason".to_string(),
            max: MAX_REASON_LEN,
        });
    }

    Ok(reason.to_string())
}

/// Normalizes optional order notes: blank becomes `None`.
pub fn normalize_notes(notes: Option<&str>) -> ValidationResult<Option<String>> {
    match notes.map(str::trim) {
        None | Some("") => Ok(None),
        Some(n) if n.chars().count() > MAX_REASON_LEN => Err(ValidationError::TooLong {
            field: "notes".to_string(),
            max: MAX_REASON_LEN,
        }),
        Some(n) => Ok(Some(n.to_string())),
    }
}

// =============================================================================
// Numeric Validators
// =============================================================================

/// Validates a line quantity.
///
/// ## Rules
/// - Must be positive (> 0)
/// - Must not exceed MAX_ITEM_QUANTITY (999)
pub fn validate_quantity(qty: i64) -> ValidationResult<()> {
    if qty <= 0 {
        return Err(ValidationError::MustBePositive {
            field: "quantity".to_string(),
        });
    }

    if qty > MAX_ITEM_QUANTITY {
        return Err(ValidationError::OutOfRange {
            field: "quantity".to_string(),
            min: 1,
            max: MAX_ITEM_QUANTITY,
        });
    }

    Ok(())
}

/// Validates a price in cents. Zero is allowed (free items).
///
/// ## Example
/// ```rust
/// use market_core::validation::validate_price_cents;
/// use market_core::MAX_PRICE_CENTS;
///
/// assert!(validate_price_cents(1099).is_ok());
/// assert!(validate_price_cents(0).is_ok());
/// assert!(validate_price_cents(-100).is_err());
/// assert!(validate_price_cents(MAX_PRICE_CENTS + 1).is_err());
/// ```
pub fn validate_price_cents(cents: i64) -> ValidationResult<()> {
    if !(0..=MAX_PRICE_CENTS).contains(&cents) {
        return Err(ValidationError::OutOfRange {
            field: "price".to_string(),
            min: 0,
            max: MAX_PRICE_CENTS,
        });
    }

    Ok(())
}

/// Validates an initial stock figure; `None` is unlimited.
pub fn validate_stock(stock: Option<i64>) -> ValidationResult<()> {
    match stock {
        Some(s) if s < 0 => Err(ValidationError::OutOfRange {
            field: "total_stock".to_string(),
            min: 0,
            max: i64::MAX,
        }),
        _ => Ok(()),
    }
}

/// Validates a store commission: more than 0% and at most 100%.
pub fn validate_commission_bps(bps: u32) -> ValidationResult<()> {
    if bps == 0 || bps > Rate::FULL_BPS {
        return Err(ValidationError::OutOfRange {
            field: "commission".to_string(),
            min: 1,
            max: Rate::FULL_BPS as i64,
        });
    }

    Ok(())
}

/// Validates a platform fee: 0% to 100%.
pub fn validate_fee_bps(bps: u32) -> ValidationResult<()> {
    if bps > Rate::FULL_BPS {
        return Err(ValidationError::OutOfRange {
            field: "platform_fee".to_string(),
            min: 0,
            max: Rate::FULL_BPS as i64,
        });
    }

    Ok(())
}

/// Validates an installment tier before it is stored.
pub fn validate_installment_rule(min_amount_cents: i64, max_installments: u32) -> ValidationResult<()> {
    if min_amount_cents < 0 {
        return Err(ValidationError::OutOfRange {
            field: "min_amount".to_string(),
            min: 0,
            max: i64::MAX,
        });
    }

    // A max of 1 pins a tier to single payment
    if max_installments < 1 {
        return Err(ValidationError::OutOfRange {
            field: "max_installments".to_string(),
            min: 1,
            max: u32::MAX as i64,
        });
    }

    Ok(())
}

// =============================================================================
// Temporal Validators
// =============================================================================

/// Validates a delivery timestamp: not before the order was created and not
/// in the future.
pub fn validate_delivered_at(
    created_at: DateTime<Utc>,
    delivered_at: DateTime<Utc>,
    now: DateTime<Utc>,
) -> ValidationResult<()> {
    if delivered_at < created_at {
        return Err(ValidationError::invalid(
            "delivered_at",
            "cannot be before the order was created",
        ));
    }

    if delivered_at > now {
        return Err(ValidationError::invalid("delivered_at", "cannot be in the future"));
    }

    Ok(())
}

// =============================================================================
// UUID Validators
// =============================================================================

/// Validates a UUID string.
///
/// ## Example
/// ```rust
/// use market_core::validation::validate_uuid;
///
/// assert!(validate_uuid("550e8400-e29b-41d4-a716-446655440000").is_ok());
/// assert!(validate_uuid("not-a-uuid").is_err());
/// ```
pub fn validate_uuid(id: &str) -> ValidationResult<()> {
    if id.trim().is_empty() {
        return Err(ValidationError::required("id"));
    }

    uuid::Uuid::parse_str(id)
        .map_err(|_| ValidationError::invalid("id", "must be a valid UUID"))?;

    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_validate_name() {
        assert!(validate_name("name", "Cantina").is_ok());
        assert!(validate_name("name", "").is_err());
        assert!(validate_name("name", &"A".repeat(300)).is_err());
    }

    #[test]
    fn test_validate_reason() {
        assert_eq!(validate_reason("  fora de estoque ").unwrap(), "fora de estoque");
        assert!(matches!(
            validate_reason("   "),
            Err(ValidationError::Required { .. })
        ));
        assert!(validate_reason(&"x".repeat(MAX_REASON_LEN + 1)).is_err());
    }

    #[test]
    fn test_normalize_notes() {
        assert_eq!(normalize_notes(None).unwrap(), None);
        assert_eq!(normalize_notes(Some("  ")).unwrap(), None);
        assert_eq!(
            normalize_notes(Some(" sem cebola ")).unwrap().as_deref(),
            Some("sem cebola")
        );
    }

    #[test]
    fn test_validate_quantity() {
        assert!(validate_quantity(1).is_ok());
        assert!(validate_quantity(999).is_ok());

        assert!(validate_quantity(0).is_err());
        assert!(validate_quantity(-1).is_err());
        assert!(validate_quantity(1000).is_err());
    }

    #[test]
    fn test_validate_rates() {
        assert!(validate_commission_bps(1000).is_ok());
        assert!(validate_commission_bps(0).is_err());
        assert!(validate_commission_bps(10001).is_err());
        assert!(validate_fee_bps(0).is_ok());
        assert!(validate_fee_bps(10001).is_err());
    }

    #[test]
    fn test_validate_installment_rule() {
        assert!(validate_installment_rule(10000, 6).is_ok());
        assert!(validate_installment_rule(0, 2).is_ok());
        assert!(validate_installment_rule(0, 1).is_ok());
        assert!(validate_installment_rule(0, 0).is_err());
        assert!(validate_installment_rule(-1, 3).is_err());
    }

    #[test]
    fn test_validate_delivered_at() {
        let now = Utc::now();
        let created = now - Duration::hours(2);

        assert!(validate_delivered_at(created, now, now).is_ok());
        assert!(validate_delivered_at(created, created, now).is_ok());
        assert!(validate_delivered_at(created, created - Duration::seconds(1), now).is_err());
        assert!(validate_delivered_at(created, now + Duration::minutes(5), now).is_err());
    }

    #[test]
    fn test_validate_stock_and_price() {
        assert!(validate_stock(None).is_ok());
        assert!(validate_stock(Some(0)).is_ok());
        assert!(validate_stock(Some(-1)).is_err());
        assert!(validate_price_cents(-1).is_err());
        assert!(validate_price_cents(MAX_PRICE_CENTS).is_ok());
        assert!(matches!(
            validate_price_cents(i64::MAX),
            Err(ValidationError::OutOfRange { max: MAX_PRICE_CENTS, .. })
        ));
    }

    #[test]
    fn test_validate_uuid() {
        assert!(validate_uuid("550e8400-e29b-41d4-a716-446655440000").is_ok());
        assert!(validate_uuid("").is_err());
        assert!(validate_uuid("123").is_err());
    }
}
