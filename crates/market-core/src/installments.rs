//! # Installment Tier Resolver
//!
//! Maps an order amount to the installment counts a store allows.
//!
//! ## Tier Matching
//! ```text
//! rules: [{min: 0, max: 1}, {min: 10000, max: 6}, {min: 50000, max: 10}]
//!
//! amount 12000:
//!   min 0      ≤ 12000 ✓
//!   min 10000  ≤ 12000 ✓  ← largest qualifying min_amount wins
//!   min 50000  ≤ 12000 ✗
//!
//! → max installments = 6
//! ```
//!
//! ## Schedule
//! Each installment is `ceil(amount / n)`; the final one absorbs the
//! difference so the schedule always sums to exactly `amount`.

use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::money::Money;
use crate::types::InstallmentRule;

/// Maximum count when no tier qualifies (pay in one go).
pub const SINGLE_PAYMENT: u32 = 1;

/// One choice offered to the buyer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct InstallmentOption {
    pub installments: u32,
    /// Amount of every installment but the last.
    pub installment_amount: Money,
    /// Amount of the last installment (absorbs rounding).
    pub final_installment_amount: Money,
}

impl InstallmentOption {
    /// The full payment schedule.
    pub fn schedule(&self) -> Vec<Money> {
        let mut amounts = vec![self.installment_amount; self.installments as usize - 1];
        amounts.push(self.final_installment_amount);
        amounts
    }
}

/// Returns the maximum number of installments for `amount`.
///
/// Picks the tightest qualifying tier (largest `min_amount <= amount`), not
/// the first match. Returns [`SINGLE_PAYMENT`] when no tier qualifies.
///
/// ## Example
/// ```rust
/// use market_core::installments::resolve_max_installments;
/// use market_core::money::Money;
///
/// assert_eq!(resolve_max_installments(&[], Money::from_cents(12000)), 1);
/// ```
pub fn resolve_max_installments(rules: &[InstallmentRule], amount: Money) -> u32 {
    rules
        .iter()
        .filter(|rule| rule.min_amount() <= amount)
        .max_by_key(|rule| rule.min_amount_cents)
        .map(|rule| rule.max_installments)
        .unwrap_or(SINGLE_PAYMENT)
}

/// Builds the option for exactly `installments` payments, if it is viable.
///
/// `None` when `installments < 2`, the amount is not positive, or the
/// rounding would leave the final installment at zero or below (tiny
/// amounts split too many ways).
pub fn installment_option(amount: Money, installments: u32) -> Option<InstallmentOption> {
    if installments < 2 || !amount.is_positive() {
        return None;
    }
    let each = amount.div_ceil(installments)?;
    let final_amount = amount - each * (installments as i64 - 1);
    if !final_amount.is_positive() {
        return None;
    }
    Some(InstallmentOption {
        installments,
        installment_amount: each,
        final_installment_amount: final_amount,
    })
}

/// Lists the installment choices for `amount`, for counts `2..=max`.
pub fn resolve_installment_options(rules: &[InstallmentRule], amount: Money) -> Vec<InstallmentOption> {
    let max = resolve_max_installments(rules, amount);
    (2..=max)
        .filter_map(|n| installment_option(amount, n))
        .collect()
}

/// Splits `amount` into `parts` invoice lines summing exactly to `amount`.
///
/// Uses the same ceil-then-absorb rule as the options. When that rule is not
/// viable (more parts than cents to spread), falls back to floor division
/// with the remainder on the last line, which never goes negative.
pub fn split_amount(amount: Money, parts: u32) -> Vec<Money> {
    if parts <= 1 {
        return vec![amount];
    }
    if let Some(option) = installment_option(amount, parts) {
        return option.schedule();
    }
    let base = Money::from_cents(amount.cents() / parts as i64);
    let mut lines = vec![base; parts as usize - 1];
    lines.push(amount - base * (parts as i64 - 1));
    lines
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn rule(min_amount_cents: i64, max_installments: u32) -> InstallmentRule {
        InstallmentRule {
            id: format!("rule-{min_amount_cents}"),
            store_id: "store-1".to_string(),
            min_amount_cents,
            max_installments,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_tightest_tier_wins() {
        let rules = vec![rule(0, 1), rule(10000, 6)];
        assert_eq!(resolve_max_installments(&rules, Money::from_cents(12000)), 6);
        assert_eq!(resolve_max_installments(&rules, Money::from_cents(9999)), 1);
    }

    #[test]
    fn test_rule_order_does_not_matter() {
        let rules = vec![rule(50000, 10), rule(10000, 6), rule(0, 2)];
        assert_eq!(resolve_max_installments(&rules, Money::from_cents(50000)), 10);
        assert_eq!(resolve_max_installments(&rules, Money::from_cents(49999)), 6);
        assert_eq!(resolve_max_installments(&rules, Money::from_cents(100)), 2);
    }

    #[test]
    fn test_no_rules_means_single_payment() {
        assert_eq!(resolve_max_installments(&[], Money::from_cents(1_000_000)), 1);
        assert!(resolve_installment_options(&[], Money::from_cents(1_000_000)).is_empty());

        let rules = vec![rule(10000, 6)];
        assert_eq!(resolve_max_installments(&rules, Money::from_cents(5000)), 1);
    }

    #[test]
    fn test_options_final_installment_absorbs_remainder() {
        let rules = vec![rule(0, 3)];
        let options = resolve_installment_options(&rules, Money::from_cents(10000));

        assert_eq!(options.len(), 2);
        assert_eq!(options[0].installments, 2);
        assert_eq!(options[0].installment_amount.cents(), 5000);
        assert_eq!(options[1].installments, 3);
        assert_eq!(options[1].installment_amount.cents(), 3334);
        assert_eq!(options[1].final_installment_amount.cents(), 3332);
        assert_eq!(options[1].schedule().into_iter().sum::<Money>().cents(), 10000);
    }

    #[test]
    fn test_unviable_counts_are_not_offered() {
        // ceil(10 / 7) = 2, six of those already make 12 > 10
        assert!(installment_option(Money::from_cents(10), 7).is_none());
        assert!(installment_option(Money::from_cents(0), 2).is_none());
        assert!(installment_option(Money::from_cents(100), 1).is_none());
    }

    #[test]
    fn test_split_amount_always_sums() {
        assert_eq!(split_amount(Money::from_cents(10000), 1), vec![Money::from_cents(10000)]);

        let lines = split_amount(Money::from_cents(10), 7);
        assert_eq!(lines.len(), 7);
        assert_eq!(lines.iter().copied().sum::<Money>().cents(), 10);
        assert!(lines.iter().all(|m| !m.is_negative()));

        let lines = split_amount(Money::from_cents(12000), 6);
        assert!(lines.iter().all(|m| m.cents() == 2000));
    }
}
