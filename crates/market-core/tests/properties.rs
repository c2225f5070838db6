//! Property tests for the money-splitting rules.

use chrono::Utc;
use market_core::installments::{resolve_installment_options, resolve_max_installments, split_amount};
use market_core::money::Money;
use market_core::settlement::compute_settlement;
use market_core::types::{InstallmentRule, Rate};
use market_core::CoreError;
use proptest::prelude::*;

fn rules_strategy() -> impl Strategy<Value = Vec<InstallmentRule>> {
    prop::collection::btree_map(0_i64..200_000, 2_u32..=24, 0..6).prop_map(|tiers| {
        tiers
            .into_iter()
            .map(|(min_amount_cents, max_installments)| InstallmentRule {
                id: format!("rule-{min_amount_cents}"),
                store_id: "store-1".to_string(),
                min_amount_cents,
                max_installments,
                created_at: Utc::now(),
            })
            .collect()
    })
}

proptest! {
    #[test]
    fn prop_installment_options_sum_to_total(
        rules in rules_strategy(),
        amount in 1_i64..1_000_000,
    ) {
        let amount = Money::from_cents(amount);
        let max = resolve_max_installments(&rules, amount);

        for option in resolve_installment_options(&rules, amount) {
            prop_assert!(option.installments >= 2 && option.installments <= max);
            let schedule = option.schedule();
            prop_assert_eq!(schedule.len(), option.installments as usize);
            prop_assert_eq!(schedule.iter().copied().sum::<Money>(), amount);
            prop_assert!(option.final_installment_amount.is_positive());
            prop_assert!(option.final_installment_amount <= option.installment_amount);
        }
    }

    #[test]
    fn prop_resolver_picks_tightest_tier(
        rules in rules_strategy(),
        amount in 0_i64..300_000,
    ) {
        let amount = Money::from_cents(amount);
        let expected = rules
            .iter()
            .filter(|r| r.min_amount_cents <= amount.cents())
            .max_by_key(|r| r.min_amount_cents)
            .map(|r| r.max_installments)
            .unwrap_or(1);
        prop_assert_eq!(resolve_max_installments(&rules, amount), expected);
    }

    #[test]
    fn prop_split_amount_is_exact(amount in 0_i64..1_000_000, parts in 1_u32..=36) {
        let lines = split_amount(Money::from_cents(amount), parts);
        prop_assert_eq!(lines.len(), parts as usize);
        prop_assert_eq!(lines.iter().copied().sum::<Money>().cents(), amount);
        prop_assert!(lines.iter().all(|m| !m.is_negative()));
    }

    #[test]
    fn prop_transfer_never_negative_under_valid_rates(
        total in 0_i64..10_000_000,
        commission in 1_u32..=10_000,
        fee_share in 0_u32..=10_000,
    ) {
        let fee = fee_share.min(10_000 - commission);
        let b = compute_settlement(
            Money::from_cents(total),
            Rate::from_bps(commission),
            Rate::from_bps(fee),
        ).unwrap();

        prop_assert!(!b.transfer.is_negative());
        prop_assert!(!b.platform_fee.is_negative());
        prop_assert_eq!((b.commission + b.platform_fee + b.transfer).cents(), total);
    }

    #[test]
    fn prop_excessive_rates_are_rejected(
        total in 0_i64..10_000_000,
        commission in 1_u32..=10_000,
        excess in 1_u32..=5_000,
    ) {
        let fee = 10_000 - commission + excess;
        let result = compute_settlement(
            Money::from_cents(total),
            Rate::from_bps(commission),
            Rate::from_bps(fee),
        );
        let is_negative_transfer = matches!(result, Err(CoreError::NegativeTransfer { .. }));
        prop_assert!(is_negative_transfer);
    }
}
