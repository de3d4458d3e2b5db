// Test file - these are expected patterns in test code
#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]

//! Edge Case Tests for the Credit Ledger
//!
//! Boundary conditions across:
//! - Adjustment clamping and pool isolation
//! - Usage spillover between pools
//! - Aggregation over empty and mixed logs

#[cfg(test)]
mod adjustment_edge_cases {
    use crate::adjustment::apply_adjustment;
    use crate::tenant::CreditBalances;
    use crate::transactions::CreditPool;

    // =========================================================================
    // A debit larger than the pool floors at zero and reports the clamp
    // =========================================================================
    #[test]
    fn over_debit_reports_clamp() {
        let effect = apply_adjustment(CreditBalances::new(100, 20), CreditPool::TopOff, -50);
        assert_eq!(effect.balances.top_off, 0);
        assert_eq!(effect.applied, -20);
        assert!(effect.clamped);
    }

    // =========================================================================
    // Adjustments targeting one pool never move the other
    // =========================================================================
    #[test]
    fn pool_isolation_both_directions() {
        let start = CreditBalances::new(70, 30);

        let effect = apply_adjustment(start, CreditPool::Subscription, -200);
        assert_eq!(effect.balances.top_off, 30);

        let effect = apply_adjustment(start, CreditPool::TopOff, 500);
        assert_eq!(effect.balances.subscription, 70);
    }

    // =========================================================================
    // Both pools stay non-negative through an arbitrary adjustment sequence
    // =========================================================================
    #[test]
    fn non_negativity_over_sequence() {
        let sequence: &[(CreditPool, i64)] = &[
            (CreditPool::Subscription, 120),
            (CreditPool::TopOff, -999),
            (CreditPool::Subscription, -121),
            (CreditPool::TopOff, 40),
            (CreditPool::Subscription, -1),
            (CreditPool::TopOff, -39),
        ];

        let mut balances = CreditBalances::new(0, 0);
        for &(pool, amount) in sequence {
            balances = apply_adjustment(balances, pool, amount).balances;
            assert!(balances.subscription >= 0);
            assert!(balances.top_off >= 0);
        }
    }

    // =========================================================================
    // Folding applied deltas reproduces the final balance (conservation:
    // requested amounts minus clamping losses equal the pool balance)
    // =========================================================================
    #[test]
    fn applied_deltas_sum_to_final_balance() {
        let amounts = [50, -80, 30, -10, -100, 25];

        let mut balances = CreditBalances::new(0, 0);
        let mut applied_sum = 0;
        for amount in amounts {
            let effect = apply_adjustment(balances, CreditPool::Subscription, amount);
            applied_sum += effect.applied;
            balances = effect.balances;
        }

        assert_eq!(balances.subscription, applied_sum);
        assert_eq!(balances.subscription, 25);
    }

    // =========================================================================
    // Zero-amount adjustment is a no-op that does not report a clamp
    // =========================================================================
    #[test]
    fn zero_amount_is_noop() {
        let start = CreditBalances::new(10, 10);
        let effect = apply_adjustment(start, CreditPool::Subscription, 0);
        assert_eq!(effect.balances, start);
        assert_eq!(effect.applied, 0);
        assert!(!effect.clamped);
    }

    // =========================================================================
    // Crediting an empty ledger (spec example: +200 promo on zero balances)
    // =========================================================================
    #[test]
    fn promo_credit_on_empty_ledger() {
        let effect = apply_adjustment(CreditBalances::new(0, 0), CreditPool::Subscription, 200);
        assert_eq!(effect.balances.subscription, 200);
        assert_eq!(effect.balances.top_off, 0);
        assert_eq!(effect.applied, 200);
        assert!(!effect.clamped);
    }
}

#[cfg(test)]
mod usage_edge_cases {
    use crate::tenant::CreditBalances;
    use crate::usage::apply_usage;

    // =========================================================================
    // Debit exactly equal to the subscription pool leaves top-off untouched
    // =========================================================================
    #[test]
    fn exact_subscription_drain_does_not_spill() {
        let effect = apply_usage(CreditBalances::new(30, 50), 30);
        assert_eq!(effect.from_subscription, 30);
        assert_eq!(effect.from_top_off, 0);
        assert_eq!(effect.balances.top_off, 50);
    }

    // =========================================================================
    // One credit over the subscription pool spills exactly one
    // =========================================================================
    #[test]
    fn single_credit_spill() {
        let effect = apply_usage(CreditBalances::new(30, 50), 31);
        assert_eq!(effect.from_subscription, 30);
        assert_eq!(effect.from_top_off, 1);
    }

    // =========================================================================
    // Usage against a fully empty ledger consumes nothing and stays at zero
    // =========================================================================
    #[test]
    fn usage_on_empty_ledger() {
        let effect = apply_usage(CreditBalances::new(0, 0), 10);
        assert_eq!(effect.consumed, 0);
        assert_eq!(effect.balances.total(), 0);
    }

    // =========================================================================
    // Consumed never exceeds requested, and splits always sum to consumed
    // =========================================================================
    #[test]
    fn split_accounting_is_consistent() {
        for (subscription, top_off, requested) in
            [(0, 0, 5), (10, 0, 5), (10, 0, 15), (3, 7, 9), (3, 7, 100)]
        {
            let effect = apply_usage(CreditBalances::new(subscription, top_off), requested);
            assert!(effect.consumed <= requested);
            assert_eq!(effect.consumed, effect.from_subscription + effect.from_top_off);
            assert_eq!(
                effect.balances.total(),
                subscription + top_off - effect.consumed
            );
        }
    }
}

#[cfg(test)]
mod aggregation_edge_cases {
    use crate::aggregation::{summarize_overview, top_consumers, usage_breakdown, LogScanRow};

    // =========================================================================
    // A brand-new platform (no tenants, no log) renders an all-zero overview
    // =========================================================================
    #[test]
    fn empty_platform_overview() {
        let overview = summarize_overview(&[], 0);
        assert_eq!(overview.tenant_count, 0);
        assert_eq!(overview.total_subscription_credits, 0);
        assert_eq!(overview.total_top_off_credits, 0);
        assert_eq!(overview.low_credit_tenants, 0);
        assert!(usage_breakdown(&[]).is_empty());
        assert!(top_consumers(&[]).is_empty());
    }

    // =========================================================================
    // Untagged usage records group under "unknown" instead of being dropped
    // =========================================================================
    #[test]
    fn untagged_usage_groups_as_unknown() {
        let rows = vec![LogScanRow {
            kind: "usage".to_string(),
            feature: None,
            amount: -12,
        }];

        let breakdown = usage_breakdown(&rows);
        assert_eq!(breakdown.len(), 1);
        assert_eq!(breakdown[0].feature, "unknown");
        assert_eq!(breakdown[0].credits_used, 12);
    }

    // =========================================================================
    // Grant and adjustment records never count as feature usage
    // =========================================================================
    #[test]
    fn only_usage_kind_feeds_the_breakdown() {
        let rows: Vec<LogScanRow> = ["adjustment", "subscription", "topoff", "bonus"]
            .iter()
            .map(|kind| LogScanRow {
                kind: kind.to_string(),
                feature: Some("article_generation".to_string()),
                amount: -100,
            })
            .collect();

        assert!(usage_breakdown(&rows).is_empty());
    }
}
