use std::collections::BTreeMap;

use crate::{OfferShare, ShareConfig, ShareError};

/// Recompute shares for the active offers of one flow.
///
/// # Algorithm
///
/// 1. Partition active entries into pinned and unpinned.
/// 2. Refuse with [`ShareError::OverAllocated`] when the pinned sum is ≥ 100.
/// 3. `available = 100 - pinned_sum`. With no unpinned entries the pinned
///    shares are returned unchanged — an under-100 total is tolerated only
///    while there is no unpinned entry to absorb it.
/// 4. `base = available / n`, `remainder = available % n` (floor division).
/// 5. Minimum-floor rule: when `base` falls below `min_share_percent` but
///    `available` can cover the floor for every unpinned entry, raise `base`
///    to the floor and recompute the remainder.
/// 6. Every unpinned entry receives `base`; the first `remainder` entries in
///    input order receive one extra unit.
///
/// The output maps every active entry's id to its share: pinned entries
/// unchanged, unpinned entries recalculated. Inactive entries are absent.
pub fn recalculate(
    offers: &[OfferShare],
    cfg: &ShareConfig,
) -> Result<BTreeMap<i64, i32>, ShareError> {
    if offers.is_empty() {
        return Ok(BTreeMap::new());
    }

    let pinned: Vec<&OfferShare> = offers.iter().filter(|o| o.active && o.is_pinned).collect();
    let unpinned: Vec<&OfferShare> = offers.iter().filter(|o| o.active && !o.is_pinned).collect();

    let pinned_sum: i32 = pinned.iter().map(|o| o.share).sum();
    if pinned_sum >= 100 {
        return Err(ShareError::OverAllocated { pinned_sum });
    }

    let available = 100 - pinned_sum;

    let mut result: BTreeMap<i64, i32> = BTreeMap::new();
    for o in &pinned {
        result.insert(o.id, o.share);
    }

    if unpinned.is_empty() {
        return Ok(result);
    }

    let n = unpinned.len() as i32;
    let mut base = available / n;
    let mut remainder = available % n;

    if base < cfg.min_share_percent && available >= n * cfg.min_share_percent {
        base = cfg.min_share_percent;
        remainder = available - base * n;
    }

    for (i, o) in unpinned.iter().enumerate() {
        let extra = if (i as i32) < remainder { 1 } else { 0 };
        result.insert(o.id, base + extra);
    }

    Ok(result)
}

/// Post-condition check over the active entries: every share in [0, 100] and
/// the total exactly 100. Empty or all-inactive input is trivially valid.
///
/// This validates, it never corrects — callers rebalance first via
/// [`recalculate`], then validate before committing or pushing upstream.
pub fn validate(offers: &[OfferShare]) -> Result<(), ShareError> {
    let active: Vec<&OfferShare> = offers.iter().filter(|o| o.active).collect();
    if active.is_empty() {
        return Ok(());
    }

    for o in &active {
        if o.share < 0 {
            return Err(ShareError::Invalid {
                message: format!("share of offer {} is negative", o.id),
            });
        }
        if o.share > 100 {
            return Err(ShareError::Invalid {
                message: format!("share of offer {} exceeds 100%", o.id),
            });
        }
    }

    let total: i32 = active.iter().map(|o| o.share).sum();
    if total != 100 {
        return Err(ShareError::Invalid {
            message: format!("shares must sum to 100%, current total is {total}%"),
        });
    }

    Ok(())
}

/// The maximum share the entry `excluded_id` may be pinned at: 100 minus the
/// shares already committed to the *other* active pinned entries.
pub fn max_share_for_pinning(offers: &[OfferShare], excluded_id: i64) -> i32 {
    let other_pinned: i32 = offers
        .iter()
        .filter(|o| o.active && o.is_pinned && o.id != excluded_id)
        .map(|o| o.share)
        .sum();
    100 - other_pinned
}

// ─── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(id: i64, share: i32, pinned: bool) -> OfferShare {
        OfferShare::new(id, share, pinned, true)
    }

    fn disabled(id: i64, share: i32) -> OfferShare {
        OfferShare::new(id, share, false, false)
    }

    fn cfg() -> ShareConfig {
        ShareConfig::default()
    }

    // ── Basic distribution ───────────────────────────────────────────────────

    #[test]
    fn empty_input_yields_empty_map() {
        let out = recalculate(&[], &cfg()).unwrap();
        assert!(out.is_empty());
    }

    #[test]
    fn single_unpinned_offer_gets_everything() {
        let out = recalculate(&[entry(1, 0, false)], &cfg()).unwrap();
        assert_eq!(out[&1], 100);
    }

    #[test]
    fn three_unpinned_split_with_remainder_to_first() {
        // available=100, base=33, remainder=1 → first entry gets the extra unit.
        let offers = [entry(1, 0, false), entry(2, 0, false), entry(3, 0, false)];
        let out = recalculate(&offers, &cfg()).unwrap();
        assert_eq!(out[&1], 34);
        assert_eq!(out[&2], 33);
        assert_eq!(out[&3], 33);
    }

    #[test]
    fn pinned_at_fifty_three_unpinned() {
        // available=50, base=16, remainder=2 → 50/17/17/16.
        let offers = [
            entry(10, 50, true),
            entry(1, 0, false),
            entry(2, 0, false),
            entry(3, 0, false),
        ];
        let out = recalculate(&offers, &cfg()).unwrap();
        assert_eq!(out[&10], 50);
        assert_eq!(out[&1], 17);
        assert_eq!(out[&2], 17);
        assert_eq!(out[&3], 16);
    }

    #[test]
    fn sum_is_always_100_with_active_entries() {
        let offers = [
            entry(1, 20, true),
            entry(2, 13, true),
            entry(3, 0, false),
            entry(4, 0, false),
            entry(5, 0, false),
            entry(6, 0, false),
            entry(7, 0, false),
        ];
        let out = recalculate(&offers, &cfg()).unwrap();
        let total: i32 = out.values().sum();
        assert_eq!(total, 100);
    }

    // ── Pinned behavior ──────────────────────────────────────────────────────

    #[test]
    fn pinned_shares_are_never_rewritten() {
        let offers = [
            entry(1, 37, true),
            entry(2, 11, true),
            entry(3, 0, false),
            entry(4, 0, false),
        ];
        let out = recalculate(&offers, &cfg()).unwrap();
        assert_eq!(out[&1], 37);
        assert_eq!(out[&2], 11);
        assert_eq!(out[&3] + out[&4], 52);
    }

    #[test]
    fn pinned_sum_at_100_is_over_allocated() {
        let offers = [entry(1, 60, true), entry(2, 40, true), entry(3, 0, false)];
        let err = recalculate(&offers, &cfg()).unwrap_err();
        assert_eq!(err, ShareError::OverAllocated { pinned_sum: 100 });
    }

    #[test]
    fn pinned_sum_above_100_is_over_allocated_even_without_unpinned() {
        let offers = [entry(1, 70, true), entry(2, 50, true)];
        let err = recalculate(&offers, &cfg()).unwrap_err();
        assert_eq!(err, ShareError::OverAllocated { pinned_sum: 120 });
    }

    #[test]
    fn all_pinned_under_100_returned_unchanged() {
        // No unpinned entry to absorb the slack: under-100 total is tolerated.
        let offers = [entry(1, 40, true), entry(2, 30, true)];
        let out = recalculate(&offers, &cfg()).unwrap();
        assert_eq!(out[&1], 40);
        assert_eq!(out[&2], 30);
        assert_eq!(out.len(), 2);
    }

    // ── Minimum-floor rule ───────────────────────────────────────────────────

    #[test]
    fn tiny_available_does_not_trigger_minimum_floor() {
        // 5 unpinned, available=3: base floors to 0 and 3 < 5×1, so the rule
        // stays off → shares {1,1,1,0,0}, remainder to the first three.
        let offers = [
            entry(10, 97, true),
            entry(1, 0, false),
            entry(2, 0, false),
            entry(3, 0, false),
            entry(4, 0, false),
            entry(5, 0, false),
        ];
        let out = recalculate(&offers, &cfg()).unwrap();
        assert_eq!(out[&1], 1);
        assert_eq!(out[&2], 1);
        assert_eq!(out[&3], 1);
        assert_eq!(out[&4], 0);
        assert_eq!(out[&5], 0);
    }

    #[test]
    fn zero_share_entries_stay_in_the_output() {
        let offers = [
            entry(10, 98, true),
            entry(1, 0, false),
            entry(2, 0, false),
            entry(3, 0, false),
        ];
        let out = recalculate(&offers, &cfg()).unwrap();
        assert_eq!(out.len(), 4);
        assert_eq!(out[&3], 0);
    }

    // ── Determinism & idempotence ────────────────────────────────────────────

    #[test]
    fn identical_input_rebalances_identically() {
        let offers = [
            entry(4, 12, true),
            entry(9, 0, false),
            entry(2, 0, false),
            entry(7, 0, false),
        ];
        let a = recalculate(&offers, &cfg()).unwrap();
        let b = recalculate(&offers, &cfg()).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn remainder_follows_input_order_not_id_order() {
        // Entry 9 comes first in input order, so it takes the extra unit.
        let offers = [entry(9, 0, false), entry(2, 0, false), entry(7, 0, false)];
        let out = recalculate(&offers, &cfg()).unwrap();
        assert_eq!(out[&9], 34);
        assert_eq!(out[&2], 33);
        assert_eq!(out[&7], 33);
    }

    #[test]
    fn recalculate_is_idempotent_on_its_own_output() {
        let offers = [
            entry(1, 25, true),
            entry(2, 0, false),
            entry(3, 0, false),
            entry(4, 0, false),
        ];
        let first = recalculate(&offers, &cfg()).unwrap();

        let fed_back: Vec<OfferShare> = offers
            .iter()
            .map(|o| OfferShare::new(o.id, first[&o.id], o.is_pinned, true))
            .collect();
        let second = recalculate(&fed_back, &cfg()).unwrap();
        assert_eq!(first, second);
    }

    // ── Inactive entries ─────────────────────────────────────────────────────

    #[test]
    fn disabled_entries_are_excluded_from_distribution() {
        let offers = [entry(1, 0, false), disabled(2, 50), entry(3, 0, false)];
        let out = recalculate(&offers, &cfg()).unwrap();
        assert!(!out.contains_key(&2));
        assert_eq!(out[&1] + out[&3], 100);
    }

    #[test]
    fn disabled_pinned_entries_do_not_count_toward_pinned_sum() {
        let mut dead = disabled(2, 99);
        dead.is_pinned = true;
        let offers = [entry(1, 0, false), dead];
        let out = recalculate(&offers, &cfg()).unwrap();
        assert_eq!(out[&1], 100);
    }

    // ── validate ─────────────────────────────────────────────────────────────

    #[test]
    fn validate_accepts_empty_and_all_inactive() {
        assert!(validate(&[]).is_ok());
        assert!(validate(&[disabled(1, 0), disabled(2, 0)]).is_ok());
    }

    #[test]
    fn validate_accepts_exact_100() {
        let offers = [entry(1, 60, true), entry(2, 40, false)];
        assert!(validate(&offers).is_ok());
    }

    #[test]
    fn validate_rejects_wrong_total() {
        let offers = [entry(1, 60, false), entry(2, 30, false)];
        let err = validate(&offers).unwrap_err();
        assert!(err.to_string().contains("90"));
    }

    #[test]
    fn validate_rejects_out_of_range_share() {
        let offers = [entry(1, -5, false), entry(2, 105, false)];
        let err = validate(&offers).unwrap_err();
        assert!(matches!(err, ShareError::Invalid { .. }));
    }

    #[test]
    fn validate_ignores_disabled_shares() {
        // Disabled rows carry share 0 by convention but are skipped regardless.
        let offers = [entry(1, 100, false), disabled(2, 40)];
        assert!(validate(&offers).is_ok());
    }

    // ── max_share_for_pinning ────────────────────────────────────────────────

    #[test]
    fn max_share_excludes_the_candidate_itself() {
        let offers = [entry(1, 30, true), entry(2, 20, true), entry(3, 10, false)];
        assert_eq!(max_share_for_pinning(&offers, 1), 80);
        assert_eq!(max_share_for_pinning(&offers, 3), 50);
    }

    #[test]
    fn max_share_with_no_other_pins_is_100() {
        let offers = [entry(1, 40, false), entry(2, 60, false)];
        assert_eq!(max_share_for_pinning(&offers, 1), 100);
    }

    #[test]
    fn max_share_ignores_disabled_pins() {
        let mut dead = disabled(2, 70);
        dead.is_pinned = true;
        let offers = [entry(1, 0, false), dead];
        assert_eq!(max_share_for_pinning(&offers, 1), 100);
    }
}
