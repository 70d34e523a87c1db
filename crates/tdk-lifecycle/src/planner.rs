//! Pure lifecycle planners.
//!
//! Each planner takes the current snapshot of one flow's rows (insertion
//! order, all states) and returns the post-operation [`LifecycleOutcome`].
//! Nothing here touches the store; the executor persists the result.

use tdk_shares::{max_share_for_pinning, recalculate, validate, OfferShare, ShareConfig};

use crate::{LifecycleError, LifecycleOutcome};

fn find(entries: &[OfferShare], id: i64) -> Result<usize, LifecycleError> {
    entries
        .iter()
        .position(|e| e.id == id)
        .ok_or(LifecycleError::NotFound {
            entity: "flow offer",
            id,
        })
}

/// Post-condition check over the mutated snapshot with the new shares
/// applied. Planners that can leave a pinned total at odds with the invariant
/// run this before the executor is allowed to commit.
fn check_invariant(
    entries: &[OfferShare],
    shares: &std::collections::BTreeMap<i64, i32>,
) -> Result<(), LifecycleError> {
    let post: Vec<OfferShare> = entries
        .iter()
        .map(|e| {
            let share = shares.get(&e.id).copied().unwrap_or(e.share);
            OfferShare::new(e.id, share, e.is_pinned, e.active)
        })
        .collect();
    validate(&post)?;
    Ok(())
}

/// Attach a new offer: the row enters with share 0, active, unpinned, and the
/// whole active set is rebalanced. `new_id` is the freshly inserted row's id
/// and must not already be present in `entries`.
pub fn plan_add(
    entries: &[OfferShare],
    new_id: i64,
    cfg: &ShareConfig,
) -> Result<LifecycleOutcome, LifecycleError> {
    let mut snapshot = entries.to_vec();
    snapshot.push(OfferShare::new(new_id, 0, false, true));

    let shares = recalculate(&snapshot, cfg)?;
    Ok(LifecycleOutcome {
        shares,
        ..Default::default()
    })
}

/// Removal transition: disabled, share 0, remainder redistributed. While
/// other active rows remain the removed row is reported at 0; removing the
/// last active row yields an empty map.
pub fn plan_remove(
    entries: &[OfferShare],
    target_id: i64,
    cfg: &ShareConfig,
) -> Result<LifecycleOutcome, LifecycleError> {
    let idx = find(entries, target_id)?;
    let mut snapshot = entries.to_vec();
    snapshot[idx].active = false;
    snapshot[idx].share = 0;

    let mut shares = recalculate(&snapshot, cfg)?;
    if !shares.is_empty() {
        shares.insert(target_id, 0);
    }
    Ok(LifecycleOutcome {
        shares,
        ..Default::default()
    })
}

/// Restore transition: back to active, then rebalance over the grown set.
pub fn plan_restore(
    entries: &[OfferShare],
    target_id: i64,
    cfg: &ShareConfig,
) -> Result<LifecycleOutcome, LifecycleError> {
    let idx = find(entries, target_id)?;
    let mut snapshot = entries.to_vec();
    snapshot[idx].active = true;

    let shares = recalculate(&snapshot, cfg)?;
    Ok(LifecycleOutcome {
        shares,
        ..Default::default()
    })
}

/// Flip the pin flag and rebalance. The invariant is checked here so the
/// executor rolls back instead of committing a broken allocation.
pub fn plan_toggle_pin(
    entries: &[OfferShare],
    target_id: i64,
    cfg: &ShareConfig,
) -> Result<LifecycleOutcome, LifecycleError> {
    let idx = find(entries, target_id)?;
    let mut snapshot = entries.to_vec();
    let pinned = !snapshot[idx].is_pinned;
    snapshot[idx].is_pinned = pinned;

    let shares = recalculate(&snapshot, cfg)?;
    check_invariant(&snapshot, &shares)?;

    Ok(LifecycleOutcome {
        shares,
        pinned: Some(pinned),
        warning: None,
    })
}

/// Manual share edit.
///
/// The requested value is clamped to the pinning headroom (100 minus the
/// other pinned shares) with a warning. A manual edit pins the row unless the
/// caller passes an explicit pin flag; an explicit `Some(false)` means the
/// value is immediately subject to rebalancing like any unpinned share.
pub fn plan_update_share(
    entries: &[OfferShare],
    target_id: i64,
    requested: i32,
    pin: Option<bool>,
    cfg: &ShareConfig,
) -> Result<LifecycleOutcome, LifecycleError> {
    if !(0..=100).contains(&requested) {
        return Err(LifecycleError::Validation(format!(
            "share must be between 0 and 100, got {requested}"
        )));
    }

    let idx = find(entries, target_id)?;
    if !entries[idx].active {
        return Err(LifecycleError::Validation(format!(
            "flow offer {target_id} is disabled, restore it before editing its share"
        )));
    }

    let pinned = pin.unwrap_or(true);
    let max = max_share_for_pinning(entries, target_id);
    let (share, warning) = if pinned && requested > max {
        (
            max,
            Some(format!("requested {requested}% exceeds the available {max}%, share limited")),
        )
    } else {
        (requested, None)
    };

    let mut snapshot = entries.to_vec();
    snapshot[idx].share = share;
    snapshot[idx].is_pinned = pinned;

    // With unpinned rows left, redistribute what the pins leave over. When
    // the edit pins the last unpinned row the set is fully manual: there is
    // nothing to redistribute, the shares stand as written and only the sum
    // check decides.
    let has_unpinned_active = snapshot.iter().any(|e| e.active && !e.is_pinned);
    let shares = if has_unpinned_active {
        recalculate(&snapshot, cfg)?
    } else {
        snapshot
            .iter()
            .filter(|e| e.active)
            .map(|e| (e.id, e.share))
            .collect()
    };
    check_invariant(&snapshot, &shares)?;

    Ok(LifecycleOutcome {
        shares,
        pinned: Some(pinned),
        warning,
    })
}

// ─── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg() -> ShareConfig {
        ShareConfig::default()
    }

    fn active(id: i64, share: i32, pinned: bool) -> OfferShare {
        OfferShare::new(id, share, pinned, true)
    }

    fn disabled(id: i64) -> OfferShare {
        OfferShare::new(id, 0, false, false)
    }

    #[test]
    fn add_to_empty_flow_gives_full_share() {
        let out = plan_add(&[], 1, &cfg()).unwrap();
        assert_eq!(out.shares.get(&1), Some(&100));
        assert_eq!(out.pinned, None);
    }

    #[test]
    fn add_rebalances_whole_active_set() {
        let entries = vec![active(1, 50, false), active(2, 50, false)];
        let out = plan_add(&entries, 3, &cfg()).unwrap();
        // 100 / 3: earliest row takes the extra unit.
        assert_eq!(out.shares.get(&1), Some(&34));
        assert_eq!(out.shares.get(&2), Some(&33));
        assert_eq!(out.shares.get(&3), Some(&33));
    }

    #[test]
    fn add_leaves_pinned_rows_alone() {
        let entries = vec![active(1, 60, true)];
        let out = plan_add(&entries, 2, &cfg()).unwrap();
        assert_eq!(out.shares.get(&1), Some(&60));
        assert_eq!(out.shares.get(&2), Some(&40));
    }

    #[test]
    fn add_fails_when_pins_leave_no_room() {
        let entries = vec![active(1, 100, true)];
        let err = plan_add(&entries, 2, &cfg()).unwrap_err();
        assert!(matches!(err, LifecycleError::OverAllocated { pinned_sum: 100 }));
    }

    #[test]
    fn remove_redistributes_to_survivors() {
        let entries = vec![
            active(1, 34, false),
            active(2, 33, false),
            active(3, 33, false),
        ];
        let out = plan_remove(&entries, 3, &cfg()).unwrap();
        assert_eq!(out.shares.get(&1), Some(&50));
        assert_eq!(out.shares.get(&2), Some(&50));
        // The removed row is reported at 0 while siblings remain.
        assert_eq!(out.shares.get(&3), Some(&0));
    }

    #[test]
    fn removing_last_active_offer_yields_empty_map() {
        let entries = vec![active(1, 100, false), disabled(2)];
        let out = plan_remove(&entries, 1, &cfg()).unwrap();
        assert!(out.shares.is_empty());
    }

    #[test]
    fn remove_unknown_row_is_not_found() {
        let err = plan_remove(&[active(1, 100, false)], 99, &cfg()).unwrap_err();
        assert!(matches!(
            err,
            LifecycleError::NotFound { entity: "flow offer", id: 99 }
        ));
    }

    #[test]
    fn restore_grows_the_active_set() {
        let entries = vec![active(1, 100, false), disabled(2)];
        let out = plan_restore(&entries, 2, &cfg()).unwrap();
        assert_eq!(out.shares.get(&1), Some(&50));
        assert_eq!(out.shares.get(&2), Some(&50));
    }

    #[test]
    fn restore_respects_existing_pins() {
        let entries = vec![active(1, 70, true), disabled(2)];
        let out = plan_restore(&entries, 2, &cfg()).unwrap();
        assert_eq!(out.shares.get(&1), Some(&70));
        assert_eq!(out.shares.get(&2), Some(&30));
    }

    #[test]
    fn toggle_pin_freezes_current_share() {
        let entries = vec![active(1, 34, false), active(2, 33, false), active(3, 33, false)];
        let out = plan_toggle_pin(&entries, 1, &cfg()).unwrap();
        assert_eq!(out.pinned, Some(true));
        assert_eq!(out.shares.get(&1), Some(&34));
        assert_eq!(out.shares.get(&2), Some(&33));
        assert_eq!(out.shares.get(&3), Some(&33));
    }

    #[test]
    fn toggle_pin_off_releases_share_for_rebalancing() {
        let entries = vec![active(1, 70, true), active(2, 30, false)];
        let out = plan_toggle_pin(&entries, 1, &cfg()).unwrap();
        assert_eq!(out.pinned, Some(false));
        assert_eq!(out.shares.get(&1), Some(&50));
        assert_eq!(out.shares.get(&2), Some(&50));
    }

    #[test]
    fn toggle_pin_refuses_over_allocation() {
        // Pinning the second row at its current 40 alongside an existing pin
        // of 60 leaves zero room: the sum hits 100 and the remaining unpinned
        // row can no longer absorb anything.
        let entries = vec![
            active(1, 60, true),
            active(2, 40, false),
            active(3, 0, false),
        ];
        let err = plan_toggle_pin(&entries, 2, &cfg()).unwrap_err();
        assert!(matches!(err, LifecycleError::OverAllocated { pinned_sum: 100 }));
    }

    #[test]
    fn update_share_pins_by_default_and_rebalances_siblings() {
        let entries = vec![
            active(1, 34, false),
            active(2, 33, false),
            active(3, 33, false),
        ];
        let out = plan_update_share(&entries, 1, 60, None, &cfg()).unwrap();
        assert_eq!(out.pinned, Some(true));
        assert_eq!(out.warning, None);
        assert_eq!(out.shares.get(&1), Some(&60));
        assert_eq!(out.shares.get(&2), Some(&20));
        assert_eq!(out.shares.get(&3), Some(&20));
    }

    #[test]
    fn update_share_clamps_to_pinning_headroom() {
        let entries = vec![active(1, 70, true), active(2, 30, false)];
        let out = plan_update_share(&entries, 2, 50, None, &cfg()).unwrap();
        assert_eq!(out.shares.get(&1), Some(&70));
        assert_eq!(out.shares.get(&2), Some(&30));
        assert!(out.warning.is_some());
    }

    #[test]
    fn clamp_that_starves_unpinned_siblings_is_refused() {
        // Clamping row 2 to the 40% headroom drives the pinned sum to 100
        // while row 3 is still unpinned: nothing left to distribute.
        let entries = vec![
            active(1, 60, true),
            active(2, 20, false),
            active(3, 20, false),
        ];
        let err = plan_update_share(&entries, 2, 80, None, &cfg()).unwrap_err();
        assert!(matches!(err, LifecycleError::OverAllocated { pinned_sum: 100 }));
    }

    #[test]
    fn pinning_the_last_row_needs_an_exact_sum() {
        let entries = vec![active(1, 60, true), active(2, 40, false)];
        // 60 + 30 leaves the flow at 90: refused, nothing can absorb the gap.
        assert!(matches!(
            plan_update_share(&entries, 2, 30, None, &cfg()),
            Err(LifecycleError::Validation(_))
        ));
        // 60 + 40 is exact and every row is manually owned.
        let out = plan_update_share(&entries, 2, 40, None, &cfg()).unwrap();
        assert_eq!(out.shares.get(&2), Some(&40));
        assert_eq!(out.warning, None);
    }

    #[test]
    fn update_share_with_explicit_unpin_is_subsumed_by_rebalancing() {
        let entries = vec![active(1, 50, false), active(2, 50, false)];
        let out = plan_update_share(&entries, 1, 80, Some(false), &cfg()).unwrap();
        assert_eq!(out.pinned, Some(false));
        // Unpinned rows split evenly again; the manual 80 does not survive.
        assert_eq!(out.shares.get(&1), Some(&50));
        assert_eq!(out.shares.get(&2), Some(&50));
    }

    #[test]
    fn update_share_rejects_out_of_range_values() {
        let entries = vec![active(1, 100, false)];
        assert!(matches!(
            plan_update_share(&entries, 1, 101, None, &cfg()),
            Err(LifecycleError::Validation(_))
        ));
        assert!(matches!(
            plan_update_share(&entries, 1, -1, None, &cfg()),
            Err(LifecycleError::Validation(_))
        ));
    }

    #[test]
    fn update_share_rejects_disabled_rows() {
        let entries = vec![active(1, 100, false), disabled(2)];
        assert!(matches!(
            plan_update_share(&entries, 2, 50, None, &cfg()),
            Err(LifecycleError::Validation(_))
        ));
    }

    #[test]
    fn update_share_on_sole_offer_clamps_to_full() {
        let entries = vec![active(1, 100, false)];
        let out = plan_update_share(&entries, 1, 100, None, &cfg()).unwrap();
        assert_eq!(out.shares.get(&1), Some(&100));
        assert_eq!(out.warning, None);
    }

    #[test]
    fn outcomes_always_sum_to_100_while_active_rows_exist() {
        let entries = vec![
            active(1, 40, true),
            active(2, 30, false),
            active(3, 30, false),
            disabled(4),
        ];
        for out in [
            plan_add(&entries, 5, &cfg()).unwrap(),
            plan_remove(&entries, 2, &cfg()).unwrap(),
            plan_restore(&entries, 4, &cfg()).unwrap(),
            plan_toggle_pin(&entries, 2, &cfg()).unwrap(),
            plan_update_share(&entries, 3, 25, None, &cfg()).unwrap(),
        ] {
            let total: i32 = out.shares.values().sum();
            assert_eq!(total, 100, "shares: {:?}", out.shares);
        }
    }
}
