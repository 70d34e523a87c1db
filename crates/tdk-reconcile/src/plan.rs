//! Pure merge planners.
//!
//! Inputs are snapshots (local rows, remote records); outputs are plans the
//! orchestrator executes verbatim. Nothing here performs IO.

use std::collections::BTreeSet;

use tdk_schemas::{RemoteCampaign, RemoteStreamOffer};

use crate::types::{
    CampaignMergePlan, CampaignUpsert, EntryState, FlowOfferCreate, FlowOfferMergePlan,
    FlowOfferUpdate, LocalFlowOffer,
};

const CAMPAIGN_STATES: [&str; 3] = ["active", "disabled", "deleted"];

fn normalize_campaign_state(state: Option<&str>) -> String {
    match state {
        Some(s) if CAMPAIGN_STATES.contains(&s) => s.to_string(),
        _ => "active".to_string(),
    }
}

/// A missing remote state counts as active; any explicit non-active state
/// collapses to `Disabled`, the only non-active state flow offers have.
fn entry_state_from_remote(state: Option<&str>) -> EntryState {
    match state {
        Some(s) if s != "active" => EntryState::Disabled,
        _ => EntryState::Active,
    }
}

/// Plan a full campaign-list merge. Tracker-omitted fields are defaulted
/// here so the upserts always satisfy the store's state constraints.
pub fn plan_campaign_merge(remote: &[RemoteCampaign]) -> CampaignMergePlan {
    let mut plan = CampaignMergePlan::default();

    for rec in remote {
        plan.remote_tracker_ids.push(rec.id);
        plan.upserts.push(CampaignUpsert {
            tracker_id: rec.id,
            name: rec.name.clone().unwrap_or_default(),
            alias: rec.alias.clone().unwrap_or_default(),
            state: normalize_campaign_state(rec.state.as_deref()),
            campaign_type: rec
                .campaign_type
                .clone()
                .unwrap_or_else(|| "position".to_string()),
        });
    }

    plan
}

/// Local tracker ids with no remote counterpart, i.e. the soft-delete set.
pub fn campaigns_to_mark_deleted(local_ids: &[i64], remote_ids: &[i64]) -> Vec<i64> {
    let remote: BTreeSet<i64> = remote_ids.iter().copied().collect();
    local_ids
        .iter()
        .copied()
        .filter(|id| !remote.contains(id))
        .collect()
}

/// Plan the merge of one flow's offer set against the tracker's records.
///
/// Matching is by offer tracker id. For matched rows the remote share,
/// association id and lifecycle state win; a remote activation overrides a
/// local disable. Pin flags never appear in the plan. Remote records without
/// an `offer_id` are skipped.
pub fn plan_flow_offer_merge(
    local: &[LocalFlowOffer],
    cached_offer_ids: &BTreeSet<i64>,
    remote: &[RemoteStreamOffer],
) -> FlowOfferMergePlan {
    let mut plan = FlowOfferMergePlan::default();
    let mut remote_offer_ids: BTreeSet<i64> = BTreeSet::new();

    for rec in remote {
        let Some(offer_id) = rec.offer_id else {
            continue;
        };
        remote_offer_ids.insert(offer_id);

        // Clamped so a malformed remote share can never violate the store's
        // 0..=100 range constraint mid-transaction.
        let share = rec.share.unwrap_or(0).clamp(0, 100);
        let state = entry_state_from_remote(rec.state.as_deref());

        match local.iter().find(|lo| lo.offer_tracker_id == offer_id) {
            Some(lo) => {
                let changed = lo.share != share
                    || lo.association_id != rec.id
                    || lo.state != state;
                if changed {
                    plan.updates.push(FlowOfferUpdate {
                        local_id: lo.id,
                        share,
                        association_id: rec.id,
                        state,
                    });
                }
            }
            None => {
                if !cached_offer_ids.contains(&offer_id) {
                    plan.warm_up_offer_ids.push(offer_id);
                }
                plan.creates.push(FlowOfferCreate {
                    offer_tracker_id: offer_id,
                    association_id: rec.id,
                    share,
                    state,
                });
            }
        }
    }

    // Active locals the tracker no longer carries were removed upstream.
    for lo in local {
        if lo.state.is_active() && !remote_offer_ids.contains(&lo.offer_tracker_id) {
            plan.disable_ids.push(lo.id);
        }
    }

    plan
}
