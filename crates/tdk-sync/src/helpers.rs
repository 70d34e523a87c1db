//! Pure helpers behind the orchestrator: payload construction, diffing and
//! normalization. Kept free of IO so they are unit-testable without a store
//! or tracker.

use std::collections::BTreeMap;

use anyhow::{bail, Result};
use tdk_db::FlowOfferDetail;
use tdk_reconcile::{EntryState, LocalFlowOffer};
use tdk_schemas::{RemoteStream, StreamOfferInput, StreamOffersUpdate};
use tdk_shares::OfferShare;

use crate::FlowDiff;

/// Campaigns and flows share the same closed state set; anything the tracker
/// sends outside it falls back to `active` so the store's CHECK constraints
/// never trip mid-merge.
pub(crate) fn normalize_entity_state(state: Option<&str>) -> &'static str {
    match state {
        Some("disabled") => "disabled",
        Some("deleted") => "deleted",
        _ => "active",
    }
}

pub(crate) fn placeholder_offer_name(tracker_id: i64) -> String {
    format!("Offer {tracker_id}")
}

pub(crate) fn local_snapshot(d: &FlowOfferDetail) -> LocalFlowOffer {
    LocalFlowOffer {
        id: d.id,
        offer_tracker_id: d.offer_tracker_id,
        association_id: d.tracker_offer_stream_id,
        share: d.share,
        is_pinned: d.is_pinned,
        state: if d.is_active() {
            EntryState::Active
        } else {
            EntryState::Disabled
        },
    }
}

/// Build the `PUT streams/{id}` body from one flow's rows: active rows only,
/// keyed by tracker offer id, validated to sum to 100 before anything leaves
/// the process.
pub fn build_stream_offers_update(details: &[FlowOfferDetail]) -> Result<StreamOffersUpdate> {
    let active: Vec<&FlowOfferDetail> = details.iter().filter(|d| d.is_active()).collect();

    let snapshot: Vec<OfferShare> = active
        .iter()
        .map(|d| OfferShare::new(d.id, d.share, d.is_pinned, true))
        .collect();
    if let Err(err) = tdk_shares::validate(&snapshot) {
        bail!("refusing to push an invalid allocation: {err}");
    }

    Ok(StreamOffersUpdate {
        offers: active
            .iter()
            .map(|d| StreamOfferInput {
                offer_id: d.offer_tracker_id,
                share: d.share,
                state: d.state.clone(),
            })
            .collect(),
    })
}

/// Active local rows vs active remote records, both as tracker-offer-id →
/// share maps. Remote records must be explicitly `active` to count, matching
/// what the tracker actually serves.
pub(crate) fn compute_flow_diff(details: &[FlowOfferDetail], stream: &RemoteStream) -> FlowDiff {
    let local: BTreeMap<i64, i32> = details
        .iter()
        .filter(|d| d.is_active())
        .map(|d| (d.offer_tracker_id, d.share))
        .collect();

    let remote: BTreeMap<i64, i32> = stream
        .offers
        .iter()
        .filter(|o| o.state.as_deref() == Some("active"))
        .filter_map(|o| o.offer_id.map(|id| (id, o.share.unwrap_or(0))))
        .collect();

    FlowDiff {
        has_differences: local != remote,
        local,
        remote,
    }
}

/// Uppercased, trimmed, de-blanked geo codes in caller order.
pub fn normalize_geo_codes(codes: &[String]) -> Vec<String> {
    codes
        .iter()
        .map(|c| c.trim().to_uppercase())
        .filter(|c| !c.is_empty())
        .collect()
}

/// Display name of the geo-filtered redirect stream: the first three codes,
/// then a `+N` suffix for the rest.
pub fn redirect_stream_name(geo: &[String]) -> String {
    let mut label = geo
        .iter()
        .take(3)
        .cloned()
        .collect::<Vec<_>>()
        .join(", ");
    if geo.len() > 3 {
        label.push_str(&format!(" +{}", geo.len() - 3));
    }
    format!("{label} → Google")
}

// ─── Tests ────────────────────────────────────────────────────────────────────
