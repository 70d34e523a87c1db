//! tdk-sync: the sync orchestrator.
//!
//! Drives the remote → local pipeline (fetch, plan, apply) and the local →
//! remote push. Generic over [`TrackerApi`] so tests wire in stubs.
//!
//! Failure policy: any tracker error aborts the whole call and propagates
//! with context. There is no partial silent success; each flow's merge is
//! applied in one transaction behind the flow-row write lock, so an
//! interrupted sync never leaves a half-merged flow behind.

use std::collections::{BTreeMap, BTreeSet};

use anyhow::{bail, Context, Result};
use serde::Serialize;
use sqlx::PgPool;
use tdk_db::FlowOfferDetail;
use tdk_reconcile::{
    campaigns_to_mark_deleted, plan_campaign_merge, plan_flow_offer_merge, LocalFlowOffer,
};
use tdk_schemas::{RemoteStream, StreamOfferInput};
use tdk_tracker::TrackerApi;
use tracing::{info, warn};

mod helpers;

pub use helpers::{build_stream_offers_update, normalize_geo_codes, redirect_stream_name};

use helpers::{compute_flow_diff, local_snapshot, normalize_entity_state, placeholder_offer_name};

const CAMPAIGN_PAGE_SIZE: u32 = 100;

/// Local vs remote allocation of one flow, active rows only on both sides.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FlowDiff {
    pub has_differences: bool,
    pub local: BTreeMap<i64, i32>,
    pub remote: BTreeMap<i64, i32>,
}

pub struct SyncOrchestrator<T> {
    pool: PgPool,
    tracker: T,
}

impl<T: TrackerApi> SyncOrchestrator<T> {
    pub fn new(pool: PgPool, tracker: T) -> Self {
        Self { pool, tracker }
    }

    pub fn tracker(&self) -> &T {
        &self.tracker
    }

    /// Pull every campaign from the tracker, upsert by tracker id and
    /// soft-mark the locally known campaigns the tracker no longer lists.
    /// Returns the number of campaigns synced.
    pub async fn sync_campaigns(&self) -> Result<u64> {
        let mut remote = Vec::new();
        let mut offset = 0;
        loop {
            let page = self
                .tracker
                .list_campaigns(offset, CAMPAIGN_PAGE_SIZE)
                .await
                .context("failed to list campaigns from tracker")?;
            let page_len = page.len();
            remote.extend(page);
            if page_len < CAMPAIGN_PAGE_SIZE as usize {
                break;
            }
            offset += CAMPAIGN_PAGE_SIZE;
        }

        let plan = plan_campaign_merge(&remote);

        let mut tx = self.pool.begin().await?;
        for up in &plan.upserts {
            tdk_db::upsert_campaign(
                &mut tx,
                up.tracker_id,
                &up.name,
                &up.alias,
                &up.state,
                &up.campaign_type,
            )
            .await?;
        }
        let local_ids = tdk_db::campaign_tracker_ids(&mut tx).await?;
        let gone = campaigns_to_mark_deleted(&local_ids, &plan.remote_tracker_ids);
        let deleted = tdk_db::mark_campaigns_deleted(&mut tx, &gone).await?;
        tx.commit().await?;

        info!(
            synced = plan.upserts.len(),
            soft_deleted = deleted,
            "campaign sync complete"
        );
        Ok(plan.upserts.len() as u64)
    }

    /// Pull the streams of one campaign and merge each stream's offer set
    /// into the corresponding flow. Returns the number of streams synced.
    pub async fn sync_streams(&self, campaign_tracker_id: i64) -> Result<u64> {
        let campaign = {
            let mut conn = self.pool.acquire().await?;
            tdk_db::campaign_by_tracker_id(&mut conn, campaign_tracker_id)
                .await?
                .with_context(|| format!("campaign {campaign_tracker_id} is not synced locally"))?
        };

        let streams = self
            .tracker
            .list_streams(campaign_tracker_id)
            .await
            .with_context(|| format!("failed to list streams of campaign {campaign_tracker_id}"))?;

        let mut synced = 0;
        for stream in &streams {
            self.sync_one_stream(campaign.id, stream).await?;
            synced += 1;
        }

        info!(campaign_tracker_id, streams = synced, "stream sync complete");
        Ok(synced)
    }

    async fn sync_one_stream(&self, campaign_id: i64, stream: &RemoteStream) -> Result<()> {
        let remote_offer_ids: Vec<i64> =
            stream.offers.iter().filter_map(|o| o.offer_id).collect();

        // Warm the offer cache up outside the transaction: a bulk fetch per
        // missing id set, with placeholder rows for ids the tracker's offer
        // list does not cover.
        self.warm_up_offer_cache(&remote_offer_ids).await?;

        let mut tx = self.pool.begin().await?;

        let flow = tdk_db::upsert_flow(
            &mut tx,
            campaign_id,
            stream.id,
            stream.name.as_deref().unwrap_or(""),
            stream.stream_type.as_deref().unwrap_or("offers"),
            stream.position.unwrap_or(0),
            normalize_entity_state(stream.state.as_deref()),
        )
        .await?;
        tdk_db::lock_flow(&mut tx, flow.id).await?;

        let details = tdk_db::flow_offer_details(&mut tx, flow.id).await?;
        let locals: Vec<LocalFlowOffer> = details.iter().map(local_snapshot).collect();
        let cached: BTreeSet<i64> =
            tdk_db::cached_offer_tracker_ids(&mut tx, &remote_offer_ids)
                .await?
                .into_iter()
                .collect();

        let plan = plan_flow_offer_merge(&locals, &cached, &stream.offers);

        if !plan.disable_ids.is_empty() {
            tdk_db::disable_flow_offers(&mut tx, &plan.disable_ids).await?;
        }
        for up in &plan.updates {
            tdk_db::update_flow_offer_from_remote(
                &mut tx,
                up.local_id,
                up.share,
                up.association_id,
                up.state.as_str(),
            )
            .await?;
        }
        for create in &plan.creates {
            let offer_id = match tdk_db::offer_by_tracker_id(&mut tx, create.offer_tracker_id)
                .await?
            {
                Some(offer) => offer.id,
                None => {
                    // Still unknown after warm-up: a placeholder keeps the
                    // association usable until the next offer sync names it.
                    tdk_db::upsert_offer(
                        &mut tx,
                        create.offer_tracker_id,
                        &placeholder_offer_name(create.offer_tracker_id),
                        "active",
                    )
                    .await?
                }
            };
            tdk_db::insert_flow_offer(
                &mut tx,
                flow.id,
                offer_id,
                create.share,
                create.state.as_str(),
                false,
                create.association_id,
            )
            .await?;
        }

        tx.commit().await?;

        info!(
            flow_id = flow.id,
            stream_id = stream.id,
            disabled = plan.disable_ids.len(),
            updated = plan.updates.len(),
            created = plan.creates.len(),
            "flow offers merged"
        );
        Ok(())
    }

    async fn warm_up_offer_cache(&self, tracker_ids: &[i64]) -> Result<()> {
        if tracker_ids.is_empty() {
            return Ok(());
        }
        let cached = {
            let mut conn = self.pool.acquire().await?;
            tdk_db::cached_offer_tracker_ids(&mut conn, tracker_ids).await?
        };
        let missing: Vec<i64> = tracker_ids
            .iter()
            .copied()
            .filter(|id| !cached.contains(id))
            .collect();
        if missing.is_empty() {
            return Ok(());
        }
        warn!(missing = ?missing, "offer cache misses, warming up");
        self.sync_offers().await?;
        Ok(())
    }

    /// Refresh the offer cache from the tracker. Returns the number of
    /// offers upserted.
    pub async fn sync_offers(&self) -> Result<u64> {
        let offers = self
            .tracker
            .list_offers()
            .await
            .context("failed to list offers from tracker")?;

        let mut tx = self.pool.begin().await?;
        for offer in &offers {
            let name = offer
                .name
                .clone()
                .unwrap_or_else(|| placeholder_offer_name(offer.id));
            tdk_db::upsert_offer(
                &mut tx,
                offer.id,
                &name,
                offer.state.as_deref().unwrap_or("active"),
            )
            .await?;
        }
        tx.commit().await?;

        info!(offers = offers.len(), "offer cache refreshed");
        Ok(offers.len() as u64)
    }

    /// Push one flow's active allocation to its tracker stream. Disabled
    /// rows stay local and are never pushed. The active set is validated
    /// first; an invalid sum aborts before any remote call.
    pub async fn push_stream_offers(&self, flow_id: i64) -> Result<()> {
        let (flow, details) = self.load_flow(flow_id).await?;

        let update = build_stream_offers_update(&details)?;
        self.tracker
            .update_stream(flow.tracker_id, &update)
            .await
            .with_context(|| format!("failed to push offers of flow {flow_id} to the tracker"))?;

        info!(flow_id, offers = update.offers.len(), "flow offers pushed");
        Ok(())
    }

    /// Compare the local active allocation with the tracker's, both sides
    /// keyed by tracker offer id. Disabled rows are excluded on both sides.
    pub async fn compare_with_tracker(&self, flow_id: i64) -> Result<FlowDiff> {
        let (flow, details) = self.load_flow(flow_id).await?;

        let stream = self
            .tracker
            .get_stream(flow.tracker_id)
            .await
            .with_context(|| format!("failed to fetch stream {} from tracker", flow.tracker_id))?;

        Ok(compute_flow_diff(&details, &stream))
    }

    /// Throw local edits away: disabled rows come back to active, then the
    /// campaign's streams are re-synced so the tracker state wins. Returns
    /// the number of streams re-synced.
    pub async fn cancel_changes(&self, flow_id: i64) -> Result<u64> {
        let campaign = {
            let mut conn = self.pool.acquire().await?;
            let flow = tdk_db::flow_by_id(&mut conn, flow_id)
                .await?
                .with_context(|| format!("flow {flow_id} not found"))?;
            let restored =
                tdk_db::reactivate_disabled_flow_offers(&mut conn, flow_id).await?;
            info!(flow_id, restored, "local edits discarded before resync");
            tdk_db::campaign_by_id(&mut conn, flow.campaign_id)
                .await?
                .with_context(|| format!("campaign {} not found", flow.campaign_id))?
        };

        self.sync_streams(campaign.tracker_id).await
    }

    /// Create a campaign on the tracker with the conventional two streams: a
    /// geo-filtered redirect to Google first, then a catch-all forced stream
    /// routing 100% of traffic to the given offer. The campaign is stored
    /// locally and its local id returned.
    pub async fn create_campaign_with_streams(
        &self,
        name: &str,
        geo_codes: &[String],
        offer_tracker_id: i64,
    ) -> Result<i64> {
        let geo = normalize_geo_codes(geo_codes);
        if geo.is_empty() {
            bail!("at least one geo code is required");
        }

        // The offer must be known; fall back to a cache refresh before
        // refusing.
        {
            let mut conn = self.pool.acquire().await?;
            if tdk_db::offer_by_tracker_id(&mut conn, offer_tracker_id)
                .await?
                .is_none()
            {
                drop(conn);
                self.sync_offers().await?;
                let mut conn = self.pool.acquire().await?;
                if tdk_db::offer_by_tracker_id(&mut conn, offer_tracker_id)
                    .await?
                    .is_none()
                {
                    bail!("offer {offer_tracker_id} not found on the tracker");
                }
            }
        }

        let created = self
            .tracker
            .create_campaign(name, None)
            .await
            .context("failed to create campaign on the tracker")?;

        let mut redirect = tdk_schemas::NewStreamSpec::redirect(
            created.id,
            redirect_stream_name(&geo),
            0,
        );
        redirect.action_options = Some(serde_json::json!({ "url": "https://www.google.com" }));
        redirect.filters = Some(vec![tdk_schemas::StreamFilter {
            name: "country".to_string(),
            mode: "accept".to_string(),
            payload: geo,
        }]);
        self.tracker
            .create_stream(&redirect)
            .await
            .context("failed to create the redirect stream")?;

        let forced = tdk_schemas::NewStreamSpec::forced_offers(
            created.id,
            "All → Offers",
            1,
            vec![StreamOfferInput {
                offer_id: offer_tracker_id,
                share: 100,
                state: "active".to_string(),
            }],
        );
        self.tracker
            .create_stream(&forced)
            .await
            .context("failed to create the offers stream")?;

        let mut conn = self.pool.acquire().await?;
        let local_id = tdk_db::upsert_campaign(
            &mut conn,
            created.id,
            created.name.as_deref().unwrap_or(name),
            created.alias.as_deref().unwrap_or(""),
            normalize_entity_state(created.state.as_deref()),
            created.campaign_type.as_deref().unwrap_or("position"),
        )
        .await?;

        info!(
            campaign_tracker_id = created.id,
            local_id, "campaign created with redirect and offers streams"
        );
        Ok(local_id)
    }

    async fn load_flow(
        &self,
        flow_id: i64,
    ) -> Result<(tdk_db::FlowRow, Vec<FlowOfferDetail>)> {
        let mut conn = self.pool.acquire().await?;
        let flow = tdk_db::flow_by_id(&mut conn, flow_id)
            .await?
            .with_context(|| format!("flow {flow_id} not found"))?;
        let details = tdk_db::flow_offer_details(&mut conn, flow_id).await?;
        Ok((flow, details))
    }
}
