//! Flow-offer allocation rows.
//!
//! Rows are returned in insertion order (`order by id`) everywhere: the
//! rebalancer resolves fractional remainders toward the earliest rows, and
//! that ordering is user-visible, so it must be stable across reads.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::PgConnection;

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct FlowOfferRow {
    pub id: i64,
    pub flow_id: i64,
    pub offer_id: i64,
    pub share: i32,
    pub is_pinned: bool,
    pub state: String,
    pub tracker_offer_stream_id: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl FlowOfferRow {
    pub fn is_active(&self) -> bool {
        self.state == "active"
    }
}

/// One flow-offer row joined with its cached offer, for sync and push paths
/// that need the tracker-side offer id alongside the allocation.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct FlowOfferDetail {
    pub id: i64,
    pub flow_id: i64,
    pub offer_id: i64,
    pub offer_tracker_id: i64,
    pub offer_name: String,
    pub share: i32,
    pub is_pinned: bool,
    pub state: String,
    pub tracker_offer_stream_id: Option<i64>,
}

impl FlowOfferDetail {
    pub fn is_active(&self) -> bool {
        self.state == "active"
    }
}

/// All rows of one flow joined with their offers, in insertion order.
pub async fn flow_offer_details(
    conn: &mut PgConnection,
    flow_id: i64,
) -> Result<Vec<FlowOfferDetail>> {
    let rows = sqlx::query_as::<_, FlowOfferDetail>(
        r#"
        select fo.id, fo.flow_id, fo.offer_id,
               o.tracker_id as offer_tracker_id, o.name as offer_name,
               fo.share, fo.is_pinned, fo.state, fo.tracker_offer_stream_id
        from flow_offers fo
        join offers o on o.id = fo.offer_id
        where fo.flow_id = $1
        order by fo.id
        "#,
    )
    .bind(flow_id)
    .fetch_all(conn)
    .await
    .context("flow_offer_details failed")?;
    Ok(rows)
}

/// All rows of one flow, any state, in insertion order.
pub async fn flow_offers_by_flow(
    conn: &mut PgConnection,
    flow_id: i64,
) -> Result<Vec<FlowOfferRow>> {
    let rows = sqlx::query_as::<_, FlowOfferRow>(
        "select * from flow_offers where flow_id = $1 order by id",
    )
    .bind(flow_id)
    .fetch_all(conn)
    .await
    .context("flow_offers_by_flow failed")?;
    Ok(rows)
}

/// Active rows of one flow, in insertion order.
pub async fn active_flow_offers(
    conn: &mut PgConnection,
    flow_id: i64,
) -> Result<Vec<FlowOfferRow>> {
    let rows = sqlx::query_as::<_, FlowOfferRow>(
        "select * from flow_offers where flow_id = $1 and state = 'active' order by id",
    )
    .bind(flow_id)
    .fetch_all(conn)
    .await
    .context("active_flow_offers failed")?;
    Ok(rows)
}

pub async fn flow_offer_by_id(
    conn: &mut PgConnection,
    id: i64,
) -> Result<Option<FlowOfferRow>> {
    let row = sqlx::query_as::<_, FlowOfferRow>("select * from flow_offers where id = $1")
        .bind(id)
        .fetch_optional(conn)
        .await
        .context("flow_offer_by_id failed")?;
    Ok(row)
}

pub async fn insert_flow_offer(
    conn: &mut PgConnection,
    flow_id: i64,
    offer_id: i64,
    share: i32,
    state: &str,
    is_pinned: bool,
    tracker_offer_stream_id: Option<i64>,
) -> Result<FlowOfferRow> {
    let row = sqlx::query_as::<_, FlowOfferRow>(
        r#"
        insert into flow_offers (flow_id, offer_id, share, state, is_pinned, tracker_offer_stream_id)
        values ($1, $2, $3, $4, $5, $6)
        returning *
        "#,
    )
    .bind(flow_id)
    .bind(offer_id)
    .bind(share)
    .bind(state)
    .bind(is_pinned)
    .bind(tracker_offer_stream_id)
    .fetch_one(conn)
    .await
    .context("insert_flow_offer failed")?;
    Ok(row)
}

pub async fn update_flow_offer_share(
    conn: &mut PgConnection,
    id: i64,
    share: i32,
) -> Result<()> {
    sqlx::query("update flow_offers set share = $2, updated_at = now() where id = $1")
        .bind(id)
        .bind(share)
        .execute(conn)
        .await
        .context("update_flow_offer_share failed")?;
    Ok(())
}

pub async fn set_flow_offer_state(
    conn: &mut PgConnection,
    id: i64,
    state: &str,
) -> Result<()> {
    sqlx::query("update flow_offers set state = $2, updated_at = now() where id = $1")
        .bind(id)
        .bind(state)
        .execute(conn)
        .await
        .context("set_flow_offer_state failed")?;
    Ok(())
}

pub async fn set_flow_offer_pin(
    conn: &mut PgConnection,
    id: i64,
    is_pinned: bool,
) -> Result<()> {
    sqlx::query("update flow_offers set is_pinned = $2, updated_at = now() where id = $1")
        .bind(id)
        .bind(is_pinned)
        .execute(conn)
        .await
        .context("set_flow_offer_pin failed")?;
    Ok(())
}

pub async fn set_flow_offer_share_pin(
    conn: &mut PgConnection,
    id: i64,
    share: i32,
    is_pinned: bool,
) -> Result<()> {
    sqlx::query(
        "update flow_offers set share = $2, is_pinned = $3, updated_at = now() where id = $1",
    )
    .bind(id)
    .bind(share)
    .bind(is_pinned)
    .execute(conn)
    .await
    .context("set_flow_offer_share_pin failed")?;
    Ok(())
}

/// Removal transition: disabled with share 0. The row stays for restore.
pub async fn disable_flow_offers(conn: &mut PgConnection, ids: &[i64]) -> Result<u64> {
    let res = sqlx::query(
        "update flow_offers set state = 'disabled', share = 0, updated_at = now() where id = any($1)",
    )
    .bind(ids)
    .execute(conn)
    .await
    .context("disable_flow_offers failed")?;
    Ok(res.rows_affected())
}

/// Sync overwrite: share and association id come from the remote record,
/// state from the merge policy. Pin state is deliberately not touched here —
/// it is local-only truth.
pub async fn update_flow_offer_from_remote(
    conn: &mut PgConnection,
    id: i64,
    share: i32,
    tracker_offer_stream_id: Option<i64>,
    state: &str,
) -> Result<()> {
    sqlx::query(
        r#"
        update flow_offers
        set share = $2, tracker_offer_stream_id = $3, state = $4, updated_at = now()
        where id = $1
        "#,
    )
    .bind(id)
    .bind(share)
    .bind(tracker_offer_stream_id)
    .bind(state)
    .execute(conn)
    .await
    .context("update_flow_offer_from_remote failed")?;
    Ok(())
}

/// Bring every disabled row of the flow back to active (used before a
/// cancel-changes resync, where the tracker state then wins).
pub async fn reactivate_disabled_flow_offers(
    conn: &mut PgConnection,
    flow_id: i64,
) -> Result<u64> {
    let res = sqlx::query(
        "update flow_offers set state = 'active', updated_at = now() where flow_id = $1 and state = 'disabled'",
    )
    .bind(flow_id)
    .execute(conn)
    .await
    .context("reactivate_disabled_flow_offers failed")?;
    Ok(res.rows_affected())
}
