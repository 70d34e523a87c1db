//! tdk-db: the local record store.
//!
//! Campaigns, flows, offers and flow-offer allocations live in Postgres.
//! Record operations take `&mut PgConnection` so the same function works
//! inside a transaction (`&mut *tx`) and on a pooled connection; connection
//! and migration helpers work on the pool.
//!
//! Removal is always a state transition, never a physical delete: campaigns
//! absent from a sync pass become `deleted`, flow offers removed locally or
//! upstream become `disabled` with share 0.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgConnection, PgPool};

mod flow_offers;

pub use flow_offers::*;

pub const ENV_DB_URL: &str = "TDK_DATABASE_URL";

/// Connect to Postgres using TDK_DATABASE_URL.
pub async fn connect_from_env() -> Result<PgPool> {
    let url =
        std::env::var(ENV_DB_URL).with_context(|| format!("missing env var {ENV_DB_URL}"))?;

    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&url)
        .await
        .context("failed to connect to Postgres")?;

    Ok(pool)
}

/// Run embedded SQLx migrations.
pub async fn migrate(pool: &PgPool) -> Result<()> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .context("db migrate failed")?;
    Ok(())
}

/// Simple status query (connectivity + schema presence).
pub async fn status(pool: &PgPool) -> Result<DbStatus> {
    let (one,): (i32,) = sqlx::query_as::<_, (i32,)>("select 1")
        .fetch_one(pool)
        .await
        .context("status connectivity query failed")?;
    let ok = one == 1;

    let (exists,): (bool,) = sqlx::query_as::<_, (bool,)>(
        r#"
        select exists (
            select 1
            from information_schema.tables
            where table_schema='public' and table_name='campaigns'
        )
        "#,
    )
    .fetch_one(pool)
    .await
    .context("status table-exists query failed")?;

    Ok(DbStatus {
        ok,
        has_campaigns_table: exists,
    })
}

#[derive(Debug, Clone)]
pub struct DbStatus {
    pub ok: bool,
    pub has_campaigns_table: bool,
}

// ---------------------------------------------------------------------------
// Campaigns
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct CampaignRow {
    pub id: i64,
    pub tracker_id: i64,
    pub name: String,
    pub alias: String,
    pub state: String,
    pub campaign_type: String,
    pub synced_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

/// Insert or refresh one campaign by tracker id. Returns the local id.
pub async fn upsert_campaign(
    conn: &mut PgConnection,
    tracker_id: i64,
    name: &str,
    alias: &str,
    state: &str,
    campaign_type: &str,
) -> Result<i64> {
    let (id,): (i64,) = sqlx::query_as(
        r#"
        insert into campaigns (tracker_id, name, alias, state, campaign_type, synced_at)
        values ($1, $2, $3, $4, $5, now())
        on conflict (tracker_id) do update set
          name = excluded.name,
          alias = excluded.alias,
          state = excluded.state,
          campaign_type = excluded.campaign_type,
          synced_at = now()
        returning id
        "#,
    )
    .bind(tracker_id)
    .bind(name)
    .bind(alias)
    .bind(state)
    .bind(campaign_type)
    .fetch_one(conn)
    .await
    .context("upsert_campaign failed")?;

    Ok(id)
}

/// Soft-delete the campaigns with the given tracker ids.
pub async fn mark_campaigns_deleted(
    conn: &mut PgConnection,
    tracker_ids: &[i64],
) -> Result<u64> {
    if tracker_ids.is_empty() {
        return Ok(0);
    }
    let res = sqlx::query(
        r#"
        update campaigns
        set state = 'deleted'
        where state <> 'deleted'
          and tracker_id = any($1)
        "#,
    )
    .bind(tracker_ids)
    .execute(conn)
    .await
    .context("mark_campaigns_deleted failed")?;

    Ok(res.rows_affected())
}

pub async fn campaign_by_id(
    conn: &mut PgConnection,
    id: i64,
) -> Result<Option<CampaignRow>> {
    let row = sqlx::query_as::<_, CampaignRow>("select * from campaigns where id = $1")
        .bind(id)
        .fetch_optional(conn)
        .await
        .context("campaign_by_id failed")?;
    Ok(row)
}

pub async fn campaign_by_tracker_id(
    conn: &mut PgConnection,
    tracker_id: i64,
) -> Result<Option<CampaignRow>> {
    let row = sqlx::query_as::<_, CampaignRow>(
        "select * from campaigns where tracker_id = $1",
    )
    .bind(tracker_id)
    .fetch_optional(conn)
    .await
    .context("campaign_by_tracker_id failed")?;
    Ok(row)
}

pub async fn campaign_tracker_ids(conn: &mut PgConnection) -> Result<Vec<i64>> {
    let rows: Vec<(i64,)> = sqlx::query_as("select tracker_id from campaigns order by tracker_id")
        .fetch_all(conn)
        .await
        .context("campaign_tracker_ids failed")?;
    Ok(rows.into_iter().map(|(id,)| id).collect())
}

// ---------------------------------------------------------------------------
// Flows
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct FlowRow {
    pub id: i64,
    pub campaign_id: i64,
    pub tracker_id: i64,
    pub name: String,
    pub flow_type: String,
    pub position: i32,
    pub state: String,
    pub synced_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

/// Insert or refresh one flow by (campaign, tracker id).
pub async fn upsert_flow(
    conn: &mut PgConnection,
    campaign_id: i64,
    tracker_id: i64,
    name: &str,
    flow_type: &str,
    position: i32,
    state: &str,
) -> Result<FlowRow> {
    let row = sqlx::query_as::<_, FlowRow>(
        r#"
        insert into flows (campaign_id, tracker_id, name, flow_type, position, state, synced_at)
        values ($1, $2, $3, $4, $5, $6, now())
        on conflict (campaign_id, tracker_id) do update set
          name = excluded.name,
          flow_type = excluded.flow_type,
          position = excluded.position,
          state = excluded.state,
          synced_at = now()
        returning *
        "#,
    )
    .bind(campaign_id)
    .bind(tracker_id)
    .bind(name)
    .bind(flow_type)
    .bind(position)
    .bind(state)
    .fetch_one(conn)
    .await
    .context("upsert_flow failed")?;

    Ok(row)
}

pub async fn flow_by_id(conn: &mut PgConnection, flow_id: i64) -> Result<Option<FlowRow>> {
    let row = sqlx::query_as::<_, FlowRow>("select * from flows where id = $1")
        .bind(flow_id)
        .fetch_optional(conn)
        .await
        .context("flow_by_id failed")?;
    Ok(row)
}

pub async fn flows_by_campaign(
    conn: &mut PgConnection,
    campaign_id: i64,
) -> Result<Vec<FlowRow>> {
    let rows = sqlx::query_as::<_, FlowRow>(
        "select * from flows where campaign_id = $1 order by position, id",
    )
    .bind(campaign_id)
    .fetch_all(conn)
    .await
    .context("flows_by_campaign failed")?;
    Ok(rows)
}

/// Take the flow-level write lock for the current transaction.
///
/// Every mutating operation over one flow's offer set runs behind this lock:
/// two interleaved rebalances on the same flow would race read-then-write and
/// could break the 100%-sum invariant. Returns false when the flow row does
/// not exist.
pub async fn lock_flow(conn: &mut PgConnection, flow_id: i64) -> Result<bool> {
    let row: Option<(i64,)> =
        sqlx::query_as("select id from flows where id = $1 for update")
            .bind(flow_id)
            .fetch_optional(conn)
            .await
            .context("lock_flow failed")?;
    Ok(row.is_some())
}

// ---------------------------------------------------------------------------
// Offers (read cache)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct OfferRow {
    pub id: i64,
    pub tracker_id: i64,
    pub name: String,
    pub state: String,
    pub cached_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

/// Insert or refresh one cached offer by tracker id. Returns the local id.
pub async fn upsert_offer(
    conn: &mut PgConnection,
    tracker_id: i64,
    name: &str,
    state: &str,
) -> Result<i64> {
    let (id,): (i64,) = sqlx::query_as(
        r#"
        insert into offers (tracker_id, name, state, cached_at)
        values ($1, $2, $3, now())
        on conflict (tracker_id) do update set
          name = excluded.name,
          state = excluded.state,
          cached_at = now()
        returning id
        "#,
    )
    .bind(tracker_id)
    .bind(name)
    .bind(state)
    .fetch_one(conn)
    .await
    .context("upsert_offer failed")?;

    Ok(id)
}

pub async fn offer_by_tracker_id(
    conn: &mut PgConnection,
    tracker_id: i64,
) -> Result<Option<OfferRow>> {
    let row = sqlx::query_as::<_, OfferRow>("select * from offers where tracker_id = $1")
        .bind(tracker_id)
        .fetch_optional(conn)
        .await
        .context("offer_by_tracker_id failed")?;
    Ok(row)
}

/// Which of the given tracker ids are already cached locally.
pub async fn cached_offer_tracker_ids(
    conn: &mut PgConnection,
    tracker_ids: &[i64],
) -> Result<Vec<i64>> {
    let rows: Vec<(i64,)> = sqlx::query_as(
        "select tracker_id from offers where tracker_id = any($1) order by tracker_id",
    )
    .bind(tracker_ids)
    .fetch_all(conn)
    .await
    .context("cached_offer_tracker_ids failed")?;
    Ok(rows.into_iter().map(|(id,)| id).collect())
}

/// Autocomplete lookup over the offer cache: active offers whose name
/// contains the query, ordered by name.
pub async fn offers_autocomplete(
    conn: &mut PgConnection,
    query: &str,
    limit: i64,
) -> Result<Vec<OfferRow>> {
    let pattern = format!("%{query}%");
    let rows = sqlx::query_as::<_, OfferRow>(
        r#"
        select * from offers
        where state = 'active' and name ilike $1
        order by name
        limit $2
        "#,
    )
    .bind(&pattern)
    .bind(limit)
    .fetch_all(conn)
    .await
    .context("offers_autocomplete failed")?;
    Ok(rows)
}
