//! Transactional execution of lifecycle plans.
//!
//! Every operation follows the same shape: begin a transaction, take the
//! flow-row write lock, load the rows in insertion order, run the pure
//! planner, persist what changed, commit. A planner error or store failure
//! returns before commit, so the transaction rolls back on drop.

use std::collections::BTreeMap;

use sqlx::{PgConnection, PgPool};
use tdk_db::FlowOfferRow;
use tdk_shares::{OfferShare, ShareConfig};
use tracing::info;

use crate::planner;
use crate::{LifecycleError, LifecycleOutcome};

fn to_entries(rows: &[FlowOfferRow]) -> Vec<OfferShare> {
    rows.iter()
        .map(|r| OfferShare::new(r.id, r.share, r.is_pinned, r.is_active()))
        .collect()
}

async fn lock_flow_or_fail(conn: &mut PgConnection, flow_id: i64) -> Result<(), LifecycleError> {
    if !tdk_db::lock_flow(conn, flow_id).await? {
        return Err(LifecycleError::NotFound {
            entity: "flow",
            id: flow_id,
        });
    }
    Ok(())
}

async fn load_row(conn: &mut PgConnection, id: i64) -> Result<FlowOfferRow, LifecycleError> {
    tdk_db::flow_offer_by_id(conn, id)
        .await?
        .ok_or(LifecycleError::NotFound {
            entity: "flow offer",
            id,
        })
}

/// Write every share that differs from the loaded rows.
async fn persist_shares(
    conn: &mut PgConnection,
    rows: &[FlowOfferRow],
    shares: &BTreeMap<i64, i32>,
) -> Result<(), LifecycleError> {
    for (&id, &share) in shares {
        let unchanged = rows.iter().any(|r| r.id == id && r.share == share);
        if !unchanged {
            tdk_db::update_flow_offer_share(conn, id, share).await?;
        }
    }
    Ok(())
}

/// Attach an offer (by tracker id) to a flow and rebalance.
pub async fn add_offer(
    pool: &PgPool,
    flow_id: i64,
    offer_tracker_id: i64,
    cfg: &ShareConfig,
) -> Result<LifecycleOutcome, LifecycleError> {
    let mut tx = pool.begin().await?;
    lock_flow_or_fail(&mut tx, flow_id).await?;

    let offer = tdk_db::offer_by_tracker_id(&mut tx, offer_tracker_id)
        .await?
        .ok_or(LifecycleError::NotFound {
            entity: "offer",
            id: offer_tracker_id,
        })?;

    let rows = tdk_db::flow_offers_by_flow(&mut tx, flow_id).await?;
    if rows.iter().any(|r| r.offer_id == offer.id) {
        return Err(LifecycleError::Duplicate {
            flow_id,
            offer_id: offer_tracker_id,
        });
    }

    let new_row =
        tdk_db::insert_flow_offer(&mut tx, flow_id, offer.id, 0, "active", false, None).await?;

    let outcome = planner::plan_add(&to_entries(&rows), new_row.id, cfg)?;
    persist_shares(&mut tx, &rows, &outcome.shares).await?;
    tx.commit().await?;

    info!(flow_id, offer_tracker_id, flow_offer_id = new_row.id, "offer added to flow");
    Ok(outcome)
}

/// Disable a flow offer (share 0) and redistribute the remainder.
pub async fn remove_offer(
    pool: &PgPool,
    flow_offer_id: i64,
    cfg: &ShareConfig,
) -> Result<LifecycleOutcome, LifecycleError> {
    let mut tx = pool.begin().await?;
    let row = load_row(&mut tx, flow_offer_id).await?;
    lock_flow_or_fail(&mut tx, row.flow_id).await?;

    let rows = tdk_db::flow_offers_by_flow(&mut tx, row.flow_id).await?;
    let outcome = planner::plan_remove(&to_entries(&rows), flow_offer_id, cfg)?;

    tdk_db::disable_flow_offers(&mut tx, &[flow_offer_id]).await?;
    persist_shares(&mut tx, &rows, &outcome.shares).await?;
    tx.commit().await?;

    info!(flow_id = row.flow_id, flow_offer_id, "offer removed from flow");
    Ok(outcome)
}

/// Bring a disabled flow offer back and rebalance the grown active set.
pub async fn restore_offer(
    pool: &PgPool,
    flow_offer_id: i64,
    cfg: &ShareConfig,
) -> Result<LifecycleOutcome, LifecycleError> {
    let mut tx = pool.begin().await?;
    let row = load_row(&mut tx, flow_offer_id).await?;
    lock_flow_or_fail(&mut tx, row.flow_id).await?;

    let rows = tdk_db::flow_offers_by_flow(&mut tx, row.flow_id).await?;
    let outcome = planner::plan_restore(&to_entries(&rows), flow_offer_id, cfg)?;

    tdk_db::set_flow_offer_state(&mut tx, flow_offer_id, "active").await?;
    persist_shares(&mut tx, &rows, &outcome.shares).await?;
    tx.commit().await?;

    info!(flow_id = row.flow_id, flow_offer_id, "offer restored");
    Ok(outcome)
}

/// Flip a flow offer's pin flag. Validation runs before commit; a broken
/// allocation rolls the flip back entirely.
pub async fn toggle_pin(
    pool: &PgPool,
    flow_offer_id: i64,
    cfg: &ShareConfig,
) -> Result<LifecycleOutcome, LifecycleError> {
    let mut tx = pool.begin().await?;
    let row = load_row(&mut tx, flow_offer_id).await?;
    lock_flow_or_fail(&mut tx, row.flow_id).await?;

    let rows = tdk_db::flow_offers_by_flow(&mut tx, row.flow_id).await?;
    let outcome = planner::plan_toggle_pin(&to_entries(&rows), flow_offer_id, cfg)?;

    if let Some(pinned) = outcome.pinned {
        tdk_db::set_flow_offer_pin(&mut tx, flow_offer_id, pinned).await?;
    }
    persist_shares(&mut tx, &rows, &outcome.shares).await?;
    tx.commit().await?;

    info!(
        flow_id = row.flow_id,
        flow_offer_id,
        pinned = outcome.pinned,
        "pin toggled"
    );
    Ok(outcome)
}

/// Manual share edit: clamp, pin (unless told otherwise), rebalance the
/// unpinned siblings, validate before commit.
pub async fn update_share(
    pool: &PgPool,
    flow_offer_id: i64,
    requested: i32,
    pin: Option<bool>,
    cfg: &ShareConfig,
) -> Result<LifecycleOutcome, LifecycleError> {
    let mut tx = pool.begin().await?;
    let row = load_row(&mut tx, flow_offer_id).await?;
    lock_flow_or_fail(&mut tx, row.flow_id).await?;

    let rows = tdk_db::flow_offers_by_flow(&mut tx, row.flow_id).await?;
    let outcome = planner::plan_update_share(&to_entries(&rows), flow_offer_id, requested, pin, cfg)?;

    let share = outcome
        .shares
        .get(&flow_offer_id)
        .copied()
        .unwrap_or(requested);
    let pinned = outcome.pinned.unwrap_or(true);
    tdk_db::set_flow_offer_share_pin(&mut tx, flow_offer_id, share, pinned).await?;
    persist_shares(&mut tx, &rows, &outcome.shares).await?;
    tx.commit().await?;

    info!(
        flow_id = row.flow_id,
        flow_offer_id,
        share,
        pinned,
        warning = outcome.warning.as_deref(),
        "share updated"
    );
    Ok(outcome)
}
