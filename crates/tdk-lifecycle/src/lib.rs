//! tdk-lifecycle: flow-offer lifecycle operations.
//!
//! State machine per flow offer: `active ⇄ disabled`, with `is_pinned` as an
//! independent flag. Split in two layers:
//!
//! - [`planner`]: pure functions over a snapshot of one flow's rows. Each
//!   returns the complete post-operation share map so callers redisplay from
//!   it instead of computing deltas.
//! - [`executor`]: transactional wrappers. Every operation takes the flow-row
//!   write lock, loads the rows, runs the planner, persists and commits. A
//!   planner failure drops the transaction, so nothing partial ever lands.

use std::collections::BTreeMap;

use serde::Serialize;
use tdk_shares::ShareError;

mod executor;
mod planner;

pub use executor::{add_offer, remove_offer, restore_offer, toggle_pin, update_share};
pub use planner::{plan_add, plan_remove, plan_restore, plan_toggle_pin, plan_update_share};

// ─── LifecycleOutcome ────────────────────────────────────────────────────────

/// Result of one lifecycle operation.
///
/// `shares` maps every active flow offer to its share after the operation
/// (plus, after a removal, the removed row at 0 while siblings remain).
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct LifecycleOutcome {
    pub shares: BTreeMap<i64, i32>,
    /// New pin state, for the operations that change it.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pinned: Option<bool>,
    /// Set when the requested value was clamped.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
}

// ─── LifecycleError ──────────────────────────────────────────────────────────

#[derive(Debug)]
pub enum LifecycleError {
    /// The (flow, offer) pair already exists in any state; a disabled pair
    /// must be restored, not re-added.
    Duplicate { flow_id: i64, offer_id: i64 },
    NotFound { entity: &'static str, id: i64 },
    /// Pinned shares alone consume 100% or more.
    OverAllocated { pinned_sum: i32 },
    /// Requested value out of range, or the post-operation active set breaks
    /// the 100%-sum invariant.
    Validation(String),
    /// The record store failed; the transaction was rolled back.
    Store(String),
}

impl std::fmt::Display for LifecycleError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Duplicate { flow_id, offer_id } => {
                write!(f, "offer {offer_id} is already attached to flow {flow_id}")
            }
            Self::NotFound { entity, id } => write!(f, "{entity} {id} not found"),
            Self::OverAllocated { pinned_sum } => {
                write!(f, "pinned shares sum to {pinned_sum}%, must be below 100%")
            }
            Self::Validation(msg) => write!(f, "validation failed: {msg}"),
            Self::Store(msg) => write!(f, "store error: {msg}"),
        }
    }
}

impl std::error::Error for LifecycleError {}

impl From<ShareError> for LifecycleError {
    fn from(err: ShareError) -> Self {
        match err {
            ShareError::OverAllocated { pinned_sum } => Self::OverAllocated { pinned_sum },
            ShareError::Invalid { message } => Self::Validation(message),
        }
    }
}

impl From<anyhow::Error> for LifecycleError {
    fn from(err: anyhow::Error) -> Self {
        Self::Store(format!("{err:#}"))
    }
}

impl From<sqlx::Error> for LifecycleError {
    fn from(err: sqlx::Error) -> Self {
        Self::Store(err.to_string())
    }
}
