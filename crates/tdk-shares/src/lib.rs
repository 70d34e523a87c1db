//! tdk-shares: share rebalancing
//!
//! Responsibilities (pure, no IO, no store):
//! - Recompute the percentage allocation of the active offers in one flow so
//!   the total is exactly 100, leaving pinned offers untouched.
//! - Validate the 100%-sum invariant as a post-condition check.
//! - Compute the maximum share an offer may be pinned at without pushing the
//!   pinned total past 100.
//!
//! Design notes:
//! - Shares are integer percentages in [0, 100].
//! - Distribution is deterministic and order-sensitive: the leftover after
//!   floor division goes to the earliest entries in the caller-supplied
//!   ordering, one extra unit each. Callers must pass entries in insertion
//!   order so identical inputs always rebalance identically.
//! - A pinned offer is never rewritten by [`recalculate`]; the caller owns
//!   pin state entirely.

mod calculator;

pub use calculator::{max_share_for_pinning, recalculate, validate};

// ─── Entry ───────────────────────────────────────────────────────────────────

/// One flow-offer row as the calculator sees it.
///
/// `active` mirrors the row's lifecycle state; disabled entries are carried
/// so callers can pass a whole flow snapshot, but they never participate in
/// distribution or validation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OfferShare {
    pub id: i64,
    pub share: i32,
    pub is_pinned: bool,
    pub active: bool,
}

impl OfferShare {
    pub fn new(id: i64, share: i32, is_pinned: bool, active: bool) -> Self {
        Self {
            id,
            share,
            is_pinned,
            active,
        }
    }
}

// ─── ShareConfig ─────────────────────────────────────────────────────────────

/// Tunables for distribution.
///
/// `min_share_percent` is the floor each unpinned offer is raised to when the
/// available percentage can cover it for every unpinned entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ShareConfig {
    pub min_share_percent: i32,
}

impl Default for ShareConfig {
    fn default() -> Self {
        Self {
            min_share_percent: 1,
        }
    }
}

// ─── ShareError ──────────────────────────────────────────────────────────────

/// Errors produced by the calculator.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ShareError {
    /// The pinned shares alone consume 100% or more; nothing can be
    /// distributed to the remaining offers, not even zero.
    OverAllocated { pinned_sum: i32 },
    /// The active set violates the share invariant (post-condition check).
    Invalid { message: String },
}

impl std::fmt::Display for ShareError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::OverAllocated { pinned_sum } => {
                write!(f, "pinned shares sum to {pinned_sum}%, must be below 100%")
            }
            Self::Invalid { message } => write!(f, "invalid shares: {message}"),
        }
    }
}

impl std::error::Error for ShareError {}
