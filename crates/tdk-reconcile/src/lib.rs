//! tdk-reconcile
//!
//! Merge planning for remote → local reconciliation.
//!
//! Architectural decisions:
//! - Remote state is authoritative for shares and association ids
//! - Pin flags and soft-disabled history are local-only and never overwritten
//! - Remote activation always wins over a local disable
//! - Entities absent upstream are soft-marked, never deleted
//!
//! Deterministic, pure logic. No IO. No store or tracker calls. The sync
//! orchestrator turns a plan into row operations inside one transaction.

mod plan;
mod types;

pub use plan::{campaigns_to_mark_deleted, plan_campaign_merge, plan_flow_offer_merge};
pub use types::*;
