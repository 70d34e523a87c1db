use serde::{Deserialize, Serialize};

/// Local flow-offer lifecycle as the planner sees it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryState {
    Active,
    Disabled,
}

impl EntryState {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntryState::Active => "active",
            EntryState::Disabled => "disabled",
        }
    }

    pub fn is_active(&self) -> bool {
        matches!(self, EntryState::Active)
    }
}

/// Snapshot of one local flow-offer row, as input to the planner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalFlowOffer {
    pub id: i64,
    pub offer_tracker_id: i64,
    /// Tracker-side association id, if this row has ever been synced.
    pub association_id: Option<i64>,
    pub share: i32,
    pub is_pinned: bool,
    pub state: EntryState,
}

/// One matched row: remote values overwrite share / association id /
/// lifecycle state. Pin state is deliberately absent — reconciliation never
/// touches it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlowOfferUpdate {
    pub local_id: i64,
    pub share: i32,
    pub association_id: Option<i64>,
    pub state: EntryState,
}

/// One remote record with no local counterpart: a new row, unpinned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlowOfferCreate {
    pub offer_tracker_id: i64,
    pub association_id: Option<i64>,
    pub share: i32,
    pub state: EntryState,
}

/// The full merge plan for one flow's offer set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlowOfferMergePlan {
    /// Remote offer ids missing from the local offer cache; the caller warms
    /// the cache up (bulk fetch + upsert) before applying the plan.
    pub warm_up_offer_ids: Vec<i64>,
    /// Local active rows removed upstream: transition to disabled, share 0.
    pub disable_ids: Vec<i64>,
    pub updates: Vec<FlowOfferUpdate>,
    pub creates: Vec<FlowOfferCreate>,
}

impl FlowOfferMergePlan {
    pub fn is_noop(&self) -> bool {
        self.disable_ids.is_empty() && self.updates.is_empty() && self.creates.is_empty()
    }
}

/// One campaign upsert with every tracker-omitted field already defaulted,
/// so the apply step names exactly what it writes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CampaignUpsert {
    pub tracker_id: i64,
    pub name: String,
    pub alias: String,
    pub state: String,
    pub campaign_type: String,
}

/// The merge plan for one campaign-list sync pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CampaignMergePlan {
    pub upserts: Vec<CampaignUpsert>,
    /// Every tracker id present remotely; locals outside this set are
    /// soft-marked deleted.
    pub remote_tracker_ids: Vec<i64>,
}
