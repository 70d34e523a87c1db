//! Wire types for the tracker admin API.
//!
//! Every struct here mirrors one JSON shape the tracker sends or accepts.
//! Fields the tracker may omit are `Option` and defaulted at the merge layer,
//! never here: keeping the raw shape makes it explicit which defaults each
//! consumer applies.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One campaign as returned by `GET campaigns` / `GET campaigns/{id}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteCampaign {
    pub id: i64,
    pub name: Option<String>,
    pub alias: Option<String>,
    pub state: Option<String>,
    #[serde(rename = "type")]
    pub campaign_type: Option<String>,
}

/// One stream as returned by `GET campaigns/{id}/streams` / `GET streams/{id}`.
///
/// `offers` carries the stream's offer allocation; streams whose schema has
/// no offers simply return an empty list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteStream {
    pub id: i64,
    pub name: Option<String>,
    #[serde(rename = "type")]
    pub stream_type: Option<String>,
    pub position: Option<i32>,
    pub state: Option<String>,
    #[serde(default)]
    pub offers: Vec<RemoteStreamOffer>,
}

/// One offer association inside a stream.
///
/// `id` is the tracker-side association id (offer-in-stream), distinct from
/// `offer_id` (the offer itself). Both can be absent in malformed rows; the
/// merge layer skips records without an `offer_id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteStreamOffer {
    pub id: Option<i64>,
    pub offer_id: Option<i64>,
    pub share: Option<i32>,
    pub state: Option<String>,
}

/// One offer as returned by `GET offers` / `GET offers/{id}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteOffer {
    pub id: i64,
    pub name: Option<String>,
    pub state: Option<String>,
}

/// Offer entry in a `PUT streams/{id}` payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamOfferInput {
    pub offer_id: i64,
    pub share: i32,
    pub state: String,
}

/// Body of `PUT streams/{id}` when replacing a stream's offer allocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamOffersUpdate {
    pub offers: Vec<StreamOfferInput>,
}

/// One traffic filter attached to a stream (geo targeting etc.).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamFilter {
    pub name: String,
    pub mode: String,
    pub payload: Vec<String>,
}

/// Body of `POST streams` when creating a stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewStreamSpec {
    pub campaign_id: i64,
    pub name: String,
    #[serde(rename = "type")]
    pub stream_type: String,
    pub schema: String,
    pub action_type: String,
    pub action_payload: String,
    pub state: String,
    pub position: i32,
    pub collect_clicks: bool,
    pub filter_or: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action_options: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filters: Option<Vec<StreamFilter>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub offers: Option<Vec<StreamOfferInput>>,
}

impl NewStreamSpec {
    /// A regular redirect stream with the conventional defaults the tracker
    /// expects (`collect_clicks` on, AND-combined filters).
    pub fn redirect(campaign_id: i64, name: impl Into<String>, position: i32) -> Self {
        Self {
            campaign_id,
            name: name.into(),
            stream_type: "regular".to_string(),
            schema: "redirect".to_string(),
            action_type: "http".to_string(),
            action_payload: String::new(),
            state: "active".to_string(),
            position,
            collect_clicks: true,
            filter_or: false,
            action_options: None,
            filters: None,
            offers: None,
        }
    }

    /// A forced landings stream carrying an offer allocation.
    pub fn forced_offers(
        campaign_id: i64,
        name: impl Into<String>,
        position: i32,
        offers: Vec<StreamOfferInput>,
    ) -> Self {
        Self {
            campaign_id,
            name: name.into(),
            stream_type: "forced".to_string(),
            schema: "landings".to_string(),
            action_type: "campaign".to_string(),
            action_payload: String::new(),
            state: "active".to_string(),
            position,
            collect_clicks: true,
            filter_or: false,
            action_options: None,
            filters: Some(Vec::new()),
            offers: Some(offers),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stream_offer_tolerates_missing_fields() {
        let raw = r#"{"offer_id": 42}"#;
        let rec: RemoteStreamOffer = serde_json::from_str(raw).unwrap();
        assert_eq!(rec.offer_id, Some(42));
        assert_eq!(rec.id, None);
        assert_eq!(rec.share, None);
        assert_eq!(rec.state, None);
    }

    #[test]
    fn stream_without_offers_deserializes_to_empty_list() {
        let raw = r#"{"id": 7, "name": "All", "type": "regular"}"#;
        let stream: RemoteStream = serde_json::from_str(raw).unwrap();
        assert!(stream.offers.is_empty());
    }

    #[test]
    fn new_stream_spec_omits_absent_sections() {
        let spec = NewStreamSpec::redirect(3, "US → Google", 0);
        let json = serde_json::to_value(&spec).unwrap();
        assert!(json.get("filters").is_none());
        assert!(json.get("offers").is_none());
        assert_eq!(json["type"], "regular");
        assert_eq!(json["collect_clicks"], true);
    }

    #[test]
    fn forced_offers_spec_carries_allocation() {
        let spec = NewStreamSpec::forced_offers(
            3,
            "All → Offers",
            1,
            vec![StreamOfferInput {
                offer_id: 42,
                share: 100,
                state: "active".to_string(),
            }],
        );
        let json = serde_json::to_value(&spec).unwrap();
        assert_eq!(json["schema"], "landings");
        assert_eq!(json["offers"][0]["share"], 100);
    }
}
