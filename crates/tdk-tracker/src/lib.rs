//! tdk-tracker
//!
//! The remote tracker admin API, behind a trait seam.
//!
//! - [`TrackerApi`] is the surface the orchestration crates program against.
//!   Production wires in [`TrackerClient`]; tests wire in stubs.
//! - [`TrackerError`] is the full error taxonomy of the remote boundary:
//!   `Auth` (bad credential), `Connection` (timeout / unreachable / 5xx,
//!   retryable), `Api` (other 4xx / protocol errors). Callers never mask
//!   `Connection` or `Api`; only `validate_api_key` converts `Auth` into a
//!   boolean verdict.

mod client;

pub use client::{derive_alias, TrackerClient};

use async_trait::async_trait;
use serde_json::Value;
use tdk_schemas::{NewStreamSpec, RemoteCampaign, RemoteOffer, RemoteStream, StreamOffersUpdate};

// ---------------------------------------------------------------------------
// TrackerError
// ---------------------------------------------------------------------------

/// Errors surfaced by the tracker boundary.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TrackerError {
    /// The API key was rejected (HTTP 401).
    Auth(String),
    /// The tracker could not be reached, timed out, or failed server-side
    /// (5xx). Retryable; callers decide whether to retry.
    Connection(String),
    /// Any other protocol-level failure (4xx, unexpected response shape).
    Api { status: u16, message: String },
}

impl std::fmt::Display for TrackerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Auth(msg) => write!(f, "tracker auth error: {msg}"),
            Self::Connection(msg) => write!(f, "tracker connection error: {msg}"),
            Self::Api { status, message } => {
                write!(f, "tracker api error ({status}): {message}")
            }
        }
    }
}

impl std::error::Error for TrackerError {}

// ---------------------------------------------------------------------------
// TrackerApi
// ---------------------------------------------------------------------------

/// The tracker admin API consumed by sync and lifecycle orchestration.
///
/// Implementations must be side-effect-faithful: `update_stream` replaces the
/// stream's offer allocation, `create_*` return the created entity with its
/// tracker-assigned id.
#[async_trait]
pub trait TrackerApi: Send + Sync {
    async fn list_campaigns(&self, offset: u32, limit: u32)
        -> Result<Vec<RemoteCampaign>, TrackerError>;

    async fn get_campaign(&self, campaign_id: i64) -> Result<RemoteCampaign, TrackerError>;

    async fn list_streams(&self, campaign_id: i64) -> Result<Vec<RemoteStream>, TrackerError>;

    async fn get_stream(&self, stream_id: i64) -> Result<RemoteStream, TrackerError>;

    /// Replace the offer allocation of one stream.
    async fn update_stream(
        &self,
        stream_id: i64,
        update: &StreamOffersUpdate,
    ) -> Result<(), TrackerError>;

    async fn list_offers(&self) -> Result<Vec<RemoteOffer>, TrackerError>;

    async fn create_campaign(
        &self,
        name: &str,
        alias: Option<&str>,
    ) -> Result<RemoteCampaign, TrackerError>;

    async fn create_stream(&self, spec: &NewStreamSpec) -> Result<RemoteStream, TrackerError>;

    /// Passthrough report builder; params and result shapes are owned by the
    /// tracker, not modeled here.
    async fn build_report(&self, params: &Value) -> Result<Value, TrackerError>;

    /// Probe the credential with a minimal call.
    ///
    /// Returns `Ok(false)` on `Auth`, propagates `Connection`, and converts
    /// other API failures into `Connection` (the key could not be verified
    /// because of a service problem, not because it is wrong).
    async fn validate_api_key(&self) -> Result<bool, TrackerError>;
}
