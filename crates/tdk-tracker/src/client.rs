use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::debug;

use tdk_config::TrackerConfig;
use tdk_schemas::{NewStreamSpec, RemoteCampaign, RemoteOffer, RemoteStream, StreamOffersUpdate};

use crate::{TrackerApi, TrackerError};

/// Live HTTP adapter for the tracker admin API.
///
/// Credentials come from a [`TrackerConfig`] instance held by value; two
/// clients pointing at two trackers never share state.
pub struct TrackerClient {
    http: reqwest::Client,
    api_base: String,
    api_key: String,
}

impl TrackerClient {
    pub fn new(cfg: &TrackerConfig) -> Result<Self, TrackerError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(cfg.timeout_secs))
            .build()
            .map_err(|e| TrackerError::Connection(format!("failed to build http client: {e}")))?;
        Ok(Self {
            http,
            api_base: format!("{}/admin_api/v1", cfg.base_url.trim_end_matches('/')),
            api_key: cfg.api_key.clone(),
        })
    }

    /// Issue one request and map the HTTP outcome onto the error taxonomy:
    /// 401 → `Auth`, timeout/unreachable/5xx → `Connection`, other 4xx →
    /// `Api`. An empty body is returned as `Value::Null` (some endpoints
    /// respond with no content).
    async fn request(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, String)],
        body: Option<&Value>,
    ) -> Result<Value, TrackerError> {
        let url = format!("{}/{}", self.api_base, path.trim_start_matches('/'));
        debug!(%method, %url, "tracker request");

        let mut req = self
            .http
            .request(method, &url)
            .header("Api-Key", &self.api_key)
            .header("Content-Type", "application/json");
        if !query.is_empty() {
            req = req.query(query);
        }
        if let Some(body) = body {
            req = req.json(body);
        }

        let resp = req.send().await.map_err(|e| {
            if e.is_timeout() {
                TrackerError::Connection("timed out waiting for the tracker".to_string())
            } else if e.is_connect() {
                TrackerError::Connection("could not connect to the tracker".to_string())
            } else {
                TrackerError::Connection(format!("request to the tracker failed: {e}"))
            }
        })?;

        let status = resp.status();
        if status == StatusCode::UNAUTHORIZED {
            return Err(TrackerError::Auth(
                "invalid API key or access denied".to_string(),
            ));
        }
        if status.is_server_error() {
            return Err(TrackerError::Connection(format!(
                "tracker server error: {}",
                status.as_u16()
            )));
        }
        if status == StatusCode::NOT_FOUND {
            return Err(TrackerError::Api {
                status: 404,
                message: format!("resource not found: {path}"),
            });
        }
        if status.is_client_error() {
            let text = resp.text().await.unwrap_or_default();
            return Err(TrackerError::Api {
                status: status.as_u16(),
                message: text,
            });
        }

        let bytes = resp.bytes().await.map_err(|e| {
            TrackerError::Connection(format!("failed reading tracker response: {e}"))
        })?;
        if bytes.is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_slice(&bytes).map_err(|e| TrackerError::Api {
            status: status.as_u16(),
            message: format!("tracker returned malformed JSON: {e}"),
        })
    }

    async fn get_typed<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T, TrackerError> {
        let value = self.request(Method::GET, path, query, None).await?;
        decode(value)
    }
}

fn decode<T: DeserializeOwned>(value: Value) -> Result<T, TrackerError> {
    serde_json::from_value(value).map_err(|e| TrackerError::Api {
        status: 200,
        message: format!("unexpected response shape: {e}"),
    })
}

/// Derive a URL-safe alias from a display name: alphanumerics lowercased,
/// everything else replaced by `_`, truncated to 50 characters.
pub fn derive_alias(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_alphanumeric() {
                c.to_ascii_lowercase()
            } else {
                '_'
            }
        })
        .take(50)
        .collect()
}

#[async_trait]
impl TrackerApi for TrackerClient {
    async fn list_campaigns(
        &self,
        offset: u32,
        limit: u32,
    ) -> Result<Vec<RemoteCampaign>, TrackerError> {
        let mut query: Vec<(&str, String)> = Vec::new();
        if offset > 0 {
            query.push(("offset", offset.to_string()));
        }
        if limit > 0 {
            query.push(("limit", limit.to_string()));
        }
        self.get_typed("campaigns", &query).await
    }

    async fn get_campaign(&self, campaign_id: i64) -> Result<RemoteCampaign, TrackerError> {
        self.get_typed(&format!("campaigns/{campaign_id}"), &[]).await
    }

    async fn list_streams(&self, campaign_id: i64) -> Result<Vec<RemoteStream>, TrackerError> {
        self.get_typed(&format!("campaigns/{campaign_id}/streams"), &[])
            .await
    }

    async fn get_stream(&self, stream_id: i64) -> Result<RemoteStream, TrackerError> {
        self.get_typed(&format!("streams/{stream_id}"), &[]).await
    }

    async fn update_stream(
        &self,
        stream_id: i64,
        update: &StreamOffersUpdate,
    ) -> Result<(), TrackerError> {
        let body = serde_json::to_value(update).map_err(|e| TrackerError::Api {
            status: 0,
            message: format!("failed to encode stream update: {e}"),
        })?;
        self.request(
            Method::PUT,
            &format!("streams/{stream_id}"),
            &[],
            Some(&body),
        )
        .await?;
        Ok(())
    }

    async fn list_offers(&self) -> Result<Vec<RemoteOffer>, TrackerError> {
        self.get_typed("offers", &[]).await
    }

    async fn create_campaign(
        &self,
        name: &str,
        alias: Option<&str>,
    ) -> Result<RemoteCampaign, TrackerError> {
        let alias = match alias {
            Some(a) => a.to_string(),
            None => derive_alias(name),
        };
        let body = serde_json::json!({
            "name": name,
            "alias": alias,
            "state": "active",
            "type": "position",
        });
        let value = self.request(Method::POST, "campaigns", &[], Some(&body)).await?;
        decode(value)
    }

    async fn create_stream(&self, spec: &NewStreamSpec) -> Result<RemoteStream, TrackerError> {
        let body = serde_json::to_value(spec).map_err(|e| TrackerError::Api {
            status: 0,
            message: format!("failed to encode stream spec: {e}"),
        })?;
        let value = self.request(Method::POST, "streams", &[], Some(&body)).await?;
        decode(value)
    }

    async fn build_report(&self, params: &Value) -> Result<Value, TrackerError> {
        self.request(Method::POST, "report/build", &[], Some(params))
            .await
    }

    async fn validate_api_key(&self) -> Result<bool, TrackerError> {
        match self.list_campaigns(0, 1).await {
            Ok(_) => Ok(true),
            Err(TrackerError::Auth(_)) => Ok(false),
            Err(e @ TrackerError::Connection(_)) => Err(e),
            Err(TrackerError::Api { .. }) => Err(TrackerError::Connection(
                "could not verify the API key due to a tracker service error".to_string(),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alias_lowercases_and_replaces_separators() {
        assert_eq!(derive_alias("Summer Promo 2026"), "summer_promo_2026");
    }

    #[test]
    fn alias_is_truncated_to_50_chars() {
        let long = "x".repeat(80);
        assert_eq!(derive_alias(&long).len(), 50);
    }

    #[test]
    fn decode_reports_shape_mismatch_as_api_error() {
        let err = decode::<Vec<RemoteCampaign>>(serde_json::json!({"not": "a list"})).unwrap_err();
        assert!(matches!(err, TrackerError::Api { .. }));
    }

    #[test]
    fn error_display_is_informative() {
        let e = TrackerError::Api {
            status: 422,
            message: "bad payload".to_string(),
        };
        assert!(e.to_string().contains("422"));
        assert!(TrackerError::Auth("nope".into()).to_string().contains("auth"));
        assert!(TrackerError::Connection("down".into())
            .to_string()
            .contains("connection"));
    }
}
