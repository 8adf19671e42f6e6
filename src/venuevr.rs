//! Typed client for the VenueVR streaming backend.
//!
//! Thin wrappers over [`ApiClient`]: every call goes through the shared token,
//! header and error handling.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};

use crate::client::{ApiClient, RequestOptions};
use crate::error::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[non_exhaustive]
pub enum EventStatus {
    Draft,
    Scheduled,
    Live,
    Ended,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[non_exhaustive]
pub struct Venue {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[non_exhaustive]
pub struct EventSummary {
    pub id: String,
    pub league: String,
    pub home_team: String,
    pub away_team: String,
    /// ISO 8601, as sent by the backend.
    pub start_time: String,
    pub status: EventStatus,
    pub venue: Venue,
}

/// A playable stream for an event. `token` and `ttl_sec` are set for signed feeds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[non_exhaustive]
pub struct EventFeed {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ttl_sec: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[non_exhaustive]
pub struct EventDetail {
    #[serde(flatten)]
    pub summary: EventSummary,
    #[serde(default)]
    pub feeds: Vec<EventFeed>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[non_exhaustive]
pub enum CatalogItemType {
    Ticket,
    Subscription,
    Addon,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[non_exhaustive]
pub struct CatalogItem {
    pub product_id: String,
    #[serde(rename = "type")]
    pub kind: CatalogItemType,
    pub name: String,
    pub price_cents: i64,
    pub currency: String,
    #[serde(default)]
    pub rules: Map<String, JsonValue>,
}

/// A sponsor creative scheduled against an event anchor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[non_exhaustive]
pub struct CreativePlacement {
    pub id: String,
    pub event_id: String,
    pub anchor_ref: String,
    pub asset_id: String,
    pub start_ts: String,
    pub end_ts: String,
    pub status: String,
    #[serde(default)]
    pub rules: Map<String, JsonValue>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[non_exhaustive]
pub struct ComponentHealth {
    pub status: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[non_exhaustive]
pub struct SystemHealth {
    pub status: String,
    pub checked_at: String,
    pub ingest: ComponentHealth,
    pub encoder: ComponentHealth,
    pub playback: ComponentHealth,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
struct NewParty<'a> {
    event_id: &'a str,
    name: &'a str,
}

/// VenueVR backend API.
#[derive(Clone)]
pub struct VenueApi {
    api: ApiClient,
}

impl VenueApi {
    #[must_use]
    pub fn new(api: ApiClient) -> Self {
        Self { api }
    }

    /// # Errors
    ///
    /// Any [`ApiClient`] error.
    pub async fn events(&self) -> Result<Vec<EventSummary>, Error> {
        self.api.get("/events", RequestOptions::new()).await.map_err(with_detail)
    }

    /// # Errors
    ///
    /// Any [`ApiClient`] error; a missing event is `Error::Api` with status 404
    /// and the backend's `detail` text as the message.
    pub async fn event(&self, event_id: &str) -> Result<EventDetail, Error> {
        let path = format!("/events/{}", urlencoding::encode(event_id));
        self.api.get(&path, RequestOptions::new()).await.map_err(with_detail)
    }

    /// # Errors
    ///
    /// Any [`ApiClient`] error.
    pub async fn catalog(&self) -> Result<Vec<CatalogItem>, Error> {
        self.api.get("/catalog", RequestOptions::new()).await.map_err(with_detail)
    }

    /// # Errors
    ///
    /// Any [`ApiClient`] error.
    pub async fn sponsor_placements(&self, event_id: &str) -> Result<Vec<CreativePlacement>, Error> {
        let path = format!("/creative/events/{}/placements", urlencoding::encode(event_id));
        self.api.get(&path, RequestOptions::new()).await.map_err(with_detail)
    }

    /// # Errors
    ///
    /// Any [`ApiClient`] error.
    pub async fn health(&self) -> Result<SystemHealth, Error> {
        self.api.get("/health/live", RequestOptions::new()).await.map_err(with_detail)
    }

    /// Create a watch party. The backend's response is returned as-is.
    ///
    /// # Errors
    ///
    /// Any [`ApiClient`] error.
    pub async fn create_party(&self, event_id: &str, name: &str) -> Result<JsonValue, Error> {
        let body = NewParty { event_id, name };
        self.api
            .post("/parties", Some(&body), RequestOptions::new())
            .await
            .map_err(with_detail)
    }
}

/// The backend reports failures as `{"detail": "..."}`; surface that text as the message.
fn with_detail(err: Error) -> Error {
    match err {
        Error::Api(mut api) => {
            if let Some(detail) = api
                .details
                .as_ref()
                .and_then(|d| d.get("detail"))
                .and_then(JsonValue::as_str)
            {
                api.message = detail.to_owned();
            }
            Error::Api(api)
        }
        other => other,
    }
}
