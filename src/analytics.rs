use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use futures::future::join_all;
use parking_lot::RwLock;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};
use time::OffsetDateTime;
use url::Url;

use crate::error::{BoxError, Error};
use crate::types::{BrandKey, OrgId, UserId};

/// Known usage event kinds. Serialized in snake_case.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[non_exhaustive]
pub enum AnalyticsEventName {
    PageViewed,
    ActionClicked,
    EntityCreated,
    EntityUpdated,
    EntityDeleted,
    ValuationRequested,
    ValuationCompleted,
    StreamStarted,
    StreamStopped,
    RecordingDownloaded,
    CourseEnrolled,
    CourseCompleted,
    CalculatorRun,
}

impl AnalyticsEventName {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PageViewed => "page_viewed",
            Self::ActionClicked => "action_clicked",
            Self::EntityCreated => "entity_created",
            Self::EntityUpdated => "entity_updated",
            Self::EntityDeleted => "entity_deleted",
            Self::ValuationRequested => "valuation_requested",
            Self::ValuationCompleted => "valuation_completed",
            Self::StreamStarted => "stream_started",
            Self::StreamStopped => "stream_stopped",
            Self::RecordingDownloaded => "recording_downloaded",
            Self::CourseEnrolled => "course_enrolled",
            Self::CourseCompleted => "course_completed",
            Self::CalculatorRun => "calculator_run",
        }
    }
}

impl std::fmt::Display for AnalyticsEventName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A fully resolved event, as delivered to destinations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[non_exhaustive]
pub struct AnalyticsEvent {
    pub event: AnalyticsEventName,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<UserId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub org_id: Option<OrgId>,
    pub brand: BrandKey,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feature: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub props: Map<String, JsonValue>,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
}

/// Event as supplied by the caller. Missing `brand`, ids and `timestamp` are
/// filled in by [`AnalyticsClient::track`].
#[derive(Debug, Clone, PartialEq)]
#[non_exhaustive]
pub struct TrackEvent {
    pub event: AnalyticsEventName,
    pub user_id: Option<UserId>,
    pub org_id: Option<OrgId>,
    pub brand: Option<BrandKey>,
    pub feature: Option<String>,
    pub path: Option<String>,
    pub props: Map<String, JsonValue>,
    pub timestamp: Option<OffsetDateTime>,
}

impl TrackEvent {
    #[must_use]
    pub fn new(event: AnalyticsEventName) -> Self {
        Self {
            event,
            user_id: None,
            org_id: None,
            brand: None,
            feature: None,
            path: None,
            props: Map::new(),
            timestamp: None,
        }
    }

    #[must_use]
    pub fn with_user_id(mut self, user_id: impl Into<UserId>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    #[must_use]
    pub fn with_org_id(mut self, org_id: impl Into<OrgId>) -> Self {
        self.org_id = Some(org_id.into());
        self
    }

    #[must_use]
    pub fn with_brand(mut self, brand: BrandKey) -> Self {
        self.brand = Some(brand);
        self
    }

    #[must_use]
    pub fn with_feature(mut self, feature: impl Into<String>) -> Self {
        self.feature = Some(feature.into());
        self
    }

    #[must_use]
    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    #[must_use]
    pub fn with_prop(mut self, key: impl Into<String>, value: impl Into<JsonValue>) -> Self {
        self.props.insert(key.into(), value.into());
        self
    }

    #[must_use]
    pub fn with_timestamp(mut self, timestamp: OffsetDateTime) -> Self {
        self.timestamp = Some(timestamp);
        self
    }
}

/// Default fields applied beneath every tracked event.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[non_exhaustive]
pub struct AnalyticsContext {
    pub brand: Option<BrandKey>,
    pub user_id: Option<UserId>,
    pub org_id: Option<OrgId>,
}

impl AnalyticsContext {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_brand(mut self, brand: BrandKey) -> Self {
        self.brand = Some(brand);
        self
    }

    #[must_use]
    pub fn with_user_id(mut self, user_id: impl Into<UserId>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    #[must_use]
    pub fn with_org_id(mut self, org_id: impl Into<OrgId>) -> Self {
        self.org_id = Some(org_id.into());
        self
    }

    /// Layers `event` over this context. Caller fields win; brand falls back to [`BrandKey::Hub`].
    fn enrich(&self, event: TrackEvent, now: OffsetDateTime) -> AnalyticsEvent {
        AnalyticsEvent {
            event: event.event,
            user_id: event.user_id.or_else(|| self.user_id.clone()),
            org_id: event.org_id.or_else(|| self.org_id.clone()),
            brand: event.brand.or(self.brand).unwrap_or_default(),
            feature: event.feature,
            path: event.path,
            props: event.props,
            timestamp: event.timestamp.unwrap_or(now),
        }
    }
}

/// A sink for analytics events.
///
/// # Example
///
/// ```rust,ignore
/// impl AnalyticsDestination for Warehouse {
///     async fn track(&self, event: &AnalyticsEvent) -> Result<(), BoxError> {
///         self.buffer.lock().push(event.clone());
///         Ok(())
///     }
///
///     fn has_flush(&self) -> bool {
///         true
///     }
///
///     async fn flush(&self) -> Result<(), BoxError> {
///         self.upload_buffered().await
///     }
/// }
/// ```
pub trait AnalyticsDestination: Send + Sync + 'static {
    fn track(&self, event: &AnalyticsEvent) -> impl Future<Output = Result<(), BoxError>> + Send;

    /// Whether [`flush`](AnalyticsDestination::flush) does anything.
    fn has_flush(&self) -> bool {
        false
    }

    fn flush(&self) -> impl Future<Output = Result<(), BoxError>> + Send {
        async { Ok(()) }
    }
}

type BoxFuture<'a> = Pin<Box<dyn Future<Output = Result<(), BoxError>> + Send + 'a>>;

/// Object-safe wrapper for AnalyticsDestination (needed for Arc<dyn>).
trait DestinationDyn: Send + Sync {
    fn label(&self) -> &'static str;
    fn track_dyn<'a>(&'a self, event: &'a AnalyticsEvent) -> BoxFuture<'a>;
    fn has_flush_dyn(&self) -> bool;
    fn flush_dyn(&self) -> BoxFuture<'_>;
}

impl<T: AnalyticsDestination> DestinationDyn for T {
    fn label(&self) -> &'static str {
        std::any::type_name::<T>()
    }

    fn track_dyn<'a>(&'a self, event: &'a AnalyticsEvent) -> BoxFuture<'a> {
        Box::pin(self.track(event))
    }

    fn has_flush_dyn(&self) -> bool {
        self.has_flush()
    }

    fn flush_dyn(&self) -> BoxFuture<'_> {
        Box::pin(self.flush())
    }
}

/// Analytics client configuration.
#[derive(Default)]
pub struct AnalyticsConfig {
    destinations: Vec<Arc<dyn DestinationDyn>>,
    default_context: AnalyticsContext,
}

impl AnalyticsConfig {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_destination<D: AnalyticsDestination>(mut self, destination: D) -> Self {
        self.destinations.push(Arc::new(destination));
        self
    }

    #[must_use]
    pub fn with_default_context(mut self, context: AnalyticsContext) -> Self {
        self.default_context = context;
        self
    }

    /// Create config from environment variables.
    ///
    /// # Optional env vars
    /// - `ANALYTICS_ENDPOINT`: ingestion URL; events are posted there with
    ///   best-effort delivery. Without it, events go to [`LogDestination`].
    /// - `ANALYTICS_TOKEN`: bearer token for the ingestion endpoint
    /// - `ANALYTICS_BRAND`: default brand (e.g. `valora`, `business-now`)
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the endpoint or brand is invalid.
    pub fn from_env() -> Result<Self, Error> {
        Self::from_vars(|key| std::env::var(key).ok())
    }

    fn from_vars(var: impl Fn(&str) -> Option<String>) -> Result<Self, Error> {
        let mut config = Self::new();

        config = match var("ANALYTICS_ENDPOINT").filter(|s| !s.is_empty()) {
            Some(endpoint) => {
                let endpoint: Url = endpoint
                    .parse()
                    .map_err(|e| Error::Config(format!("ANALYTICS_ENDPOINT: {e}")))?;
                let mut http = HttpDestinationConfig::new(endpoint).with_delivery(Delivery::BestEffort);
                if let Some(token) = var("ANALYTICS_TOKEN").filter(|s| !s.is_empty()) {
                    http = http.with_token(token);
                }
                config.with_destination(HttpDestination::new(http)?)
            }
            None => config.with_destination(LogDestination),
        };

        if let Some(brand) = var("ANALYTICS_BRAND").filter(|s| !s.is_empty()) {
            let brand: BrandKey = brand.parse()?;
            config = config.with_default_context(AnalyticsContext::new().with_brand(brand));
        }

        Ok(config)
    }
}

/// Records usage events and delivers each to every configured destination.
///
/// Delivery is best-effort: a failing destination is logged and never affects
/// the caller or the other destinations.
pub struct AnalyticsClient {
    destinations: Vec<Arc<dyn DestinationDyn>>,
    context: RwLock<AnalyticsContext>,
}

impl AnalyticsClient {
    /// # Errors
    ///
    /// Returns [`Error::Config`] if no destination is configured.
    pub fn new(config: AnalyticsConfig) -> Result<Self, Error> {
        if config.destinations.is_empty() {
            return Err(Error::Config(
                "AnalyticsClient requires at least one destination".into(),
            ));
        }
        Ok(Self {
            destinations: config.destinations,
            context: RwLock::new(config.default_context),
        })
    }

    /// Replace the default context. Not merged with the previous one.
    pub fn set_context(&self, context: AnalyticsContext) {
        *self.context.write() = context;
    }

    #[must_use]
    pub fn context(&self) -> AnalyticsContext {
        self.context.read().clone()
    }

    /// Enrich `event` and deliver it to all destinations concurrently.
    ///
    /// Resolves once every destination has settled. Returns the delivered payload.
    pub async fn track(&self, event: TrackEvent) -> AnalyticsEvent {
        let payload = self.context.read().enrich(event, OffsetDateTime::now_utc());

        let deliveries = self.destinations.iter().map(|destination| {
            let payload = &payload;
            async move {
                if let Err(e) = destination.track_dyn(payload).await {
                    tracing::warn!(
                        destination = destination.label(),
                        event = %payload.event,
                        error = %e,
                        "Analytics destination failed"
                    );
                }
            }
        });
        join_all(deliveries).await;

        payload
    }

    /// Flush destinations one after another. Destinations without a flush hook are skipped.
    pub async fn flush(&self) {
        for destination in &self.destinations {
            if !destination.has_flush_dyn() {
                continue;
            }
            if let Err(e) = destination.flush_dyn().await {
                tracing::warn!(
                    destination = destination.label(),
                    error = %e,
                    "Analytics destination flush failed"
                );
            }
        }
    }
}

/// How [`HttpDestination`] hands events to the network.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Delivery {
    /// Wait for the response; transport failures and non-2xx statuses are errors.
    #[default]
    Awaited,
    /// Send from a detached task and return immediately. Outcome is only logged.
    /// Falls back to `Awaited` outside a tokio runtime.
    BestEffort,
}

/// HTTP ingestion destination configuration.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub struct HttpDestinationConfig {
    pub(crate) endpoint: Url,
    pub(crate) token: Option<String>,
    pub(crate) headers: HeaderMap,
    pub(crate) delivery: Delivery,
    pub(crate) http: Option<reqwest::Client>,
}

impl HttpDestinationConfig {
    #[must_use]
    pub fn new(endpoint: Url) -> Self {
        Self {
            endpoint,
            token: None,
            headers: HeaderMap::new(),
            delivery: Delivery::default(),
            http: None,
        }
    }

    #[must_use]
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    #[must_use]
    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    #[must_use]
    pub fn with_delivery(mut self, delivery: Delivery) -> Self {
        self.delivery = delivery;
        self
    }

    /// Use a custom HTTP client (for connection pool reuse or testing).
    #[must_use]
    pub fn with_http_client(mut self, client: reqwest::Client) -> Self {
        self.http = Some(client);
        self
    }
}

/// Posts each event as JSON to an ingestion endpoint.
#[derive(Debug, Clone)]
pub struct HttpDestination {
    http: reqwest::Client,
    endpoint: Url,
    headers: HeaderMap,
    delivery: Delivery,
}

impl HttpDestination {
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the token cannot be used as a header value.
    pub fn new(config: HttpDestinationConfig) -> Result<Self, Error> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.extend(config.headers);
        if let Some(token) = &config.token {
            let value = HeaderValue::from_str(&format!("Bearer {token}"))
                .map_err(|e| Error::Config(format!("analytics token: {e}")))?;
            headers.insert(AUTHORIZATION, value);
        }

        Ok(Self {
            http: config.http.unwrap_or_default(),
            endpoint: config.endpoint,
            headers,
            delivery: config.delivery,
        })
    }

    #[must_use]
    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }
}

impl AnalyticsDestination for HttpDestination {
    fn track(&self, event: &AnalyticsEvent) -> impl Future<Output = Result<(), BoxError>> + Send {
        let request = serde_json::to_vec(event).map(|body| {
            self.http
                .post(self.endpoint.clone())
                .headers(self.headers.clone())
                .body(body)
        });
        let delivery = self.delivery;

        async move {
            let request = request?;
            if delivery == Delivery::BestEffort {
                if let Ok(runtime) = tokio::runtime::Handle::try_current() {
                    runtime.spawn(async move {
                        if let Err(e) = post(request).await {
                            tracing::debug!(error = %e, "Best-effort analytics delivery failed");
                        }
                    });
                    return Ok(());
                }
            }
            post(request).await
        }
    }
}

async fn post(request: reqwest::RequestBuilder) -> Result<(), BoxError> {
    request.send().await?.error_for_status()?;
    Ok(())
}

/// Writes events to the `tracing` log. Used when no ingestion endpoint is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogDestination;

impl AnalyticsDestination for LogDestination {
    fn track(&self, event: &AnalyticsEvent) -> impl Future<Output = Result<(), BoxError>> + Send {
        tracing::info!(
            event = %event.event,
            brand = %event.brand,
            user_id = ?event.user_id,
            org_id = ?event.org_id,
            feature = ?event.feature,
            path = ?event.path,
            "analytics"
        );
        async { Ok(()) }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use parking_lot::Mutex;
    use serde_json::json;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    #[derive(Clone, Default)]
    struct Recorder {
        events: Arc<Mutex<Vec<AnalyticsEvent>>>,
        flushes: Arc<AtomicUsize>,
    }

    impl AnalyticsDestination for Recorder {
        fn track(&self, event: &AnalyticsEvent) -> impl Future<Output = Result<(), BoxError>> + Send {
            self.events.lock().push(event.clone());
            async { Ok(()) }
        }

        fn has_flush(&self) -> bool {
            true
        }

        fn flush(&self) -> impl Future<Output = Result<(), BoxError>> + Send {
            self.flushes.fetch_add(1, Ordering::SeqCst);
            async { Ok(()) }
        }
    }

    #[derive(Clone, Default)]
    struct Broken {
        calls: Arc<AtomicUsize>,
    }

    impl AnalyticsDestination for Broken {
        fn track(&self, _event: &AnalyticsEvent) -> impl Future<Output = Result<(), BoxError>> + Send {
            self.calls.fetch_add(1, Ordering::SeqCst);
            async { Err::<(), BoxError>("ingestion unavailable".into()) }
        }

        fn has_flush(&self) -> bool {
            true
        }

        fn flush(&self) -> impl Future<Output = Result<(), BoxError>> + Send {
            async { Err::<(), BoxError>("flush failed".into()) }
        }
    }

    fn fixed_time() -> OffsetDateTime {
        OffsetDateTime::from_unix_timestamp(1_700_000_000).unwrap()
    }

    #[test]
    fn empty_destinations_rejected() {
        let err = AnalyticsClient::new(AnalyticsConfig::new()).err().unwrap();
        assert!(matches!(err, Error::Config(_)));
    }

    #[tokio::test]
    async fn failing_destination_does_not_block_others() {
        let first = Recorder::default();
        let second = Recorder::default();
        let broken = Broken::default();
        let client = AnalyticsClient::new(
            AnalyticsConfig::new()
                .with_destination(first.clone())
                .with_destination(broken.clone())
                .with_destination(second.clone()),
        )
        .unwrap();

        let payload = client
            .track(TrackEvent::new(AnalyticsEventName::ValuationRequested).with_prop("beds", 3))
            .await;

        assert_eq!(broken.calls.load(Ordering::SeqCst), 1);
        assert_eq!(first.events.lock().as_slice(), &[payload.clone()]);
        assert_eq!(second.events.lock().as_slice(), &[payload]);
    }

    #[tokio::test]
    async fn context_fills_brand_user_and_timestamp() {
        let recorder = Recorder::default();
        let client = AnalyticsClient::new(AnalyticsConfig::new().with_destination(recorder.clone())).unwrap();

        client.set_context(AnalyticsContext::new().with_brand(BrandKey::Valora).with_user_id("u1"));
        client.track(TrackEvent::new(AnalyticsEventName::PageViewed)).await;

        let events = recorder.events.lock();
        let json = serde_json::to_value(&events[0]).unwrap();
        assert_eq!(json["event"], "page_viewed");
        assert_eq!(json["brand"], "valora");
        assert_eq!(json["userId"], "u1");
        assert!(json["timestamp"].is_string());
    }

    #[tokio::test]
    async fn caller_fields_take_precedence() {
        let recorder = Recorder::default();
        let client = AnalyticsClient::new(
            AnalyticsConfig::new()
                .with_destination(recorder.clone())
                .with_default_context(
                    AnalyticsContext::new()
                        .with_brand(BrandKey::Sportify)
                        .with_user_id("ctx-user")
                        .with_org_id("ctx-org"),
                ),
        )
        .unwrap();

        let payload = client
            .track(
                TrackEvent::new(AnalyticsEventName::StreamStarted)
                    .with_brand(BrandKey::Venuevr)
                    .with_user_id("caller")
                    .with_timestamp(fixed_time()),
            )
            .await;

        assert_eq!(payload.brand, BrandKey::Venuevr);
        assert_eq!(payload.user_id, Some(UserId::from("caller")));
        assert_eq!(payload.org_id, Some(OrgId::from("ctx-org")));
        assert_eq!(payload.timestamp, fixed_time());
    }

    #[tokio::test]
    async fn brand_falls_back_to_hub() {
        let client = AnalyticsClient::new(AnalyticsConfig::new().with_destination(Recorder::default())).unwrap();
        let payload = client.track(TrackEvent::new(AnalyticsEventName::ActionClicked)).await;
        assert_eq!(payload.brand, BrandKey::Hub);
    }

    #[tokio::test]
    async fn set_context_replaces_instead_of_merging() {
        let client = AnalyticsClient::new(AnalyticsConfig::new().with_destination(Recorder::default())).unwrap();

        client.set_context(AnalyticsContext::new().with_brand(BrandKey::Valora).with_user_id("u1"));
        client.set_context(AnalyticsContext::new().with_org_id("o1"));
        let payload = client.track(TrackEvent::new(AnalyticsEventName::PageViewed)).await;

        assert_eq!(payload.brand, BrandKey::Hub);
        assert_eq!(payload.user_id, None);
        assert_eq!(payload.org_id, Some(OrgId::from("o1")));
    }

    #[tokio::test]
    async fn flush_visits_each_hook_despite_failures() {
        let before = Recorder::default();
        let after = Recorder::default();
        let client = AnalyticsClient::new(
            AnalyticsConfig::new()
                .with_destination(before.clone())
                .with_destination(Broken::default())
                .with_destination(LogDestination)
                .with_destination(after.clone()),
        )
        .unwrap();

        client.flush().await;

        assert_eq!(before.flushes.load(Ordering::SeqCst), 1);
        assert_eq!(after.flushes.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn event_wire_format() {
        let event = AnalyticsContext::new().enrich(
            TrackEvent::new(AnalyticsEventName::CalculatorRun)
                .with_org_id("o1")
                .with_feature("mortgage")
                .with_timestamp(fixed_time()),
            OffsetDateTime::now_utc(),
        );
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(
            json,
            json!({
                "event": "calculator_run",
                "orgId": "o1",
                "brand": "hub",
                "feature": "mortgage",
                "timestamp": "2023-11-14T22:13:20Z"
            })
        );
        let parsed: AnalyticsEvent = serde_json::from_value(json).unwrap();
        assert_eq!(parsed, event);
    }

    #[tokio::test]
    async fn http_destination_posts_json_with_bearer() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/ingest"))
            .and(header("authorization", "Bearer ingest-key"))
            .and(header("x-source", "hub-web"))
            .and(body_json(json!({
                "event": "page_viewed",
                "brand": "valora",
                "path": "/",
                "timestamp": "2023-11-14T22:13:20Z"
            })))
            .respond_with(ResponseTemplate::new(202))
            .expect(1)
            .mount(&server)
            .await;

        let destination = HttpDestination::new(
            HttpDestinationConfig::new(format!("{}/ingest", server.uri()).parse().unwrap())
                .with_token("ingest-key")
                .with_header(HeaderName::from_static("x-source"), HeaderValue::from_static("hub-web")),
        )
        .unwrap();
        let client = AnalyticsClient::new(AnalyticsConfig::new().with_destination(destination)).unwrap();

        client
            .track(
                TrackEvent::new(AnalyticsEventName::PageViewed)
                    .with_brand(BrandKey::Valora)
                    .with_path("/")
                    .with_timestamp(fixed_time()),
            )
            .await;
    }

    #[tokio::test]
    async fn awaited_delivery_reports_http_errors() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let destination =
            HttpDestination::new(HttpDestinationConfig::new(server.uri().parse().unwrap())).unwrap();
        let event = AnalyticsContext::new().enrich(
            TrackEvent::new(AnalyticsEventName::EntityCreated),
            fixed_time(),
        );

        assert!(destination.track(&event).await.is_err());
    }

    #[tokio::test]
    async fn best_effort_delivery_returns_before_response() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let destination = HttpDestination::new(
            HttpDestinationConfig::new(server.uri().parse().unwrap()).with_delivery(Delivery::BestEffort),
        )
        .unwrap();
        let event = AnalyticsContext::new().enrich(
            TrackEvent::new(AnalyticsEventName::StreamStopped),
            fixed_time(),
        );

        assert!(destination.track(&event).await.is_ok());

        let mut delivered = 0;
        for _ in 0..50 {
            delivered = server.received_requests().await.unwrap().len();
            if delivered > 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(delivered, 1);
    }

    #[test]
    fn config_from_vars_without_endpoint_logs() {
        let config = AnalyticsConfig::from_vars(|key| match key {
            "ANALYTICS_BRAND" => Some("business-now".into()),
            _ => None,
        })
        .unwrap();

        assert_eq!(config.destinations.len(), 1);
        assert!(config.destinations[0].label().ends_with("LogDestination"));
        assert_eq!(config.default_context.brand, Some(BrandKey::BusinessNow));
    }

    #[test]
    fn config_from_vars_with_endpoint_posts() {
        let config = AnalyticsConfig::from_vars(|key| match key {
            "ANALYTICS_ENDPOINT" => Some("https://ingest.example.com/events".into()),
            "ANALYTICS_TOKEN" => Some("k".into()),
            _ => None,
        })
        .unwrap();

        assert!(config.destinations[0].label().ends_with("HttpDestination"));
        assert_eq!(config.default_context, AnalyticsContext::default());
    }

    #[test]
    fn config_from_vars_ignores_empty_values() {
        let config = AnalyticsConfig::from_vars(|key| match key {
            "ANALYTICS_ENDPOINT" | "ANALYTICS_TOKEN" | "ANALYTICS_BRAND" => Some(String::new()),
            _ => None,
        })
        .unwrap();

        assert!(config.destinations[0].label().ends_with("LogDestination"));
        assert_eq!(config.default_context.brand, None);
    }

    #[test]
    fn config_from_vars_rejects_bad_values() {
        let bad_brand = AnalyticsConfig::from_vars(|key| {
            (key == "ANALYTICS_BRAND").then(|| "acme".to_string())
        });
        assert!(matches!(bad_brand.err(), Some(Error::Config(_))));

        let bad_endpoint = AnalyticsConfig::from_vars(|key| {
            (key == "ANALYTICS_ENDPOINT").then(|| "not a url".to_string())
        });
        assert!(matches!(bad_endpoint.err(), Some(Error::Config(_))));
    }
}
