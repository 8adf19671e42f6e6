use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use parking_lot::RwLock;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue};
use reqwest::{Method, StatusCode};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;
use url::Url;

use crate::error::{ApiError, BoxError, Error};

/// Resolves the bearer token for each outgoing request.
///
/// Called once per request, never cached by the client. Returning `Ok(None)`
/// sends the request without an `Authorization` header.
///
/// ```rust,ignore
/// struct FromVault(Vault);
///
/// impl TokenGetter for FromVault {
///     async fn token(&self) -> Result<Option<String>, BoxError> {
///         Ok(self.0.current_access_token().await?)
///     }
/// }
/// ```
pub trait TokenGetter: Send + Sync + 'static {
    fn token(&self) -> impl Future<Output = Result<Option<String>, BoxError>> + Send;
}

/// A fixed token, for service-to-service calls and tests.
#[derive(Debug, Clone)]
pub struct StaticToken(pub String);

impl TokenGetter for StaticToken {
    fn token(&self) -> impl Future<Output = Result<Option<String>, BoxError>> + Send {
        let token = self.0.clone();
        async move { Ok(Some(token)) }
    }
}

/// Adapts an async closure into a [`TokenGetter`].
pub struct TokenFn<F>(pub F);

impl<F, Fut> TokenGetter for TokenFn<F>
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Option<String>, BoxError>> + Send,
{
    fn token(&self) -> impl Future<Output = Result<Option<String>, BoxError>> + Send {
        (self.0)()
    }
}

/// Object-safe wrapper for TokenGetter (needed for Arc<dyn>).
pub(crate) trait TokenGetterDyn: Send + Sync {
    fn token_dyn(
        &self,
    ) -> Pin<Box<dyn Future<Output = Result<Option<String>, BoxError>> + Send + '_>>;
}

impl<T: TokenGetter> TokenGetterDyn for T {
    fn token_dyn(
        &self,
    ) -> Pin<Box<dyn Future<Output = Result<Option<String>, BoxError>> + Send + '_>> {
        Box::pin(self.token())
    }
}

type UnauthorizedHook = Arc<dyn Fn() + Send + Sync>;

/// Request client configuration.
///
/// The base URL is the only required field. Optional pieces are set with `with_*`:
///
/// ```rust,ignore
/// let config = ApiClientConfig::new("https://api.valora.example".parse()?)
///     .with_default_header(HeaderName::from_static("x-brand"), HeaderValue::from_static("valora"))
///     .with_on_unauthorized(|| tracing::warn!("session expired"));
/// let api = ApiClient::new(config);
/// ```
#[non_exhaustive]
pub struct ApiClientConfig {
    pub(crate) base_url: Url,
    pub(crate) http: Option<reqwest::Client>,
    pub(crate) default_headers: HeaderMap,
    pub(crate) token_getter: Option<Arc<dyn TokenGetterDyn>>,
    pub(crate) on_unauthorized: Option<UnauthorizedHook>,
}

impl ApiClientConfig {
    #[must_use]
    pub fn new(base_url: Url) -> Self {
        Self {
            base_url,
            http: None,
            default_headers: HeaderMap::new(),
            token_getter: None,
            on_unauthorized: None,
        }
    }

    /// Use a custom HTTP client (for connection pool reuse, timeouts, or testing).
    #[must_use]
    pub fn with_http_client(mut self, client: reqwest::Client) -> Self {
        self.http = Some(client);
        self
    }

    /// Header sent on every request. Wins over per-request headers of the same name.
    #[must_use]
    pub fn with_default_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.default_headers.insert(name, value);
        self
    }

    #[must_use]
    pub fn with_default_headers(mut self, headers: HeaderMap) -> Self {
        self.default_headers.extend(headers);
        self
    }

    #[must_use]
    pub fn with_token_getter<G: TokenGetter>(mut self, getter: G) -> Self {
        self.token_getter = Some(Arc::new(getter));
        self
    }

    /// Called on every 401 response, before the error is returned.
    #[must_use]
    pub fn with_on_unauthorized(mut self, hook: impl Fn() + Send + Sync + 'static) -> Self {
        self.on_unauthorized = Some(Arc::new(hook));
        self
    }

    #[must_use]
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }
}

/// Per-request options.
#[derive(Debug, Clone, Default)]
#[non_exhaustive]
pub struct RequestOptions {
    pub headers: HeaderMap,
}

impl RequestOptions {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }
}

/// Successful response body, before typed decoding.
#[derive(Debug, Clone, PartialEq)]
pub enum ResponseBody {
    /// 204 No Content. The body is never read.
    Empty,
    /// `application/json` response.
    Json(JsonValue),
    /// Any other content type, as raw text.
    Text(String),
}

impl ResponseBody {
    /// JSON view of the body: `Empty` is `null`, `Text` is a JSON string.
    #[must_use]
    pub fn into_json(self) -> JsonValue {
        match self {
            Self::Empty => JsonValue::Null,
            Self::Json(value) => value,
            Self::Text(text) => JsonValue::String(text),
        }
    }

    /// Decodes the body into `T`.
    ///
    /// `()` and `Option<_>` accept an empty body; `String` accepts a text body.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Decode`] if the body does not match `T`.
    pub fn decode<T: DeserializeOwned>(self) -> Result<T, Error> {
        serde_json::from_value(self.into_json()).map_err(Into::into)
    }
}

struct Inner {
    base_url: String,
    http: reqwest::Client,
    default_headers: HeaderMap,
    token_getter: RwLock<Option<Arc<dyn TokenGetterDyn>>>,
    on_unauthorized: Option<UnauthorizedHook>,
}

/// Authenticated JSON client for a brand backend.
///
/// Cheap to clone; clones share the token getter.
#[derive(Clone)]
pub struct ApiClient {
    inner: Arc<Inner>,
}

impl ApiClient {
    #[must_use]
    pub fn new(config: ApiClientConfig) -> Self {
        let base_url = config.base_url.as_str().trim_end_matches('/').to_owned();
        Self {
            inner: Arc::new(Inner {
                base_url,
                http: config.http.unwrap_or_default(),
                default_headers: config.default_headers,
                token_getter: RwLock::new(config.token_getter),
                on_unauthorized: config.on_unauthorized,
            }),
        }
    }

    /// Replace the token getter. Takes effect on the next request.
    pub fn set_token_getter<G: TokenGetter>(&self, getter: G) {
        *self.inner.token_getter.write() = Some(Arc::new(getter));
    }

    /// Stop attaching a bearer token.
    pub fn clear_token_getter(&self) {
        *self.inner.token_getter.write() = None;
    }

    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.inner.base_url
    }

    /// # Errors
    ///
    /// See [`ApiClient::send`].
    pub async fn get<T: DeserializeOwned>(
        &self,
        path: &str,
        options: RequestOptions,
    ) -> Result<T, Error> {
        self.send::<()>(Method::GET, path, None, options)
            .await?
            .decode()
    }

    /// # Errors
    ///
    /// See [`ApiClient::send`].
    pub async fn post<T, B>(
        &self,
        path: &str,
        body: Option<&B>,
        options: RequestOptions,
    ) -> Result<T, Error>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        self.send(Method::POST, path, body, options).await?.decode()
    }

    /// # Errors
    ///
    /// See [`ApiClient::send`].
    pub async fn put<T, B>(
        &self,
        path: &str,
        body: Option<&B>,
        options: RequestOptions,
    ) -> Result<T, Error>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        self.send(Method::PUT, path, body, options).await?.decode()
    }

    /// # Errors
    ///
    /// See [`ApiClient::send`].
    pub async fn patch<T, B>(
        &self,
        path: &str,
        body: Option<&B>,
        options: RequestOptions,
    ) -> Result<T, Error>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        self.send(Method::PATCH, path, body, options).await?.decode()
    }

    /// # Errors
    ///
    /// See [`ApiClient::send`].
    pub async fn delete<T: DeserializeOwned>(
        &self,
        path: &str,
        options: RequestOptions,
    ) -> Result<T, Error> {
        self.send::<()>(Method::DELETE, path, None, options)
            .await?
            .decode()
    }

    /// Sends a request and returns the undecoded body.
    ///
    /// # Errors
    ///
    /// - [`Error::Token`] if the token getter fails.
    /// - [`Error::Http`] on transport failure, passed through unmodified.
    /// - [`Error::Api`] for any non-2xx response.
    /// - [`Error::Decode`] if the request body cannot be serialized or a JSON
    ///   response body is malformed.
    pub async fn send<B: Serialize + ?Sized>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
        options: RequestOptions,
    ) -> Result<ResponseBody, Error> {
        let token = self.resolve_token().await?;
        let url = self.resolve_url(path);
        let headers = self.build_headers(options.headers, token.as_deref())?;

        let mut request = self.inner.http.request(method.clone(), &url).headers(headers);
        if let Some(body) = body {
            request = request.body(serde_json::to_vec(body)?);
        }

        tracing::debug!(%method, url = %url, "Sending API request");
        let response = request.send().await?;
        let status = response.status();

        if status == StatusCode::UNAUTHORIZED {
            tracing::warn!(url = %url, "API request unauthorized");
            if let Some(hook) = &self.inner.on_unauthorized {
                hook();
            }
        }

        if !status.is_success() {
            let err = normalize_error(response).await;
            tracing::debug!(status = err.status, message = %err.message, "API request failed");
            return Err(err.into());
        }

        if status == StatusCode::NO_CONTENT {
            return Ok(ResponseBody::Empty);
        }

        let is_json = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|ct| ct.contains("application/json"));

        if is_json {
            let bytes = response.bytes().await?;
            Ok(ResponseBody::Json(serde_json::from_slice(&bytes)?))
        } else {
            Ok(ResponseBody::Text(response.text().await?))
        }
    }

    async fn resolve_token(&self) -> Result<Option<String>, Error> {
        // Clone out of the lock; the getter may await for a while.
        let getter = self.inner.token_getter.read().clone();
        match getter {
            Some(getter) => getter.token_dyn().await.map_err(Error::Token),
            None => Ok(None),
        }
    }

    fn resolve_url(&self, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            path.to_owned()
        } else if path.starts_with('/') {
            format!("{}{path}", self.inner.base_url)
        } else {
            format!("{}/{path}", self.inner.base_url)
        }
    }

    /// Caller headers, then bearer token, then content type, then client defaults.
    fn build_headers(&self, mut headers: HeaderMap, token: Option<&str>) -> Result<HeaderMap, Error> {
        if let Some(token) = token {
            let value = HeaderValue::from_str(&format!("Bearer {token}"))
                .map_err(|e| Error::Token(Box::new(e)))?;
            headers.insert(AUTHORIZATION, value);
        }
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        for (name, value) in &self.inner.default_headers {
            headers.insert(name.clone(), value.clone());
        }
        Ok(headers)
    }
}

/// Builds the normalized error for a non-2xx response.
async fn normalize_error(response: reqwest::Response) -> ApiError {
    let status = response.status();
    error_from_body(status, response.text().await)
}

/// A body that fails to read is treated as empty.
fn error_from_body<E: std::fmt::Display>(status: StatusCode, body: Result<String, E>) -> ApiError {
    let text = match body {
        Ok(text) => text,
        Err(e) => {
            tracing::debug!(status = status.as_u16(), error = %e, "Failed to read error response body");
            String::new()
        }
    };

    let details = if text.is_empty() {
        None
    } else {
        Some(serde_json::from_str::<JsonValue>(&text).unwrap_or(JsonValue::String(text)))
    };

    let message = details
        .as_ref()
        .and_then(JsonValue::as_object)
        .and_then(|body| body.get("message"))
        .map(|m| match m {
            JsonValue::String(s) => s.clone(),
            other => other.to_string(),
        })
        .or_else(|| status.canonical_reason().map(str::to_owned))
        .unwrap_or_else(|| "Request failed".to_owned());

    ApiError::new(status.as_u16(), message, details)
}
