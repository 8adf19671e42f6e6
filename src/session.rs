//! Session state for the current user, backed by a pluggable identity adapter.
//!
//! [`SessionManager`] is the single authority for "who is logged in". It caches
//! the resolved [`SessionUser`], tracks a [`SessionStatus`], and delegates the
//! provider-specific work (fetching the user and token, redirecting to login)
//! to a consumer-implemented [`SessionAdapter`].
//!
//! ```rust,ignore
//! let session = SessionManager::spawn(
//!     SessionManagerOptions::new(MyProvider::new())
//!         .with_status_listener(|status| tracing::info!(?status, "session changed")),
//! );
//!
//! // Requests pick up the session's token on every call.
//! let api = ApiClient::new(ApiClientConfig::new(base_url).with_token_getter(session.clone()));
//! ```

use std::future::Future;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::error::{BoxError, Error};
use crate::types::{OrgId, UserId};

/// Authentication status of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    /// Initial state, before the first bootstrap settles.
    Loading,
    Authenticated,
    Unauthenticated,
}

/// A user's membership in an organization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[non_exhaustive]
pub struct OrganizationMembership {
    pub id: OrgId,
    pub name: String,
    pub role: String,
}

impl OrganizationMembership {
    #[must_use]
    pub fn new(id: impl Into<OrgId>, name: impl Into<String>, role: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            role: role.into(),
        }
    }
}

/// The authenticated principal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[non_exhaustive]
pub struct SessionUser {
    pub id: UserId,
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub roles: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub organizations: Vec<OrganizationMembership>,
}

impl SessionUser {
    /// Create a user with only the required `id` and `email` fields.
    #[must_use]
    pub fn new(id: impl Into<UserId>, email: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            email: email.into(),
            name: None,
            avatar_url: None,
            roles: Vec::new(),
            organizations: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    #[must_use]
    pub fn with_avatar_url(mut self, url: impl Into<String>) -> Self {
        self.avatar_url = Some(url.into());
        self
    }

    #[must_use]
    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        self.roles.push(role.into());
        self
    }

    #[must_use]
    pub fn with_organization(mut self, membership: OrganizationMembership) -> Self {
        self.organizations.push(membership);
        self
    }

    #[must_use]
    pub fn has_role(&self, role: &str) -> bool {
        self.roles.iter().any(|r| r == role)
    }

    /// The user's role in `org`, if they are a member.
    #[must_use]
    pub fn role_in(&self, org: &OrgId) -> Option<&str> {
        self.organizations
            .iter()
            .find(|m| &m.id == org)
            .map(|m| m.role.as_str())
    }
}

/// Options for login/logout redirects.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[non_exhaustive]
pub struct LoginOptions {
    /// Where the identity provider should send the user afterwards.
    pub return_to: Option<String>,
}

impl LoginOptions {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_return_to(mut self, path: impl Into<String>) -> Self {
        self.return_to = Some(path.into());
        self
    }
}

/// Consumer-provided identity provider.
///
/// Wraps whatever actually knows about the user: an OAuth provider, a
/// cookie-backed backend session, a test fixture.
///
/// # Example
///
/// ```rust,ignore
/// impl SessionAdapter for AccountsAdapter {
///     async fn get_user(&self) -> Result<Option<SessionUser>, BoxError> {
///         match self.api.get::<SessionUser>("/auth/me", RequestOptions::new()).await {
///             Ok(user) => Ok(Some(user)),
///             Err(e) if e.status() == Some(401) => Ok(None),
///             Err(e) => Err(e.into()),
///         }
///     }
///
///     async fn get_token(&self) -> Result<Option<String>, BoxError> {
///         Ok(self.tokens.access_token().await)
///     }
///
///     fn login(&self, options: LoginOptions) {
///         self.navigator.redirect("/login", options.return_to);
///     }
///
///     fn logout(&self, options: LoginOptions) {
///         self.navigator.redirect("/logout", options.return_to);
///     }
/// }
/// ```
pub trait SessionAdapter: Send + Sync + 'static {
    /// Fetch the current user. `Ok(None)` means nobody is logged in.
    fn get_user(
        &self,
    ) -> impl Future<Output = Result<Option<SessionUser>, BoxError>> + Send;

    /// Fetch a bearer token for the current user.
    fn get_token(&self) -> impl Future<Output = Result<Option<String>, BoxError>> + Send;

    /// Whether [`refresh`](SessionAdapter::refresh) does anything.
    fn supports_refresh(&self) -> bool {
        false
    }

    /// Renew the underlying session (e.g. rotate a refresh token).
    fn refresh(&self) -> impl Future<Output = Result<(), BoxError>> + Send {
        async { Ok(()) }
    }

    /// Start the provider's login flow.
    fn login(&self, options: LoginOptions);

    /// Start the provider's logout flow.
    fn logout(&self, options: LoginOptions);
}

type StatusListener = Arc<dyn Fn(SessionStatus) + Send + Sync>;

/// Session manager construction options.
pub struct SessionManagerOptions<A> {
    adapter: A,
    on_status_change: Option<StatusListener>,
}

impl<A: SessionAdapter> SessionManagerOptions<A> {
    #[must_use]
    pub fn new(adapter: A) -> Self {
        Self {
            adapter,
            on_status_change: None,
        }
    }

    /// Called on every status transition (never for same-status updates).
    #[must_use]
    pub fn with_status_listener(
        mut self,
        listener: impl Fn(SessionStatus) + Send + Sync + 'static,
    ) -> Self {
        self.on_status_change = Some(Arc::new(listener));
        self
    }
}

struct SessionState {
    status: SessionStatus,
    user: Option<SessionUser>,
}

struct Inner<A> {
    adapter: A,
    state: Mutex<SessionState>,
    on_status_change: Option<StatusListener>,
}

/// Tracks the current user's authentication status.
///
/// Cheap to clone; clones share the cached user and status. Concurrent
/// [`bootstrap`](SessionManager::bootstrap) calls are not serialized: the last
/// one to finish decides the cached state.
pub struct SessionManager<A> {
    inner: Arc<Inner<A>>,
}

// Manual Clone: avoid derive adding an `A: Clone` bound.
impl<A> Clone for SessionManager<A> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<A: SessionAdapter> SessionManager<A> {
    /// Create a manager in [`SessionStatus::Loading`]. Nothing is fetched until
    /// [`bootstrap`](SessionManager::bootstrap) is called.
    #[must_use]
    pub fn new(options: SessionManagerOptions<A>) -> Self {
        Self {
            inner: Arc::new(Inner {
                adapter: options.adapter,
                state: Mutex::new(SessionState {
                    status: SessionStatus::Loading,
                    user: None,
                }),
                on_status_change: options.on_status_change,
            }),
        }
    }

    /// Create a manager and start [`bootstrap`](SessionManager::bootstrap) in the
    /// background without waiting for it. The status reads `Loading` until it settles.
    ///
    /// # Panics
    ///
    /// Panics if called outside a tokio runtime.
    #[must_use]
    pub fn spawn(options: SessionManagerOptions<A>) -> Self {
        let manager = Self::new(options);
        let background = manager.clone();
        tokio::spawn(async move {
            background.bootstrap().await;
        });
        manager
    }

    /// Resolve the current user from the adapter and cache it.
    ///
    /// An adapter failure counts as "no user". Never leaves the manager in `Loading`.
    pub async fn bootstrap(&self) -> Option<SessionUser> {
        match self.inner.adapter.get_user().await {
            Ok(user) => {
                let status = if user.is_some() {
                    SessionStatus::Authenticated
                } else {
                    SessionStatus::Unauthenticated
                };
                self.apply(user.clone(), status);
                user
            }
            Err(e) => {
                tracing::warn!(error = %e, "Session bootstrap failed, treating as logged out");
                self.apply(None, SessionStatus::Unauthenticated);
                None
            }
        }
    }

    #[must_use]
    pub fn status(&self) -> SessionStatus {
        self.inner.state.lock().status
    }

    #[must_use]
    pub fn user(&self) -> Option<SessionUser> {
        self.inner.state.lock().user.clone()
    }

    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.status() == SessionStatus::Authenticated
    }

    /// Fetch a token from the adapter.
    ///
    /// If the adapter fails while the session looks authenticated, the session
    /// is re-bootstrapped once to detect expiry. Failures always yield `None`.
    pub async fn token(&self) -> Option<String> {
        match self.inner.adapter.get_token().await {
            Ok(token) => token,
            Err(e) => {
                tracing::warn!(error = %e, "Session token fetch failed");
                if self.status() == SessionStatus::Authenticated {
                    self.bootstrap().await;
                }
                None
            }
        }
    }

    /// Refresh the adapter's session, then re-bootstrap.
    ///
    /// No-op when the adapter does not support refresh. Listeners see the
    /// final status only; no transient `Loading` is announced.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Adapter`] if the adapter's refresh fails. The cached
    /// state is left untouched in that case.
    pub async fn refresh(&self) -> Result<(), Error> {
        if !self.inner.adapter.supports_refresh() {
            return Ok(());
        }
        self.inner.adapter.refresh().await.map_err(Error::Adapter)?;
        self.bootstrap().await;
        Ok(())
    }

    pub fn login(&self, options: LoginOptions) {
        self.inner.adapter.login(options);
    }

    /// Clear the cached user, mark the session unauthenticated, then hand off
    /// to the adapter's logout flow.
    pub fn logout(&self, options: LoginOptions) {
        self.apply(None, SessionStatus::Unauthenticated);
        self.inner.adapter.logout(options);
    }

    fn apply(&self, user: Option<SessionUser>, status: SessionStatus) {
        let changed = {
            let mut state = self.inner.state.lock();
            state.user = user;
            let changed = state.status != status;
            state.status = status;
            changed
        };

        // Listener runs outside the lock so it may read the manager.
        if changed {
            tracing::debug!(?status, "Session status changed");
            if let Some(listener) = &self.inner.on_status_change {
                listener(status);
            }
        }
    }
}

#[cfg(feature = "client")]
impl<A: SessionAdapter> crate::client::TokenGetter for SessionManager<A> {
    fn token(&self) -> impl Future<Output = Result<Option<String>, BoxError>> + Send {
        let manager = self.clone();
        async move { Ok(manager.token().await) }
    }
}
