#![doc = include_str!("../README.md")]

#[cfg(feature = "analytics")]
pub mod analytics;
#[cfg(feature = "client")]
pub mod client;
pub mod error;
pub mod session;
pub mod types;
#[cfg(feature = "client")]
pub mod venuevr;

// Re-exports for convenient access
#[cfg(feature = "analytics")]
pub use analytics::{
    AnalyticsClient, AnalyticsConfig, AnalyticsContext, AnalyticsDestination, AnalyticsEvent,
    AnalyticsEventName, Delivery, HttpDestination, HttpDestinationConfig, LogDestination,
    TrackEvent,
};
#[cfg(feature = "client")]
pub use client::{
    ApiClient, ApiClientConfig, RequestOptions, ResponseBody, StaticToken, TokenFn, TokenGetter,
};
pub use error::{ApiError, BoxError, Error};
pub use session::{
    LoginOptions, OrganizationMembership, SessionAdapter, SessionManager, SessionManagerOptions,
    SessionStatus, SessionUser,
};
pub use types::{BrandKey, OrgId, UserId};
