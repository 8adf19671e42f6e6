use serde::Serialize;
use serde_json::Value as JsonValue;

/// Error type returned by consumer-implemented traits (adapters, destinations, token getters).
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Normalized error for a non-2xx HTTP response.
///
/// Built once per failed request: `status` is the HTTP status, `message` comes
/// from the body's JSON `message` field when present, else the status text.
/// `details` holds the parsed body (or raw text) for diagnostics.
#[derive(Debug, Clone, PartialEq, Serialize, thiserror::Error)]
#[error("API error (status {status}): {message}")]
#[non_exhaustive]
pub struct ApiError {
    pub status: u16,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<JsonValue>,
}

impl ApiError {
    #[must_use]
    pub fn new(status: u16, message: impl Into<String>, details: Option<JsonValue>) -> Self {
        Self {
            status,
            message: message.into(),
            details,
        }
    }

    /// `true` for 401 responses.
    #[must_use]
    pub fn is_unauthorized(&self) -> bool {
        self.status == 401
    }
}

#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    #[error(transparent)]
    Api(#[from] ApiError),
    #[cfg(any(feature = "client", feature = "analytics"))]
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Decode error: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("Token getter failed: {0}")]
    Token(#[source] BoxError),
    #[error("Session adapter failed: {0}")]
    Adapter(#[source] BoxError),
    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    /// The normalized API error, if this is an application-level failure.
    #[must_use]
    pub fn as_api(&self) -> Option<&ApiError> {
        match self {
            Self::Api(e) => Some(e),
            _ => None,
        }
    }

    /// HTTP status of an application-level failure.
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        self.as_api().map(|e| e.status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_error_display_includes_status_and_message() {
        let err = ApiError::new(404, "Not Found", None);
        assert_eq!(err.to_string(), "API error (status 404): Not Found");
    }

    #[test]
    fn api_error_serializes_without_empty_details() {
        let err = ApiError::new(500, "boom", None);
        let json = serde_json::to_value(&err).unwrap();
        assert_eq!(json, serde_json::json!({ "status": 500, "message": "boom" }));
    }

    #[test]
    fn status_only_for_api_errors() {
        let api: Error = ApiError::new(401, "nope", None).into();
        assert_eq!(api.status(), Some(401));
        assert!(api.as_api().unwrap().is_unauthorized());

        let config = Error::Config("missing".into());
        assert_eq!(config.status(), None);
    }
}
