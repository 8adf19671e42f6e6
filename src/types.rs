use derive_more::{Display, From, Into};
use serde::{Deserialize, Serialize};

use crate::error::Error;

/// Identifier of an authenticated user (opaque string chosen by the identity provider).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Display, From, Into)]
#[serde(transparent)]
pub struct UserId(pub String);

impl From<&str> for UserId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

/// Identifier of an organization a user belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Display, From, Into)]
#[serde(transparent)]
pub struct OrgId(pub String);

impl From<&str> for OrgId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

/// Product line sharing this client layer.
///
/// Serialized in kebab-case (`"business-now"`, `"legacy-crm"`, ...).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
#[non_exhaustive]
pub enum BrandKey {
    Valora,
    Venuevr,
    BusinessNow,
    Sportify,
    LegacyCrm,
    /// Umbrella brand, used when neither the event nor the context names one.
    #[default]
    Hub,
}

impl BrandKey {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Valora => "valora",
            Self::Venuevr => "venuevr",
            Self::BusinessNow => "business-now",
            Self::Sportify => "sportify",
            Self::LegacyCrm => "legacy-crm",
            Self::Hub => "hub",
        }
    }
}

impl std::fmt::Display for BrandKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for BrandKey {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "valora" => Ok(Self::Valora),
            "venuevr" => Ok(Self::Venuevr),
            "business-now" => Ok(Self::BusinessNow),
            "sportify" => Ok(Self::Sportify),
            "legacy-crm" => Ok(Self::LegacyCrm),
            "hub" => Ok(Self::Hub),
            other => Err(Error::Config(format!("unknown brand: {other}"))),
        }
    }
}
