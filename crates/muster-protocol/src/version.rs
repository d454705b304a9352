//! Gateway API versioning.

use serde::{Deserialize, Serialize};

use crate::codec::Encoding;

/// Gateway API version spoken by this crate.
pub const API_VERSION: ApiVersion = ApiVersion(9);

/// Oldest gateway API version that still serves member list updates.
pub const MIN_API_VERSION: ApiVersion = ApiVersion(6);

/// Gateway API version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ApiVersion(pub u8);

impl ApiVersion {
    /// Create a new version.
    #[must_use]
    pub const fn new(version: u8) -> Self {
        Self(version)
    }

    /// Check if this version can be used by this crate.
    #[must_use]
    pub fn is_supported(&self) -> bool {
        *self >= MIN_API_VERSION && *self <= API_VERSION
    }

    /// Build the connection URL for a gateway base URL.
    #[must_use]
    pub fn gateway_url(&self, base: &str, encoding: Encoding) -> String {
        let separator = if base.contains('?') { '&' } else { '?' };
        format!(
            "{}{}v={}&encoding={}",
            base.trim_end_matches('/'),
            separator,
            self.0,
            encoding.as_str()
        )
    }
}

impl std::fmt::Display for ApiVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "v{}", self.0)
    }
}

impl Default for ApiVersion {
    fn default() -> Self {
        API_VERSION
    }
}
