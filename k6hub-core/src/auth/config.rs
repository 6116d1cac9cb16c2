//! Configuration for admin token authentication

use serde::{Deserialize, Serialize};

/// Shared-secret (HS256) settings for admin bearer tokens
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdminAuthConfig {
    /// Signing secret; empty rejects every admin request
    #[serde(default)]
    pub jwt_secret: String,

    /// Expected `iss` claim
    #[serde(default = "default_issuer")]
    pub issuer: String,

    /// Clock skew leeway in seconds for token expiry validation
    #[serde(default = "default_clock_skew")]
    pub clock_skew_seconds: u64,

    /// Lifetime of minted tokens
    #[serde(default = "default_token_ttl")]
    pub token_ttl_secs: u64,
}

fn default_issuer() -> String {
    "k6hub".to_string()
}

fn default_clock_skew() -> u64 {
    60
}

fn default_token_ttl() -> u64 {
    86_400
}

impl Default for AdminAuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: String::new(),
            issuer: default_issuer(),
            clock_skew_seconds: default_clock_skew(),
            token_ttl_secs: default_token_ttl(),
        }
    }
}

impl AdminAuthConfig {
    pub fn with_secret(secret: impl Into<String>) -> Self {
        Self {
            jwt_secret: secret.into(),
            ..Self::default()
        }
    }

    pub fn is_configured(&self) -> bool {
        !self.jwt_secret.is_empty()
    }
}
