//! Authentication error types

use thiserror::Error;

/// Errors that can occur during authentication
#[derive(Debug, Error)]
pub enum AuthError {
    /// No authentication token was provided in the request
    #[error("no authentication token provided")]
    MissingToken,

    /// The Authorization header is not a bearer token
    #[error("invalid token format: {0}")]
    InvalidFormat(String),

    /// The token has expired
    #[error("token has expired")]
    Expired,

    /// No signing secret is configured, so no token can be valid
    #[error("admin authentication is not configured")]
    NotConfigured,

    /// JWT decoding error from jsonwebtoken crate
    #[error("JWT error: {0}")]
    JwtError(#[from] jsonwebtoken::errors::Error),
}
