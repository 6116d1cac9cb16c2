//! HS256 admin token validation and minting

use std::time::Duration;

use chrono::{DateTime, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};

use super::{AdminAuthConfig, AuthError, Operator, Role};

/// Claims carried by an admin token
#[derive(Debug, Serialize, Deserialize)]
struct AdminClaims {
    sub: String,
    role: String,
    exp: i64,
    iat: i64,
    iss: String,
}

/// Validates and mints admin bearer tokens with a shared secret
pub struct TokenValidator {
    config: AdminAuthConfig,
    encoding: EncodingKey,
    decoding: DecodingKey,
}

impl TokenValidator {
    pub fn new(config: AdminAuthConfig) -> Self {
        let secret = config.jwt_secret.as_bytes();
        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            config,
        }
    }

    pub fn config(&self) -> &AdminAuthConfig {
        &self.config
    }

    /// Validate a token and return the operator it names
    pub fn validate(&self, token: &str) -> Result<Operator, AuthError> {
        if !self.config.is_configured() {
            return Err(AuthError::NotConfigured);
        }

        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = self.config.clock_skew_seconds;
        validation.set_issuer(&[&self.config.issuer]);
        validation.set_required_spec_claims(&["exp", "sub", "iss"]);

        let claims = decode::<AdminClaims>(token, &self.decoding, &validation)
            .map_err(|e| {
                if matches!(e.kind(), ErrorKind::ExpiredSignature) {
                    AuthError::Expired
                } else {
                    AuthError::JwtError(e)
                }
            })?
            .claims;

        let role: Role = claims
            .role
            .parse()
            .map_err(|e: crate::error::ParseEnumError| AuthError::InvalidFormat(e.to_string()))?;
        let expires_at = DateTime::from_timestamp(claims.exp, 0).unwrap_or_else(Utc::now);

        Ok(Operator::new(claims.sub, role, expires_at))
    }

    /// Issue a token for `subject` valid for `ttl` from `now`
    pub fn mint(
        &self,
        subject: &str,
        role: Role,
        ttl: Duration,
        now: DateTime<Utc>,
    ) -> Result<String, AuthError> {
        if !self.config.is_configured() {
            return Err(AuthError::NotConfigured);
        }

        let ttl = i64::try_from(ttl.as_secs()).unwrap_or(i64::MAX);
        let claims = AdminClaims {
            sub: subject.to_string(),
            role: role.as_str().to_string(),
            iat: now.timestamp(),
            exp: now.timestamp().saturating_add(ttl),
            iss: self.config.issuer.clone(),
        };
        Ok(encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)?)
    }
}

/// Pull the token out of an `Authorization: Bearer <token>` header value
pub fn bearer_token(header: Option<&str>) -> Result<&str, AuthError> {
    let header = header.map(str::trim).filter(|h| !h.is_empty());
    let Some(header) = header else {
        return Err(AuthError::MissingToken);
    };

    let (scheme, token) = header
        .split_once(' ')
        .ok_or_else(|| AuthError::InvalidFormat("expected `Bearer <token>`".to_string()))?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return Err(AuthError::InvalidFormat(format!(
            "unsupported scheme `{scheme}`"
        )));
    }

    let token = token.trim();
    if token.is_empty() {
        return Err(AuthError::MissingToken);
    }
    Ok(token)
}
