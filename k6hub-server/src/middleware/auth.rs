//! Bearer-token authentication middleware for axum

use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::{HeaderMap, header::AUTHORIZATION},
    middleware::Next,
    response::Response,
};
use k6hub_core::auth::bearer_token;

use crate::{AppState, error::ApiError};

fn authorization(headers: &HeaderMap) -> Option<&str> {
    headers.get(AUTHORIZATION).and_then(|v| v.to_str().ok())
}

/// Agent credential from `Authorization: Bearer <agentToken>`, if any
pub fn agent_credential(headers: &HeaderMap) -> Option<&str> {
    bearer_token(authorization(headers)).ok()
}

/// Reject the request unless it carries a valid admin token.
///
/// The resolved [`k6hub_core::Operator`] is attached to the request
/// extensions for the handlers.
pub async fn require_operator(
    State(state): State<Arc<AppState>>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let operator = {
        let token = bearer_token(authorization(request.headers()))?;
        state.validator.validate(token).inspect_err(|e| {
            tracing::debug!(error = %e, "Admin token rejected");
        })?
    };

    request.extensions_mut().insert(operator);
    Ok(next.run(request).await)
}
