//! Endpoints called by load-test agents: register, heartbeat, poll, status

use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
};
use k6hub_core::{Ack, AgentDescriptor, HeartbeatReport, PollResponse, Registration, StatusReport};
use serde::Deserialize;

use crate::{AppState, error::ApiError, middleware::agent_credential};

#[derive(Debug, Deserialize)]
pub struct PollQuery {
    pub agent_id: Option<String>,
}

/// POST /api/v1/agents/register
pub async fn register(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(descriptor): Json<AgentDescriptor>,
) -> Result<(StatusCode, Json<Registration>), ApiError> {
    let registration = state
        .dispatch
        .register(descriptor, agent_credential(&headers))?;
    Ok((StatusCode::CREATED, Json(registration)))
}

/// POST /api/v1/agents/heartbeat
pub async fn heartbeat(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(report): Json<HeartbeatReport>,
) -> Result<Json<Ack>, ApiError> {
    let ack = state
        .dispatch
        .heartbeat(&report, agent_credential(&headers))?;
    Ok(Json(ack))
}

/// GET /api/v1/agents/jobs/poll?agent_id=
pub async fn poll(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<PollQuery>,
) -> Result<Json<PollResponse>, ApiError> {
    let agent_id = query
        .agent_id
        .filter(|id| !id.trim().is_empty())
        .ok_or_else(|| ApiError::bad_request("agent_id query parameter is required"))?;
    let response = state
        .dispatch
        .poll(&agent_id, agent_credential(&headers))?;
    Ok(Json(response))
}

/// POST /api/v1/agents/jobs/:job_id/status
pub async fn report_status(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(job_id): Path<String>,
    Json(report): Json<StatusReport>,
) -> Result<Json<Ack>, ApiError> {
    let ack = state
        .dispatch
        .report_status(&job_id, &report, agent_credential(&headers))?;
    Ok(Json(ack))
}
