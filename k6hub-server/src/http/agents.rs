//! Admin agent management endpoints

use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use k6hub_core::{
    Agent, AgentId, AgentQuery, AgentStatistics, AgentStatus, AgentUpdate, BatchOutcome,
    DispatchError, NewAgent, Page, ReclaimReport, Task,
};
use serde::{Deserialize, Serialize};

use super::page_request;
use crate::{AppState, error::ApiError};

/// Query params for the agent list
#[derive(Debug, Deserialize)]
pub struct ListAgentsQuery {
    pub page: Option<u32>,
    pub limit: Option<u32>,
    pub status: Option<String>,
    pub hostname: Option<String>,
}

impl TryFrom<ListAgentsQuery> for AgentQuery {
    type Error = ApiError;

    fn try_from(q: ListAgentsQuery) -> Result<Self, Self::Error> {
        let status = q
            .status
            .filter(|s| !s.is_empty())
            .map(|s| s.parse::<AgentStatus>())
            .transpose()
            .map_err(|e| ApiError::bad_request(e.to_string()))?;
        Ok(Self {
            page: page_request(q.page, q.limit),
            status,
            hostname: q.hostname.filter(|h| !h.is_empty()),
        })
    }
}

#[derive(Debug, Deserialize)]
pub struct BatchRequest {
    pub ids: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemovedAgent {
    pub id: AgentId,
    pub unpinned_tasks: u64,
    pub failed_tasks: u64,
    pub requeued_tasks: u64,
}

impl RemovedAgent {
    fn new(id: AgentId, report: ReclaimReport) -> Self {
        Self {
            id,
            unpinned_tasks: report.unpinned_tasks,
            failed_tasks: report.failed_tasks,
            requeued_tasks: report.requeued_tasks,
        }
    }
}

fn agent_id(raw: &str) -> Result<AgentId, ApiError> {
    raw.parse()
        .map_err(|_| DispatchError::AgentNotFound(raw.to_string()).into())
}

/// POST /api/v1/agents
pub async fn create(
    State(state): State<Arc<AppState>>,
    Json(new): Json<NewAgent>,
) -> Result<(StatusCode, Json<Agent>), ApiError> {
    let agent = state.dispatch.create_agent(new)?;
    Ok((StatusCode::CREATED, Json(agent)))
}

/// GET /api/v1/agents
pub async fn list(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListAgentsQuery>,
) -> Result<Json<Page<Agent>>, ApiError> {
    let query = AgentQuery::try_from(query)?;
    Ok(Json(state.dispatch.list_agents(&query)?))
}

/// GET /api/v1/agents/statistics
pub async fn statistics(
    State(state): State<Arc<AppState>>,
) -> Result<Json<AgentStatistics>, ApiError> {
    Ok(Json(state.dispatch.agent_statistics()?))
}

/// GET /api/v1/agents/:id
pub async fn get(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Agent>, ApiError> {
    Ok(Json(state.dispatch.get_agent(agent_id(&id)?)?))
}

/// PUT /api/v1/agents/:id
pub async fn update(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(update): Json<AgentUpdate>,
) -> Result<Json<Agent>, ApiError> {
    Ok(Json(state.dispatch.update_agent(agent_id(&id)?, update)?))
}

/// DELETE /api/v1/agents/:id
pub async fn remove(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<RemovedAgent>, ApiError> {
    let id = agent_id(&id)?;
    let report = state.dispatch.remove_agent(id)?;
    Ok(Json(RemovedAgent::new(id, report)))
}

/// GET /api/v1/agents/:id/tasks
pub async fn tasks(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Vec<Task>>, ApiError> {
    Ok(Json(state.dispatch.agent_tasks(agent_id(&id)?)?))
}

/// POST /api/v1/agents/:id/start and /enable
pub async fn start(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Agent>, ApiError> {
    Ok(Json(state.dispatch.start_agent(agent_id(&id)?)?))
}

/// POST /api/v1/agents/:id/stop and /disable
pub async fn stop(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Agent>, ApiError> {
    Ok(Json(state.dispatch.stop_agent(agent_id(&id)?)?))
}

/// POST /api/v1/agents/batch/enable
pub async fn batch_enable(
    State(state): State<Arc<AppState>>,
    Json(request): Json<BatchRequest>,
) -> Json<BatchOutcome> {
    Json(state.dispatch.batch_start(&request.ids))
}

/// POST /api/v1/agents/batch/disable
pub async fn batch_disable(
    State(state): State<Arc<AppState>>,
    Json(request): Json<BatchRequest>,
) -> Json<BatchOutcome> {
    Json(state.dispatch.batch_stop(&request.ids))
}
