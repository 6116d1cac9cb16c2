//! Task endpoints; non-admin operators only see their own tasks

use std::sync::Arc;

use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use k6hub_core::{
    DispatchError, NewTask, Operator, Page, ScriptId, Task, TaskId, TaskQuery, TaskStatistics,
    TaskStatus, TaskUpdate,
};
use serde::Deserialize;

use super::page_request;
use crate::{AppState, error::ApiError};

/// Query params for the task list
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListTasksQuery {
    pub page: Option<u32>,
    pub limit: Option<u32>,
    pub status: Option<String>,
    pub script_id: Option<String>,
}

impl TryFrom<ListTasksQuery> for TaskQuery {
    type Error = ApiError;

    fn try_from(q: ListTasksQuery) -> Result<Self, Self::Error> {
        let status = q
            .status
            .filter(|s| !s.is_empty())
            .map(|s| s.parse::<TaskStatus>())
            .transpose()
            .map_err(|e| ApiError::bad_request(e.to_string()))?;
        let script_id = q
            .script_id
            .filter(|s| !s.is_empty())
            .map(|s| s.parse::<ScriptId>())
            .transpose()
            .map_err(|_| ApiError::bad_request("scriptId is not a valid id"))?;
        Ok(Self {
            page: page_request(q.page, q.limit),
            status,
            script_id,
            ..Default::default()
        })
    }
}

fn task_id(raw: &str) -> Result<TaskId, ApiError> {
    raw.parse()
        .map_err(|_| DispatchError::TaskNotFound(raw.to_string()).into())
}

/// POST /api/v1/tasks
pub async fn create(
    State(state): State<Arc<AppState>>,
    Extension(operator): Extension<Operator>,
    Json(new): Json<NewTask>,
) -> Result<(StatusCode, Json<Task>), ApiError> {
    let task = state.dispatch.create_task(new, &operator)?;
    Ok((StatusCode::CREATED, Json(task)))
}

/// GET /api/v1/tasks
pub async fn list(
    State(state): State<Arc<AppState>>,
    Extension(operator): Extension<Operator>,
    Query(query): Query<ListTasksQuery>,
) -> Result<Json<Page<Task>>, ApiError> {
    let query = TaskQuery::try_from(query)?;
    Ok(Json(state.dispatch.list_tasks(&operator, query)?))
}

/// GET /api/v1/tasks/statistics
pub async fn statistics(
    State(state): State<Arc<AppState>>,
    Extension(operator): Extension<Operator>,
) -> Result<Json<TaskStatistics>, ApiError> {
    Ok(Json(state.dispatch.task_statistics(&operator)?))
}

/// GET /api/v1/tasks/:id
pub async fn get(
    State(state): State<Arc<AppState>>,
    Extension(operator): Extension<Operator>,
    Path(id): Path<String>,
) -> Result<Json<Task>, ApiError> {
    Ok(Json(state.dispatch.get_task(task_id(&id)?, &operator)?))
}

/// PUT /api/v1/tasks/:id
pub async fn update(
    State(state): State<Arc<AppState>>,
    Extension(operator): Extension<Operator>,
    Path(id): Path<String>,
    Json(update): Json<TaskUpdate>,
) -> Result<Json<Task>, ApiError> {
    Ok(Json(
        state
            .dispatch
            .update_task(task_id(&id)?, update, &operator)?,
    ))
}

/// DELETE /api/v1/tasks/:id
pub async fn remove(
    State(state): State<Arc<AppState>>,
    Extension(operator): Extension<Operator>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    state.dispatch.remove_task(task_id(&id)?, &operator)?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/v1/tasks/:id/stop
pub async fn stop(
    State(state): State<Arc<AppState>>,
    Extension(operator): Extension<Operator>,
    Path(id): Path<String>,
) -> Result<Json<Task>, ApiError> {
    Ok(Json(state.dispatch.stop_task(task_id(&id)?, &operator)?))
}
