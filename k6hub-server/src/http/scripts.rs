//! Script endpoints

use std::sync::Arc;

use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
};
use k6hub_core::{DispatchError, NewScript, Operator, Script, ScriptId};

use crate::{AppState, error::ApiError};

/// POST /api/v1/scripts
pub async fn create(
    State(state): State<Arc<AppState>>,
    Extension(operator): Extension<Operator>,
    Json(new): Json<NewScript>,
) -> Result<(StatusCode, Json<Script>), ApiError> {
    let script = state.dispatch.create_script(new, &operator)?;
    Ok((StatusCode::CREATED, Json(script)))
}

/// GET /api/v1/scripts
pub async fn list(State(state): State<Arc<AppState>>) -> Result<Json<Vec<Script>>, ApiError> {
    Ok(Json(state.dispatch.list_scripts()?))
}

/// GET /api/v1/scripts/:id
pub async fn get(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Script>, ApiError> {
    let id: ScriptId = id
        .parse()
        .map_err(|_| DispatchError::ScriptNotFound(id.clone()))?;
    Ok(Json(state.dispatch.get_script(id)?))
}
