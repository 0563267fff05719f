use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Serialize;
use sm_common::{MatchListing, NewProject, ProjectId, ProjectWithMatches, RecomputeOutcome};

use crate::auth::AuthUser;
use crate::error::ApiError;
use crate::SharedState;

#[derive(Debug, Serialize)]
pub struct MatchListResponse {
    pub project_id: ProjectId,
    pub matches: Vec<MatchListing>,
}

pub async fn create_project(
    State(state): State<SharedState>,
    _auth: AuthUser,
    Json(payload): Json<NewProject>,
) -> Result<(StatusCode, Json<ProjectWithMatches>), ApiError> {
    let created = state.service.create_project(payload).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

pub async fn update_project(
    State(state): State<SharedState>,
    Path(project_id): Path<i64>,
    _auth: AuthUser,
    Json(payload): Json<NewProject>,
) -> Result<Json<ProjectWithMatches>, ApiError> {
    let updated = state
        .service
        .update_project(ProjectId(project_id), payload)
        .await?;
    Ok(Json(updated))
}

pub async fn recompute(
    State(state): State<SharedState>,
    Path(project_id): Path<i64>,
    _auth: AuthUser,
) -> Result<Json<RecomputeOutcome>, ApiError> {
    let outcome = state.service.recompute(ProjectId(project_id)).await?;
    Ok(Json(outcome))
}

pub async fn list_matches(
    State(state): State<SharedState>,
    Path(project_id): Path<i64>,
    _auth: AuthUser,
) -> Result<Json<MatchListResponse>, ApiError> {
    let project_id = ProjectId(project_id);
    let matches = state.service.list_matches(project_id).await?;
    Ok(Json(MatchListResponse {
        project_id,
        matches,
    }))
}
