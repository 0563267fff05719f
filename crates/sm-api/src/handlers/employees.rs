use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use sm_common::{Employee, EmployeeId, NewEmployee, ProjectId, SkillLevel};

use crate::auth::AuthUser;
use crate::error::ApiError;
use crate::SharedState;

#[derive(Debug, Deserialize)]
pub struct UpdateSkillsRequest {
    pub skills: Vec<SkillLevel>,
}

#[derive(Debug, Serialize)]
pub struct CurrentProjectResponse {
    pub employee_id: EmployeeId,
    pub project_id: Option<ProjectId>,
}

pub async fn create_employee(
    State(state): State<SharedState>,
    _auth: AuthUser,
    Json(payload): Json<NewEmployee>,
) -> Result<(StatusCode, Json<Employee>), ApiError> {
    let employee = state.service.register_employee(payload).await?;
    Ok((StatusCode::CREATED, Json(employee)))
}

pub async fn update_skills(
    State(state): State<SharedState>,
    Path(employee_id): Path<i64>,
    _auth: AuthUser,
    Json(payload): Json<UpdateSkillsRequest>,
) -> Result<Json<Employee>, ApiError> {
    let employee = state
        .service
        .update_employee_skills(EmployeeId(employee_id), payload.skills)
        .await?;
    Ok(Json(employee))
}

pub async fn current_project(
    State(state): State<SharedState>,
    Path(employee_id): Path<i64>,
    _auth: AuthUser,
) -> Result<Json<CurrentProjectResponse>, ApiError> {
    let employee_id = EmployeeId(employee_id);
    let project_id = state.service.current_project(employee_id).await?;
    Ok(Json(CurrentProjectResponse {
        employee_id,
        project_id,
    }))
}
