use axum::{
    extract::{Path, State},
    Json,
};
use serde::Deserialize;
use sm_common::{MatchAction, MatchId, TransitionOutcome};

use crate::auth::AuthUser;
use crate::error::ApiError;
use crate::SharedState;

#[derive(Debug, Deserialize)]
pub struct TransitionRequest {
    pub action: MatchAction,
}

pub async fn transition(
    State(state): State<SharedState>,
    Path(match_id): Path<i64>,
    auth: AuthUser,
    Json(request): Json<TransitionRequest>,
) -> Result<Json<TransitionOutcome>, ApiError> {
    let actor = auth.actor()?;
    let outcome = state
        .service
        .transition(MatchId(match_id), request.action, actor)
        .await?;
    Ok(Json(outcome))
}
