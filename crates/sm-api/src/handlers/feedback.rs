use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use sm_common::{Feedback, MatchId, NewFeedback};

use crate::auth::AuthUser;
use crate::error::ApiError;
use crate::SharedState;

#[derive(Debug, Deserialize)]
pub struct FeedbackRequest {
    pub rating: u8,
    pub text: String,
}

pub async fn submit_feedback(
    State(state): State<SharedState>,
    Path(match_id): Path<i64>,
    auth: AuthUser,
    Json(payload): Json<FeedbackRequest>,
) -> Result<(StatusCode, Json<Feedback>), ApiError> {
    let feedback = NewFeedback {
        match_id: MatchId(match_id),
        rating: payload.rating,
        text: payload.text,
        author_id: auth.actor()?,
    };
    let stored = state.service.submit_feedback(feedback).await?;
    Ok((StatusCode::CREATED, Json(stored)))
}

pub async fn list_feedback(
    State(state): State<SharedState>,
    Path(match_id): Path<i64>,
    _auth: AuthUser,
) -> Result<Json<Vec<Feedback>>, ApiError> {
    let feedback = state.service.list_feedback(MatchId(match_id)).await?;
    Ok(Json(feedback))
}
