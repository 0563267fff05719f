use axum::{extract::State, Json};
use serde_json::json;
use tokio::time::{timeout, Duration};

use crate::error::ApiError;
use crate::SharedState;

const READINESS_TIMEOUT: Duration = Duration::from_secs(1);

pub async fn livez() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

pub async fn readyz(State(state): State<SharedState>) -> Result<Json<serde_json::Value>, ApiError> {
    if !state.readiness.load(std::sync::atomic::Ordering::SeqCst) {
        return Err(ApiError::ServiceUnavailable("shutting_down".into()));
    }

    let store = state.service.store();
    timeout(READINESS_TIMEOUT, store.ping())
        .await
        .map_err(|_| ApiError::ServiceUnavailable("store_ping_timeout".into()))?
        .map_err(|err| ApiError::ServiceUnavailable(format!("store check failed: {err}")))?;

    Ok(Json(json!({
        "status": "ok",
        "store": store.backend(),
        "application": env!("CARGO_PKG_NAME"),
    })))
}
