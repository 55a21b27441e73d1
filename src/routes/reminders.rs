use std::sync::Arc;

use axum::{extract::State, routing::get, Json, Router};
use serde::Serialize;

use crate::error::AppResult;
use crate::services::reminders::DispatchSummary;
use crate::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/dispatch", get(dispatch).post(dispatch))
}

#[derive(Serialize)]
struct DispatchResponse {
    success: bool,
    #[serde(flatten)]
    summary: DispatchSummary,
}

/// Run the reminder job once. Called by an external scheduler; GET and POST behave the same.
async fn dispatch(State(state): State<Arc<AppState>>) -> AppResult<Json<DispatchResponse>> {
    let summary = state.dispatcher.run().await?;

    Ok(Json(DispatchResponse {
        success: true,
        summary,
    }))
}
