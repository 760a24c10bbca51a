use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use serde::Serialize;
use tracing::error;

use super::AppState;
use crate::engine::resolve_thresholds;
use crate::models::Thresholds;

// ---

pub fn router() -> Router<AppState> {
    // ---
    Router::new().route("/artifacts/{id}/thresholds", get(thresholds))
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ThresholdsResponse {
    artifact_id: i64,
    name: String,
    material_count: usize,
    thresholds: Thresholds,
}

/// Effective bounds of an artifact after intersecting its materials.
async fn thresholds(Path(id): Path<i64>, State((engine, _)): State<AppState>) -> impl IntoResponse {
    // ---
    match engine.artifact(id).await {
        Ok(Some(artifact)) => {
            let body = ThresholdsResponse {
                artifact_id: artifact.id,
                thresholds: resolve_thresholds(&artifact),
                material_count: artifact.materials.len(),
                name: artifact.name,
            };
            (StatusCode::OK, Json(body)).into_response()
        }
        Ok(None) => (StatusCode::NOT_FOUND, Json("Artifact not found")).into_response(),
        Err(e) => {
            error!("Failed to load artifact {}: {}", id, e);
            (StatusCode::INTERNAL_SERVER_ERROR, Json("Failed to load artifact")).into_response()
        }
    }
}
