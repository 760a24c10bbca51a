use axum::{
    extract::State, http::StatusCode, response::IntoResponse, routing::post, Json, Router,
};
use tracing::{debug, error, info};

use super::AppState;
use crate::models::Measurement;

// ---

pub fn router() -> Router<AppState> {
    // ---
    Router::new().route("/measurements", post(handler))
}

/// Evaluate a batch of measurements and return the alerts they resolved to.
///
/// A storage failure fails the whole request with 500; the caller resubmits
/// the same batch and already processed measurements are skipped.
async fn handler(
    State((engine, dispatcher)): State<AppState>,
    Json(measurements): Json<Vec<Measurement>>,
) -> impl IntoResponse {
    // ---
    info!("POST /measurements - evaluating {} measurements", measurements.len());

    let alerts = match engine.evaluate_batch(measurements).await {
        Ok(alerts) => alerts,
        Err(e) => {
            error!("Failed to evaluate measurements: {}", e);
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json("Failed to evaluate measurements"),
            )
                .into_response();
        }
    };

    // On-demand dispatch; the rate limiter keeps this from flooding receivers
    if !alerts.is_empty() {
        let report = dispatcher.dispatch().await;
        debug!("POST /measurements - on-demand dispatch: {:?}", report);
    }

    info!("POST /measurements - returning {} alerts", alerts.len());
    (StatusCode::OK, Json(alerts)).into_response()
}
