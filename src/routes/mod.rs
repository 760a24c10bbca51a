use std::sync::Arc;

use axum::Router;

use crate::engine::Engine;
use crate::notify::Dispatcher;

mod alerts;
mod artifacts;
mod health;
mod measurements;

// ---

/// Shared state of every route.
pub type AppState = (Arc<Engine>, Arc<Dispatcher>);

pub fn router(engine: Arc<Engine>, dispatcher: Arc<Dispatcher>) -> Router {
    // ---
    Router::new()
        .merge(measurements::router())
        .merge(alerts::router())
        .merge(artifacts::router())
        .merge(health::router())
        .with_state((engine, dispatcher))
}
