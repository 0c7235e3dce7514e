//! HTTP routes of the relay service.

pub mod health;
pub mod outbox;

use axum::Router;

use crate::state::AppState;

/// Builds the full router. `main` and the integration tests share it.
pub fn router(state: AppState) -> Router {
    Router::new()
        .merge(health::router())
        .nest("/api/v1/outbox", outbox::router())
        .with_state(state)
}
