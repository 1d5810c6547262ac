use axum::Router;

use crate::state::AppState;

pub mod health;
pub mod tasks;

/// All task endpoints, mounted under the API prefix.
pub fn api_routes() -> Router<AppState> {
    tasks::router()
}
