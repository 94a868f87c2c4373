pub mod dto;
pub mod export;
pub mod handlers;
pub mod repo;
pub mod repo_types;

use crate::state::AppState;
use axum::Router;

pub fn router() -> Router<AppState> {
    Router::new()
        .merge(handlers::patient_routes())
        .merge(handlers::doctor_routes())
        .merge(handlers::public_routes())
}
