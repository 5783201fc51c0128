use axum::Router;

use crate::state::AppState;

mod dto;
mod handlers;
mod repo;
pub mod repo_types;
pub mod services;

pub fn router() -> Router<AppState> {
    handlers::enrollment_routes()
}
