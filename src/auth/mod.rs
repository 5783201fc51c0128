use axum::Router;

use crate::state::AppState;

mod claims;
mod dto;
pub mod extractors;
mod handlers;
pub mod jwt;
mod password;
mod repo;
mod repo_types;
mod services;

pub fn router() -> Router<AppState> {
    Router::new()
        .merge(handlers::auth_routes())
        .merge(handlers::me_routes())
}
