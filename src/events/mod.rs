use axum::Router;

use crate::state::AppState;

pub mod categories;
pub(crate) mod dto;
pub mod filters;
mod handlers;
pub mod lenient;
pub mod ranking;
pub mod repo;
pub mod repo_types;
pub mod services;
pub mod store;

pub use repo::PgEventStore;

pub fn router() -> Router<AppState> {
    Router::new()
        .merge(handlers::discovery_routes())
        .merge(handlers::host_routes())
}
