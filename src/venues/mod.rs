use axum::Router;

use crate::state::AppState;

pub mod client;
pub mod enrich;
mod handlers;

pub use client::{FoursquareClient, PlacesClient};
pub use enrich::VenueEnricher;

/// Cached copy of the provider's place metadata. Every field is optional;
/// enrichment only ever fills fields that are still empty on the event.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VenueSnapshot {
    pub name: Option<String>,
    pub address: Option<String>,
    pub lat: Option<f64>,
    pub lon: Option<f64>,
    pub category: Option<String>,
}

impl VenueSnapshot {
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.address.is_none()
            && self.lat.is_none()
            && self.lon.is_none()
            && self.category.is_none()
    }
}

pub fn router() -> Router<AppState> {
    handlers::venue_routes()
}
