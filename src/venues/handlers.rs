use axum::{
    extract::State,
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tracing::{instrument, warn};

use super::client::{GeocodeLookup, PlaceDetails, PlaceSearch};
use crate::{
    error::{AppError, AppResult},
    events::lenient,
    extract::AppQuery,
    geo::Coordinates,
    state::AppState,
};

const DEFAULT_RADIUS_M: u32 = 5000;
const SEARCH_LIMIT: u32 = 10;
const DEFAULT_GEOCODE_LIMIT: usize = 5;
const MAX_GEOCODE_LIMIT: usize = 10;

pub fn venue_routes() -> Router<AppState> {
    Router::new()
        .route("/venues/search", get(search_venues))
        .route("/geocode", get(geocode))
        .route("/reverse-geocode", get(reverse_geocode))
}

#[derive(Debug, Deserialize)]
pub struct VenueSearchParams {
    pub q: Option<String>,
    pub lat: Option<String>,
    pub lng: Option<String>,
    pub radius: Option<String>,
}

#[derive(Debug, Serialize, PartialEq)]
pub struct VenueCoordinates {
    pub lat: Option<f64>,
    pub lng: Option<f64>,
}

#[derive(Debug, Serialize, PartialEq)]
pub struct VenueResult {
    pub fsq_place_id: Option<String>,
    pub name: Option<String>,
    pub address: String,
    pub category: String,
    pub distance: f64,
    pub coordinates: VenueCoordinates,
}

impl From<PlaceDetails> for VenueResult {
    fn from(place: PlaceDetails) -> Self {
        let fallback_lat = place.drop_off().and_then(|d| d.latitude);
        let fallback_lng = place.drop_off().and_then(|d| d.longitude);
        let address = place
            .display_address()
            .or_else(|| place.location.as_ref().and_then(|l| l.cross_street.clone()))
            .unwrap_or_else(|| "Address not available".to_string());
        Self {
            coordinates: VenueCoordinates {
                lat: place.lat().or(fallback_lat),
                lng: place.lon().or(fallback_lng),
            },
            name: place.display_name(),
            category: place.category().unwrap_or_else(|| "No category".to_string()),
            distance: place.distance.unwrap_or(0.0),
            address,
            fsq_place_id: place.fsq_place_id,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct VenueSearchResponse {
    pub venues: Vec<VenueResult>,
}

#[instrument(skip(state))]
pub async fn search_venues(
    State(state): State<AppState>,
    AppQuery(params): AppQuery<VenueSearchParams>,
) -> AppResult<Json<VenueSearchResponse>> {
    let (Some(lat), Some(lon)) = (
        lenient::parse_number(params.lat.as_deref()),
        lenient::parse_number(params.lng.as_deref()),
    ) else {
        return Err(AppError::validation("Latitude and longitude are required"));
    };
    let Some(query) = lenient::non_empty(params.q) else {
        return Err(AppError::validation("Search query is required"));
    };
    let radius = lenient::parse_number(params.radius.as_deref())
        .filter(|r| *r > 0.0)
        .map_or(DEFAULT_RADIUS_M, |r| r as u32);

    let search = PlaceSearch {
        query,
        lat,
        lon,
        radius,
        limit: SEARCH_LIMIT,
    };
    let places = state.places.search(&search).await.map_err(|e| {
        warn!(error = %e, "venue search failed");
        AppError::Upstream("Failed to search venues".into())
    })?;

    Ok(Json(VenueSearchResponse {
        venues: places.into_iter().map(VenueResult::from).collect(),
    }))
}

#[derive(Debug, Deserialize)]
pub struct GeocodeParams {
    pub q: Option<String>,
    pub limit: Option<String>,
    /// `"lat,lon"` to bias results towards.
    pub ll: Option<String>,
}

#[derive(Debug, Serialize, PartialEq)]
pub struct GeocodeResult {
    pub fsq_place_id: Option<String>,
    pub name: Option<String>,
    pub address: Option<String>,
    pub lat: f64,
    pub lng: f64,
}

impl GeocodeResult {
    /// `None` for places without a usable point.
    pub fn from_place(place: PlaceDetails) -> Option<Self> {
        let loc = place.location.as_ref();
        let drop_off = place.drop_off();
        let lat = place
            .geocodes
            .as_ref()
            .and_then(|g| g.main.as_ref())
            .and_then(|m| m.latitude)
            .or_else(|| drop_off.and_then(|d| d.latitude))
            .or_else(|| loc.and_then(|l| l.latitude))
            .or_else(|| place.lat())?;
        let lng = place
            .geocodes
            .as_ref()
            .and_then(|g| g.main.as_ref())
            .and_then(|m| m.longitude)
            .or_else(|| drop_off.and_then(|d| d.longitude))
            .or_else(|| loc.and_then(|l| l.longitude))
            .or_else(|| place.lon())?;
        Some(Self {
            address: place.display_address(),
            name: place.display_name(),
            fsq_place_id: place.fsq_place_id,
            lat,
            lng,
        })
    }
}

#[derive(Debug, Serialize)]
pub struct GeocodeResponse {
    pub results: Vec<GeocodeResult>,
}

#[instrument(skip(state))]
pub async fn geocode(
    State(state): State<AppState>,
    AppQuery(params): AppQuery<GeocodeParams>,
) -> AppResult<Json<GeocodeResponse>> {
    let Some(query) = lenient::non_empty(params.q) else {
        return Err(AppError::validation("Missing query"));
    };
    let limit = lenient::positive_count(lenient::parse_number(params.limit.as_deref()))
        .unwrap_or(DEFAULT_GEOCODE_LIMIT)
        .min(MAX_GEOCODE_LIMIT);

    let lookup = GeocodeLookup {
        query,
        near: params.ll.as_deref().and_then(Coordinates::parse_ll),
        limit: limit as u32,
    };
    let places = state.places.geocode(&lookup).await.map_err(|e| {
        warn!(error = %e, "geocode failed");
        AppError::Upstream("Failed to geocode".into())
    })?;

    Ok(Json(GeocodeResponse {
        results: places
            .into_iter()
            .filter_map(GeocodeResult::from_place)
            .take(limit)
            .collect(),
    }))
}

#[derive(Debug, Deserialize)]
pub struct ReverseGeocodeParams {
    pub lat: Option<String>,
    pub lng: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ReverseGeocodeResponse {
    pub label: String,
}

/// The first address part the place has, or the rounded point itself.
pub fn place_label(place: Option<&PlaceDetails>, at: Coordinates) -> String {
    place
        .and_then(PlaceDetails::any_location)
        .and_then(|loc| {
            [
                &loc.formatted_address,
                &loc.address,
                &loc.locality,
                &loc.region,
                &loc.postcode,
                &loc.country,
            ]
            .into_iter()
            .filter_map(|p| p.as_deref())
            .find(|p| !p.is_empty())
            .map(str::to_string)
        })
        .unwrap_or_else(|| format!("{:.3}, {:.3}", at.lat, at.lon))
}

#[instrument(skip(state))]
pub async fn reverse_geocode(
    State(state): State<AppState>,
    AppQuery(params): AppQuery<ReverseGeocodeParams>,
) -> AppResult<Json<ReverseGeocodeResponse>> {
    let at = lenient::parse_number(params.lat.as_deref())
        .zip(lenient::parse_number(params.lng.as_deref()))
        .and_then(|(lat, lon)| Coordinates::new(lat, lon))
        .ok_or_else(|| AppError::validation("Missing lat/lng"))?;

    let place = state.places.reverse_geocode(at).await.map_err(|e| {
        warn!(error = %e, "reverse geocode failed");
        AppError::Upstream("Failed to reverse geocode".into())
    })?;

    Ok(Json(ReverseGeocodeResponse {
        label: place_label(place.as_ref(), at),
    }))
}
