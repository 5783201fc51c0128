use anyhow::Context;
use async_trait::async_trait;
use reqwest::{header, Client, StatusCode, Url};
use serde::Deserialize;
use tracing::{debug, warn};

use super::VenueSnapshot;
use crate::{config::PlacesConfig, events::lenient, geo::Coordinates};

const DETAIL_FIELDS: &str = "fsq_place_id,name,location,latitude,longitude,categories,geocodes";

#[async_trait]
pub trait PlacesClient: Send + Sync {
    /// Place details, or `None` when the provider has nothing usable.
    async fn place_details(&self, fsq_place_id: &str) -> anyhow::Result<Option<PlaceDetails>>;

    async fn search(&self, search: &PlaceSearch) -> anyhow::Result<Vec<PlaceDetails>>;

    /// Places matching a free-form address or name, best match first.
    async fn geocode(&self, lookup: &GeocodeLookup) -> anyhow::Result<Vec<PlaceDetails>>;

    /// The place closest to a point, if the provider knows one.
    async fn reverse_geocode(&self, at: Coordinates) -> anyhow::Result<Option<PlaceDetails>>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlaceSearch {
    pub query: String,
    pub lat: f64,
    pub lon: f64,
    pub radius: u32,
    pub limit: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GeocodeLookup {
    pub query: String,
    /// Biases results towards this point.
    pub near: Option<Coordinates>,
    pub limit: u32,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LatLon {
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Geocodes {
    #[serde(default)]
    pub main: Option<LatLon>,
    #[serde(default)]
    pub drop_off: Option<LatLon>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Location {
    pub formatted_address: Option<String>,
    pub address_line: Option<String>,
    pub address: Option<String>,
    pub locality: Option<String>,
    pub region: Option<String>,
    pub postcode: Option<String>,
    pub country: Option<String>,
    pub cross_street: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PlaceCategory {
    pub name: Option<String>,
}

/// The subset of a places payload we read. Newer API versions put
/// coordinates at the top level; older ones under `geocodes.main`; some
/// responses nest everything under `place`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PlaceDetails {
    pub fsq_place_id: Option<String>,
    pub name: Option<String>,
    #[serde(default)]
    pub location: Option<Location>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    #[serde(default)]
    pub geocodes: Option<Geocodes>,
    #[serde(default)]
    pub categories: Vec<PlaceCategory>,
    pub distance: Option<f64>,
    #[serde(default)]
    pub place: Option<Box<PlaceDetails>>,
}

impl PlaceDetails {
    fn nested(&self) -> Option<&PlaceDetails> {
        self.place.as_deref()
    }

    pub fn display_name(&self) -> Option<String> {
        self.name
            .clone()
            .or_else(|| self.nested().and_then(|p| p.name.clone()))
    }

    /// `location`, falling back to the nested place's.
    pub fn any_location(&self) -> Option<&Location> {
        self.location
            .as_ref()
            .or_else(|| self.nested().and_then(|p| p.location.as_ref()))
    }

    pub fn display_address(&self) -> Option<String> {
        let loc = self.any_location()?;
        if let Some(addr) = loc.formatted_address.as_ref().or(loc.address_line.as_ref()) {
            if !addr.is_empty() {
                return Some(addr.clone());
            }
        }
        let parts: Vec<&str> = [&loc.address, &loc.locality, &loc.region, &loc.postcode, &loc.country]
            .into_iter()
            .filter_map(|p| p.as_deref())
            .filter(|p| !p.is_empty())
            .collect();
        (!parts.is_empty()).then(|| parts.join(", "))
    }

    fn main_geocode(&self) -> Option<&LatLon> {
        self.geocodes.as_ref().and_then(|g| g.main.as_ref())
    }

    pub fn drop_off(&self) -> Option<&LatLon> {
        self.geocodes.as_ref().and_then(|g| g.drop_off.as_ref())
    }

    pub fn lat(&self) -> Option<f64> {
        self.main_geocode()
            .and_then(|g| g.latitude)
            .or(self.latitude)
            .or_else(|| self.nested().and_then(|p| p.latitude))
    }

    pub fn lon(&self) -> Option<f64> {
        self.main_geocode()
            .and_then(|g| g.longitude)
            .or(self.longitude)
            .or_else(|| self.nested().and_then(|p| p.longitude))
    }

    pub fn category(&self) -> Option<String> {
        let first = |cats: &[PlaceCategory]| cats.first().and_then(|c| c.name.clone());
        first(&self.categories).or_else(|| self.nested().and_then(|p| first(&p.categories)))
    }

    pub fn snapshot(&self) -> VenueSnapshot {
        VenueSnapshot {
            name: self.display_name(),
            address: self.display_address(),
            lat: self.lat(),
            lon: self.lon(),
            category: self.category(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    results: Vec<PlaceDetails>,
}

/// One row of a Nominatim `/search` answer. Coordinates arrive as strings.
#[derive(Debug, Deserialize)]
struct NominatimPlace {
    display_name: Option<String>,
    #[serde(default, deserialize_with = "lenient::number")]
    lat: Option<f64>,
    #[serde(default, deserialize_with = "lenient::number")]
    lon: Option<f64>,
}

impl From<NominatimPlace> for PlaceDetails {
    fn from(place: NominatimPlace) -> Self {
        Self {
            name: place.display_name.clone(),
            location: Some(Location {
                formatted_address: place.display_name,
                ..Default::default()
            }),
            geocodes: Some(Geocodes {
                main: Some(LatLon {
                    latitude: place.lat,
                    longitude: place.lon,
                }),
                drop_off: None,
            }),
            ..Default::default()
        }
    }
}

/// `base` with `segments` appended to its path, each percent-encoded.
fn endpoint(base: &Url, segments: &[&str]) -> anyhow::Result<Url> {
    let mut url = base.clone();
    url.path_segments_mut()
        .map_err(|_| anyhow::anyhow!("{base} cannot carry a path"))?
        .pop_if_empty()
        .extend(segments);
    Ok(url)
}

/// Foursquare Places over HTTPS, with Nominatim as the geocoding fallback.
#[derive(Clone)]
pub struct FoursquareClient {
    http: Client,
    base_url: Url,
    geocoder_url: Url,
    api_key: Option<String>,
    api_version: String,
}

impl FoursquareClient {
    pub fn new(config: &PlacesConfig) -> anyhow::Result<Self> {
        let http = Client::builder()
            .timeout(std::time::Duration::from_secs(10))
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("build places http client")?;
        Ok(Self {
            http,
            base_url: Url::parse(&config.base_url).context("parse FOURSQUARE_BASE_URL")?,
            geocoder_url: Url::parse(&config.geocoder_url).context("parse NOMINATIM_BASE_URL")?,
            api_key: config.api_key.clone(),
            api_version: config.api_version.clone(),
        })
    }

    fn get(&self, url: Url, key: &str) -> reqwest::RequestBuilder {
        self.http
            .get(url)
            .bearer_auth(key)
            .header(header::ACCEPT, "application/json")
            .header("X-Places-Api-Version", &self.api_version)
    }

    async fn find_places(
        &self,
        key: &str,
        params: &[(&str, String)],
    ) -> anyhow::Result<Vec<PlaceDetails>> {
        let url = endpoint(&self.base_url, &["places", "search"])?;
        let body = self
            .get(url, key)
            .query(params)
            .send()
            .await
            .context("places search request")?
            .error_for_status()
            .context("places search status")?
            .json::<SearchResponse>()
            .await
            .context("decode places search")?;
        Ok(body.results)
    }

    async fn nominatim(&self, lookup: &GeocodeLookup) -> anyhow::Result<Vec<PlaceDetails>> {
        let url = endpoint(&self.geocoder_url, &["search"])?;
        let places = self
            .http
            .get(url)
            .header(header::ACCEPT, "application/json")
            .query(&[
                ("q", lookup.query.clone()),
                ("format", "json".to_string()),
                ("addressdetails", "1".to_string()),
                ("limit", lookup.limit.to_string()),
            ])
            .send()
            .await
            .context("nominatim request")?
            .error_for_status()
            .context("nominatim status")?
            .json::<Vec<NominatimPlace>>()
            .await
            .context("decode nominatim search")?;
        Ok(places.into_iter().map(PlaceDetails::from).collect())
    }
}

#[async_trait]
impl PlacesClient for FoursquareClient {
    async fn place_details(&self, fsq_place_id: &str) -> anyhow::Result<Option<PlaceDetails>> {
        let Some(key) = self.api_key.as_deref() else {
            warn!("FOURSQUARE_API_KEY missing; skipping place details");
            return Ok(None);
        };
        let url = endpoint(&self.base_url, &["places", fsq_place_id])?;

        let mut res = self
            .get(url.clone(), key)
            .query(&[("fields", DETAIL_FIELDS)])
            .send()
            .await
            .context("places details request")?;
        if !res.status().is_success() {
            // some plans reject the fields filter
            res = self
                .get(url, key)
                .send()
                .await
                .context("places details request")?;
        }
        let status = res.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            anyhow::bail!("places details for {fsq_place_id} returned {status}");
        }

        let details = res
            .json::<PlaceDetails>()
            .await
            .context("decode places details")?;
        debug!(%fsq_place_id, "place details fetched");
        Ok(Some(details))
    }

    async fn search(&self, search: &PlaceSearch) -> anyhow::Result<Vec<PlaceDetails>> {
        let Some(key) = self.api_key.as_deref() else {
            anyhow::bail!("FOURSQUARE_API_KEY is not configured");
        };
        self.find_places(
            key,
            &[
                ("query", search.query.clone()),
                ("ll", format!("{},{}", search.lat, search.lon)),
                ("radius", search.radius.to_string()),
                ("limit", search.limit.to_string()),
            ],
        )
        .await
    }

    async fn geocode(&self, lookup: &GeocodeLookup) -> anyhow::Result<Vec<PlaceDetails>> {
        let mut params = vec![
            ("query", lookup.query.clone()),
            ("limit", lookup.limit.to_string()),
            ("fields", "fsq_place_id,name,location,geocodes".to_string()),
        ];
        if let Some(near) = lookup.near {
            params.push(("ll", format!("{},{}", near.lat, near.lon)));
        }

        let places_failed = match self.api_key.as_deref() {
            Some(key) => match self.find_places(key, &params).await {
                Ok(found) if !found.is_empty() => return Ok(found),
                Ok(_) => false,
                Err(e) => {
                    warn!(error = %e, "places geocode failed");
                    true
                }
            },
            None => false,
        };
        debug!(query = %lookup.query, "geocoding through nominatim");

        match self.nominatim(lookup).await {
            Ok(found) => Ok(found),
            Err(e) if places_failed => Err(e),
            Err(e) => {
                warn!(error = %e, "nominatim geocode failed");
                Ok(Vec::new())
            }
        }
    }

    async fn reverse_geocode(&self, at: Coordinates) -> anyhow::Result<Option<PlaceDetails>> {
        let Some(key) = self.api_key.as_deref() else {
            warn!("FOURSQUARE_API_KEY missing; skipping reverse geocode");
            return Ok(None);
        };
        let found = self
            .find_places(
                key,
                &[
                    ("ll", format!("{},{}", at.lat, at.lon)),
                    ("limit", "1".to_string()),
                ],
            )
            .await?;
        Ok(found.into_iter().next())
    }
}
