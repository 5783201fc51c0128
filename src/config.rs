use std::time::Duration;

use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct JwtConfig {
    pub secret: String,
    pub issuer: String,
    pub audience: String,
    pub ttl_minutes: i64,
    pub refresh_ttl_minutes: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PlacesConfig {
    /// Without a key, enrichment and venue search are disabled.
    pub api_key: Option<String>,
    pub base_url: String,
    pub api_version: String,
    /// OpenStreetMap Nominatim, asked when the places search finds nothing.
    pub geocoder_url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub database_url: String,
    pub jwt: JwtConfig,
    pub places: PlacesConfig,
    /// Upper bound the event detail read waits for its enrichment task.
    pub enrich_wait: Duration,
    /// How long an event whose place lacks some venue fields is left alone
    /// before it is fetched again.
    pub venue_retry: Duration,
    /// Period of the background expiry sweep; zero disables it.
    pub cleanup_interval: Duration,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = std::env::var("DATABASE_URL")?;
        let jwt = JwtConfig {
            secret: std::env::var("JWT_SECRET")?,
            issuer: std::env::var("JWT_ISSUER").unwrap_or_else(|_| "eventium".into()),
            audience: std::env::var("JWT_AUDIENCE").unwrap_or_else(|_| "eventium-users".into()),
            ttl_minutes: env_parse("JWT_TTL_MINUTES").unwrap_or(60),
            refresh_ttl_minutes: env_parse("JWT_REFRESH_TTL_MINUTES").unwrap_or(60 * 24 * 14),
        };
        let places = PlacesConfig {
            api_key: std::env::var("FOURSQUARE_API_KEY")
                .ok()
                .filter(|k| !k.trim().is_empty()),
            base_url: std::env::var("FOURSQUARE_BASE_URL")
                .unwrap_or_else(|_| "https://places-api.foursquare.com".into()),
            api_version: std::env::var("FOURSQUARE_API_VERSION")
                .unwrap_or_else(|_| "2025-06-17".into()),
            geocoder_url: std::env::var("NOMINATIM_BASE_URL")
                .unwrap_or_else(|_| "https://nominatim.openstreetmap.org".into()),
        };
        Ok(Self {
            database_url,
            jwt,
            places,
            enrich_wait: Duration::from_millis(env_parse("ENRICH_WAIT_MS").unwrap_or(1500)),
            venue_retry: Duration::from_secs(env_parse("VENUE_RETRY_SECS").unwrap_or(600)),
            cleanup_interval: Duration::from_secs(env_parse("CLEANUP_INTERVAL_SECS").unwrap_or(300)),
        })
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.parse::<T>().ok())
}
