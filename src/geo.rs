/// Mean Earth radius in meters.
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// A point in degrees. Only finite values can be constructed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Coordinates {
    pub lat: f64,
    pub lon: f64,
}

impl Coordinates {
    pub fn new(lat: f64, lon: f64) -> Option<Self> {
        (lat.is_finite() && lon.is_finite()).then_some(Self { lat, lon })
    }

    /// Builds a point from two optional columns, e.g. a venue snapshot.
    pub fn from_parts(lat: Option<f64>, lon: Option<f64>) -> Option<Self> {
        Self::new(lat?, lon?)
    }

    /// Parses the `"lat,lon"` form used by the list endpoint.
    pub fn parse_ll(raw: &str) -> Option<Self> {
        let (lat, lon) = raw.split_once(',')?;
        if lon.contains(',') {
            return None;
        }
        Self::new(lat.trim().parse().ok()?, lon.trim().parse().ok()?)
    }

    pub fn distance_to(&self, other: &Coordinates) -> f64 {
        haversine_meters(self.lat, self.lon, other.lat, other.lon)
    }
}

/// Great-circle distance in meters between two points given in degrees.
#[inline]
pub fn haversine_meters(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let lat1_rad = lat1.to_radians();
    let lat2_rad = lat2.to_radians();
    let delta_lat = (lat2 - lat1).to_radians();
    let delta_lon = (lon2 - lon1).to_radians();

    let a = (delta_lat / 2.0).sin().powi(2)
        + lat1_rad.cos() * lat2_rad.cos() * (delta_lon / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());

    EARTH_RADIUS_M * c
}
