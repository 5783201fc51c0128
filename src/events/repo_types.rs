use std::{fmt, str::FromStr};

use serde::Serialize;
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{geo::Coordinates, venues::VenueSnapshot};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    Public,
    Private,
}

impl Visibility {
    pub fn as_str(&self) -> &'static str {
        match self {
            Visibility::Public => "public",
            Visibility::Private => "private",
        }
    }
}

impl fmt::Display for Visibility {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unknown visibility {0:?}")]
pub struct UnknownVisibility(pub String);

impl FromStr for Visibility {
    type Err = UnknownVisibility;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "public" => Ok(Visibility::Public),
            "private" => Ok(Visibility::Private),
            other => Err(UnknownVisibility(other.to_string())),
        }
    }
}

impl TryFrom<String> for Visibility {
    type Error = UnknownVisibility;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// An event as returned by every read: the stored record plus the
/// enrollment annotations and, after ranking, the distance in meters.
#[derive(Debug, Clone, PartialEq, Serialize, FromRow)]
pub struct EventListing {
    pub event_id: Uuid,
    pub host_id: Uuid,
    pub title: String,
    pub description: String,
    pub fsq_place_id: Option<String>,
    pub venue_name: Option<String>,
    pub venue_address: Option<String>,
    pub venue_lat: Option<f64>,
    pub venue_lon: Option<f64>,
    pub venue_category: Option<String>,
    pub event_category: Option<String>,
    #[serde(rename = "type")]
    #[sqlx(try_from = "String")]
    pub visibility: Visibility,
    #[serde(with = "time::serde::rfc3339")]
    pub date_time: OffsetDateTime,
    pub capacity: Option<i32>,
    pub invite_code: Option<String>,
    pub enrollment_count: i64,
    pub is_enrolled: bool,
    #[sqlx(skip)]
    pub distance: Option<f64>,
}

impl EventListing {
    pub fn coordinates(&self) -> Option<Coordinates> {
        Coordinates::from_parts(self.venue_lat, self.venue_lon)
    }

    /// True when some snapshot field is still empty and there is a place to ask.
    pub fn needs_venue(&self) -> bool {
        self.fsq_place_id.is_some()
            && (self.venue_name.is_none()
                || self.venue_address.is_none()
                || self.venue_lat.is_none()
                || self.venue_lon.is_none()
                || self.venue_category.is_none())
    }

    /// Fills empty snapshot fields; populated ones are kept.
    pub fn apply_snapshot(&mut self, snapshot: &VenueSnapshot) {
        fill(&mut self.venue_name, &snapshot.name);
        fill(&mut self.venue_address, &snapshot.address);
        fill(&mut self.venue_lat, &snapshot.lat);
        fill(&mut self.venue_lon, &snapshot.lon);
        fill(&mut self.venue_category, &snapshot.category);
    }

    /// Invite codes are only shown to the host.
    pub fn redact_for(mut self, viewer: Option<Uuid>) -> Self {
        if viewer != Some(self.host_id) {
            self.invite_code = None;
        }
        self
    }
}

fn fill<T: Clone>(slot: &mut Option<T>, value: &Option<T>) {
    if slot.is_none() {
        slot.clone_from(value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    fn listing() -> EventListing {
        EventListing {
            event_id: Uuid::new_v4(),
            host_id: Uuid::new_v4(),
            title: "Jazz night".into(),
            description: String::new(),
            fsq_place_id: Some("4b0588".into()),
            venue_name: Some("Blue Note".into()),
            venue_address: None,
            venue_lat: None,
            venue_lon: None,
            venue_category: None,
            event_category: Some("Concerts".into()),
            visibility: Visibility::Public,
            date_time: datetime!(2030-01-01 20:00 UTC),
            capacity: None,
            invite_code: Some("SECRET".into()),
            enrollment_count: 0,
            is_enrolled: false,
            distance: None,
        }
    }

    #[test]
    fn snapshot_fills_only_empty_fields() {
        let mut event = listing();
        event.apply_snapshot(&VenueSnapshot {
            name: Some("Other Club".into()),
            address: Some("131 W 3rd St".into()),
            lat: Some(40.73),
            lon: Some(-74.0),
            category: Some("Jazz Club".into()),
        });
        assert_eq!(event.venue_name.as_deref(), Some("Blue Note"));
        assert_eq!(event.venue_address.as_deref(), Some("131 W 3rd St"));
        assert_eq!(event.coordinates(), Coordinates::new(40.73, -74.0));
        assert!(!event.needs_venue());
    }

    #[test]
    fn needs_venue_requires_a_place_id() {
        let mut event = listing();
        assert!(event.needs_venue());
        event.fsq_place_id = None;
        assert!(!event.needs_venue());
    }

    #[test]
    fn serializes_with_wire_field_names() {
        let event = listing();
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "public");
        assert_eq!(json["date_time"], "2030-01-01T20:00:00Z");
        assert_eq!(json["is_enrolled"], false);
        assert!(json.get("distance").is_some());
        assert!(json.get("visibility").is_none());
    }

    #[test]
    fn invite_code_is_hidden_from_non_hosts() {
        let event = listing();
        let host = event.host_id;
        assert!(event.clone().redact_for(Some(host)).invite_code.is_some());
        assert!(event.clone().redact_for(None).invite_code.is_none());
        assert!(event.redact_for(Some(Uuid::new_v4())).invite_code.is_none());
    }

    #[test]
    fn visibility_round_trips_through_text() {
        assert_eq!("private".parse::<Visibility>().unwrap(), Visibility::Private);
        assert!("secret".parse::<Visibility>().is_err());
    }
}
