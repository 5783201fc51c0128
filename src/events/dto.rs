use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;

use super::{lenient, repo_types::EventListing};

/// Query string of `GET /events/list`. Everything arrives as text and is
/// coerced leniently.
#[derive(Debug, Default, Deserialize)]
pub struct ListParams {
    /// `"lat,lon"`
    pub ll: Option<String>,
    pub radius: Option<String>,
    pub limit: Option<String>,
    pub invite_code: Option<String>,
    pub q: Option<String>,
    pub event_category: Option<String>,
}

/// Body of `POST /events/filter`.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FilterRequest {
    #[serde(deserialize_with = "lenient::number")]
    pub latitude: Option<f64>,
    #[serde(deserialize_with = "lenient::number")]
    pub longitude: Option<f64>,
    /// Meters. Absent means the default radius, an explicit `null` means none.
    #[serde(deserialize_with = "lenient::nullable_number")]
    pub radius: Option<Option<f64>>,
    #[serde(deserialize_with = "lenient::text")]
    pub category: Option<String>,
    #[serde(deserialize_with = "lenient::text")]
    pub venue_category: Option<String>,
    #[serde(deserialize_with = "lenient::text")]
    pub date_from: Option<String>,
    #[serde(deserialize_with = "lenient::text")]
    pub date_to: Option<String>,
    #[serde(deserialize_with = "lenient::number")]
    pub capacity_min: Option<f64>,
    #[serde(deserialize_with = "lenient::number")]
    pub capacity_max: Option<f64>,
    #[serde(deserialize_with = "lenient::text")]
    pub search_query: Option<String>,
    #[serde(deserialize_with = "lenient::number")]
    pub limit: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
pub struct DetailParams {
    pub invite_code: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct EventsResponse {
    pub events: Vec<EventListing>,
}

#[derive(Debug, Serialize)]
pub struct FilterResponse {
    pub events: Vec<EventListing>,
    pub total: usize,
}

#[derive(Debug, Serialize)]
pub struct EventResponse {
    pub event: EventListing,
}

#[derive(Debug, Deserialize)]
pub struct CreateEventRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    pub date_time: Option<String>,
    #[serde(rename = "type")]
    pub visibility: Option<String>,
    pub fsq_place_id: Option<String>,
    pub capacity: Option<i64>,
    pub invite_code: Option<String>,
    pub event_category: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct CreatedEventResponse {
    pub success: bool,
    pub event_id: Uuid,
    /// Present for private events so the host can share it.
    pub invite_code: Option<String>,
}

/// Partial update. For nullable columns the outer `Option` says whether the
/// field was sent, the inner one whether it is being cleared.
#[derive(Debug, Default, Deserialize)]
pub struct UpdateEventRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    pub date_time: Option<String>,
    #[serde(rename = "type")]
    pub visibility: Option<String>,
    #[serde(default, deserialize_with = "double_option")]
    pub fsq_place_id: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option")]
    pub capacity: Option<Option<i64>>,
    #[serde(default, deserialize_with = "double_option")]
    pub invite_code: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option")]
    pub event_category: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option")]
    pub venue_name: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option")]
    pub venue_address: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option")]
    pub venue_lat: Option<Option<f64>>,
    #[serde(default, deserialize_with = "double_option")]
    pub venue_lon: Option<Option<f64>>,
    #[serde(default, deserialize_with = "double_option")]
    pub venue_category: Option<Option<String>>,
}

fn double_option<'de, T, D>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

#[derive(Debug, Serialize)]
pub struct SuccessResponse {
    pub success: bool,
}

#[derive(Debug, Serialize)]
pub struct CleanupResponse {
    pub success: bool,
    #[serde(rename = "deletedEvents")]
    pub deleted_events: u64,
    #[serde(rename = "deletedEnrollments")]
    pub deleted_enrollments: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filter_request_reads_camel_case_and_coerces() {
        let req: FilterRequest = serde_json::from_str(
            r#"{
                "latitude": "40.7", "longitude": -74.0, "radius": 2500,
                "category": "Concerts", "venueCategory": "", "dateFrom": "2030-01-01",
                "capacityMin": "10", "capacityMax": "lots", "searchQuery": " jazz ", "limit": 5
            }"#,
        )
        .unwrap();
        assert_eq!(req.latitude, Some(40.7));
        assert_eq!(req.longitude, Some(-74.0));
        assert_eq!(req.radius, Some(Some(2500.0)));
        assert_eq!(req.category.as_deref(), Some("Concerts"));
        assert_eq!(req.venue_category, None);
        assert_eq!(req.date_from.as_deref(), Some("2030-01-01"));
        assert_eq!(req.date_to, None);
        assert_eq!(req.capacity_min, Some(10.0));
        assert_eq!(req.capacity_max, None);
        assert_eq!(req.search_query.as_deref(), Some("jazz"));
        assert_eq!(req.limit, Some(5.0));
    }

    #[test]
    fn update_request_distinguishes_absent_from_null() {
        let req: UpdateEventRequest =
            serde_json::from_str(r#"{"capacity": null, "invite_code": "xyz"}"#).unwrap();
        assert_eq!(req.capacity, Some(None));
        assert_eq!(req.invite_code, Some(Some("xyz".into())));
        assert_eq!(req.event_category, None);
        assert!(req.title.is_none());
    }

    #[test]
    fn filter_radius_keeps_null_apart_from_absent() {
        let parse = |json: &str| serde_json::from_str::<FilterRequest>(json).unwrap().radius;
        assert_eq!(parse("{}"), None);
        assert_eq!(parse(r#"{"radius": null}"#), Some(None));
        assert_eq!(parse(r#"{"radius": 0}"#), Some(Some(0.0)));
        assert_eq!(parse(r#"{"radius": "far"}"#), None);
    }
}
