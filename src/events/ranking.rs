use std::cmp::Ordering;

use crate::geo::Coordinates;

use super::repo_types::EventListing;

/// Distance ranking applied after the candidate fetch.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Ranking {
    pub origin: Option<Coordinates>,
    /// Meters. Only meaningful together with `origin`.
    pub radius: Option<f64>,
    pub limit: Option<usize>,
}

/// Attaches distances, drops candidates outside the radius, orders nearest
/// first with unknown distances last, then truncates to the limit.
///
/// Without an origin the incoming order is kept and only the limit applies.
pub fn rank(mut events: Vec<EventListing>, ranking: &Ranking) -> Vec<EventListing> {
    if let Some(origin) = ranking.origin {
        for event in events.iter_mut() {
            event.distance = event.coordinates().map(|c| origin.distance_to(&c));
        }
        if let Some(radius) = ranking.radius.filter(|r| !r.is_nan()) {
            events.retain(|e| e.distance.is_some_and(|d| d <= radius));
        }
        // stable: ties and unknowns keep their incoming order
        events.sort_by(|a, b| by_distance(a.distance, b.distance));
    }

    if let Some(limit) = ranking.limit.filter(|l| *l > 0) {
        events.truncate(limit);
    }
    events
}

fn by_distance(a: Option<f64>, b: Option<f64>) -> Ordering {
    match (a, b) {
        (Some(x), Some(y)) => x.total_cmp(&y),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}
