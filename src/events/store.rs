use async_trait::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

use super::{filters::CandidateQuery, repo_types::EventListing};
use crate::venues::VenueSnapshot;

/// Read side of the event store used by discovery, plus the venue
/// write-back. Every listing carries its live enrollment count and whether
/// the viewer is enrolled.
#[async_trait]
pub trait EventStore: Send + Sync {
    /// Events matching the query, latest `date_time` first.
    async fn candidates(&self, query: &CandidateQuery) -> anyhow::Result<Vec<EventListing>>;

    /// Non-expired events hosted by `host_id`, latest first.
    async fn hosted_by(&self, host_id: Uuid, now: OffsetDateTime)
        -> anyhow::Result<Vec<EventListing>>;

    /// A single non-expired event regardless of visibility.
    async fn find_active(
        &self,
        event_id: Uuid,
        viewer: Option<Uuid>,
        now: OffsetDateTime,
    ) -> anyhow::Result<Option<EventListing>>;

    /// Writes snapshot fields that are still null. Returns whether a row changed.
    async fn fill_venue(&self, event_id: Uuid, snapshot: &VenueSnapshot) -> anyhow::Result<bool>;
}

#[cfg(test)]
pub mod memory {
    use std::sync::Mutex;

    use super::*;

    /// In-process store used by tests and `AppState::fake()`.
    #[derive(Default)]
    pub struct MemoryEventStore {
        events: Mutex<Vec<EventListing>>,
        enrollments: Mutex<Vec<(Uuid, Uuid)>>,
    }

    impl MemoryEventStore {
        pub fn with_events(events: Vec<EventListing>) -> Self {
            Self {
                events: Mutex::new(events),
                enrollments: Mutex::default(),
            }
        }

        pub fn enroll(&self, event_id: Uuid, user_id: Uuid) {
            self.enrollments.lock().unwrap().push((event_id, user_id));
        }

        pub fn get(&self, event_id: Uuid) -> Option<EventListing> {
            self.events
                .lock()
                .unwrap()
                .iter()
                .find(|e| e.event_id == event_id)
                .cloned()
        }

        fn annotate(&self, mut event: EventListing, viewer: Option<Uuid>) -> EventListing {
            let enrollments = self.enrollments.lock().unwrap();
            event.enrollment_count = enrollments.iter().filter(|(e, _)| *e == event.event_id).count() as i64;
            event.is_enrolled = viewer
                .is_some_and(|v| enrollments.iter().any(|(e, u)| *e == event.event_id && *u == v));
            event.distance = None;
            event
        }

        fn select(
            &self,
            viewer: Option<Uuid>,
            keep: impl Fn(&EventListing) -> bool,
        ) -> Vec<EventListing> {
            let mut rows: Vec<_> = self
                .events
                .lock()
                .unwrap()
                .iter()
                .filter(|e| keep(e))
                .cloned()
                .collect();
            rows.sort_by(|a, b| b.date_time.cmp(&a.date_time));
            rows.into_iter().map(|e| self.annotate(e, viewer)).collect()
        }
    }

    #[async_trait]
    impl EventStore for MemoryEventStore {
        async fn candidates(&self, query: &CandidateQuery) -> anyhow::Result<Vec<EventListing>> {
            Ok(self.select(query.scope.actor.user_id(), |e| query.matches(e)))
        }

        async fn hosted_by(
            &self,
            host_id: Uuid,
            now: OffsetDateTime,
        ) -> anyhow::Result<Vec<EventListing>> {
            Ok(self.select(Some(host_id), |e| e.host_id == host_id && e.date_time > now))
        }

        async fn find_active(
            &self,
            event_id: Uuid,
            viewer: Option<Uuid>,
            now: OffsetDateTime,
        ) -> anyhow::Result<Option<EventListing>> {
            Ok(self
                .select(viewer, |e| e.event_id == event_id && e.date_time > now)
                .into_iter()
                .next())
        }

        async fn fill_venue(&self, event_id: Uuid, snapshot: &VenueSnapshot) -> anyhow::Result<bool> {
            let mut events = self.events.lock().unwrap();
            let Some(event) = events.iter_mut().find(|e| e.event_id == event_id) else {
                return Ok(false);
            };
            let before = event.clone();
            event.apply_snapshot(snapshot);
            Ok(*event != before)
        }
    }
}
