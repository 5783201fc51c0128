use std::{
    collections::{HashMap, HashSet},
    sync::{Arc, Mutex, PoisonError},
    time::{Duration, Instant},
};

use tokio::task::JoinHandle;
use tracing::{debug, warn};
use uuid::Uuid;

use super::{PlacesClient, VenueSnapshot};
use crate::events::{repo_types::EventListing, store::EventStore};

/// Best-effort venue enrichment, detached from the read path.
///
/// A task fetches place details and writes back only snapshot fields that
/// are still null, so concurrent tasks for one event cannot clobber each
/// other. Failures are logged and dropped.
///
/// Some places never report every field, so an event is not fetched again
/// until `retry_after` has passed since its last finished attempt.
#[derive(Clone)]
pub struct VenueEnricher {
    places: Arc<dyn PlacesClient>,
    store: Arc<dyn EventStore>,
    in_flight: Arc<Mutex<HashSet<Uuid>>>,
    attempted: Arc<Mutex<HashMap<Uuid, Instant>>>,
    retry_after: Duration,
}

/// Removes the event from the in-flight set when the task ends, even on panic.
struct InFlightGuard {
    set: Arc<Mutex<HashSet<Uuid>>>,
    event_id: Uuid,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.set
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.event_id);
    }
}

impl VenueEnricher {
    pub fn new(
        places: Arc<dyn PlacesClient>,
        store: Arc<dyn EventStore>,
        retry_after: Duration,
    ) -> Self {
        Self {
            places,
            store,
            in_flight: Arc::default(),
            attempted: Arc::default(),
            retry_after,
        }
    }

    fn recently_attempted(&self, event_id: Uuid) -> bool {
        self.attempted
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&event_id)
            .is_some_and(|at| at.elapsed() < self.retry_after)
    }

    fn record_attempt(&self, event_id: Uuid) {
        let mut attempted = self.attempted.lock().unwrap_or_else(PoisonError::into_inner);
        attempted.retain(|_, at| at.elapsed() < self.retry_after);
        attempted.insert(event_id, Instant::now());
    }

    /// Starts enrichment for one event. `None` if there is nothing to fill,
    /// a task for the event is already running, or one finished recently.
    pub fn spawn(&self, event: &EventListing) -> Option<JoinHandle<Option<VenueSnapshot>>> {
        if !event.needs_venue() {
            return None;
        }
        let place_id = event.fsq_place_id.clone()?;
        let event_id = event.event_id;
        if self.recently_attempted(event_id) {
            debug!(%event_id, "venue fetched recently; not retrying yet");
            return None;
        }

        let inserted = self
            .in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(event_id);
        if !inserted {
            debug!(%event_id, "venue enrichment already in flight");
            return None;
        }
        let guard = InFlightGuard {
            set: self.in_flight.clone(),
            event_id,
        };

        let this = self.clone();
        Some(tokio::spawn(async move {
            let _guard = guard;
            let snapshot = this.enrich(event_id, &place_id).await;
            this.record_attempt(event_id);
            snapshot
        }))
    }

    /// Fire-and-forget enrichment for every listing that needs it.
    pub fn spawn_all(&self, events: &[EventListing]) -> usize {
        events.iter().filter_map(|e| self.spawn(e)).count()
    }

    /// Detail reads may wait a little for fresh venue data; the task keeps
    /// running in the background if the wait runs out.
    pub async fn enrich_within(&self, event: &mut EventListing, wait: Duration) {
        let Some(handle) = self.spawn(event) else {
            return;
        };
        if wait.is_zero() {
            return;
        }
        match tokio::time::timeout(wait, handle).await {
            Ok(Ok(Some(snapshot))) => event.apply_snapshot(&snapshot),
            Ok(Ok(None)) => {}
            Ok(Err(e)) => warn!(error = %e, event_id = %event.event_id, "venue enrichment task failed"),
            Err(_) => debug!(event_id = %event.event_id, "venue enrichment still running; serving cached venue"),
        }
    }

    async fn enrich(&self, event_id: Uuid, place_id: &str) -> Option<VenueSnapshot> {
        let details = match self.places.place_details(place_id).await {
            Ok(Some(details)) => details,
            Ok(None) => return None,
            Err(e) => {
                warn!(error = %e, %event_id, %place_id, "place details fetch failed");
                return None;
            }
        };
        let snapshot = details.snapshot();
        if snapshot.is_empty() {
            return None;
        }
        match self.store.fill_venue(event_id, &snapshot).await {
            Ok(changed) => debug!(%event_id, changed, "venue snapshot written back"),
            Err(e) => warn!(error = %e, %event_id, "venue write-back failed"),
        }
        Some(snapshot)
    }
}
