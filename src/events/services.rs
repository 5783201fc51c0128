use std::time::Duration;

use rand::{distributions::Alphanumeric, Rng};
use sqlx::PgPool;
use time::{format_description::well_known::Rfc3339, OffsetDateTime};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::{
    categories::{normalize_category, ALL_CATEGORIES},
    dto::{CreateEventRequest, FilterRequest, ListParams, UpdateEventRequest},
    filters::{Actor, CandidateQuery, EventFilter, VisibilityScope},
    lenient,
    ranking::{rank, Ranking},
    repo::{self, EventChanges, NewEvent},
    repo_types::{EventListing, Visibility},
};
use crate::{
    error::{AppError, AppResult},
    geo::Coordinates,
    state::AppState,
};

pub const DEFAULT_FILTER_RADIUS_M: f64 = 5000.0;
pub const DEFAULT_FILTER_LIMIT: usize = 50;
const INVITE_CODE_LEN: usize = 8;

/// Candidate fetch, distance ranking and invite-code redaction. Listings
/// that still miss venue data get a background enrichment task.
async fn discover(
    state: &AppState,
    query: CandidateQuery,
    ranking: Ranking,
) -> AppResult<Vec<EventListing>> {
    let viewer = query.scope.actor.user_id();
    let candidates = state.events.candidates(&query).await?;
    let fetched = candidates.len();

    let ranked = rank(candidates, &ranking);
    let spawned = state.enricher.spawn_all(&ranked);
    debug!(fetched, returned = ranked.len(), spawned, "discovery ranked");

    Ok(ranked.into_iter().map(|e| e.redact_for(viewer)).collect())
}

/// Public listing, optionally ranked around `ll`. Malformed numbers are ignored.
pub async fn list_events(
    state: &AppState,
    viewer: Option<Uuid>,
    params: ListParams,
) -> AppResult<Vec<EventListing>> {
    let origin = params.ll.as_deref().and_then(Coordinates::parse_ll);
    let ranking = Ranking {
        origin,
        radius: lenient::parse_number(params.radius.as_deref()),
        limit: lenient::positive_count(lenient::parse_number(params.limit.as_deref())),
    };
    let category = params
        .event_category
        .as_deref()
        .and_then(normalize_category)
        .map(str::to_string);

    let query = CandidateQuery {
        scope: VisibilityScope::new(Actor::from(viewer), lenient::non_empty(params.invite_code)),
        filter: EventFilter {
            text: lenient::non_empty(params.q),
            category,
            ..Default::default()
        },
        now: OffsetDateTime::now_utc(),
    };
    discover(state, query, ranking).await
}

/// Location-bound search. An absent radius or limit falls back to its
/// default; an explicit `null` radius disables the radius cut.
pub async fn filter_events(
    state: &AppState,
    viewer: Option<Uuid>,
    req: FilterRequest,
) -> AppResult<Vec<EventListing>> {
    let Some(origin) = Coordinates::from_parts(req.latitude, req.longitude) else {
        warn!("filter request without a usable location");
        return Err(AppError::validation("Location is required"));
    };
    let ranking = Ranking {
        origin: Some(origin),
        radius: req.radius.unwrap_or(Some(DEFAULT_FILTER_RADIUS_M)),
        limit: Some(lenient::positive_count(req.limit).unwrap_or(DEFAULT_FILTER_LIMIT)),
    };

    let query = CandidateQuery {
        scope: VisibilityScope::new(Actor::from(viewer), None),
        filter: EventFilter {
            text: req.search_query,
            category: req.category,
            venue_category: req.venue_category,
            starts_at_or_after: req.date_from.as_deref().and_then(lenient::day_start),
            starts_at_or_before: req.date_to.as_deref().and_then(lenient::day_end),
            capacity_min: req.capacity_min,
            capacity_max: req.capacity_max,
        },
        now: OffsetDateTime::now_utc(),
    };
    discover(state, query, ranking).await
}

pub async fn my_events(state: &AppState, host_id: Uuid) -> AppResult<Vec<EventListing>> {
    let events = state
        .events
        .hosted_by(host_id, OffsetDateTime::now_utc())
        .await?;
    state.enricher.spawn_all(&events);
    Ok(events)
}

/// Single event. Private events need the host or the matching invite code.
pub async fn event_detail(
    state: &AppState,
    viewer: Option<Uuid>,
    event_id: Uuid,
    invite_code: Option<String>,
) -> AppResult<EventListing> {
    let now = OffsetDateTime::now_utc();
    let Some(mut event) = state.events.find_active(event_id, viewer, now).await? else {
        return Err(AppError::NotFound("Event not found or has expired".into()));
    };
    let scope = VisibilityScope::new(Actor::from(viewer), lenient::non_empty(invite_code));
    if !scope.admits(&event, now) {
        warn!(%event_id, "private event requested without access");
        return Err(AppError::Forbidden("Invite code required".into()));
    }

    state
        .enricher
        .enrich_within(&mut event, state.config.enrich_wait)
        .await;
    Ok(event.redact_for(viewer))
}

fn generate_invite_code() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(INVITE_CODE_LEN)
        .map(char::from)
        .collect()
}

fn required(value: Option<String>, field: &str) -> AppResult<String> {
    lenient::non_empty(value).ok_or_else(|| AppError::validation(format!("{field} is required")))
}

fn parse_future(raw: &str, now: OffsetDateTime) -> AppResult<OffsetDateTime> {
    let at = OffsetDateTime::parse(raw.trim(), &Rfc3339)
        .map_err(|_| AppError::validation("date_time must be an RFC 3339 timestamp"))?;
    if at <= now {
        return Err(AppError::validation("date_time must be in the future"));
    }
    Ok(at)
}

fn parse_visibility(raw: &str) -> AppResult<Visibility> {
    raw.trim()
        .parse()
        .map_err(|_| AppError::validation("type must be public or private"))
}

fn parse_capacity(raw: i64) -> AppResult<i32> {
    i32::try_from(raw)
        .ok()
        .filter(|c| *c >= 0)
        .ok_or_else(|| AppError::validation("capacity must be a non-negative integer"))
}

fn parse_category(raw: &str) -> AppResult<Option<String>> {
    let raw = raw.trim();
    if raw.is_empty() || raw.eq_ignore_ascii_case(ALL_CATEGORIES) {
        return Ok(None);
    }
    normalize_category(raw)
        .map(|c| Some(c.to_string()))
        .ok_or_else(|| AppError::validation("Invalid event_category"))
}

pub fn validate_create(
    host_id: Uuid,
    req: CreateEventRequest,
    now: OffsetDateTime,
) -> AppResult<NewEvent> {
    let title = required(req.title, "title")?;
    let date_time = parse_future(&required(req.date_time, "date_time")?, now)?;
    let visibility = parse_visibility(&required(req.visibility, "type")?)?;
    let fsq_place_id = required(req.fsq_place_id, "fsq_place_id")?;
    let capacity = req.capacity.map(parse_capacity).transpose()?;
    let event_category = match req.event_category.as_deref() {
        Some(raw) => parse_category(raw)?,
        None => None,
    };

    let invite_code = match (visibility, lenient::non_empty(req.invite_code)) {
        (_, Some(code)) => Some(code),
        (Visibility::Private, None) => Some(generate_invite_code()),
        (Visibility::Public, None) => None,
    };

    Ok(NewEvent {
        host_id,
        title,
        description: req.description.unwrap_or_default(),
        fsq_place_id,
        event_category,
        visibility,
        date_time,
        capacity,
        invite_code,
    })
}

pub async fn create_event(
    state: &AppState,
    host_id: Uuid,
    req: CreateEventRequest,
) -> AppResult<(Uuid, Option<String>)> {
    let now = OffsetDateTime::now_utc();
    let new_event = validate_create(host_id, req, now)?;
    let event_id = repo::insert_event(&state.db, &new_event).await?;
    info!(%event_id, %host_id, visibility = %new_event.visibility, "event created");

    if let Some(event) = state.events.find_active(event_id, Some(host_id), now).await? {
        state.enricher.spawn(&event);
    }
    let invite_code = match new_event.visibility {
        Visibility::Private => new_event.invite_code,
        Visibility::Public => None,
    };
    Ok((event_id, invite_code))
}

/// Turns an update request into typed changes. Moving the event to another
/// place clears every venue field the request does not set itself, so the
/// next enrichment refills them from the new place.
pub fn validate_update(req: UpdateEventRequest, now: OffsetDateTime) -> AppResult<EventChanges> {
    let title = match req.title {
        Some(t) => Some(required(Some(t), "title")?),
        None => None,
    };
    let date_time = req
        .date_time
        .as_deref()
        .map(|raw| parse_future(raw, now))
        .transpose()?;
    let visibility = req.visibility.as_deref().map(parse_visibility).transpose()?;
    let capacity = req
        .capacity
        .map(|c| c.map(parse_capacity).transpose())
        .transpose()?;
    let event_category = match req.event_category {
        Some(Some(raw)) => Some(parse_category(&raw)?),
        Some(None) => Some(None),
        None => None,
    };
    let fsq_place_id = req.fsq_place_id.map(lenient::non_empty);

    let mut changes = EventChanges {
        title,
        description: req.description,
        date_time,
        visibility,
        fsq_place_id,
        capacity,
        invite_code: req.invite_code.map(lenient::non_empty),
        event_category,
        venue_name: req.venue_name,
        venue_address: req.venue_address,
        venue_lat: req.venue_lat,
        venue_lon: req.venue_lon,
        venue_category: req.venue_category,
    };
    if changes.fsq_place_id.is_some() {
        changes.venue_name.get_or_insert(None);
        changes.venue_address.get_or_insert(None);
        changes.venue_lat.get_or_insert(None);
        changes.venue_lon.get_or_insert(None);
        changes.venue_category.get_or_insert(None);
    }

    if changes.is_empty() {
        return Err(AppError::validation("No updateable fields provided"));
    }
    Ok(changes)
}

pub async fn update_event(
    state: &AppState,
    host_id: Uuid,
    event_id: Uuid,
    req: UpdateEventRequest,
) -> AppResult<()> {
    let now = OffsetDateTime::now_utc();
    let changes = validate_update(req, now)?;
    let updated = repo::update_event(&state.db, event_id, host_id, &changes).await?;
    if updated == 0 {
        return Err(AppError::Forbidden("Not found or not authorized".into()));
    }
    info!(%event_id, %host_id, "event updated");

    if changes.fsq_place_id.is_some() {
        if let Some(event) = state.events.find_active(event_id, Some(host_id), now).await? {
            state.enricher.spawn(&event);
        }
    }
    Ok(())
}

pub async fn delete_event(state: &AppState, host_id: Uuid, event_id: Uuid) -> AppResult<()> {
    let deleted = repo::delete_event(&state.db, event_id, host_id).await?;
    if deleted == 0 {
        return Err(AppError::Forbidden("Not found or not authorized".into()));
    }
    info!(%event_id, %host_id, "event deleted");
    Ok(())
}

/// Deletes expired events and their enrollments.
pub async fn sweep_expired(db: &PgPool) -> anyhow::Result<(u64, u64)> {
    let (events, enrollments) = repo::delete_expired(db, OffsetDateTime::now_utc()).await?;
    if events > 0 || enrollments > 0 {
        info!(events, enrollments, "expired events swept");
    }
    Ok((events, enrollments))
}

/// Runs [`sweep_expired`] every `period` for the life of the process.
pub fn spawn_cleanup(db: PgPool, period: Duration) -> Option<tokio::task::JoinHandle<()>> {
    if period.is_zero() {
        info!("periodic cleanup disabled");
        return None;
    }
    Some(tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            if let Err(e) = sweep_expired(&db).await {
                warn!(error = %e, "periodic cleanup failed");
            }
        }
    }))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::events::store::memory::MemoryEventStore;
    use time::macros::datetime;

    const NOW: OffsetDateTime = datetime!(2030-01-01 00:00 UTC);

    fn listing(title: &str, at: Option<(f64, f64)>) -> EventListing {
        EventListing {
            event_id: Uuid::new_v4(),
            host_id: Uuid::new_v4(),
            title: title.into(),
            description: String::new(),
            fsq_place_id: None,
            venue_name: Some(format!("{title} venue")),
            venue_address: Some("somewhere".into()),
            venue_lat: at.map(|c| c.0),
            venue_lon: at.map(|c| c.1),
            venue_category: Some("Music Venue".into()),
            event_category: None,
            visibility: Visibility::Public,
            date_time: datetime!(2099-06-01 20:00 UTC),
            capacity: None,
            invite_code: None,
            enrollment_count: 0,
            is_enrolled: false,
            distance: None,
        }
    }

    fn state_with(events: Vec<EventListing>) -> (AppState, Arc<MemoryEventStore>) {
        let store = Arc::new(MemoryEventStore::with_events(events));
        (AppState::fake_with_store(store.clone()), store)
    }

    fn filter_at_origin() -> FilterRequest {
        FilterRequest {
            latitude: Some(0.0),
            longitude: Some(0.0),
            radius: Some(Some(1_000_000.0)),
            ..Default::default()
        }
    }

    fn titles(events: &[EventListing]) -> Vec<&str> {
        events.iter().map(|e| e.title.as_str()).collect()
    }

    #[tokio::test]
    async fn filter_keeps_only_the_requested_category() {
        let mut concert = listing("Concert", Some((0.5, 0.5)));
        concert.event_category = Some("Concerts".into());
        let mut workshop = listing("Workshop", Some((0.0, 0.0)));
        workshop.event_category = Some("Workshops".into());
        let (state, _) = state_with(vec![concert, workshop]);

        let req = FilterRequest {
            category: Some("Concerts".into()),
            ..filter_at_origin()
        };
        let events = filter_events(&state, None, req).await.unwrap();
        assert_eq!(titles(&events), ["Concert"]);
    }

    #[tokio::test]
    async fn filter_applies_capacity_range() {
        let mut events = Vec::new();
        for (title, capacity) in [("small", 5), ("medium", 30), ("large", 100)] {
            let mut e = listing(title, Some((0.0, 0.0)));
            e.capacity = Some(capacity);
            events.push(e);
        }
        events.push(listing("unlimited", Some((0.0, 0.0))));
        let (state, _) = state_with(events);

        let req = FilterRequest {
            capacity_min: Some(10.0),
            capacity_max: Some(50.0),
            ..filter_at_origin()
        };
        let events = filter_events(&state, None, req).await.unwrap();
        assert_eq!(titles(&events), ["medium"]);
    }

    #[tokio::test]
    async fn filter_radius_excludes_far_and_unlocated_events() {
        let (state, _) = state_with(vec![
            listing("here", Some((0.0, 0.0))),
            listing("one degree east", Some((0.0, 1.0))),
            listing("unknown", None),
        ]);
        let req = FilterRequest {
            radius: Some(Some(100_000.0)),
            ..filter_at_origin()
        };
        let events = filter_events(&state, None, req).await.unwrap();
        assert_eq!(titles(&events), ["here"]);
        assert_eq!(events[0].distance, Some(0.0));
    }

    #[tokio::test]
    async fn filter_radius_zero_and_null_are_taken_literally() {
        let (state, _) = state_with(vec![
            listing("here", Some((0.0, 0.0))),
            listing("far away", Some((0.0, 10.0))),
            listing("unknown", None),
        ]);
        let zero = FilterRequest {
            radius: Some(Some(0.0)),
            ..filter_at_origin()
        };
        let events = filter_events(&state, None, zero).await.unwrap();
        assert_eq!(titles(&events), ["here"]);

        let unbounded = FilterRequest {
            radius: Some(None),
            ..filter_at_origin()
        };
        let events = filter_events(&state, None, unbounded).await.unwrap();
        assert_eq!(titles(&events), ["here", "far away", "unknown"]);

        let defaulted = FilterRequest {
            radius: None,
            ..filter_at_origin()
        };
        let events = filter_events(&state, None, defaulted).await.unwrap();
        assert_eq!(titles(&events), ["here"]);
    }

    #[tokio::test]
    async fn filter_requires_a_location() {
        let (state, _) = state_with(vec![listing("here", Some((0.0, 0.0)))]);
        let req = FilterRequest {
            latitude: Some(1.0),
            ..Default::default()
        };
        let err = filter_events(&state, None, req).await.unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[tokio::test]
    async fn filter_date_range_covers_whole_days() {
        let mut evening = listing("evening", Some((0.0, 0.0)));
        evening.date_time = datetime!(2099-06-01 22:30 UTC);
        let mut next_day = listing("next day", Some((0.0, 0.0)));
        next_day.date_time = datetime!(2099-06-02 09:00 UTC);
        let (state, _) = state_with(vec![evening, next_day]);

        let req = FilterRequest {
            date_from: Some("2099-06-01".into()),
            date_to: Some("2099-06-01".into()),
            ..filter_at_origin()
        };
        let events = filter_events(&state, None, req).await.unwrap();
        assert_eq!(titles(&events), ["evening"]);
    }

    #[tokio::test]
    async fn private_events_need_the_exact_invite_code() {
        let host = Uuid::new_v4();
        let mut private = listing("secret", Some((0.0, 0.0)));
        private.visibility = Visibility::Private;
        private.host_id = host;
        private.invite_code = Some("letmein".into());
        let (state, _) = state_with(vec![private, listing("open", Some((0.0, 0.0)))]);

        let anon = list_events(&state, None, ListParams::default()).await.unwrap();
        assert_eq!(titles(&anon), ["open"]);

        let stranger = Some(Uuid::new_v4());
        let wrong = ListParams {
            invite_code: Some("LETMEIN".into()),
            ..Default::default()
        };
        let events = list_events(&state, stranger, wrong).await.unwrap();
        assert_eq!(titles(&events), ["open"]);

        let right = ListParams {
            invite_code: Some("letmein".into()),
            ..Default::default()
        };
        let events = list_events(&state, stranger, right).await.unwrap();
        assert_eq!(events.len(), 2);
        assert!(events.iter().all(|e| e.invite_code.is_none()));

        let own = list_events(&state, Some(host), ListParams::default()).await.unwrap();
        let secret = own.iter().find(|e| e.title == "secret").unwrap();
        assert_eq!(secret.invite_code.as_deref(), Some("letmein"));
    }

    #[tokio::test]
    async fn list_ranks_by_distance_and_ignores_garbage_numbers() {
        let (state, _) = state_with(vec![
            listing("far", Some((0.0, 2.0))),
            listing("unknown", None),
            listing("near", Some((0.0, 0.1))),
        ]);
        let params = ListParams {
            ll: Some("0,0".into()),
            radius: Some("not a number".into()),
            limit: Some("-3".into()),
            ..Default::default()
        };
        let events = list_events(&state, None, params).await.unwrap();
        assert_eq!(titles(&events), ["near", "far", "unknown"]);
    }

    #[tokio::test]
    async fn list_is_repeatable() {
        let (state, _) = state_with(vec![
            listing("a", Some((0.0, 0.3))),
            listing("b", None),
            listing("c", Some((0.0, 0.1))),
            listing("d", None),
        ]);
        let params = || ListParams {
            ll: Some("0,0".into()),
            limit: Some("3".into()),
            ..Default::default()
        };
        let first = list_events(&state, None, params()).await.unwrap();
        let second = list_events(&state, None, params()).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(first.len(), 3);
    }

    #[tokio::test]
    async fn listings_report_enrollment_for_the_viewer() {
        let event = listing("gig", None);
        let (state, store) = state_with(vec![event.clone()]);
        let user = Uuid::new_v4();
        store.enroll(event.event_id, user);
        store.enroll(event.event_id, Uuid::new_v4());

        let mine = list_events(&state, Some(user), ListParams::default()).await.unwrap();
        assert_eq!((mine[0].enrollment_count, mine[0].is_enrolled), (2, true));

        let anon = list_events(&state, None, ListParams::default()).await.unwrap();
        assert_eq!((anon[0].enrollment_count, anon[0].is_enrolled), (2, false));
    }

    #[tokio::test]
    async fn detail_gates_private_events() {
        let host = Uuid::new_v4();
        let mut private = listing("secret", None);
        private.visibility = Visibility::Private;
        private.host_id = host;
        private.invite_code = Some("abc123".into());
        let id = private.event_id;
        let (state, _) = state_with(vec![private]);

        let err = event_detail(&state, None, id, None).await.unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));

        let ok = event_detail(&state, None, id, Some("abc123".into())).await.unwrap();
        assert!(ok.invite_code.is_none());

        let own = event_detail(&state, Some(host), id, None).await.unwrap();
        assert_eq!(own.invite_code.as_deref(), Some("abc123"));

        let missing = event_detail(&state, None, Uuid::new_v4(), None).await.unwrap_err();
        assert!(matches!(missing, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn my_events_lists_only_the_hosts_events() {
        let host = Uuid::new_v4();
        let mut mine = listing("mine", None);
        mine.host_id = host;
        let (state, _) = state_with(vec![mine, listing("theirs", None)]);

        let events = my_events(&state, host).await.unwrap();
        assert_eq!(titles(&events), ["mine"]);
    }

    fn create_request() -> CreateEventRequest {
        CreateEventRequest {
            title: Some("Jazz night".into()),
            description: None,
            date_time: Some("2030-03-01T20:00:00Z".into()),
            visibility: Some("private".into()),
            fsq_place_id: Some("fsq-1".into()),
            capacity: Some(40),
            invite_code: None,
            event_category: Some("concerts".into()),
        }
    }

    #[test]
    fn create_normalises_and_generates_invite_code() {
        let event = validate_create(Uuid::new_v4(), create_request(), NOW).unwrap();
        assert_eq!(event.visibility, Visibility::Private);
        assert_eq!(event.event_category.as_deref(), Some("Concerts"));
        assert_eq!(event.description, "");
        let code = event.invite_code.unwrap();
        assert_eq!(code.len(), INVITE_CODE_LEN);
        assert!(code.chars().all(|c| c.is_ascii_alphanumeric()));
    }

    #[test]
    fn create_rejects_bad_input() {
        let cases = [
            CreateEventRequest { title: Some("  ".into()), ..create_request() },
            CreateEventRequest { date_time: Some("2029-12-31T23:00:00Z".into()), ..create_request() },
            CreateEventRequest { date_time: Some("tomorrow".into()), ..create_request() },
            CreateEventRequest { visibility: Some("secret".into()), ..create_request() },
            CreateEventRequest { fsq_place_id: None, ..create_request() },
            CreateEventRequest { capacity: Some(-1), ..create_request() },
            CreateEventRequest { event_category: Some("Knitting".into()), ..create_request() },
        ];
        for req in cases {
            let err = validate_create(Uuid::new_v4(), req, NOW).unwrap_err();
            assert!(matches!(err, AppError::Validation(_)), "{err:?}");
        }
    }

    #[test]
    fn public_events_keep_no_generated_code() {
        let req = CreateEventRequest {
            visibility: Some("public".into()),
            ..create_request()
        };
        assert!(validate_create(Uuid::new_v4(), req, NOW).unwrap().invite_code.is_none());
    }

    #[test]
    fn moving_venue_clears_unsent_snapshot_fields() {
        let req = UpdateEventRequest {
            fsq_place_id: Some(Some("fsq-2".into())),
            venue_name: Some(Some("Kept".into())),
            ..Default::default()
        };
        let changes = validate_update(req, NOW).unwrap();
        assert_eq!(changes.venue_name, Some(Some("Kept".into())));
        assert_eq!(changes.venue_address, Some(None));
        assert_eq!(changes.venue_lat, Some(None));
        assert_eq!(changes.venue_category, Some(None));
    }

    #[test]
    fn update_needs_at_least_one_field() {
        let err = validate_update(UpdateEventRequest::default(), NOW).unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));

        let changes = validate_update(
            UpdateEventRequest {
                capacity: Some(None),
                ..Default::default()
            },
            NOW,
        )
        .unwrap();
        assert_eq!(changes.capacity, Some(None));
        assert!(changes.venue_name.is_none());
    }
}
