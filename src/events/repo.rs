use anyhow::Context;
use async_trait::async_trait;
use sqlx::{PgPool, Postgres, QueryBuilder};
use time::OffsetDateTime;
use uuid::Uuid;

use super::{
    filters::CandidateQuery,
    repo_types::{EventListing, Visibility},
    store::EventStore,
};
use crate::venues::VenueSnapshot;

const LISTING_COLUMNS: &str = "e.event_id, e.host_id, e.title, e.description, e.fsq_place_id, \
     e.venue_name, e.venue_address, e.venue_lat, e.venue_lon, e.venue_category, \
     e.event_category, e.visibility, e.date_time, e.capacity, e.invite_code";

/// `SELECT ... FROM events e` with the enrollment annotations for `viewer`.
fn select_listing(viewer: Option<Uuid>) -> QueryBuilder<'static, Postgres> {
    let mut qb = QueryBuilder::new("SELECT ");
    qb.push(LISTING_COLUMNS).push(
        ", (SELECT COUNT(*) FROM event_enrollments ee WHERE ee.event_id = e.event_id) AS enrollment_count, ",
    );
    match viewer {
        Some(user_id) => {
            qb.push(
                "EXISTS (SELECT 1 FROM event_enrollments ee2 \
                 WHERE ee2.event_id = e.event_id AND ee2.user_id = ",
            )
            .push_bind(user_id)
            .push(") AS is_enrolled");
        }
        None => {
            qb.push("FALSE AS is_enrolled");
        }
    }
    qb.push(" FROM events e WHERE ");
    qb
}

pub(crate) fn candidates_sql(query: &CandidateQuery) -> QueryBuilder<'static, Postgres> {
    let mut qb = select_listing(query.scope.actor.user_id());
    query.push_where(&mut qb);
    qb.push(" ORDER BY e.date_time DESC");
    qb
}

/// Postgres-backed [`EventStore`].
#[derive(Clone)]
pub struct PgEventStore {
    db: PgPool,
}

impl PgEventStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl EventStore for PgEventStore {
    async fn candidates(&self, query: &CandidateQuery) -> anyhow::Result<Vec<EventListing>> {
        let rows = candidates_sql(query)
            .build_query_as::<EventListing>()
            .fetch_all(&self.db)
            .await
            .context("fetch event candidates")?;
        Ok(rows)
    }

    async fn hosted_by(
        &self,
        host_id: Uuid,
        now: OffsetDateTime,
    ) -> anyhow::Result<Vec<EventListing>> {
        let mut qb = select_listing(Some(host_id));
        qb.push("e.host_id = ")
            .push_bind(host_id)
            .push(" AND e.date_time > ")
            .push_bind(now)
            .push(" ORDER BY e.date_time DESC");
        let rows = qb
            .build_query_as::<EventListing>()
            .fetch_all(&self.db)
            .await
            .context("fetch hosted events")?;
        Ok(rows)
    }

    async fn find_active(
        &self,
        event_id: Uuid,
        viewer: Option<Uuid>,
        now: OffsetDateTime,
    ) -> anyhow::Result<Option<EventListing>> {
        let mut qb = select_listing(viewer);
        qb.push("e.event_id = ")
            .push_bind(event_id)
            .push(" AND e.date_time > ")
            .push_bind(now);
        let row = qb
            .build_query_as::<EventListing>()
            .fetch_optional(&self.db)
            .await
            .context("fetch event")?;
        Ok(row)
    }

    async fn fill_venue(&self, event_id: Uuid, snapshot: &VenueSnapshot) -> anyhow::Result<bool> {
        let res = sqlx::query(
            r#"
            UPDATE events
               SET venue_name     = COALESCE(venue_name, $2),
                   venue_address  = COALESCE(venue_address, $3),
                   venue_lat      = COALESCE(venue_lat, $4),
                   venue_lon      = COALESCE(venue_lon, $5),
                   venue_category = COALESCE(venue_category, $6)
             WHERE event_id = $1
               AND ((venue_name IS NULL AND $2::text IS NOT NULL)
                 OR (venue_address IS NULL AND $3::text IS NOT NULL)
                 OR (venue_lat IS NULL AND $4::float8 IS NOT NULL)
                 OR (venue_lon IS NULL AND $5::float8 IS NOT NULL)
                 OR (venue_category IS NULL AND $6::text IS NOT NULL))
            "#,
        )
        .bind(event_id)
        .bind(&snapshot.name)
        .bind(&snapshot.address)
        .bind(snapshot.lat)
        .bind(snapshot.lon)
        .bind(&snapshot.category)
        .execute(&self.db)
        .await
        .context("write venue snapshot")?;
        Ok(res.rows_affected() > 0)
    }
}

/// A validated event ready to insert. The venue snapshot starts empty.
#[derive(Debug, Clone)]
pub struct NewEvent {
    pub host_id: Uuid,
    pub title: String,
    pub description: String,
    pub fsq_place_id: String,
    pub event_category: Option<String>,
    pub visibility: Visibility,
    pub date_time: OffsetDateTime,
    pub capacity: Option<i32>,
    pub invite_code: Option<String>,
}

pub async fn insert_event(db: &PgPool, event: &NewEvent) -> anyhow::Result<Uuid> {
    let event_id = Uuid::new_v4();
    sqlx::query(
        r#"
        INSERT INTO events (event_id, host_id, title, description, fsq_place_id,
                            event_category, visibility, date_time, capacity, invite_code)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
        "#,
    )
    .bind(event_id)
    .bind(event.host_id)
    .bind(&event.title)
    .bind(&event.description)
    .bind(&event.fsq_place_id)
    .bind(&event.event_category)
    .bind(event.visibility.as_str())
    .bind(event.date_time)
    .bind(event.capacity)
    .bind(&event.invite_code)
    .execute(db)
    .await
    .context("insert event")?;
    Ok(event_id)
}

/// Validated partial update. `Some(None)` clears a nullable column.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EventChanges {
    pub title: Option<String>,
    pub description: Option<String>,
    pub date_time: Option<OffsetDateTime>,
    pub visibility: Option<Visibility>,
    pub fsq_place_id: Option<Option<String>>,
    pub capacity: Option<Option<i32>>,
    pub invite_code: Option<Option<String>>,
    pub event_category: Option<Option<String>>,
    pub venue_name: Option<Option<String>>,
    pub venue_address: Option<Option<String>>,
    pub venue_lat: Option<Option<f64>>,
    pub venue_lon: Option<Option<f64>>,
    pub venue_category: Option<Option<String>>,
}

impl EventChanges {
    pub fn is_empty(&self) -> bool {
        *self == EventChanges::default()
    }
}

pub(crate) fn update_sql(
    event_id: Uuid,
    host_id: Uuid,
    changes: &EventChanges,
) -> QueryBuilder<'static, Postgres> {
    let mut qb = QueryBuilder::new("UPDATE events SET ");
    let mut set = qb.separated(", ");
    if let Some(v) = &changes.title {
        set.push("title = ").push_bind_unseparated(v.clone());
    }
    if let Some(v) = &changes.description {
        set.push("description = ").push_bind_unseparated(v.clone());
    }
    if let Some(v) = changes.date_time {
        set.push("date_time = ").push_bind_unseparated(v);
    }
    if let Some(v) = changes.visibility {
        set.push("visibility = ").push_bind_unseparated(v.as_str());
    }
    if let Some(v) = &changes.fsq_place_id {
        set.push("fsq_place_id = ").push_bind_unseparated(v.clone());
    }
    if let Some(v) = changes.capacity {
        set.push("capacity = ").push_bind_unseparated(v);
    }
    if let Some(v) = &changes.invite_code {
        set.push("invite_code = ").push_bind_unseparated(v.clone());
    }
    if let Some(v) = &changes.event_category {
        set.push("event_category = ").push_bind_unseparated(v.clone());
    }
    if let Some(v) = &changes.venue_name {
        set.push("venue_name = ").push_bind_unseparated(v.clone());
    }
    if let Some(v) = &changes.venue_address {
        set.push("venue_address = ").push_bind_unseparated(v.clone());
    }
    if let Some(v) = changes.venue_lat {
        set.push("venue_lat = ").push_bind_unseparated(v);
    }
    if let Some(v) = changes.venue_lon {
        set.push("venue_lon = ").push_bind_unseparated(v);
    }
    if let Some(v) = &changes.venue_category {
        set.push("venue_category = ").push_bind_unseparated(v.clone());
    }
    qb.push(" WHERE event_id = ")
        .push_bind(event_id)
        .push(" AND host_id = ")
        .push_bind(host_id);
    qb
}

/// Applies `changes` if `host_id` owns the event. Returns rows affected.
pub async fn update_event(
    db: &PgPool,
    event_id: Uuid,
    host_id: Uuid,
    changes: &EventChanges,
) -> anyhow::Result<u64> {
    anyhow::ensure!(!changes.is_empty(), "no changes to apply");
    let res = update_sql(event_id, host_id, changes)
        .build()
        .execute(db)
        .await
        .context("update event")?;
    Ok(res.rows_affected())
}

pub async fn delete_event(db: &PgPool, event_id: Uuid, host_id: Uuid) -> anyhow::Result<u64> {
    let res = sqlx::query("DELETE FROM events WHERE event_id = $1 AND host_id = $2")
        .bind(event_id)
        .bind(host_id)
        .execute(db)
        .await
        .context("delete event")?;
    Ok(res.rows_affected())
}

/// Removes events whose time has passed together with their enrollments.
/// Returns `(events, enrollments)` deleted.
pub async fn delete_expired(db: &PgPool, now: OffsetDateTime) -> anyhow::Result<(u64, u64)> {
    let mut tx = db.begin().await.context("begin tx")?;
    let enrollments = sqlx::query(
        r#"
        DELETE FROM event_enrollments
         WHERE event_id IN (SELECT event_id FROM events WHERE date_time <= $1)
        "#,
    )
    .bind(now)
    .execute(&mut *tx)
    .await
    .context("delete expired enrollments")?
    .rows_affected();
    let events = sqlx::query("DELETE FROM events WHERE date_time <= $1")
        .bind(now)
        .execute(&mut *tx)
        .await
        .context("delete expired events")?
        .rows_affected();
    tx.commit().await.context("commit tx")?;
    Ok((events, enrollments))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::filters::{Actor, EventFilter, VisibilityScope};
    use time::macros::datetime;

    #[test]
    fn anonymous_candidates_do_not_bind_a_viewer() {
        let query = CandidateQuery {
            scope: VisibilityScope::new(Actor::Anonymous, None),
            filter: EventFilter::default(),
            now: datetime!(2030-01-01 00:00 UTC),
        };
        let qb = candidates_sql(&query);
        let sql = qb.sql();
        assert!(sql.contains("FALSE AS is_enrolled"));
        assert!(sql.contains("e.date_time > $1 AND (e.visibility = 'public')"));
        assert!(sql.ends_with("ORDER BY e.date_time DESC"));
        assert!(!sql.contains("LIMIT"));
    }

    #[test]
    fn authenticated_candidates_bind_viewer_before_filters() {
        let query = CandidateQuery {
            scope: VisibilityScope::new(Actor::User(Uuid::new_v4()), None),
            filter: EventFilter {
                venue_category: Some("Bar".into()),
                ..Default::default()
            },
            now: datetime!(2030-01-01 00:00 UTC),
        };
        let qb = candidates_sql(&query);
        let sql = qb.sql();
        assert!(sql.contains("ee2.user_id = $1) AS is_enrolled"));
        assert!(sql.contains("e.date_time > $2"));
        assert!(sql.contains("e.host_id = $3"));
        assert!(sql.contains("strpos(e.venue_category, $4) > 0"));
    }

    #[test]
    fn update_sets_only_sent_fields() {
        let changes = EventChanges {
            title: Some("New title".into()),
            capacity: Some(None),
            ..Default::default()
        };
        let qb = update_sql(Uuid::new_v4(), Uuid::new_v4(), &changes);
        assert_eq!(
            qb.sql(),
            "UPDATE events SET title = $1, capacity = $2 WHERE event_id = $3 AND host_id = $4"
        );
        assert!(!changes.is_empty());
        assert!(EventChanges::default().is_empty());
    }
}
