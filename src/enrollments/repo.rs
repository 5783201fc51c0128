use anyhow::Context;
use sqlx::{PgConnection, PgPool};
use time::OffsetDateTime;
use uuid::Uuid;

use super::repo_types::{EnrollmentRecord, EventGate};

/// Loads a non-expired event and holds its row lock until the transaction ends,
/// so concurrent enrollments for one event are checked one at a time.
pub async fn lock_active_event(
    conn: &mut PgConnection,
    event_id: Uuid,
    now: OffsetDateTime,
) -> anyhow::Result<Option<EventGate>> {
    let gate = sqlx::query_as::<_, EventGate>(
        r#"
        SELECT host_id, visibility, invite_code, capacity
          FROM events
         WHERE event_id = $1 AND date_time > $2
           FOR UPDATE
        "#,
    )
    .bind(event_id)
    .bind(now)
    .fetch_optional(conn)
    .await
    .context("lock event")?;
    Ok(gate)
}

/// `(enrolled so far, whether user_id is among them)`
pub async fn enrollment_state(
    conn: &mut PgConnection,
    event_id: Uuid,
    user_id: Uuid,
) -> anyhow::Result<(i64, bool)> {
    let row: (i64, bool) = sqlx::query_as(
        r#"
        SELECT COUNT(*),
               COALESCE(bool_or(user_id = $2), FALSE)
          FROM event_enrollments
         WHERE event_id = $1
        "#,
    )
    .bind(event_id)
    .bind(user_id)
    .fetch_one(conn)
    .await
    .context("count enrollments")?;
    Ok(row)
}

pub async fn insert(
    conn: &mut PgConnection,
    event_id: Uuid,
    user_id: Uuid,
) -> Result<Uuid, sqlx::Error> {
    let enrollment_id = Uuid::new_v4();
    sqlx::query(
        "INSERT INTO event_enrollments (enrollment_id, event_id, user_id) VALUES ($1, $2, $3)",
    )
    .bind(enrollment_id)
    .bind(event_id)
    .bind(user_id)
    .execute(conn)
    .await?;
    Ok(enrollment_id)
}

pub async fn delete(db: &PgPool, event_id: Uuid, user_id: Uuid) -> anyhow::Result<u64> {
    let res = sqlx::query("DELETE FROM event_enrollments WHERE event_id = $1 AND user_id = $2")
        .bind(event_id)
        .bind(user_id)
        .execute(db)
        .await
        .context("delete enrollment")?;
    Ok(res.rows_affected())
}

pub async fn host_of(db: &PgPool, event_id: Uuid) -> anyhow::Result<Option<Uuid>> {
    let host = sqlx::query_scalar::<_, Uuid>("SELECT host_id FROM events WHERE event_id = $1")
        .bind(event_id)
        .fetch_optional(db)
        .await
        .context("fetch event host")?;
    Ok(host)
}

/// Enrollments of an event with the user's name and email, newest first.
pub async fn history(db: &PgPool, event_id: Uuid) -> anyhow::Result<Vec<EnrollmentRecord>> {
    let rows = sqlx::query_as::<_, EnrollmentRecord>(
        r#"
        SELECT ee.enrollment_id, ee.user_id, ee.enrolled_at, u.username, u.email
          FROM event_enrollments ee
          JOIN users u ON u.id = ee.user_id
         WHERE ee.event_id = $1
         ORDER BY ee.enrolled_at DESC
        "#,
    )
    .bind(event_id)
    .fetch_all(db)
    .await
    .context("fetch enrollment history")?;
    Ok(rows)
}
