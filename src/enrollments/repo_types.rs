use serde::Serialize;
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::events::repo_types::Visibility;

/// The columns enrollment rules are checked against.
#[derive(Debug, Clone, PartialEq, FromRow)]
pub struct EventGate {
    pub host_id: Uuid,
    #[sqlx(try_from = "String")]
    pub visibility: Visibility,
    pub invite_code: Option<String>,
    pub capacity: Option<i32>,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct EnrollmentRecord {
    pub enrollment_id: Uuid,
    pub user_id: Uuid,
    #[serde(with = "time::serde::rfc3339")]
    pub enrolled_at: OffsetDateTime,
    #[serde(rename = "user_name")]
    pub username: String,
    pub email: String,
}
