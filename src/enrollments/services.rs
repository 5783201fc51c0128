use time::OffsetDateTime;
use tracing::{info, warn};
use uuid::Uuid;

use super::{
    repo,
    repo_types::{EnrollmentRecord, EventGate},
};
use crate::{
    error::{is_unique_violation, AppError, AppResult},
    events::repo_types::Visibility,
    state::AppState,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ineligible {
    Host,
    InviteCode,
    AlreadyEnrolled,
    Full,
}

impl From<Ineligible> for AppError {
    fn from(reason: Ineligible) -> Self {
        match reason {
            Ineligible::Host => AppError::validation("Host cannot enroll in own event"),
            Ineligible::InviteCode => AppError::Forbidden("Invalid or missing invite code".into()),
            Ineligible::AlreadyEnrolled => AppError::Conflict("Already enrolled".into()),
            Ineligible::Full => AppError::Conflict("Event is full".into()),
        }
    }
}

/// Enrollment rules, checked in this order against a locked event row.
pub fn check_eligibility(
    gate: &EventGate,
    user_id: Uuid,
    invite_code: Option<&str>,
    enrolled: i64,
    already_enrolled: bool,
) -> Result<(), Ineligible> {
    if gate.host_id == user_id {
        return Err(Ineligible::Host);
    }
    if gate.visibility == Visibility::Private {
        let matches = matches!(
            (invite_code, gate.invite_code.as_deref()),
            (Some(given), Some(stored)) if !given.is_empty() && given == stored
        );
        if !matches {
            return Err(Ineligible::InviteCode);
        }
    }
    if already_enrolled {
        return Err(Ineligible::AlreadyEnrolled);
    }
    if gate.capacity.is_some_and(|cap| enrolled >= i64::from(cap)) {
        return Err(Ineligible::Full);
    }
    Ok(())
}

pub async fn enroll(
    state: &AppState,
    user_id: Uuid,
    event_id: Uuid,
    invite_code: Option<String>,
) -> AppResult<Uuid> {
    let mut tx = state.db.begin().await?;

    let now = OffsetDateTime::now_utc();
    let Some(gate) = repo::lock_active_event(&mut tx, event_id, now).await? else {
        return Err(AppError::NotFound("Event not found or has expired".into()));
    };
    let (enrolled, already) = repo::enrollment_state(&mut tx, event_id, user_id).await?;
    if let Err(reason) =
        check_eligibility(&gate, user_id, invite_code.as_deref(), enrolled, already)
    {
        warn!(%event_id, %user_id, ?reason, "enrollment refused");
        return Err(reason.into());
    }

    let enrollment_id = match repo::insert(&mut tx, event_id, user_id).await {
        Ok(id) => id,
        Err(e) if is_unique_violation(&e) => return Err(Ineligible::AlreadyEnrolled.into()),
        Err(e) => return Err(e.into()),
    };
    tx.commit().await?;

    info!(%event_id, %user_id, %enrollment_id, "user enrolled");
    Ok(enrollment_id)
}

pub async fn unenroll(state: &AppState, user_id: Uuid, event_id: Uuid) -> AppResult<()> {
    if repo::delete(&state.db, event_id, user_id).await? == 0 {
        return Err(AppError::NotFound("Not enrolled".into()));
    }
    info!(%event_id, %user_id, "user unenrolled");
    Ok(())
}

/// Host-only view of who enrolled.
pub async fn history(
    state: &AppState,
    user_id: Uuid,
    event_id: Uuid,
) -> AppResult<Vec<EnrollmentRecord>> {
    match repo::host_of(&state.db, event_id).await? {
        Some(host) if host == user_id => Ok(repo::history(&state.db, event_id).await?),
        _ => Err(AppError::Forbidden("Access denied".into())),
    }
}
