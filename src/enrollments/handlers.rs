use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use tracing::instrument;
use uuid::Uuid;

use super::{
    dto::{EnrollRequest, EnrolledResponse, HistoryResponse, UnenrollRequest},
    services,
};
use crate::{
    auth::extractors::AuthUser,
    error::{AppError, AppResult},
    events::{dto::SuccessResponse, lenient},
    extract::{AppJson, AppPath},
    state::AppState,
};

pub fn enrollment_routes() -> Router<AppState> {
    Router::new()
        .route("/enrollments/enroll", post(enroll))
        .route("/enrollments/unenroll", post(unenroll))
        .route("/events/:id/enrollments/history", get(history))
}

fn require_event_id(event_id: Option<Uuid>) -> AppResult<Uuid> {
    event_id.ok_or_else(|| AppError::validation("Missing event_id"))
}

#[instrument(skip(state, req))]
pub async fn enroll(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    AppJson(req): AppJson<EnrollRequest>,
) -> AppResult<(StatusCode, Json<EnrolledResponse>)> {
    let event_id = require_event_id(req.event_id)?;
    let invite_code = lenient::non_empty(req.invite_code);
    let enrollment_id = services::enroll(&state, user_id, event_id, invite_code).await?;
    Ok((
        StatusCode::CREATED,
        Json(EnrolledResponse {
            success: true,
            enrollment_id,
        }),
    ))
}

#[instrument(skip(state))]
pub async fn unenroll(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    AppJson(req): AppJson<UnenrollRequest>,
) -> AppResult<Json<SuccessResponse>> {
    let event_id = require_event_id(req.event_id)?;
    services::unenroll(&state, user_id, event_id).await?;
    Ok(Json(SuccessResponse { success: true }))
}

#[instrument(skip(state))]
pub async fn history(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    AppPath(event_id): AppPath<Uuid>,
) -> AppResult<Json<HistoryResponse>> {
    let enrollments = services::history(&state, user_id, event_id).await?;
    Ok(Json(HistoryResponse {
        success: true,
        enrollments,
    }))
}
