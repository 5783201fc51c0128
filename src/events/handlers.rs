use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use tracing::instrument;
use uuid::Uuid;

use super::{
    dto::{
        CleanupResponse, CreateEventRequest, CreatedEventResponse, DetailParams, EventResponse,
        EventsResponse, FilterRequest, FilterResponse, ListParams, SuccessResponse,
        UpdateEventRequest,
    },
    services,
};
use crate::{
    auth::extractors::{AuthUser, MaybeAuthUser},
    error::AppResult,
    extract::{AppJson, AppPath, AppQuery},
    state::AppState,
};

// --- routers ---

pub fn discovery_routes() -> Router<AppState> {
    Router::new()
        .route("/events/list", get(list_events))
        .route("/events/filter", post(filter_events))
        .route("/events/:id", get(get_event).put(update_event).delete(delete_event))
}

pub fn host_routes() -> Router<AppState> {
    Router::new()
        .route("/events/my", get(my_events))
        .route("/events/create", post(create_event))
        .route("/events/cleanup", get(scheduled_cleanup).post(cleanup_events))
}

// --- handlers ---

#[instrument(skip(state))]
pub async fn list_events(
    State(state): State<AppState>,
    MaybeAuthUser(viewer): MaybeAuthUser,
    AppQuery(params): AppQuery<ListParams>,
) -> AppResult<Json<EventsResponse>> {
    let events = services::list_events(&state, viewer, params).await?;
    Ok(Json(EventsResponse { events }))
}

#[instrument(skip(state, req))]
pub async fn filter_events(
    State(state): State<AppState>,
    MaybeAuthUser(viewer): MaybeAuthUser,
    AppJson(req): AppJson<FilterRequest>,
) -> AppResult<Json<FilterResponse>> {
    let events = services::filter_events(&state, viewer, req).await?;
    Ok(Json(FilterResponse {
        total: events.len(),
        events,
    }))
}

#[instrument(skip(state))]
pub async fn my_events(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
) -> AppResult<Json<EventsResponse>> {
    let events = services::my_events(&state, user_id).await?;
    Ok(Json(EventsResponse { events }))
}

#[instrument(skip(state))]
pub async fn get_event(
    State(state): State<AppState>,
    MaybeAuthUser(viewer): MaybeAuthUser,
    AppPath(event_id): AppPath<Uuid>,
    AppQuery(params): AppQuery<DetailParams>,
) -> AppResult<Json<EventResponse>> {
    let event = services::event_detail(&state, viewer, event_id, params.invite_code).await?;
    Ok(Json(EventResponse { event }))
}

#[instrument(skip(state, req))]
pub async fn create_event(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    AppJson(req): AppJson<CreateEventRequest>,
) -> AppResult<(StatusCode, Json<CreatedEventResponse>)> {
    let (event_id, invite_code) = services::create_event(&state, user_id, req).await?;
    Ok((
        StatusCode::CREATED,
        Json(CreatedEventResponse {
            success: true,
            event_id,
            invite_code,
        }),
    ))
}

#[instrument(skip(state, req))]
pub async fn update_event(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    AppPath(event_id): AppPath<Uuid>,
    AppJson(req): AppJson<UpdateEventRequest>,
) -> AppResult<Json<SuccessResponse>> {
    services::update_event(&state, user_id, event_id, req).await?;
    Ok(Json(SuccessResponse { success: true }))
}

#[instrument(skip(state))]
pub async fn delete_event(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    AppPath(event_id): AppPath<Uuid>,
) -> AppResult<Json<SuccessResponse>> {
    services::delete_event(&state, user_id, event_id).await?;
    Ok(Json(SuccessResponse { success: true }))
}

#[instrument(skip(state))]
pub async fn cleanup_events(
    State(state): State<AppState>,
    AuthUser(_user_id): AuthUser,
) -> AppResult<Json<CleanupResponse>> {
    let (deleted_events, deleted_enrollments) = services::sweep_expired(&state.db).await?;
    Ok(Json(CleanupResponse {
        success: true,
        deleted_events,
        deleted_enrollments,
    }))
}

/// Unauthenticated variant for external schedulers.
#[instrument(skip(state))]
pub async fn scheduled_cleanup(State(state): State<AppState>) -> AppResult<Json<CleanupResponse>> {
    let (deleted_events, deleted_enrollments) = services::sweep_expired(&state.db).await?;
    Ok(Json(CleanupResponse {
        success: true,
        deleted_events,
        deleted_enrollments,
    }))
}
