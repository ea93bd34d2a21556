use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};

use crate::{
    AppState,
    api::models::{
        events::{EventCreate, EventResponse, EventSummaryResponse},
        users::CurrentUser,
    },
    errors::Result,
    storage::Storage,
    types::EventId,
};

#[utoipa::path(
    post,
    path = "/events",
    tag = "events",
    summary = "Create event",
    request_body = EventCreate,
    responses(
        (status = 201, description = "Event created with all capacity available", body = EventResponse),
        (status = 400, description = "Invalid event data"),
        (status = 401, description = "Unauthorized"),
        (status = 500, description = "Internal server error")
    ),
    security(("BearerAuth" = []))
)]
#[tracing::instrument(skip_all, fields(user_id = current_user.id))]
pub async fn create_event<S: Storage>(
    State(state): State<AppState<S>>,
    current_user: CurrentUser,
    Json(create): Json<EventCreate>,
) -> Result<(StatusCode, Json<EventResponse>)> {
    let event = state.service.create_event(create.into()).await?;
    Ok((StatusCode::CREATED, Json(event.into())))
}

#[utoipa::path(
    get,
    path = "/events/{event_id}",
    tag = "events",
    summary = "Get event",
    description = "Event details with its live capacity and the number of held and confirmed reservations.",
    params(
        ("event_id" = i64, Path, description = "Event ID"),
    ),
    responses(
        (status = 200, description = "Event summary", body = EventSummaryResponse),
        (status = 404, description = "Event not found"),
        (status = 500, description = "Internal server error")
    )
)]
#[tracing::instrument(skip_all, fields(event_id = event_id))]
pub async fn get_event<S: Storage>(
    State(state): State<AppState<S>>,
    Path(event_id): Path<EventId>,
) -> Result<Json<EventSummaryResponse>> {
    let summary = state.service.event_summary(event_id).await?;
    Ok(Json(summary.into()))
}
