use axum::{
    Json,
    extract::{Path, State},
};

use crate::{
    AppState,
    api::models::{
        reservations::{HoldCreate, ReservationResponse},
        users::CurrentUser,
    },
    errors::Result,
    storage::Storage,
    types::ReservationId,
};

#[utoipa::path(
    post,
    path = "/reservations/hold",
    tag = "reservations",
    summary = "Place hold",
    description = "Reserve one unit of an event for the caller. The hold expires after the configured hold TTL unless confirmed.",
    request_body = HoldCreate,
    responses(
        (status = 200, description = "Hold placed", body = ReservationResponse),
        (status = 400, description = "No capacity, or the event is not active"),
        (status = 401, description = "Unauthorized"),
        (status = 404, description = "Event not found"),
        (status = 500, description = "Internal server error")
    ),
    security(("BearerAuth" = []))
)]
#[tracing::instrument(skip_all, fields(user_id = current_user.id, event_id = request.event_id))]
pub async fn place_hold<S: Storage>(
    State(state): State<AppState<S>>,
    current_user: CurrentUser,
    Json(request): Json<HoldCreate>,
) -> Result<Json<ReservationResponse>> {
    let reservation = state.service.place_hold(current_user.id, request.event_id).await?;
    Ok(Json(reservation.into()))
}

#[utoipa::path(
    post,
    path = "/reservations/confirm/{reservation_id}",
    tag = "reservations",
    summary = "Confirm hold",
    description = "Make one of the caller's unexpired holds permanent.",
    params(
        ("reservation_id" = i64, Path, description = "Reservation ID"),
    ),
    responses(
        (status = 200, description = "Reservation confirmed", body = ReservationResponse),
        (status = 400, description = "Reservation not in HOLD state, or expired"),
        (status = 401, description = "Unauthorized"),
        (status = 404, description = "Reservation not found"),
        (status = 500, description = "Internal server error")
    ),
    security(("BearerAuth" = []))
)]
#[tracing::instrument(skip_all, fields(user_id = current_user.id, reservation_id = reservation_id))]
pub async fn confirm_hold<S: Storage>(
    State(state): State<AppState<S>>,
    Path(reservation_id): Path<ReservationId>,
    current_user: CurrentUser,
) -> Result<Json<ReservationResponse>> {
    let reservation = state.service.confirm_hold(reservation_id, current_user.id).await?;
    Ok(Json(reservation.into()))
}

#[utoipa::path(
    get,
    path = "/reservations/{reservation_id}",
    tag = "reservations",
    summary = "Get reservation",
    params(
        ("reservation_id" = i64, Path, description = "Reservation ID"),
    ),
    responses(
        (status = 200, description = "Reservation", body = ReservationResponse),
        (status = 401, description = "Unauthorized"),
        (status = 404, description = "Reservation not found, reclaimed, or owned by someone else"),
        (status = 500, description = "Internal server error")
    ),
    security(("BearerAuth" = []))
)]
#[tracing::instrument(skip_all, fields(user_id = current_user.id, reservation_id = reservation_id))]
pub async fn get_reservation<S: Storage>(
    State(state): State<AppState<S>>,
    Path(reservation_id): Path<ReservationId>,
    current_user: CurrentUser,
) -> Result<Json<ReservationResponse>> {
    let reservation = state.service.get_reservation(reservation_id, current_user.id).await?;
    Ok(Json(reservation.into()))
}
