//! Reservation lifecycle transitions.
//!
//! ```text
//!               create_hold                confirm (before expires_at)
//!   (nothing) ──────────────▶ HOLD ───────────────────────────────▶ CONFIRMED
//!                               │
//!                               │ expires_at <= now, reclaimed by the sweeper
//!                               ▼
//!                           (deleted)
//! ```
//!
//! Every transition runs inside the caller's transaction and changes nothing if it fails.

use chrono::{DateTime, TimeDelta, Utc};
use tracing::instrument;

use super::ledger;
use crate::db::models::reservations::{ReservationCreateDBRequest, ReservationDBResponse, ReservationState};
use crate::errors::{Error, Result};
use crate::storage::StorageTransaction;
use crate::types::{EventId, ReservationId, UserId};

/// Take one unit of capacity and record it as a HOLD owned by `user_id`, due at `now + hold_ttl`.
#[instrument(skip(tx, now, hold_ttl), err(level = "debug"))]
pub async fn create_hold<T: StorageTransaction>(
    tx: &mut T,
    user_id: UserId,
    event_id: EventId,
    now: DateTime<Utc>,
    hold_ttl: TimeDelta,
) -> Result<ReservationDBResponse> {
    let expires_at = hold_deadline(now, hold_ttl)?;
    ledger::decrement(tx, event_id).await?;

    let reservation = tx
        .insert_hold(&ReservationCreateDBRequest {
            user_id,
            event_id,
            created_at: now,
            expires_at,
        })
        .await?;

    Ok(reservation)
}

/// `now + hold_ttl`, or an internal error when that instant is not representable.
pub fn hold_deadline(now: DateTime<Utc>, hold_ttl: TimeDelta) -> Result<DateTime<Utc>> {
    now.checked_add_signed(hold_ttl).ok_or_else(|| Error::Internal {
        operation: format!("compute hold deadline: {now} + {hold_ttl} is out of range"),
    })
}

/// Move a HOLD owned by `user_id` to CONFIRMED. Capacity is not touched.
#[instrument(skip(tx, now), err(level = "debug"))]
pub async fn confirm<T: StorageTransaction>(
    tx: &mut T,
    reservation_id: ReservationId,
    user_id: UserId,
    now: DateTime<Utc>,
) -> Result<ReservationDBResponse> {
    let reservation = tx.lock_reservation(reservation_id).await?;
    let reservation = owned_by(reservation, reservation_id, user_id)?;
    ensure_confirmable(&reservation, now)?;

    let confirmed = tx.confirm_reservation(reservation_id).await?;
    Ok(confirmed)
}

/// Hide reservations that don't exist and those belonging to someone else behind the same error.
pub fn owned_by(reservation: Option<ReservationDBResponse>, reservation_id: ReservationId, user_id: UserId) -> Result<ReservationDBResponse> {
    match reservation {
        Some(reservation) if reservation.user_id == user_id => Ok(reservation),
        _ => Err(Error::NotFound {
            resource: "Reservation".to_string(),
            id: reservation_id.to_string(),
        }),
    }
}

/// A reservation may be confirmed only while it is a HOLD whose deadline is still in the future.
pub fn ensure_confirmable(reservation: &ReservationDBResponse, now: DateTime<Utc>) -> Result<()> {
    if reservation.state != ReservationState::Hold {
        return Err(Error::InvalidState {
            reservation_id: reservation.id,
            state: reservation.state,
        });
    }

    match reservation.expires_at {
        Some(expires_at) if expires_at <= now => Err(Error::Expired {
            reservation_id: reservation.id,
            expires_at,
        }),
        Some(_) => Ok(()),
        None => Err(Error::InvariantViolation {
            message: format!("reservation {} is HOLD without a deadline", reservation.id),
        }),
    }
}

/// Whether the sweeper may delete this reservation and credit its event.
pub fn is_reclaimable(reservation: &ReservationDBResponse, now: DateTime<Utc>) -> bool {
    reservation.state == ReservationState::Hold && reservation.expires_at.is_some_and(|expires_at| expires_at <= now)
}
