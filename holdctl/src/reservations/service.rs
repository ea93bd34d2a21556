use bon::Builder;
use chrono::TimeDelta;
use std::sync::Arc;
use tracing::{debug, info, instrument};

use super::clock::Clock;
use super::transitions;
use crate::db::models::{
    events::{EventCreateDBRequest, EventDBResponse},
    reservations::{ReservationCounts, ReservationDBResponse},
};
use crate::errors::{Error, Result};
use crate::storage::{Storage, StorageTransaction};
use crate::types::{EventId, ReservationId, UserId};

/// An event together with how its allocated capacity is split between states
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventSummary {
    pub event: EventDBResponse,
    pub counts: ReservationCounts,
}

/// Entry point for client-initiated reservation operations.
///
/// Each operation runs in exactly one storage transaction: it either commits as a whole or
/// leaves no trace.
#[derive(Clone, Builder)]
pub struct ReservationService<S: Storage> {
    storage: S,
    clock: Arc<dyn Clock>,
    /// How long a new hold keeps its unit before the sweeper may reclaim it
    hold_ttl: TimeDelta,
}

impl<S: Storage> ReservationService<S> {
    pub fn storage(&self) -> &S {
        &self.storage
    }

    /// Reserve one unit of `event_id` for `user_id` until the hold deadline.
    #[instrument(skip(self), err(level = "debug"))]
    pub async fn place_hold(&self, user_id: UserId, event_id: EventId) -> Result<ReservationDBResponse> {
        let now = self.clock.now();
        let mut tx = self.storage.begin().await?;

        let reservation = transitions::create_hold(&mut tx, user_id, event_id, now, self.hold_ttl).await?;
        tx.commit().await?;

        debug!(
            reservation_id = reservation.id,
            expires_at = ?reservation.expires_at,
            "Hold placed"
        );
        Ok(reservation)
    }

    /// Confirm a hold owned by `user_id`, making its allocation permanent.
    #[instrument(skip(self), err(level = "debug"))]
    pub async fn confirm_hold(&self, reservation_id: ReservationId, user_id: UserId) -> Result<ReservationDBResponse> {
        let now = self.clock.now();
        let mut tx = self.storage.begin().await?;

        let reservation = transitions::confirm(&mut tx, reservation_id, user_id, now).await?;
        tx.commit().await?;

        debug!(event_id = reservation.event_id, "Hold confirmed");
        Ok(reservation)
    }

    #[instrument(skip(self, request), fields(title = %request.title, capacity = request.capacity), err)]
    pub async fn create_event(&self, request: EventCreateDBRequest) -> Result<EventDBResponse> {
        if request.title.trim().is_empty() {
            return Err(Error::BadRequest {
                message: "Event title cannot be empty".to_string(),
            });
        }

        if request.capacity < 0 {
            return Err(Error::BadRequest {
                message: "Event capacity cannot be negative".to_string(),
            });
        }

        if let (Some(start), Some(end)) = (request.start_date, request.end_date)
            && end < start
        {
            return Err(Error::BadRequest {
                message: "Event end_date cannot be before start_date".to_string(),
            });
        }

        let event = self.storage.create_event(&request).await?;
        info!(event_id = event.id, "Event created");
        Ok(event)
    }

    /// Event details plus live HOLD and CONFIRMED counts.
    #[instrument(skip(self), err(level = "debug"))]
    pub async fn event_summary(&self, event_id: EventId) -> Result<EventSummary> {
        let event = self.storage.get_event(event_id).await?.ok_or_else(|| Error::NotFound {
            resource: "Event".to_string(),
            id: event_id.to_string(),
        })?;
        let counts = self.storage.reservation_counts(event_id).await?;

        Ok(EventSummary { event, counts })
    }

    /// A reservation, visible only to its owner.
    #[instrument(skip(self), err(level = "debug"))]
    pub async fn get_reservation(&self, reservation_id: ReservationId, user_id: UserId) -> Result<ReservationDBResponse> {
        let reservation = self.storage.get_reservation(reservation_id).await?;
        transitions::owned_by(reservation, reservation_id, user_id)
    }
}
