use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::fmt;
use utoipa::ToSchema;

use crate::types::{EventId, ReservationId, UserId};

/// Lifecycle state of a reservation.
///
/// A released hold has no state of its own: the row is deleted and its unit returned to the
/// event's ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[sqlx(type_name = "reservation_state", rename_all = "UPPERCASE")]
#[serde(rename_all = "UPPERCASE")]
pub enum ReservationState {
    /// Capacity is held until `expires_at`
    Hold,
    /// Terminal; capacity is permanently allocated
    Confirmed,
}

impl fmt::Display for ReservationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReservationState::Hold => write!(f, "HOLD"),
            ReservationState::Confirmed => write!(f, "CONFIRMED"),
        }
    }
}

/// Database request for inserting a new HOLD reservation
#[derive(Debug, Clone)]
pub struct ReservationCreateDBRequest {
    pub user_id: UserId,
    pub event_id: EventId,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// Database response for a reservation
#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct ReservationDBResponse {
    pub id: ReservationId,
    pub user_id: UserId,
    pub event_id: EventId,
    pub state: ReservationState,
    /// Set while HOLD, cleared on confirmation
    pub expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Number of live reservations for an event, by state
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, FromRow)]
pub struct ReservationCounts {
    pub hold_count: i64,
    pub confirmed_count: i64,
}

impl ReservationCounts {
    pub fn total(&self) -> i64 {
        self.hold_count + self.confirmed_count
    }
}
