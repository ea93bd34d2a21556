//! API request/response models for reservations.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::db::models::reservations::{ReservationDBResponse, ReservationState};
use crate::types::{EventId, ReservationId, UserId};

/// Request body for placing a hold.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct HoldCreate {
    #[schema(example = 1)]
    pub event_id: EventId,
}

/// A reservation as seen by its owner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ReservationResponse {
    pub id: ReservationId,
    pub user_id: UserId,
    pub event_id: EventId,
    pub state: ReservationState,
    /// Hold deadline; null once confirmed
    pub expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl From<ReservationDBResponse> for ReservationResponse {
    fn from(db: ReservationDBResponse) -> Self {
        Self {
            id: db.id,
            user_id: db.user_id,
            event_id: db.event_id,
            state: db.state,
            expires_at: db.expires_at,
            created_at: db.created_at,
        }
    }
}
