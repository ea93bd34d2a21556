//! API request/response models for events.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::db::models::events::{EventCreateDBRequest, EventDBResponse};
use crate::reservations::EventSummary;
use crate::types::EventId;

/// Request body for creating an event.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct EventCreate {
    #[schema(example = "Rust Meetup")]
    pub title: String,
    /// Total units; all of them start out available
    #[schema(example = 100)]
    pub capacity: i32,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    /// Whether the event accepts new holds (default: true)
    #[serde(default = "default_is_active")]
    pub is_active: bool,
}

fn default_is_active() -> bool {
    true
}

impl From<EventCreate> for EventCreateDBRequest {
    fn from(create: EventCreate) -> Self {
        Self {
            title: create.title,
            capacity: create.capacity,
            start_date: create.start_date,
            end_date: create.end_date,
            is_active: create.is_active,
        }
    }
}

/// An event and its capacity ledger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct EventResponse {
    pub id: EventId,
    pub title: String,
    pub capacity: i32,
    /// Units not held or confirmed
    pub available_capacity: i32,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    pub is_active: bool,
}

impl From<EventDBResponse> for EventResponse {
    fn from(db: EventDBResponse) -> Self {
        Self {
            id: db.id,
            title: db.title,
            capacity: db.capacity,
            available_capacity: db.available_capacity,
            start_date: db.start_date,
            end_date: db.end_date,
            is_active: db.is_active,
        }
    }
}

/// An event plus how many of its units are held and confirmed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct EventSummaryResponse {
    #[serde(flatten)]
    pub event: EventResponse,
    pub hold_count: i64,
    pub confirmed_count: i64,
}

impl From<EventSummary> for EventSummaryResponse {
    fn from(summary: EventSummary) -> Self {
        Self {
            event: summary.event.into(),
            hold_count: summary.counts.hold_count,
            confirmed_count: summary.counts.confirmed_count,
        }
    }
}
