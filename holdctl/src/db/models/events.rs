use chrono::{DateTime, Utc};
use sqlx::FromRow;

use crate::types::EventId;

/// Database request for creating a new event
#[derive(Debug, Clone)]
pub struct EventCreateDBRequest {
    pub title: String,
    pub capacity: i32,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    pub is_active: bool,
}

/// Database response for an event, including its live capacity ledger
#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct EventDBResponse {
    pub id: EventId,
    pub title: String,
    pub capacity: i32,
    pub available_capacity: i32,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    pub is_active: bool,
}

impl EventDBResponse {
    /// Units currently allocated to HOLD or CONFIRMED reservations, according to the ledger
    pub fn allocated(&self) -> i64 {
        i64::from(self.capacity) - i64::from(self.available_capacity)
    }
}
