//! Common type definitions.
//!
//! All entity IDs are 64-bit integers wrapped in type aliases, matching the `BIGSERIAL` keys
//! used by the PostgreSQL schema:
//!
//! - [`EventId`]: Event identifier
//! - [`ReservationId`]: Reservation identifier
//! - [`UserId`]: User identifier, as asserted by the bearer token subject

pub type EventId = i64;
pub type ReservationId = i64;
pub type UserId = i64;
