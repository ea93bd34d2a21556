//! Database record structures matching table schemas.
//!
//! `*CreateDBRequest` types carry the columns needed for an insert; `*DBResponse` types are the
//! rows handed back by both storage backends.

pub mod events;
pub mod reservations;
