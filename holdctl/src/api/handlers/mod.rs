pub mod events;
pub mod reservations;
