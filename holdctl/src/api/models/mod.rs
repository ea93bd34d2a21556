pub mod events;
pub mod reservations;
pub mod users;
