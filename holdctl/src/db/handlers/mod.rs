//! Repository implementations over a single PostgreSQL connection or transaction.

pub mod events;
pub mod reservations;

pub use events::Events;
pub use reservations::Reservations;
