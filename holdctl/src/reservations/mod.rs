//! The capacity reservation engine.
//!
//! - [`ledger`]: `available_capacity` decrement/increment under the event row lock
//! - [`transitions`]: HOLD → CONFIRMED, and the expiry predicate used for reclamation
//! - [`service`]: [`ReservationService`], one transaction per client operation
//! - [`sweeper`]: [`ExpirySweeper`], periodic reclamation of expired holds
//! - [`clock`]: the time source everything above reads `now` from
//!
//! For every event, after every committed transaction:
//!
//! ```text
//! available_capacity == capacity - count(reservations in HOLD or CONFIRMED)
//! ```

pub mod clock;
pub mod ledger;
pub mod service;
pub mod sweeper;
pub mod transitions;

#[cfg(test)]
mod tests;

pub use clock::{Clock, ManualClock, SystemClock};
pub use service::{EventSummary, ReservationService};
pub use sweeper::{ExpirySweeper, SweepReport};
