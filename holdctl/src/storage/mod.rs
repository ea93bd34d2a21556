use chrono::{DateTime, Utc};
use std::future::Future;

use crate::db::errors::Result;
use crate::db::models::{
    events::{EventCreateDBRequest, EventDBResponse},
    reservations::{ReservationCounts, ReservationCreateDBRequest, ReservationDBResponse},
};
use crate::types::{EventId, ReservationId};

pub mod in_memory;
pub mod postgres;


pub use in_memory::InMemoryStorage;
pub use postgres::PostgresStorage;

/// Position in the `(expires_at, id)` ordering of expired holds
pub type ExpiryCursor = (DateTime<Utc>, ReservationId);

/// Storage trait for persisting events and reservations.
///
/// Reads on the storage itself see committed data only. Every mutation of the capacity ledger or
/// of a reservation goes through a [`StorageTransaction`] obtained from [`Storage::begin`], which
/// holds row locks until it is committed or dropped.
pub trait Storage: Clone + Send + Sync + 'static {
    type Transaction: StorageTransaction;

    /// Open a new unit of work.
    fn begin(&self) -> impl Future<Output = Result<Self::Transaction>> + Send;

    /// Insert a new event with `available_capacity == capacity`.
    fn create_event(&self, request: &EventCreateDBRequest) -> impl Future<Output = Result<EventDBResponse>> + Send;

    fn get_event(&self, id: EventId) -> impl Future<Output = Result<Option<EventDBResponse>>> + Send;

    fn get_reservation(&self, id: ReservationId) -> impl Future<Output = Result<Option<ReservationDBResponse>>> + Send;

    /// Count the HOLD and CONFIRMED reservations referencing an event.
    fn reservation_counts(&self, event_id: EventId) -> impl Future<Output = Result<ReservationCounts>> + Send;

    /// Find HOLD reservations with `expires_at <= now`, ordered by `(expires_at, id)`.
    ///
    /// This is a plain read: results may already be confirmed or reclaimed by the time the caller
    /// locks them, so callers must re-check under the row lock.
    ///
    /// # Arguments
    /// - `now` - Reference instant for the expiry predicate
    /// - `after` - Only return reservations strictly after this `(expires_at, id)` position
    /// - `limit` - Maximum number of reservations to return
    fn find_expired_holds(
        &self,
        now: DateTime<Utc>,
        after: Option<ExpiryCursor>,
        limit: i64,
    ) -> impl Future<Output = Result<Vec<ReservationDBResponse>>> + Send;
}

/// A unit of work against [`Storage`].
///
/// Writes become visible to other callers only on [`commit`](StorageTransaction::commit).
/// Dropping the transaction without committing discards its writes and releases its locks.
///
/// Lock ordering: a transaction that needs both an event lock and a reservation lock takes the
/// event first, and never holds more than one event lock.
pub trait StorageTransaction: Send {
    /// Read an event and take its exclusive row lock.
    ///
    /// Blocks while another transaction holds the lock. Returns `None` if the event does not
    /// exist. Locking the same event twice in one transaction is a no-op.
    fn lock_event(&mut self, id: EventId) -> impl Future<Output = Result<Option<EventDBResponse>>> + Send;

    /// Overwrite an event's `available_capacity`. The event must be locked by this transaction.
    fn set_available_capacity(&mut self, id: EventId, available_capacity: i32) -> impl Future<Output = Result<EventDBResponse>> + Send;

    /// Insert a new HOLD reservation.
    ///
    /// # Errors
    /// - `ForeignKeyViolation` - if the referenced event does not exist
    fn insert_hold(&mut self, request: &ReservationCreateDBRequest) -> impl Future<Output = Result<ReservationDBResponse>> + Send;

    /// Read a reservation and take its exclusive row lock.
    ///
    /// Returns `None` if the reservation does not exist, including when it was deleted by a
    /// transaction that committed while this one waited for the lock.
    fn lock_reservation(&mut self, id: ReservationId) -> impl Future<Output = Result<Option<ReservationDBResponse>>> + Send;

    /// Mark a locked reservation CONFIRMED and clear its deadline.
    ///
    /// # Errors
    /// - `NotFound` - if the reservation doesn't exist
    fn confirm_reservation(&mut self, id: ReservationId) -> impl Future<Output = Result<ReservationDBResponse>> + Send;

    /// Delete a locked reservation. Returns whether a row was removed.
    fn delete_reservation(&mut self, id: ReservationId) -> impl Future<Output = Result<bool>> + Send;

    /// Make every write in this transaction visible, atomically, and release its locks.
    fn commit(self) -> impl Future<Output = Result<()>> + Send;
}
