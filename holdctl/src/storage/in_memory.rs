//! In-memory storage, for tests and single-process deployments without a database.
//!
//! Committed rows live behind one `RwLock`. Row locks are per-key async mutexes whose owned
//! guards are held by the transaction; writes are staged in the transaction and applied to the
//! committed tables in a single critical section on commit.

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};
use tokio::sync::OwnedMutexGuard;

use super::{ExpiryCursor, Storage, StorageTransaction};
use crate::db::errors::{DbError, Result};
use crate::db::models::{
    events::{EventCreateDBRequest, EventDBResponse},
    reservations::{ReservationCounts, ReservationCreateDBRequest, ReservationDBResponse, ReservationState},
};
use crate::types::{EventId, ReservationId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum RowKey {
    Event(EventId),
    Reservation(ReservationId),
}

#[derive(Default)]
struct Tables {
    events: BTreeMap<EventId, EventDBResponse>,
    reservations: BTreeMap<ReservationId, ReservationDBResponse>,
}

struct Inner {
    tables: RwLock<Tables>,
    row_locks: Mutex<HashMap<RowKey, Arc<tokio::sync::Mutex<()>>>>,
    next_event_id: AtomicI64,
    next_reservation_id: AtomicI64,
}

/// In-memory implementation of [`Storage`].
///
/// Cloning is cheap and clones share the same tables.
#[derive(Clone)]
pub struct InMemoryStorage {
    inner: Arc<Inner>,
}

impl InMemoryStorage {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                tables: RwLock::new(Tables::default()),
                row_locks: Mutex::new(HashMap::new()),
                next_event_id: AtomicI64::new(1),
                next_reservation_id: AtomicI64::new(1),
            }),
        }
    }

    /// Remove an event without touching its reservations, leaving them orphaned.
    #[cfg(test)]
    pub(crate) fn remove_event_unchecked(&self, id: EventId) {
        self.inner.tables.write().events.remove(&id);
    }

    /// Overwrite a committed event's ledger value.
    #[cfg(test)]
    pub(crate) fn set_available_capacity_unchecked(&self, id: EventId, available_capacity: i32) {
        if let Some(event) = self.inner.tables.write().events.get_mut(&id) {
            event.available_capacity = available_capacity;
        }
    }
}

impl Default for InMemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

pub struct InMemoryTransaction {
    inner: Arc<Inner>,
    held_locks: HashMap<RowKey, OwnedMutexGuard<()>>,
    staged_events: HashMap<EventId, EventDBResponse>,
    // `None` stages a deletion
    staged_reservations: HashMap<ReservationId, Option<ReservationDBResponse>>,
}

impl InMemoryTransaction {
    async fn lock_row(&mut self, key: RowKey) {
        if self.held_locks.contains_key(&key) {
            return;
        }

        let row_lock = {
            let mut row_locks = self.inner.row_locks.lock();
            row_locks.entry(key).or_default().clone()
        };

        let guard = row_lock.lock_owned().await;
        self.held_locks.insert(key, guard);
    }

    fn current_event(&self, id: EventId) -> Option<EventDBResponse> {
        if let Some(event) = self.staged_events.get(&id) {
            return Some(event.clone());
        }
        self.inner.tables.read().events.get(&id).cloned()
    }

    fn current_reservation(&self, id: ReservationId) -> Option<ReservationDBResponse> {
        if let Some(staged) = self.staged_reservations.get(&id) {
            return staged.clone();
        }
        self.inner.tables.read().reservations.get(&id).cloned()
    }

    fn ensure_locked(&self, key: RowKey) -> Result<()> {
        if self.held_locks.contains_key(&key) {
            Ok(())
        } else {
            Err(DbError::Other(anyhow::anyhow!("write to {key:?} without holding its row lock")))
        }
    }
}

impl Drop for InMemoryTransaction {
    fn drop(&mut self) {
        let keys: Vec<RowKey> = self.held_locks.keys().copied().collect();
        self.held_locks.clear();

        // Forget lock entries nobody else is waiting on. Clones are only taken under this
        // mutex, so a strong count of one means the map holds the last reference.
        let mut row_locks = self.inner.row_locks.lock();
        for key in keys {
            if row_locks.get(&key).is_some_and(|lock| Arc::strong_count(lock) == 1) {
                row_locks.remove(&key);
            }
        }
    }
}

impl Storage for InMemoryStorage {
    type Transaction = InMemoryTransaction;

    async fn begin(&self) -> Result<InMemoryTransaction> {
        Ok(InMemoryTransaction {
            inner: self.inner.clone(),
            held_locks: HashMap::new(),
            staged_events: HashMap::new(),
            staged_reservations: HashMap::new(),
        })
    }

    async fn create_event(&self, request: &EventCreateDBRequest) -> Result<EventDBResponse> {
        if request.capacity < 0 {
            return Err(DbError::CheckViolation {
                constraint: Some("events_capacity_non_negative".to_string()),
                table: Some("events".to_string()),
                message: format!("capacity must be non-negative, got {}", request.capacity),
            });
        }

        let event = EventDBResponse {
            id: self.inner.next_event_id.fetch_add(1, Ordering::SeqCst),
            title: request.title.clone(),
            capacity: request.capacity,
            available_capacity: request.capacity,
            start_date: request.start_date,
            end_date: request.end_date,
            is_active: request.is_active,
        };
        self.inner.tables.write().events.insert(event.id, event.clone());
        Ok(event)
    }

    async fn get_event(&self, id: EventId) -> Result<Option<EventDBResponse>> {
        Ok(self.inner.tables.read().events.get(&id).cloned())
    }

    async fn get_reservation(&self, id: ReservationId) -> Result<Option<ReservationDBResponse>> {
        Ok(self.inner.tables.read().reservations.get(&id).cloned())
    }

    async fn reservation_counts(&self, event_id: EventId) -> Result<ReservationCounts> {
        let tables = self.inner.tables.read();
        let counts = tables
            .reservations
            .values()
            .filter(|r| r.event_id == event_id)
            .fold(ReservationCounts::default(), |mut counts, r| {
                match r.state {
                    ReservationState::Hold => counts.hold_count += 1,
                    ReservationState::Confirmed => counts.confirmed_count += 1,
                }
                counts
            });
        Ok(counts)
    }

    async fn find_expired_holds(
        &self,
        now: DateTime<Utc>,
        after: Option<ExpiryCursor>,
        limit: i64,
    ) -> Result<Vec<ReservationDBResponse>> {
        let limit = usize::try_from(limit).unwrap_or(0);
        let tables = self.inner.tables.read();
        let mut expired: Vec<ReservationDBResponse> = tables
            .reservations
            .values()
            .filter(|r| r.state == ReservationState::Hold)
            .filter(|r| match r.expires_at {
                Some(deadline) => deadline <= now && after.is_none_or(|cursor| (deadline, r.id) > cursor),
                None => false,
            })
            .cloned()
            .collect();
        expired.sort_by_key(|r| (r.expires_at, r.id));
        expired.truncate(limit);
        Ok(expired)
    }
}

impl StorageTransaction for InMemoryTransaction {
    async fn lock_event(&mut self, id: EventId) -> Result<Option<EventDBResponse>> {
        self.lock_row(RowKey::Event(id)).await;
        Ok(self.current_event(id))
    }

    async fn set_available_capacity(&mut self, id: EventId, available_capacity: i32) -> Result<EventDBResponse> {
        self.ensure_locked(RowKey::Event(id))?;
        let mut event = self.current_event(id).ok_or(DbError::NotFound)?;

        if available_capacity < 0 || available_capacity > event.capacity {
            return Err(DbError::CheckViolation {
                constraint: Some("events_available_capacity_bounds".to_string()),
                table: Some("events".to_string()),
                message: format!("available_capacity {available_capacity} outside [0, {}]", event.capacity),
            });
        }

        event.available_capacity = available_capacity;
        self.staged_events.insert(id, event.clone());
        Ok(event)
    }

    async fn insert_hold(&mut self, request: &ReservationCreateDBRequest) -> Result<ReservationDBResponse> {
        if self.current_event(request.event_id).is_none() {
            return Err(DbError::ForeignKeyViolation {
                constraint: Some("reservations_event_id_fkey".to_string()),
                table: Some("reservations".to_string()),
                message: format!("event {} does not exist", request.event_id),
            });
        }

        let reservation = ReservationDBResponse {
            id: self.inner.next_reservation_id.fetch_add(1, Ordering::SeqCst),
            user_id: request.user_id,
            event_id: request.event_id,
            state: ReservationState::Hold,
            expires_at: Some(request.expires_at),
            created_at: request.created_at,
        };
        self.staged_reservations.insert(reservation.id, Some(reservation.clone()));
        Ok(reservation)
    }

    async fn lock_reservation(&mut self, id: ReservationId) -> Result<Option<ReservationDBResponse>> {
        self.lock_row(RowKey::Reservation(id)).await;
        Ok(self.current_reservation(id))
    }

    async fn confirm_reservation(&mut self, id: ReservationId) -> Result<ReservationDBResponse> {
        self.ensure_locked(RowKey::Reservation(id))?;
        let mut reservation = self.current_reservation(id).ok_or(DbError::NotFound)?;
        reservation.state = ReservationState::Confirmed;
        reservation.expires_at = None;
        self.staged_reservations.insert(id, Some(reservation.clone()));
        Ok(reservation)
    }

    async fn delete_reservation(&mut self, id: ReservationId) -> Result<bool> {
        self.ensure_locked(RowKey::Reservation(id))?;
        let existed = self.current_reservation(id).is_some();
        self.staged_reservations.insert(id, None);
        Ok(existed)
    }

    async fn commit(mut self) -> Result<()> {
        let staged_events = std::mem::take(&mut self.staged_events);
        let staged_reservations = std::mem::take(&mut self.staged_reservations);

        let mut tables = self.inner.tables.write();
        for (id, event) in staged_events {
            tables.events.insert(id, event);
        }
        for (id, reservation) in staged_reservations {
            match reservation {
                Some(reservation) => tables.reservations.insert(id, reservation),
                None => tables.reservations.remove(&id),
            };
        }
        Ok(())
    }
}
