//! Capacity ledger: the `available_capacity` counter embedded in each event.
//!
//! Both operations take the event's row lock through the caller's transaction and keep it until
//! that transaction ends, so concurrent callers on one event are serialized and nothing is
//! visible until commit.

use tracing::{error, instrument, trace};

use crate::db::models::events::EventDBResponse;
use crate::errors::{Error, Result};
use crate::storage::StorageTransaction;
use crate::types::EventId;

/// Take one unit of capacity from an event.
///
/// # Errors
/// - `NotFound` - the event does not exist
/// - `EventInactive` - the event is not accepting holds
/// - `NoCapacity` - `available_capacity` is already zero
#[instrument(skip(tx), err(level = "debug"))]
pub async fn decrement<T: StorageTransaction>(tx: &mut T, event_id: EventId) -> Result<EventDBResponse> {
    let event = tx.lock_event(event_id).await?.ok_or_else(|| Error::NotFound {
        resource: "Event".to_string(),
        id: event_id.to_string(),
    })?;

    if !event.is_active {
        return Err(Error::EventInactive { event_id });
    }

    if event.available_capacity <= 0 {
        return Err(Error::NoCapacity { event_id });
    }

    let updated = tx.set_available_capacity(event_id, event.available_capacity - 1).await?;
    trace!(available_capacity = updated.available_capacity, "Capacity decremented");
    Ok(updated)
}

/// Return one unit of capacity to an event.
///
/// # Errors
/// - `NotFound` - the event does not exist
/// - `InvariantViolation` - the event is already at full capacity. Callers must abandon the
///   transaction.
#[instrument(skip(tx), err)]
pub async fn increment<T: StorageTransaction>(tx: &mut T, event_id: EventId) -> Result<EventDBResponse> {
    let event = tx.lock_event(event_id).await?.ok_or_else(|| Error::NotFound {
        resource: "Event".to_string(),
        id: event_id.to_string(),
    })?;

    if event.available_capacity >= event.capacity {
        error!(
            event_id,
            capacity = event.capacity,
            available_capacity = event.available_capacity,
            "Refusing to credit capacity beyond the event total"
        );
        return Err(Error::InvariantViolation {
            message: format!(
                "event {event_id}: available_capacity {} would exceed capacity {}",
                event.available_capacity + 1,
                event.capacity
            ),
        });
    }

    let updated = tx.set_available_capacity(event_id, event.available_capacity + 1).await?;
    trace!(available_capacity = updated.available_capacity, "Capacity incremented");
    Ok(updated)
}
