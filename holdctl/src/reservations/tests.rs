use chrono::{DateTime, TimeDelta, Utc};
use rstest::{fixture, rstest};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;

use crate::db::models::events::{EventCreateDBRequest, EventDBResponse};
use crate::db::models::reservations::ReservationState;
use crate::errors::Error;
use crate::reservations::{ExpirySweeper, ManualClock, ReservationService, SweepReport};
use crate::storage::{InMemoryStorage, Storage};
use crate::types::EventId;

#[cfg(feature = "postgres-tests")]
use crate::storage::PostgresStorage;

struct Engine<S: Storage> {
    storage: S,
    clock: ManualClock,
    service: ReservationService<S>,
    sweeper: ExpirySweeper<S>,
}

fn engine<S: Storage>(storage: S) -> Engine<S> {
    let start: DateTime<Utc> = "2025-06-01T12:00:00Z".parse().unwrap();
    let clock = ManualClock::new(start);
    let service = ReservationService::builder()
        .storage(storage.clone())
        .clock(Arc::new(clock.clone()))
        .hold_ttl(TimeDelta::minutes(5))
        .build();
    let sweeper = ExpirySweeper::new(storage.clone(), Arc::new(clock.clone()), Duration::from_secs(60), 500);
    Engine {
        storage,
        clock,
        service,
        sweeper,
    }
}

async fn create_event<S: Storage>(engine: &Engine<S>, capacity: i32, is_active: bool) -> EventDBResponse {
    engine
        .service
        .create_event(EventCreateDBRequest {
            title: format!("Event with {capacity} seats"),
            capacity,
            start_date: None,
            end_date: None,
            is_active,
        })
        .await
        .unwrap()
}

/// available_capacity == capacity - (holds + confirmed)
async fn assert_ledger_consistent<S: Storage>(storage: &S, event_id: EventId) {
    let event = storage.get_event(event_id).await.unwrap().unwrap();
    let counts = storage.reservation_counts(event_id).await.unwrap();
    assert_eq!(
        event.allocated(),
        counts.total(),
        "ledger drifted: capacity {}, available {}, counts {:?}",
        event.capacity,
        event.available_capacity,
        counts
    );
}

#[fixture]
fn in_memory_storage() -> InMemoryStorage {
    InMemoryStorage::new()
}

async fn run_test_concurrent_holds_never_oversell<S: Storage>(storage: S) {
    let engine = engine(storage);
    let event = create_event(&engine, 5, true).await;

    let event_id = event.id;
    let mut tasks = JoinSet::new();
    for user_id in 0..20 {
        let service = engine.service.clone();
        tasks.spawn(async move { service.place_hold(user_id, event_id).await });
    }

    let mut successes = 0;
    let mut no_capacity = 0;
    while let Some(result) = tasks.join_next().await {
        match result.unwrap() {
            Ok(_) => successes += 1,
            Err(Error::NoCapacity { .. }) => no_capacity += 1,
            Err(e) => panic!("unexpected error: {e}"),
        }
    }

    assert_eq!(successes, 5);
    assert_eq!(no_capacity, 15);

    let summary = engine.service.event_summary(event.id).await.unwrap();
    assert_eq!(summary.event.available_capacity, 0);
    assert_eq!(summary.counts.hold_count, 5);
    assert_ledger_consistent(&engine.storage, event.id).await;
}

#[rstest]
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_holds_never_oversell(in_memory_storage: InMemoryStorage) {
    run_test_concurrent_holds_never_oversell(in_memory_storage).await;
}

#[cfg(feature = "postgres-tests")]
#[sqlx::test]
async fn test_concurrent_holds_never_oversell_postgres(pool: sqlx::PgPool) {
    run_test_concurrent_holds_never_oversell(PostgresStorage::new(pool)).await;
}

async fn run_test_hold_confirm_expire_lifecycle<S: Storage>(storage: S) {
    let engine = engine(storage);
    let event = create_event(&engine, 5, true).await;

    let mut holds = Vec::new();
    for (i, user_id) in (1..=5).enumerate() {
        holds.push(engine.service.place_hold(user_id, event.id).await.unwrap());
        let available = engine.storage.get_event(event.id).await.unwrap().unwrap().available_capacity;
        assert_eq!(available, 4 - i as i32);
    }

    let sixth = engine.service.place_hold(6, event.id).await;
    assert!(matches!(sixth, Err(Error::NoCapacity { .. })));

    let confirmed = engine.service.confirm_hold(holds[0].id, 1).await.unwrap();
    assert_eq!(confirmed.state, ReservationState::Confirmed);
    assert_eq!(confirmed.expires_at, None);
    assert_eq!(engine.storage.get_event(event.id).await.unwrap().unwrap().available_capacity, 0);

    engine.clock.advance(TimeDelta::minutes(6));
    let report = engine.sweeper.sweep_once().await.unwrap();
    assert_eq!(report.reclaimed, 4);

    let summary = engine.service.event_summary(event.id).await.unwrap();
    assert_eq!(summary.event.available_capacity, 4);
    assert_eq!(summary.counts.hold_count, 0);
    assert_eq!(summary.counts.confirmed_count, 1);

    let survivor = engine.service.get_reservation(holds[0].id, 1).await.unwrap();
    assert_eq!(survivor.state, ReservationState::Confirmed);
    for (hold, user_id) in holds.iter().zip(1..).skip(1) {
        assert!(matches!(
            engine.service.get_reservation(hold.id, user_id).await,
            Err(Error::NotFound { .. })
        ));
    }
    assert_ledger_consistent(&engine.storage, event.id).await;
}

#[rstest]
#[tokio::test]
async fn test_hold_confirm_expire_lifecycle(in_memory_storage: InMemoryStorage) {
    run_test_hold_confirm_expire_lifecycle(in_memory_storage).await;
}

#[cfg(feature = "postgres-tests")]
#[sqlx::test]
async fn test_hold_confirm_expire_lifecycle_postgres(pool: sqlx::PgPool) {
    run_test_hold_confirm_expire_lifecycle(PostgresStorage::new(pool)).await;
}

async fn run_test_second_sweep_is_a_no_op<S: Storage>(storage: S) {
    let engine = engine(storage);
    let event = create_event(&engine, 3, true).await;
    for user_id in 0..3 {
        engine.service.place_hold(user_id, event.id).await.unwrap();
    }
    engine.clock.advance(TimeDelta::minutes(5));

    let first = engine.sweeper.sweep_once().await.unwrap();
    assert_eq!(first.examined, 3);
    assert_eq!(first.reclaimed, 3);

    let second = engine.sweeper.sweep_once().await.unwrap();
    assert_eq!(second, SweepReport::default());

    assert_eq!(engine.storage.get_event(event.id).await.unwrap().unwrap().available_capacity, 3);
    assert_ledger_consistent(&engine.storage, event.id).await;
}

#[rstest]
#[tokio::test]
async fn test_second_sweep_is_a_no_op(in_memory_storage: InMemoryStorage) {
    run_test_second_sweep_is_a_no_op(in_memory_storage).await;
}

#[cfg(feature = "postgres-tests")]
#[sqlx::test]
async fn test_second_sweep_is_a_no_op_postgres(pool: sqlx::PgPool) {
    run_test_second_sweep_is_a_no_op(PostgresStorage::new(pool)).await;
}

async fn run_test_concurrent_sweepers_reclaim_each_hold_once<S: Storage>(storage: S) {
    let engine = engine(storage);
    let event = create_event(&engine, 10, true).await;
    for user_id in 0..10 {
        engine.service.place_hold(user_id, event.id).await.unwrap();
    }
    engine.clock.advance(TimeDelta::minutes(5));

    let other = ExpirySweeper::new(engine.storage.clone(), Arc::new(engine.clock.clone()), Duration::from_secs(60), 500);
    let (a, b) = tokio::join!(engine.sweeper.sweep_once(), other.sweep_once());
    let (a, b) = (a.unwrap(), b.unwrap());

    assert_eq!(a.reclaimed + b.reclaimed, 10);
    assert_eq!(a.failed + b.failed, 0);
    assert_eq!(engine.storage.get_event(event.id).await.unwrap().unwrap().available_capacity, 10);
    assert_ledger_consistent(&engine.storage, event.id).await;
}

#[rstest]
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_sweepers_reclaim_each_hold_once(in_memory_storage: InMemoryStorage) {
    run_test_concurrent_sweepers_reclaim_each_hold_once(in_memory_storage).await;
}

#[cfg(feature = "postgres-tests")]
#[sqlx::test]
async fn test_concurrent_sweepers_reclaim_each_hold_once_postgres(pool: sqlx::PgPool) {
    run_test_concurrent_sweepers_reclaim_each_hold_once(PostgresStorage::new(pool)).await;
}

async fn run_test_traffic_during_sweep_keeps_ledger_consistent<S: Storage>(storage: S) {
    let engine = engine(storage);
    let event = create_event(&engine, 8, true).await;

    let mut stale = Vec::new();
    for user_id in 0..4 {
        stale.push(engine.service.place_hold(user_id, event.id).await.unwrap());
    }
    engine.clock.advance(TimeDelta::minutes(5));

    let mut tasks = JoinSet::new();
    for (user_id, hold) in (0..).zip(stale) {
        let service = engine.service.clone();
        tasks.spawn(async move { service.confirm_hold(hold.id, user_id).await.map(|_| ()) });
    }
    let event_id = event.id;
    for user_id in 100..108 {
        let service = engine.service.clone();
        tasks.spawn(async move { service.place_hold(user_id, event_id).await.map(|_| ()) });
    }
    let report = engine.sweeper.sweep_once().await.unwrap();

    let mut new_holds = 0;
    while let Some(result) = tasks.join_next().await {
        match result.unwrap() {
            Ok(()) => new_holds += 1,
            Err(Error::Expired { .. } | Error::NotFound { .. } | Error::NoCapacity { .. }) => {}
            Err(e) => panic!("unexpected error: {e}"),
        }
    }

    // Expired holds can never be confirmed, so every success is a new hold
    assert!(new_holds >= 4, "at least the initially free units were taken");
    assert_eq!(report.failed, 0);
    assert_ledger_consistent(&engine.storage, event.id).await;
}

#[rstest]
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_traffic_during_sweep_keeps_ledger_consistent(in_memory_storage: InMemoryStorage) {
    run_test_traffic_during_sweep_keeps_ledger_consistent(in_memory_storage).await;
}

#[cfg(feature = "postgres-tests")]
#[sqlx::test]
async fn test_traffic_during_sweep_keeps_ledger_consistent_postgres(pool: sqlx::PgPool) {
    run_test_traffic_during_sweep_keeps_ledger_consistent(PostgresStorage::new(pool)).await;
}

async fn run_test_inactive_event_rejects_holds<S: Storage>(storage: S) {
    let engine = engine(storage);
    let event = create_event(&engine, 3, false).await;

    let result = engine.service.place_hold(1, event.id).await;
    assert!(matches!(result, Err(Error::EventInactive { event_id }) if event_id == event.id));
    assert_eq!(engine.storage.get_event(event.id).await.unwrap().unwrap().available_capacity, 3);
}

#[rstest]
#[tokio::test]
async fn test_inactive_event_rejects_holds(in_memory_storage: InMemoryStorage) {
    run_test_inactive_event_rejects_holds(in_memory_storage).await;
}

#[cfg(feature = "postgres-tests")]
#[sqlx::test]
async fn test_inactive_event_rejects_holds_postgres(pool: sqlx::PgPool) {
    run_test_inactive_event_rejects_holds(PostgresStorage::new(pool)).await;
}
