//! Background reclamation of expired holds.
//!
//! The [`ExpirySweeper`] periodically looks for HOLD reservations past their deadline and, for
//! each one in its own transaction, deletes it and credits its event's ledger. It runs alongside
//! live traffic (and, safely, alongside other sweepers): every candidate is re-checked under its
//! row locks, and anything confirmed or reclaimed in the meantime is skipped.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use super::clock::Clock;
use super::{ledger, transitions};
use crate::db::models::reservations::ReservationDBResponse;
use crate::errors::Result;
use crate::storage::{ExpiryCursor, Storage, StorageTransaction};

/// What one pass of the sweeper did
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Expired holds returned by the scan
    pub examined: usize,
    /// Holds deleted with their unit returned to the event
    pub reclaimed: usize,
    /// Holds deleted whose event no longer exists
    pub orphaned: usize,
    /// Holds confirmed, already reclaimed, or no longer expired by the time they were locked
    pub skipped: usize,
    /// Holds left in place because reclaiming them failed; retried on the next pass
    pub failed: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Reclaim {
    Reclaimed,
    Orphaned,
    Skipped,
}

pub struct ExpirySweeper<S: Storage> {
    storage: S,
    clock: Arc<dyn Clock>,
    interval: Duration,
    batch_size: i64,
}

impl<S: Storage> ExpirySweeper<S> {
    pub fn new(storage: S, clock: Arc<dyn Clock>, interval: Duration, batch_size: i64) -> Self {
        Self {
            storage,
            clock,
            interval,
            batch_size,
        }
    }

    /// Run one pass over the currently expired holds.
    ///
    /// The scan pages forward through `(expires_at, id)` order until `batch_size` holds have been
    /// resolved or the expired set is exhausted, so holds that keep failing do not hide the ones
    /// behind them. Only the scan can fail the pass; per-reservation failures are logged and
    /// counted.
    #[instrument(skip(self), err)]
    pub async fn sweep_once(&self) -> Result<SweepReport> {
        let now = self.clock.now();
        let mut report = SweepReport::default();
        let mut cursor: Option<ExpiryCursor> = None;

        loop {
            let page = self.storage.find_expired_holds(now, cursor, self.batch_size).await?;
            report.examined += page.len();

            for hold in &page {
                match self.reclaim(hold, now).await {
                    Ok(Reclaim::Reclaimed) => report.reclaimed += 1,
                    Ok(Reclaim::Orphaned) => report.orphaned += 1,
                    Ok(Reclaim::Skipped) => report.skipped += 1,
                    Err(e) => {
                        report.failed += 1;
                        error!(
                            reservation_id = hold.id,
                            event_id = hold.event_id,
                            error = %e,
                            "Failed to reclaim expired hold"
                        );
                    }
                }
            }

            let resolved = report.reclaimed + report.orphaned + report.skipped;
            if i64::try_from(page.len()).unwrap_or(i64::MAX) < self.batch_size
                || i64::try_from(resolved).unwrap_or(i64::MAX) >= self.batch_size
            {
                break;
            }

            match page.last().and_then(|hold| hold.expires_at.map(|deadline| (deadline, hold.id))) {
                Some(next) => cursor = Some(next),
                None => break,
            }
        }

        Ok(report)
    }

    async fn reclaim(&self, hold: &ReservationDBResponse, now: DateTime<Utc>) -> Result<Reclaim> {
        let mut tx = self.storage.begin().await?;

        // Event before reservation, the same order as every other flow
        let event = tx.lock_event(hold.event_id).await?;

        let Some(current) = tx.lock_reservation(hold.id).await? else {
            debug!(reservation_id = hold.id, "Hold already reclaimed");
            return Ok(Reclaim::Skipped);
        };

        if !transitions::is_reclaimable(&current, now) {
            debug!(reservation_id = hold.id, state = %current.state, "Hold no longer reclaimable");
            return Ok(Reclaim::Skipped);
        }

        tx.delete_reservation(current.id).await?;

        let outcome = match event {
            Some(_) => {
                ledger::increment(&mut tx, current.event_id).await?;
                Reclaim::Reclaimed
            }
            None => {
                warn!(
                    reservation_id = current.id,
                    event_id = current.event_id,
                    "Expired hold references a missing event; deleting without crediting capacity"
                );
                Reclaim::Orphaned
            }
        };

        tx.commit().await?;
        Ok(outcome)
    }

    /// Sweep on every tick of the configured interval until `shutdown` is cancelled.
    pub async fn run(self, shutdown: CancellationToken) {
        info!(interval = ?self.interval, batch_size = self.batch_size, "Starting expiry sweeper");

        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("Expiry sweeper shutting down");
                    break;
                }
                _ = ticker.tick() => {
                    match self.sweep_once().await {
                        Ok(report) if report.examined > 0 => {
                            info!(
                                examined = report.examined,
                                reclaimed = report.reclaimed,
                                orphaned = report.orphaned,
                                skipped = report.skipped,
                                failed = report.failed,
                                "Expiry sweep complete"
                            );
                        }
                        Ok(_) => debug!("No expired holds"),
                        Err(e) => error!("Expiry sweep failed: {:#}", e),
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::events::EventCreateDBRequest;
    use crate::reservations::clock::ManualClock;
    use crate::reservations::service::ReservationService;
    use crate::storage::InMemoryStorage;
    use chrono::TimeDelta;

    struct Fixture {
        storage: InMemoryStorage,
        clock: ManualClock,
        service: ReservationService<InMemoryStorage>,
        sweeper: ExpirySweeper<InMemoryStorage>,
    }

    fn fixture(batch_size: i64) -> Fixture {
        let storage = InMemoryStorage::new();
        let clock = ManualClock::new(Utc::now());
        let service = ReservationService::builder()
            .storage(storage.clone())
            .clock(Arc::new(clock.clone()))
            .hold_ttl(TimeDelta::minutes(5))
            .build();
        let sweeper = ExpirySweeper::new(storage.clone(), Arc::new(clock.clone()), Duration::from_secs(60), batch_size);
        Fixture {
            storage,
            clock,
            service,
            sweeper,
        }
    }

    async fn event(f: &Fixture, capacity: i32) -> i64 {
        f.storage
            .create_event(&EventCreateDBRequest {
                title: "Sweep".to_string(),
                capacity,
                start_date: None,
                end_date: None,
                is_active: true,
            })
            .await
            .unwrap()
            .id
    }

    #[tokio::test]
    async fn orphaned_hold_is_deleted_without_credit() {
        let f = fixture(100);
        let event_id = event(&f, 1).await;
        let hold = f.service.place_hold(1, event_id).await.unwrap();

        f.storage.remove_event_unchecked(event_id);
        f.clock.advance(TimeDelta::minutes(6));

        let report = f.sweeper.sweep_once().await.unwrap();
        assert_eq!(report.orphaned, 1);
        assert_eq!(report.reclaimed, 0);
        assert!(f.storage.get_reservation(hold.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn invariant_violation_fails_only_that_hold() {
        let f = fixture(100);
        let broken = event(&f, 1).await;
        let healthy = event(&f, 1).await;
        let stuck = f.service.place_hold(1, broken).await.unwrap();
        f.service.place_hold(1, healthy).await.unwrap();

        // Ledger says the unit is free although a hold still owns it
        f.storage.set_available_capacity_unchecked(broken, 1);
        f.clock.advance(TimeDelta::minutes(5));

        let report = f.sweeper.sweep_once().await.unwrap();
        assert_eq!(report.examined, 2);
        assert_eq!(report.failed, 1);
        assert_eq!(report.reclaimed, 1);

        // Rolled back: the hold is still there for the next pass
        assert!(f.storage.get_reservation(stuck.id).await.unwrap().is_some());
        assert_eq!(f.storage.get_event(healthy).await.unwrap().unwrap().available_capacity, 1);
    }

    #[tokio::test]
    async fn batch_size_bounds_each_pass() {
        let f = fixture(2);
        let event_id = event(&f, 5).await;
        for user in 0..5 {
            f.service.place_hold(user, event_id).await.unwrap();
        }
        f.clock.advance(TimeDelta::minutes(10));

        assert_eq!(f.sweeper.sweep_once().await.unwrap().reclaimed, 2);
        assert_eq!(f.sweeper.sweep_once().await.unwrap().reclaimed, 2);
        assert_eq!(f.sweeper.sweep_once().await.unwrap().reclaimed, 1);
        assert_eq!(f.sweeper.sweep_once().await.unwrap(), SweepReport::default());
        assert_eq!(f.storage.get_event(event_id).await.unwrap().unwrap().available_capacity, 5);
    }

    #[tokio::test]
    async fn failing_hold_does_not_starve_later_holds() {
        let f = fixture(1);
        let broken = event(&f, 1).await;
        let healthy = event(&f, 1).await;
        let stuck = f.service.place_hold(1, broken).await.unwrap();
        f.clock.advance(TimeDelta::seconds(30));
        let later = f.service.place_hold(2, healthy).await.unwrap();

        f.storage.set_available_capacity_unchecked(broken, 1);
        f.clock.advance(TimeDelta::minutes(10));

        // The broken hold sorts first and fails, the same pass moves past it
        let report = f.sweeper.sweep_once().await.unwrap();
        assert_eq!(report.examined, 2);
        assert_eq!(report.failed, 1);
        assert_eq!(report.reclaimed, 1);

        assert!(f.storage.get_reservation(stuck.id).await.unwrap().is_some());
        assert!(f.storage.get_reservation(later.id).await.unwrap().is_none());
        assert_eq!(f.storage.get_event(healthy).await.unwrap().unwrap().available_capacity, 1);
    }

    #[tokio::test]
    async fn confirmed_hold_is_never_reclaimed() {
        let f = fixture(100);
        let event_id = event(&f, 1).await;
        let hold = f.service.place_hold(1, event_id).await.unwrap();

        f.clock.advance(TimeDelta::minutes(5) - TimeDelta::seconds(1));
        f.service.confirm_hold(hold.id, 1).await.unwrap();
        f.clock.advance(TimeDelta::days(30));

        let report = f.sweeper.sweep_once().await.unwrap();
        assert_eq!(report, SweepReport::default());
        assert!(f.storage.get_reservation(hold.id).await.unwrap().is_some());
        assert_eq!(f.storage.get_event(event_id).await.unwrap().unwrap().available_capacity, 0);
    }

    #[tokio::test]
    async fn stale_candidate_is_skipped_under_lock() {
        let f = fixture(100);
        let event_id = event(&f, 1).await;
        let hold = f.service.place_hold(1, event_id).await.unwrap();
        f.clock.advance(TimeDelta::minutes(5));

        let candidates = f.storage.find_expired_holds(f.clock.now(), None, 100).await.unwrap();
        assert_eq!(candidates.len(), 1);

        // Someone else reclaims it between the scan and the lock
        assert_eq!(f.sweeper.sweep_once().await.unwrap().reclaimed, 1);

        let outcome = f.sweeper.reclaim(&candidates[0], f.clock.now()).await.unwrap();
        assert_eq!(outcome, Reclaim::Skipped);
        assert!(f.storage.get_reservation(hold.id).await.unwrap().is_none());
        assert_eq!(f.storage.get_event(event_id).await.unwrap().unwrap().available_capacity, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn run_sweeps_on_interval_and_stops_on_cancel() {
        let f = fixture(100);
        let event_id = event(&f, 1).await;
        f.service.place_hold(1, event_id).await.unwrap();
        f.clock.advance(TimeDelta::minutes(5));

        let shutdown = CancellationToken::new();
        let handle = tokio::spawn(f.sweeper.run(shutdown.clone()));

        // First tick fires immediately
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(f.storage.get_event(event_id).await.unwrap().unwrap().available_capacity, 1);

        shutdown.cancel();
        handle.await.unwrap();
    }
}
