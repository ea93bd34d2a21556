//! PostgreSQL-backed storage.
//!
//! Row locks are `SELECT ... FOR UPDATE` held by a `sqlx::Transaction`; dropping the transaction
//! rolls it back and releases them.

use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres};

use super::{ExpiryCursor, Storage, StorageTransaction};
use crate::db::errors::Result;
use crate::db::handlers::{Events, Reservations};
use crate::db::models::{
    events::{EventCreateDBRequest, EventDBResponse},
    reservations::{ReservationCounts, ReservationCreateDBRequest, ReservationDBResponse},
};
use crate::types::{EventId, ReservationId};

#[derive(Clone)]
pub struct PostgresStorage {
    pool: PgPool,
}

impl PostgresStorage {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

pub struct PostgresTransaction {
    tx: sqlx::Transaction<'static, Postgres>,
}

impl Storage for PostgresStorage {
    type Transaction = PostgresTransaction;

    async fn begin(&self) -> Result<PostgresTransaction> {
        let tx = self.pool.begin().await?;
        Ok(PostgresTransaction { tx })
    }

    async fn create_event(&self, request: &EventCreateDBRequest) -> Result<EventDBResponse> {
        let mut conn = self.pool.acquire().await?;
        Events::new(&mut conn).create(request).await
    }

    async fn get_event(&self, id: EventId) -> Result<Option<EventDBResponse>> {
        let mut conn = self.pool.acquire().await?;
        Events::new(&mut conn).get_by_id(id).await
    }

    async fn get_reservation(&self, id: ReservationId) -> Result<Option<ReservationDBResponse>> {
        let mut conn = self.pool.acquire().await?;
        Reservations::new(&mut conn).get_by_id(id).await
    }

    async fn reservation_counts(&self, event_id: EventId) -> Result<ReservationCounts> {
        let mut conn = self.pool.acquire().await?;
        Reservations::new(&mut conn).counts_for_event(event_id).await
    }

    async fn find_expired_holds(
        &self,
        now: DateTime<Utc>,
        after: Option<ExpiryCursor>,
        limit: i64,
    ) -> Result<Vec<ReservationDBResponse>> {
        let mut conn = self.pool.acquire().await?;
        Reservations::new(&mut conn).list_expired_holds(now, after, limit).await
    }
}

impl StorageTransaction for PostgresTransaction {
    async fn lock_event(&mut self, id: EventId) -> Result<Option<EventDBResponse>> {
        Events::new(&mut self.tx).get_for_update(id).await
    }

    async fn set_available_capacity(&mut self, id: EventId, available_capacity: i32) -> Result<EventDBResponse> {
        Events::new(&mut self.tx).set_available_capacity(id, available_capacity).await
    }

    async fn insert_hold(&mut self, request: &ReservationCreateDBRequest) -> Result<ReservationDBResponse> {
        Reservations::new(&mut self.tx).create_hold(request).await
    }

    async fn lock_reservation(&mut self, id: ReservationId) -> Result<Option<ReservationDBResponse>> {
        Reservations::new(&mut self.tx).get_for_update(id).await
    }

    async fn confirm_reservation(&mut self, id: ReservationId) -> Result<ReservationDBResponse> {
        Reservations::new(&mut self.tx).confirm(id).await
    }

    async fn delete_reservation(&mut self, id: ReservationId) -> Result<bool> {
        Reservations::new(&mut self.tx).delete(id).await
    }

    async fn commit(self) -> Result<()> {
        self.tx.commit().await?;
        Ok(())
    }
}
