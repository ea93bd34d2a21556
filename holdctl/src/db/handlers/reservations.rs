use chrono::{DateTime, Utc};
use sqlx::PgConnection;
use tracing::instrument;

use crate::{
    db::{
        errors::Result,
        models::reservations::{ReservationCounts, ReservationCreateDBRequest, ReservationDBResponse},
    },
    types::{EventId, ReservationId},
};

pub struct Reservations<'c> {
    db: &'c mut PgConnection,
}

impl<'c> Reservations<'c> {
    pub fn new(db: &'c mut PgConnection) -> Self {
        Self { db }
    }

    #[instrument(skip(self, request), fields(user_id = request.user_id, event_id = request.event_id), err)]
    pub async fn create_hold(&mut self, request: &ReservationCreateDBRequest) -> Result<ReservationDBResponse> {
        let reservation = sqlx::query_as::<_, ReservationDBResponse>(
            r#"
            INSERT INTO reservations (user_id, event_id, state, expires_at, created_at)
            VALUES ($1, $2, 'HOLD', $3, $4)
            RETURNING id, user_id, event_id, state, expires_at, created_at
            "#,
        )
        .bind(request.user_id)
        .bind(request.event_id)
        .bind(request.expires_at)
        .bind(request.created_at)
        .fetch_one(&mut *self.db)
        .await?;

        Ok(reservation)
    }

    #[instrument(skip(self), err)]
    pub async fn get_by_id(&mut self, id: ReservationId) -> Result<Option<ReservationDBResponse>> {
        let reservation = sqlx::query_as::<_, ReservationDBResponse>(
            r#"
            SELECT id, user_id, event_id, state, expires_at, created_at
            FROM reservations
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&mut *self.db)
        .await?;

        Ok(reservation)
    }

    /// Read a reservation and take its row lock until the enclosing transaction ends.
    ///
    /// Returns `None` if the row was deleted by a transaction that committed while we waited.
    #[instrument(skip(self), err)]
    pub async fn get_for_update(&mut self, id: ReservationId) -> Result<Option<ReservationDBResponse>> {
        let reservation = sqlx::query_as::<_, ReservationDBResponse>(
            r#"
            SELECT id, user_id, event_id, state, expires_at, created_at
            FROM reservations
            WHERE id = $1
            FOR UPDATE
            "#,
        )
        .bind(id)
        .fetch_optional(&mut *self.db)
        .await?;

        Ok(reservation)
    }

    #[instrument(skip(self), err)]
    pub async fn confirm(&mut self, id: ReservationId) -> Result<ReservationDBResponse> {
        let reservation = sqlx::query_as::<_, ReservationDBResponse>(
            r#"
            UPDATE reservations
            SET state = 'CONFIRMED', expires_at = NULL
            WHERE id = $1
            RETURNING id, user_id, event_id, state, expires_at, created_at
            "#,
        )
        .bind(id)
        .fetch_one(&mut *self.db)
        .await?;

        Ok(reservation)
    }

    #[instrument(skip(self), err)]
    pub async fn delete(&mut self, id: ReservationId) -> Result<bool> {
        let result = sqlx::query("DELETE FROM reservations WHERE id = $1")
            .bind(id)
            .execute(&mut *self.db)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    #[instrument(skip(self), err)]
    pub async fn counts_for_event(&mut self, event_id: EventId) -> Result<ReservationCounts> {
        let counts = sqlx::query_as::<_, ReservationCounts>(
            r#"
            SELECT
                COUNT(*) FILTER (WHERE state = 'HOLD') AS hold_count,
                COUNT(*) FILTER (WHERE state = 'CONFIRMED') AS confirmed_count
            FROM reservations
            WHERE event_id = $1
            "#,
        )
        .bind(event_id)
        .fetch_one(&mut *self.db)
        .await?;

        Ok(counts)
    }

    /// HOLD reservations whose deadline is at or before `now`, oldest deadline first,
    /// starting strictly after the `(expires_at, id)` position `after` when given
    #[instrument(skip(self), err)]
    pub async fn list_expired_holds(
        &mut self,
        now: DateTime<Utc>,
        after: Option<(DateTime<Utc>, ReservationId)>,
        limit: i64,
    ) -> Result<Vec<ReservationDBResponse>> {
        let (after_expires_at, after_id) = after.unzip();
        let reservations = sqlx::query_as::<_, ReservationDBResponse>(
            r#"
            SELECT id, user_id, event_id, state, expires_at, created_at
            FROM reservations
            WHERE state = 'HOLD'
              AND expires_at <= $1
              AND ($2::timestamptz IS NULL OR (expires_at, id) > ($2, $3))
            ORDER BY expires_at ASC, id ASC
            LIMIT $4
            "#,
        )
        .bind(now)
        .bind(after_expires_at)
        .bind(after_id)
        .bind(limit)
        .fetch_all(&mut *self.db)
        .await?;

        Ok(reservations)
    }
}
