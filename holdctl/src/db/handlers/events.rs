use sqlx::PgConnection;
use tracing::instrument;

use crate::{
    db::{
        errors::Result,
        models::events::{EventCreateDBRequest, EventDBResponse},
    },
    types::EventId,
};

pub struct Events<'c> {
    db: &'c mut PgConnection,
}

impl<'c> Events<'c> {
    pub fn new(db: &'c mut PgConnection) -> Self {
        Self { db }
    }

    /// Insert a new event with its full capacity available
    #[instrument(skip(self, request), fields(title = %request.title, capacity = request.capacity), err)]
    pub async fn create(&mut self, request: &EventCreateDBRequest) -> Result<EventDBResponse> {
        let event = sqlx::query_as::<_, EventDBResponse>(
            r#"
            INSERT INTO events (title, capacity, available_capacity, start_date, end_date, is_active)
            VALUES ($1, $2, $2, $3, $4, $5)
            RETURNING id, title, capacity, available_capacity, start_date, end_date, is_active
            "#,
        )
        .bind(&request.title)
        .bind(request.capacity)
        .bind(request.start_date)
        .bind(request.end_date)
        .bind(request.is_active)
        .fetch_one(&mut *self.db)
        .await?;

        Ok(event)
    }

    #[instrument(skip(self), err)]
    pub async fn get_by_id(&mut self, id: EventId) -> Result<Option<EventDBResponse>> {
        let event = sqlx::query_as::<_, EventDBResponse>(
            r#"
            SELECT id, title, capacity, available_capacity, start_date, end_date, is_active
            FROM events
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&mut *self.db)
        .await?;

        Ok(event)
    }

    /// Read an event and take its row lock until the enclosing transaction ends
    #[instrument(skip(self), err)]
    pub async fn get_for_update(&mut self, id: EventId) -> Result<Option<EventDBResponse>> {
        let event = sqlx::query_as::<_, EventDBResponse>(
            r#"
            SELECT id, title, capacity, available_capacity, start_date, end_date, is_active
            FROM events
            WHERE id = $1
            FOR UPDATE
            "#,
        )
        .bind(id)
        .fetch_optional(&mut *self.db)
        .await?;

        Ok(event)
    }

    #[instrument(skip(self), err)]
    pub async fn set_available_capacity(&mut self, id: EventId, available_capacity: i32) -> Result<EventDBResponse> {
        let event = sqlx::query_as::<_, EventDBResponse>(
            r#"
            UPDATE events
            SET available_capacity = $2
            WHERE id = $1
            RETURNING id, title, capacity, available_capacity, start_date, end_date, is_active
            "#,
        )
        .bind(id)
        .bind(available_capacity)
        .fetch_one(&mut *self.db)
        .await?;

        Ok(event)
    }
}
