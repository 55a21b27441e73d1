use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::db::models::{CreateEvent, Event, DEFAULT_REMINDER_MINUTES};
use crate::error::{AppError, AppResult};
use crate::services::reminders::EventStore;

// ============================================================================
// Event Repository
// ============================================================================

#[derive(Clone)]
pub struct EventRepository {
    pool: SqlitePool,
}

impl EventRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Insert a new event owned by `created_by` after validating its invariants.
    #[allow(dead_code)]
    pub async fn create(&self, created_by: &str, event: CreateEvent) -> AppResult<Event> {
        event.validate().map_err(AppError::Validation)?;

        let id = Uuid::new_v4().to_string();
        let now = Utc::now();
        let reminder_minutes = event.reminder_minutes.unwrap_or(DEFAULT_REMINDER_MINUTES);

        sqlx::query_as::<_, Event>(
            r#"
            INSERT INTO events (
                id, title, description, location, start_time, end_time,
                organizer, organizer_email, reminder_minutes, created_by, created_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            RETURNING
                id, title, description, location, start_time, end_time,
                organizer, organizer_email, reminder_minutes, created_by, created_at
            "#,
        )
        .bind(id)
        .bind(event.title.trim())
        .bind(event.description)
        .bind(event.location)
        .bind(event.start_time)
        .bind(event.end_time)
        .bind(event.organizer.trim())
        .bind(event.organizer_email.trim())
        .bind(reminder_minutes)
        .bind(created_by)
        .bind(now)
        .fetch_one(&self.pool)
        .await
        .map_err(AppError::Database)
    }

    #[allow(dead_code)]
    pub async fn find_by_id(&self, id: &str) -> AppResult<Option<Event>> {
        sqlx::query_as::<_, Event>(
            r#"
            SELECT
                id, title, description, location, start_time, end_time,
                organizer, organizer_email, reminder_minutes, created_by, created_at
            FROM events
            WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(AppError::Database)
    }

    /// Events whose start time falls in `[from, to]`, earliest first.
    pub async fn find_starting_between(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> AppResult<Vec<Event>> {
        sqlx::query_as::<_, Event>(
            r#"
            SELECT
                id, title, description, location, start_time, end_time,
                organizer, organizer_email, reminder_minutes, created_by, created_at
            FROM events
            WHERE start_time >= ? AND start_time <= ?
            ORDER BY start_time ASC
            "#,
        )
        .bind(from)
        .bind(to)
        .fetch_all(&self.pool)
        .await
        .map_err(AppError::Database)
    }

    /// Delete an event. Only its creator may do so.
    #[allow(dead_code)]
    pub async fn delete(&self, id: &str, requested_by: &str) -> AppResult<()> {
        let event = self
            .find_by_id(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("event {}", id)))?;

        if event.created_by != requested_by {
            return Err(AppError::Forbidden);
        }

        let result = sqlx::query("DELETE FROM events WHERE id = ? AND created_by = ?")
            .bind(id)
            .bind(requested_by)
            .execute(&self.pool)
            .await
            .map_err(AppError::Database)?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("event {}", id)));
        }

        Ok(())
    }
}

#[async_trait]
impl EventStore for EventRepository {
    async fn find_starting_between(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> AppResult<Vec<Event>> {
        EventRepository::find_starting_between(self, from, to).await
    }
}
