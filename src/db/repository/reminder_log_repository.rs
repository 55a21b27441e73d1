use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::db::models::{EventReminder, ReminderClaim, ReminderFailureUpdate, ReminderStatus};
use crate::error::{AppError, AppResult};
use crate::services::reminders::ReminderLog;

/// Repository for the `event_reminders` log.
///
/// Implementation notes:
/// - `event_id` is UNIQUE, so the log holds at most one row per event.
/// - Claiming is a single `INSERT ... ON CONFLICT(event_id) DO UPDATE ... WHERE ... RETURNING`
///   statement. A row comes back only if this caller inserted it or took it over,
///   which makes check-and-mark one indivisible step even across processes.
/// - A row with `sent = 1` is never updated again.
#[derive(Clone)]
pub struct ReminderLogRepository {
    pool: SqlitePool,
}

impl ReminderLogRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn find_sent(&self, event_id: &str) -> AppResult<Option<EventReminder>> {
        sqlx::query_as::<_, EventReminder>(
            r#"
            SELECT
                id, event_id, recipient_email, scheduled_for, sent, sent_at,
                status, attempts, last_error, next_attempt_at, claimed_at,
                created_at, updated_at
            FROM event_reminders
            WHERE event_id = ? AND sent = 1
            "#,
        )
        .bind(event_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(AppError::Database)
    }

    pub async fn find(&self, event_id: &str) -> AppResult<Option<EventReminder>> {
        sqlx::query_as::<_, EventReminder>(
            r#"
            SELECT
                id, event_id, recipient_email, scheduled_for, sent, sent_at,
                status, attempts, last_error, next_attempt_at, claimed_at,
                created_at, updated_at
            FROM event_reminders
            WHERE event_id = ?
            "#,
        )
        .bind(event_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(AppError::Database)
    }

    /// Try to take the right to send the reminder for `claim.event_id`.
    ///
    /// Succeeds when no row exists yet, or when the existing row is unsent, not
    /// abandoned, past its backoff, and not held by a live claim.
    pub async fn claim(&self, claim: &ReminderClaim) -> AppResult<Option<EventReminder>> {
        let id = Uuid::new_v4().to_string();

        sqlx::query_as::<_, EventReminder>(
            r#"
            INSERT INTO event_reminders (
                id, event_id, recipient_email, scheduled_for, sent, sent_at,
                status, attempts, last_error, next_attempt_at, claimed_at,
                created_at, updated_at
            )
            VALUES (?, ?, ?, ?, 0, NULL, ?, 1, NULL, ?, ?, ?, ?)
            ON CONFLICT(event_id) DO UPDATE SET
                status = excluded.status,
                attempts = event_reminders.attempts + 1,
                recipient_email = excluded.recipient_email,
                scheduled_for = excluded.scheduled_for,
                claimed_at = excluded.claimed_at,
                updated_at = excluded.updated_at
            WHERE event_reminders.sent = 0
              AND event_reminders.status != ?
              AND event_reminders.next_attempt_at <= excluded.claimed_at
              AND (
                    event_reminders.status != excluded.status
                    OR event_reminders.claimed_at IS NULL
                    OR event_reminders.claimed_at <= ?
              )
            RETURNING
                id, event_id, recipient_email, scheduled_for, sent, sent_at,
                status, attempts, last_error, next_attempt_at, claimed_at,
                created_at, updated_at
            "#,
        )
        .bind(id)
        .bind(&claim.event_id)
        .bind(&claim.recipient_email)
        .bind(claim.scheduled_for)
        .bind(ReminderStatus::Sending.as_str())
        .bind(claim.now) // next_attempt_at
        .bind(claim.now) // claimed_at
        .bind(claim.now) // created_at
        .bind(claim.now) // updated_at
        .bind(ReminderStatus::Abandoned.as_str())
        .bind(claim.stale_before)
        .fetch_optional(&self.pool)
        .await
        .map_err(AppError::Database)
    }

    /// Flip a claimed row to sent. Fails if the row is missing or already sent.
    pub async fn mark_sent(
        &self,
        event_id: &str,
        sent_at: DateTime<Utc>,
    ) -> AppResult<EventReminder> {
        sqlx::query_as::<_, EventReminder>(
            r#"
            UPDATE event_reminders
            SET sent = 1, sent_at = ?, status = ?, last_error = NULL, updated_at = ?
            WHERE event_id = ? AND sent = 0
            RETURNING
                id, event_id, recipient_email, scheduled_for, sent, sent_at,
                status, attempts, last_error, next_attempt_at, claimed_at,
                created_at, updated_at
            "#,
        )
        .bind(sent_at)
        .bind(ReminderStatus::Sent.as_str())
        .bind(sent_at)
        .bind(event_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(AppError::Database)?
        .ok_or_else(|| AppError::NotFound(format!("unsent reminder for event {}", event_id)))
    }

    /// Release a claim after a failed send. The row becomes `failed` and is
    /// retried after `next_attempt_at`, or `abandoned` once attempts run out or
    /// the error is permanent.
    pub async fn record_failure(
        &self,
        update: &ReminderFailureUpdate,
    ) -> AppResult<EventReminder> {
        sqlx::query_as::<_, EventReminder>(
            r#"
            UPDATE event_reminders
            SET
                status = CASE WHEN ? OR attempts >= ? THEN ? ELSE ? END,
                last_error = ?,
                next_attempt_at = ?,
                claimed_at = NULL,
                updated_at = ?
            WHERE event_id = ? AND sent = 0
            RETURNING
                id, event_id, recipient_email, scheduled_for, sent, sent_at,
                status, attempts, last_error, next_attempt_at, claimed_at,
                created_at, updated_at
            "#,
        )
        .bind(update.permanent)
        .bind(update.max_attempts)
        .bind(ReminderStatus::Abandoned.as_str())
        .bind(ReminderStatus::Failed.as_str())
        .bind(&update.error)
        .bind(update.next_attempt_at)
        .bind(update.now)
        .bind(&update.event_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(AppError::Database)?
        .ok_or_else(|| {
            AppError::NotFound(format!("unsent reminder for event {}", update.event_id))
        })
    }
}

#[async_trait]
impl ReminderLog for ReminderLogRepository {
    async fn find_sent(&self, event_id: &str) -> AppResult<Option<EventReminder>> {
        ReminderLogRepository::find_sent(self, event_id).await
    }

    async fn find(&self, event_id: &str) -> AppResult<Option<EventReminder>> {
        ReminderLogRepository::find(self, event_id).await
    }

    async fn claim(&self, claim: &ReminderClaim) -> AppResult<Option<EventReminder>> {
        ReminderLogRepository::claim(self, claim).await
    }

    async fn mark_sent(
        &self,
        event_id: &str,
        sent_at: DateTime<Utc>,
    ) -> AppResult<EventReminder> {
        ReminderLogRepository::mark_sent(self, event_id, sent_at).await
    }

    async fn record_failure(
        &self,
        update: &ReminderFailureUpdate,
    ) -> AppResult<EventReminder> {
        ReminderLogRepository::record_failure(self, update).await
    }
}
