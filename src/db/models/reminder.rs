use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Delivery state of a reminder log row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReminderStatus {
    /// Claimed by a run that is currently talking to the email transport.
    Sending,
    /// Delivery confirmed; terminal.
    Sent,
    /// Last attempt failed; eligible again once `next_attempt_at` passes.
    Failed,
    /// Attempts exhausted or permanent transport error; terminal.
    Abandoned,
}

impl ReminderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReminderStatus::Sending => "sending",
            ReminderStatus::Sent => "sent",
            ReminderStatus::Failed => "failed",
            ReminderStatus::Abandoned => "abandoned",
        }
    }
}

/// One row of the `event_reminders` log. At most one exists per event.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct EventReminder {
    pub id: String,
    pub event_id: String,
    pub recipient_email: String,
    /// `start_time - reminder_minutes` of the event at claim time.
    pub scheduled_for: DateTime<Utc>,
    pub sent: bool,
    pub sent_at: Option<DateTime<Utc>>,
    pub status: String,
    pub attempts: i32,
    pub last_error: Option<String>,
    pub next_attempt_at: DateTime<Utc>,
    pub claimed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Input for the atomic claim that precedes a send attempt.
#[derive(Debug, Clone)]
pub struct ReminderClaim {
    pub event_id: String,
    pub recipient_email: String,
    pub scheduled_for: DateTime<Utc>,
    pub now: DateTime<Utc>,
    /// Claims made at or before this instant are considered stale and may be taken over.
    pub stale_before: DateTime<Utc>,
}

/// Outcome of a failed send, written back to the log.
#[derive(Debug, Clone)]
pub struct ReminderFailureUpdate {
    pub event_id: String,
    pub error: String,
    pub next_attempt_at: DateTime<Utc>,
    /// When the failure was observed; stored as `updated_at`.
    pub now: DateTime<Utc>,
    pub max_attempts: i32,
    /// Permanent errors abandon the reminder regardless of remaining attempts.
    pub permanent: bool,
}
