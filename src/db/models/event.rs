use chrono::{DateTime, Duration, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Lead time used when an event is created without an explicit reminder setting.
pub const DEFAULT_REMINDER_MINUTES: i64 = 60;

lazy_static::lazy_static! {
    static ref EMAIL_RE: Regex =
        Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("email pattern is valid");
}

/// Loose shape check for an email address (`local@domain.tld`).
pub fn is_email_shaped(value: &str) -> bool {
    EMAIL_RE.is_match(value.trim())
}

// ============================================================================
// Event Models
// ============================================================================

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Event {
    pub id: String,
    pub title: String,
    pub description: Option<String>,
    pub location: Option<String>,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    /// Organizer display name
    pub organizer: String,
    pub organizer_email: String,
    pub reminder_minutes: i64,
    /// Owning user id
    pub created_by: String,
    pub created_at: DateTime<Utc>,
}

impl Event {
    /// Moment the reminder window opens (`start_time - reminder_minutes`).
    ///
    /// `None` when the lead time is not positive or overflows the calendar.
    pub fn reminder_time(&self) -> Option<DateTime<Utc>> {
        if self.reminder_minutes <= 0 {
            return None;
        }
        Duration::try_minutes(self.reminder_minutes)
            .and_then(|lead| self.start_time.checked_sub_signed(lead))
    }

    /// Whether `now` falls inside `[start_time - reminder_minutes, start_time]`.
    /// Both ends are inclusive.
    pub fn is_reminder_due(&self, now: DateTime<Utc>) -> bool {
        match self.reminder_time() {
            Some(reminder_time) => reminder_time <= now && now <= self.start_time,
            None => false,
        }
    }

    /// Checks the fields the reminder job depends on. Rows written by other
    /// clients of the store are not guaranteed to have passed `CreateEvent::validate`.
    pub fn validate_for_reminder(&self) -> Result<(), String> {
        if self.organizer_email.trim().is_empty() {
            return Err("organizer email is missing".to_string());
        }
        if !is_email_shaped(&self.organizer_email) {
            return Err(format!(
                "organizer email '{}' is not a valid address",
                self.organizer_email
            ));
        }
        if self.reminder_minutes <= 0 {
            return Err(format!(
                "reminder lead time must be positive, got {}",
                self.reminder_minutes
            ));
        }
        if self.reminder_time().is_none() {
            return Err(format!(
                "reminder lead time {} is out of range",
                self.reminder_minutes
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateEvent {
    pub title: String,
    pub description: Option<String>,
    pub location: Option<String>,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub organizer: String,
    pub organizer_email: String,
    /// Defaults to `DEFAULT_REMINDER_MINUTES` when omitted.
    pub reminder_minutes: Option<i64>,
}

impl CreateEvent {
    pub fn validate(&self) -> Result<(), String> {
        if self.title.trim().is_empty() {
            return Err("title cannot be empty".to_string());
        }
        if self.organizer.trim().is_empty() {
            return Err("organizer cannot be empty".to_string());
        }
        if !is_email_shaped(&self.organizer_email) {
            return Err(format!(
                "organizer email '{}' is not a valid address",
                self.organizer_email
            ));
        }
        if self.start_time >= self.end_time {
            return Err("start time must be before end time".to_string());
        }
        if let Some(minutes) = self.reminder_minutes {
            if minutes <= 0 {
                return Err("reminder minutes must be positive".to_string());
            }
        }
        Ok(())
    }
}
