//! Reminder dispatch job.
//!
//! Each run looks at events starting within the lookahead span, picks the ones
//! whose reminder window contains "now", and emails the organizer once per
//! event. The reminder log row for an event is claimed atomically before the
//! send and flipped to `sent` only after the transport confirms delivery, so
//! overlapping runs cannot double-send and failed sends are retried later.

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use crate::config::Config;
use crate::db::{Event, EventReminder, ReminderClaim, ReminderFailureUpdate, ReminderStatus};
use crate::error::{AppError, AppResult};
use crate::services::email::{is_retryable_error, render_reminder, EmailTransport};

pub trait Clock: Send + Sync + 'static {
    fn now(&self) -> DateTime<Utc>;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

#[async_trait]
pub trait EventStore: Send + Sync + 'static {
    async fn find_starting_between(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> AppResult<Vec<Event>>;
}

#[async_trait]
pub trait ReminderLog: Send + Sync + 'static {
    async fn find_sent(&self, event_id: &str) -> AppResult<Option<EventReminder>>;

    /// The log row for an event in any state.
    async fn find(&self, event_id: &str) -> AppResult<Option<EventReminder>>;

    /// Returns `None` when another run holds the event or it is not claimable yet.
    async fn claim(&self, claim: &ReminderClaim) -> AppResult<Option<EventReminder>>;

    async fn mark_sent(&self, event_id: &str, sent_at: DateTime<Utc>)
        -> AppResult<EventReminder>;

    async fn record_failure(&self, update: &ReminderFailureUpdate) -> AppResult<EventReminder>;
}

/// Tunables for a dispatcher, usually derived from `Config`.
#[derive(Debug, Clone)]
pub struct DispatchSettings {
    pub lookahead: Duration,
    pub call_timeout: std::time::Duration,
    pub claim_lease: Duration,
    pub initial_backoff_seconds: u64,
    pub max_backoff_seconds: u64,
    pub max_attempts: u32,
    pub from: String,
}

impl DispatchSettings {
    pub fn from_config(config: &Config) -> Self {
        let r = &config.reminders;
        Self {
            lookahead: Duration::minutes(r.lookahead_minutes),
            call_timeout: std::time::Duration::from_secs(r.call_timeout_seconds),
            claim_lease: Duration::seconds(r.claim_lease_seconds),
            initial_backoff_seconds: r.initial_backoff_seconds,
            max_backoff_seconds: r.max_backoff_seconds,
            max_attempts: r.max_attempts,
            from: config.email.from.clone(),
        }
    }
}

/// What happened to one candidate event during a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReminderOutcome {
    Sent,
    AlreadySent,
    NotDue,
    /// Another run holds the claim, or a previous failure is still backing off.
    InProgress,
    /// Attempts ran out or the provider rejected the message; never retried.
    Abandoned,
    Invalid(String),
    Failed { error: String, retryable: bool },
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ReminderFailure {
    pub event_id: String,
    pub error: String,
    pub retryable: bool,
}

/// Result of one run. `processed` counts candidate events, not sends.
#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct DispatchSummary {
    pub processed: usize,
    pub sent: usize,
    pub already_sent: usize,
    pub not_due: usize,
    pub in_progress: usize,
    pub abandoned: usize,
    pub invalid: usize,
    pub failures: Vec<ReminderFailure>,
}

impl DispatchSummary {
    fn record(&mut self, event_id: &str, outcome: ReminderOutcome) {
        match outcome {
            ReminderOutcome::Sent => self.sent += 1,
            ReminderOutcome::AlreadySent => self.already_sent += 1,
            ReminderOutcome::NotDue => self.not_due += 1,
            ReminderOutcome::InProgress => self.in_progress += 1,
            ReminderOutcome::Abandoned => self.abandoned += 1,
            ReminderOutcome::Invalid(_) => self.invalid += 1,
            ReminderOutcome::Failed { error, retryable } => self.failures.push(ReminderFailure {
                event_id: event_id.to_string(),
                error,
                retryable,
            }),
        }
    }
}

pub struct ReminderDispatcher {
    events: Arc<dyn EventStore>,
    reminders: Arc<dyn ReminderLog>,
    email: Arc<dyn EmailTransport>,
    clock: Arc<dyn Clock>,
    settings: DispatchSettings,
}

impl ReminderDispatcher {
    pub fn new(
        events: Arc<dyn EventStore>,
        reminders: Arc<dyn ReminderLog>,
        email: Arc<dyn EmailTransport>,
        clock: Arc<dyn Clock>,
        settings: DispatchSettings,
    ) -> Self {
        Self {
            events,
            reminders,
            email,
            clock,
            settings,
        }
    }

    /// Run the job once.
    ///
    /// Only a failing (or hung) event query fails the whole run. Everything
    /// that goes wrong for a single event is reported in the summary.
    pub async fn run(&self) -> AppResult<DispatchSummary> {
        let now = self.clock.now();
        let horizon = now + self.settings.lookahead;

        tracing::info!(
            "Checking for events that need reminders (start between {} and {})",
            now,
            horizon
        );

        let events = self
            .with_timeout("event query", self.events.find_starting_between(now, horizon))
            .await?;

        tracing::info!("Found {} candidate event(s) for reminders", events.len());

        let mut summary = DispatchSummary {
            processed: events.len(),
            ..Default::default()
        };

        for event in &events {
            let outcome = self.process_event(event, now).await;
            summary.record(&event.id, outcome);
        }

        tracing::info!(
            processed = summary.processed,
            sent = summary.sent,
            already_sent = summary.already_sent,
            in_progress = summary.in_progress,
            abandoned = summary.abandoned,
            invalid = summary.invalid,
            failed = summary.failures.len(),
            "Reminder dispatch finished"
        );

        Ok(summary)
    }

    async fn process_event(&self, event: &Event, now: DateTime<Utc>) -> ReminderOutcome {
        if let Err(reason) = event.validate_for_reminder() {
            tracing::warn!("Skipping event {} ({}): {}", event.id, event.title, reason);
            return ReminderOutcome::Invalid(reason);
        }

        let scheduled_for = match event.reminder_time() {
            Some(t) => t,
            None => return ReminderOutcome::Invalid("reminder time out of range".to_string()),
        };

        if !event.is_reminder_due(now) {
            tracing::debug!(
                "Event {} not due yet (reminder window opens at {})",
                event.id,
                scheduled_for
            );
            return ReminderOutcome::NotDue;
        }

        match self
            .with_timeout("reminder lookup", self.reminders.find_sent(&event.id))
            .await
        {
            Ok(Some(_)) => {
                tracing::debug!("Reminder for event {} already sent", event.id);
                return ReminderOutcome::AlreadySent;
            }
            Ok(None) => {}
            Err(e) => return Self::failed(event, e, true),
        }

        let claim = ReminderClaim {
            event_id: event.id.clone(),
            recipient_email: event.organizer_email.trim().to_string(),
            scheduled_for,
            now,
            stale_before: now - self.settings.claim_lease,
        };

        let claimed = match self
            .with_timeout("reminder claim", self.reminders.claim(&claim))
            .await
        {
            Ok(Some(row)) => row,
            Ok(None) => return self.unclaimable(event).await,
            Err(e) => return Self::failed(event, e, true),
        };

        let email = render_reminder(event, &self.settings.from);
        tracing::info!(
            "Sending reminder for event: {} ({}) to {}",
            event.title,
            event.id,
            email.to
        );

        match self.with_timeout("email send", self.email.send(&email)).await {
            Ok(receipt) => {
                match self
                    .with_timeout("reminder record", self.reminders.mark_sent(&event.id, now))
                    .await
                {
                    Ok(_) => {
                        tracing::info!(
                            "Reminder sent successfully for event {} (message id {})",
                            event.id,
                            receipt.id
                        );
                        ReminderOutcome::Sent
                    }
                    Err(e) => {
                        // The message went out; a later run may repeat it once the claim goes stale.
                        tracing::error!(
                            "Reminder for event {} delivered (message id {}) but not recorded: {:?}",
                            event.id,
                            receipt.id,
                            e
                        );
                        ReminderOutcome::Failed {
                            error: format!("delivered but not recorded: {}", e),
                            retryable: false,
                        }
                    }
                }
            }
            Err(e) => self.handle_send_failure(event, &claimed, e, now).await,
        }
    }

    async fn handle_send_failure(
        &self,
        event: &Event,
        claimed: &EventReminder,
        err: AppError,
        now: DateTime<Utc>,
    ) -> ReminderOutcome {
        let error = err.to_string();
        let retryable = is_retryable_error(&error);
        let next_attempt_at = now + self.retry_delay(claimed.attempts);

        let update = ReminderFailureUpdate {
            event_id: event.id.clone(),
            error: error.clone(),
            next_attempt_at,
            now,
            max_attempts: self.settings.max_attempts as i32,
            permanent: !retryable,
        };

        match self
            .with_timeout("reminder failure record", self.reminders.record_failure(&update))
            .await
        {
            Ok(row) if row.status == ReminderStatus::Abandoned.as_str() => {
                tracing::warn!(
                    "Reminder for event {} abandoned after {} attempt(s): {}",
                    event.id,
                    row.attempts,
                    error
                );
                ReminderOutcome::Failed {
                    error,
                    retryable: false,
                }
            }
            Ok(row) => {
                tracing::warn!(
                    "Reminder for event {} failed (attempt {}), retrying after {}: {}",
                    event.id,
                    row.attempts,
                    next_attempt_at,
                    error
                );
                ReminderOutcome::Failed {
                    error,
                    retryable: true,
                }
            }
            Err(e) => {
                // Claim stays in place until its lease expires.
                tracing::warn!(
                    "Failed to record send failure for event {}: {:?}",
                    event.id,
                    e
                );
                ReminderOutcome::Failed { error, retryable }
            }
        }
    }

    /// Classify an event whose claim was refused.
    async fn unclaimable(&self, event: &Event) -> ReminderOutcome {
        match self
            .with_timeout("reminder lookup", self.reminders.find(&event.id))
            .await
        {
            Ok(Some(row)) if row.status == ReminderStatus::Abandoned.as_str() => {
                tracing::debug!(
                    "Reminder for event {} was abandoned after {} attempt(s)",
                    event.id,
                    row.attempts
                );
                ReminderOutcome::Abandoned
            }
            Ok(Some(row)) if row.sent => ReminderOutcome::AlreadySent,
            Ok(_) => {
                tracing::debug!(
                    "Reminder for event {} is claimed by another run or backing off",
                    event.id
                );
                ReminderOutcome::InProgress
            }
            Err(e) => Self::failed(event, e, true),
        }
    }

    /// `min(max_backoff, initial_backoff * 2^(attempts - 1))`
    fn retry_delay(&self, attempts: i32) -> Duration {
        let mut delay = self.settings.initial_backoff_seconds;
        for _ in 1..attempts.max(1) {
            delay = delay.saturating_mul(2);
            if delay >= self.settings.max_backoff_seconds {
                break;
            }
        }
        let delay = delay.min(self.settings.max_backoff_seconds);
        Duration::seconds(delay.min(i64::MAX as u64) as i64)
    }

    async fn with_timeout<T, F>(&self, what: &str, fut: F) -> AppResult<T>
    where
        F: Future<Output = AppResult<T>>,
    {
        match tokio::time::timeout(self.settings.call_timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(AppError::Timeout(format!(
                "{} timed out after {:?}",
                what, self.settings.call_timeout
            ))),
        }
    }

    fn failed(event: &Event, err: AppError, retryable: bool) -> ReminderOutcome {
        tracing::warn!("Reminder for event {} failed: {:?}", event.id, err);
        ReminderOutcome::Failed {
            error: err.to_string(),
            retryable,
        }
    }
}


#[cfg(test)]
mod tests {
    use super::testing::*;
    use super::*;
    use crate::db::{test_pool, CreateEvent, EventRepository, ReminderLogRepository};
    use chrono::TimeZone;
    use sqlx::SqlitePool;

    struct Harness {
        pool: SqlitePool,
        events: Arc<EventRepository>,
        log: Arc<ReminderLogRepository>,
        transport: Arc<RecordingTransport>,
        clock: Arc<TestClock>,
        dispatcher: ReminderDispatcher,
    }

    async fn harness_with(
        transport: RecordingTransport,
        settings: DispatchSettings,
        now: DateTime<Utc>,
    ) -> Harness {
        let pool = test_pool().await;
        let events = Arc::new(EventRepository::new(pool.clone()));
        let log = Arc::new(ReminderLogRepository::new(pool.clone()));
        let transport = Arc::new(transport);
        let clock = Arc::new(TestClock::new(now));
        let dispatcher = ReminderDispatcher::new(
            events.clone(),
            log.clone(),
            transport.clone(),
            clock.clone(),
            settings,
        );
        Harness {
            pool,
            events,
            log,
            transport,
            clock,
            dispatcher,
        }
    }

    async fn harness(now: DateTime<Utc>) -> Harness {
        harness_with(RecordingTransport::default(), settings(), now).await
    }

    fn at(h: u32, m: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, h, m, s).unwrap()
    }

    async fn create_event(h: &Harness, start: DateTime<Utc>, reminder_minutes: i64) -> Event {
        h.events
            .create(
                "user-1",
                CreateEvent {
                    title: "Tech Talk".to_string(),
                    description: Some("Lightning talks".to_string()),
                    location: Some("Room 101".to_string()),
                    start_time: start,
                    end_time: start + Duration::hours(1),
                    organizer: "Ada".to_string(),
                    organizer_email: "a@b.edu".to_string(),
                    reminder_minutes: Some(reminder_minutes),
                },
            )
            .await
            .unwrap()
    }

    async fn reminder_rows(pool: &SqlitePool) -> i64 {
        sqlx::query_scalar("SELECT COUNT(*) FROM event_reminders")
            .fetch_one(pool)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn tech_talk_reminder_is_sent_exactly_once() {
        let h = harness(at(9, 31, 0)).await;
        let event = create_event(&h, at(10, 0, 0), 30).await;

        let first = h.dispatcher.run().await.unwrap();
        assert_eq!(first.processed, 1);
        assert_eq!(first.sent, 1);
        assert!(first.failures.is_empty());
        assert_eq!(h.transport.sent_count(), 1);

        let record = h.log.find_sent(&event.id).await.unwrap().unwrap();
        assert!(record.sent);
        assert_eq!(record.sent_at, Some(at(9, 31, 0)));
        assert_eq!(record.scheduled_for, at(9, 30, 0));
        assert_eq!(record.recipient_email, "a@b.edu");

        h.clock.set(at(9, 35, 0));
        let second = h.dispatcher.run().await.unwrap();
        assert_eq!(second.processed, 1);
        assert_eq!(second.sent, 0);
        assert_eq!(second.already_sent, 1);
        assert_eq!(h.transport.attempt_count(), 1);
        assert_eq!(reminder_rows(&h.pool).await, 1);
    }

    #[tokio::test]
    async fn back_to_back_runs_never_double_send() {
        let h = harness(at(9, 0, 0)).await;
        create_event(&h, at(9, 30, 0), 60).await;
        create_event(&h, at(9, 45, 0), 60).await;

        h.dispatcher.run().await.unwrap();
        let again = h.dispatcher.run().await.unwrap();

        assert_eq!(again.already_sent, 2);
        assert_eq!(h.transport.sent_count(), 2);
    }

    #[tokio::test]
    async fn window_opens_exactly_at_lead_time() {
        let mut wide = settings();
        wide.lookahead = Duration::minutes(120);
        let start = at(10, 0, 0);
        let h = harness_with(
            RecordingTransport::default(),
            wide,
            start - Duration::minutes(60) - Duration::seconds(1),
        )
        .await;
        create_event(&h, start, 60).await;

        let early = h.dispatcher.run().await.unwrap();
        assert_eq!(early.processed, 1);
        assert_eq!(early.not_due, 1);
        assert_eq!(h.transport.attempt_count(), 0);

        h.clock.set(start - Duration::minutes(60));
        let on_time = h.dispatcher.run().await.unwrap();
        assert_eq!(on_time.sent, 1);
    }

    #[tokio::test]
    async fn window_closes_at_start_time() {
        let start = at(10, 0, 0);
        let h = harness(start).await;
        create_event(&h, start, 60).await;

        let summary = h.dispatcher.run().await.unwrap();
        assert_eq!(summary.sent, 1);

        // Once the event has started it is outside both the prefilter and the window.
        let h = harness(start + Duration::seconds(1)).await;
        create_event(&h, start, 60).await;
        let late = h.dispatcher.run().await.unwrap();
        assert_eq!(late.processed, 0);
        assert_eq!(h.transport.attempt_count(), 0);
    }

    #[tokio::test]
    async fn events_beyond_lookahead_are_not_candidates() {
        let mut narrow = settings();
        narrow.lookahead = Duration::minutes(5);
        let now = at(8, 0, 0);
        let h = harness_with(RecordingTransport::default(), narrow, now).await;
        create_event(&h, now + Duration::hours(2), 60).await;

        let summary = h.dispatcher.run().await.unwrap();
        assert_eq!(summary.processed, 0);
        assert_eq!(h.transport.attempt_count(), 0);

        // Five minutes before start the event enters the horizon and is inside its window.
        h.clock.set(now + Duration::hours(2) - Duration::minutes(5));
        let summary = h.dispatcher.run().await.unwrap();
        assert_eq!(summary.processed, 1);
        assert_eq!(summary.sent, 1);
    }

    #[tokio::test]
    async fn event_store_outage_fails_the_run() {
        let pool = test_pool().await;
        let transport = Arc::new(RecordingTransport::default());
        let dispatcher = ReminderDispatcher::new(
            Arc::new(UnavailableEvents),
            Arc::new(ReminderLogRepository::new(pool.clone())),
            transport.clone(),
            Arc::new(TestClock::new(at(9, 31, 0))),
            settings(),
        );

        let err = dispatcher.run().await.unwrap_err();
        assert!(matches!(err, AppError::Database(_)));
        assert_eq!(transport.attempt_count(), 0);
        assert_eq!(reminder_rows(&pool).await, 0);
    }

    #[tokio::test]
    async fn failed_send_is_not_marked_and_retries_after_backoff() {
        let now = at(9, 31, 0);
        let h = harness_with(
            RecordingTransport::failing_with(&["Email API error (503): unavailable"]),
            settings(),
            now,
        )
        .await;
        let event = create_event(&h, at(10, 0, 0), 30).await;

        let first = h.dispatcher.run().await.unwrap();
        assert_eq!(first.sent, 0);
        assert_eq!(
            first.failures,
            vec![ReminderFailure {
                event_id: event.id.clone(),
                error: "Email error: Email API error (503): unavailable".to_string(),
                retryable: true,
            }]
        );
        assert!(h.log.find_sent(&event.id).await.unwrap().is_none());

        // Still backing off (default initial backoff is 60s).
        h.clock.set(now + Duration::seconds(30));
        let backing_off = h.dispatcher.run().await.unwrap();
        assert_eq!(backing_off.in_progress, 1);
        assert_eq!(h.transport.attempt_count(), 1);

        h.clock.set(now + Duration::seconds(60));
        let retried = h.dispatcher.run().await.unwrap();
        assert_eq!(retried.sent, 1);
        assert_eq!(h.transport.sent_count(), 1);
        let record = h.log.find_sent(&event.id).await.unwrap().unwrap();
        assert_eq!(record.attempts, 2);
        assert_eq!(record.sent_at, Some(now + Duration::seconds(60)));
    }

    #[tokio::test]
    async fn rejected_send_is_abandoned() {
        let now = at(9, 31, 0);
        let h = harness_with(
            RecordingTransport::failing_with(&["Email API error (422): invalid recipient"]),
            settings(),
            now,
        )
        .await;
        create_event(&h, at(10, 0, 0), 30).await;

        let first = h.dispatcher.run().await.unwrap();
        assert_eq!(first.failures.len(), 1);
        assert!(!first.failures[0].retryable);

        h.clock.set(now + Duration::minutes(20));
        let later = h.dispatcher.run().await.unwrap();
        assert_eq!(later.abandoned, 1);
        assert_eq!(later.in_progress, 0);
        assert!(later.failures.is_empty());
        assert_eq!(h.transport.attempt_count(), 1);
    }

    #[tokio::test]
    async fn exhausted_retries_are_reported_as_abandoned() {
        let mut two_tries = settings();
        two_tries.max_attempts = 2;
        let now = at(9, 31, 0);
        let h = harness_with(
            RecordingTransport::failing_with(&[
                "Email API error (503): unavailable",
                "Email API error (503): unavailable",
            ]),
            two_tries,
            now,
        )
        .await;
        create_event(&h, at(10, 0, 0), 30).await;

        let first = h.dispatcher.run().await.unwrap();
        assert!(first.failures[0].retryable);

        h.clock.set(now + Duration::seconds(60));
        let second = h.dispatcher.run().await.unwrap();
        assert_eq!(second.failures.len(), 1);
        assert!(!second.failures[0].retryable);

        h.clock.set(now + Duration::minutes(10));
        let third = h.dispatcher.run().await.unwrap();
        assert_eq!(third.abandoned, 1);
        assert_eq!(third.sent, 0);
        assert_eq!(h.transport.attempt_count(), 2);
    }

    #[tokio::test]
    async fn hung_transport_times_out_per_event() {
        let mut quick = settings();
        quick.call_timeout = std::time::Duration::from_millis(100);
        let transport = RecordingTransport {
            delay: Some(std::time::Duration::from_secs(2)),
            ..Default::default()
        };
        let h = harness_with(transport, quick, at(9, 31, 0)).await;
        let event = create_event(&h, at(10, 0, 0), 30).await;

        let summary = h.dispatcher.run().await.unwrap();
        assert_eq!(summary.sent, 0);
        assert_eq!(summary.failures.len(), 1);
        assert!(summary.failures[0].retryable);
        assert!(summary.failures[0].error.contains("timed out"));
        assert!(h.log.find_sent(&event.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn overlapping_runs_send_once() {
        let transport = RecordingTransport {
            delay: Some(std::time::Duration::from_millis(50)),
            ..Default::default()
        };
        let h = harness_with(transport, settings(), at(9, 31, 0)).await;
        create_event(&h, at(10, 0, 0), 30).await;

        let other = ReminderDispatcher::new(
            h.events.clone(),
            h.log.clone(),
            h.transport.clone(),
            h.clock.clone(),
            settings(),
        );

        let (a, b) = tokio::join!(h.dispatcher.run(), other.run());
        let (a, b) = (a.unwrap(), b.unwrap());

        assert_eq!(a.sent + b.sent, 1);
        assert_eq!(
            a.in_progress + b.in_progress + a.already_sent + b.already_sent,
            1
        );
        assert_eq!(a.abandoned + b.abandoned, 0);
        assert_eq!(h.transport.sent_count(), 1);
    }

    #[tokio::test]
    async fn malformed_events_are_skipped() {
        let start = at(10, 0, 0);
        let base = Event {
            id: "evt-bad".to_string(),
            title: "Broken".to_string(),
            description: None,
            location: None,
            start_time: start,
            end_time: start + Duration::hours(1),
            organizer: "Ada".to_string(),
            organizer_email: String::new(),
            reminder_minutes: 30,
            created_by: "user-1".to_string(),
            created_at: start - Duration::days(1),
        };
        let no_lead = Event {
            id: "evt-no-lead".to_string(),
            organizer_email: "a@b.edu".to_string(),
            reminder_minutes: 0,
            ..base.clone()
        };

        let pool = test_pool().await;
        let transport = Arc::new(RecordingTransport::default());
        let dispatcher = ReminderDispatcher::new(
            Arc::new(StaticEvents(vec![base, no_lead])),
            Arc::new(ReminderLogRepository::new(pool.clone())),
            transport.clone(),
            Arc::new(TestClock::new(at(9, 31, 0))),
            settings(),
        );

        let summary = dispatcher.run().await.unwrap();
        assert_eq!(summary.processed, 2);
        assert_eq!(summary.invalid, 2);
        assert_eq!(transport.attempt_count(), 0);
        assert_eq!(reminder_rows(&pool).await, 0);
    }

    #[test]
    fn retry_delay_doubles_up_to_cap() {
        let dispatcher = ReminderDispatcher::new(
            Arc::new(StaticEvents(Vec::new())),
            Arc::new(StaticLogUnused),
            Arc::new(RecordingTransport::default()),
            Arc::new(SystemClock),
            settings(),
        );

        assert_eq!(dispatcher.retry_delay(1), Duration::seconds(60));
        assert_eq!(dispatcher.retry_delay(2), Duration::seconds(120));
        assert_eq!(dispatcher.retry_delay(3), Duration::seconds(240));
        assert_eq!(dispatcher.retry_delay(5), Duration::seconds(900));
        assert_eq!(dispatcher.retry_delay(60), Duration::seconds(900));
    }

    struct StaticLogUnused;

    #[async_trait]
    impl ReminderLog for StaticLogUnused {
        async fn find_sent(&self, _event_id: &str) -> AppResult<Option<EventReminder>> {
            Ok(None)
        }

        async fn find(&self, _event_id: &str) -> AppResult<Option<EventReminder>> {
            Ok(None)
        }

        async fn claim(&self, _claim: &ReminderClaim) -> AppResult<Option<EventReminder>> {
            Ok(None)
        }

        async fn mark_sent(
            &self,
            event_id: &str,
            _sent_at: DateTime<Utc>,
        ) -> AppResult<EventReminder> {
            Err(AppError::NotFound(event_id.to_string()))
        }

        async fn record_failure(
            &self,
            update: &ReminderFailureUpdate,
        ) -> AppResult<EventReminder> {
            Err(AppError::NotFound(update.event_id.clone()))
        }
    }
}
