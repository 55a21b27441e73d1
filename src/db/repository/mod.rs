pub mod event_repository;
pub mod reminder_log_repository;

pub use event_repository::EventRepository;
pub use reminder_log_repository::ReminderLogRepository;
