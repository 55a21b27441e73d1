pub mod email;
pub mod init;
pub mod reminders;
