//! Database models, one file per table.

pub mod event;
pub mod reminder;

pub use self::event::*;
pub use self::reminder::*;
