pub mod models;
pub mod repository;

pub use models::*;
pub use repository::*;

/// Fresh in-memory database with migrations applied.
///
/// A single long-lived connection is used because every `sqlite::memory:`
/// connection opens its own private database.
#[cfg(test)]
pub async fn test_pool() -> sqlx::SqlitePool {
    let pool = sqlx::sqlite::SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect("sqlite::memory:")
        .await
        .expect("in-memory sqlite");
    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("migrations apply");
    pool
}
