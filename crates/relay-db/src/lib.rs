//! Database layer for the Relay job broker.
//!
//! Provides the PostgreSQL pool, embedded migrations, row models, and
//! repository traits with their PostgreSQL implementations.

pub mod error;
pub mod models;
pub mod repo;

pub use error::{DbError, DbResult};
pub use models::*;
pub use repo::*;

use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

/// Create a new database connection pool.
pub async fn create_pool(database_url: &str) -> DbResult<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(database_url)
        .await?;
    Ok(pool)
}

/// Run database migrations.
pub async fn run_migrations(pool: &PgPool) -> DbResult<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}
