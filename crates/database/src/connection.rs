use crate::error::DbError;
use configuration::DatabaseSettings;
use sqlx::{PgPool, postgres::PgPoolOptions};
use std::env;
use std::time::Duration;

/// Establishes a connection pool to the PostgreSQL database.
///
/// The URL comes from `[database].url`; when that is empty, `DATABASE_URL` is read
/// from the environment (a `.env` file is loaded first if one exists).
pub async fn connect(settings: &DatabaseSettings) -> Result<PgPool, DbError> {
    let database_url = if settings.url.trim().is_empty() {
        dotenvy::dotenv().ok();
        env::var("DATABASE_URL").map_err(|_| {
            DbError::ConnectionConfigError(
                "database.url is empty and DATABASE_URL is not set.".to_string(),
            )
        })?
    } else {
        settings.url.clone()
    };

    let pool = PgPoolOptions::new()
        .max_connections(settings.max_connections)
        .acquire_timeout(Duration::from_secs(settings.acquire_timeout_secs))
        .connect(&database_url)
        .await?;

    Ok(pool)
}

/// Applies the embedded migrations so the schema is current before any store call.
pub async fn run_migrations(pool: &PgPool) -> Result<(), DbError> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}
