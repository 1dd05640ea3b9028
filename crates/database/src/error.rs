use thiserror::Error;

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Failed to load environment variables for database connection: {0}")]
    ConnectionConfigError(String),

    #[error("Database query failed: {0}")]
    QueryError(#[from] sqlx::Error),

    #[error("Database migration failed: {0}")]
    MigrationError(#[from] sqlx::migrate::MigrateError),

    #[error("An error occurred during JSON serialization/deserialization: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Stored row could not be decoded: {0}")]
    Decode(String),

    #[error("{0} not found")]
    NotFound(String),
}

impl From<core_types::CoreError> for DbError {
    fn from(err: core_types::CoreError) -> Self {
        DbError::Decode(err.to_string())
    }
}
