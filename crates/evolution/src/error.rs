use backtester::error::BacktestError;
use database::DbError;
use thiserror::Error;

/// Everything that can end an iteration. AI failures never appear here: the
/// evaluator and optimizer absorb them with their fallbacks.
#[derive(Error, Debug)]
pub enum EvolutionError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Backtest {run_id} stalled: no progress or heartbeat for {idle_secs}s")]
    BacktestStalled { run_id: String, idle_secs: u64 },

    #[error("Backtest {run_id} failed: {reason}")]
    BacktestFailed { run_id: String, reason: String },

    #[error("Backtest {run_id} could not be started: {source}")]
    BacktestStart {
        run_id: String,
        #[source]
        source: BacktestError,
    },

    #[error("Backtest engine error: {0}")]
    Engine(#[from] BacktestError),

    #[error("Database error: {0}")]
    Database(DbError),

    #[error("Evolution was cancelled")]
    Cancelled,

    #[error("Invalid {kind} transition from '{from}' to '{to}'")]
    InvalidTransition {
        kind: &'static str,
        from: String,
        to: String,
    },

    #[error("Evolution {0} is already running")]
    AlreadyRunning(String),

    #[error("{0} not found")]
    NotFound(String),
}

impl From<DbError> for EvolutionError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::NotFound(what) => EvolutionError::NotFound(what),
            other => EvolutionError::Database(other),
        }
    }
}
