use thiserror::Error;

#[derive(Error, Debug)]
pub enum BacktestError {
    #[error("HTTP request to the backtest service failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Backtest service returned {status} for {endpoint}: {body}")]
    Service {
        endpoint: String,
        status: u16,
        body: String,
    },

    #[error("Backtest run {0} was not found")]
    RunNotFound(String),

    #[error("Failed to decode the backtest service response: {0}")]
    Decode(String),
}
