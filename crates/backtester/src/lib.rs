//! Job-control interface to the external trading simulation engine.
//!
//! The evolution engine never simulates anything itself: it submits a
//! configuration, polls the job, and reads back metrics and a trade sample.

use crate::error::BacktestError;
use async_trait::async_trait;
use core_types::{BacktestConfig, BacktestMetadata, BacktestStatus, Metrics, TradeEvent};

pub mod error;
pub mod http;

pub use http::HttpBacktestEngine;

#[async_trait]
pub trait BacktestEngine: Send + Sync {
    /// Submits a job under `config.run_id` and returns the id the engine accepted.
    async fn start(&self, config: &BacktestConfig) -> Result<String, BacktestError>;

    /// Live status of a job. `None` when the engine holds no runner for it,
    /// e.g. after the engine process restarted.
    async fn status(&self, run_id: &str) -> Result<Option<BacktestStatus>, BacktestError>;

    async fn get_metrics(&self, run_id: &str) -> Result<Metrics, BacktestError>;

    async fn load_trades(
        &self,
        run_id: &str,
        limit: usize,
    ) -> Result<Vec<TradeEvent>, BacktestError>;

    /// Persisted job description. `None` when the run was never recorded.
    async fn load_metadata(&self, run_id: &str)
    -> Result<Option<BacktestMetadata>, BacktestError>;

    /// Removes every trace of the run so the same id can be reused.
    async fn delete(&self, run_id: &str) -> Result<(), BacktestError>;
}
