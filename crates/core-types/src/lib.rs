pub mod enums;
pub mod error;
pub mod structs;

// Re-export the core types to provide a clean public API.
pub use enums::{BacktestState, EvolutionStatus, IterationStatus};
pub use error::CoreError;
pub use structs::{
    AiCredentials, AiModel, BacktestConfig, BacktestMetadata, BacktestStatus, EvaluationReport,
    Evolution, FixedParams, Iteration, Metrics, OptimizationResult, Strategy, TradeEvent,
};
