//! Record-access interfaces consumed by the evolution engine.
//!
//! `DbRepository` implements all three against PostgreSQL; tests provide
//! in-memory fakes.

use crate::error::DbError;
use async_trait::async_trait;
use core_types::{AiModel, Evolution, EvolutionStatus, Iteration, IterationStatus, Strategy};

#[async_trait]
pub trait EvolutionStore: Send + Sync {
    async fn create_evolution(&self, evolution: &Evolution) -> Result<(), DbError>;

    /// Fails with `DbError::NotFound` when the id is unknown.
    async fn get_evolution(&self, evolution_id: &str) -> Result<Evolution, DbError>;

    /// Newest first.
    async fn list_evolutions(&self, owner: &str) -> Result<Vec<Evolution>, DbError>;

    async fn update_status(
        &self,
        evolution_id: &str,
        status: EvolutionStatus,
    ) -> Result<(), DbError>;

    async fn update_current_iteration(&self, evolution_id: &str, version: u32)
    -> Result<(), DbError>;

    async fn update_best_version(
        &self,
        evolution_id: &str,
        version: u32,
        best_return: f64,
        best_drawdown: f64,
    ) -> Result<(), DbError>;

    async fn update_base_strategy(&self, evolution_id: &str, strategy_id: &str)
    -> Result<(), DbError>;

    /// Marks the given evolutions as `paused` if a dead process left them
    /// `running`. Evolutions outside `evolution_ids` are never touched, since
    /// another live process may be driving them. Returns how many rows changed.
    async fn reset_running_to_paused(&self, evolution_ids: &[String]) -> Result<u64, DbError>;

    /// Inserts the row for `(evolution_id, version)`, or refreshes it when a
    /// retried version already has a non-completed row.
    async fn create_iteration(&self, iteration: &Iteration) -> Result<(), DbError>;

    async fn update_iteration_status(
        &self,
        evolution_id: &str,
        version: u32,
        status: IterationStatus,
    ) -> Result<(), DbError>;

    /// Writes the completed record in a single statement.
    async fn update_iteration_complete(&self, iteration: &Iteration) -> Result<(), DbError>;

    async fn get_iteration(
        &self,
        evolution_id: &str,
        version: u32,
    ) -> Result<Option<Iteration>, DbError>;

    /// Ordered by version ascending.
    async fn get_iterations(&self, evolution_id: &str) -> Result<Vec<Iteration>, DbError>;
}

#[async_trait]
pub trait StrategyStore: Send + Sync {
    /// Fails with `DbError::NotFound` when the strategy does not exist.
    async fn get_strategy(&self, owner: &str, strategy_id: &str) -> Result<Strategy, DbError>;

    async fn get_strategy_by_name(
        &self,
        owner: &str,
        name: &str,
    ) -> Result<Option<Strategy>, DbError>;

    async fn create_strategy(&self, strategy: &Strategy) -> Result<(), DbError>;

    async fn update_strategy(&self, strategy: &Strategy) -> Result<(), DbError>;
}

#[async_trait]
pub trait ModelStore: Send + Sync {
    async fn get_model(&self, owner: &str, model_id: &str) -> Result<Option<AiModel>, DbError>;
}
