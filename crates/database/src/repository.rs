use crate::DbError;
use crate::store::{EvolutionStore, ModelStore, StrategyStore};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use core_types::{
    AiModel, EvaluationReport, Evolution, EvolutionStatus, FixedParams, Iteration,
    IterationStatus, Metrics, Strategy,
};
use serde_json::Value as JsonValue;
use sqlx::FromRow;
use sqlx::postgres::PgPool;

/// The `DbRepository` provides a high-level, application-specific interface
/// to the database. It encapsulates all SQL queries and data access logic.
#[derive(Debug, Clone)]
pub struct DbRepository {
    pool: PgPool,
}

// This struct represents a row fetched from the evolutions table.
#[derive(FromRow, Debug, Clone)]
struct DbEvolution {
    id: String,
    owner: String,
    name: String,
    base_strategy_id: String,
    status: String,
    current_iteration: i32,
    max_iterations: i32,
    convergence_threshold: i32,
    best_version: i32,
    best_return: f64,
    best_drawdown: f64,
    config: JsonValue,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<DbEvolution> for Evolution {
    type Error = DbError;

    fn try_from(row: DbEvolution) -> Result<Self, Self::Error> {
        let fixed_params: FixedParams = serde_json::from_value(row.config)?;
        Ok(Evolution {
            id: row.id,
            owner: row.owner,
            name: row.name,
            base_strategy_id: row.base_strategy_id,
            status: row.status.parse::<EvolutionStatus>()?,
            current_iteration: to_u32(row.current_iteration),
            max_iterations: to_u32(row.max_iterations),
            convergence_threshold: to_u32(row.convergence_threshold),
            best_version: to_u32(row.best_version),
            best_return: row.best_return,
            best_drawdown: row.best_drawdown,
            fixed_params,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// A row of `evolution_iterations`. Metric columns are NULL until completion.
#[derive(FromRow, Debug, Clone)]
struct DbIteration {
    evolution_id: String,
    version: i32,
    strategy_id: String,
    backtest_run_id: String,
    status: String,
    total_return: Option<f64>,
    max_drawdown: Option<f64>,
    win_rate: Option<f64>,
    sharpe_ratio: Option<f64>,
    profit_factor: Option<f64>,
    trades: Option<i32>,
    evaluation: Option<JsonValue>,
    changes_summary: String,
    prompt_before: String,
    prompt_after: String,
    created_at: DateTime<Utc>,
}

impl TryFrom<DbIteration> for Iteration {
    type Error = DbError;

    fn try_from(row: DbIteration) -> Result<Self, Self::Error> {
        let metrics = row.total_return.map(|total_return_pct| Metrics {
            total_return_pct,
            max_drawdown_pct: row.max_drawdown.unwrap_or_default(),
            win_rate: row.win_rate.unwrap_or_default(),
            sharpe_ratio: row.sharpe_ratio.unwrap_or_default(),
            profit_factor: row.profit_factor.unwrap_or_default(),
            trades: row.trades.map(to_u32).unwrap_or_default(),
        });
        let evaluation = row
            .evaluation
            .map(serde_json::from_value::<EvaluationReport>)
            .transpose()?;

        Ok(Iteration {
            evolution_id: row.evolution_id,
            version: to_u32(row.version),
            strategy_id: row.strategy_id,
            backtest_run_id: row.backtest_run_id,
            status: row.status.parse::<IterationStatus>()?,
            metrics,
            evaluation,
            changes_summary: row.changes_summary,
            prompt_before: row.prompt_before,
            prompt_after: row.prompt_after,
            created_at: row.created_at,
        })
    }
}

#[derive(FromRow, Debug, Clone)]
struct DbStrategy {
    id: String,
    owner: String,
    name: String,
    description: String,
    prompt: String,
}

impl From<DbStrategy> for Strategy {
    fn from(row: DbStrategy) -> Self {
        Strategy {
            id: row.id,
            owner: row.owner,
            name: row.name,
            description: row.description,
            prompt: row.prompt,
        }
    }
}

#[derive(FromRow, Debug, Clone)]
struct DbAiModel {
    id: String,
    owner: String,
    name: String,
    provider: String,
    enabled: bool,
    api_key: String,
    custom_api_url: String,
    custom_model_name: String,
}

impl From<DbAiModel> for AiModel {
    fn from(row: DbAiModel) -> Self {
        AiModel {
            id: row.id,
            owner: row.owner,
            name: row.name,
            provider: row.provider,
            enabled: row.enabled,
            api_key: row.api_key,
            custom_api_url: row.custom_api_url,
            custom_model_name: row.custom_model_name,
        }
    }
}

const EVOLUTION_COLUMNS: &str = "id, owner, name, base_strategy_id, status, current_iteration, \
     max_iterations, convergence_threshold, best_version, best_return, best_drawdown, config, \
     created_at, updated_at";

const ITERATION_COLUMNS: &str = "evolution_id, version, strategy_id, backtest_run_id, status, \
     total_return, max_drawdown, win_rate, sharpe_ratio, profit_factor, trades, evaluation, \
     changes_summary, prompt_before, prompt_after, created_at";

fn to_u32(value: i32) -> u32 {
    u32::try_from(value).unwrap_or_default()
}

const RESET_RUNNING_SQL: &str = "UPDATE evolutions SET status = 'paused', updated_at = NOW() \
     WHERE status = 'running' AND id = ANY($1)";

fn to_i32(value: u32) -> i32 {
    i32::try_from(value).unwrap_or(i32::MAX)
}

impl DbRepository {
    /// Creates a new `DbRepository` with a shared database connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Saves an AI model record, replacing any previous row with the same id.
    pub async fn save_model(&self, model: &AiModel) -> Result<(), DbError> {
        sqlx::query(
            r#"
            INSERT INTO ai_models (id, owner, name, provider, enabled, api_key, custom_api_url, custom_model_name)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (id) DO UPDATE SET
                name = EXCLUDED.name, provider = EXCLUDED.provider, enabled = EXCLUDED.enabled,
                api_key = EXCLUDED.api_key, custom_api_url = EXCLUDED.custom_api_url,
                custom_model_name = EXCLUDED.custom_model_name
            "#,
        )
        .bind(&model.id)
        .bind(&model.owner)
        .bind(&model.name)
        .bind(&model.provider)
        .bind(model.enabled)
        .bind(&model.api_key)
        .bind(&model.custom_api_url)
        .bind(&model.custom_model_name)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl EvolutionStore for DbRepository {
    async fn create_evolution(&self, evolution: &Evolution) -> Result<(), DbError> {
        let config = serde_json::to_value(&evolution.fixed_params)?;
        sqlx::query(
            r#"
            INSERT INTO evolutions (id, owner, name, base_strategy_id, status, current_iteration,
                max_iterations, convergence_threshold, best_version, best_return, best_drawdown,
                config, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            "#,
        )
        .bind(&evolution.id)
        .bind(&evolution.owner)
        .bind(&evolution.name)
        .bind(&evolution.base_strategy_id)
        .bind(evolution.status.as_str())
        .bind(to_i32(evolution.current_iteration))
        .bind(to_i32(evolution.max_iterations))
        .bind(to_i32(evolution.convergence_threshold))
        .bind(to_i32(evolution.best_version))
        .bind(evolution.best_return)
        .bind(evolution.best_drawdown)
        .bind(config)
        .bind(evolution.created_at)
        .bind(evolution.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_evolution(&self, evolution_id: &str) -> Result<Evolution, DbError> {
        let query = format!("SELECT {EVOLUTION_COLUMNS} FROM evolutions WHERE id = $1");
        let row = sqlx::query_as::<_, DbEvolution>(&query)
            .bind(evolution_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| DbError::NotFound(format!("evolution {evolution_id}")))?;
        row.try_into()
    }

    async fn list_evolutions(&self, owner: &str) -> Result<Vec<Evolution>, DbError> {
        let query = format!(
            "SELECT {EVOLUTION_COLUMNS} FROM evolutions WHERE owner = $1 ORDER BY created_at DESC"
        );
        let rows = sqlx::query_as::<_, DbEvolution>(&query)
            .bind(owner)
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(Evolution::try_from).collect()
    }

    async fn update_status(
        &self,
        evolution_id: &str,
        status: EvolutionStatus,
    ) -> Result<(), DbError> {
        sqlx::query("UPDATE evolutions SET status = $1, updated_at = NOW() WHERE id = $2")
            .bind(status.as_str())
            .bind(evolution_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn update_current_iteration(
        &self,
        evolution_id: &str,
        version: u32,
    ) -> Result<(), DbError> {
        // GREATEST keeps the counter monotonic even if a stale writer lags behind.
        sqlx::query(
            "UPDATE evolutions SET current_iteration = GREATEST(current_iteration, $1), updated_at = NOW() WHERE id = $2",
        )
        .bind(to_i32(version))
        .bind(evolution_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn update_best_version(
        &self,
        evolution_id: &str,
        version: u32,
        best_return: f64,
        best_drawdown: f64,
    ) -> Result<(), DbError> {
        sqlx::query(
            r#"
            UPDATE evolutions
            SET best_version = $1, best_return = $2, best_drawdown = $3, updated_at = NOW()
            WHERE id = $4
            "#,
        )
        .bind(to_i32(version))
        .bind(best_return)
        .bind(best_drawdown)
        .bind(evolution_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn update_base_strategy(
        &self,
        evolution_id: &str,
        strategy_id: &str,
    ) -> Result<(), DbError> {
        sqlx::query("UPDATE evolutions SET base_strategy_id = $1, updated_at = NOW() WHERE id = $2")
            .bind(strategy_id)
            .bind(evolution_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn reset_running_to_paused(&self, evolution_ids: &[String]) -> Result<u64, DbError> {
        let result = sqlx::query(RESET_RUNNING_SQL)
            .bind(evolution_ids)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn create_iteration(&self, iteration: &Iteration) -> Result<(), DbError> {
        // A completed row is never overwritten; a retried row is reset to a clean start.
        sqlx::query(
            r#"
            INSERT INTO evolution_iterations
                (evolution_id, version, strategy_id, backtest_run_id, status, prompt_before, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (evolution_id, version) DO UPDATE SET
                strategy_id = EXCLUDED.strategy_id,
                backtest_run_id = EXCLUDED.backtest_run_id,
                status = EXCLUDED.status,
                prompt_before = EXCLUDED.prompt_before,
                total_return = NULL, max_drawdown = NULL, win_rate = NULL, sharpe_ratio = NULL,
                profit_factor = NULL, trades = NULL, evaluation = NULL,
                changes_summary = '', prompt_after = ''
            WHERE evolution_iterations.status <> 'completed'
            "#,
        )
        .bind(&iteration.evolution_id)
        .bind(to_i32(iteration.version))
        .bind(&iteration.strategy_id)
        .bind(&iteration.backtest_run_id)
        .bind(iteration.status.as_str())
        .bind(&iteration.prompt_before)
        .bind(iteration.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn update_iteration_status(
        &self,
        evolution_id: &str,
        version: u32,
        status: IterationStatus,
    ) -> Result<(), DbError> {
        sqlx::query(
            r#"
            UPDATE evolution_iterations SET status = $1
            WHERE evolution_id = $2 AND version = $3 AND status <> 'completed'
            "#,
        )
        .bind(status.as_str())
        .bind(evolution_id)
        .bind(to_i32(version))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn update_iteration_complete(&self, iteration: &Iteration) -> Result<(), DbError> {
        let metrics = iteration.metrics.unwrap_or_default();
        let evaluation = iteration
            .evaluation
            .as_ref()
            .map(serde_json::to_value)
            .transpose()?;

        let result = sqlx::query(
            r#"
            UPDATE evolution_iterations SET
                status = 'completed',
                backtest_run_id = $1,
                total_return = $2, max_drawdown = $3, win_rate = $4, sharpe_ratio = $5,
                profit_factor = $6, trades = $7, evaluation = $8,
                changes_summary = $9, prompt_before = $10, prompt_after = $11
            WHERE evolution_id = $12 AND version = $13 AND status <> 'completed'
            "#,
        )
        .bind(&iteration.backtest_run_id)
        .bind(metrics.total_return_pct)
        .bind(metrics.max_drawdown_pct)
        .bind(metrics.win_rate)
        .bind(metrics.sharpe_ratio)
        .bind(metrics.profit_factor)
        .bind(to_i32(metrics.trades))
        .bind(evaluation)
        .bind(&iteration.changes_summary)
        .bind(&iteration.prompt_before)
        .bind(&iteration.prompt_after)
        .bind(&iteration.evolution_id)
        .bind(to_i32(iteration.version))
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            tracing::warn!(
                evolution_id = %iteration.evolution_id,
                version = iteration.version,
                "Completion write matched no open iteration row"
            );
        }
        Ok(())
    }

    async fn get_iteration(
        &self,
        evolution_id: &str,
        version: u32,
    ) -> Result<Option<Iteration>, DbError> {
        let query = format!(
            "SELECT {ITERATION_COLUMNS} FROM evolution_iterations WHERE evolution_id = $1 AND version = $2"
        );
        sqlx::query_as::<_, DbIteration>(&query)
            .bind(evolution_id)
            .bind(to_i32(version))
            .fetch_optional(&self.pool)
            .await?
            .map(Iteration::try_from)
            .transpose()
    }

    async fn get_iterations(&self, evolution_id: &str) -> Result<Vec<Iteration>, DbError> {
        let query = format!(
            "SELECT {ITERATION_COLUMNS} FROM evolution_iterations WHERE evolution_id = $1 ORDER BY version ASC"
        );
        let rows = sqlx::query_as::<_, DbIteration>(&query)
            .bind(evolution_id)
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(Iteration::try_from).collect()
    }
}

#[async_trait]
impl StrategyStore for DbRepository {
    async fn get_strategy(&self, owner: &str, strategy_id: &str) -> Result<Strategy, DbError> {
        let row = sqlx::query_as::<_, DbStrategy>(
            "SELECT id, owner, name, description, prompt FROM strategies WHERE id = $1 AND owner = $2",
        )
        .bind(strategy_id)
        .bind(owner)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| DbError::NotFound(format!("strategy {strategy_id}")))?;
        Ok(row.into())
    }

    async fn get_strategy_by_name(
        &self,
        owner: &str,
        name: &str,
    ) -> Result<Option<Strategy>, DbError> {
        let row = sqlx::query_as::<_, DbStrategy>(
            "SELECT id, owner, name, description, prompt FROM strategies WHERE owner = $1 AND name = $2",
        )
        .bind(owner)
        .bind(name)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Strategy::from))
    }

    async fn create_strategy(&self, strategy: &Strategy) -> Result<(), DbError> {
        sqlx::query(
            "INSERT INTO strategies (id, owner, name, description, prompt) VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(&strategy.id)
        .bind(&strategy.owner)
        .bind(&strategy.name)
        .bind(&strategy.description)
        .bind(&strategy.prompt)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn update_strategy(&self, strategy: &Strategy) -> Result<(), DbError> {
        let result = sqlx::query(
            r#"
            UPDATE strategies SET name = $1, description = $2, prompt = $3, updated_at = NOW()
            WHERE id = $4 AND owner = $5
            "#,
        )
        .bind(&strategy.name)
        .bind(&strategy.description)
        .bind(&strategy.prompt)
        .bind(&strategy.id)
        .bind(&strategy.owner)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::NotFound(format!("strategy {}", strategy.id)));
        }
        Ok(())
    }
}

#[async_trait]
impl ModelStore for DbRepository {
    async fn get_model(&self, owner: &str, model_id: &str) -> Result<Option<AiModel>, DbError> {
        let row = sqlx::query_as::<_, DbAiModel>(
            r#"
            SELECT id, owner, name, provider, enabled, api_key, custom_api_url, custom_model_name
            FROM ai_models WHERE id = $1 AND owner = $2
            "#,
        )
        .bind(model_id)
        .bind(owner)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(AiModel::from))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn iteration_row() -> DbIteration {
        DbIteration {
            evolution_id: "evo-1".to_string(),
            version: 2,
            strategy_id: "s-1".to_string(),
            backtest_run_id: "evo-20250101-0000-epoch-2".to_string(),
            status: "backtesting".to_string(),
            total_return: None,
            max_drawdown: None,
            win_rate: None,
            sharpe_ratio: None,
            profit_factor: None,
            trades: None,
            evaluation: None,
            changes_summary: String::new(),
            prompt_before: "baseline".to_string(),
            prompt_after: String::new(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_open_iteration_row_has_no_metrics() {
        let iteration = Iteration::try_from(iteration_row()).unwrap();
        assert_eq!(iteration.status, IterationStatus::Backtest);
        assert!(iteration.metrics.is_none());
        assert!(iteration.evaluation.is_none());
    }

    #[test]
    fn test_completed_row_decodes_metrics_and_evaluation() {
        let mut row = iteration_row();
        row.status = "completed".to_string();
        row.total_return = Some(12.5);
        row.max_drawdown = Some(8.0);
        row.trades = Some(40);
        row.evaluation = Some(serde_json::json!({
            "strengths": ["Positive return"],
            "weaknesses": [],
            "suggestions": []
        }));

        let iteration = Iteration::try_from(row).unwrap();
        let metrics = iteration.metrics.unwrap();
        assert_eq!(metrics.total_return_pct, 12.5);
        assert_eq!(metrics.win_rate, 0.0);
        assert_eq!(metrics.trades, 40);
        assert_eq!(iteration.evaluation.unwrap().strengths, vec!["Positive return"]);
    }

    #[test]
    fn test_reset_only_touches_requested_evolutions() {
        assert!(RESET_RUNNING_SQL.contains("WHERE status = 'running' AND id = ANY($1)"));
    }

    #[test]
    fn test_unknown_status_is_a_decode_error() {
        let mut row = iteration_row();
        row.status = "exploded".to_string();
        assert!(matches!(Iteration::try_from(row), Err(DbError::Decode(_))));
    }

    #[test]
    fn test_negative_counters_clamp_to_zero() {
        assert_eq!(to_u32(-4), 0);
        assert_eq!(to_i32(u32::MAX), i32::MAX);
    }
}
