use crate::enums::{BacktestState, EvolutionStatus, IterationStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ==============================================================================
// Evolution Records
// ==============================================================================

/// Backtest parameters frozen for the whole campaign. Every version is
/// simulated against exactly these settings so results stay comparable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FixedParams {
    pub symbols: Vec<String>,
    pub timeframes: Vec<String>,
    /// Start of the simulated range, unix milliseconds.
    pub start_ts: i64,
    /// End of the simulated range, unix milliseconds.
    pub end_ts: i64,
    pub initial_balance: f64,
    pub fee_bps: f64,
    pub slippage_bps: f64,
    #[serde(default)]
    pub decision_timeframe: String,
    #[serde(default)]
    pub decision_cadence_nbars: u32,
    #[serde(default)]
    pub btc_eth_leverage: u32,
    #[serde(default)]
    pub altcoin_leverage: u32,
    /// The model record the simulation itself uses for trading decisions.
    pub ai_model_id: String,
    #[serde(default)]
    pub cache_ai: bool,
}

/// One optimization campaign over a base strategy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Evolution {
    pub id: String,
    pub owner: String,
    pub name: String,
    /// The strategy whose prompt seeds the next version.
    pub base_strategy_id: String,
    pub status: EvolutionStatus,
    /// Last version started; written before that version runs.
    pub current_iteration: u32,
    pub max_iterations: u32,
    /// Consecutive non-improving versions required to stop early.
    pub convergence_threshold: u32,
    /// 0 while no version has been recorded as best.
    pub best_version: u32,
    pub best_return: f64,
    pub best_drawdown: f64,
    pub fixed_params: FixedParams,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Metrics snapshot of a finished simulation. Percentages are expressed in
/// percent units (12.5 means 12.5%), including the win rate.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Metrics {
    pub total_return_pct: f64,
    pub max_drawdown_pct: f64,
    pub win_rate: f64,
    pub sharpe_ratio: f64,
    #[serde(default)]
    pub profit_factor: f64,
    pub trades: u32,
}

/// Structured critique of one simulation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EvaluationReport {
    #[serde(default)]
    pub strengths: Vec<String>,
    #[serde(default)]
    pub weaknesses: Vec<String>,
    #[serde(default)]
    pub suggestions: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_response: Option<String>,
}

/// A rewritten prompt plus the description of what changed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OptimizationResult {
    #[serde(default)]
    pub changes: Vec<String>,
    #[serde(default)]
    pub new_prompt: String,
    #[serde(default)]
    pub expected_effect: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_response: Option<String>,
}

impl OptimizationResult {
    /// Single-line summary persisted with the iteration.
    pub fn changes_summary(&self) -> String {
        if self.changes.is_empty() {
            self.expected_effect.clone()
        } else {
            self.changes.join("; ")
        }
    }
}

/// One version-numbered attempt within an evolution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Iteration {
    pub evolution_id: String,
    pub version: u32,
    pub strategy_id: String,
    pub backtest_run_id: String,
    pub status: IterationStatus,
    pub metrics: Option<Metrics>,
    pub evaluation: Option<EvaluationReport>,
    pub changes_summary: String,
    pub prompt_before: String,
    pub prompt_after: String,
    pub created_at: DateTime<Utc>,
}

impl Iteration {
    /// A fresh row for a version whose backtest is about to be submitted.
    pub fn started(
        evolution_id: &str,
        version: u32,
        strategy_id: &str,
        backtest_run_id: &str,
        prompt_before: &str,
    ) -> Self {
        Self {
            evolution_id: evolution_id.to_string(),
            version,
            strategy_id: strategy_id.to_string(),
            backtest_run_id: backtest_run_id.to_string(),
            status: IterationStatus::Backtest,
            metrics: None,
            evaluation: None,
            changes_summary: String::new(),
            prompt_before: prompt_before.to_string(),
            prompt_after: String::new(),
            created_at: Utc::now(),
        }
    }
}

// ==============================================================================
// Strategy & Model Records
// ==============================================================================

/// A named strategy whose prompt text is the object being optimized.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Strategy {
    pub id: String,
    pub owner: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub prompt: String,
}

/// A configured AI model the simulation can trade with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AiModel {
    pub id: String,
    pub owner: String,
    pub name: String,
    #[serde(default)]
    pub provider: String,
    pub enabled: bool,
    #[serde(default)]
    pub api_key: String,
    #[serde(default)]
    pub custom_api_url: String,
    #[serde(default)]
    pub custom_model_name: String,
}

/// Resolved credentials handed to the simulation engine.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AiCredentials {
    pub provider: String,
    pub api_key: String,
    pub base_url: String,
    pub model: String,
}

// ==============================================================================
// Backtest Job Types
// ==============================================================================

/// Everything the backtest engine needs to run one simulation job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BacktestConfig {
    pub run_id: String,
    pub owner: String,
    pub strategy_id: String,
    pub symbols: Vec<String>,
    pub timeframes: Vec<String>,
    pub decision_timeframe: String,
    pub decision_cadence_nbars: u32,
    pub start_ts: i64,
    pub end_ts: i64,
    pub initial_balance: f64,
    pub fee_bps: f64,
    pub slippage_bps: f64,
    pub btc_eth_leverage: u32,
    pub altcoin_leverage: u32,
    /// The prompt under test.
    pub prompt: String,
    pub cache_ai: bool,
    pub ai: AiCredentials,
}

/// Live status of a job that still has a runner on the engine side.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BacktestStatus {
    pub state: BacktestState,
    pub progress_pct: f64,
    /// Engine heartbeat; absent when the engine never reported one.
    #[serde(default)]
    pub last_updated: Option<DateTime<Utc>>,
}

/// Persisted description of a job, available even after its runner is gone.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BacktestMetadata {
    pub run_id: String,
    pub state: BacktestState,
    #[serde(default)]
    pub progress_pct: f64,
    #[serde(default)]
    pub last_error: Option<String>,
}

/// A single executed trade, as sampled from a finished simulation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TradeEvent {
    /// Unix milliseconds.
    pub timestamp: i64,
    pub symbol: String,
    pub action: String,
    #[serde(default)]
    pub side: String,
    pub price: f64,
    #[serde(default)]
    pub quantity: f64,
    #[serde(default)]
    pub realized_pnl: f64,
    #[serde(default)]
    pub note: String,
}

impl TradeEvent {
    pub fn is_long(&self) -> bool {
        self.side == "long" || self.action == "open_long" || self.action == "close_long"
    }

    pub fn is_short(&self) -> bool {
        self.side == "short" || self.action == "open_short" || self.action == "close_short"
    }
}
