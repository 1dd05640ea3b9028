use crate::error::ConfigError;
use chrono::NaiveDate;
use core_types::FixedParams;
use serde::Deserialize;
use std::path::Path;

/// Defines an evolution campaign. This is deserialized from an `evolution.toml` file.
#[derive(Debug, Clone, Deserialize)]
pub struct EvolutionDefinition {
    pub name: String,
    #[serde(default = "default_owner")]
    pub owner: String,
    /// The strategy whose prompt is optimized first.
    pub base_strategy_id: String,
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,
    /// Consecutive non-improving versions required to stop early.
    #[serde(default = "default_convergence_threshold")]
    pub convergence_threshold: u32,
    pub fixed_params: FixedParamsDefinition,
}

/// Human-friendly form of the frozen backtest parameters.
#[derive(Debug, Clone, Deserialize)]
pub struct FixedParamsDefinition {
    pub symbols: Vec<String>,
    #[serde(default = "default_timeframes")]
    pub timeframes: Vec<String>,
    /// First day of the simulated range (format: YYYY-MM-DD).
    pub start_date: NaiveDate,
    /// Last day of the simulated range, inclusive (format: YYYY-MM-DD).
    pub end_date: NaiveDate,
    pub initial_balance: f64,
    #[serde(default)]
    pub fee_bps: f64,
    #[serde(default)]
    pub slippage_bps: f64,
    #[serde(default = "default_decision_timeframe")]
    pub decision_timeframe: String,
    #[serde(default = "default_cadence")]
    pub decision_cadence_nbars: u32,
    #[serde(default = "default_leverage")]
    pub btc_eth_leverage: u32,
    #[serde(default = "default_leverage")]
    pub altcoin_leverage: u32,
    pub ai_model_id: String,
    #[serde(default)]
    pub cache_ai: bool,
}

impl EvolutionDefinition {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.name.trim().is_empty() {
            return invalid("name must not be empty");
        }
        if self.base_strategy_id.trim().is_empty() {
            return invalid("base_strategy_id must not be empty");
        }
        if self.max_iterations == 0 {
            return invalid("max_iterations must be at least 1");
        }
        let fp = &self.fixed_params;
        if fp.symbols.is_empty() {
            return invalid("fixed_params.symbols must list at least one symbol");
        }
        if fp.start_date >= fp.end_date {
            return invalid(&format!(
                "fixed_params.start_date ({}) must be before end_date ({})",
                fp.start_date, fp.end_date
            ));
        }
        if fp.initial_balance <= 0.0 {
            return invalid("fixed_params.initial_balance must be positive");
        }
        if fp.fee_bps < 0.0 || fp.slippage_bps < 0.0 {
            return invalid("fixed_params fees and slippage must not be negative");
        }
        if fp.ai_model_id.trim().is_empty() {
            return invalid("fixed_params.ai_model_id must not be empty");
        }
        Ok(())
    }

    /// Converts the dates into the millisecond range the engine expects.
    pub fn fixed_params(&self) -> FixedParams {
        let fp = &self.fixed_params;
        let start_ts = fp
            .start_date
            .and_hms_opt(0, 0, 0)
            .map(|dt| dt.and_utc().timestamp_millis())
            .unwrap_or_default();
        let end_ts = fp
            .end_date
            .and_hms_opt(23, 59, 59)
            .map(|dt| dt.and_utc().timestamp_millis())
            .unwrap_or_default();

        FixedParams {
            symbols: fp.symbols.clone(),
            timeframes: fp.timeframes.clone(),
            start_ts,
            end_ts,
            initial_balance: fp.initial_balance,
            fee_bps: fp.fee_bps,
            slippage_bps: fp.slippage_bps,
            decision_timeframe: fp.decision_timeframe.clone(),
            decision_cadence_nbars: fp.decision_cadence_nbars,
            btc_eth_leverage: fp.btc_eth_leverage,
            altcoin_leverage: fp.altcoin_leverage,
            ai_model_id: fp.ai_model_id.trim().to_string(),
            cache_ai: fp.cache_ai,
        }
    }
}

/// Loads and validates an evolution definition from a TOML file.
pub fn load_evolution_definition(path: &Path) -> Result<EvolutionDefinition, ConfigError> {
    let definition = config::Config::builder()
        .add_source(config::File::from(path).format(config::FileFormat::Toml))
        .build()?
        .try_deserialize::<EvolutionDefinition>()?;
    definition.validate()?;
    Ok(definition)
}

fn invalid(message: &str) -> Result<(), ConfigError> {
    Err(ConfigError::ValidationError(message.to_string()))
}

fn default_owner() -> String {
    "default".to_string()
}

fn default_max_iterations() -> u32 {
    10
}

fn default_convergence_threshold() -> u32 {
    3
}

fn default_timeframes() -> Vec<String> {
    vec!["4h".to_string()]
}

fn default_decision_timeframe() -> String {
    "4h".to_string()
}

fn default_cadence() -> u32 {
    1
}

fn default_leverage() -> u32 {
    5
}
