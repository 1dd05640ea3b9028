use crate::error::OptimizerError;
use ai_client::{AiClient, extract_json};
use core_types::{EvaluationReport, Metrics, OptimizationResult, TradeEvent};
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use tracing::{info, warn};

pub mod error;
pub mod prompt;

/// Change recorded when the prompt is kept because no model output was usable.
pub const FALLBACK_CHANGE: &str = "No AI optimization available, keeping the current prompt";

/// What the optimizer knows about one earlier version.
#[derive(Debug, Clone, PartialEq)]
pub struct IterationSummary {
    pub version: u32,
    pub total_return: f64,
    pub max_drawdown: f64,
    pub changes: String,
    pub is_best: bool,
    /// Not the best, and would not have counted as an improvement over it.
    pub failed: bool,
}

/// Metrics and trade sample of one version.
#[derive(Debug, Clone, Copy)]
pub struct VersionSnapshot<'a> {
    pub version: u32,
    pub metrics: Option<&'a Metrics>,
    pub trades: &'a [TradeEvent],
}

#[derive(Debug, Clone, Copy)]
pub struct OptimizationInput<'a> {
    /// The prompt the rewrite starts from: the current one when it is the best,
    /// otherwise the best version's prompt.
    pub base_prompt: &'a str,
    pub evaluation: &'a EvaluationReport,
    pub history: &'a [IterationSummary],
    pub current: VersionSnapshot<'a>,
    /// The best version, present only when the current one did not beat it.
    pub best: Option<VersionSnapshot<'a>>,
}

#[derive(Clone)]
pub struct Optimizer {
    client: Option<Arc<dyn AiClient>>,
}

impl Optimizer {
    pub fn new(client: Option<Arc<dyn AiClient>>) -> Self {
        Self { client }
    }

    /// Never fails: any problem with the model yields [`fallback_result`].
    pub async fn optimize(&self, input: &OptimizationInput<'_>) -> OptimizationResult {
        let Some(client) = &self.client else {
            return fallback_result(input.base_prompt);
        };

        let user_prompt = prompt::build_user_prompt(input);
        info!(
            version = input.current.version,
            comparison = input.best.is_some(),
            "Requesting AI prompt optimization"
        );

        let response = match client
            .call_with_messages(prompt::SYSTEM_PROMPT, &user_prompt)
            .await
        {
            Ok(response) => response,
            Err(e) => {
                warn!(error = %e, "AI optimization failed, keeping the current prompt");
                return fallback_result(input.base_prompt);
            }
        };

        match parse_optimization(&response, input.base_prompt) {
            Ok(mut result) => {
                result.raw_response = Some(response);
                result
            }
            Err(e) => {
                warn!(error = %e, "Unparsable AI optimization, keeping the current prompt");
                fallback_result(input.base_prompt)
            }
        }
    }
}

pub fn fallback_result(base_prompt: &str) -> OptimizationResult {
    OptimizationResult {
        changes: vec![FALLBACK_CHANGE.to_string()],
        new_prompt: base_prompt.to_string(),
        expected_effect: "No changes applied".to_string(),
        raw_response: None,
    }
}

// `new_prompt` may come back as a nested JSON object rather than a string.
#[derive(Deserialize)]
struct RawOptimization {
    #[serde(default)]
    changes: Vec<String>,
    #[serde(default)]
    new_prompt: Value,
    #[serde(default)]
    expected_effect: String,
}

/// Decodes a model reply. An empty `new_prompt` keeps `base_prompt` and records why.
pub fn parse_optimization(
    response: &str,
    base_prompt: &str,
) -> Result<OptimizationResult, OptimizerError> {
    let json = extract_json(response).ok_or(OptimizerError::NoJson)?;
    let raw: RawOptimization = serde_json::from_str(json)?;

    let new_prompt = match raw.new_prompt {
        Value::Null => String::new(),
        Value::String(s) => s,
        other => serde_json::to_string_pretty(&other)?,
    };

    let mut result = OptimizationResult {
        changes: raw.changes,
        new_prompt,
        expected_effect: raw.expected_effect,
        raw_response: None,
    };
    if result.new_prompt.trim().is_empty() {
        result.new_prompt = base_prompt.to_string();
        result
            .changes
            .push("Warning: AI returned an empty prompt, keeping the current one".to_string());
    }
    Ok(result)
}
