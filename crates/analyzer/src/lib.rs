//! Outcome evaluator: turns a finished backtest into a structured critique.
//!
//! The model is optional. Without a client, when the call fails, or when the
//! reply cannot be parsed, the rule-based report from [`fallback_report`] is
//! returned instead, so evaluation never fails.

use crate::error::AnalyzerError;
use ai_client::{AiClient, extract_json};
use core_types::{EvaluationReport, Metrics, TradeEvent};
use std::sync::Arc;
use tracing::{info, warn};

pub mod error;
pub mod fallback;
pub mod prompt;

pub use fallback::fallback_report;
pub use prompt::{TradeBreakdown, truncate_chars, write_metrics};

/// Everything the evaluator looks at for one version.
#[derive(Debug, Clone, Copy)]
pub struct EvaluationInput<'a> {
    pub metrics: Option<&'a Metrics>,
    pub trades: &'a [TradeEvent],
    pub current_prompt: &'a str,
}

#[derive(Clone)]
pub struct Evaluator {
    client: Option<Arc<dyn AiClient>>,
}

impl Evaluator {
    pub fn new(client: Option<Arc<dyn AiClient>>) -> Self {
        Self { client }
    }

    pub async fn evaluate(&self, input: EvaluationInput<'_>) -> EvaluationReport {
        let Some(client) = &self.client else {
            return fallback_report(input.metrics);
        };

        let user_prompt =
            prompt::build_user_prompt(input.metrics, input.trades, input.current_prompt);
        info!(trades = input.trades.len(), "Requesting AI evaluation");

        let response = match client
            .call_with_messages(prompt::SYSTEM_PROMPT, &user_prompt)
            .await
        {
            Ok(response) => response,
            Err(e) => {
                warn!(error = %e, "AI evaluation failed, using fallback report");
                return fallback_report(input.metrics);
            }
        };

        let mut report = parse_evaluation(&response).unwrap_or_else(|e| {
            warn!(error = %e, "Unparsable AI evaluation, using fallback report");
            fallback_report(input.metrics)
        });
        report.raw_response = Some(response);
        report
    }
}

/// Decodes the first JSON object in a model reply. Missing lists decode as empty.
pub fn parse_evaluation(response: &str) -> Result<EvaluationReport, AnalyzerError> {
    let json = extract_json(response).ok_or(AnalyzerError::NoJson)?;
    Ok(serde_json::from_str::<EvaluationReport>(json)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ai_client::error::AiError;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Replays a fixed reply and records the prompts it was sent.
    struct ScriptedClient {
        reply: Result<String, String>,
        prompts: Mutex<Vec<String>>,
    }

    impl ScriptedClient {
        fn new(reply: Result<&str, &str>) -> Arc<Self> {
            Arc::new(Self {
                reply: reply.map(str::to_string).map_err(str::to_string),
                prompts: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl AiClient for ScriptedClient {
        async fn call_with_messages(&self, _system: &str, user: &str) -> Result<String, AiError> {
            self.prompts.lock().unwrap().push(user.to_string());
            self.reply
                .clone()
                .map_err(|msg| AiError::Api { status: 500, body: msg })
        }
    }

    fn evaluator(client: &Arc<ScriptedClient>) -> Evaluator {
        let client: Arc<dyn AiClient> = client.clone();
        Evaluator::new(Some(client))
    }

    fn metrics() -> Metrics {
        Metrics {
            total_return_pct: -2.0,
            max_drawdown_pct: 25.0,
            win_rate: 40.0,
            sharpe_ratio: -0.3,
            profit_factor: 0.8,
            trades: 12,
        }
    }

    fn input(m: &Metrics) -> EvaluationInput<'_> {
        EvaluationInput {
            metrics: Some(m),
            trades: &[],
            current_prompt: "baseline",
        }
    }

    #[tokio::test]
    async fn test_parsed_reply_keeps_raw_response() {
        let reply = "Sure!\n{\"strengths\": [\"a\"], \"weaknesses\": [\"b\"], \"suggestions\": [\"c\"], \"trade_pattern\": \"x\"}";
        let client = ScriptedClient::new(Ok(reply));
        let evaluator = evaluator(&client);

        let m = metrics();
        let report = evaluator.evaluate(input(&m)).await;
        assert_eq!(report.strengths, vec!["a"]);
        assert_eq!(report.suggestions, vec!["c"]);
        assert_eq!(report.raw_response.as_deref(), Some(reply));
        assert!(client.prompts.lock().unwrap()[0].contains("- Total Return: -2.00%"));
    }

    #[tokio::test]
    async fn test_call_failure_uses_fallback() {
        let evaluator = evaluator(&ScriptedClient::new(Err("down")));
        let m = metrics();
        let report = evaluator.evaluate(input(&m)).await;
        assert_eq!(report, fallback_report(Some(&m)));
        assert!(report.raw_response.is_none());
    }

    #[tokio::test]
    async fn test_garbage_reply_uses_fallback_but_is_audited() {
        let evaluator = evaluator(&ScriptedClient::new(Ok("I cannot help")));
        let m = metrics();
        let report = evaluator.evaluate(input(&m)).await;
        assert_eq!(report.weaknesses, fallback_report(Some(&m)).weaknesses);
        assert_eq!(report.raw_response.as_deref(), Some("I cannot help"));
    }

    #[tokio::test]
    async fn test_no_client_uses_fallback() {
        let m = metrics();
        let report = Evaluator::new(None).evaluate(input(&m)).await;
        assert_eq!(report.suggestions.len(), 3);
    }

    #[test]
    fn test_missing_lists_decode_as_empty() {
        let report = parse_evaluation("{\"strengths\": [\"ok\"]}").unwrap();
        assert!(report.weaknesses.is_empty());
        assert!(matches!(parse_evaluation("nothing"), Err(AnalyzerError::NoJson)));
        assert!(matches!(
            parse_evaluation("{\"strengths\": 5}"),
            Err(AnalyzerError::InvalidJson(_))
        ));
    }
}
