use crate::error::EvolutionError;
use crate::signals::SignalReceiver;
use crate::tracker::{self, BestVersion};
use analyzer::{EvaluationInput, Evaluator};
use backtester::BacktestEngine;
use chrono::Utc;
use configuration::BacktestSettings;
use core_types::{
    AiCredentials, AiModel, BacktestConfig, BacktestState, EvaluationReport, Evolution, Iteration,
    IterationStatus, Metrics, OptimizationResult, Strategy, TradeEvent,
};
use database::{EvolutionStore, ModelStore, StrategyStore};
use optimizer::{OptimizationInput, Optimizer, VersionSnapshot};
use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Prompt used when the base strategy has none: the simulation's built-in variant.
pub const DEFAULT_PROMPT: &str = "baseline";

/// Timing and sampling knobs of the backtest wait loop.
#[derive(Debug, Clone, Copy)]
pub struct RunnerSettings {
    pub poll_interval: Duration,
    pub inactivity_timeout: Duration,
    pub trade_sample_limit: usize,
}

impl From<&BacktestSettings> for RunnerSettings {
    fn from(settings: &BacktestSettings) -> Self {
        Self {
            poll_interval: settings.poll_interval(),
            inactivity_timeout: settings.inactivity_timeout(),
            trade_sample_limit: settings.trade_sample_limit,
        }
    }
}

impl Default for RunnerSettings {
    fn default() -> Self {
        Self::from(&BacktestSettings::default())
    }
}

/// The stores and services an iteration is driven through.
#[derive(Clone)]
pub struct Collaborators {
    pub evolutions: Arc<dyn EvolutionStore>,
    pub strategies: Arc<dyn StrategyStore>,
    pub models: Arc<dyn ModelStore>,
    pub engine: Arc<dyn BacktestEngine>,
    pub evaluator: Evaluator,
    pub optimizer: Optimizer,
}

/// What an attempt at a version has to do, decided from its persisted row.
enum Plan {
    /// The row is already completed.
    Done,
    Submit(Submission),
    /// A live job is still running for this version.
    Attach(Iteration),
    /// The backtest finished; only evaluation onwards is left.
    Evaluate(Iteration),
}

struct Submission {
    run_id: String,
    strategy_id: String,
    prompt: String,
    previous: Option<IterationStatus>,
}

/// Drives one version from "nothing started" to a completed record.
pub struct IterationRunner {
    deps: Collaborators,
    settings: RunnerSettings,
    /// Evolutions currently driven by a controller sharing this runner.
    active: Mutex<HashSet<String>>,
}

impl IterationRunner {
    pub fn new(deps: Collaborators, settings: RunnerSettings) -> Self {
        Self {
            deps,
            settings,
            active: Mutex::new(HashSet::new()),
        }
    }

    /// Registers a worker for `evolution_id`. Returns false if one is already driving it.
    pub(crate) fn claim(&self, evolution_id: &str) -> bool {
        self.active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(evolution_id.to_string())
    }

    pub(crate) fn release(&self, evolution_id: &str) {
        self.active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(evolution_id);
    }

    pub fn evolutions(&self) -> &Arc<dyn EvolutionStore> {
        &self.deps.evolutions
    }

    /// Runs (or resumes) `version`. Calling this again for a completed
    /// version does nothing.
    pub async fn run(
        &self,
        evolution_id: &str,
        version: u32,
        signals: &mut SignalReceiver,
    ) -> Result<(), EvolutionError> {
        let evolution = self.deps.evolutions.get_evolution(evolution_id).await?;
        let existing = self
            .deps
            .evolutions
            .get_iteration(evolution_id, version)
            .await?;

        // --- Step A/B/C: get a finished backtest for this version ---
        let mut iteration = match self.plan(&evolution, version, existing).await? {
            Plan::Done => {
                info!(evolution_id, version, "Iteration already completed, nothing to do");
                return Ok(());
            }
            Plan::Submit(submission) => {
                let iteration = self.submit(&evolution, version, submission).await?;
                self.wait(&iteration.backtest_run_id, signals).await?;
                iteration
            }
            Plan::Attach(iteration) => {
                info!(
                    evolution_id,
                    version,
                    run_id = %iteration.backtest_run_id,
                    "Attaching to running backtest"
                );
                self.wait(&iteration.backtest_run_id, signals).await?;
                iteration
            }
            Plan::Evaluate(iteration) => iteration,
        };

        // --- Step D: evaluate ---
        let run_id = iteration.backtest_run_id.clone();
        let metrics = self.deps.engine.get_metrics(&run_id).await?;
        let trades = self.sample_trades(&run_id).await;

        // Re-entering evaluation from a later or failed step goes back through Backtest.
        if !iteration.status.can_transition_to(IterationStatus::Evaluating) {
            self.transition(&mut iteration, IterationStatus::Backtest).await?;
        }
        self.transition(&mut iteration, IterationStatus::Evaluating)
            .await?;
        let evaluation = self
            .deps
            .evaluator
            .evaluate(EvaluationInput {
                metrics: Some(&metrics),
                trades: &trades,
                current_prompt: &iteration.prompt_before,
            })
            .await;

        // --- Step E: optimize ---
        self.transition(&mut iteration, IterationStatus::Optimizing)
            .await?;
        let iterations = self.deps.evolutions.get_iterations(evolution_id).await?;
        let best = tracker::current_best(&evolution, &iterations);
        let result = self
            .optimize(&iteration, &metrics, &trades, &evaluation, &iterations, best.as_ref())
            .await;

        // --- Step F: persist and version ---
        if !iteration.status.can_transition_to(IterationStatus::Completed) {
            return Err(invalid_transition(iteration.status, IterationStatus::Completed));
        }
        iteration.status = IterationStatus::Completed;
        iteration.metrics = Some(metrics);
        iteration.evaluation = Some(evaluation);
        iteration.changes_summary = result.changes_summary();
        iteration.prompt_after = result.new_prompt;
        self.deps
            .evolutions
            .update_iteration_complete(&iteration)
            .await?;
        info!(
            evolution_id,
            version,
            total_return = metrics.total_return_pct,
            max_drawdown = metrics.max_drawdown_pct,
            trades = metrics.trades,
            "Iteration completed"
        );

        self.apply_versioning(&evolution, &iteration, best.as_ref())
            .await
    }

    /// Records the best version and advances the base strategy to the prompt
    /// `iteration` produced. Safe to repeat for the same completed iteration.
    pub async fn apply_versioning(
        &self,
        evolution: &Evolution,
        iteration: &Iteration,
        best: Option<&BestVersion>,
    ) -> Result<(), EvolutionError> {
        let already_best = best.is_some_and(|b| b.version == iteration.version);
        if let (Some(m), false) = (&iteration.metrics, already_best) {
            if let Some(reason) = tracker::improvement(m, best) {
                info!(
                    evolution_id = %evolution.id,
                    version = iteration.version,
                    reason = %reason,
                    total_return = m.total_return_pct,
                    max_drawdown = m.max_drawdown_pct,
                    "New best version"
                );
                if let Err(e) = self
                    .deps
                    .evolutions
                    .update_best_version(
                        &evolution.id,
                        iteration.version,
                        m.total_return_pct,
                        m.max_drawdown_pct,
                    )
                    .await
                {
                    error!(evolution_id = %evolution.id, error = %e, "Failed to record best version");
                }
            }
        }

        let strategy = self.save_version_strategy(evolution, iteration).await?;
        if strategy.id != evolution.base_strategy_id {
            self.deps
                .evolutions
                .update_base_strategy(&evolution.id, &strategy.id)
                .await?;
        }
        info!(
            evolution_id = %evolution.id,
            version = iteration.version,
            strategy = %strategy.name,
            "Base strategy advanced"
        );
        Ok(())
    }

    /// Marks an unfinished row as failed after a fatal error.
    pub async fn mark_failed(&self, evolution_id: &str, version: u32) -> Result<(), EvolutionError> {
        if let Some(iteration) = self
            .deps
            .evolutions
            .get_iteration(evolution_id, version)
            .await?
        {
            if !iteration.status.is_terminal() {
                self.deps
                    .evolutions
                    .update_iteration_status(evolution_id, version, IterationStatus::Failed)
                    .await?;
            }
        }
        Ok(())
    }

    async fn plan(
        &self,
        evolution: &Evolution,
        version: u32,
        existing: Option<Iteration>,
    ) -> Result<Plan, EvolutionError> {
        let Some(iteration) = existing else {
            let base = self
                .deps
                .strategies
                .get_strategy(&evolution.owner, &evolution.base_strategy_id)
                .await?;
            return Ok(Plan::Submit(Submission {
                run_id: tracker::new_run_id(version, Utc::now()),
                strategy_id: base.id,
                prompt: prompt_or_default(&base.prompt),
                previous: None,
            }));
        };
        if iteration.status == IterationStatus::Completed {
            return Ok(Plan::Done);
        }

        let run_id = iteration.backtest_run_id.clone();
        let live = self.deps.engine.status(&run_id).await?;
        let has_runner = live.is_some();
        let state = match live {
            Some(status) => Some(status.state),
            None => self
                .deps
                .engine
                .load_metadata(&run_id)
                .await?
                .map(|meta| meta.state),
        };

        match state {
            Some(s) if s.is_live() && has_runner && iteration.status != IterationStatus::Failed => {
                Ok(Plan::Attach(iteration))
            }
            Some(BacktestState::Completed) => Ok(Plan::Evaluate(iteration)),
            Some(s) if s.is_live() || s == BacktestState::Stopped => {
                if s.is_live() {
                    warn!(evolution_id = %evolution.id, version, %run_id, "Backtest is stale, restarting it");
                } else {
                    info!(evolution_id = %evolution.id, version, %run_id, "Restarting stopped backtest");
                }
                self.deps.engine.delete(&run_id).await?;
                let prompt = self.retry_prompt(evolution, &iteration).await?;
                Ok(Plan::Submit(Submission {
                    run_id,
                    strategy_id: iteration.strategy_id,
                    prompt,
                    previous: Some(iteration.status),
                }))
            }
            other => {
                info!(
                    evolution_id = %evolution.id,
                    version,
                    %run_id,
                    state = ?other,
                    "Previous backtest failed or is gone, starting a fresh run"
                );
                let prompt = self.retry_prompt(evolution, &iteration).await?;
                Ok(Plan::Submit(Submission {
                    run_id: tracker::new_run_id(version, Utc::now()),
                    strategy_id: iteration.strategy_id,
                    prompt,
                    previous: Some(iteration.status),
                }))
            }
        }
    }

    // A retried version must test exactly the prompt it was first started with.
    async fn retry_prompt(
        &self,
        evolution: &Evolution,
        iteration: &Iteration,
    ) -> Result<String, EvolutionError> {
        if !iteration.prompt_before.trim().is_empty() {
            return Ok(iteration.prompt_before.clone());
        }
        let base = self
            .deps
            .strategies
            .get_strategy(&evolution.owner, &evolution.base_strategy_id)
            .await?;
        Ok(prompt_or_default(&base.prompt))
    }

    async fn submit(
        &self,
        evolution: &Evolution,
        version: u32,
        submission: Submission,
    ) -> Result<Iteration, EvolutionError> {
        let credentials = self.resolve_credentials(evolution).await?;
        if let Some(previous) = submission.previous {
            if !previous.can_transition_to(IterationStatus::Backtest) {
                return Err(invalid_transition(previous, IterationStatus::Backtest));
            }
        }

        let mut iteration = Iteration::started(
            &evolution.id,
            version,
            &submission.strategy_id,
            &submission.run_id,
            &submission.prompt,
        );
        self.deps.evolutions.create_iteration(&iteration).await?;

        let config = backtest_config(evolution, &iteration, credentials);
        info!(
            evolution_id = %evolution.id,
            version,
            run_id = %iteration.backtest_run_id,
            "Submitting backtest"
        );
        let accepted = self
            .deps
            .engine
            .start(&config)
            .await
            .map_err(|source| EvolutionError::BacktestStart {
                run_id: iteration.backtest_run_id.clone(),
                source,
            })?;

        if accepted != iteration.backtest_run_id {
            warn!(
                requested = %iteration.backtest_run_id,
                %accepted,
                "Engine assigned a different run id"
            );
            iteration.backtest_run_id = accepted;
            self.deps.evolutions.create_iteration(&iteration).await?;
        }
        Ok(iteration)
    }

    /// Polls until the job completes, fails, stalls, or stop is raised.
    async fn wait(&self, run_id: &str, signals: &mut SignalReceiver) -> Result<(), EvolutionError> {
        let mut last_progress: Option<f64> = None;
        let mut last_heartbeat = None;
        let mut last_activity = Instant::now();

        loop {
            if signals.is_stopped() {
                return Err(EvolutionError::Cancelled);
            }

            match self.deps.engine.status(run_id).await? {
                Some(status) => match status.state {
                    BacktestState::Completed => return Ok(()),
                    BacktestState::Failed | BacktestState::Stopped => {
                        return Err(EvolutionError::BacktestFailed {
                            run_id: run_id.to_string(),
                            reason: self.failure_reason(run_id, status.state).await,
                        });
                    }
                    BacktestState::Paused => last_activity = Instant::now(),
                    BacktestState::Running => {
                        let progressed = last_progress != Some(status.progress_pct);
                        let heartbeat =
                            status.last_updated.is_some() && status.last_updated != last_heartbeat;
                        if progressed || heartbeat {
                            last_activity = Instant::now();
                            last_progress = Some(status.progress_pct);
                            last_heartbeat = status.last_updated;
                        } else if last_activity.elapsed() >= self.settings.inactivity_timeout {
                            return Err(EvolutionError::BacktestStalled {
                                run_id: run_id.to_string(),
                                idle_secs: last_activity.elapsed().as_secs(),
                            });
                        }
                        debug!(run_id, progress = status.progress_pct, "Backtest running");
                    }
                },
                // The runner is gone; its persisted state decides.
                None => {
                    return match self.deps.engine.load_metadata(run_id).await? {
                        Some(meta) if meta.state == BacktestState::Completed => Ok(()),
                        Some(meta) => Err(EvolutionError::BacktestFailed {
                            run_id: run_id.to_string(),
                            reason: meta
                                .last_error
                                .filter(|e| !e.trim().is_empty())
                                .unwrap_or_else(|| format!("runner exited in state {}", meta.state)),
                        }),
                        None => Err(EvolutionError::BacktestFailed {
                            run_id: run_id.to_string(),
                            reason: "backtest disappeared without metadata".to_string(),
                        }),
                    };
                }
            }

            signals.sleep(self.settings.poll_interval).await?;
        }
    }

    async fn failure_reason(&self, run_id: &str, state: BacktestState) -> String {
        match self.deps.engine.load_metadata(run_id).await {
            Ok(Some(meta)) => meta.last_error.filter(|e| !e.trim().is_empty()),
            _ => None,
        }
        .unwrap_or_else(|| format!("engine reported the backtest as {state}"))
    }

    async fn sample_trades(&self, run_id: &str) -> Vec<TradeEvent> {
        match self
            .deps
            .engine
            .load_trades(run_id, self.settings.trade_sample_limit)
            .await
        {
            Ok(trades) => trades,
            Err(e) => {
                warn!(run_id, error = %e, "Failed to load trades, continuing without them");
                Vec::new()
            }
        }
    }

    async fn optimize(
        &self,
        iteration: &Iteration,
        metrics: &Metrics,
        trades: &[TradeEvent],
        evaluation: &EvaluationReport,
        iterations: &[Iteration],
        best: Option<&BestVersion>,
    ) -> OptimizationResult {
        let earlier: Vec<Iteration> = iterations
            .iter()
            .filter(|it| it.version != iteration.version)
            .cloned()
            .collect();
        let history = tracker::summarize_history(&earlier, best);
        let current = VersionSnapshot {
            version: iteration.version,
            metrics: Some(metrics),
            trades,
        };

        let current_is_best = tracker::improvement(metrics, best).is_some();
        let best_row = best
            .filter(|_| !current_is_best)
            .and_then(|b| earlier.iter().find(|it| it.version == b.version));

        let Some(best_row) = best_row else {
            return self
                .deps
                .optimizer
                .optimize(&OptimizationInput {
                    base_prompt: &iteration.prompt_before,
                    evaluation,
                    history: &history,
                    current,
                    best: None,
                })
                .await;
        };

        // The rewrite starts from the best version, not the one that just underperformed.
        let best_metrics = match self.deps.engine.get_metrics(&best_row.backtest_run_id).await {
            Ok(m) => Some(m),
            Err(e) => {
                debug!(error = %e, "Best version metrics unavailable from engine, using stored copy");
                best_row.metrics
            }
        };
        let best_trades = self.sample_trades(&best_row.backtest_run_id).await;
        let base_prompt = if best_row.prompt_before.trim().is_empty() {
            &iteration.prompt_before
        } else {
            &best_row.prompt_before
        };

        self.deps
            .optimizer
            .optimize(&OptimizationInput {
                base_prompt,
                evaluation,
                history: &history,
                current,
                best: Some(VersionSnapshot {
                    version: best_row.version,
                    metrics: best_metrics.as_ref(),
                    trades: &best_trades,
                }),
            })
            .await
    }

    async fn save_version_strategy(
        &self,
        evolution: &Evolution,
        iteration: &Iteration,
    ) -> Result<Strategy, EvolutionError> {
        let name = if evolution.name.trim().is_empty() {
            let base = self
                .deps
                .strategies
                .get_strategy(&evolution.owner, &evolution.base_strategy_id)
                .await?;
            tracker::strategy_version_name("", &base.name, iteration.version)
        } else {
            tracker::strategy_version_name(&evolution.name, "", iteration.version)
        };
        let description = format!("Evolution iteration {}", iteration.version);

        match self
            .deps
            .strategies
            .get_strategy_by_name(&evolution.owner, &name)
            .await?
        {
            Some(mut existing) => {
                if existing.prompt != iteration.prompt_after {
                    existing.prompt = iteration.prompt_after.clone();
                    existing.description = description;
                    self.deps.strategies.update_strategy(&existing).await?;
                }
                Ok(existing)
            }
            None => {
                let strategy = Strategy {
                    id: Uuid::new_v4().to_string(),
                    owner: evolution.owner.clone(),
                    name,
                    description,
                    prompt: iteration.prompt_after.clone(),
                };
                self.deps.strategies.create_strategy(&strategy).await?;
                Ok(strategy)
            }
        }
    }

    async fn resolve_credentials(&self, evolution: &Evolution) -> Result<AiCredentials, EvolutionError> {
        let model_id = evolution.fixed_params.ai_model_id.trim();
        if model_id.is_empty() {
            return Err(EvolutionError::Configuration(
                "no AI model is configured for the simulation".to_string(),
            ));
        }
        let model = self
            .deps
            .models
            .get_model(&evolution.owner, model_id)
            .await?
            .ok_or_else(|| EvolutionError::Configuration(format!("AI model {model_id} not found")))?;
        credentials_for(&model)
    }

    async fn transition(
        &self,
        iteration: &mut Iteration,
        next: IterationStatus,
    ) -> Result<(), EvolutionError> {
        if !iteration.status.can_transition_to(next) {
            return Err(invalid_transition(iteration.status, next));
        }
        self.deps
            .evolutions
            .update_iteration_status(&iteration.evolution_id, iteration.version, next)
            .await?;
        iteration.status = next;
        Ok(())
    }
}

/// Credentials the simulation trades with. A disabled model or a missing key
/// is a configuration error.
pub fn credentials_for(model: &AiModel) -> Result<AiCredentials, EvolutionError> {
    if !model.enabled {
        return Err(EvolutionError::Configuration(format!(
            "AI model {} is disabled",
            model.id
        )));
    }
    if model.api_key.trim().is_empty() {
        return Err(EvolutionError::Configuration(format!(
            "AI model {} has no API key",
            model.id
        )));
    }

    let model_name = if model.custom_model_name.trim().is_empty() {
        model.name.trim()
    } else {
        model.custom_model_name.trim()
    };
    let provider = match model.provider.trim() {
        "" => infer_provider(model_name, &model.custom_api_url).to_string(),
        p if p.eq_ignore_ascii_case("inherit") => {
            infer_provider(model_name, &model.custom_api_url).to_string()
        }
        p => p.to_lowercase(),
    };

    Ok(AiCredentials {
        provider,
        api_key: model.api_key.trim().to_string(),
        base_url: model.custom_api_url.trim().to_string(),
        model: model_name.to_string(),
    })
}

pub fn infer_provider(model_name: &str, custom_api_url: &str) -> &'static str {
    let name = model_name.to_lowercase();
    if name.contains("claude") {
        "anthropic"
    } else if name.contains("gpt") {
        "openai"
    } else if name.contains("gemini") {
        "google"
    } else if name.contains("deepseek") {
        "deepseek"
    } else if !custom_api_url.trim().is_empty() {
        "custom"
    } else {
        "openai"
    }
}

fn prompt_or_default(prompt: &str) -> String {
    if prompt.trim().is_empty() {
        DEFAULT_PROMPT.to_string()
    } else {
        prompt.to_string()
    }
}

fn invalid_transition(from: IterationStatus, to: IterationStatus) -> EvolutionError {
    EvolutionError::InvalidTransition {
        kind: "iteration",
        from: from.to_string(),
        to: to.to_string(),
    }
}

fn backtest_config(
    evolution: &Evolution,
    iteration: &Iteration,
    credentials: AiCredentials,
) -> BacktestConfig {
    let p = &evolution.fixed_params;
    BacktestConfig {
        run_id: iteration.backtest_run_id.clone(),
        owner: evolution.owner.clone(),
        strategy_id: iteration.strategy_id.clone(),
        symbols: p.symbols.clone(),
        timeframes: p.timeframes.clone(),
        decision_timeframe: p.decision_timeframe.clone(),
        decision_cadence_nbars: p.decision_cadence_nbars,
        start_ts: p.start_ts,
        end_ts: p.end_ts,
        initial_balance: p.initial_balance,
        fee_bps: p.fee_bps,
        slippage_bps: p.slippage_bps,
        btc_eth_leverage: p.btc_eth_leverage,
        altcoin_leverage: p.altcoin_leverage,
        prompt: iteration.prompt_before.clone(),
        cache_ai: p.cache_ai,
        ai: credentials,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn model(name: &str, provider: &str) -> AiModel {
        AiModel {
            id: "m-1".to_string(),
            owner: "default".to_string(),
            name: name.to_string(),
            provider: provider.to_string(),
            enabled: true,
            api_key: " sk-test ".to_string(),
            custom_api_url: String::new(),
            custom_model_name: String::new(),
        }
    }

    #[test]
    fn test_provider_inference() {
        assert_eq!(infer_provider("Claude-3.5-Sonnet", ""), "anthropic");
        assert_eq!(infer_provider("gpt-4o", ""), "openai");
        assert_eq!(infer_provider("gemini-pro", ""), "google");
        assert_eq!(infer_provider("deepseek-chat", ""), "deepseek");
        assert_eq!(infer_provider("qwen", "https://llm.local/v1"), "custom");
        assert_eq!(infer_provider("qwen", ""), "openai");
    }

    #[test]
    fn test_credentials_respect_explicit_provider() {
        let creds = credentials_for(&model("gpt-4o", "azure")).unwrap();
        assert_eq!(creds.provider, "azure");
        assert_eq!(creds.api_key, "sk-test");

        let creds = credentials_for(&model("claude-3", "inherit")).unwrap();
        assert_eq!(creds.provider, "anthropic");
    }

    #[test]
    fn test_custom_model_name_wins() {
        let mut m = model("my model", "");
        m.custom_model_name = "deepseek-reasoner".to_string();
        m.custom_api_url = "https://api.example.com".to_string();
        let creds = credentials_for(&m).unwrap();
        assert_eq!(creds.model, "deepseek-reasoner");
        assert_eq!(creds.provider, "deepseek");
        assert_eq!(creds.base_url, "https://api.example.com");
    }

    #[test]
    fn test_unusable_models_are_configuration_errors() {
        let mut disabled = model("gpt-4o", "");
        disabled.enabled = false;
        assert!(matches!(
            credentials_for(&disabled),
            Err(EvolutionError::Configuration(_))
        ));

        let mut keyless = model("gpt-4o", "");
        keyless.api_key = "  ".to_string();
        assert!(matches!(
            credentials_for(&keyless),
            Err(EvolutionError::Configuration(_))
        ));
    }

    #[test]
    fn test_empty_prompt_uses_builtin_variant() {
        assert_eq!(prompt_or_default("  "), DEFAULT_PROMPT);
        assert_eq!(prompt_or_default("go long"), "go long");
    }
}
