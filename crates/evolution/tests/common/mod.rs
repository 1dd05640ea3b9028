//! In-memory stand-ins for the stores, the backtest engine and the AI client.
#![allow(dead_code)]

use ai_client::AiClient;
use ai_client::error::AiError;
use analyzer::Evaluator;
use async_trait::async_trait;
use backtester::BacktestEngine;
use backtester::error::BacktestError;
use chrono::Utc;
use core_types::{
    AiModel, BacktestConfig, BacktestMetadata, BacktestState, BacktestStatus, Evolution,
    EvolutionStatus, FixedParams, Iteration, IterationStatus, Metrics, Strategy, TradeEvent,
};
use database::{DbError, EvolutionStore, ModelStore, StrategyStore};
use evolution::{Collaborators, EvolutionController, IterationRunner, RunnerSettings};
use optimizer::Optimizer;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const EVOLUTION_ID: &str = "evo-1";
pub const OWNER: &str = "default";
pub const BASE_STRATEGY_ID: &str = "strategy-base";
pub const MODEL_ID: &str = "model-1";

// ==============================================================================
// Stores
// ==============================================================================

#[derive(Default)]
pub struct StoreState {
    pub evolutions: HashMap<String, Evolution>,
    pub iterations: BTreeMap<(String, u32), Iteration>,
    pub strategies: Vec<Strategy>,
    pub models: Vec<AiModel>,
    pub best_version_writes: usize,
}

#[derive(Default)]
pub struct MemoryStore {
    pub state: Mutex<StoreState>,
}

impl MemoryStore {
    pub fn evolution(&self) -> Evolution {
        self.state.lock().unwrap().evolutions[EVOLUTION_ID].clone()
    }

    pub fn edit_evolution(&self, f: impl FnOnce(&mut Evolution)) {
        let mut state = self.state.lock().unwrap();
        f(state.evolutions.get_mut(EVOLUTION_ID).unwrap());
    }

    pub fn iterations(&self) -> Vec<Iteration> {
        self.state.lock().unwrap().iterations.values().cloned().collect()
    }

    pub fn versions(&self) -> Vec<u32> {
        self.iterations().iter().map(|it| it.version).collect()
    }

    pub fn iteration(&self, version: u32) -> Option<Iteration> {
        self.state
            .lock()
            .unwrap()
            .iterations
            .get(&(EVOLUTION_ID.to_string(), version))
            .cloned()
    }

    pub fn strategy_named(&self, name: &str) -> Option<Strategy> {
        self.state
            .lock()
            .unwrap()
            .strategies
            .iter()
            .find(|s| s.name == name)
            .cloned()
    }

    pub fn strategy_count(&self) -> usize {
        self.state.lock().unwrap().strategies.len()
    }
}

#[async_trait]
impl EvolutionStore for MemoryStore {
    async fn create_evolution(&self, evolution: &Evolution) -> Result<(), DbError> {
        let mut state = self.state.lock().unwrap();
        state
            .evolutions
            .insert(evolution.id.clone(), evolution.clone());
        Ok(())
    }

    async fn get_evolution(&self, evolution_id: &str) -> Result<Evolution, DbError> {
        self.state
            .lock()
            .unwrap()
            .evolutions
            .get(evolution_id)
            .cloned()
            .ok_or_else(|| DbError::NotFound(format!("evolution {evolution_id}")))
    }

    async fn list_evolutions(&self, owner: &str) -> Result<Vec<Evolution>, DbError> {
        let state = self.state.lock().unwrap();
        Ok(state
            .evolutions
            .values()
            .filter(|e| e.owner == owner)
            .cloned()
            .collect())
    }

    async fn update_status(
        &self,
        evolution_id: &str,
        status: EvolutionStatus,
    ) -> Result<(), DbError> {
        let mut state = self.state.lock().unwrap();
        let evolution = state
            .evolutions
            .get_mut(evolution_id)
            .ok_or_else(|| DbError::NotFound(evolution_id.to_string()))?;
        evolution.status = status;
        Ok(())
    }

    async fn update_current_iteration(
        &self,
        evolution_id: &str,
        version: u32,
    ) -> Result<(), DbError> {
        let mut state = self.state.lock().unwrap();
        let evolution = state
            .evolutions
            .get_mut(evolution_id)
            .ok_or_else(|| DbError::NotFound(evolution_id.to_string()))?;
        evolution.current_iteration = evolution.current_iteration.max(version);
        Ok(())
    }

    async fn update_best_version(
        &self,
        evolution_id: &str,
        version: u32,
        best_return: f64,
        best_drawdown: f64,
    ) -> Result<(), DbError> {
        let mut state = self.state.lock().unwrap();
        state.best_version_writes += 1;
        let evolution = state
            .evolutions
            .get_mut(evolution_id)
            .ok_or_else(|| DbError::NotFound(evolution_id.to_string()))?;
        evolution.best_version = version;
        evolution.best_return = best_return;
        evolution.best_drawdown = best_drawdown;
        Ok(())
    }

    async fn update_base_strategy(
        &self,
        evolution_id: &str,
        strategy_id: &str,
    ) -> Result<(), DbError> {
        let mut state = self.state.lock().unwrap();
        let evolution = state
            .evolutions
            .get_mut(evolution_id)
            .ok_or_else(|| DbError::NotFound(evolution_id.to_string()))?;
        evolution.base_strategy_id = strategy_id.to_string();
        Ok(())
    }

    async fn reset_running_to_paused(&self, evolution_ids: &[String]) -> Result<u64, DbError> {
        let mut state = self.state.lock().unwrap();
        let mut changed = 0;
        for evolution in state.evolutions.values_mut() {
            if evolution.status == EvolutionStatus::Running && evolution_ids.contains(&evolution.id) {
                evolution.status = EvolutionStatus::Paused;
                changed += 1;
            }
        }
        Ok(changed)
    }

    async fn create_iteration(&self, iteration: &Iteration) -> Result<(), DbError> {
        let mut state = self.state.lock().unwrap();
        let key = (iteration.evolution_id.clone(), iteration.version);
        // Same guard as the SQL upsert: a completed row is never overwritten.
        if state
            .iterations
            .get(&key)
            .is_some_and(|it| it.status == IterationStatus::Completed)
        {
            return Ok(());
        }
        state.iterations.insert(key, iteration.clone());
        Ok(())
    }

    async fn update_iteration_status(
        &self,
        evolution_id: &str,
        version: u32,
        status: IterationStatus,
    ) -> Result<(), DbError> {
        let mut state = self.state.lock().unwrap();
        let iteration = state
            .iterations
            .get_mut(&(evolution_id.to_string(), version))
            .ok_or_else(|| DbError::NotFound(format!("iteration {version}")))?;
        iteration.status = status;
        Ok(())
    }

    async fn update_iteration_complete(&self, iteration: &Iteration) -> Result<(), DbError> {
        let mut state = self.state.lock().unwrap();
        let key = (iteration.evolution_id.clone(), iteration.version);
        if let Some(existing) = state.iterations.get_mut(&key) {
            if existing.status != IterationStatus::Completed {
                *existing = iteration.clone();
            }
        }
        Ok(())
    }

    async fn get_iteration(
        &self,
        evolution_id: &str,
        version: u32,
    ) -> Result<Option<Iteration>, DbError> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .iterations
            .get(&(evolution_id.to_string(), version))
            .cloned())
    }

    async fn get_iterations(&self, evolution_id: &str) -> Result<Vec<Iteration>, DbError> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .iterations
            .values()
            .filter(|it| it.evolution_id == evolution_id)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl StrategyStore for MemoryStore {
    async fn get_strategy(&self, owner: &str, strategy_id: &str) -> Result<Strategy, DbError> {
        self.state
            .lock()
            .unwrap()
            .strategies
            .iter()
            .find(|s| s.owner == owner && s.id == strategy_id)
            .cloned()
            .ok_or_else(|| DbError::NotFound(format!("strategy {strategy_id}")))
    }

    async fn get_strategy_by_name(
        &self,
        owner: &str,
        name: &str,
    ) -> Result<Option<Strategy>, DbError> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .strategies
            .iter()
            .find(|s| s.owner == owner && s.name == name)
            .cloned())
    }

    async fn create_strategy(&self, strategy: &Strategy) -> Result<(), DbError> {
        self.state.lock().unwrap().strategies.push(strategy.clone());
        Ok(())
    }

    async fn update_strategy(&self, strategy: &Strategy) -> Result<(), DbError> {
        let mut state = self.state.lock().unwrap();
        if let Some(existing) = state.strategies.iter_mut().find(|s| s.id == strategy.id) {
            *existing = strategy.clone();
        }
        Ok(())
    }
}

#[async_trait]
impl ModelStore for MemoryStore {
    async fn get_model(&self, owner: &str, model_id: &str) -> Result<Option<AiModel>, DbError> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .models
            .iter()
            .find(|m| m.owner == owner && m.id == model_id)
            .cloned())
    }
}

// ==============================================================================
// Backtest Engine
// ==============================================================================

/// How newly started jobs behave.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum JobMode {
    /// Finished after the given number of status polls.
    CompleteAfter(u32),
    /// Runs forever, sending a fresh heartbeat on every poll.
    Heartbeat,
    /// Runs forever with no progress and no heartbeat.
    Hang,
    /// Reports failure on the first poll.
    Fail,
}

#[derive(Debug, Clone)]
pub struct Job {
    pub state: BacktestState,
    pub has_runner: bool,
    pub mode: JobMode,
    pub polls: u32,
    pub metrics: Metrics,
}

pub struct EngineState {
    pub mode: JobMode,
    pub jobs: HashMap<String, Job>,
    pub started: Vec<BacktestConfig>,
    pub deleted: Vec<String>,
    /// Metrics handed to jobs in start order; the last entry repeats.
    pub script: VecDeque<Metrics>,
}

pub struct FakeEngine {
    pub state: Mutex<EngineState>,
}

impl FakeEngine {
    pub fn new(returns: &[(f64, f64)]) -> Self {
        let script = returns
            .iter()
            .map(|&(ret, dd)| Metrics {
                total_return_pct: ret,
                max_drawdown_pct: dd,
                win_rate: 48.0,
                sharpe_ratio: 1.1,
                profit_factor: 1.3,
                trades: 20,
            })
            .collect();
        Self {
            state: Mutex::new(EngineState {
                mode: JobMode::CompleteAfter(0),
                jobs: HashMap::new(),
                started: Vec::new(),
                deleted: Vec::new(),
                script,
            }),
        }
    }

    pub fn set_mode(&self, mode: JobMode) {
        self.state.lock().unwrap().mode = mode;
    }

    pub fn started(&self) -> Vec<BacktestConfig> {
        self.state.lock().unwrap().started.clone()
    }

    pub fn start_count(&self) -> usize {
        self.state.lock().unwrap().started.len()
    }

    pub fn deleted(&self) -> Vec<String> {
        self.state.lock().unwrap().deleted.clone()
    }

    /// Simulates an engine restart: every job loses its runner but keeps its metadata.
    pub fn drop_runners(&self) {
        for job in self.state.lock().unwrap().jobs.values_mut() {
            job.has_runner = false;
        }
    }

    /// Finishes every job that is still running.
    pub fn finish_all(&self) {
        for job in self.state.lock().unwrap().jobs.values_mut() {
            if job.state.is_live() {
                job.state = BacktestState::Completed;
            }
        }
    }
}

#[async_trait]
impl BacktestEngine for FakeEngine {
    async fn start(&self, config: &BacktestConfig) -> Result<String, BacktestError> {
        let mut state = self.state.lock().unwrap();
        let metrics = if state.script.len() > 1 {
            state.script.pop_front().unwrap_or_default()
        } else {
            state.script.front().copied().unwrap_or_default()
        };
        let mode = state.mode;
        state.jobs.insert(
            config.run_id.clone(),
            Job {
                state: BacktestState::Running,
                has_runner: true,
                mode,
                polls: 0,
                metrics,
            },
        );
        state.started.push(config.clone());
        Ok(config.run_id.clone())
    }

    async fn status(&self, run_id: &str) -> Result<Option<BacktestStatus>, BacktestError> {
        let mut state = self.state.lock().unwrap();
        let Some(job) = state.jobs.get_mut(run_id).filter(|job| job.has_runner) else {
            return Ok(None);
        };
        job.polls += 1;
        if job.state == BacktestState::Running {
            match job.mode {
                JobMode::CompleteAfter(n) if job.polls > n => job.state = BacktestState::Completed,
                JobMode::Fail => job.state = BacktestState::Failed,
                _ => {}
            }
        }
        let (progress_pct, last_updated) = match job.mode {
            JobMode::Hang => (10.0, None),
            JobMode::Heartbeat => (10.0, Some(Utc::now())),
            _ => (f64::from(job.polls), Some(Utc::now())),
        };
        Ok(Some(BacktestStatus {
            state: job.state,
            progress_pct,
            last_updated,
        }))
    }

    async fn get_metrics(&self, run_id: &str) -> Result<Metrics, BacktestError> {
        self.state
            .lock()
            .unwrap()
            .jobs
            .get(run_id)
            .map(|job| job.metrics)
            .ok_or_else(|| BacktestError::RunNotFound(run_id.to_string()))
    }

    async fn load_trades(
        &self,
        run_id: &str,
        limit: usize,
    ) -> Result<Vec<TradeEvent>, BacktestError> {
        let trades = (0..3)
            .map(|i| TradeEvent {
                timestamp: 1_700_000_000_000 + i * 3_600_000,
                symbol: "BTCUSDT".to_string(),
                action: "close_long".to_string(),
                price: 40_000.0 + i as f64,
                realized_pnl: if i % 2 == 0 { 12.5 } else { -4.0 },
                note: format!("{run_id} trade {i}"),
                ..TradeEvent::default()
            })
            .take(limit)
            .collect();
        Ok(trades)
    }

    async fn load_metadata(
        &self,
        run_id: &str,
    ) -> Result<Option<BacktestMetadata>, BacktestError> {
        Ok(self.state.lock().unwrap().jobs.get(run_id).map(|job| BacktestMetadata {
            run_id: run_id.to_string(),
            state: job.state,
            progress_pct: f64::from(job.polls),
            last_error: (job.state == BacktestState::Failed)
                .then(|| "simulated engine failure".to_string()),
        }))
    }

    async fn delete(&self, run_id: &str) -> Result<(), BacktestError> {
        let mut state = self.state.lock().unwrap();
        state.jobs.remove(run_id);
        state.deleted.push(run_id.to_string());
        Ok(())
    }
}

// ==============================================================================
// AI Client
// ==============================================================================

/// Answers evaluator calls with a fixed report and optimizer calls with
/// `prompt <n>`, recording every user prompt it receives.
#[derive(Default)]
pub struct ScriptedAi {
    pub optimizations: AtomicUsize,
    pub optimizer_prompts: Mutex<Vec<String>>,
}

#[async_trait]
impl AiClient for ScriptedAi {
    async fn call_with_messages(&self, system: &str, user: &str) -> Result<String, AiError> {
        if system == optimizer::prompt::SYSTEM_PROMPT {
            let n = self.optimizations.fetch_add(1, Ordering::SeqCst) + 1;
            self.optimizer_prompts.lock().unwrap().push(user.to_string());
            return Ok(format!(
                "{{\"changes\": [\"rewrite {n}\"], \"new_prompt\": \"prompt {n}\", \"expected_effect\": \"better\"}}"
            ));
        }
        Ok(
            "{\"strengths\": [\"clean exits\"], \"weaknesses\": [\"late entries\"], \"suggestions\": [\"enter earlier\"]}"
                .to_string(),
        )
    }
}

// ==============================================================================
// Harness
// ==============================================================================

pub struct Harness {
    pub store: Arc<MemoryStore>,
    pub engine: Arc<FakeEngine>,
    pub ai: Option<Arc<ScriptedAi>>,
    pub runner: Arc<IterationRunner>,
    pub controller: Arc<EvolutionController>,
}

pub fn fast_settings() -> RunnerSettings {
    RunnerSettings {
        poll_interval: Duration::from_millis(10),
        inactivity_timeout: Duration::from_secs(30),
        trade_sample_limit: 100,
    }
}

pub fn evolution(max_iterations: u32, convergence_threshold: u32) -> Evolution {
    Evolution {
        id: EVOLUTION_ID.to_string(),
        owner: OWNER.to_string(),
        name: "trend".to_string(),
        base_strategy_id: BASE_STRATEGY_ID.to_string(),
        status: EvolutionStatus::Created,
        current_iteration: 0,
        max_iterations,
        convergence_threshold,
        best_version: 0,
        best_return: 0.0,
        best_drawdown: 0.0,
        fixed_params: FixedParams {
            symbols: vec!["BTCUSDT".to_string(), "ETHUSDT".to_string()],
            timeframes: vec!["4h".to_string()],
            start_ts: 1_704_067_200_000,
            end_ts: 1_711_929_599_000,
            initial_balance: 10_000.0,
            fee_bps: 5.0,
            slippage_bps: 2.0,
            decision_timeframe: "4h".to_string(),
            decision_cadence_nbars: 1,
            btc_eth_leverage: 5,
            altcoin_leverage: 3,
            ai_model_id: MODEL_ID.to_string(),
            cache_ai: false,
        },
        created_at: Utc::now(),
        updated_at: Utc::now(),
    }
}

pub fn model(enabled: bool) -> AiModel {
    AiModel {
        id: MODEL_ID.to_string(),
        owner: OWNER.to_string(),
        name: "deepseek-chat".to_string(),
        provider: String::new(),
        enabled,
        api_key: "sk-sim".to_string(),
        custom_api_url: String::new(),
        custom_model_name: String::new(),
    }
}

pub struct HarnessBuilder {
    evolution: Evolution,
    returns: Vec<(f64, f64)>,
    with_ai: bool,
    model_enabled: bool,
    base_prompt: String,
    settings: RunnerSettings,
}

impl HarnessBuilder {
    pub fn new(max_iterations: u32, convergence_threshold: u32) -> Self {
        Self {
            evolution: evolution(max_iterations, convergence_threshold),
            returns: vec![(5.0, 15.0)],
            with_ai: true,
            model_enabled: true,
            base_prompt: "seed prompt".to_string(),
            settings: fast_settings(),
        }
    }

    pub fn returns(mut self, returns: &[(f64, f64)]) -> Self {
        self.returns = returns.to_vec();
        self
    }

    pub fn without_ai(mut self) -> Self {
        self.with_ai = false;
        self
    }

    pub fn model_enabled(mut self, enabled: bool) -> Self {
        self.model_enabled = enabled;
        self
    }

    pub fn base_prompt(mut self, prompt: &str) -> Self {
        self.base_prompt = prompt.to_string();
        self
    }

    pub fn settings(mut self, settings: RunnerSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn build(self) -> Harness {
        let store = Arc::new(MemoryStore::default());
        {
            let mut state = store.state.lock().unwrap();
            state
                .evolutions
                .insert(self.evolution.id.clone(), self.evolution.clone());
            state.strategies.push(Strategy {
                id: BASE_STRATEGY_ID.to_string(),
                owner: OWNER.to_string(),
                name: "trend_base".to_string(),
                description: String::new(),
                prompt: self.base_prompt.clone(),
            });
            state.models.push(model(self.model_enabled));
        }

        let engine = Arc::new(FakeEngine::new(&self.returns));
        let ai = self.with_ai.then(|| Arc::new(ScriptedAi::default()));
        let client: Option<Arc<dyn AiClient>> = match &ai {
            Some(ai) => {
                let client: Arc<dyn AiClient> = ai.clone();
                Some(client)
            }
            None => None,
        };

        let deps = Collaborators {
            evolutions: store.clone(),
            strategies: store.clone(),
            models: store.clone(),
            engine: engine.clone(),
            evaluator: Evaluator::new(client.clone()),
            optimizer: Optimizer::new(client),
        };
        let runner = Arc::new(IterationRunner::new(deps, self.settings));
        let controller = Arc::new(EvolutionController::new(EVOLUTION_ID, runner.clone()));

        Harness {
            store,
            engine,
            ai,
            runner,
            controller,
        }
    }
}

/// Polls `check` until it holds, panicking after two seconds.
pub async fn eventually(what: &str, mut check: impl FnMut() -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while !check() {
        assert!(tokio::time::Instant::now() < deadline, "timed out waiting for {what}");
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}
