use ai_client::{AiClient, ChatCompletionsClient};
use analyzer::Evaluator;
use anyhow::Context;
use backtester::HttpBacktestEngine;
use chrono::Utc;
use clap::{Parser, Subcommand};
use comfy_table::presets::UTF8_FULL;
use comfy_table::{ContentArrangement, Table};
use configuration::{Config, init_tracing, load_config, load_config_from, load_evolution_definition};
use core_types::{AiModel, Evolution, EvolutionStatus, Iteration};
use database::{DbRepository, EvolutionStore, ModelStore, StrategyStore, connect, run_migrations};
use evolution::{Collaborators, EvolutionController, IterationRunner, RunnerSettings};
use futures::future::join_all;
use optimizer::Optimizer;
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

/// The main entry point for the evolver application.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file, if there is one.
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => load_config_from(path),
        None => load_config(),
    }
    .context("Failed to load configuration")?;
    let _log_guard = init_tracing(&config.logging)?;

    // Initialize the database connection and run migrations
    let pool = connect(&config.database)
        .await
        .context("Failed to connect to the database")?;
    run_migrations(&pool)
        .await
        .context("Failed to run database migrations")?;
    let repo = Arc::new(DbRepository::new(pool));

    match cli.command {
        Commands::AddModel(args) => handle_add_model(args, &repo).await,
        Commands::Create(args) => handle_create(args, &repo).await,
        Commands::Run(args) => handle_run(args, &config, repo).await,
        Commands::Status(args) => handle_status(args, &repo).await,
        Commands::List(args) => handle_list(args, &repo).await,
    }
}

// ==============================================================================
// CLI Structure
// ==============================================================================

/// Iteratively improves an AI trading strategy prompt by backtesting it,
/// critiquing the result and rewriting the prompt.
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the configuration file (defaults to ./config.toml).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Register (or replace) the AI model the simulation uses for its decisions.
    AddModel(AddModelArgs),
    /// Create an evolution from a definition file.
    Create(CreateArgs),
    /// Start or resume one or more evolutions and wait for them to finish.
    Run(RunArgs),
    /// Show an evolution and its iterations.
    Status(StatusArgs),
    /// List the evolutions of an owner.
    List(ListArgs),
}

#[derive(Parser)]
struct AddModelArgs {
    /// The id referenced by `fixed_params.ai_model_id`.
    #[arg(long)]
    id: String,

    #[arg(long, default_value = "default")]
    owner: String,

    /// Model name, e.g. "deepseek-chat" or "gpt-4o".
    #[arg(long)]
    name: String,

    /// Leave empty (or "inherit") to infer the provider from the name.
    #[arg(long, default_value = "")]
    provider: String,

    /// Environment variable holding the API key, so the key stays out of shell history.
    #[arg(long)]
    api_key_env: String,

    #[arg(long, default_value = "")]
    custom_api_url: String,

    #[arg(long, default_value = "")]
    custom_model_name: String,

    /// Store the model as disabled.
    #[arg(long)]
    disabled: bool,
}

impl AddModelArgs {
    fn into_model(self, api_key: String) -> AiModel {
        AiModel {
            id: self.id,
            owner: self.owner,
            name: self.name,
            provider: self.provider,
            enabled: !self.disabled,
            api_key,
            custom_api_url: self.custom_api_url,
            custom_model_name: self.custom_model_name,
        }
    }
}

#[derive(Parser)]
struct CreateArgs {
    /// The evolution definition (e.g., "evolution.toml").
    #[arg(long)]
    file: PathBuf,
}

#[derive(Parser)]
struct RunArgs {
    /// Evolutions to run concurrently. Repeat the flag for several.
    #[arg(long = "evolution-id", required = true)]
    evolution_ids: Vec<String>,
}

#[derive(Parser)]
struct StatusArgs {
    #[arg(long)]
    evolution_id: String,

    /// Also print each iteration's evaluation and prompts.
    #[arg(long)]
    verbose: bool,
}

#[derive(Parser)]
struct ListArgs {
    #[arg(long, default_value = "default")]
    owner: String,
}

// ==============================================================================
// Command Logic
// ==============================================================================

async fn handle_add_model(args: AddModelArgs, repo: &DbRepository) -> anyhow::Result<()> {
    let api_key = std::env::var(&args.api_key_env)
        .map(|k| k.trim().to_string())
        .ok()
        .filter(|k| !k.is_empty())
        .with_context(|| format!("Environment variable {} is not set", args.api_key_env))?;

    let model = args.into_model(api_key);
    repo.save_model(&model).await?;

    info!(model_id = %model.id, name = %model.name, enabled = model.enabled, "AI model saved");
    println!("Saved AI model {} ({})", model.id, model.name);
    Ok(())
}

async fn handle_create(args: CreateArgs, repo: &DbRepository) -> anyhow::Result<()> {
    let definition = load_evolution_definition(&args.file)
        .with_context(|| format!("Invalid evolution definition {}", args.file.display()))?;

    let base = repo
        .get_strategy(&definition.owner, &definition.base_strategy_id)
        .await
        .context("Base strategy does not exist")?;

    let fixed_params = definition.fixed_params();
    if repo
        .get_model(&definition.owner, &fixed_params.ai_model_id)
        .await?
        .is_none()
    {
        warn!(
            model_id = %fixed_params.ai_model_id,
            "AI model not found; the first iteration will stop with a configuration error"
        );
    }

    let now = Utc::now();
    let evolution = Evolution {
        id: Uuid::new_v4().to_string(),
        owner: definition.owner.clone(),
        name: definition.name.clone(),
        base_strategy_id: base.id.clone(),
        status: EvolutionStatus::Created,
        current_iteration: 0,
        max_iterations: definition.max_iterations,
        convergence_threshold: definition.convergence_threshold,
        best_version: 0,
        best_return: 0.0,
        best_drawdown: 0.0,
        fixed_params,
        created_at: now,
        updated_at: now,
    };
    repo.create_evolution(&evolution).await?;

    info!(evolution_id = %evolution.id, name = %evolution.name, "Evolution created");
    println!(
        "Created evolution {} ({}) from strategy '{}'",
        evolution.id, evolution.name, base.name
    );
    Ok(())
}

async fn handle_run(args: RunArgs, config: &Config, repo: Arc<DbRepository>) -> anyhow::Result<()> {
    // One worker per evolution, however often an id was passed.
    let evolution_ids = unique_ids(args.evolution_ids);

    let reset = repo.reset_running_to_paused(&evolution_ids).await?;
    if reset > 0 {
        warn!(count = reset, "Evolutions left running by a previous process were marked paused");
    }

    let runner = Arc::new(build_runner(config, repo.clone())?);
    let controllers: Vec<Arc<EvolutionController>> = evolution_ids
        .iter()
        .map(|id| Arc::new(EvolutionController::new(id.clone(), runner.clone())))
        .collect();

    // Ctrl-C stops every evolution cooperatively; each saves a resumable checkpoint.
    let stoppers = controllers.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, stopping evolutions");
            for controller in stoppers.iter().filter(|c| c.is_running()) {
                if let Err(e) = controller.stop().await {
                    warn!(evolution_id = %controller.evolution_id(), error = %e, "Failed to stop evolution");
                }
            }
        }
    });

    let tasks: Vec<_> = controllers
        .iter()
        .cloned()
        .map(|controller| {
            tokio::spawn(async move {
                let result = controller.start().await;
                (controller.evolution_id().to_string(), result)
            })
        })
        .collect();

    let results = join_all(tasks).await;

    let mut failures = 0;
    for result in results {
        match result {
            Ok((id, Ok(()))) => {
                let evolution = repo.get_evolution(&id).await?;
                println!(
                    "Evolution {} is {} (best v{}: {:.2}% return, {:.2}% drawdown)",
                    id, evolution.status, evolution.best_version, evolution.best_return, evolution.best_drawdown
                );
            }
            Ok((id, Err(e))) => {
                failures += 1;
                eprintln!("Evolution {id} stopped with an error: {e}");
            }
            Err(e) => {
                failures += 1;
                eprintln!("An evolution task failed: {e}");
            }
        }
    }

    if failures > 0 {
        anyhow::bail!("{failures} evolution(s) stopped with an error; run again to resume");
    }
    Ok(())
}

async fn handle_status(args: StatusArgs, repo: &DbRepository) -> anyhow::Result<()> {
    let evolution = repo.get_evolution(&args.evolution_id).await?;
    let iterations = repo.get_iterations(&evolution.id).await?;

    let mut summary = Table::new();
    summary
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec!["Evolution", "Name", "Status", "Iteration", "Best", "Best Return", "Best Drawdown"]);
    summary.add_row(vec![
        evolution.id.clone(),
        evolution.name.clone(),
        evolution.status.to_string(),
        format!("{}/{}", evolution.current_iteration, evolution.max_iterations),
        format_best(&evolution),
        format!("{:.2}%", evolution.best_return),
        format!("{:.2}%", evolution.best_drawdown),
    ]);
    println!("{summary}");

    if iterations.is_empty() {
        println!("No iterations yet.");
        return Ok(());
    }
    println!("{}", iteration_table(&iterations, evolution.best_version));

    if args.verbose {
        for it in &iterations {
            println!("\n=== v{} ({}) ===", it.version, it.backtest_run_id);
            if let Some(evaluation) = &it.evaluation {
                println!("{}", serde_json::to_string_pretty(evaluation)?);
            }
            println!("--- prompt before ---\n{}", it.prompt_before);
            if !it.prompt_after.is_empty() {
                println!("--- prompt after ---\n{}", it.prompt_after);
            }
        }
    }
    Ok(())
}

async fn handle_list(args: ListArgs, repo: &DbRepository) -> anyhow::Result<()> {
    let evolutions = repo.list_evolutions(&args.owner).await?;
    if evolutions.is_empty() {
        println!("No evolutions for owner '{}'.", args.owner);
        return Ok(());
    }

    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec!["Evolution", "Name", "Status", "Iteration", "Best", "Created"]);
    for e in &evolutions {
        table.add_row(vec![
            e.id.clone(),
            e.name.clone(),
            e.status.to_string(),
            format!("{}/{}", e.current_iteration, e.max_iterations),
            format_best(e),
            e.created_at.format("%Y-%m-%d %H:%M").to_string(),
        ]);
    }
    println!("{table}");
    Ok(())
}

// ==============================================================================
// Helpers
// ==============================================================================

/// Wires the PostgreSQL stores, the remote backtest service and the optional AI client.
fn build_runner(config: &Config, repo: Arc<DbRepository>) -> anyhow::Result<IterationRunner> {
    let client = match ChatCompletionsClient::from_settings(&config.ai)? {
        Some(client) => {
            info!(model = client.model(), "AI evaluation and optimization enabled");
            let client: Arc<dyn AiClient> = Arc::new(client);
            Some(client)
        }
        None => None,
    };
    let engine = HttpBacktestEngine::new(&config.backtest)?;

    let deps = Collaborators {
        evolutions: repo.clone(),
        strategies: repo.clone(),
        models: repo,
        engine: Arc::new(engine),
        evaluator: Evaluator::new(client.clone()),
        optimizer: Optimizer::new(client),
    };
    Ok(IterationRunner::new(deps, RunnerSettings::from(&config.backtest)))
}

/// Drops repeated ids, keeping the first occurrence of each.
fn unique_ids(ids: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    ids.into_iter().filter(|id| seen.insert(id.clone())).collect()
}

fn format_best(evolution: &Evolution) -> String {
    if evolution.best_version == 0 {
        "-".to_string()
    } else {
        format!("v{}", evolution.best_version)
    }
}

fn iteration_table(iterations: &[Iteration], best_version: u32) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec!["Version", "Status", "Return", "Drawdown", "Win Rate", "Sharpe", "Trades", "Changes"]);

    for it in iterations {
        let version = if it.version == best_version {
            format!("v{} *", it.version)
        } else {
            format!("v{}", it.version)
        };
        let metric_cells = match &it.metrics {
            Some(m) => vec![
                format!("{:.2}%", m.total_return_pct),
                format!("{:.2}%", m.max_drawdown_pct),
                format!("{:.1}%", m.win_rate),
                format!("{:.2}", m.sharpe_ratio),
                m.trades.to_string(),
            ],
            None => vec!["-".to_string(); 5],
        };
        let mut row = vec![version, it.status.to_string()];
        row.extend(metric_cells);
        row.push(analyzer::truncate_chars(&it.changes_summary, 60));
        table.add_row(row);
    }
    table
}
