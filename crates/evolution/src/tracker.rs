//! Best-version and convergence bookkeeping.
//!
//! Everything here is a pure function of persisted records so the rules can be
//! tested without a backtest engine.

use chrono::{DateTime, Utc};
use core_types::{Evolution, Iteration, IterationStatus, Metrics};
use optimizer::IterationSummary;
use std::fmt;

/// How far below the best return a candidate may fall and still win on drawdown.
pub const RETURN_TOLERANCE_PCT: f64 = 3.0;

/// Drawdown reduction needed for the tolerance above to apply.
pub const DRAWDOWN_GAIN_PCT: f64 = 5.0;

/// Return deltas at or below this count as no progress.
pub const CONVERGENCE_MARGIN_PCT: f64 = 1.0;

/// The evolution's best version so far.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BestVersion {
    pub version: u32,
    pub total_return: f64,
    pub max_drawdown: f64,
}

/// Why a candidate became the new best.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Improvement {
    FirstResult,
    HigherReturn,
    LowerDrawdown,
}

impl fmt::Display for Improvement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Improvement::FirstResult => "first recorded result",
            Improvement::HigherReturn => "higher return",
            Improvement::LowerDrawdown => "similar return with better drawdown",
        })
    }
}

pub fn is_improvement(
    candidate_return: f64,
    candidate_drawdown: f64,
    best_return: f64,
    best_drawdown: f64,
) -> bool {
    let return_diff = candidate_return - best_return;
    let drawdown_gain = best_drawdown - candidate_drawdown;
    return_diff > 0.0 || (return_diff >= -RETURN_TOLERANCE_PCT && drawdown_gain >= DRAWDOWN_GAIN_PCT)
}

/// Applies [`is_improvement`] and says which branch won. Anything beats "no best".
pub fn improvement(candidate: &Metrics, best: Option<&BestVersion>) -> Option<Improvement> {
    let Some(best) = best else {
        return Some(Improvement::FirstResult);
    };
    if candidate.total_return_pct > best.total_return {
        Some(Improvement::HigherReturn)
    } else if is_improvement(
        candidate.total_return_pct,
        candidate.max_drawdown_pct,
        best.total_return,
        best.max_drawdown,
    ) {
        Some(Improvement::LowerDrawdown)
    } else {
        None
    }
}

/// The evolution's best version, or `None` while nothing has been recorded.
///
/// Rows written before drawdown was tracked carry a zero best drawdown; the
/// best iteration's stored metrics fill it in.
pub fn current_best(evolution: &Evolution, iterations: &[Iteration]) -> Option<BestVersion> {
    if evolution.best_version == 0 {
        return None;
    }
    let mut max_drawdown = evolution.best_drawdown;
    if max_drawdown == 0.0 {
        if let Some(m) = iterations
            .iter()
            .find(|it| it.version == evolution.best_version)
            .and_then(|it| it.metrics.as_ref())
        {
            max_drawdown = m.max_drawdown_pct;
        }
    }
    Some(BestVersion {
        version: evolution.best_version,
        total_return: evolution.best_return,
        max_drawdown,
    })
}

/// Whether the last `threshold` returns have stopped moving.
///
/// `returns` are the completed versions in version order. A threshold of 0
/// disables early stopping, and a window shorter than the threshold never
/// converges.
pub fn has_converged(returns: &[f64], threshold: u32) -> bool {
    let window = threshold as usize;
    if window < 2 || returns.len() < window {
        return false;
    }
    returns[returns.len() - window..]
        .windows(2)
        .all(|pair| pair[1] - pair[0] <= CONVERGENCE_MARGIN_PCT)
}

/// Returns of completed versions, in version order.
pub fn completed_returns(iterations: &[Iteration]) -> Vec<f64> {
    let mut completed: Vec<_> = iterations
        .iter()
        .filter(|it| it.status == IterationStatus::Completed)
        .filter_map(|it| it.metrics.map(|m| (it.version, m.total_return_pct)))
        .collect();
    completed.sort_by_key(|(version, _)| *version);
    completed.into_iter().map(|(_, ret)| ret).collect()
}

/// The version `start` should run first.
///
/// `current_status` is the status of the row for `current_iteration`, if one
/// was written. A finished row moves on; anything else is retried in place.
pub fn resume_point(current_iteration: u32, current_status: Option<IterationStatus>) -> u32 {
    if current_iteration == 0 {
        return 1;
    }
    match current_status {
        Some(IterationStatus::Completed) => current_iteration + 1,
        _ => current_iteration,
    }
}

/// Condenses earlier versions for the optimizer prompt.
pub fn summarize_history(
    iterations: &[Iteration],
    best: Option<&BestVersion>,
) -> Vec<IterationSummary> {
    iterations
        .iter()
        .filter_map(|it| {
            let m = it.metrics.as_ref()?;
            let is_best = best.is_some_and(|b| b.version == it.version);
            let failed = match best {
                Some(b) if !is_best => !is_improvement(
                    m.total_return_pct,
                    m.max_drawdown_pct,
                    b.total_return,
                    b.max_drawdown,
                ),
                _ => false,
            };
            Some(IterationSummary {
                version: it.version,
                total_return: m.total_return_pct,
                max_drawdown: m.max_drawdown_pct,
                changes: it.changes_summary.clone(),
                is_best,
                failed,
            })
        })
        .collect()
}

/// Name of the strategy record holding the prompt produced by `version`.
pub fn strategy_version_name(evolution_name: &str, base_strategy_name: &str, version: u32) -> String {
    let stem = if evolution_name.trim().is_empty() {
        match base_strategy_name.find("_v") {
            Some(idx) if idx > 0 => &base_strategy_name[..idx],
            _ => base_strategy_name,
        }
    } else {
        evolution_name
    };
    format!("{stem}_v{version}")
}

/// A fresh backtest run id for `version`.
pub fn new_run_id(version: u32, now: DateTime<Utc>) -> String {
    format!("evo-{}-epoch-{}", now.format("%Y%m%d-%H%M%S-%3f"), version)
}
