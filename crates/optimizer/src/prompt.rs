use crate::{IterationSummary, OptimizationInput, VersionSnapshot};
use analyzer::write_metrics;
use chrono::DateTime;
use core_types::{EvaluationReport, TradeEvent};
use std::fmt::Write;

/// Trades listed per side in the comparison tables.
pub const COMPARISON_TRADES: usize = 5;

/// Consecutive failed versions after which the model is told to simplify.
pub const FAILURE_STREAK_WARNING: usize = 3;

const NOTE_MAX_CHARS: usize = 50;

pub const SYSTEM_PROMPT: &str = r#"You are a prompt engineer for an AI-driven crypto futures trading strategy. You rewrite the strategy prompt so the next backtest performs better.

## Principles
- Position size matters more than win rate. A few large winners usually decide total profitability,
  so never trade away position size for a marginal win-rate gain.
- Do not make the strategy more conservative just because you see drawdown.
- Do not add more than two mandatory entry conditions, and do not cut trading frequency by more than 30%.

## Priorities, in order
1. Stop-loss execution: losses far beyond the intended stop mean the rule is not being followed.
   Make the stop check explicit, with a worked numeric example, and put it first in the decision flow.
2. Chasing: a profitable exit followed by an immediate reverse entry at a worse price.
   Add a cooldown before reversing.
3. Position sizing: keep or increase size on high-confidence signals.
4. Entry timing: tune existing thresholds rather than adding new conditions.
5. Exits: let winners run, cut losers fast, improve trailing stops.
6. Filters, only when three or more versions show the same bad-entry pattern.

## Learning from failed versions
- If a failed version shrank positions, revert that and size up.
- If a failed version added filters, remove them and tune existing parameters instead.
- After three or more consecutive failures, return to the best version's sizing and simplify.

Identify a concrete problem pattern in the trades before changing anything. Generic edits are not useful.

## Reply with JSON only
{
  "changes": ["one specific change"],
  "new_prompt": "the complete rewritten strategy prompt",
  "expected_effect": "what should improve",
  "reasoning": "why this change should work"
}

new_prompt must be the full prompt, not a diff."#;

pub fn build_user_prompt(input: &OptimizationInput<'_>) -> String {
    let mut out = String::from("## Current Strategy Prompt\n\n```\n");
    out.push_str(input.base_prompt);
    out.push_str("\n```\n\n");

    write_evaluation(&mut out, input.evaluation);

    if !input.history.is_empty() {
        write_history(&mut out, input.history);
    }

    match &input.best {
        Some(best) => write_comparison(&mut out, &input.current, best),
        None => write_current_only(&mut out, &input.current),
    }

    out.push_str("\nOptimize the prompt and reply with the JSON described above.");
    out
}

fn write_evaluation(out: &mut String, report: &EvaluationReport) {
    out.push_str("## Evaluation Results\n\n### Strengths\n");
    for s in &report.strengths {
        let _ = writeln!(out, "- {s}");
    }
    out.push_str("\n### Weaknesses\n");
    for w in &report.weaknesses {
        let _ = writeln!(out, "- {w}");
    }
    out.push_str("\n### Suggestions\n");
    for s in &report.suggestions {
        let _ = writeln!(out, "- {s}");
    }
}

/// Length of the run of failed versions at the end of the history.
pub fn trailing_failures(history: &[IterationSummary]) -> usize {
    history.iter().rev().take_while(|h| h.failed).count()
}

fn write_history(out: &mut String, history: &[IterationSummary]) {
    out.push_str("\n## Previous Iterations\n\n");

    if let Some(best) = history.iter().find(|h| h.is_best) {
        let _ = writeln!(
            out,
            "### Best Performing (v{}): Return {:.2}%, Drawdown {:.2}%",
            best.version, best.total_return, best.max_drawdown
        );
        out.push_str("This is the baseline. Improve on it; do not make it worse.\n\n");
    }

    let streak = trailing_failures(history);
    if streak >= FAILURE_STREAK_WARNING {
        let _ = writeln!(out, "### WARNING: {streak} consecutive failed iterations");
        out.push_str("Stop adding complexity. Simplify the strategy instead.\n\n");
    }

    let failed: Vec<_> = history.iter().filter(|h| h.failed).collect();
    if !failed.is_empty() {
        out.push_str("### Failed Attempts\n");
        for h in &failed {
            let _ = writeln!(out, "- v{}: Return {:.2}% - {}", h.version, h.total_return, h.changes);
        }
        out.push_str("\nFind what these attempts have in common and do not repeat it.\n\n");
    }

    out.push_str("### All Iterations\n");
    for h in history {
        let tag = if h.is_best {
            " [BEST]"
        } else if h.failed {
            " [FAILED]"
        } else {
            ""
        };
        let _ = writeln!(
            out,
            "- v{}: Return {:.2}%, Drawdown {:.2}%{}",
            h.version, h.total_return, h.max_drawdown, tag
        );
    }
}

fn write_comparison(out: &mut String, current: &VersionSnapshot<'_>, best: &VersionSnapshot<'_>) {
    out.push_str("\n## Performance Comparison: Current vs Best\n\n");
    let _ = writeln!(
        out,
        "Current version (v{}) vs best version (v{})\n",
        current.version, best.version
    );

    if let (Some(c), Some(b)) = (current.metrics, best.metrics) {
        out.push_str("### Metrics\n");
        out.push_str("| Metric | Current | Best | Diff |\n");
        out.push_str("|--------|---------|------|------|\n");
        let _ = writeln!(
            out,
            "| Return | {:.2}% | {:.2}% | {:.2}% |",
            c.total_return_pct,
            b.total_return_pct,
            c.total_return_pct - b.total_return_pct
        );
        let _ = writeln!(
            out,
            "| Drawdown | {:.2}% | {:.2}% | {:.2}% |",
            c.max_drawdown_pct,
            b.max_drawdown_pct,
            c.max_drawdown_pct - b.max_drawdown_pct
        );
        let _ = writeln!(
            out,
            "| Win Rate | {:.1}% | {:.1}% | {:.1}% |",
            c.win_rate,
            b.win_rate,
            c.win_rate - b.win_rate
        );
        let _ = writeln!(
            out,
            "| Trades | {} | {} | {} |\n",
            c.trades,
            b.trades,
            i64::from(c.trades) - i64::from(b.trades)
        );
    }

    if !current.trades.is_empty() {
        let _ = writeln!(out, "### Current Version (v{}) Sample Trades", current.version);
        write_trade_table(out, current.trades, COMPARISON_TRADES);
    }
    if !best.trades.is_empty() {
        let _ = writeln!(out, "### Best Version (v{}) Sample Trades", best.version);
        write_trade_table(out, best.trades, COMPARISON_TRADES);
    }

    out.push_str(
        "\nCompare the trading decisions of the two versions and identify what the best version \
         did differently. Build the new prompt from the BEST version's prompt shown above.\n",
    );
}

fn write_current_only(out: &mut String, current: &VersionSnapshot<'_>) {
    if !current.trades.is_empty() {
        out.push_str("\n## Current Best Version Trades\n\n");
        write_trade_table(out, current.trades, COMPARISON_TRADES);
    }
    if let Some(m) = current.metrics {
        out.push_str("\n## Current Metrics\n\n");
        write_metrics(out, m);
    }
}

pub fn write_trade_table(out: &mut String, trades: &[TradeEvent], limit: usize) {
    if trades.is_empty() {
        out.push_str("No trades recorded.\n\n");
        return;
    }

    out.push_str("| Time | Action | Price | Note |\n");
    out.push_str("|------|--------|-------|------|\n");
    for t in trades.iter().take(limit) {
        let time = DateTime::from_timestamp_millis(t.timestamp)
            .map(|dt| dt.format("%m-%d %H:%M").to_string())
            .unwrap_or_else(|| "-".to_string());
        let _ = writeln!(
            out,
            "| {} | {} | {:.2} | {} |",
            time,
            t.action,
            t.price,
            short_note(&t.note)
        );
    }
    if trades.len() > limit {
        let _ = writeln!(out, "\n... and {} more trades", trades.len() - limit);
    }
    out.push('\n');
}

fn short_note(note: &str) -> String {
    if note.chars().count() <= NOTE_MAX_CHARS {
        return note.to_string();
    }
    let kept: String = note.chars().take(NOTE_MAX_CHARS - 3).collect();
    format!("{kept}...")
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_types::Metrics;

    fn summary(version: u32, is_best: bool, failed: bool) -> IterationSummary {
        IterationSummary {
            version,
            total_return: version as f64,
            max_drawdown: 10.0,
            changes: format!("change {version}"),
            is_best,
            failed,
        }
    }

    fn trade(ts: i64, note: &str) -> TradeEvent {
        TradeEvent {
            timestamp: ts,
            symbol: "BTCUSDT".to_string(),
            action: "open_long".to_string(),
            price: 100.0,
            note: note.to_string(),
            ..TradeEvent::default()
        }
    }

    #[test]
    fn test_streak_counts_only_the_tail() {
        let history = vec![
            summary(1, false, true),
            summary(2, true, false),
            summary(3, false, true),
            summary(4, false, true),
        ];
        assert_eq!(trailing_failures(&history), 2);
        assert_eq!(trailing_failures(&[]), 0);
    }

    #[test]
    fn test_history_warns_after_three_failures() {
        let history = vec![
            summary(1, true, false),
            summary(2, false, true),
            summary(3, false, true),
            summary(4, false, true),
        ];
        let mut out = String::new();
        write_history(&mut out, &history);
        assert!(out.contains("Best Performing (v1)"));
        assert!(out.contains("WARNING: 3 consecutive failed iterations"));
        assert!(out.contains("- v3: Return 3.00% - change 3"));
        assert!(out.contains("- v4: Return 4.00%, Drawdown 10.00% [FAILED]"));
    }

    #[test]
    fn test_trade_table_limits_rows_and_notes() {
        let long_note = "n".repeat(60);
        let trades: Vec<_> = (0..7).map(|i| trade(i * 60_000, &long_note)).collect();
        let mut out = String::new();
        write_trade_table(&mut out, &trades, COMPARISON_TRADES);
        assert_eq!(out.matches("| open_long |").count(), 5);
        assert!(out.contains("... and 2 more trades"));
        assert!(out.contains(&format!("{}...", "n".repeat(47))));
        assert!(out.contains("| 01-01 00:01 |"));
    }

    #[test]
    fn test_comparison_shows_metric_diffs() {
        let current = Metrics {
            total_return_pct: 15.8,
            max_drawdown_pct: 18.0,
            win_rate: 45.0,
            trades: 30,
            ..Metrics::default()
        };
        let best = Metrics {
            total_return_pct: 19.3,
            max_drawdown_pct: 20.0,
            win_rate: 50.0,
            trades: 34,
            ..Metrics::default()
        };
        let mut out = String::new();
        write_comparison(
            &mut out,
            &VersionSnapshot { version: 3, metrics: Some(&current), trades: &[] },
            &VersionSnapshot { version: 2, metrics: Some(&best), trades: &[] },
        );
        assert!(out.contains("Current version (v3) vs best version (v2)"));
        assert!(out.contains("| Return | 15.80% | 19.30% | -3.50% |"));
        assert!(out.contains("| Win Rate | 45.0% | 50.0% | -5.0% |"));
        assert!(out.contains("| Trades | 30 | 34 | -4 |"));
    }
}
