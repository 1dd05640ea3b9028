use core_types::{Metrics, TradeEvent};
use std::fmt::Write;

/// Characters of the strategy prompt shown to the evaluator.
pub const PROMPT_PREVIEW_CHARS: usize = 1500;

const SAMPLE_TRADES: usize = 3;

pub const SYSTEM_PROMPT: &str = r#"You are a quantitative analyst reviewing backtests of an AI-driven crypto futures strategy.

## Task
Explain what worked and what did not, using the numbers you are given.

## Look at
- Trade quality: how winners differ from losers, and whether longs and shorts behave differently.
- Signal timing: entries too early or too late, exits that leave profit behind or hold losers too long,
  filters that block good trades or let bad ones through.
- Risk: position sizing, stop distance, and whether the trade count is large enough to mean anything.

## Keep in mind
- Simple rules often beat complex ones; extra filters usually cost opportunities.
- Too few trades is noise, too many is overtrading.
- A 40% win rate with 2:1 reward/risk is profitable.

## Reply with JSON only
{
  "strengths": ["specific strength backed by data"],
  "weaknesses": ["specific weakness backed by data"],
  "suggestions": ["concrete change to make to the strategy"],
  "trade_pattern": "one sentence on winning vs losing trades"
}

Two or three concise items per list."#;

/// Win/loss and long/short statistics over a trade sample.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TradeBreakdown<'a> {
    pub winners: Vec<&'a TradeEvent>,
    pub losers: Vec<&'a TradeEvent>,
    pub total_profit: f64,
    pub total_loss: f64,
    pub long_trades: usize,
    pub long_wins: usize,
    pub short_trades: usize,
    pub short_wins: usize,
}

impl<'a> TradeBreakdown<'a> {
    pub fn new(trades: &'a [TradeEvent]) -> Self {
        let mut breakdown = Self::default();
        for trade in trades {
            let won = trade.realized_pnl > 0.0;
            if won {
                breakdown.winners.push(trade);
                breakdown.total_profit += trade.realized_pnl;
            } else if trade.realized_pnl < 0.0 {
                breakdown.losers.push(trade);
                breakdown.total_loss += trade.realized_pnl;
            }

            if trade.is_long() {
                breakdown.long_trades += 1;
                breakdown.long_wins += usize::from(won);
            } else if trade.is_short() {
                breakdown.short_trades += 1;
                breakdown.short_wins += usize::from(won);
            }
        }
        breakdown
    }

    pub fn avg_profit(&self) -> f64 {
        safe_avg(self.total_profit, self.winners.len())
    }

    pub fn avg_loss(&self) -> f64 {
        safe_avg(self.total_loss, self.losers.len())
    }
}

fn safe_avg(total: f64, count: usize) -> f64 {
    if count == 0 { 0.0 } else { total / count as f64 }
}

/// Cuts `text` to at most `max_chars` characters, marking the cut with `...`.
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => format!("{}...", &text[..byte_idx]),
        None => text.to_string(),
    }
}

pub fn write_metrics(out: &mut String, metrics: &Metrics) {
    let _ = writeln!(out, "- Total Return: {:.2}%", metrics.total_return_pct);
    let _ = writeln!(out, "- Max Drawdown: {:.2}%", metrics.max_drawdown_pct);
    let _ = writeln!(out, "- Win Rate: {:.1}%", metrics.win_rate);
    let _ = writeln!(out, "- Sharpe Ratio: {:.2}", metrics.sharpe_ratio);
    let _ = writeln!(out, "- Total Trades: {}", metrics.trades);
    let _ = writeln!(out, "- Profit Factor: {:.2}", metrics.profit_factor);
}

pub fn build_user_prompt(
    metrics: Option<&Metrics>,
    trades: &[TradeEvent],
    current_prompt: &str,
) -> String {
    let mut out = String::from("## Backtest Results\n\n");
    if let Some(metrics) = metrics {
        write_metrics(&mut out, metrics);
    }

    if !trades.is_empty() {
        let b = TradeBreakdown::new(trades);
        out.push_str("\n## Trade Analysis\n\n### Summary\n");
        let _ = writeln!(
            out,
            "- Winning Trades: {} (avg profit: {:.2} USDT)",
            b.winners.len(),
            b.avg_profit()
        );
        let _ = writeln!(
            out,
            "- Losing Trades: {} (avg loss: {:.2} USDT)",
            b.losers.len(),
            b.avg_loss()
        );
        if b.long_trades > 0 {
            let _ = writeln!(
                out,
                "- Long Trades: {} (win rate: {:.1}%)",
                b.long_trades,
                b.long_wins as f64 / b.long_trades as f64 * 100.0
            );
        }
        if b.short_trades > 0 {
            let _ = writeln!(
                out,
                "- Short Trades: {} (win rate: {:.1}%)",
                b.short_trades,
                b.short_wins as f64 / b.short_trades as f64 * 100.0
            );
        }

        if !b.winners.is_empty() {
            out.push_str("\n### Sample Winning Trades\n");
            for t in b.winners.iter().take(SAMPLE_TRADES) {
                let _ = writeln!(out, "- {} {}: +{:.2} USDT", t.symbol, t.action, t.realized_pnl);
            }
        }
        if !b.losers.is_empty() {
            out.push_str("\n### Sample Losing Trades\n");
            for t in b.losers.iter().take(SAMPLE_TRADES) {
                let _ = writeln!(out, "- {} {}: {:.2} USDT", t.symbol, t.action, t.realized_pnl);
            }
        }
    }

    out.push_str("\n## Current Strategy Prompt (truncated)\n\n```\n");
    out.push_str(&truncate_chars(current_prompt, PROMPT_PREVIEW_CHARS));
    out.push_str("\n```\n\nAnalyze these results and reply with the JSON evaluation.");
    out
}
