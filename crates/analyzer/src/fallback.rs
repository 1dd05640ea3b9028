use core_types::{EvaluationReport, Metrics};

/// Rule-based critique used whenever the model is unavailable or its reply is unusable.
pub fn fallback_report(metrics: Option<&Metrics>) -> EvaluationReport {
    let mut report = EvaluationReport::default();

    let Some(m) = metrics else {
        report.weaknesses.push("No metrics available".to_string());
        return report;
    };

    if m.total_return_pct > 0.0 {
        report
            .strengths
            .push(format!("Positive return: {:.2}%", m.total_return_pct));
    } else {
        report
            .weaknesses
            .push(format!("Negative return: {:.2}%", m.total_return_pct));
    }

    if m.max_drawdown_pct < 20.0 {
        report
            .strengths
            .push(format!("Controlled drawdown: {:.2}%", m.max_drawdown_pct));
    } else {
        report
            .weaknesses
            .push(format!("High drawdown: {:.2}%", m.max_drawdown_pct));
    }

    if m.win_rate > 50.0 {
        report
            .strengths
            .push(format!("Good win rate: {:.1}%", m.win_rate));
    } else {
        report
            .weaknesses
            .push(format!("Low win rate: {:.1}%", m.win_rate));
    }

    if m.sharpe_ratio > 1.0 {
        report
            .strengths
            .push(format!("Good Sharpe ratio: {:.2}", m.sharpe_ratio));
    } else if m.sharpe_ratio < 0.0 {
        report
            .weaknesses
            .push(format!("Negative Sharpe ratio: {:.2}", m.sharpe_ratio));
    }

    if m.max_drawdown_pct > 20.0 {
        report
            .suggestions
            .push("Tighten stop-loss rules to reduce drawdown".to_string());
    }
    if m.win_rate < 50.0 {
        report
            .suggestions
            .push("Add confirmation filters to improve entry accuracy".to_string());
    }
    if m.total_return_pct < 0.0 {
        report
            .suggestions
            .push("Review position sizing and risk limits".to_string());
    }

    report
}
