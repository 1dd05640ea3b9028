use thiserror::Error;

/// Why a model reply could not be turned into a report. Never leaves the
/// evaluator: every variant triggers the deterministic fallback.
#[derive(Error, Debug)]
pub enum AnalyzerError {
    #[error("No JSON object found in the AI response")]
    NoJson,

    #[error("The AI response is not a valid evaluation report: {0}")]
    InvalidJson(#[from] serde_json::Error),
}
