use thiserror::Error;

/// Why a model reply could not be used as an optimization. Every variant
/// triggers the fallback that keeps the current prompt.
#[derive(Error, Debug)]
pub enum OptimizerError {
    #[error("No JSON object found in the AI response")]
    NoJson,

    #[error("JSON serialization/deserialization error: {0}")]
    Json(#[from] serde_json::Error),
}
