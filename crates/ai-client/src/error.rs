use thiserror::Error;

#[derive(Error, Debug)]
pub enum AiError {
    #[error("AI client is not configured: {0}")]
    NotConfigured(String),

    #[error("HTTP request to the AI endpoint failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("The AI endpoint returned {status}: {body}")]
    Api { status: u16, body: String },

    #[error("The AI endpoint returned an empty completion")]
    EmptyResponse,

    #[error("Failed to parse the AI response: {0}")]
    Parse(String),
}
