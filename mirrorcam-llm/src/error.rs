use thiserror::Error;

#[derive(Error, Debug)]
pub enum LLMError {
    #[error("API key not set for provider: {0}")]
    MissingApiKey(String),

    #[error("HTTP request failed: {0}")]
    HttpRequest(#[from] reqwest::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid response from provider: {0}")]
    InvalidResponse(String),

    #[error("Analysis service error: {0}")]
    Service(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Rate limit exceeded")]
    RateLimit,

    #[error("Authentication failed")]
    AuthenticationFailed,
}

pub type Result<T> = std::result::Result<T, LLMError>;
