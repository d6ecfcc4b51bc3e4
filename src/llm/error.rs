use thiserror::Error;

/// Failures reported by a [`LanguageModelClient`](crate::llm::LanguageModelClient).
///
/// Kept `Clone` so failures can travel inside per-node execution reports.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum LLMError {
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Model refused to answer: {0}")]
    Refusal(String),

    #[error("Rate limited: {0}")]
    RateLimited(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Provider not configured: {0}")]
    ProviderNotConfigured(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

impl From<serde_json::Error> for LLMError {
    fn from(err: serde_json::Error) -> Self {
        LLMError::Serialization(err.to_string())
    }
}
