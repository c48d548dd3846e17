use thiserror::Error;

pub type Result<T> = std::result::Result<T, OllamaError>;

#[derive(Debug, Error)]
pub enum OllamaError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("Model '{model}' is not installed (available: {available:?})")]
    ModelMissing {
        model: String,
        available: Vec<String>,
    },
}

impl From<reqwest::Error> for OllamaError {
    fn from(err: reqwest::Error) -> Self {
        OllamaError::Network(err.to_string())
    }
}
