use thiserror::Error;

/// Errors shared across the collection and enrichment pipeline.
#[derive(Error, Debug)]
pub enum ReelmarkError {
    #[error("Extraction failed: {0}")]
    Extraction(String),

    #[error("Rate limited by the feed")]
    RateLimited,

    #[error("Model request failed: {0}")]
    ModelRequest(String),

    #[error("Model unavailable: {0}")]
    ModelUnavailable(String),

    #[error("Persistence error: {0}")]
    Persistence(String),
}
