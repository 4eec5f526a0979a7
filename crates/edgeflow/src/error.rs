use thiserror::Error;

#[derive(Error, Debug)]
pub enum EdgeflowError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Content claim not found: {0}")]
    ClaimNotFound(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Invalid content key: {0}")]
    InvalidKey(String),

    #[error("Invalid persisted state: {0}")]
    InvalidState(String),

    #[error("Invalid regular expression: {0}")]
    Regex(#[from] regex::Error),

    #[error("Invalid file pattern: {0}")]
    Pattern(String),
}

impl From<globset::Error> for EdgeflowError {
    fn from(err: globset::Error) -> Self {
        EdgeflowError::Pattern(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, EdgeflowError>;
