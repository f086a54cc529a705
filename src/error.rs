use thiserror::Error;

pub type Result<T> = std::result::Result<T, ScoutError>;

#[derive(Debug, Error)]
pub enum ScoutError {
    #[error("Network error: {0}")]
    Http(String),

    #[error("Marketplace returned status {status} for {url}")]
    Status { status: u16, url: String },

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Undecodable event at offset {offset}: {message}")]
    Decode { offset: i64, message: String },

    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<reqwest::Error> for ScoutError {
    fn from(err: reqwest::Error) -> Self {
        ScoutError::Http(err.to_string())
    }
}
