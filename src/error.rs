use thiserror::Error;

#[derive(Debug, Error)]
pub enum BackdropError {
    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Configuration parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Storage unavailable: {0}")]
    Storage(String),

    #[error("Render surface error: {0}")]
    Surface(String),
}

pub type Result<T> = std::result::Result<T, BackdropError>;
