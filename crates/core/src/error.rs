use thiserror::Error;

#[derive(Error, Debug)]
pub enum OutsyncError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON serialization/deserialization error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Manifest error: {0}")]
    Manifest(String),
    #[error("Watcher error: {0}")]
    Watch(#[from] notify::Error),
    #[error("Configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, OutsyncError>;
