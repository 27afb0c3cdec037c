use reqwest::StatusCode;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RunfoError {
    #[error("API request to {url} failed: {status} - {body}")]
    Api {
        url: String,
        status: StatusCode,
        body: String,
    },

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("{0}")]
    Usage(String),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, RunfoError>;
