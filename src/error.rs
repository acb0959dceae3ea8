use thiserror::Error;

#[derive(Error, Debug)]
pub enum SmokeError {
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Flow [{0}] not found")]
    UnknownFlow(String),
    #[error("Service [{0}] is not configured for mocking")]
    UnknownService(String),
    #[error("Response [{value}] is not allowed for service [{service}]")]
    InvalidMockValue { service: String, value: String },
    #[error("Template error: {0}")]
    Template(String),
    #[error("Task failed: {0}")]
    Task(String),
}

pub type Result<T> = std::result::Result<T, SmokeError>;
