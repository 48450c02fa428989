use planscope_client::ClientError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Failed to load configuration: {0}")]
    Config(#[from] config::ConfigError),

    #[error(transparent)]
    Client(#[from] ClientError),

    #[error(transparent)]
    Compile(#[from] planscope_common::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to serialize graph: {0}")]
    Json(#[from] serde_json::Error),
}
