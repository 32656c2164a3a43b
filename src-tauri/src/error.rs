use thiserror::Error;

use crate::config::ConfigError;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("failed to initialize logging: {0}")]
    LoggingInit(String),
    #[error("runtime error: {0}")]
    Runtime(String),
    #[error("failed to write to clipboard: {0}")]
    Clipboard(String),
    #[error(transparent)]
    Config(#[from] ConfigError),
}
