//! Application error types.

use engine::{ConfigError, EngineError};
use messaging::MessagingError;
use projections::ProjectionError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Engine configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error("Projection error: {0}")]
    Projection(#[from] ProjectionError),

    #[error("Messaging error: {0}")]
    Messaging(#[from] MessagingError),

    /// An input line was not a JSON message.
    #[error("Invalid input: {0}")]
    Input(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Telemetry setup failed: {0}")]
    Telemetry(String),
}

impl AppError {
    /// Stable code for replies; engine errors keep their own codes.
    pub fn code(&self) -> &'static str {
        match self {
            AppError::Engine(err) => err.code(),
            AppError::Messaging(MessagingError::UnknownMessage(_)) => "UNKNOWN_MESSAGE",
            AppError::Messaging(_) | AppError::Input(_) => "INVALID_MESSAGE",
            AppError::Config(_) => "CONFIG_ERROR",
            AppError::Projection(_) => "PROJECTION_ERROR",
            AppError::Io(_) => "IO_ERROR",
            AppError::Telemetry(_) => "TELEMETRY_ERROR",
        }
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
