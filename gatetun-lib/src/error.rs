use gatetun_core::{ErrorCode, PlatformError};
use thiserror::Error;

/// Platform surface errors
#[derive(Error, Debug)]
pub enum LibError {
    #[error("Config error: {0}")]
    Config(String),

    #[error("Parse error: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Logging error: {0}")]
    Logging(String),

    #[error(transparent)]
    Platform(#[from] PlatformError),
}

impl From<LibError> for PlatformError {
    fn from(err: LibError) -> Self {
        match err {
            LibError::Platform(e) => e,
            LibError::Config(msg) => PlatformError::illegal_server_configuration(msg),
            LibError::Parse(e) => PlatformError::new(
                ErrorCode::IllegalServerConfiguration,
                "invalid server configuration",
            )
            .with_cause(e),
            LibError::Logging(msg) => PlatformError::internal_error(msg),
        }
    }
}

pub type Result<T> = std::result::Result<T, LibError>;
