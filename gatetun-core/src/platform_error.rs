//! Errors reported to the hosting platform
//!
//! Only tunnel setup failures become platform errors. Per-flow relay errors
//! stay inside the relay that hit them.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Stable error codes understood by the platform UI
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorCode {
    /// A required collaborator was missing at connect time
    InternalError,
    /// The proxy session could not be started
    SetupTrafficHandlerFailed,
    /// The provider configuration is unusable
    IllegalServerConfiguration,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::InternalError => "InternalError",
            ErrorCode::SetupTrafficHandlerFailed => "SetupTrafficHandlerFailed",
            ErrorCode::IllegalServerConfiguration => "IllegalServerConfiguration",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlatformError {
    pub code: ErrorCode,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cause: Option<String>,
}

impl PlatformError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            cause: None,
        }
    }

    pub fn with_cause(mut self, cause: impl fmt::Display) -> Self {
        self.cause = Some(cause.to_string());
        self
    }

    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InternalError, message)
    }

    pub fn setup_traffic_handler_failed(message: impl Into<String>, cause: impl fmt::Display) -> Self {
        Self::new(ErrorCode::SetupTrafficHandlerFailed, message).with_cause(cause)
    }

    pub fn illegal_server_configuration(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::IllegalServerConfiguration, message)
    }

    /// Detailed JSON form: `{"code":..,"message":..,"cause":..}`
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| {
            format!(r#"{{"code":"{}","message":"internal"}}"#, self.code.as_str())
        })
    }
}

impl fmt::Display for PlatformError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.cause {
            Some(cause) => write!(f, "{}: {}", self.message, cause),
            None => f.write_str(&self.message),
        }
    }
}

impl std::error::Error for PlatformError {}
