//! Error types for the vehicle API

use std::time::Duration;
use thiserror::Error;

/// Result type for vehicle API operations
pub type ApiResult<T> = Result<T, ApiError>;

/// Errors returned by a [`crate::VehicleApi`] implementation
///
/// Cloneable so a single failure can be handed to every caller attached to a
/// coalesced refresh.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ApiError {
    /// Credentials rejected, token expired, or not logged in
    #[error("authentication failed: {0}")]
    Auth(String),

    /// Connection-level failure
    #[error("connection error: {0}")]
    Transport(String),

    /// The request did not complete in time
    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    /// Non-success HTTP status other than 401
    #[error("API error: HTTP {status}")]
    Status { status: u16 },

    /// Response body was missing fields or not JSON
    #[error("invalid response: {0}")]
    Malformed(String),

    /// The service answered but did not accept the command
    #[error("command {command} was not accepted")]
    Rejected { command: String },
}

impl ApiError {
    pub fn is_auth(&self) -> bool {
        matches!(self, ApiError::Auth(_))
    }

    /// Network-level failures, including timeouts
    pub fn is_transport(&self) -> bool {
        matches!(self, ApiError::Transport(_) | ApiError::Timeout(_))
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            ApiError::Malformed(err.to_string())
        } else {
            ApiError::Transport(err.to_string())
        }
    }
}
