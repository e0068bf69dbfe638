//! Refresh and command errors

use thiserror::Error;
use viper_api::ApiError;
use viper_core::{Command, VehicleId};

/// Result type for refresh operations
pub type RefreshResult = Result<viper_core::VehicleSnapshot, RefreshError>;

/// Why a refresh did not produce a new snapshot
///
/// Every variant except `Auth` is transient: the cached snapshot is kept and
/// entities keep showing it.
#[derive(Debug, Clone, Error)]
pub enum RefreshError {
    /// Credentials rejected; refreshes stay blocked until reauthentication
    #[error("{0}")]
    Auth(#[source] ApiError),

    /// Network failure or timeout
    #[error("transport error: {0}")]
    Transport(#[source] ApiError),

    /// Unexpected HTTP status, or a malformed or incomplete response
    #[error("upstream data error: {0}")]
    UpstreamData(#[source] ApiError),

    #[error("unknown vehicle: {0}")]
    UnknownVehicle(VehicleId),

    /// The refresh task panicked or was aborted
    #[error("refresh task failed: {0}")]
    Task(String),
}

impl RefreshError {
    pub fn is_auth(&self) -> bool {
        matches!(self, RefreshError::Auth(_))
    }

    /// Transient failures leave the cache untouched and are retried naturally
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            RefreshError::Transport(_) | RefreshError::UpstreamData(_) | RefreshError::Task(_)
        )
    }
}

impl From<ApiError> for RefreshError {
    fn from(err: ApiError) -> Self {
        match err {
            ApiError::Auth(_) => RefreshError::Auth(err),
            ApiError::Transport(_) | ApiError::Timeout(_) => RefreshError::Transport(err),
            ApiError::Status { .. } | ApiError::Malformed(_) | ApiError::Rejected { .. } => {
                RefreshError::UpstreamData(err)
            }
        }
    }
}

/// A command that was not carried out
#[derive(Debug, Clone, Error)]
pub enum CommandError {
    /// Rejected or failed upstream; nothing was changed locally
    #[error("{command} failed for vehicle {vehicle_id}: {source}")]
    Upstream {
        vehicle_id: VehicleId,
        command: Command,
        #[source]
        source: ApiError,
    },

    #[error("unknown vehicle: {0}")]
    UnknownVehicle(VehicleId),
}

impl CommandError {
    pub fn is_auth(&self) -> bool {
        matches!(self, CommandError::Upstream { source, .. } if source.is_auth())
    }
}
