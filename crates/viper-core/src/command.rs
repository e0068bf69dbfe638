//! Vehicle commands, status reads, and refresh reasons

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::VehicleId;

/// A control command a user can issue to a vehicle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Command {
    Start,
    Stop,
    Lock,
    Unlock,
}

impl Command {
    /// Command name on the Viper wire protocol
    ///
    /// The remote starter is a toggle upstream, so start and stop share `remote`.
    pub fn wire_name(self) -> &'static str {
        match self {
            Command::Start | Command::Stop => "remote",
            Command::Lock => "arm",
            Command::Unlock => "disarm",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Command::Start => "start",
            Command::Stop => "stop",
            Command::Lock => "lock",
            Command::Unlock => "unlock",
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The two status reads that make up one refresh
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusRead {
    /// GPS, battery, doors, ignition, trunk, hood
    Active,
    /// Locks, remote starter, security system, panic, valet
    Current,
}

impl StatusRead {
    pub fn wire_name(self) -> &'static str {
        match self {
            StatusRead::Active => "read_active",
            StatusRead::Current => "read_current",
        }
    }
}

impl fmt::Display for StatusRead {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.wire_name())
    }
}

/// A command issued against a vehicle
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandRequest {
    pub vehicle_id: VehicleId,
    pub command: Command,
    pub issued_at: DateTime<Utc>,
}

impl CommandRequest {
    pub fn new(vehicle_id: VehicleId, command: Command) -> Self {
        Self {
            vehicle_id,
            command,
            issued_at: Utc::now(),
        }
    }
}

/// Why a refresh was requested
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RefreshReason {
    /// Explicit user request (button, service call)
    Manual,
    /// Polling timer
    Scheduled,
    /// Verification after a successful command
    PostCommand,
}

impl RefreshReason {
    /// Explicit intent bypasses frequency throttling
    pub fn is_explicit(self) -> bool {
        !matches!(self, RefreshReason::Scheduled)
    }
}

impl fmt::Display for RefreshReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RefreshReason::Manual => "manual",
            RefreshReason::Scheduled => "scheduled",
            RefreshReason::PostCommand => "post_command",
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_names() {
        assert_eq!(Command::Start.wire_name(), "remote");
        assert_eq!(Command::Stop.wire_name(), "remote");
        assert_eq!(Command::Lock.wire_name(), "arm");
        assert_eq!(Command::Unlock.wire_name(), "disarm");
        assert_eq!(StatusRead::Active.wire_name(), "read_active");
        assert_eq!(StatusRead::Current.wire_name(), "read_current");
    }

    #[test]
    fn test_only_scheduled_is_throttled() {
        assert!(RefreshReason::Manual.is_explicit());
        assert!(RefreshReason::PostCommand.is_explicit());
        assert!(!RefreshReason::Scheduled.is_explicit());
    }

    #[test]
    fn test_command_deserializes_snake_case() {
        let cmd: Command = serde_json::from_str("\"unlock\"").unwrap();
        assert_eq!(cmd, Command::Unlock);
        assert_eq!(RefreshReason::PostCommand.to_string(), "post_command");
    }
}
