//! Context type for tracking request origin and causality

use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Context for tracking the origin of service calls and entity state writes
///
/// A refresh triggered by a service call carries the call's context, so the
/// states it produces can be traced back to whoever asked for them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Context {
    /// Unique identifier for this context (ULID)
    pub id: String,

    /// User ID that initiated this action (if any)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,

    /// Parent context ID for tracking causality chains
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
}

impl Context {
    /// Create a new context with a fresh ULID
    pub fn new() -> Self {
        Self {
            id: Ulid::new().to_string(),
            user_id: None,
            parent_id: None,
        }
    }

    /// Create a new context with a specific user
    pub fn with_user(user_id: impl Into<String>) -> Self {
        Self {
            id: Ulid::new().to_string(),
            user_id: Some(user_id.into()),
            parent_id: None,
        }
    }

    /// Create a child context with this context as parent
    pub fn child(&self) -> Self {
        Self {
            id: Ulid::new().to_string(),
            user_id: self.user_id.clone(),
            parent_id: Some(self.id.clone()),
        }
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}
