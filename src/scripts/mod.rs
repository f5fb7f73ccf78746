//! The script trigger-and-execution engine.

pub mod capabilities;
pub mod coordinator;
pub mod dispatch;
pub mod events;
pub mod imports;
pub mod matcher;
pub mod sandbox;

pub use capabilities::{Capability, HostCapabilities};
pub use coordinator::{BatchReport, BatchStatus, ExecutionCoordinator, ExecutionRequest};
pub use dispatch::TriggerDispatcher;
pub use events::{EventBus, ScriptEvent};
pub use sandbox::Sandbox;

use serde::{Deserialize, Serialize};

/// Event name the capture side emits to request a batch.
pub const EXECUTE_EVENT: &str = "clipboard.script.execute";

/// Outcome of one script run. At most one of the two fields is set; both are
/// absent when a script completed without a value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScriptResult {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub return_value: Option<serde_json::Value>,
}

impl ScriptResult {
    pub fn success(return_value: Option<serde_json::Value>) -> Self {
        Self {
            error: None,
            return_value,
        }
    }

    pub fn failure(error: impl ToString) -> Self {
        Self {
            error: Some(error.to_string()),
            return_value: None,
        }
    }

    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ScriptError {
    #[error("script execution timed out after {timeout_ms} ms")]
    Timeout { timeout_ms: u64 },

    #[error("capability '{0}' was not granted to this script")]
    CapabilityNotGranted(String),

    /// Message of a `throw` statement.
    #[error("{0}")]
    Thrown(String),

    #[error("{0}")]
    Compile(String),

    #[error("{0}")]
    Runtime(String),

    #[error("script worker failed: {0}")]
    Worker(String),
}

impl From<ScriptError> for ScriptResult {
    fn from(error: ScriptError) -> Self {
        ScriptResult::failure(error)
    }
}
