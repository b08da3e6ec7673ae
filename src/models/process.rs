//! Managed process snapshot as reported by the supervisor.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Lifecycle status of a managed process.
///
/// Unrecognised wire values deserialize to [`ProcessStatus::Unknown`].
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ProcessStatus {
    /// Process is being (re)started.
    Launching,
    /// Process is running.
    Online,
    /// Stop requested, not yet exited.
    Stopping,
    /// Process is stopped.
    Stopped,
    /// Process failed to start or crashed past its restart limit.
    Errored,
    /// Crashed and waiting for the supervisor's restart delay.
    #[serde(rename = "waiting restart")]
    WaitingRestart,
    /// Launched once without supervision.
    #[serde(rename = "one-launch-status")]
    OneLaunch,
    /// Status not known to this controller.
    #[serde(other)]
    Unknown,
}

impl ProcessStatus {
    /// Map a supervisor status string onto the enum.
    #[must_use]
    pub fn from_wire(raw: &str) -> Self {
        match raw {
            "launching" => Self::Launching,
            "online" => Self::Online,
            "stopping" => Self::Stopping,
            "stopped" => Self::Stopped,
            "errored" => Self::Errored,
            "waiting restart" => Self::WaitingRestart,
            "one-launch-status" => Self::OneLaunch,
            _ => Self::Unknown,
        }
    }
}

/// A process known to the external supervisor.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ManagedProcess {
    /// Application name. Not guaranteed unique across instances.
    pub name: String,
    /// Supervisor-assigned handle, stable for the current lifetime.
    pub id: u64,
    /// Current lifecycle status.
    pub status: ProcessStatus,
    /// String-valued environment, including any dependency tag.
    #[serde(default)]
    pub environment: HashMap<String, String>,
    /// Whether the most recent restart was operator-initiated.
    #[serde(default)]
    pub restarted_manually: bool,
}

impl ManagedProcess {
    /// Construct a snapshot with an empty environment.
    #[must_use]
    pub fn new(name: impl Into<String>, id: u64, status: ProcessStatus) -> Self {
        Self {
            name: name.into(),
            id,
            status,
            environment: HashMap::new(),
            restarted_manually: false,
        }
    }

    /// Builder-style helper adding one environment entry.
    #[must_use]
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.environment.insert(key.into(), value.into());
        self
    }

    /// Look up an environment value.
    #[must_use]
    pub fn env(&self, key: &str) -> Option<&str> {
        self.environment.get(key).map(String::as_str)
    }
}
