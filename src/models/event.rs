//! Lifecycle notifications published on the supervisor's event bus.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::process::ManagedProcess;

/// Kind of lifecycle transition reported by the supervisor.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// Process entered the running state.
    Online,
    /// Process exited.
    Exit,
    /// Process restart was requested.
    Restart,
    /// Process was stopped.
    Stop,
    /// Process was started.
    Start,
    /// Process was removed from the supervisor.
    Delete,
    /// Process crashed too often and will not be restarted.
    #[serde(rename = "restart overlimit")]
    RestartOverlimit,
    /// Uncaught exception reported by the process.
    Exception,
    /// Any other transition.
    #[serde(other)]
    Other,
}

impl EventKind {
    /// Map a supervisor event name onto the enum.
    #[must_use]
    pub fn from_wire(raw: &str) -> Self {
        match raw {
            "online" => Self::Online,
            "exit" => Self::Exit,
            "restart" => Self::Restart,
            "stop" => Self::Stop,
            "start" => Self::Start,
            "delete" => Self::Delete,
            "restart overlimit" => Self::RestartOverlimit,
            "exception" => Self::Exception,
            _ => Self::Other,
        }
    }
}

/// Immutable notification describing a transition of one process.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LifecycleEvent {
    /// Transition kind.
    pub kind: EventKind,
    /// Process snapshot at event time.
    pub process: ManagedProcess,
    /// Whether the transition was operator-triggered.
    pub manual: bool,
    /// Supervisor timestamp, when reported.
    pub at: Option<DateTime<Utc>>,
}

impl LifecycleEvent {
    /// Construct an event without a timestamp.
    #[must_use]
    pub fn new(kind: EventKind, process: ManagedProcess, manual: bool) -> Self {
        Self {
            kind,
            process,
            manual,
            at: None,
        }
    }
}
