//! Event classification: is this lifecycle event a parent restart?

use tracing::{debug, info};

use super::tag::DependencyTag;
use crate::models::event::{EventKind, LifecycleEvent};
use crate::models::process::ProcessStatus;

/// Why an event did not trigger a cascade.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoreReason {
    /// The process declares a parent; child restarts never cascade.
    ChildProcess,
    /// Not an `online` event for a `launching` process.
    NotARestart,
    /// Operator-triggered restart while manual restarts are ignored.
    ManualRestart,
}

/// Classification result for one event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    /// Restart the dependents of `parent`.
    Cascade {
        /// Name of the process that came back online.
        parent: String,
    },
    /// Do nothing.
    Ignore(IgnoreReason),
}

/// Decides whether a lifecycle event should trigger a cascade.
#[derive(Debug, Clone)]
pub struct EventClassifier {
    tag: DependencyTag,
    ignore_manual: bool,
}

impl EventClassifier {
    /// Build a classifier.
    #[must_use]
    pub fn new(tag: DependencyTag, ignore_manual: bool) -> Self {
        Self { tag, ignore_manual }
    }

    /// Classify `event`. Rules are checked in order and the first match
    /// wins: child process, then non-restart transition, then manual
    /// restart when those are ignored.
    #[must_use]
    pub fn classify(&self, event: &LifecycleEvent) -> Verdict {
        let process = &event.process;

        if self.tag.is_child(process) {
            debug!(process = %process.name, "ignoring event from child process");
            return Verdict::Ignore(IgnoreReason::ChildProcess);
        }

        if event.kind != EventKind::Online || process.status != ProcessStatus::Launching {
            debug!(
                process = %process.name,
                kind = ?event.kind,
                status = ?process.status,
                "ignoring non-restart event"
            );
            return Verdict::Ignore(IgnoreReason::NotARestart);
        }

        if event.manual && self.ignore_manual {
            info!(parent = %process.name, "ignoring manual restart of '{}'", process.name);
            return Verdict::Ignore(IgnoreReason::ManualRestart);
        }

        info!(parent = %process.name, manual = event.manual, "detected restart of '{}'", process.name);
        Verdict::Cascade {
            parent: process.name.clone(),
        }
    }
}
