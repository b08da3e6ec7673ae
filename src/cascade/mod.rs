//! Restart cascade core.
//!
//! Decides which lifecycle events are parent restarts, discovers the
//! parent's dependents, and restarts them one at a time.

pub mod classifier;
pub mod controller;
pub mod discovery;
pub mod scheduler;
pub mod tag;

pub use classifier::{EventClassifier, IgnoreReason, Verdict};
pub use controller::{CascadeController, CascadeOutcome};
pub use tag::DependencyTag;
