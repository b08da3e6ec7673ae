//! Dependency tag convention.
//!
//! A managed process declares its parent by carrying the parent's name
//! under an agreed environment key. The key is resolved once at startup.

use crate::models::process::ManagedProcess;

/// The agreed environment key naming a process's parent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependencyTag {
    key: String,
}

impl DependencyTag {
    /// Use `key` as the dependency tag key.
    #[must_use]
    pub fn new(key: impl Into<String>) -> Self {
        Self { key: key.into() }
    }

    /// The environment key.
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Parent named by `process`, if it declares one. An empty value
    /// declares nothing.
    #[must_use]
    pub fn parent_of<'a>(&self, process: &'a ManagedProcess) -> Option<&'a str> {
        process.env(&self.key).filter(|parent| !parent.is_empty())
    }

    /// Whether `process` declares a parent and is therefore a child.
    #[must_use]
    pub fn is_child(&self, process: &ManagedProcess) -> bool {
        self.parent_of(process).is_some()
    }

    /// Whether `process` is a dependent of `parent`. A process never
    /// depends on itself.
    #[must_use]
    pub fn is_dependent_of(&self, process: &ManagedProcess, parent: &str) -> bool {
        process.name != parent && self.parent_of(process) == Some(parent)
    }
}

impl Default for DependencyTag {
    fn default() -> Self {
        Self::new(crate::config::DEFAULT_TAG_KEY)
    }
}
