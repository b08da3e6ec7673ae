//! Dependent discovery.

use super::tag::DependencyTag;
use crate::models::process::ManagedProcess;
use crate::supervisor::ProcessSupervisor;
use crate::Result;

/// Keep the dependents of `parent`, preserving supervisor order.
#[must_use]
pub fn select_dependents(
    processes: Vec<ManagedProcess>,
    parent: &str,
    tag: &DependencyTag,
) -> Vec<ManagedProcess> {
    processes
        .into_iter()
        .filter(|process| tag.is_dependent_of(process, parent))
        .collect()
}

/// List the live processes once and return the dependents of `parent`.
///
/// # Errors
///
/// Propagates the supervisor's [`AppError::List`](crate::AppError::List).
pub async fn find_dependents<S>(
    supervisor: &S,
    parent: &str,
    tag: &DependencyTag,
) -> Result<Vec<ManagedProcess>>
where
    S: ProcessSupervisor + ?Sized,
{
    let processes = supervisor.list_processes().await?;
    Ok(select_dependents(processes, parent, tag))
}
