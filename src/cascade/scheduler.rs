//! Sequential, throttled restart of a parent's dependents.

use std::time::Duration;

use tracing::info;

use crate::models::process::ManagedProcess;
use crate::supervisor::ProcessSupervisor;
use crate::AppError;

/// A cascade stopped at its first failed restart.
#[derive(Debug)]
pub struct CascadeFailure {
    /// Dependents restarted before the failure.
    pub restarted: usize,
    /// Name of the dependent whose restart failed.
    pub dependent: String,
    /// The supervisor error.
    pub error: AppError,
}

/// Restarts dependents one at a time with a pause between them.
#[derive(Debug, Clone, Copy)]
pub struct CascadeScheduler {
    delay: Duration,
}

impl CascadeScheduler {
    /// Scheduler pausing `delay` between successive restarts.
    #[must_use]
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }

    /// Restart `dependents` in order, by supervisor id.
    ///
    /// Each restart is awaited before the next begins. With more than one
    /// dependent the scheduler sleeps for the configured delay between
    /// restarts, never after the last. The first failure aborts the rest of
    /// the sequence; nothing is retried.
    ///
    /// # Errors
    ///
    /// Returns a [`CascadeFailure`] naming the dependent that failed.
    pub async fn run<S>(
        &self,
        supervisor: &S,
        dependents: &[ManagedProcess],
    ) -> std::result::Result<usize, CascadeFailure>
    where
        S: ProcessSupervisor + ?Sized,
    {
        if dependents.is_empty() {
            return Ok(0);
        }

        let names: Vec<&str> = dependents.iter().map(|d| d.name.as_str()).collect();
        info!(count = dependents.len(), ?names, "found {} dependent(s)", dependents.len());

        let throttle = dependents.len() > 1;

        for (index, dependent) in dependents.iter().enumerate() {
            info!(dependent = %dependent.name, pm_id = dependent.id, "restarting dependent");

            if let Err(error) = supervisor.restart_process(dependent.id).await {
                return Err(CascadeFailure {
                    restarted: index,
                    dependent: dependent.name.clone(),
                    error,
                });
            }

            if throttle && index + 1 < dependents.len() {
                tokio::time::sleep(self.delay).await;
            }
        }

        Ok(dependents.len())
    }
}
