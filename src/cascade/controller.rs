//! Cascade controller: wires classification, discovery, and the restart
//! scheduler together and drives them from an event subscription.
//!
//! Every accepted event is handled in its own task, so a cascade sleeping
//! between restarts never delays classification of later events. Cascades
//! for different parents are not serialized against each other.

use std::sync::Arc;

use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, warn, Instrument};
use uuid::Uuid;

use super::classifier::{EventClassifier, IgnoreReason, Verdict};
use super::discovery::find_dependents;
use super::scheduler::CascadeScheduler;
use super::tag::DependencyTag;
use crate::config::CascadeConfig;
use crate::models::event::LifecycleEvent;
use crate::supervisor::{EventSubscription, ProcessSupervisor};
use crate::AppError;

/// What handling one event amounted to.
#[derive(Debug)]
pub enum CascadeOutcome {
    /// The event was not a parent restart.
    Ignored(IgnoreReason),
    /// The parent has no dependents; nothing was restarted.
    NoDependents,
    /// Every dependent was restarted.
    Completed {
        /// Number of dependents restarted.
        restarted: usize,
    },
    /// Discovery or a restart failed; the rest of the cascade was dropped.
    Aborted {
        /// Dependents restarted before the failure.
        restarted: usize,
        /// The failure.
        error: AppError,
    },
}

/// Restart-cascade controller bound to one supervisor session.
pub struct CascadeController<S: ?Sized> {
    supervisor: Arc<S>,
    tag: DependencyTag,
    classifier: EventClassifier,
    scheduler: CascadeScheduler,
}

impl<S> CascadeController<S>
where
    S: ProcessSupervisor + ?Sized + 'static,
{
    /// Build a controller from its supervisor session and configuration.
    #[must_use]
    pub fn new(supervisor: Arc<S>, config: &CascadeConfig) -> Self {
        let tag = DependencyTag::new(config.tag_key.clone());
        Self {
            supervisor,
            classifier: EventClassifier::new(tag.clone(), config.ignore_manual_restarts),
            scheduler: CascadeScheduler::new(config.restart_delay()),
            tag,
        }
    }

    /// Dependency tag in use.
    #[must_use]
    pub fn tag(&self) -> &DependencyTag {
        &self.tag
    }

    /// Classify one event and, if it is a parent restart, run its cascade.
    ///
    /// Failures are logged and reported in the outcome; they never
    /// propagate.
    pub async fn handle_event(&self, event: &LifecycleEvent) -> CascadeOutcome {
        let parent = match self.classifier.classify(event) {
            Verdict::Cascade { parent } => parent,
            Verdict::Ignore(reason) => return CascadeOutcome::Ignored(reason),
        };

        let span = info_span!("cascade", parent = %parent, cascade_id = %Uuid::new_v4());
        self.cascade(&parent).instrument(span).await
    }

    async fn cascade(&self, parent: &str) -> CascadeOutcome {
        let dependents = match find_dependents(&*self.supervisor, parent, &self.tag).await {
            Ok(dependents) => dependents,
            Err(err) => {
                error!(%err, "failed to discover dependents");
                return CascadeOutcome::Aborted {
                    restarted: 0,
                    error: err,
                };
            }
        };

        if dependents.is_empty() {
            debug!("no dependents declared");
            return CascadeOutcome::NoDependents;
        }

        match self.scheduler.run(&*self.supervisor, &dependents).await {
            Ok(restarted) => {
                info!(restarted, "cascade complete");
                CascadeOutcome::Completed { restarted }
            }
            Err(failure) => {
                error!(
                    dependent = %failure.dependent,
                    restarted = failure.restarted,
                    err = %failure.error,
                    "cascade aborted"
                );
                CascadeOutcome::Aborted {
                    restarted: failure.restarted,
                    error: failure.error,
                }
            }
        }
    }

    /// Handle events from `subscription` until `cancel` fires.
    ///
    /// Each event runs in its own task. When the event stream ends the
    /// controller goes inert: in-flight cascades finish, no new events
    /// arrive, and the loop waits for cancellation. Cancellation aborts any
    /// cascade still in flight.
    pub async fn run(self: Arc<Self>, mut subscription: EventSubscription, cancel: CancellationToken) {
        let mut tasks = JoinSet::new();
        let mut bus_open = true;

        loop {
            tokio::select! {
                () = cancel.cancelled() => {
                    info!(in_flight = tasks.len(), "controller shutting down");
                    break;
                }

                maybe_event = subscription.recv(), if bus_open => {
                    if let Some(event) = maybe_event {
                        let controller = Arc::clone(&self);
                        tasks.spawn(async move {
                            controller.handle_event(&event).await;
                        });
                    } else {
                        warn!("event stream ended, controller is now inert");
                        bus_open = false;
                    }
                }

                Some(joined) = tasks.join_next(), if !tasks.is_empty() => {
                    if let Err(err) = joined {
                        error!(%err, "cascade task failed");
                    }
                }
            }
        }

        subscription.cancel();
        tasks.shutdown().await;
    }
}
