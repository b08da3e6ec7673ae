//! Process supervisor binding.
//!
//! The [`ProcessSupervisor`] trait is the seam between the cascade core and
//! the external supervisor. [`pm2::Pm2Client`] implements it against a
//! running PM2 daemon; tests implement it in memory.

pub mod amp;
pub mod pm2;
pub mod wire;

use std::future::Future;
use std::pin::Pin;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::models::event::LifecycleEvent;
use crate::models::process::ManagedProcess;
use crate::Result;

/// Control operations the cascade core needs from the supervisor.
pub trait ProcessSupervisor: Send + Sync {
    /// Retrieve the full live process list, in supervisor order.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::List`](crate::AppError::List) if the supervisor
    /// cannot produce the list.
    fn list_processes(&self) -> Pin<Box<dyn Future<Output = Result<Vec<ManagedProcess>>> + Send + '_>>;

    /// Restart one process by its supervisor id.
    ///
    /// Completes once the supervisor acknowledges the restart.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Restart`](crate::AppError::Restart) if the
    /// supervisor refuses or fails the restart.
    fn restart_process(&self, id: u64) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>>;
}

/// Cancellable stream of lifecycle events.
///
/// Wraps the receiving end of a channel fed by a background reader task.
/// Dropping the subscription cancels the reader.
pub struct EventSubscription {
    events: mpsc::Receiver<LifecycleEvent>,
    cancel: CancellationToken,
    reader: Option<JoinHandle<()>>,
}

impl EventSubscription {
    /// Wrap a receiver and the reader task feeding it.
    #[must_use]
    pub fn new(
        events: mpsc::Receiver<LifecycleEvent>,
        cancel: CancellationToken,
        reader: Option<JoinHandle<()>>,
    ) -> Self {
        Self {
            events,
            cancel,
            reader,
        }
    }

    /// Subscription over a bare channel, with no reader task attached.
    #[must_use]
    pub fn from_channel(events: mpsc::Receiver<LifecycleEvent>) -> Self {
        Self::new(events, CancellationToken::new(), None)
    }

    /// Wait for the next event. Returns `None` once the bus has closed.
    pub async fn recv(&mut self) -> Option<LifecycleEvent> {
        self.events.recv().await
    }

    /// Stop the reader task. Buffered events can still be drained.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }
}

impl Drop for EventSubscription {
    fn drop(&mut self) {
        self.cancel.cancel();
        if let Some(handle) = self.reader.take() {
            handle.abort();
        }
    }
}
