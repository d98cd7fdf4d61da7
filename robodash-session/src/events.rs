//! Change notifications for the Presentation Layer.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use log::debug;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use robodash_protocol::TelemetrySnapshot;

use crate::client::SessionStatus;

/// An accepted change to the session.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// State or status message changed.
    Status(SessionStatus),
    /// The telemetry snapshot changed.
    Telemetry(TelemetrySnapshot),
}

/// Callback registration returned by [`Session::subscribe`](crate::Session::subscribe).
///
/// Callbacks run on a dedicated task, one event at a time, in the order the
/// session accepted the changes. The queue feeding the task is unbounded,
/// so a slow callback delays delivery but never skips a change. Dropping
/// the guard unsubscribes.
pub struct Subscription {
    active: Arc<AtomicBool>,
    task: Option<JoinHandle<()>>,
}

impl Subscription {
    pub(crate) fn spawn<T, S>(
        mut events: mpsc::UnboundedReceiver<SessionEvent>,
        mut on_telemetry: T,
        mut on_status: S,
    ) -> Self
    where
        T: FnMut(TelemetrySnapshot) + Send + 'static,
        S: FnMut(SessionStatus) + Send + 'static,
    {
        let active = Arc::new(AtomicBool::new(true));
        let flag = Arc::clone(&active);

        let task = tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                if !flag.load(Ordering::Acquire) {
                    break;
                }
                match event {
                    SessionEvent::Telemetry(snapshot) => on_telemetry(snapshot),
                    SessionEvent::Status(status) => on_status(status),
                }
            }
            debug!("[Subscription] Forwarding task ended");
        });

        Self {
            active,
            task: Some(task),
        }
    }

    /// Whether callbacks may still be invoked.
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
            && self.task.as_ref().map_or(false, |task| !task.is_finished())
    }

    /// Remove the callbacks. Same as dropping the guard.
    pub fn unsubscribe(mut self) {
        self.cancel();
    }

    fn cancel(&mut self) {
        self.active.store(false, Ordering::Release);
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.cancel();
    }
}
