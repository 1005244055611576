//! Activation dispatcher
//!
//! A single background task that sleeps on the tracker's wake signal,
//! rescans every binding against the pressed keys, and emits one
//! `ActivationEvent` per fully held binding. Holding a combination while
//! the OS repeats key-down events re-emits on every scan; downstream
//! consumers own any "once per press" policy.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

use crate::events::ActivationEvent;
use crate::hotkey::{is_subset, BindingRegistry, KeyStateTracker};

/// Upper bound on how long shutdown waits for the worker to finish
pub const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(2);

/// Handle to the running dispatcher task
pub struct ActivationDispatcher {
    stop: Arc<AtomicBool>,
    wake: Arc<Notify>,
    handle: Option<JoinHandle<()>>,
}

impl ActivationDispatcher {
    /// Spawn the dispatcher on the current tokio runtime
    pub fn spawn(
        registry: Arc<BindingRegistry>,
        tracker: Arc<KeyStateTracker>,
        wake: Arc<Notify>,
        event_tx: broadcast::Sender<ActivationEvent>,
    ) -> Self {
        let stop = Arc::new(AtomicBool::new(false));

        let handle = tokio::spawn(run(
            registry,
            tracker,
            Arc::clone(&wake),
            Arc::clone(&stop),
            event_tx,
        ));

        Self {
            stop,
            wake,
            handle: Some(handle),
        }
    }

    /// Whether the worker task is still alive
    #[cfg(test)]
    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Stop the worker and wait (bounded) for it to exit
    ///
    /// The stop flag alone cannot release a blocked wait, so the wake
    /// signal is raised as well. A scan already under way runs to
    /// completion. Never fails; problems are logged.
    pub async fn shutdown(&mut self) {
        let Some(handle) = self.handle.take() else {
            return;
        };

        self.stop.store(true, Ordering::SeqCst);
        self.wake.notify_one();

        match tokio::time::timeout(SHUTDOWN_TIMEOUT, handle).await {
            Ok(Ok(())) => info!("activation dispatcher stopped"),
            Ok(Err(e)) => warn!(?e, "activation dispatcher ended abnormally"),
            Err(_) => warn!(
                timeout_ms = SHUTDOWN_TIMEOUT.as_millis() as u64,
                "activation dispatcher did not stop in time"
            ),
        }
    }
}

impl Drop for ActivationDispatcher {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            self.stop.store(true, Ordering::SeqCst);
            self.wake.notify_one();
            handle.abort();
        }
    }
}

/// Waiting -> Scanning -> Waiting loop, until the stop flag is seen
async fn run(
    registry: Arc<BindingRegistry>,
    tracker: Arc<KeyStateTracker>,
    wake: Arc<Notify>,
    stop: Arc<AtomicBool>,
    event_tx: broadcast::Sender<ActivationEvent>,
) {
    info!("activation dispatcher started");

    while !stop.load(Ordering::SeqCst) {
        wake.notified().await;

        trace!("processing key bindings");
        for event in scan(&registry, &tracker) {
            debug!(%event, generation = event.generation, "binding activated");
            if event_tx.send(event).is_err() {
                trace!("no activation subscribers");
            }
        }
    }
}

/// Evaluate every binding of one registry snapshot against the held keys
pub fn scan(registry: &BindingRegistry, tracker: &KeyStateTracker) -> Vec<ActivationEvent> {
    let bindings = registry.snapshot();
    let pressed = tracker.snapshot();

    bindings
        .entries()
        .iter()
        .filter(|entry| is_subset(&entry.binding, &pressed))
        .map(|entry| ActivationEvent::new(entry, bindings.generation()))
        .collect()
}
