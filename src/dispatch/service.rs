//! Keybinding service
//!
//! Wires the key table, binding registry, key state tracker and
//! activation dispatcher together and exposes the read-only query
//! surface used by the IPC server.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::{broadcast, Mutex, Notify};

use crate::events::ActivationEvent;
use crate::hotkey::{
    BindingRegistry, BindingSet, KeyBinding, KeyStateTracker, ReloadReport, VirtualKeyCode,
    VirtualKeyTable,
};

use super::dispatcher::ActivationDispatcher;

/// Capacity of the activation fan-out channel
const ACTIVATION_CHANNEL_CAPACITY: usize = 64;

/// Display row for one registered binding
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BindingInfo {
    pub expression: String,
    pub keys: Vec<VirtualKeyCode>,
    pub command: String,
    pub active: bool,
}

/// The keybinding detection engine
pub struct KeybindingService {
    registry: Arc<BindingRegistry>,
    tracker: Arc<KeyStateTracker>,
    dispatcher: Mutex<ActivationDispatcher>,
    event_tx: broadcast::Sender<ActivationEvent>,
}

impl KeybindingService {
    /// Build the engine and start its dispatcher on the current runtime
    pub fn start(table: Arc<VirtualKeyTable>) -> Self {
        let wake = Arc::new(Notify::new());
        let registry = Arc::new(BindingRegistry::new(table));
        let tracker = Arc::new(KeyStateTracker::new(Arc::clone(&wake)));
        let (event_tx, _) = broadcast::channel(ACTIVATION_CHANNEL_CAPACITY);

        let dispatcher = ActivationDispatcher::spawn(
            Arc::clone(&registry),
            Arc::clone(&tracker),
            wake,
            event_tx.clone(),
        );

        Self {
            registry,
            tracker,
            dispatcher: Mutex::new(dispatcher),
            event_tx,
        }
    }

    /// Tracker to hand to the OS key event source
    pub fn tracker(&self) -> Arc<KeyStateTracker> {
        Arc::clone(&self.tracker)
    }

    /// Receive every activation from now on
    pub fn subscribe(&self) -> broadcast::Receiver<ActivationEvent> {
        self.event_tx.subscribe()
    }

    /// Replace the configured bindings
    pub fn reload(&self, raw: &BTreeMap<String, String>) -> ReloadReport {
        self.registry.reload(raw)
    }

    /// Current binding set
    pub fn snapshot(&self) -> Arc<BindingSet> {
        self.registry.snapshot()
    }

    /// Whether every key of `binding` is held right now
    pub fn is_binding_active(&self, binding: &KeyBinding) -> bool {
        self.tracker.is_active(binding)
    }

    /// Live check by configured expression; `None` if no such binding
    pub fn is_active(&self, expression: &str) -> Option<bool> {
        self.registry
            .snapshot()
            .find(expression)
            .map(|entry| self.is_binding_active(&entry.binding))
    }

    /// Registered bindings with their current activity
    pub fn bindings(&self) -> Vec<BindingInfo> {
        self.registry
            .snapshot()
            .entries()
            .iter()
            .map(|entry| BindingInfo {
                expression: entry.expression.clone(),
                keys: entry.binding.keys().iter().copied().collect(),
                command: entry.binding.command().to_string(),
                active: self.is_binding_active(&entry.binding),
            })
            .collect()
    }

    pub fn pressed_count(&self) -> usize {
        self.tracker.pressed_count()
    }

    /// Stop the dispatcher; never fails
    pub async fn shutdown(&self) {
        self.dispatcher.lock().await.shutdown().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn raw(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[tokio::test]
    async fn test_query_surface() {
        let table = Arc::new(VirtualKeyTable::builtin().unwrap());
        let service = KeybindingService::start(Arc::clone(&table));
        let report = service.reload(&raw(&[("CTRL+SHIFT+P", "play:applause"), ("ALT+M", "mute")]));
        assert_eq!(report.loaded, 2);

        let tracker = service.tracker();
        tracker.on_key_down(table.lookup("ALT").unwrap());
        tracker.on_key_down(table.lookup("M").unwrap());

        assert_eq!(service.is_active("ALT+M"), Some(true));
        assert_eq!(service.is_active("CTRL+SHIFT+P"), Some(false));
        assert_eq!(service.is_active("F5"), None);

        let rows = service.bindings();
        assert_eq!(rows.len(), 2);
        let mute = rows.iter().find(|r| r.expression == "ALT+M").unwrap();
        assert!(mute.active);
        assert_eq!(mute.command, "mute");
        assert_eq!(mute.keys.len(), 2);

        assert_eq!(service.pressed_count(), 2);
        service.shutdown().await;
    }

    #[tokio::test]
    async fn test_activations_reach_subscribers() {
        let table = Arc::new(VirtualKeyTable::builtin().unwrap());
        let service = KeybindingService::start(Arc::clone(&table));
        service.reload(&raw(&[("F5", "refresh")]));
        let mut rx = service.subscribe();

        service.tracker().on_key_down(table.lookup("F5").unwrap());

        let event = tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(event.command(), "refresh");
        assert_eq!(event.generation, service.snapshot().generation());

        service.shutdown().await;
    }
}
