//! Pressed-key state shared between the OS callback and the dispatcher
//!
//! Mutators run on the hook thread and must stay short: one set update
//! under the write lock, then a wake signal. Scanning happens elsewhere.

use std::collections::HashSet;
use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::Notify;
use tracing::trace;

use super::binding::KeyBinding;
use super::keys::VirtualKeyCode;

/// Set of keys currently held down
pub type PressedKeys = HashSet<VirtualKeyCode>;

/// Tracks pressed keys and wakes the dispatcher on every change
pub struct KeyStateTracker {
    pressed: RwLock<PressedKeys>,
    wake: Arc<Notify>,
}

impl KeyStateTracker {
    /// Create a tracker that raises `wake` after each key event
    pub fn new(wake: Arc<Notify>) -> Self {
        Self {
            pressed: RwLock::new(PressedKeys::new()),
            wake,
        }
    }

    /// Record a key press. Pressing an already-held key still signals,
    /// so OS key repeat re-triggers a scan.
    pub fn on_key_down(&self, code: VirtualKeyCode) {
        self.pressed.write().insert(code);
        trace!(%code, "key down");
        self.wake.notify_one();
    }

    /// Record a key release
    pub fn on_key_up(&self, code: VirtualKeyCode) {
        self.pressed.write().remove(&code);
        trace!(%code, "key up");
        self.wake.notify_one();
    }

    /// True iff every key of `binding` is currently held
    pub fn is_active(&self, binding: &KeyBinding) -> bool {
        is_subset(binding, &self.pressed.read())
    }

    /// Copy of the current pressed set
    pub fn snapshot(&self) -> PressedKeys {
        self.pressed.read().clone()
    }

    /// Number of keys currently held
    pub fn pressed_count(&self) -> usize {
        self.pressed.read().len()
    }
}

/// Subset test shared by live checks and dispatcher scans
pub fn is_subset(binding: &KeyBinding, pressed: &PressedKeys) -> bool {
    binding.keys().iter().all(|k| pressed.contains(k))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(code: u32) -> VirtualKeyCode {
        VirtualKeyCode(code)
    }

    fn tracker() -> (KeyStateTracker, Arc<Notify>) {
        let wake = Arc::new(Notify::new());
        (KeyStateTracker::new(Arc::clone(&wake)), wake)
    }

    #[test]
    fn test_down_up_idempotent() {
        let (tracker, _) = tracker();

        tracker.on_key_down(key(1));
        tracker.on_key_down(key(1));
        assert_eq!(tracker.pressed_count(), 1);

        tracker.on_key_up(key(1));
        assert_eq!(tracker.pressed_count(), 0);

        tracker.on_key_up(key(1));
        tracker.on_key_up(key(2));
        assert_eq!(tracker.pressed_count(), 0);
    }

    #[test]
    fn test_is_active_subset() {
        let (tracker, _) = tracker();
        let binding = KeyBinding::new([key(1), key(2)], "x");

        assert!(!tracker.is_active(&binding));

        tracker.on_key_down(key(1));
        assert!(!tracker.is_active(&binding));

        tracker.on_key_down(key(2));
        assert!(tracker.is_active(&binding));

        // Extra keys do not prevent a match
        tracker.on_key_down(key(3));
        assert!(tracker.is_active(&binding));

        tracker.on_key_up(key(2));
        assert!(!tracker.is_active(&binding));
    }

    #[test]
    fn test_is_subset_exhaustive() {
        // Compare against a brute-force definition over every subset of 4 keys
        let universe = [key(1), key(2), key(3), key(4)];
        for b in 1u32..16 {
            let binding = KeyBinding::new(
                universe.iter().enumerate().filter(|(i, _)| b & (1 << *i) != 0).map(|(_, k)| *k),
                "x",
            );
            for p in 0u32..16 {
                let pressed: PressedKeys = universe
                    .iter()
                    .enumerate()
                    .filter(|(i, _)| p & (1 << *i) != 0)
                    .map(|(_, k)| *k)
                    .collect();
                assert_eq!(is_subset(&binding, &pressed), b & p == b, "binding {b:04b} pressed {p:04b}");
            }
        }
    }

    #[tokio::test]
    async fn test_mutation_signals_wake() {
        let (tracker, wake) = tracker();

        let mut notified = tokio_test::task::spawn(wake.notified());
        tokio_test::assert_pending!(notified.poll());

        tracker.on_key_down(key(7));
        assert!(notified.is_woken());
        tokio_test::assert_ready!(notified.poll());
    }

    #[tokio::test]
    async fn test_signals_coalesce() {
        let (tracker, wake) = tracker();

        tracker.on_key_down(key(1));
        tracker.on_key_down(key(2));
        tracker.on_key_up(key(1));

        // Three signals before anyone waited leave a single stored permit
        tokio_test::assert_ready!(tokio_test::task::spawn(wake.notified()).poll());
        tokio_test::assert_pending!(tokio_test::task::spawn(wake.notified()).poll());
    }
}
