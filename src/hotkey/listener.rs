//! Bridge between the OS key event feed and the key state tracker
//!
//! `KeyEventSource` is the install/uninstall contract for anything that
//! delivers system-wide key transitions. `HookGuard` owns an installed
//! source and guarantees it is released exactly once.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use tracing::{error, info};

use super::tracker::KeyStateTracker;

/// Errors that can occur while installing or removing the key feed
#[derive(Debug, thiserror::Error)]
#[cfg_attr(not(target_os = "macos"), allow(dead_code))]
pub enum HookError {
    #[error("key event hook is already installed")]
    AlreadyInstalled,

    #[error("failed to create event tap - check Accessibility permissions")]
    EventTapCreation,

    #[error("failed to spawn listener thread: {0}")]
    ThreadSpawn(String),

    #[error("listener thread panicked")]
    ThreadPanicked,

    #[error("global key hooks are not supported on this platform")]
    Unsupported,
}

/// A system-wide key event feed
///
/// Once installed, the source calls `on_key_down`/`on_key_up` on the
/// tracker for every key transition until it is uninstalled.
pub trait KeyEventSource: Send {
    fn install(&mut self, tracker: Arc<KeyStateTracker>) -> Result<(), HookError>;

    fn uninstall(&mut self) -> Result<(), HookError>;
}

/// Scoped ownership of an installed key event source
pub struct HookGuard {
    source: Option<Box<dyn KeyEventSource>>,
}

impl HookGuard {
    /// Install `source`; the returned guard uninstalls it on release or drop
    pub fn install(
        mut source: Box<dyn KeyEventSource>,
        tracker: Arc<KeyStateTracker>,
    ) -> Result<Self, HookError> {
        source.install(tracker)?;
        info!("key event hook installed");
        Ok(Self {
            source: Some(source),
        })
    }

    /// Uninstall the source. Failures are logged, not returned.
    pub fn release(&mut self) {
        let Some(mut source) = self.source.take() else {
            return;
        };

        match source.uninstall() {
            Ok(()) => info!("key event hook released"),
            Err(e) => error!(?e, "failed to release key event hook"),
        }
    }

    #[cfg(test)]
    pub fn is_installed(&self) -> bool {
        self.source.is_some()
    }
}

impl Drop for HookGuard {
    fn drop(&mut self) {
        self.release();
    }
}

/// Global key listener backed by the platform's event tap
///
/// Runs on a dedicated thread with its own run loop. On platforms without
/// a supported hook, `install` fails with `HookError::Unsupported`.
pub struct HotkeyListener {
    running: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl HotkeyListener {
    /// Create a new, not yet installed, listener
    pub fn new() -> Self {
        Self {
            running: Arc::new(AtomicBool::new(false)),
            thread: None,
        }
    }

    /// Check if the listener thread is currently running
    #[cfg(test)]
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

impl Default for HotkeyListener {
    fn default() -> Self {
        Self::new()
    }
}

impl KeyEventSource for HotkeyListener {
    #[cfg(target_os = "macos")]
    fn install(&mut self, tracker: Arc<KeyStateTracker>) -> Result<(), HookError> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(HookError::AlreadyInstalled);
        }

        match super::tap::spawn(tracker, Arc::clone(&self.running)) {
            Ok(handle) => {
                self.thread = Some(handle);
                Ok(())
            }
            Err(e) => {
                self.running.store(false, Ordering::SeqCst);
                Err(e)
            }
        }
    }

    #[cfg(not(target_os = "macos"))]
    fn install(&mut self, _tracker: Arc<KeyStateTracker>) -> Result<(), HookError> {
        Err(HookError::Unsupported)
    }

    fn uninstall(&mut self) -> Result<(), HookError> {
        self.running.store(false, Ordering::SeqCst);

        // The run loop checks the flag between short slices, so this join is brief
        match self.thread.take() {
            Some(handle) => handle.join().map_err(|_| HookError::ThreadPanicked),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use tokio::sync::Notify;

    use crate::hotkey::VirtualKeyCode;

    #[derive(Default)]
    struct Counters {
        installs: AtomicUsize,
        uninstalls: AtomicUsize,
    }

    /// Source that replays a fixed key sequence on install
    struct ScriptedSource {
        counters: Arc<Counters>,
        script: Vec<(VirtualKeyCode, bool)>,
        fail_install: bool,
        fail_uninstall: bool,
    }

    impl ScriptedSource {
        fn new(counters: Arc<Counters>) -> Self {
            Self {
                counters,
                script: Vec::new(),
                fail_install: false,
                fail_uninstall: false,
            }
        }
    }

    impl KeyEventSource for ScriptedSource {
        fn install(&mut self, tracker: Arc<KeyStateTracker>) -> Result<(), HookError> {
            if self.fail_install {
                return Err(HookError::EventTapCreation);
            }
            self.counters.installs.fetch_add(1, Ordering::SeqCst);
            for (code, down) in &self.script {
                if *down {
                    tracker.on_key_down(*code);
                } else {
                    tracker.on_key_up(*code);
                }
            }
            Ok(())
        }

        fn uninstall(&mut self) -> Result<(), HookError> {
            self.counters.uninstalls.fetch_add(1, Ordering::SeqCst);
            if self.fail_uninstall {
                return Err(HookError::ThreadPanicked);
            }
            Ok(())
        }
    }

    fn tracker() -> Arc<KeyStateTracker> {
        Arc::new(KeyStateTracker::new(Arc::new(Notify::new())))
    }

    #[test]
    fn test_guard_delivers_events() {
        let counters = Arc::new(Counters::default());
        let mut source = ScriptedSource::new(Arc::clone(&counters));
        source.script = vec![(VirtualKeyCode(1), true), (VirtualKeyCode(2), true), (VirtualKeyCode(1), false)];

        let tracker = tracker();
        let _guard = HookGuard::install(Box::new(source), Arc::clone(&tracker)).unwrap();

        assert_eq!(tracker.snapshot().into_iter().collect::<Vec<_>>(), vec![VirtualKeyCode(2)]);
    }

    #[test]
    fn test_release_exactly_once() {
        let counters = Arc::new(Counters::default());
        let source = ScriptedSource::new(Arc::clone(&counters));

        let mut guard = HookGuard::install(Box::new(source), tracker()).unwrap();
        assert!(guard.is_installed());

        guard.release();
        guard.release();
        assert!(!guard.is_installed());
        drop(guard);

        assert_eq!(counters.installs.load(Ordering::SeqCst), 1);
        assert_eq!(counters.uninstalls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_release_on_drop() {
        let counters = Arc::new(Counters::default());
        {
            let source = ScriptedSource::new(Arc::clone(&counters));
            let _guard = HookGuard::install(Box::new(source), tracker()).unwrap();
        }
        assert_eq!(counters.uninstalls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_release_failure_is_swallowed() {
        let counters = Arc::new(Counters::default());
        let mut source = ScriptedSource::new(Arc::clone(&counters));
        source.fail_uninstall = true;

        let mut guard = HookGuard::install(Box::new(source), tracker()).unwrap();
        guard.release();
        drop(guard);

        assert_eq!(counters.uninstalls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_install_failure_surfaces() {
        let counters = Arc::new(Counters::default());
        let mut source = ScriptedSource::new(Arc::clone(&counters));
        source.fail_install = true;

        let result = HookGuard::install(Box::new(source), tracker());
        assert!(matches!(result, Err(HookError::EventTapCreation)));
        assert_eq!(counters.uninstalls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_listener_creation() {
        let listener = HotkeyListener::new();
        assert!(!listener.is_running());
    }

    #[cfg(not(target_os = "macos"))]
    #[test]
    fn test_listener_unsupported_platform() {
        let mut listener = HotkeyListener::new();
        assert!(matches!(listener.install(tracker()), Err(HookError::Unsupported)));
        assert!(listener.uninstall().is_ok());
    }
}
