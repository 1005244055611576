//! Hotkey module for global key combination detection
//!
//! Resolves configured `KEY+KEY` expressions into bindings, tracks which
//! keys are held, and bridges the OS key event feed (CGEventTap on macOS)
//! into that state.

mod binding;
mod keys;
mod listener;
#[cfg_attr(not(target_os = "macos"), allow(dead_code))]
mod modifiers;
mod registry;
#[cfg(target_os = "macos")]
mod tap;
mod tracker;

pub use binding::KeyBinding;
pub use keys::{VirtualKeyCode, VirtualKeyTable};
pub use listener::{HookGuard, HotkeyListener};
pub use registry::{BindingEntry, BindingRegistry, BindingSet, ReloadReport};
pub use tracker::{is_subset, KeyStateTracker};
