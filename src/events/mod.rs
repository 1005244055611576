//! Events module for binding activations
//!
//! An `ActivationEvent` is produced by the dispatcher for every binding
//! found fully held during a scan and fanned out to the command proxy and
//! IPC subscribers.

use serde::Serialize;

use crate::hotkey::{BindingEntry, KeyBinding};

/// A binding whose keys were all held during a scan
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActivationEvent {
    /// Expression the binding was configured under
    pub expression: String,

    /// Keys and command, taken from the same registry snapshot
    pub binding: KeyBinding,

    /// Registry generation the binding belongs to
    pub generation: u64,
}

impl ActivationEvent {
    pub fn new(entry: &BindingEntry, generation: u64) -> Self {
        Self {
            expression: entry.expression.clone(),
            binding: entry.binding.clone(),
            generation,
        }
    }

    /// Command to hand downstream
    pub fn command(&self) -> &str {
        self.binding.command()
    }
}

impl std::fmt::Display for ActivationEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "<{}> -> {}", self.expression, self.binding.command())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hotkey::VirtualKeyCode;

    fn entry() -> BindingEntry {
        BindingEntry {
            expression: "CTRL+SHIFT+P".to_string(),
            binding: KeyBinding::new([VirtualKeyCode(0x3B), VirtualKeyCode(0x38), VirtualKeyCode(0x23)], "play:applause"),
        }
    }

    #[test]
    fn test_event_serialization() {
        let event = ActivationEvent::new(&entry(), 3);
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("play:applause"));
        assert!(json.contains("\"generation\":3"));
        assert!(json.contains("\"keys\":[35,56,59]"));
    }

    #[test]
    fn test_event_display() {
        let event = ActivationEvent::new(&entry(), 1);
        assert_eq!(event.to_string(), "<CTRL+SHIFT+P> -> play:applause");
        assert_eq!(event.command(), "play:applause");
    }
}
