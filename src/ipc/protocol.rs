//! IPC message protocol definitions
//!
//! All messages are JSON-encoded, prefixed with a 4-byte little-endian length.

use serde::{Deserialize, Serialize};

use crate::dispatch::BindingInfo;
use crate::events::ActivationEvent;
use crate::hotkey::ReloadReport;

/// Requests from clients to the daemon
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Request {
    /// Request current daemon status
    GetStatus,

    /// List registered bindings with their live state
    ListBindings,

    /// Check whether one configured binding is fully held
    IsActive { expression: String },

    /// Re-read the configuration file
    Reload,

    /// Ping to check connectivity
    Ping,

    /// Subscribe to activation notifications
    Subscribe,
}

/// Responses from daemon to clients
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Response {
    /// Current daemon status
    Status(DaemonStatus),

    /// Registered bindings
    Bindings { bindings: Vec<BindingInfo> },

    /// Result of an `is_active` query
    Active { expression: String, active: bool },

    /// Outcome of a configuration reload
    Reloaded(ReloadReport),

    /// Pong response to ping
    Pong,

    /// Subscription confirmed
    Subscribed,

    /// Error response
    Error { code: String, message: String },
}

impl Response {
    pub fn error(code: &str, message: impl Into<String>) -> Self {
        Self::Error {
            code: code.to_string(),
            message: message.into(),
        }
    }
}

/// Push notification from daemon to subscribed clients
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Notification {
    /// A binding was found fully held
    Activated(ActivationEvent),
}

/// Full daemon status snapshot
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonStatus {
    /// Daemon version
    pub version: String,

    /// Whether the OS key hook is installed
    pub hook_installed: bool,

    /// Number of active bindings
    pub binding_count: usize,

    /// Number of keys currently held
    pub pressed_keys: usize,

    /// Registry generation of the active bindings
    pub generation: u64,

    /// Uptime in seconds
    pub uptime_secs: u64,
}

impl Default for DaemonStatus {
    fn default() -> Self {
        Self {
            version: env!("CARGO_PKG_VERSION").to_string(),
            hook_installed: false,
            binding_count: 0,
            pressed_keys: 0,
            generation: 0,
            uptime_secs: 0,
        }
    }
}
