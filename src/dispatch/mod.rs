//! Activation dispatch
//!
//! Turns key state changes into `ActivationEvent`s on a single background
//! task, and bundles the engine behind `KeybindingService`.

mod dispatcher;
mod service;

pub use service::{BindingInfo, KeybindingService};
