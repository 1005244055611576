//! Proxy module forwarding activated commands over HTTP

mod client;

pub use client::CommandProxy;
