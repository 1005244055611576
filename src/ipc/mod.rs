//! IPC module for querying bindings and streaming activations

mod protocol;
mod server;

pub use server::Server;
