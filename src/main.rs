//! keybind-daemon: global key combination listener
//!
//! This daemon runs in the background and provides:
//! - System-wide key state tracking via an OS key event hook
//! - Detection of configured key combinations ("bindings")
//! - Forwarding of the bound command to an HTTP endpoint
//! - IPC server for listing bindings and streaming activations
//!
//! Bindings live in a JSON file that is reloaded on change or SIGHUP.

mod config;
mod dispatch;
mod events;
mod hotkey;
mod ipc;
mod lifecycle;
mod proxy;

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::config::{Config, KeybindConfig};
use crate::dispatch::KeybindingService;
use crate::hotkey::{HookGuard, HotkeyListener, VirtualKeyTable};
use crate::ipc::Server;
use crate::lifecycle::{ConfigReloader, ShutdownSignal};
use crate::proxy::CommandProxy;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!(version = env!("CARGO_PKG_VERSION"), "keybind-daemon starting");

    // Load configuration
    let config = Config::load()?;
    config.ensure_dirs()?;
    info!(?config.socket_path, ?config.config_path, "configuration loaded");

    // Nothing can be parsed without the key table
    let table = Arc::new(VirtualKeyTable::builtin().context("failed to load virtual key table")?);
    info!(keys = table.len(), "virtual key table loaded");

    let bindings = KeybindConfig::read(&config.config_path)?;

    // Start the engine (dispatcher runs as a background task)
    let service = Arc::new(KeybindingService::start(table));
    let proxy = CommandProxy::new(bindings.command_uri.clone())?;
    let reloader = Arc::new(ConfigReloader::new(
        Arc::clone(&service),
        proxy.clone(),
        config.config_path.clone(),
    ));
    reloader.apply(&bindings);

    // Install the OS key hook; the daemon stays useful over IPC without it
    let mut hook = match HookGuard::install(Box::new(HotkeyListener::new()), service.tracker()) {
        Ok(guard) => Some(guard),
        Err(e) => {
            error!(?e, "failed to install key event hook");
            warn!("continuing without key detection - check Accessibility permissions");
            None
        }
    };

    let server = Server::new(&config.socket_path, Arc::clone(&service), Arc::clone(&reloader))?;
    server.set_hook_installed(hook.is_some());

    let shutdown = ShutdownSignal::new();

    info!("daemon initialized, entering main loop");

    tokio::select! {
        // Forward activated commands to the command endpoint
        _ = proxy.run(service.subscribe()) => {
            info!("command proxy exited");
        }

        // Run the IPC server (accepts client connections)
        result = server.run() => {
            if let Err(e) = result {
                error!(?e, "IPC server error");
            }
        }

        // Reload bindings on file change or SIGHUP
        result = Arc::clone(&reloader).watch() => {
            if let Err(e) = result {
                error!(?e, "config reload watcher error");
            }
        }

        // Wait for shutdown signal
        result = shutdown.wait() => {
            match result {
                Ok(()) => info!("shutdown signal received"),
                Err(e) => error!(?e, "signal handling failed"),
            }
        }
    }

    // Cleanup
    info!("shutting down...");

    if let Some(guard) = hook.as_mut() {
        guard.release();
    }
    service.shutdown().await;
    server.shutdown().await;

    info!("keybind-daemon stopped");

    Ok(())
}
