//! Runtime configuration reload
//!
//! Re-reads the bindings file when it changes on disk or on SIGHUP, and
//! pushes the result into the binding registry and the command proxy.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use notify::{Config as WatcherConfig, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::config::{ConfigError, KeybindConfig};
use crate::dispatch::KeybindingService;
use crate::hotkey::ReloadReport;
use crate::proxy::CommandProxy;

/// Applies the bindings file to the running service
pub struct ConfigReloader {
    service: Arc<KeybindingService>,
    proxy: CommandProxy,
    path: PathBuf,
}

impl ConfigReloader {
    pub fn new(service: Arc<KeybindingService>, proxy: CommandProxy, path: PathBuf) -> Self {
        Self {
            service,
            proxy,
            path,
        }
    }

    /// Apply an already-parsed configuration
    pub fn apply(&self, config: &KeybindConfig) -> ReloadReport {
        self.proxy.set_command_uri(config.command_uri.clone());
        self.service.reload(&config.bindings())
    }

    /// Read the file and apply it; on error the current bindings stay
    pub fn reload(&self) -> Result<ReloadReport, ConfigError> {
        let config = KeybindConfig::read(&self.path)?;
        Ok(self.apply(&config))
    }

    fn reload_logged(&self, trigger: &str) {
        info!(trigger, path = ?self.path, "reloading configuration");
        match self.reload() {
            Ok(report) => debug!(?report, "configuration reloaded"),
            Err(e) => error!(%e, "failed to reload configuration, keeping current bindings"),
        }
    }

    /// Reload on file changes and SIGHUP until the task is dropped
    pub async fn watch(self: Arc<Self>) -> Result<()> {
        let mut sighup = signal(SignalKind::hangup()).context("failed to register SIGHUP handler")?;

        let (file_tx, mut file_rx) = mpsc::channel::<()>(16);
        let _watcher = match watch_file(&self.path, file_tx) {
            Ok(watcher) => Some(watcher),
            Err(e) => {
                warn!(?e, path = ?self.path, "config file watching unavailable, reload via SIGHUP only");
                None
            }
        };

        loop {
            tokio::select! {
                Some(()) = file_rx.recv() => {
                    // Editors emit bursts of events per save
                    while file_rx.try_recv().is_ok() {}
                    self.reload_logged("file changed");
                }
                _ = sighup.recv() => {
                    self.reload_logged("SIGHUP");
                }
            }
        }
    }
}

/// Watch the file's directory so replace-on-save and late creation are seen
fn watch_file(path: &Path, tx: mpsc::Sender<()>) -> Result<RecommendedWatcher> {
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."))
        .to_owned();
    let file_name = path.file_name().map(ToOwned::to_owned);

    let mut watcher = RecommendedWatcher::new(
        move |res: notify::Result<Event>| {
            let Ok(event) = res else {
                return;
            };
            if !matches!(event.kind, EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_)) {
                return;
            }
            let touches_config = event
                .paths
                .iter()
                .any(|p| p.file_name().map(ToOwned::to_owned) == file_name);
            if touches_config {
                let _ = tx.try_send(());
            }
        },
        WatcherConfig::default(),
    )
    .context("failed to create config watcher")?;

    watcher
        .watch(&dir, RecursiveMode::NonRecursive)
        .with_context(|| format!("failed to watch {}", dir.display()))?;

    Ok(watcher)
}
