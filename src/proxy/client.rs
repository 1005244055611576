//! HTTP command proxy
//!
//! Forwards each activated command to the configured endpoint. Requests
//! run on detached tasks so a slow endpoint never holds up the activation
//! stream; failures are logged and dropped.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use parking_lot::RwLock;
use tokio::sync::{broadcast, Semaphore};
use tracing::{error, info, trace, warn};

use crate::events::ActivationEvent;

/// Upper bound on one command request, connect included
const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Requests allowed in flight; activations beyond this are dropped
const MAX_IN_FLIGHT: usize = 8;

/// Sends bound commands to the command endpoint
#[derive(Clone)]
pub struct CommandProxy {
    client: reqwest::Client,
    command_uri: Arc<RwLock<Option<String>>>,
    in_flight: Arc<Semaphore>,
}

impl CommandProxy {
    pub fn new(command_uri: Option<String>) -> Result<Self> {
        Self::with_timeout(command_uri, REQUEST_TIMEOUT)
    }

    pub fn with_timeout(command_uri: Option<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build HTTP client")?;

        Ok(Self {
            client,
            command_uri: Arc::new(RwLock::new(command_uri)),
            in_flight: Arc::new(Semaphore::new(MAX_IN_FLIGHT)),
        })
    }

    /// Swap the endpoint template after a configuration reload
    pub fn set_command_uri(&self, command_uri: Option<String>) {
        *self.command_uri.write() = command_uri;
    }

    /// Forward activations until the channel closes
    pub async fn run(&self, mut rx: broadcast::Receiver<ActivationEvent>) {
        info!("command proxy started");

        loop {
            match rx.recv().await {
                Ok(event) => {
                    let Ok(permit) = Arc::clone(&self.in_flight).try_acquire_owned() else {
                        warn!(command = event.command(), "command endpoint saturated, dropping command");
                        continue;
                    };
                    let proxy = self.clone();
                    tokio::spawn(async move {
                        proxy.send_command(event.command()).await;
                        drop(permit);
                    });
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!(skipped = n, "command proxy lagged behind activations");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }

        info!("command proxy stopped");
    }

    /// Send one command; errors are logged, never returned
    pub async fn send_command(&self, command: &str) {
        info!(command, "sending proxy command");

        match self.post(command).await {
            Ok(()) => trace!(command, "sent proxy command"),
            Err(e) => error!(command, error = %format!("{e:#}"), "failed to send proxy command"),
        }
    }

    async fn post(&self, command: &str) -> Result<()> {
        let template = self.command_uri.read().clone();
        let Some(template) = template.filter(|t| !t.trim().is_empty()) else {
            bail!("command URI not configured");
        };

        let uri = render_uri(&template, command);
        let response = self
            .client
            .post(&uri)
            .send()
            .await
            .with_context(|| format!("request to {uri} failed"))?;

        if !response.status().is_success() {
            bail!("command endpoint returned {}", response.status());
        }
        Ok(())
    }
}

/// Substitute the percent-encoded command for `{command}` or `{0}`
///
/// Single pass: text that comes from the command is never rescanned.
pub fn render_uri(template: &str, command: &str) -> String {
    let encoded = urlencoding::encode(command);
    let mut uri = String::with_capacity(template.len() + encoded.len());
    let mut rest = template;

    while let Some(start) = rest.find('{') {
        uri.push_str(&rest[..start]);
        let tail = &rest[start..];
        if let Some(after) = tail.strip_prefix("{command}") {
            uri.push_str(&encoded);
            rest = after;
        } else if let Some(after) = tail.strip_prefix("{0}") {
            uri.push_str(&encoded);
            rest = after;
        } else {
            uri.push('{');
            rest = &tail[1..];
        }
    }
    uri.push_str(rest);
    uri
}
