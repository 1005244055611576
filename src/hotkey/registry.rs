//! Thread-safe registry of configured key bindings
//!
//! The active `BindingSet` sits behind a reader-writer lock as an
//! `Arc`, so readers take a cheap snapshot and never hold the lock while
//! scanning. Reloads build the replacement set outside the lock and swap
//! it in wholesale.

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::Serialize;
use tracing::{debug, info, warn};

use super::binding::{BindingParser, InvalidBindingError, KeyBinding};
use super::keys::VirtualKeyTable;

/// A parsed binding together with the expression it came from
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BindingEntry {
    /// Expression as written in the configuration
    pub expression: String,
    pub binding: KeyBinding,
}

/// One generation of configured bindings
#[derive(Debug, Default)]
pub struct BindingSet {
    generation: u64,
    entries: Vec<BindingEntry>,
}

impl BindingSet {
    /// Reload counter this set was produced by (0 = never loaded)
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn entries(&self) -> &[BindingEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Find the entry configured under `expression`
    pub fn find(&self, expression: &str) -> Option<&BindingEntry> {
        self.entries.iter().find(|e| e.expression == expression)
    }
}

/// Outcome of a reload
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReloadReport {
    pub generation: u64,
    /// Bindings now active
    pub loaded: usize,
    /// Blank entries ignored
    pub skipped: usize,
    /// Entries that failed to parse
    pub rejected: Vec<String>,
}

/// Holder of the active binding set
pub struct BindingRegistry {
    table: Arc<VirtualKeyTable>,
    current: RwLock<Arc<BindingSet>>,
}

impl BindingRegistry {
    /// Create an empty registry resolving keys through `table`
    pub fn new(table: Arc<VirtualKeyTable>) -> Self {
        Self {
            table,
            current: RwLock::new(Arc::new(BindingSet::default())),
        }
    }

    /// Point-in-time view of the current bindings
    pub fn snapshot(&self) -> Arc<BindingSet> {
        Arc::clone(&self.current.read())
    }

    /// Replace all bindings with those parsed from `raw`
    ///
    /// Each entry is parsed on its own; invalid entries are logged and
    /// left out while the rest still load.
    pub fn reload(&self, raw: &BTreeMap<String, String>) -> ReloadReport {
        info!(entries = raw.len(), "loading key binding configuration");

        let parser = BindingParser::new(&self.table);
        let mut entries = Vec::with_capacity(raw.len());
        let mut report = ReloadReport::default();

        for (expression, command) in raw {
            match parser.parse(expression, command) {
                Ok(Some(binding)) => {
                    debug!(expression = %expression, %binding, "binding parsed");
                    entries.push(BindingEntry {
                        expression: expression.clone(),
                        binding,
                    });
                }
                Ok(None) => {
                    debug!(expression = %expression, "blank binding entry skipped");
                    report.skipped += 1;
                }
                Err(InvalidBindingError { expression, token }) => {
                    warn!(expression = %expression, token = %token, "invalid key binding ignored");
                    report.rejected.push(expression);
                }
            }
        }

        report.loaded = entries.len();

        {
            let mut current = self.current.write();
            report.generation = current.generation + 1;
            *current = Arc::new(BindingSet {
                generation: report.generation,
                entries,
            });
        }

        info!(
            generation = report.generation,
            loaded = report.loaded,
            rejected = report.rejected.len(),
            "key binding configuration loaded"
        );

        report
    }
}
