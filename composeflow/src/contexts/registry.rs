//! Registry of known docker contexts.

use crate::errors::{OrchestrationError, Result};
use crate::exec::DockerCli;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{info, warn};

/// A named remote container-engine target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Context {
    /// Context name as configured in docker.
    pub name: String,
    /// Docker endpoint, e.g. `ssh://deploy@edge-1`.
    pub endpoint: String,
}

impl Context {
    /// Creates a new context.
    pub fn new(name: impl Into<String>, endpoint: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            endpoint: endpoint.into(),
        }
    }
}

/// Read-mostly map of context name to endpoint.
///
/// The map is replaced as a whole on reload, never edited in place, so
/// readers always see either the old or the new set.
#[derive(Debug, Default)]
pub struct ContextRegistry {
    contexts: RwLock<Arc<BTreeMap<String, Context>>>,
}

impl ContextRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry holding the given contexts.
    pub fn from_contexts(contexts: impl IntoIterator<Item = Context>) -> Self {
        let map = contexts
            .into_iter()
            .map(|c| (c.name.clone(), c))
            .collect::<BTreeMap<_, _>>();
        Self {
            contexts: RwLock::new(Arc::new(map)),
        }
    }

    /// Creates a registry populated from `docker context ls`.
    pub async fn load(docker: &DockerCli) -> Self {
        let registry = Self::new();
        registry.reload(docker).await;
        registry
    }

    /// Re-queries docker and swaps in the new set.
    ///
    /// If the query fails the registry becomes empty, so every lookup
    /// reports not found until a later reload succeeds. Returns the number
    /// of contexts now known.
    pub async fn reload(&self, docker: &DockerCli) -> usize {
        let loaded = match docker.list_contexts().await {
            Ok(output) => parse_context_listing(&output.stdout),
            Err(e) => {
                warn!(error = %e, "Failed to list docker contexts, registry is empty");
                BTreeMap::new()
            }
        };

        let count = loaded.len();
        *self.contexts.write() = Arc::new(loaded);
        info!(contexts = count, "Context registry loaded");
        count
    }

    /// Resolves a context by name.
    pub fn lookup(&self, name: &str) -> Result<Context> {
        self.contexts
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| OrchestrationError::context_not_found(name))
    }

    /// Returns true if the context is known.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.contexts.read().contains_key(name)
    }

    /// Returns every context name with its endpoint.
    #[must_use]
    pub fn list(&self) -> BTreeMap<String, String> {
        self.snapshot()
            .values()
            .map(|c| (c.name.clone(), c.endpoint.clone()))
            .collect()
    }

    /// Returns the current set without holding the lock.
    #[must_use]
    pub fn snapshot(&self) -> Arc<BTreeMap<String, Context>> {
        self.contexts.read().clone()
    }

    /// Number of known contexts.
    #[must_use]
    pub fn len(&self) -> usize {
        self.contexts.read().len()
    }

    /// Returns true if no contexts are known.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.contexts.read().is_empty()
    }
}

/// Parses `name|endpoint` lines. Malformed lines are skipped.
#[must_use]
pub fn parse_context_listing(stdout: &str) -> BTreeMap<String, Context> {
    let mut contexts = BTreeMap::new();
    for line in stdout.lines().map(str::trim).filter(|l| !l.is_empty()) {
        let Some((name, endpoint)) = line.split_once('|') else {
            warn!(line = %line, "Skipping malformed context line");
            continue;
        };
        let name = name.trim();
        if name.is_empty() {
            continue;
        }
        contexts.insert(name.to_string(), Context::new(name, endpoint.trim()));
    }
    contexts
}
