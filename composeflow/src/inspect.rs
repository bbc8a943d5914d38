//! Container inspection for a context's staged composition.

use crate::compose::StagingArea;
use crate::contexts::ContextRegistry;
use crate::errors::Result;
use crate::exec::DockerCli;
use futures::future::join_all;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// Entry value for a container whose inspection failed.
pub const FAILED_MARKER: &str = "Failed to collect Data!!";

/// Returns true if `entry` is the failure marker.
#[must_use]
pub fn is_failed_entry(entry: &Value) -> bool {
    entry.as_str() == Some(FAILED_MARKER)
}

/// Reads inspection documents for the containers of a context.
///
/// Takes no lock; results may reflect a run that is in progress.
#[derive(Debug, Clone)]
pub struct ContainerInspector {
    registry: Arc<ContextRegistry>,
    docker: DockerCli,
    staging: StagingArea,
}

impl ContainerInspector {
    /// Creates an inspector reading the given staged-spec slots.
    pub fn new(registry: Arc<ContextRegistry>, docker: DockerCli, staging: StagingArea) -> Self {
        Self {
            registry,
            docker,
            staging,
        }
    }

    /// Inspects every container of the context's staged project.
    ///
    /// Successful entries are keyed by the reported container name without
    /// its leading `/`. A container that cannot be inspected is keyed by its
    /// listed name and maps to [`FAILED_MARKER`]. Failing to list the
    /// containers fails the call.
    pub async fn inspect(&self, context: &str) -> Result<BTreeMap<String, Value>> {
        let context = self.registry.lookup(context)?;
        let spec_path = self.staging.spec_path(&context.name);

        let names = self
            .docker
            .compose_container_names(&context.name, &spec_path)
            .await?;
        debug!(context = %context.name, containers = names.len(), "Inspecting containers");

        let lookups = names
            .iter()
            .map(|name| self.docker.inspect(&context.name, name));
        let documents = join_all(lookups).await;

        let mut entries = BTreeMap::new();
        for (name, outcome) in names.iter().zip(documents) {
            match outcome {
                Ok(document) => {
                    let key = reported_name(&document).unwrap_or_else(|| name.clone());
                    if entries.contains_key(&key) {
                        warn!(
                            context = %context.name,
                            container = %name,
                            key = %key,
                            "Duplicate container name, replacing earlier entry"
                        );
                    }
                    entries.insert(key, document);
                }
                Err(e) => {
                    warn!(context = %context.name, container = %name, error = %e, "Container inspection failed");
                    entries.insert(name.clone(), Value::String(FAILED_MARKER.to_string()));
                }
            }
        }
        Ok(entries)
    }
}

fn reported_name(document: &Value) -> Option<String> {
    document
        .get("Name")
        .and_then(Value::as_str)
        .map(|n| n.trim_start_matches('/').to_string())
        .filter(|n| !n.is_empty())
}
