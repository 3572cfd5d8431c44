//! Tenant Registry (spec.md §4.A).
//!
//! Loads a JSON array of tenant descriptors (bare strings, or objects with
//! at least `id`) from a configured path and answers membership queries.
//! Reload is an atomic swap of an `Arc<HashSet<String>>` snapshot so
//! concurrent readers never observe a torn set, matching the
//! "copy-on-reload" resource model in spec.md §5.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use arc_swap::ArcSwap;
use serde::Deserialize;
use tracing::{info, warn};

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum TenantDescriptor {
    Bare(String),
    Detailed(TenantDetail),
}

#[derive(Debug, Deserialize, Clone)]
struct TenantDetail {
    id: String,
    #[serde(default)]
    policy_id: Option<String>,
    #[serde(default = "default_active")]
    active: bool,
}

fn default_active() -> bool {
    true
}

#[derive(Debug, Default, Clone)]
struct Snapshot {
    ids: HashSet<String>,
    metadata: HashMap<String, TenantMetadata>,
}

/// Metadata available for a tenant beyond its bare id.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TenantMetadata {
    pub policy_id: Option<String>,
    pub active: bool,
}

/// Process-local, read-mostly cache of known tenant ids.
///
/// Construction never fails: a missing or malformed file yields an empty
/// registry (spec.md §4.A — "Invalid/missing file yields an empty set,
/// never raises"), which in turn means every event is rejected as
/// `unknown_tenant_id` until the file is fixed and `reload()` is called.
pub struct TenantRegistry {
    path: PathBuf,
    snapshot: ArcSwap<Snapshot>,
}

impl TenantRegistry {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let registry = Self {
            path: path.into(),
            snapshot: ArcSwap::from_pointee(Snapshot::default()),
        };
        registry.reload();
        registry
    }

    /// Atomically replaces the backing set by re-reading the configured file.
    pub fn reload(&self) {
        let snapshot = load_snapshot(&self.path);
        info!(tenant_count = snapshot.ids.len(), path = %self.path.display(), "tenant_registry_reloaded");
        self.snapshot.store(Arc::new(snapshot));
    }

    pub fn all(&self) -> HashSet<String> {
        self.snapshot.load().ids.clone()
    }

    pub fn is_valid(&self, tenant_id: &str) -> bool {
        if tenant_id.is_empty() {
            return false;
        }
        self.snapshot.load().ids.contains(tenant_id)
    }

    pub fn metadata(&self, tenant_id: &str) -> Option<TenantMetadata> {
        self.snapshot.load().metadata.get(tenant_id).cloned()
    }

    pub fn len(&self) -> usize {
        self.snapshot.load().ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn load_snapshot(path: &Path) -> Snapshot {
    let Ok(contents) = std::fs::read_to_string(path) else {
        return Snapshot::default();
    };
    let Ok(descriptors) = serde_json::from_str::<Vec<TenantDescriptor>>(&contents) else {
        warn!(path = %path.display(), "tenant_registry_parse_failed");
        return Snapshot::default();
    };

    let mut ids = HashSet::new();
    let mut metadata = HashMap::new();
    for descriptor in descriptors {
        match descriptor {
            TenantDescriptor::Bare(id) => {
                let id = id.trim().to_string();
                if !id.is_empty() {
                    ids.insert(id);
                }
            }
            TenantDescriptor::Detailed(detail) => {
                let id = detail.id.trim().to_string();
                if id.is_empty() {
                    continue;
                }
                metadata.insert(
                    id.clone(),
                    TenantMetadata {
                        policy_id: detail.policy_id.clone(),
                        active: detail.active,
                    },
                );
                ids.insert(id);
            }
        }
    }
    Snapshot { ids, metadata }
}
