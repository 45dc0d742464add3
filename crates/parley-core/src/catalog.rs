//! Scenario lookup by organisation and role.

use crate::scenario::{CompiledScenario, Strictness};
use crate::{ParleyError, Result};
use dashmap::DashMap;
use parley_types::Scenario;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

/// Maps an `(org, role)` pair to a scenario file.
#[derive(Debug, Clone, Deserialize)]
pub struct CatalogEntry {
    pub org: String,
    pub role: String,
    /// Relative to the catalog root.
    pub file: PathBuf,
}

impl CatalogEntry {
    pub fn new(org: &str, role: &str, file: impl Into<PathBuf>) -> Self {
        Self {
            org: org.to_string(),
            role: role.to_string(),
            file: file.into(),
        }
    }
}

/// Built-in catalog.
pub fn default_entries() -> Vec<CatalogEntry> {
    vec![
        CatalogEntry::new("sga", "swe", "sga/sga-software-engineer.json"),
        CatalogEntry::new("sga", "de", "sga/sga-data-engineer.json"),
        CatalogEntry::new("sga", "ml", "sga/sga-ml-engineer.json"),
    ]
}

/// Loads and caches compiled scenarios.
pub struct ScenarioCatalog {
    root: PathBuf,
    entries: Vec<CatalogEntry>,
    strictness: Strictness,
    cache: DashMap<PathBuf, Arc<CompiledScenario>>,
}

impl ScenarioCatalog {
    pub fn new(root: impl Into<PathBuf>, entries: Vec<CatalogEntry>, strictness: Strictness) -> Self {
        Self {
            root: root.into(),
            entries,
            strictness,
            cache: DashMap::new(),
        }
    }

    /// Resolve a case-insensitive `(org, role)` pair to a compiled scenario.
    pub fn resolve(&self, org: &str, role: &str) -> Result<Arc<CompiledScenario>> {
        let entry = self
            .entries
            .iter()
            .find(|e| e.org.eq_ignore_ascii_case(org) && e.role.eq_ignore_ascii_case(role))
            .ok_or_else(|| ParleyError::ScenarioNotFound {
                org: org.to_string(),
                role: role.to_string(),
            })?;

        let path = self.root.join(&entry.file);
        if let Some(cached) = self.cache.get(&path) {
            debug!(target: "parley::scenario", "Scenario cache hit: {}", path.display());
            return Ok(cached.clone());
        }

        let scenario = load_file(&path).map_err(|e| match e {
            ParleyError::IoError(io) if io.kind() == std::io::ErrorKind::NotFound => {
                ParleyError::ScenarioNotFound {
                    org: org.to_string(),
                    role: role.to_string(),
                }
            }
            other => other,
        })?;
        let compiled = Arc::new(CompiledScenario::compile(scenario, self.strictness)?);
        info!(target: "parley::scenario", "Loaded scenario {}/{} from {}", org, role, path.display());

        self.cache.insert(path, compiled.clone());
        Ok(compiled)
    }
}

/// Parse a scenario file; `.yaml`/`.yml` as YAML, anything else as JSON.
pub fn load_file(path: &Path) -> Result<Scenario> {
    let raw = std::fs::read_to_string(path)?;
    let is_yaml = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("yaml") || e.eq_ignore_ascii_case("yml"));
    if is_yaml {
        Ok(serde_yaml::from_str(&raw)?)
    } else {
        Ok(serde_json::from_str(&raw)?)
    }
}
