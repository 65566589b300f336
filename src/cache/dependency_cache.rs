//! The persisted dependency graph.
//!
//! Corpus scans are expensive, so the graph is written to a single JSON file
//! after a full scan and reused until the file is deleted. Nothing here
//! invalidates the file automatically.

use std::fs;
use std::io;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::{CacheError, CacheResult};
use crate::graph::{DependencyGraph, KeyModuleRegistry};

/// Everything a corpus scan produces.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DependencyCache {
    pub dependency_records: DependencyGraph,
    pub key_modules: KeyModuleRegistry,
}

impl DependencyCache {
    pub fn new(dependency_records: DependencyGraph, key_modules: KeyModuleRegistry) -> Self {
        Self {
            dependency_records,
            key_modules,
        }
    }

    /// Read a cache file.
    ///
    /// Returns `Ok(None)` when the file does not exist.
    pub fn load(path: &Path) -> CacheResult<Option<Self>> {
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "no dependency cache");
                return Ok(None);
            }
            Err(source) => {
                return Err(CacheError::Io {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };

        let cache: Self = serde_json::from_str(&content).map_err(|source| CacheError::Json {
            path: path.to_path_buf(),
            source,
        })?;
        info!(
            path = %path.display(),
            modules = cache.dependency_records.module_count(),
            "loaded dependency cache"
        );
        Ok(Some(cache))
    }

    /// Write the cache file, creating parent directories.
    pub fn save(&self, path: &Path) -> CacheResult<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|source| CacheError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        let json = serde_json::to_string(self).map_err(|source| CacheError::Json {
            path: path.to_path_buf(),
            source,
        })?;
        fs::write(path, json).map_err(|source| CacheError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        info!(path = %path.display(), "saved dependency cache");
        Ok(())
    }

    /// Remove the cache file. Returns whether a file was removed.
    pub fn delete(path: &Path) -> CacheResult<bool> {
        match fs::remove_file(path) {
            Ok(()) => Ok(true),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(source) => {
                warn!(path = %path.display(), error = %source, "could not delete dependency cache");
                Err(CacheError::Io {
                    path: path.to_path_buf(),
                    source,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::ExportKey;
    use crate::graph::ExportRef;

    fn sample() -> DependencyCache {
        let mut graph = DependencyGraph::new();
        graph.add_sync_edge("2", "1");
        graph.add_lazy_edge("3", "1");

        let mut key_modules = KeyModuleRegistry::default();
        key_modules
            .stores
            .push(ExportRef::new("1", ExportKey::named("Z")));
        key_modules
            .dispatchers
            .push(ExportRef::new("4", ExportKey::Default));

        DependencyCache::new(graph, key_modules)
    }

    #[test]
    fn test_save_load_delete() {
        let dir =
            std::env::temp_dir().join(format!("bundlescope_dep_cache_{}", std::process::id()));
        let path = dir.join("nested").join("deps.json");
        fs::remove_dir_all(&dir).ok();

        assert!(DependencyCache::load(&path).unwrap().is_none());

        let cache = sample();
        cache.save(&path).unwrap();
        assert_eq!(DependencyCache::load(&path).unwrap(), Some(cache));

        assert!(DependencyCache::delete(&path).unwrap());
        assert!(!DependencyCache::delete(&path).unwrap());
        assert!(DependencyCache::load(&path).unwrap().is_none());

        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_field_names() {
        let json = serde_json::to_value(sample()).unwrap();
        assert!(json["dependencyRecords"]["1"]["syncImporters"].is_array());
        assert_eq!(json["keyModules"]["stores"][0]["moduleId"], "1");
    }

    #[test]
    fn test_corrupt_file() {
        let path =
            std::env::temp_dir().join(format!("bundlescope_corrupt_{}.json", std::process::id()));
        fs::write(&path, "{ not json").unwrap();
        assert!(matches!(DependencyCache::load(&path), Err(CacheError::Json { .. })));
        fs::remove_file(&path).ok();
    }
}
