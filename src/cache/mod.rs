//! Module text sources and the persisted dependency cache.
//!
//! # Components
//!
//! - [`ModuleSource`] - where module text comes from during a scan or a
//!   resolution
//! - [`DiskModuleCache`] - a directory of `<id>.js` files
//! - [`MemoryModuleSource`] - an in-memory corpus
//! - [`DependencyCache`] - the scanned graph, saved as one JSON file
//!
//! # Example
//!
//! ```
//! use bundlescope::cache::{MemoryModuleSource, ModuleSource};
//!
//! let mut source = MemoryModuleSource::new();
//! source.insert("12", "0,function(e,t,n){}");
//!
//! assert_eq!(source.module_ids().unwrap(), vec!["12"]);
//! assert!(source.load("13").is_err());
//! ```

mod dependency_cache;

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::debug;
use walkdir::WalkDir;

use crate::graph::compare_ids;
use crate::parser::{is_module_id, ModuleId, ModuleText};

pub use dependency_cache::DependencyCache;

/// Errors raised while reading or writing cached data.
#[derive(Error, Debug)]
pub enum CacheError {
    #[error("Module {0} is not cached")]
    NotCached(ModuleId),

    #[error("Failed to access {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to parse cache file {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Result type for cache operations.
pub type CacheResult<T> = Result<T, CacheError>;

/// A corpus of module texts, addressed by module id.
pub trait ModuleSource {
    /// Every module id in the corpus, in numeric order.
    fn module_ids(&self) -> CacheResult<Vec<ModuleId>>;

    /// Text of one module. Fails with [`CacheError::NotCached`] for
    /// unknown ids.
    fn load(&self, id: &str) -> CacheResult<ModuleText>;
}

impl<T: ModuleSource + ?Sized> ModuleSource for &T {
    fn module_ids(&self) -> CacheResult<Vec<ModuleId>> {
        (**self).module_ids()
    }

    fn load(&self, id: &str) -> CacheResult<ModuleText> {
        (**self).load(id)
    }
}

/// Modules stored as `<root>/<id>.js`.
#[derive(Debug, Clone)]
pub struct DiskModuleCache {
    root: PathBuf,
}

impl DiskModuleCache {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path_of(&self, id: &str) -> PathBuf {
        self.root.join(format!("{id}.js"))
    }

    /// Write one module's text, creating the root directory if needed.
    pub fn store(&self, id: &str, source: &str) -> CacheResult<()> {
        fs::create_dir_all(&self.root).map_err(|source| CacheError::Io {
            path: self.root.clone(),
            source,
        })?;
        let path = self.path_of(id);
        fs::write(&path, source).map_err(|source| CacheError::Io { path, source })
    }
}

impl ModuleSource for DiskModuleCache {
    fn module_ids(&self) -> CacheResult<Vec<ModuleId>> {
        let mut ids = Vec::new();

        for entry in WalkDir::new(&self.root).min_depth(1).max_depth(1) {
            let entry = entry.map_err(|err| CacheError::Io {
                path: self.root.clone(),
                source: err.into(),
            })?;
            if !entry.file_type().is_file() {
                continue;
            }

            let path = entry.path();
            let stem = path.file_stem().and_then(|stem| stem.to_str());
            let extension = path.extension().and_then(|ext| ext.to_str());
            match (stem, extension) {
                (Some(stem), Some("js")) if is_module_id(stem) => ids.push(stem.to_string()),
                _ => debug!(path = %path.display(), "ignoring non-module file"),
            }
        }

        ids.sort_by(|a, b| compare_ids(a, b));
        Ok(ids)
    }

    fn load(&self, id: &str) -> CacheResult<ModuleText> {
        let path = self.path_of(id);
        match fs::read_to_string(&path) {
            Ok(source) => Ok(ModuleText::with_id(id, source)),
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                Err(CacheError::NotCached(id.to_string()))
            }
            Err(source) => Err(CacheError::Io { path, source }),
        }
    }
}

/// An in-memory corpus.
#[derive(Debug, Clone, Default)]
pub struct MemoryModuleSource {
    modules: BTreeMap<ModuleId, String>,
}

impl MemoryModuleSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, id: impl Into<ModuleId>, source: impl Into<String>) {
        self.modules.insert(id.into(), source.into());
    }

    pub fn len(&self) -> usize {
        self.modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }
}

impl<I, S> FromIterator<(I, S)> for MemoryModuleSource
where
    I: Into<ModuleId>,
    S: Into<String>,
{
    fn from_iter<T: IntoIterator<Item = (I, S)>>(iter: T) -> Self {
        let mut source = Self::new();
        for (id, text) in iter {
            source.insert(id, text);
        }
        source
    }
}

impl ModuleSource for MemoryModuleSource {
    fn module_ids(&self) -> CacheResult<Vec<ModuleId>> {
        let mut ids: Vec<ModuleId> = self.modules.keys().cloned().collect();
        ids.sort_by(|a, b| compare_ids(a, b));
        Ok(ids)
    }

    fn load(&self, id: &str) -> CacheResult<ModuleText> {
        self.modules
            .get(id)
            .map(|source| ModuleText::with_id(id, source.as_str()))
            .ok_or_else(|| CacheError::NotCached(id.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_root(name: &str) -> PathBuf {
        let root = std::env::temp_dir().join(format!("bundlescope_{name}_{}", std::process::id()));
        fs::remove_dir_all(&root).ok();
        root
    }

    #[test]
    fn test_disk_cache_round_trip() {
        let root = temp_root("disk_cache");
        let cache = DiskModuleCache::new(&root);

        cache.store("12", "0,function(e,t,n){}").unwrap();
        let module = cache.load("12").unwrap();
        assert_eq!(module.id(), Some("12"));
        assert_eq!(module.source(), "0,function(e,t,n){}");

        fs::remove_dir_all(&root).ok();
    }

    #[test]
    fn test_disk_cache_not_cached() {
        let root = temp_root("disk_missing");
        let cache = DiskModuleCache::new(&root);
        cache.store("1", "").unwrap();

        assert!(matches!(cache.load("2"), Err(CacheError::NotCached(id)) if id == "2"));

        fs::remove_dir_all(&root).ok();
    }

    #[test]
    fn test_disk_cache_enumeration() {
        let root = temp_root("disk_enum");
        let cache = DiskModuleCache::new(&root);
        for id in ["10", "9", "100"] {
            cache.store(id, "").unwrap();
        }
        fs::write(root.join("notes.js"), "").unwrap();
        fs::write(root.join("11.txt"), "").unwrap();
        fs::create_dir_all(root.join("12.js")).unwrap();

        assert_eq!(cache.module_ids().unwrap(), vec!["9", "10", "100"]);

        fs::remove_dir_all(&root).ok();
    }

    #[test]
    fn test_memory_source() {
        let source: MemoryModuleSource = [("2", "b"), ("10", "a")].into_iter().collect();
        assert_eq!(source.len(), 2);
        assert_eq!(source.module_ids().unwrap(), vec!["2", "10"]);
        assert_eq!(source.load("10").unwrap().source(), "a");
        assert!(matches!(source.load("3"), Err(CacheError::NotCached(_))));
    }

    #[test]
    fn test_header_overrides_file_name() {
        let source: MemoryModuleSource = [("3", "// Webpack Module 4\n0,function(){}")]
            .into_iter()
            .collect();
        assert_eq!(source.load("3").unwrap().id(), Some("4"));
    }
}
