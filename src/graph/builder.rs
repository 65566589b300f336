//! Corpus scan producing the dependency graph and key-module registry.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::{info, warn};

use super::{DependencyGraph, GraphError, GraphResult, KeyModuleRegistry};
use crate::analysis::required_modules;
use crate::cache::{CacheError, DependencyCache, MemoryModuleSource, ModuleSource};
use crate::parser::{ModuleParser, ModuleText};

/// Modules scanned between two progress reports.
pub const CHECKPOINT_INTERVAL: usize = 250;

/// Cooperative cancellation flag shared between a scan and its host.
///
/// # Example
///
/// ```rust
/// use bundlescope::graph::CancellationToken;
///
/// let token = CancellationToken::new();
/// let handle = token.clone();
/// handle.cancel();
/// assert!(token.is_cancelled());
/// ```
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Observer of a running corpus scan.
pub trait ScanProgress {
    /// Called every [`CHECKPOINT_INTERVAL`] modules and once at the end.
    fn checkpoint(&mut self, _scanned: usize, _total: usize) {}
}

impl ScanProgress for () {}

/// Reports scan progress through `tracing`.
#[derive(Debug, Default)]
pub struct LogProgress;

impl ScanProgress for LogProgress {
    fn checkpoint(&mut self, scanned: usize, total: usize) {
        info!(scanned, total, "scanning modules");
    }
}

/// Builds a [`DependencyCache`] from a module corpus.
pub struct GraphBuilder<'s> {
    source: &'s dyn ModuleSource,
    cache_file: Option<PathBuf>,
    use_cache: bool,
}

impl<'s> GraphBuilder<'s> {
    pub fn new(source: &'s dyn ModuleSource) -> Self {
        Self {
            source,
            cache_file: None,
            use_cache: false,
        }
    }

    /// Where the scan result is saved after a full scan.
    pub fn cache_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.cache_file = Some(path.into());
        self
    }

    /// Reuse the cache file instead of scanning, when it exists.
    pub fn use_cache(mut self, use_cache: bool) -> Self {
        self.use_cache = use_cache;
        self
    }

    pub fn build(
        &self,
        cancel: &CancellationToken,
        progress: &mut dyn ScanProgress,
    ) -> GraphResult<DependencyCache> {
        if let (true, Some(path)) = (self.use_cache, &self.cache_file) {
            if let Some(cache) = DependencyCache::load(path)? {
                return Ok(cache);
            }
        }

        let cache = self.scan(cancel, progress)?;
        if let Some(path) = &self.cache_file {
            cache.save(path)?;
        }
        Ok(cache)
    }

    fn scan(
        &self,
        cancel: &CancellationToken,
        progress: &mut dyn ScanProgress,
    ) -> GraphResult<DependencyCache> {
        let ids = self.source.module_ids()?;
        let total = ids.len();
        let mut parser = ModuleParser::new()?;
        let mut graph = DependencyGraph::new();
        let mut key_modules = KeyModuleRegistry::default();

        for (scanned, id) in ids.iter().enumerate() {
            if cancel.is_cancelled() {
                info!(scanned, total, "scan cancelled");
                return Err(GraphError::Cancelled { scanned, total });
            }
            if scanned > 0 && scanned % CHECKPOINT_INTERVAL == 0 {
                progress.checkpoint(scanned, total);
            }

            let module = match self.source.load(id) {
                Ok(module) => module,
                Err(CacheError::NotCached(_)) => {
                    warn!(module = %id, "module listed but not cached");
                    continue;
                }
                Err(err) => return Err(err.into()),
            };
            let Some(module_id) = module.id().map(str::to_string) else {
                warn!(file = %id, "skipping module without an id");
                continue;
            };
            let ast = match parser.parse(module) {
                Ok(ast) => ast,
                Err(err) => {
                    warn!(
                        module = %module_id,
                        error = %err,
                        "skipping module that failed to parse"
                    );
                    continue;
                }
            };

            let required = required_modules(&ast);
            for target in &required.sync {
                graph.add_sync_edge(&module_id, target);
            }
            for target in &required.lazy {
                graph.add_lazy_edge(&module_id, target);
            }
            key_modules.register(&module_id, &ast);
        }
        progress.checkpoint(total, total);

        key_modules.close_over_re_exports(&graph, self.source, cancel)?;
        info!(
            modules = total,
            edges = graph.edge_count(),
            key_modules = key_modules.len(),
            "dependency graph built"
        );
        Ok(DependencyCache::new(graph, key_modules))
    }
}

/// Scan an in-memory corpus. Modules without an id are skipped.
pub fn build_dependency_graph(
    corpus: impl IntoIterator<Item = ModuleText>,
) -> GraphResult<DependencyCache> {
    let mut source = MemoryModuleSource::new();
    for module in corpus {
        match module.id() {
            Some(id) => source.insert(id, module.source()),
            None => warn!("skipping module without an id"),
        }
    }
    GraphBuilder::new(&source).build(&CancellationToken::new(), &mut ())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::ExportKey;
    use crate::graph::ExportRef;
    use std::fs;

    fn corpus(modules: &[(&str, &str)]) -> MemoryModuleSource {
        modules.iter().copied().collect()
    }

    fn temp_cache(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("bundlescope_{name}_{}.json", std::process::id()))
    }

    fn empty_modules(count: usize) -> MemoryModuleSource {
        (0..count)
            .map(|i| (i.to_string(), "0,function(e,t,n){}".to_string()))
            .collect()
    }

    #[derive(Default)]
    struct Recorder(Vec<(usize, usize)>);

    impl ScanProgress for Recorder {
        fn checkpoint(&mut self, scanned: usize, total: usize) {
            self.0.push((scanned, total));
        }
    }

    /// Cancels the scan from its first checkpoint.
    struct CancelAtCheckpoint(CancellationToken);

    impl ScanProgress for CancelAtCheckpoint {
        fn checkpoint(&mut self, _scanned: usize, _total: usize) {
            self.0.cancel();
        }
    }

    #[test]
    fn test_scenario_sync_importer() {
        let cache = build_dependency_graph([
            ModuleText::with_id("1", "function(e,t,n){ n.d(t,{Z:()=>y}); const y=1; }"),
            ModuleText::with_id("2", "function(e,t,n){ var m=n(1); console.log(m.Z); }"),
        ])
        .unwrap();

        let record = cache.dependency_records.record("1");
        assert!(record.sync_importers.contains("2"));
        assert!(record.lazy_importers.is_empty());
    }

    #[test]
    fn test_sparse_records() {
        let cache = build_dependency_graph([
            ModuleText::with_id("1", "0,function(e,t,n){ n(2); }"),
            ModuleText::with_id("2", "0,function(e,t,n){}"),
            ModuleText::with_id("5", "0,function(e,t,n){ n(1); }"),
        ])
        .unwrap();

        assert!(cache.dependency_records.record("5").is_empty());
        assert!(cache.dependency_records.record("999").is_empty());
    }

    #[test]
    fn test_lazy_edges() {
        let cache = build_dependency_graph([ModuleText::with_id(
            "7",
            "0,function(e,t,n){ Promise.resolve().then(n.bind(n, 8)); }",
        )])
        .unwrap();
        assert!(cache.dependency_records.record("8").lazy_importers.contains("7"));
    }

    #[test]
    fn test_modules_without_id_are_skipped() {
        let cache = build_dependency_graph([
            ModuleText::new("0,function(e,t,n){ n(1); }"),
            ModuleText::with_id("3", "0,function(e,t,n){ n(1); }"),
        ])
        .unwrap();
        let importers: Vec<_> = cache.dependency_records.importers("1").collect();
        assert_eq!(importers, vec!["3"]);
    }

    #[test]
    fn test_key_modules_registered() {
        let cache = build_dependency_graph([
            ModuleText::with_id(
                "1",
                concat!(
                    "0,function(e,t,n){ n.d(t,{Z:()=>s});",
                    " class o extends B { initialize(){} } var s = new o({}); }"
                ),
            ),
            ModuleText::with_id("2", "0,function(e,t,n){ n.d(t,{W:()=>r.Z}); var r = n(1); }"),
        ])
        .unwrap();

        assert_eq!(
            cache.key_modules.stores,
            vec![
                ExportRef::new("1", ExportKey::named("Z")),
                ExportRef::new("2", ExportKey::named("W")),
            ]
        );
    }

    #[test]
    fn test_cancelled_scan() {
        let source = corpus(&[("1", "0,function(e,t,n){}")]);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result = GraphBuilder::new(&source).build(&cancel, &mut ());
        assert!(matches!(result, Err(GraphError::Cancelled { scanned: 0, total: 1 })));
    }

    #[test]
    fn test_cancelled_scan_writes_no_cache() {
        let path = temp_cache("cancel");
        fs::remove_file(&path).ok();

        let source = corpus(&[("1", "0,function(e,t,n){}")]);
        let cancel = CancellationToken::new();
        cancel.cancel();
        let _ = GraphBuilder::new(&source).cache_file(&path).build(&cancel, &mut ());

        assert!(!path.exists());
    }

    #[test]
    fn test_cancel_during_scan() {
        let path = temp_cache("cancel_mid_scan");
        fs::remove_file(&path).ok();

        let source = empty_modules(600);
        let cancel = CancellationToken::new();
        let result = GraphBuilder::new(&source)
            .cache_file(&path)
            .build(&cancel, &mut CancelAtCheckpoint(cancel.clone()));

        assert!(matches!(
            result,
            Err(GraphError::Cancelled {
                scanned,
                total: 600,
            }) if scanned == CHECKPOINT_INTERVAL + 1
        ));
        assert!(!path.exists());
    }

    #[test]
    fn test_progress_checkpoints() {
        let source = empty_modules(CHECKPOINT_INTERVAL * 2 + 10);
        let total = source.len();

        let mut recorder = Recorder::default();
        GraphBuilder::new(&source)
            .build(&CancellationToken::new(), &mut recorder)
            .unwrap();

        assert_eq!(
            recorder.0,
            vec![
                (CHECKPOINT_INTERVAL, total),
                (CHECKPOINT_INTERVAL * 2, total),
                (total, total),
            ]
        );
    }

    #[test]
    fn test_cache_file_round_trip() {
        let path = temp_cache("builder");
        fs::remove_file(&path).ok();

        let source = corpus(&[
            ("1", "0,function(e,t,n){}"),
            ("2", "0,function(e,t,n){ n(1); }"),
        ]);
        let built = GraphBuilder::new(&source)
            .cache_file(&path)
            .build(&CancellationToken::new(), &mut ())
            .unwrap();
        assert!(path.exists());

        // A cached build never touches the corpus.
        let empty = MemoryModuleSource::new();
        let reused = GraphBuilder::new(&empty)
            .cache_file(&path)
            .use_cache(true)
            .build(&CancellationToken::new(), &mut ())
            .unwrap();
        assert_eq!(reused, built);

        DependencyCache::delete(&path).unwrap();
    }
}
