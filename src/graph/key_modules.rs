//! Registry of structurally recognized singleton exports.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::{DependencyGraph, GraphError, GraphResult};
use crate::analysis::{find_re_export, ExportKey};
use crate::cache::{CacheError, ModuleSource};
use crate::graph::CancellationToken;
use crate::parser::{ModuleId, ModuleParser, WebpackAst};

/// Methods an event dispatcher class declares.
pub const DISPATCHER_METHODS: [&str; 3] = ["dispatch", "subscribe", "unsubscribe"];

/// One export of one module.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportRef {
    pub module_id: ModuleId,
    pub export_key: ExportKey,
}

impl ExportRef {
    pub fn new(module_id: impl Into<ModuleId>, export_key: ExportKey) -> Self {
        Self {
            module_id: module_id.into(),
            export_key,
        }
    }
}

/// Singleton exports found during a corpus scan.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyModuleRegistry {
    /// Exports of event dispatcher classes or instances.
    pub dispatchers: Vec<ExportRef>,
    /// Exports matching the Store pattern.
    pub stores: Vec<ExportRef>,
}

impl KeyModuleRegistry {
    pub fn len(&self) -> usize {
        self.dispatchers.len() + self.stores.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dispatchers.is_empty() && self.stores.is_empty()
    }

    /// Record the dispatcher and Store exports of one module.
    pub fn register(&mut self, module_id: &str, ast: &WebpackAst) {
        for (key, class) in ast.exported_classes() {
            let export = ExportRef::new(module_id, key.clone());
            if class.is_store() {
                debug!(module = module_id, export = %key, "found store");
                self.stores.push(export);
            } else if class.shape.implements(&DISPATCHER_METHODS) {
                debug!(module = module_id, export = %key, "found dispatcher");
                self.dispatchers.push(export);
            }
        }
    }

    /// Register every export that re-exports a registered one, transitively.
    pub fn close_over_re_exports(
        &mut self,
        graph: &DependencyGraph,
        source: &dyn ModuleSource,
        cancel: &CancellationToken,
    ) -> GraphResult<()> {
        let mut lookup = ReExportLookup::new(source)?;
        close_list(&mut self.dispatchers, graph, &mut lookup, cancel)?;
        close_list(&mut self.stores, graph, &mut lookup, cancel)?;
        Ok(())
    }
}

fn close_list(
    list: &mut Vec<ExportRef>,
    graph: &DependencyGraph,
    lookup: &mut ReExportLookup<'_>,
    cancel: &CancellationToken,
) -> GraphResult<()> {
    let mut visited: HashSet<ExportRef> = list.iter().cloned().collect();
    let mut pending = list.clone();

    while let Some(export) = pending.pop() {
        if cancel.is_cancelled() {
            return Err(GraphError::Cancelled {
                scanned: visited.len(),
                total: visited.len() + pending.len(),
            });
        }

        for importer in graph.importers(&export.module_id) {
            let Some(key) = lookup.re_export(importer, &export)? else {
                continue;
            };

            let alias = ExportRef::new(importer.as_str(), key);
            if visited.insert(alias.clone()) {
                debug!(
                    module = %alias.module_id,
                    export = %alias.export_key,
                    of = %export.module_id,
                    "registered re-export"
                );
                list.push(alias.clone());
                pending.push(alias);
            }
        }
    }
    Ok(())
}

/// Memoized re-export answers per importer and export.
///
/// Importers are parsed on demand and dropped once queried, so only the
/// answers outlive a lookup.
struct ReExportLookup<'s> {
    source: &'s dyn ModuleSource,
    parser: ModuleParser,
    answers: HashMap<(ModuleId, ExportRef), Option<ExportKey>>,
}

impl<'s> ReExportLookup<'s> {
    fn new(source: &'s dyn ModuleSource) -> GraphResult<Self> {
        Ok(Self {
            source,
            parser: ModuleParser::new()?,
            answers: HashMap::new(),
        })
    }

    /// The key under which `importer` re-exports `export`, if it does.
    fn re_export(
        &mut self,
        importer: &str,
        export: &ExportRef,
    ) -> GraphResult<Option<ExportKey>> {
        let slot = (importer.to_string(), export.clone());
        if let Some(answer) = self.answers.get(&slot) {
            return Ok(answer.clone());
        }
        let answer = self.query(importer, export)?;
        self.answers.insert(slot, answer.clone());
        Ok(answer)
    }

    fn query(&mut self, importer: &str, export: &ExportRef) -> GraphResult<Option<ExportKey>> {
        let module = match self.source.load(importer) {
            Ok(module) => module,
            Err(CacheError::NotCached(_)) => {
                debug!(module = importer, "importer not cached");
                return Ok(None);
            }
            Err(err) => return Err(err.into()),
        };
        let ast = match self.parser.parse(module) {
            Ok(ast) => ast,
            Err(err) => {
                warn!(module = importer, error = %err, "skipping unparsable importer");
                return Ok(None);
            }
        };

        match find_re_export(&ast, &export.module_id, &export.export_key) {
            Ok(key) => Ok(key),
            Err(err) => {
                warn!(module = importer, error = %err, "skipping re-export");
                Ok(None)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{CacheResult, MemoryModuleSource};
    use crate::parser::ModuleText;
    use std::cell::Cell;

    /// Counts module loads of an in-memory corpus.
    struct CountingSource {
        inner: MemoryModuleSource,
        loads: Cell<usize>,
    }

    impl ModuleSource for CountingSource {
        fn module_ids(&self) -> CacheResult<Vec<ModuleId>> {
            self.inner.module_ids()
        }

        fn load(&self, id: &str) -> CacheResult<ModuleText> {
            self.loads.set(self.loads.get() + 1);
            self.inner.load(id)
        }
    }

    fn parse(source: &str) -> WebpackAst {
        WebpackAst::parse(ModuleText::new(source)).unwrap()
    }

    #[test]
    fn test_register_store_and_dispatcher() {
        let mut registry = KeyModuleRegistry::default();
        registry.register(
            "1",
            &parse(concat!(
                "0,function(e,t,n){ n.d(t,{Z:()=>s});",
                " class o extends B { initialize(){} } var s = new o({}); }"
            )),
        );
        registry.register(
            "2",
            &parse(concat!(
                "0,function(e,t,n){ n.d(t,{D:()=>d});",
                " class C { dispatch(){} subscribe(){} unsubscribe(){} } var d = new C(); }"
            )),
        );

        assert_eq!(registry.stores, vec![ExportRef::new("1", ExportKey::named("Z"))]);
        assert_eq!(registry.dispatchers, vec![ExportRef::new("2", ExportKey::named("D"))]);
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_plain_exports_are_not_registered() {
        let mut registry = KeyModuleRegistry::default();
        registry.register("1", &parse("0,function(e,t,n){ n.d(t,{A:()=>x}); const x = 5; }"));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_closure_follows_re_export_chain() {
        let source: MemoryModuleSource = [
            ("2", "0,function(e,t,n){ n.d(t,{Y:()=>r.Z}); var r = n(1); }"),
            ("3", "0,function(e,t,n){ n.d(t,{X:()=>r.Y}); var r = n(2); }"),
            ("4", "0,function(e,t,n){ var r = n(1); r.Z.initialize(); }"),
        ]
        .into_iter()
        .collect();

        let mut graph = DependencyGraph::new();
        graph.add_sync_edge("2", "1");
        graph.add_sync_edge("3", "2");
        graph.add_sync_edge("4", "1");

        let mut registry = KeyModuleRegistry::default();
        registry.stores.push(ExportRef::new("1", ExportKey::named("Z")));
        registry
            .close_over_re_exports(&graph, &source, &CancellationToken::new())
            .unwrap();

        assert_eq!(
            registry.stores,
            vec![
                ExportRef::new("1", ExportKey::named("Z")),
                ExportRef::new("2", ExportKey::named("Y")),
                ExportRef::new("3", ExportKey::named("X")),
            ]
        );
    }

    #[test]
    fn test_re_export_answers_are_memoized() {
        let source = CountingSource {
            inner: [("2", "0,function(e,t,n){ n.d(t,{Y:()=>r.Z}); var r = n(1); }")]
                .into_iter()
                .collect(),
            loads: Cell::new(0),
        };
        let mut lookup = ReExportLookup::new(&source).unwrap();
        let store = ExportRef::new("1", ExportKey::named("Z"));

        assert_eq!(lookup.re_export("2", &store).unwrap(), Some(ExportKey::named("Y")));
        assert_eq!(lookup.re_export("2", &store).unwrap(), Some(ExportKey::named("Y")));
        assert_eq!(source.loads.get(), 1);

        let other = ExportRef::new("1", ExportKey::named("Q"));
        assert_eq!(lookup.re_export("2", &other).unwrap(), None);
        assert_eq!(lookup.re_export("9", &store).unwrap(), None);
        assert_eq!(source.loads.get(), 3);
    }

    #[test]
    fn test_closure_is_cancellable() {
        let source = MemoryModuleSource::new();
        let mut registry = KeyModuleRegistry::default();
        registry.stores.push(ExportRef::new("1", ExportKey::Default));

        let cancel = CancellationToken::new();
        cancel.cancel();
        let result = registry.close_over_re_exports(&DependencyGraph::new(), &source, &cancel);
        assert!(matches!(result, Err(GraphError::Cancelled { .. })));
    }
}
