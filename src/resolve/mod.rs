//! Corpus-wide reference resolution.
//!
//! Given a position inside one of a module's exports, walks the inverse
//! dependency graph to every module that uses that export, following
//! re-export chains from module to module.
//!
//! # Example
//!
//! ```
//! use bundlescope::cache::MemoryModuleSource;
//! use bundlescope::graph::{CancellationToken, GraphBuilder};
//! use bundlescope::parser::{ModuleText, WebpackAst};
//! use bundlescope::resolve::WebpackContext;
//!
//! let source: MemoryModuleSource = [
//!     ("1", "0,function(e,t,n){ n.d(t,{Z:()=>y}); const y = 1; }"),
//!     ("2", "0,function(e,t,n){ var m = n(1); console.log(m.Z); }"),
//! ]
//! .into_iter()
//! .collect();
//! let cache = GraphBuilder::new(&source)
//!     .build(&CancellationToken::new(), &mut ())
//!     .unwrap();
//! let context = WebpackContext::new(source, cache);
//!
//! let module = ModuleText::with_id("1", "0,function(e,t,n){ n.d(t,{Z:()=>y}); const y = 1; }");
//! let ast = WebpackAst::parse(module).unwrap();
//! let offset = ast.source().find('Z').unwrap();
//!
//! let references = context.resolve_references(&ast, offset).unwrap();
//! assert_eq!(references.len(), 1);
//! assert_eq!(references[0].module_id, "2");
//! ```

use std::collections::HashSet;

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, warn};

use crate::analysis::{find_re_export, AnalysisError, ExportKey};
use crate::cache::{CacheError, DependencyCache, ModuleSource};
use crate::graph::{DependencyGraph, KeyModuleRegistry};
use crate::parser::{LineColumn, ModuleId, ModuleParser, ModuleText, ParseError, Range, WebpackAst};

/// Errors raised while resolving references.
#[derive(Error, Debug)]
pub enum ResolveError {
    #[error("Module has no id and cannot be a resolution target")]
    MissingModuleId,

    #[error(transparent)]
    Analysis(#[from] AnalysisError),

    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error(transparent)]
    Parse(#[from] ParseError),
}

/// Result type for resolution.
pub type ResolveResult<T> = Result<T, ResolveError>;

/// One use of an export, somewhere in the corpus.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReferenceLocation {
    pub module_id: ModuleId,
    pub range: Range,
}

/// Pending check: does `importer` use export `key` of `target`?
#[derive(Debug, Clone)]
struct WorkItem {
    importer: ModuleId,
    target: ModuleId,
    key: ExportKey,
}

/// A module corpus together with its scanned dependency graph.
pub struct WebpackContext<S: ModuleSource> {
    source: S,
    graph: DependencyGraph,
    key_modules: KeyModuleRegistry,
}

impl<S: ModuleSource> WebpackContext<S> {
    pub fn new(source: S, cache: DependencyCache) -> Self {
        Self {
            source,
            graph: cache.dependency_records,
            key_modules: cache.key_modules,
        }
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn graph(&self) -> &DependencyGraph {
        &self.graph
    }

    pub fn key_modules(&self) -> &KeyModuleRegistry {
        &self.key_modules
    }

    /// References to the export(s) whose definition covers `offset`.
    pub fn resolve_references(
        &self,
        ast: &WebpackAst,
        offset: usize,
    ) -> ResolveResult<Vec<ReferenceLocation>> {
        let module_id = ast.id().ok_or(ResolveError::MissingModuleId)?;
        let keys = ast.export_map().keys_at(offset);
        if keys.is_empty() {
            debug!(module = module_id, offset, "no export defined at offset");
        }

        let mut seen = HashSet::new();
        let mut references = Vec::new();
        for key in keys {
            for location in self.references_to(module_id, key)? {
                if seen.insert(location.clone()) {
                    references.push(location);
                }
            }
        }
        Ok(references)
    }

    /// Parse `module` and resolve references at a line/column position.
    pub fn resolve_at(
        &self,
        module: ModuleText,
        position: LineColumn,
    ) -> ResolveResult<Vec<ReferenceLocation>> {
        let ast = WebpackAst::parse(module)?;
        let offset = ast.positions().offset(position);
        self.resolve_references(&ast, offset)
    }

    /// Every use of export `key` of `module_id`, through re-export chains.
    pub fn references_to(
        &self,
        module_id: &str,
        key: &ExportKey,
    ) -> ResolveResult<Vec<ReferenceLocation>> {
        let mut parser = ModuleParser::new()?;
        let mut stack: Vec<WorkItem> = Vec::new();
        self.push_importers(&mut stack, module_id, key);

        let mut visited: HashSet<(ModuleId, ModuleId, ExportKey)> = HashSet::new();
        let mut seen: HashSet<ReferenceLocation> = HashSet::new();
        let mut references = Vec::new();

        while let Some(item) = stack.pop() {
            let visit = (item.target.clone(), item.importer.clone(), item.key.clone());
            if !visited.insert(visit) {
                continue;
            }

            let module = match self.source.load(&item.importer) {
                Ok(module) => module,
                Err(CacheError::NotCached(_)) => {
                    debug!(module = %item.importer, "importer not cached, skipping");
                    continue;
                }
                Err(err) => return Err(err.into()),
            };
            let ast = match parser.parse(module) {
                Ok(ast) => ast,
                Err(err) => {
                    warn!(module = %item.importer, error = %err, "skipping unparsable importer");
                    continue;
                }
            };

            let usages = match ast.import_usages(&item.target, &item.key) {
                Ok(usages) => usages,
                Err(AnalysisError::RequireUnused { .. }) => {
                    debug!(module = %item.importer, "importer never calls require");
                    continue;
                }
                Err(err) => return Err(err.into()),
            };
            for range in usages {
                let location = ReferenceLocation {
                    module_id: item.importer.clone(),
                    range,
                };
                if seen.insert(location.clone()) {
                    references.push(location);
                }
            }

            if let Some(re_exported) = find_re_export(&ast, &item.target, &item.key)? {
                debug!(
                    module = %item.importer,
                    export = %re_exported,
                    of = %item.target,
                    "following re-export"
                );
                self.push_importers(&mut stack, &item.importer, &re_exported);
            }
        }

        Ok(references)
    }

    fn push_importers(&self, stack: &mut Vec<WorkItem>, target: &str, key: &ExportKey) {
        for importer in self.graph.importers(target) {
            stack.push(WorkItem {
                importer: importer.clone(),
                target: target.to_string(),
                key: key.clone(),
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryModuleSource;
    use crate::graph::{CancellationToken, GraphBuilder};

    fn context(modules: &[(&str, &str)]) -> WebpackContext<MemoryModuleSource> {
        let source: MemoryModuleSource = modules.iter().copied().collect();
        let cache = GraphBuilder::new(&source)
            .build(&CancellationToken::new(), &mut ())
            .unwrap();
        WebpackContext::new(source, cache)
    }

    fn resolve(
        context: &WebpackContext<MemoryModuleSource>,
        id: &str,
        export: &str,
    ) -> Vec<ReferenceLocation> {
        let module = context.source().load(id).unwrap();
        let ast = WebpackAst::parse(module).unwrap();
        let offset = ast
            .export_map()
            .get(&ExportKey::named(export))
            .and_then(|entry| entry.definition())
            .unwrap()
            .start;
        context.resolve_references(&ast, offset).unwrap()
    }

    fn text_of(
        context: &WebpackContext<MemoryModuleSource>,
        location: &ReferenceLocation,
    ) -> String {
        let module = context.source().load(&location.module_id).unwrap();
        location.range.text(module.source()).unwrap().to_string()
    }

    #[test]
    fn test_scenario() {
        let context = context(&[
            ("1", "function(e,t,n){ n.d(t,{Z:()=>y}); const y=1; }"),
            ("2", "function(e,t,n){ var m=n(1); console.log(m.Z); }"),
        ]);

        let references = resolve(&context, "1", "Z");
        assert_eq!(references.len(), 1);
        assert_eq!(references[0].module_id, "2");
        assert_eq!(text_of(&context, &references[0]), "Z");
    }

    #[test]
    fn test_re_export_cycle_terminates() {
        let context = context(&[
            ("1", "0,function(e,t,n){ n.d(t,{x:()=>r.z}); var r = n(3); }"),
            ("2", "0,function(e,t,n){ n.d(t,{y:()=>r.x}); var r = n(1); }"),
            ("3", "0,function(e,t,n){ n.d(t,{z:()=>r.y}); var r = n(2); }"),
        ]);

        for (id, export) in [("1", "x"), ("2", "y"), ("3", "z")] {
            let references = resolve(&context, id, export);
            let mut modules: Vec<_> = references.iter().map(|r| r.module_id.as_str()).collect();
            modules.sort();
            assert_eq!(modules, vec!["1", "2", "3"], "starting at {id}");
        }
    }

    #[test]
    fn test_re_export_chain() {
        let context = context(&[
            ("1", "0,function(e,t,n){ n.d(t,{A:()=>f}); function f(){} }"),
            ("2", "0,function(e,t,n){ n.d(t,{B:()=>r.A}); var r = n(1); }"),
            ("3", "0,function(e,t,n){ var r = n(2); r.B(); }"),
        ]);

        let references = resolve(&context, "1", "A");
        let found: Vec<_> = references
            .iter()
            .map(|r| (r.module_id.as_str(), text_of(&context, r)))
            .collect();
        assert_eq!(found, vec![("2", "A".to_string()), ("3", "B".to_string())]);
    }

    #[test]
    fn test_same_importer_under_two_keys() {
        let context = context(&[
            ("1", "0,function(e,t,n){ n.d(t,{x:()=>v}); var v = 1; }"),
            ("5", "0,function(e,t,n){ n.d(t,{c:()=>r.x}); var r = n(1); }"),
            ("2", "0,function(e,t,n){ n.d(t,{a:()=>r.x,b:()=>s.c}); var r = n(1), s = n(5); }"),
            ("3", "0,function(e,t,n){ var r = n(2); r.a; r.b; }"),
        ]);

        let references = resolve(&context, "1", "x");
        let in_three: Vec<_> = references
            .iter()
            .filter(|r| r.module_id == "3")
            .map(|r| text_of(&context, r))
            .collect();
        assert_eq!(in_three.len(), 2);
        assert!(in_three.contains(&"a".to_string()));
        assert!(in_three.contains(&"b".to_string()));
    }

    #[test]
    fn test_missing_importer_is_skipped() {
        let source: MemoryModuleSource =
            [("1", "0,function(e,t,n){ t.k = 1; }")].into_iter().collect();
        let mut graph = DependencyGraph::new();
        graph.add_sync_edge("9", "1");
        let context = WebpackContext::new(
            source,
            DependencyCache::new(graph, KeyModuleRegistry::default()),
        );

        assert!(context.references_to("1", &ExportKey::named("k")).unwrap().is_empty());
    }

    #[test]
    fn test_missing_module_id() {
        let context = context(&[]);
        let ast = WebpackAst::parse(ModuleText::new("0,function(e,t,n){ t.k = 1; }")).unwrap();
        assert!(matches!(
            context.resolve_references(&ast, 21),
            Err(ResolveError::MissingModuleId)
        ));
    }

    #[test]
    fn test_ambiguous_re_export_is_an_error() {
        let context = context(&[
            ("1", "0,function(e,t,n){ t.k = 1; }"),
            ("2", "0,function(e,t,n){ n.d(t,{a:()=>r.k,b:()=>r.k}); var r = n(1); }"),
        ]);
        assert!(matches!(
            context.references_to("1", &ExportKey::named("k")),
            Err(ResolveError::Analysis(AnalysisError::AmbiguousReExport { .. }))
        ));
    }

    #[test]
    fn test_resolve_at_position() {
        let context = context(&[
            ("1", "0,function(e,t,n){\n  t.k = 1;\n}"),
            ("2", "0,function(e,t,n){ n(1).k; }"),
        ]);
        let module = context.source().load("1").unwrap();
        let references = context
            .resolve_at(module, LineColumn { line: 1, column: 4 })
            .unwrap();
        assert_eq!(references.len(), 1);
        assert_eq!(references[0].module_id, "2");
    }

    #[test]
    fn test_offset_outside_exports() {
        let context = context(&[("1", "0,function(e,t,n){ t.k = 1; }")]);
        let module = context.source().load("1").unwrap();
        let ast = WebpackAst::parse(module).unwrap();
        assert!(context.resolve_references(&ast, 0).unwrap().is_empty());
    }
}
