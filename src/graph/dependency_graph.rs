//! Inverse module dependency graph.
//!
//! Edges are stored on the *target* module's record, listing the modules
//! that import it, since reference resolution only ever asks "who imports
//! this module".

use std::collections::{BTreeMap, BTreeSet, HashMap};

use petgraph::algo::tarjan_scc;
use petgraph::graph::{DiGraph, NodeIndex};
use serde::{Deserialize, Serialize};

use crate::parser::ModuleId;

/// Importers of one module.
///
/// # Example
///
/// ```rust
/// use bundlescope::graph::ModuleDependencyRecord;
///
/// let record = ModuleDependencyRecord::default();
/// assert!(record.is_empty());
/// assert_eq!(record.importer_count(), 0);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModuleDependencyRecord {
    /// Modules that require this one directly: `n(12)`
    pub sync_importers: BTreeSet<ModuleId>,
    /// Modules that load this one as a lazy chunk: `n.bind(n, 12)`
    pub lazy_importers: BTreeSet<ModuleId>,
}

impl ModuleDependencyRecord {
    pub const fn new() -> Self {
        Self {
            sync_importers: BTreeSet::new(),
            lazy_importers: BTreeSet::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.sync_importers.is_empty() && self.lazy_importers.is_empty()
    }

    pub fn importer_count(&self) -> usize {
        self.sync_importers.len() + self.lazy_importers.len()
    }
}

static EMPTY_RECORD: ModuleDependencyRecord = ModuleDependencyRecord::new();

/// Sparse map from module id to its importers.
///
/// Reading a record never fails: unknown ids read as an empty record.
///
/// # Example
///
/// ```rust
/// use bundlescope::graph::DependencyGraph;
///
/// let mut graph = DependencyGraph::new();
/// graph.add_sync_edge("2", "1"); // module 2 requires module 1
///
/// assert!(graph.record("1").sync_importers.contains("2"));
/// assert!(graph.record("5").is_empty());
/// assert_eq!(graph.edge_count(), 1);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DependencyGraph {
    records: BTreeMap<ModuleId, ModuleDependencyRecord>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record for `id`, or an empty record when nothing imports it.
    pub fn record(&self, id: &str) -> &ModuleDependencyRecord {
        self.records.get(id).unwrap_or(&EMPTY_RECORD)
    }

    /// Record for `id`, created on first access.
    pub fn record_mut(&mut self, id: &str) -> &mut ModuleDependencyRecord {
        self.records.entry(id.to_string()).or_default()
    }

    /// Note that `importer` requires `target` synchronously.
    pub fn add_sync_edge(&mut self, importer: &str, target: &str) -> bool {
        self.record_mut(target)
            .sync_importers
            .insert(importer.to_string())
    }

    /// Note that `importer` loads `target` as a lazy chunk.
    pub fn add_lazy_edge(&mut self, importer: &str, target: &str) -> bool {
        self.record_mut(target)
            .lazy_importers
            .insert(importer.to_string())
    }

    /// Synchronous importers of `id`, in id order.
    pub fn importers(&self, id: &str) -> impl Iterator<Item = &ModuleId> {
        self.record(id).sync_importers.iter()
    }

    /// Number of modules with a record.
    pub fn module_count(&self) -> usize {
        self.records.len()
    }

    /// Number of sync and lazy edges.
    pub fn edge_count(&self) -> usize {
        self.records
            .values()
            .map(ModuleDependencyRecord::importer_count)
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Every module that has a record, with its importers.
    ///
    /// Modules come in text order of their ids, so `"10"` sorts before
    /// `"9"`.
    pub fn iter(&self) -> impl Iterator<Item = (&ModuleId, &ModuleDependencyRecord)> {
        self.records.iter()
    }

    /// Groups of modules that require each other synchronously.
    ///
    /// A strongly connected component is a cycle if it has more than one
    /// module, or if it is a single module that requires itself.
    ///
    /// # Example
    ///
    /// ```rust
    /// use bundlescope::graph::DependencyGraph;
    ///
    /// let mut graph = DependencyGraph::new();
    /// graph.add_sync_edge("1", "2");
    /// graph.add_sync_edge("2", "3");
    /// graph.add_sync_edge("3", "1");
    /// graph.add_sync_edge("1", "4");
    ///
    /// let cycles = graph.import_cycles();
    /// assert_eq!(cycles.len(), 1);
    /// assert_eq!(cycles[0].modules, vec!["1", "2", "3"]);
    /// ```
    pub fn import_cycles(&self) -> Vec<ImportCycle> {
        let mut graph: DiGraph<&str, ()> = DiGraph::new();
        let mut indices: HashMap<&str, NodeIndex> = HashMap::new();

        for (target, record) in self.iter() {
            for importer in &record.sync_importers {
                let from = *indices
                    .entry(importer.as_str())
                    .or_insert_with(|| graph.add_node(importer.as_str()));
                let to = *indices
                    .entry(target.as_str())
                    .or_insert_with(|| graph.add_node(target.as_str()));
                graph.add_edge(from, to, ());
            }
        }

        let mut cycles: Vec<ImportCycle> = tarjan_scc(&graph)
            .into_iter()
            .filter(|scc| scc.len() > 1 || graph.contains_edge(scc[0], scc[0]))
            .map(|scc| {
                let mut modules: Vec<ModuleId> = scc
                    .iter()
                    .filter_map(|&idx| graph.node_weight(idx))
                    .map(|id| id.to_string())
                    .collect();
                modules.sort_by(|a, b| compare_ids(a, b));
                ImportCycle { modules }
            })
            .collect();
        cycles.sort_by(|a, b| compare_ids(&a.modules[0], &b.modules[0]));
        cycles
    }
}

/// Numeric order for module ids, falling back to text order.
pub(crate) fn compare_ids(a: &str, b: &str) -> std::cmp::Ordering {
    a.len().cmp(&b.len()).then_with(|| a.cmp(b))
}

/// Modules that require each other synchronously.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImportCycle {
    /// Member modules, in numeric order.
    pub modules: Vec<ModuleId>,
}

impl ImportCycle {
    /// Human-readable representation such as `"1 -> 2 -> 3 -> 1"`.
    pub fn cycle_path(&self) -> String {
        match self.modules.first() {
            Some(first) => format!("{} -> {}", self.modules.join(" -> "), first),
            None => String::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }
}
