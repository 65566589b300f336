//! Graph module for module dependency relationships.
//!
//! This module scans a module corpus into an inverse dependency graph
//! ([`DependencyGraph`]) plus a [`KeyModuleRegistry`] of recognized
//! singleton exports.
//!
//! # Example
//!
//! ```rust
//! use bundlescope::graph::build_dependency_graph;
//! use bundlescope::parser::ModuleText;
//!
//! let cache = build_dependency_graph([
//!     ModuleText::with_id("1", "0,function(e,t,n){ t.a = 1; }"),
//!     ModuleText::with_id("2", "0,function(e,t,n){ n(1).a; }"),
//! ])
//! .unwrap();
//!
//! assert!(cache.dependency_records.record("1").sync_importers.contains("2"));
//! assert_eq!(cache.dependency_records.edge_count(), 1);
//! ```

mod builder;
mod dependency_graph;
mod key_modules;

use thiserror::Error;

use crate::cache::CacheError;
use crate::parser::ParseError;

pub use builder::{
    build_dependency_graph, CancellationToken, GraphBuilder, LogProgress, ScanProgress,
    CHECKPOINT_INTERVAL,
};
pub(crate) use dependency_graph::compare_ids;
pub use dependency_graph::{DependencyGraph, ImportCycle, ModuleDependencyRecord};
pub use key_modules::{ExportRef, KeyModuleRegistry, DISPATCHER_METHODS};

/// Errors raised while building the dependency graph.
#[derive(Error, Debug)]
pub enum GraphError {
    #[error("Scan cancelled after {scanned} of {total} modules")]
    Cancelled { scanned: usize, total: usize },

    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error(transparent)]
    Parse(#[from] ParseError),
}

/// Result type for graph operations.
pub type GraphResult<T> = Result<T, GraphError>;
