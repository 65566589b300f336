//! Export and import analysis for webpack modules.
//!
//! Webpack rewrites ES module syntax into calls on the module wrapper's
//! runtime parameters, so neither exports nor imports can be read off the
//! syntax tree directly. This module recovers both.
//!
//! # Features
//!
//! - Synthesize an export map from the three webpack export shapes
//! - Recognize Store classes behind exported instances
//! - Locate where another module's export is used
//! - List required modules, split into sync and lazy edges
//! - Detect exports that forward another module's export
//!
//! # Example
//!
//! ```
//! use bundlescope::analysis::ExportKey;
//! use bundlescope::parser::{ModuleText, WebpackAst};
//!
//! let ast = WebpackAst::parse(ModuleText::new(
//!     "0,function(e,t,n){ n.d(t,{Z:()=>r.A}); var r = n(4); }",
//! ))
//! .unwrap();
//!
//! assert!(ast.export_map().contains_key(&ExportKey::named("Z")));
//! assert_eq!(ast.import_usages("4", &ExportKey::named("A")).unwrap().len(), 1);
//! ```

pub mod exports;
pub mod imports;
pub mod store;

use thiserror::Error;

use crate::parser::ParseError;

// Re-export main types for convenience
pub use exports::{
    synthesize_exports, ExportAnalysis, ExportEntry, ExportKey, ExportMap, ExportedClass,
    MAX_ALIAS_HOPS,
};
pub use imports::{find_re_export, locate_import_usages, required_modules, RequiredModules};
pub use store::{ClassMember, ClassShape};

/// Errors raised by module analysis.
#[derive(Error, Debug)]
pub enum AnalysisError {
    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error("Module {module} never uses its require parameter")]
    RequireUnused { module: String },

    #[error(
        "Module {module} re-exports {key} of module {target} as {} different exports",
        .candidates.len()
    )]
    AmbiguousReExport {
        module: String,
        target: String,
        key: ExportKey,
        candidates: Vec<ExportKey>,
    },
}

/// Result type for analysis operations.
pub type AnalysisResult<T> = Result<T, AnalysisError>;
