//! Parser module for BundleScope.
//!
//! Turns raw webpack module text into a tree-sitter syntax tree and the
//! indexes the analyses run on.
//!
//! # Components
//!
//! - **module_text** - module source plus the id from its header comment
//! - **position** - byte offset <-> line/column conversion
//! - **ast** - [`ModuleParser`] and the memoizing [`WebpackAst`]
//! - **scope** - declaration/use index for locally bound identifiers
//!
//! # Example
//!
//! ```
//! use bundlescope::parser::{ModuleText, RuntimeParam, WebpackAst};
//!
//! let module = ModuleText::new("// Webpack Module 12\n0,function(e,t,n){ n(3); }");
//! let ast = WebpackAst::parse(module).unwrap();
//!
//! assert_eq!(ast.id(), Some("12"));
//! assert!(ast.runtime_binding(RuntimeParam::Require).is_some());
//! ```

pub mod ast;
pub mod module_text;
pub mod nodes;
pub mod position;
pub mod scope;

// Re-export commonly used types for convenience
pub use ast::{ModuleParser, ParseError, ParseResult, RuntimeParam, WebpackAst};
pub use module_text::{is_module_id, parse_header_id, ModuleId, ModuleText};
pub use position::{LineColumn, PositionIndex, Range};
pub use scope::{Binding, BindingId, Reference, ScopeIndex};
