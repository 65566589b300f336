//! Parsed webpack modules.
//!
//! A [`WebpackAst`] owns one module's text and syntax tree, and lazily
//! derives its binding index and export map. Each is computed at most once
//! for the lifetime of the instance.

use std::cell::OnceCell;

use thiserror::Error;
use tracing::debug;
use tree_sitter::{Node, Parser, Tree};

use super::module_text::ModuleText;
use super::nodes::{named_children, unwrap_parens};
use super::position::{PositionIndex, Range};
use super::scope::{Binding, ScopeIndex};
use crate::analysis::exports::ExportAnalysis;

/// Errors raised while turning module text into a syntax tree.
#[derive(Error, Debug)]
pub enum ParseError {
    #[error("Tree-sitter language initialization failed")]
    LanguageInit,

    #[error("Failed to parse module {module}")]
    Syntax { module: String },
}

/// Result type for parser operations.
pub type ParseResult<T> = Result<T, ParseError>;

/// Descent budget when looking for the module wrapper function.
const MAX_WRAPPER_DEPTH: usize = 32;

/// The three positional parameters webpack injects into every module
/// wrapper: `function(module, exports, require)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RuntimeParam {
    /// Index 0: the module object, owner of `.exports`.
    Module,
    /// Index 1: the exports object.
    Exports,
    /// Index 2: the require function.
    Require,
}

impl RuntimeParam {
    /// Position of the parameter in the wrapper's parameter list.
    ///
    /// ```rust
    /// use bundlescope::parser::RuntimeParam;
    ///
    /// assert_eq!(RuntimeParam::Require.index(), 2);
    /// ```
    pub fn index(self) -> usize {
        match self {
            RuntimeParam::Module => 0,
            RuntimeParam::Exports => 1,
            RuntimeParam::Require => 2,
        }
    }
}

/// Reusable JavaScript parser for bundle modules.
///
/// Corpus scans keep one `ModuleParser` and feed it every module in turn.
pub struct ModuleParser {
    parser: Parser,
}

impl ModuleParser {
    /// Create a parser for JavaScript.
    ///
    /// # Errors
    ///
    /// Returns [`ParseError::LanguageInit`] if the grammar version does not
    /// match the tree-sitter runtime.
    pub fn new() -> ParseResult<Self> {
        let mut parser = Parser::new();
        parser
            .set_language(&tree_sitter_javascript::LANGUAGE.into())
            .map_err(|_| ParseError::LanguageInit)?;
        Ok(Self { parser })
    }

    /// Parse one module, taking ownership of its text.
    ///
    /// Syntax errors do not fail the parse: tree-sitter recovers and the
    /// tree keeps `ERROR` nodes around the broken parts. Only a parser that
    /// gives up entirely yields [`ParseError::Syntax`].
    pub fn parse(&mut self, module: ModuleText) -> ParseResult<WebpackAst> {
        let tree = self
            .parser
            .parse(module.source(), None)
            .ok_or_else(|| ParseError::Syntax {
                module: module.id().unwrap_or("<anonymous>").to_string(),
            })?;

        if tree.root_node().has_error() {
            debug!(
                module = module.id().unwrap_or("<anonymous>"),
                "module parsed with syntax errors"
            );
        }

        Ok(WebpackAst {
            module,
            tree,
            positions: OnceCell::new(),
            scopes: OnceCell::new(),
            exports: OnceCell::new(),
        })
    }
}

/// One parsed module plus its memoized derived indexes.
pub struct WebpackAst {
    module: ModuleText,
    tree: Tree,
    positions: OnceCell<PositionIndex>,
    scopes: OnceCell<ScopeIndex>,
    pub(crate) exports: OnceCell<ExportAnalysis>,
}

impl WebpackAst {
    /// Parse a module with a throwaway parser.
    pub fn parse(module: ModuleText) -> ParseResult<Self> {
        ModuleParser::new()?.parse(module)
    }

    pub fn id(&self) -> Option<&str> {
        self.module.id()
    }

    pub fn source(&self) -> &str {
        self.module.source()
    }

    pub fn root(&self) -> Node<'_> {
        self.tree.root_node()
    }

    pub fn positions(&self) -> &PositionIndex {
        self.positions
            .get_or_init(|| PositionIndex::new(self.module.source()))
    }

    pub fn scopes(&self) -> &ScopeIndex {
        self.scopes
            .get_or_init(|| ScopeIndex::build(&self.tree, self.module.source()))
    }

    /// Source text of a node.
    pub fn text(&self, node: &Node<'_>) -> &str {
        node.utf8_text(self.source().as_bytes()).unwrap_or("")
    }

    /// The innermost named node covering exactly `range`.
    pub fn node_at(&self, range: Range) -> Option<Node<'_>> {
        self.root()
            .named_descendant_for_byte_range(range.start, range.end)
            .filter(|node| Range::of(node) == range)
    }

    /// The module wrapper function.
    ///
    /// Descends from the root through wrappers such as `0,function(){}`,
    /// `(function(){})` or a chunk map entry `({123: function(){}})` until a
    /// function literal shows up.
    pub fn wrapper_function(&self) -> Option<Node<'_>> {
        let mut node = self.root();
        for _ in 0..MAX_WRAPPER_DEPTH {
            node = unwrap_parens(node);
            match node.kind() {
                "function_expression" | "function_declaration" | "arrow_function" => {
                    return Some(node)
                }
                "program" | "expression_statement" | "ERROR" | "object" => {
                    node = named_children(node)
                        .into_iter()
                        .find(|child| child.kind() != "hash_bang_line")?;
                }
                "sequence_expression" => node = named_children(node).into_iter().last()?,
                "assignment_expression" | "binary_expression" => {
                    node = node.child_by_field_name("right")?
                }
                "unary_expression" => node = node.child_by_field_name("argument")?,
                "pair" => node = node.child_by_field_name("value")?,
                _ => return None,
            }
        }
        None
    }

    /// Identifier node of a runtime parameter, if the wrapper declares it.
    ///
    /// Fails silently: a wrapper with more than three parameters, too few
    /// parameters, or a destructured parameter yields `None`.
    pub fn runtime_param(&self, param: RuntimeParam) -> Option<Node<'_>> {
        let function = self.wrapper_function()?;
        let params = match function.child_by_field_name("parameters") {
            Some(list) => named_children(list),
            None => function
                .child_by_field_name("parameter")
                .into_iter()
                .collect(),
        };

        let index = param.index();
        if params.len() <= index || params.len() > 3 {
            return None;
        }
        let node = params[index];
        (node.kind() == "identifier").then_some(node)
    }

    /// Binding of a runtime parameter.
    pub fn runtime_binding(&self, param: RuntimeParam) -> Option<&Binding> {
        let node = self.runtime_param(param)?;
        self.scopes().binding_of(&node)
    }
}

impl std::fmt::Debug for WebpackAst {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebpackAst")
            .field("id", &self.module.id())
            .field("len", &self.module.source().len())
            .finish()
    }
}
