//! Lexical binding resolution over a JavaScript syntax tree.
//!
//! tree-sitter only produces syntax, so this module supplies the
//! declaration/use index the export and import analyses run on. It models
//! exactly what bundled code needs: function and block scopes, `var`
//! hoisting, parameters and destructuring patterns. Identifiers that never
//! resolve are globals and are not indexed.

use std::collections::{HashMap, HashSet};

use tree_sitter::{Node, Tree};

use super::nodes::{is_function_like, named_children};
use super::position::Range;

pub type BindingId = usize;

/// One syntactic use of a binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reference {
    pub range: Range,
    /// Target of an assignment or update expression.
    pub is_write: bool,
}

/// A locally declared name with all of its declaration and use sites.
#[derive(Debug, Clone)]
pub struct Binding {
    pub name: String,
    pub declarations: Vec<Range>,
    pub references: Vec<Reference>,
}

impl Binding {
    pub fn reads(&self) -> impl Iterator<Item = &Reference> {
        self.references.iter().filter(|r| !r.is_write)
    }

    pub fn writes(&self) -> impl Iterator<Item = &Reference> {
        self.references.iter().filter(|r| r.is_write)
    }

    pub fn is_used(&self) -> bool {
        !self.references.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ScopeKind {
    Function,
    Block,
}

#[derive(Debug)]
struct Scope {
    parent: Option<usize>,
    kind: ScopeKind,
    names: HashMap<String, BindingId>,
}

/// Declaration/use index for every locally bound identifier in a module.
#[derive(Debug, Default)]
pub struct ScopeIndex {
    bindings: Vec<Binding>,
    /// Start byte of every declaring or referencing identifier.
    by_offset: HashMap<usize, BindingId>,
}

impl ScopeIndex {
    pub fn build(tree: &Tree, source: &str) -> Self {
        let mut builder = ScopeBuilder {
            source,
            scopes: vec![Scope {
                parent: None,
                kind: ScopeKind::Function,
                names: HashMap::new(),
            }],
            node_scopes: HashMap::new(),
            declared: HashSet::new(),
            index: ScopeIndex::default(),
        };

        let root = tree.root_node();
        builder.collect(root, 0);
        builder.resolve(root, 0);
        builder.index
    }

    pub fn bindings(&self) -> &[Binding] {
        &self.bindings
    }

    pub fn binding(&self, id: BindingId) -> &Binding {
        &self.bindings[id]
    }

    /// Binding an identifier node declares or refers to.
    pub fn binding_id_of(&self, node: &Node<'_>) -> Option<BindingId> {
        if !is_identifier(node.kind()) {
            return None;
        }
        self.by_offset.get(&node.start_byte()).copied()
    }

    pub fn binding_of(&self, node: &Node<'_>) -> Option<&Binding> {
        self.binding_id_of(node).map(|id| &self.bindings[id])
    }
}

fn is_identifier(kind: &str) -> bool {
    matches!(
        kind,
        "identifier" | "shorthand_property_identifier" | "shorthand_property_identifier_pattern"
    )
}

struct ScopeBuilder<'s> {
    source: &'s str,
    scopes: Vec<Scope>,
    node_scopes: HashMap<usize, usize>,
    declared: HashSet<usize>,
    index: ScopeIndex,
}

impl<'s> ScopeBuilder<'s> {
    /// First pass: create scopes and record declarations, so that hoisted
    /// names are visible before the second pass resolves uses.
    fn collect(&mut self, node: Node<'_>, current: usize) {
        let scope = self.enter(node, current);

        match node.kind() {
            "function_declaration" | "generator_function_declaration" | "class_declaration" => {
                if let Some(name) = node.child_by_field_name("name") {
                    self.declare(current, name);
                }
            }
            "function_expression" | "generator_function" | "class" => {
                if let Some(name) = node.child_by_field_name("name") {
                    self.declare(scope, name);
                }
            }
            "variable_declaration" => {
                let target = self.function_scope(scope);
                self.declare_declarators(node, target);
            }
            "lexical_declaration" => self.declare_declarators(node, scope),
            "catch_clause" => {
                if let Some(parameter) = node.child_by_field_name("parameter") {
                    self.declare_pattern(scope, parameter);
                }
            }
            "for_in_statement" => {
                let kind = node
                    .child_by_field_name("kind")
                    .and_then(|kind| kind.utf8_text(self.source.as_bytes()).ok());
                if let (Some(kind), Some(left)) = (kind, node.child_by_field_name("left")) {
                    let target = if kind == "var" {
                        self.function_scope(scope)
                    } else {
                        scope
                    };
                    self.declare_pattern(target, left);
                }
            }
            _ => {}
        }

        if is_function_like(node.kind()) {
            if let Some(parameters) = node.child_by_field_name("parameters") {
                for parameter in named_children(parameters) {
                    self.declare_pattern(scope, parameter);
                }
            }
            if let Some(parameter) = node.child_by_field_name("parameter") {
                self.declare_pattern(scope, parameter);
            }
        }

        for child in named_children(node) {
            self.collect(child, scope);
        }
    }

    /// Second pass: attach every non-declaring identifier to the nearest
    /// enclosing binding of that name.
    fn resolve(&mut self, node: Node<'_>, current: usize) {
        let scope = self.node_scopes.get(&node.id()).copied().unwrap_or(current);

        if matches!(node.kind(), "identifier" | "shorthand_property_identifier")
            && !self.declared.contains(&node.start_byte())
        {
            if let Some(id) = self.lookup(scope, node) {
                let range = Range::of(&node);
                self.index.bindings[id].references.push(Reference {
                    range,
                    is_write: is_write_target(node),
                });
                self.index.by_offset.insert(range.start, id);
            }
        }

        for child in named_children(node) {
            self.resolve(child, scope);
        }
    }

    fn enter(&mut self, node: Node<'_>, current: usize) -> usize {
        let kind = match node.kind() {
            kind if is_function_like(kind) => ScopeKind::Function,
            // A function body shares the function's scope.
            "statement_block"
                if node
                    .parent()
                    .is_some_and(|parent| is_function_like(parent.kind())) =>
            {
                return current
            }
            "statement_block" | "for_statement" | "for_in_statement" | "catch_clause"
            | "switch_body" | "class" | "class_static_block" => ScopeKind::Block,
            _ => return current,
        };

        let id = self.scopes.len();
        self.scopes.push(Scope {
            parent: Some(current),
            kind,
            names: HashMap::new(),
        });
        self.node_scopes.insert(node.id(), id);
        id
    }

    fn function_scope(&self, mut scope: usize) -> usize {
        while self.scopes[scope].kind != ScopeKind::Function {
            match self.scopes[scope].parent {
                Some(parent) => scope = parent,
                None => break,
            }
        }
        scope
    }

    fn lookup(&self, mut scope: usize, node: Node<'_>) -> Option<BindingId> {
        let name = node.utf8_text(self.source.as_bytes()).ok()?;
        loop {
            if let Some(&id) = self.scopes[scope].names.get(name) {
                return Some(id);
            }
            scope = self.scopes[scope].parent?;
        }
    }

    fn declare_declarators(&mut self, declaration: Node<'_>, scope: usize) {
        for declarator in named_children(declaration) {
            if declarator.kind() != "variable_declarator" {
                continue;
            }
            if let Some(name) = declarator.child_by_field_name("name") {
                self.declare_pattern(scope, name);
            }
        }
    }

    fn declare_pattern(&mut self, scope: usize, pattern: Node<'_>) {
        match pattern.kind() {
            "identifier" | "shorthand_property_identifier_pattern" => self.declare(scope, pattern),
            "object_pattern" | "array_pattern" | "rest_pattern" => {
                for child in named_children(pattern) {
                    self.declare_pattern(scope, child);
                }
            }
            "pair_pattern" => {
                if let Some(value) = pattern.child_by_field_name("value") {
                    self.declare_pattern(scope, value);
                }
            }
            "assignment_pattern" | "object_assignment_pattern" => {
                if let Some(left) = pattern.child_by_field_name("left") {
                    self.declare_pattern(scope, left);
                }
            }
            _ => {}
        }
    }

    fn declare(&mut self, scope: usize, name_node: Node<'_>) {
        if !is_identifier(name_node.kind()) {
            return;
        }
        let Ok(name) = name_node.utf8_text(self.source.as_bytes()) else {
            return;
        };

        let range = Range::of(&name_node);
        let id = match self.scopes[scope].names.get(name) {
            Some(&id) => id,
            None => {
                let id = self.index.bindings.len();
                self.index.bindings.push(Binding {
                    name: name.to_string(),
                    declarations: Vec::new(),
                    references: Vec::new(),
                });
                self.scopes[scope].names.insert(name.to_string(), id);
                id
            }
        };

        self.declared.insert(range.start);
        self.index.bindings[id].declarations.push(range);
        self.index.by_offset.insert(range.start, id);
    }
}

fn is_write_target(node: Node<'_>) -> bool {
    let Some(parent) = node.parent() else {
        return false;
    };
    match parent.kind() {
        "assignment_expression" | "augmented_assignment_expression" => {
            parent.child_by_field_name("left") == Some(node)
        }
        "update_expression" => true,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tree_sitter::Parser;

    fn index(source: &str) -> ScopeIndex {
        let mut parser = Parser::new();
        parser
            .set_language(&tree_sitter_javascript::LANGUAGE.into())
            .unwrap();
        let tree = parser.parse(source, None).unwrap();
        ScopeIndex::build(&tree, source)
    }

    fn named<'a>(index: &'a ScopeIndex, name: &str) -> Vec<&'a Binding> {
        index.bindings().iter().filter(|b| b.name == name).collect()
    }

    #[test]
    fn test_parameters_and_uses() {
        let index = index("0,function(e,t,n){ n.d(t, {}); n(12); }");
        let require = named(&index, "n");
        assert_eq!(require.len(), 1);
        assert_eq!(require[0].declarations.len(), 1);
        assert_eq!(require[0].references.len(), 2);
        assert_eq!(named(&index, "t")[0].references.len(), 1);
        assert!(!named(&index, "e")[0].is_used());
    }

    #[test]
    fn test_var_hoisting() {
        let index = index("function f(){ g(x); var x = 1; }");
        let x = named(&index, "x");
        assert_eq!(x.len(), 1);
        assert_eq!(x[0].references.len(), 1);
    }

    #[test]
    fn test_block_scoped_shadowing() {
        let source = "var a = 1; { let a = 2; a; } a;";
        let index = index(source);
        let bindings = named(&index, "a");
        assert_eq!(bindings.len(), 2);
        assert!(bindings.iter().all(|b| b.references.len() == 1));
    }

    #[test]
    fn test_write_references() {
        let index = index("var a; a = 1; a += 2; a++; use(a);");
        let a = named(&index, "a")[0];
        assert_eq!(a.writes().count(), 3);
        assert_eq!(a.reads().count(), 1);
    }

    #[test]
    fn test_destructuring_declarations() {
        let index = index("const { a, b: c, ...d } = obj; const [e = 1] = arr; a; c; d; e;");
        for name in ["a", "c", "d", "e"] {
            let bindings = named(&index, name);
            assert_eq!(bindings.len(), 1, "{name}");
            assert_eq!(bindings[0].references.len(), 1, "{name}");
        }
        assert!(named(&index, "b").is_empty());
    }

    #[test]
    fn test_globals_are_not_indexed() {
        let index = index("console.log(window);");
        assert!(index.bindings().is_empty());
    }

    #[test]
    fn test_function_declaration_visible_to_siblings() {
        let index = index("function outer(){ inner(); function inner(){} }");
        let inner = named(&index, "inner");
        assert_eq!(inner.len(), 1);
        assert_eq!(inner[0].references.len(), 1);
    }

    #[test]
    fn test_shorthand_property_is_a_use() {
        let index = index("var x = 1; var o = { x };");
        assert_eq!(named(&index, "x")[0].references.len(), 1);
    }
}
