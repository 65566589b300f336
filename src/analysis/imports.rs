//! Import usage location.
//!
//! A module imports another through its require parameter:
//!
//! ```text
//! var r = n(12);        // bound import, r.foo reads export "foo"
//! var o = n.n(r); o();  // interop wrapper, o() reads the default export
//! n(12).foo;            // unbound import
//! n.bind(n, 12);        // lazy chunk import
//! ```

use std::collections::BTreeSet;

use tree_sitter::Node;

use super::exports::{ExportEntry, ExportKey};
use super::{AnalysisError, AnalysisResult};
use crate::parser::nodes::{
    accessed_property, call_arguments, call_of, declarator_name_of, member_access_of,
    parent_skipping_parens, unquote, unwrap_parens,
};
use crate::parser::{BindingId, ModuleId, Range, RuntimeParam, WebpackAst};

/// Modules one module requires, split by how they are loaded.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequiredModules {
    /// `n(12)`
    pub sync: BTreeSet<ModuleId>,
    /// `n.bind(n, 12)`
    pub lazy: BTreeSet<ModuleId>,
}

impl RequiredModules {
    pub fn is_empty(&self) -> bool {
        self.sync.is_empty() && self.lazy.is_empty()
    }
}

impl WebpackAst {
    /// Ranges in this module where export `key` of `module_id` is used.
    pub fn import_usages(&self, module_id: &str, key: &ExportKey) -> AnalysisResult<Vec<Range>> {
        locate_import_usages(self, module_id, key)
    }
}

/// Find every use of export `key` of module `module_id` inside `ast`.
///
/// Fails with [`AnalysisError::RequireUnused`] when the module has no
/// require parameter or never calls it.
pub fn locate_import_usages(
    ast: &WebpackAst,
    module_id: &str,
    key: &ExportKey,
) -> AnalysisResult<Vec<Range>> {
    let source = ast.source();
    let scopes = ast.scopes();
    let require_id = ast
        .runtime_param(RuntimeParam::Require)
        .and_then(|param| scopes.binding_id_of(&param))
        .filter(|id| scopes.binding(*id).is_used())
        .ok_or_else(|| AnalysisError::RequireUnused {
            module: ast.id().unwrap_or("<anonymous>").to_string(),
        })?;

    let mut usages = Vec::new();
    for call in require_calls(ast, require_id, module_id) {
        let Some(name) = declarator_name_of(call) else {
            // Unbound import: n(12).foo
            if let Some(wanted) = key.as_name() {
                if let Some((_, property, name)) = member_access_of(call, source) {
                    if name == wanted {
                        usages.push(Range::of(&property));
                    }
                }
            }
            continue;
        };
        let Some(binding) = scopes.binding_of(&name) else {
            continue;
        };

        for reference in binding.reads() {
            let Some(node) = ast.node_at(reference.range) else {
                continue;
            };
            match key {
                ExportKey::Named(wanted) => {
                    if let Some((_, property, name)) = member_access_of(node, source) {
                        if name == wanted {
                            usages.push(Range::of(&property));
                        }
                    }
                }
                ExportKey::Default => {
                    usages.extend(interop_invocations(ast, require_id, node));
                }
            }
        }
    }

    Ok(usages)
}

/// Modules required by `ast`, synchronously and lazily.
pub fn required_modules(ast: &WebpackAst) -> RequiredModules {
    let mut required = RequiredModules::default();
    let Some(require) = ast.runtime_binding(RuntimeParam::Require) else {
        return required;
    };
    let source = ast.source();

    for reference in require.reads() {
        let Some(node) = ast.node_at(reference.range) else {
            continue;
        };

        if let Some(call) = call_of(node) {
            if let [argument] = call_arguments(call)[..] {
                if let Some(id) = numeric_id(argument, source) {
                    required.sync.insert(id.to_string());
                }
            }
            continue;
        }

        let Some((access, _, "bind")) = member_access_of(node, source) else {
            continue;
        };
        let Some(call) = call_of(access) else {
            continue;
        };
        if let Some(id) = call_arguments(call)
            .get(1)
            .and_then(|argument| numeric_id(*argument, source))
        {
            required.lazy.insert(id.to_string());
        }
    }

    required
}

/// The export of `ast` that forwards export `key` of module `module_id`.
///
/// Returns `None` when nothing forwards it, or when `ast` never uses its
/// require parameter.
pub fn find_re_export(
    ast: &WebpackAst,
    module_id: &str,
    key: &ExportKey,
) -> AnalysisResult<Option<ExportKey>> {
    let usages = match locate_import_usages(ast, module_id, key) {
        Ok(usages) => usages,
        Err(AnalysisError::RequireUnused { .. }) => return Ok(None),
        Err(err) => return Err(err),
    };
    if usages.is_empty() {
        return Ok(None);
    }

    let mut candidates: Vec<ExportKey> = ast
        .export_map()
        .iter()
        .filter(|(_, entry)| forwards(ast, entry, &usages))
        .map(|(export, _)| export.clone())
        .collect();

    match candidates.len() {
        0 => Ok(None),
        1 => Ok(candidates.pop()),
        _ => Err(AnalysisError::AmbiguousReExport {
            module: ast.id().unwrap_or("<anonymous>").to_string(),
            target: module_id.to_string(),
            key: key.clone(),
            candidates,
        }),
    }
}

/// Calls `n(<module_id>)` with exactly one argument.
fn require_calls<'t>(
    ast: &'t WebpackAst,
    require_id: BindingId,
    module_id: &str,
) -> Vec<Node<'t>> {
    let source = ast.source();
    ast.scopes()
        .binding(require_id)
        .reads()
        .filter_map(|reference| ast.node_at(reference.range))
        .filter_map(call_of)
        .filter(|call| match call_arguments(*call)[..] {
            [argument] => names_module(argument, source, module_id),
            _ => false,
        })
        .collect()
}

/// For a bound import `r`, the callee ranges of `o()` where `o = n.n(r)`.
fn interop_invocations(ast: &WebpackAst, require_id: BindingId, import: Node<'_>) -> Vec<Range> {
    let scopes = ast.scopes();

    let Some(call) = parent_skipping_parens(import)
        .filter(|arguments| arguments.kind() == "arguments")
        .and_then(|arguments| arguments.parent())
    else {
        return Vec::new();
    };
    if call_arguments(call).len() != 1 {
        return Vec::new();
    }
    let is_interop = call
        .child_by_field_name("function")
        .map(unwrap_parens)
        .filter(|function| function.kind() == "member_expression")
        .is_some_and(|function| {
            let object = function.child_by_field_name("object").map(unwrap_parens);
            let property = function.child_by_field_name("property");
            object.and_then(|object| scopes.binding_id_of(&object)) == Some(require_id)
                && property.is_some_and(|property| ast.text(&property) == "n")
        });
    if !is_interop {
        return Vec::new();
    }

    let Some(wrapper) = declarator_name_of(call).and_then(|name| scopes.binding_of(&name)) else {
        return Vec::new();
    };
    wrapper
        .reads()
        .filter_map(|reference| ast.node_at(reference.range))
        .filter(|node| call_of(*node).is_some())
        .map(|node| Range::of(&node))
        .collect()
}

/// Whether an export entry's value is one of the import usages.
fn forwards(ast: &WebpackAst, entry: &ExportEntry, usages: &[Range]) -> bool {
    let Some(value) = entry.value() else {
        return false;
    };
    if usages.contains(&value) {
        return true;
    }

    let Some(node) = ast.node_at(value) else {
        return false;
    };
    let inner = match node.kind() {
        "member_expression" | "subscript_expression" => accessed_property(node),
        "call_expression" => node.child_by_field_name("function").map(unwrap_parens),
        _ => None,
    };
    inner.is_some_and(|inner| usages.contains(&Range::of(&inner)))
}

fn numeric_id<'s>(node: Node<'_>, source: &'s str) -> Option<&'s str> {
    if node.kind() != "number" {
        return None;
    }
    node.utf8_text(source.as_bytes()).ok()
}

fn names_module(node: Node<'_>, source: &str, module_id: &str) -> bool {
    let Ok(text) = node.utf8_text(source.as_bytes()) else {
        return false;
    };
    match node.kind() {
        "number" => text == module_id,
        "string" => unquote(text) == module_id,
        _ => false,
    }
}
