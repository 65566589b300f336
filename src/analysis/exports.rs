//! Export map synthesis for webpack modules.
//!
//! Bundled modules carry no export declarations. Instead webpack emits one
//! of three shapes inside the module wrapper `function(e, t, n)`:
//!
//! - **descriptor exports**: `n.d(t, { key: () => value })`
//! - **module exports**: `e.exports = value` (an object literal exports each
//!   of its properties, anything else is the default export)
//! - **property exports**: `t.key = value` / `e.exports.key = value`
//!
//! This module recovers `{ export name -> source ranges }` from those shapes
//! and recognizes Store classes behind aliased exports.

use std::collections::{btree_map, BTreeMap};
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, warn};
use tree_sitter::Node;

use super::store::{ClassMember, ClassShape};
use super::AnalysisResult;
use crate::parser::nodes::{
    accessed_property, assigned_value, call_arguments, call_of, definition_name_range,
    getter_return, is_class_like, is_function_like, member_access_of, named_children,
    static_key, unwrap_parens,
};
use crate::parser::{BindingId, ModuleText, PositionIndex, Range, RuntimeParam, WebpackAst};

/// Upper bound on identifier hops and nested object levels followed while
/// resolving an exported value.
pub const MAX_ALIAS_HOPS: usize = 16;

/// Name of an export. The default export is a distinct key, never equal to
/// the string `"default"`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ExportKey {
    Default,
    Named(String),
}

impl ExportKey {
    pub fn named(name: impl Into<String>) -> Self {
        ExportKey::Named(name.into())
    }

    pub fn is_default(&self) -> bool {
        matches!(self, ExportKey::Default)
    }

    pub fn as_name(&self) -> Option<&str> {
        match self {
            ExportKey::Default => None,
            ExportKey::Named(name) => Some(name),
        }
    }
}

impl fmt::Display for ExportKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExportKey::Default => write!(f, "<default>"),
            ExportKey::Named(name) => write!(f, "{}", name),
        }
    }
}

/// Source locations of one export.
///
/// `Ranges` holds `[definition, value?, resolved definition?]`. `Nested`
/// holds per-member entries for object literals and Store classes; its
/// [`ExportKey::Default`] entry carries the export's own definition ranges.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExportEntry {
    Ranges(Vec<Range>),
    Nested(ExportMap),
}

impl ExportEntry {
    pub fn definition(&self) -> Option<Range> {
        match self {
            ExportEntry::Ranges(ranges) => ranges.first().copied(),
            ExportEntry::Nested(map) => map.get(&ExportKey::Default)?.definition(),
        }
    }

    pub fn value(&self) -> Option<Range> {
        match self {
            ExportEntry::Ranges(ranges) => ranges.get(1).copied(),
            ExportEntry::Nested(_) => None,
        }
    }

    pub fn resolved(&self) -> Option<Range> {
        match self {
            ExportEntry::Ranges(ranges) => ranges.get(2).copied(),
            ExportEntry::Nested(_) => None,
        }
    }

    pub fn ranges(&self) -> &[Range] {
        match self {
            ExportEntry::Ranges(ranges) => ranges,
            ExportEntry::Nested(_) => &[],
        }
    }

    fn to_json(&self, positions: &PositionIndex) -> Value {
        match self {
            ExportEntry::Ranges(ranges) => Value::Array(
                ranges
                    .iter()
                    .map(|range| {
                        let (start, end) = positions.span(*range);
                        json!({ "start": start, "end": end })
                    })
                    .collect(),
            ),
            ExportEntry::Nested(map) => map.to_json(positions),
        }
    }
}

/// Ordered map from export key to export entry.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExportMap {
    entries: BTreeMap<ExportKey, ExportEntry>,
}

impl ExportMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &ExportKey) -> Option<&ExportEntry> {
        self.entries.get(key)
    }

    pub fn insert(&mut self, key: ExportKey, entry: ExportEntry) -> Option<ExportEntry> {
        self.entries.insert(key, entry)
    }

    pub fn contains_key(&self, key: &ExportKey) -> bool {
        self.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &ExportKey> {
        self.entries.keys()
    }

    pub fn iter(&self) -> btree_map::Iter<'_, ExportKey, ExportEntry> {
        self.entries.iter()
    }

    /// Keys whose definition range contains `offset`.
    pub fn keys_at(&self, offset: usize) -> Vec<&ExportKey> {
        self.entries
            .iter()
            .filter(|(_, entry)| entry.definition().is_some_and(|d| d.contains(offset)))
            .map(|(key, _)| key)
            .collect()
    }

    /// JSON rendering with line/column positions, keyed by display name.
    pub fn to_json(&self, positions: &PositionIndex) -> Value {
        Value::Object(
            self.entries
                .iter()
                .map(|(key, entry)| (key.to_string(), entry.to_json(positions)))
                .collect(),
        )
    }

    fn prepend_definition(&mut self, definition: Range) {
        match self.entries.get_mut(&ExportKey::Default) {
            Some(ExportEntry::Ranges(ranges)) => ranges.insert(0, definition),
            Some(ExportEntry::Nested(_)) => {}
            None => {
                self.entries
                    .insert(ExportKey::Default, ExportEntry::Ranges(vec![definition]));
            }
        }
    }
}

impl IntoIterator for ExportMap {
    type Item = (ExportKey, ExportEntry);
    type IntoIter = btree_map::IntoIter<ExportKey, ExportEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

impl<'a> IntoIterator for &'a ExportMap {
    type Item = (&'a ExportKey, &'a ExportEntry);
    type IntoIter = btree_map::Iter<'a, ExportKey, ExportEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

/// A class standing behind an export, either the class itself or an
/// instance constructed from it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportedClass {
    pub shape: ClassShape,
    pub is_instance: bool,
}

impl ExportedClass {
    pub fn is_store(&self) -> bool {
        self.is_instance && self.shape.is_store()
    }
}

/// Everything derived from one module's export shapes.
#[derive(Debug, Default)]
pub struct ExportAnalysis {
    pub map: ExportMap,
    pub classes: BTreeMap<ExportKey, ExportedClass>,
}

impl WebpackAst {
    /// The module's export map, computed on first use.
    pub fn export_map(&self) -> &ExportMap {
        &self.export_analysis().map
    }

    /// Classes behind exports, keyed by export.
    pub fn exported_classes(&self) -> &BTreeMap<ExportKey, ExportedClass> {
        &self.export_analysis().classes
    }

    fn export_analysis(&self) -> &ExportAnalysis {
        self.exports
            .get_or_init(|| ExportSynthesizer::new(self).run())
    }
}

/// Parse a module and synthesize its export map.
pub fn synthesize_exports(module: ModuleText) -> AnalysisResult<ExportMap> {
    let ast = WebpackAst::parse(module)?;
    Ok(ast.export_map().clone())
}

/// How a binding receives its value.
#[derive(Debug, Clone)]
enum Definition<'t> {
    Unassigned,
    /// Assigned from an identifier with no local binding.
    Global,
    Value(Node<'t>),
    Competing(Vec<Node<'t>>),
}

/// Where an identifier alias chain ends.
struct AliasTarget<'t> {
    /// Declaring identifier of the final binding.
    name: Node<'t>,
    definition: Definition<'t>,
}

struct ExportSynthesizer<'a> {
    ast: &'a WebpackAst,
    classes: BTreeMap<ExportKey, ExportedClass>,
}

impl<'a> ExportSynthesizer<'a> {
    fn new(ast: &'a WebpackAst) -> Self {
        Self {
            ast,
            classes: BTreeMap::new(),
        }
    }

    fn run(mut self) -> ExportAnalysis {
        let shapes = [
            ("descriptor", self.descriptor_exports()),
            ("module", self.module_exports()),
            ("property", self.property_exports()),
        ];

        let mut map = ExportMap::new();
        for (shape, exports) in shapes {
            for (key, entry) in exports {
                if map.contains_key(&key) {
                    debug!(
                        module = self.ast.id().unwrap_or("<anonymous>"),
                        export = %key,
                        shape,
                        "export produced by more than one shape, keeping the later one"
                    );
                }
                map.insert(key, entry);
            }
        }

        ExportAnalysis {
            map,
            classes: self.classes,
        }
    }

    /// `n.d(t, { key: () => value })`
    fn descriptor_exports(&mut self) -> ExportMap {
        let ast = self.ast;
        let source = ast.source();
        let mut exports = ExportMap::new();

        let Some(require) = ast.runtime_binding(RuntimeParam::Require) else {
            return exports;
        };

        for reference in require.reads() {
            let Some(node) = ast.node_at(reference.range) else {
                continue;
            };
            let Some((access, _, "d")) = member_access_of(node, source) else {
                continue;
            };
            let Some(call) = call_of(access) else {
                continue;
            };
            let descriptors = call_arguments(call)
                .get(1)
                .map(|argument| unwrap_parens(*argument))
                .filter(|argument| argument.kind() == "object");
            let Some(descriptors) = descriptors else {
                debug!("export descriptor call without an object literal");
                continue;
            };

            for property in named_children(descriptors) {
                if property.kind() != "pair" {
                    continue;
                }
                let (Some(key_node), Some(getter)) = (
                    property.child_by_field_name("key"),
                    property.child_by_field_name("value"),
                ) else {
                    continue;
                };
                let Some(name) = static_key(key_node, source) else {
                    continue;
                };

                let key = ExportKey::named(name);
                let definition = Range::of(&key_node);
                let Some(returned) = getter_return(getter) else {
                    debug!(export = name, "export getter has no single return expression");
                    exports.insert(key, ExportEntry::Ranges(vec![definition]));
                    continue;
                };

                let returned = unwrap_parens(returned);
                let entry = match returned.kind() {
                    "identifier" => self.alias_entry(&key, definition, returned),
                    "member_expression" | "subscript_expression" => {
                        let property = accessed_property(returned).unwrap_or(returned);
                        ExportEntry::Ranges(vec![definition, Range::of(&property)])
                    }
                    _ => self.value_entry(Some(&key), definition, returned, 0),
                };
                exports.insert(key, entry);
            }
        }

        exports
    }

    /// `e.exports = value`
    fn module_exports(&mut self) -> ExportMap {
        let ast = self.ast;
        let mut exports = ExportMap::new();

        for param in [RuntimeParam::Module, RuntimeParam::Exports] {
            let Some(binding) = ast.runtime_binding(param) else {
                continue;
            };
            for reference in binding.reads() {
                let Some(node) = ast.node_at(reference.range) else {
                    continue;
                };
                let Some((access, property, "exports")) = member_access_of(node, ast.source())
                else {
                    continue;
                };
                let Some(value) = assigned_value(access) else {
                    continue;
                };

                let value = unwrap_parens(value);
                if value.kind() == "object" {
                    for (key, entry) in self.object_entries(value, 0, true) {
                        exports.insert(key, entry);
                    }
                } else {
                    let key = ExportKey::Default;
                    let entry = self.value_entry(Some(&key), Range::of(&property), value, 0);
                    exports.insert(key, entry);
                }
            }
        }

        exports
    }

    /// `t.key = value` and `e.exports.key = value`
    fn property_exports(&mut self) -> ExportMap {
        let ast = self.ast;
        let source = ast.source();
        let mut exports = ExportMap::new();

        let mut bases = Vec::new();
        if let Some(binding) = ast.runtime_binding(RuntimeParam::Exports) {
            bases.extend(binding.reads().filter_map(|r| ast.node_at(r.range)));
        }
        if let Some(binding) = ast.runtime_binding(RuntimeParam::Module) {
            for reference in binding.reads() {
                let access = ast
                    .node_at(reference.range)
                    .and_then(|node| member_access_of(node, source));
                if let Some((access, _, "exports")) = access {
                    bases.push(access);
                }
            }
        }

        for base in bases {
            let Some((access, property, name)) = member_access_of(base, source) else {
                continue;
            };
            if name == "exports" && base.kind() == "identifier" {
                continue;
            }
            let Some(value) = assigned_value(access) else {
                continue;
            };

            let key = ExportKey::named(name);
            let entry = self.value_entry(Some(&key), Range::of(&property), value, 0);
            exports.insert(key, entry);
        }

        exports
    }

    /// Entries for every property of an exported object literal.
    fn object_entries(&mut self, object: Node<'a>, depth: usize, top_level: bool) -> ExportMap {
        let source = self.ast.source();
        let mut entries = ExportMap::new();

        for property in named_children(object) {
            let (name_node, value) = match property.kind() {
                "pair" => match (
                    property.child_by_field_name("key"),
                    property.child_by_field_name("value"),
                ) {
                    (Some(key), Some(value)) => (key, value),
                    _ => continue,
                },
                "shorthand_property_identifier" => (property, property),
                "method_definition" => match property.child_by_field_name("name") {
                    Some(name) => (name, property),
                    None => continue,
                },
                _ => continue,
            };
            let Some(name) = static_key(name_node, source) else {
                continue;
            };

            let key = ExportKey::named(name);
            let definition = Range::of(&name_node);
            let entry = if value.kind() == "method_definition" {
                ExportEntry::Ranges(vec![definition])
            } else {
                let recorded = top_level.then_some(&key);
                self.value_entry(recorded, definition, value, depth)
            };
            entries.insert(key, entry);
        }

        entries
    }

    /// Shape A alias: `() => x` where `x` is a local binding.
    fn alias_entry(
        &mut self,
        key: &ExportKey,
        definition: Range,
        identifier: Node<'a>,
    ) -> ExportEntry {
        let Some(target) = self.chase(identifier) else {
            return ExportEntry::Ranges(vec![definition]);
        };
        if let Some(store) = self.inspect_class(Some(key), definition, &target) {
            return ExportEntry::Nested(store);
        }

        let mut ranges = vec![definition];
        let declared = Range::of(&target.name);
        match target.definition {
            Definition::Value(value) => {
                let value = unwrap_parens(value);
                if is_function_like(value.kind()) || is_class_like(value.kind()) {
                    let resolved = definition_name_range(value);
                    ranges.push(declared);
                    if resolved != declared {
                        ranges.push(resolved);
                    }
                } else {
                    ranges.push(Range::of(&value));
                }
            }
            Definition::Unassigned | Definition::Global | Definition::Competing(_) => {
                ranges.push(declared)
            }
        }
        ExportEntry::Ranges(ranges)
    }

    /// Shapes B and C: resolve an assigned value to its defining ranges.
    fn value_entry(
        &mut self,
        key: Option<&ExportKey>,
        definition: Range,
        value: Node<'a>,
        depth: usize,
    ) -> ExportEntry {
        let value = unwrap_parens(value);
        match value.kind() {
            "identifier" | "shorthand_property_identifier" => {
                let Some(target) = self.chase(value) else {
                    return ExportEntry::Ranges(vec![definition, Range::of(&value)]);
                };
                if let Some(store) = self.inspect_class(key, definition, &target) {
                    return ExportEntry::Nested(store);
                }
                match target.definition {
                    Definition::Value(resolved) if depth < MAX_ALIAS_HOPS => {
                        self.value_entry(key, definition, resolved, depth + 1)
                    }
                    _ => ExportEntry::Ranges(vec![definition, Range::of(&target.name)]),
                }
            }
            "object" if depth < MAX_ALIAS_HOPS => {
                let mut nested = self.object_entries(value, depth + 1, false);
                nested.prepend_definition(definition);
                ExportEntry::Nested(nested)
            }
            kind if is_function_like(kind) || is_class_like(kind) => {
                if let Some(key) = key {
                    if let Some(shape) = ClassShape::from_node(value, self.ast.source()) {
                        self.classes.insert(
                            key.clone(),
                            ExportedClass {
                                shape,
                                is_instance: false,
                            },
                        );
                    }
                }
                ExportEntry::Ranges(vec![definition, definition_name_range(value)])
            }
            "member_expression" | "subscript_expression" => {
                let property = accessed_property(value).unwrap_or(value);
                ExportEntry::Ranges(vec![definition, Range::of(&property)])
            }
            _ => ExportEntry::Ranges(vec![definition, Range::of(&value)]),
        }
    }

    /// Follow `a = b`, `b = c`, ... to the binding that holds a real value.
    ///
    /// Returns `None` when `identifier` is itself unbound or a binding on the
    /// chain is declared more than once. A chain that reaches a global stops
    /// at the last local binding.
    fn chase(&self, identifier: Node<'a>) -> Option<AliasTarget<'a>> {
        let scopes = self.ast.scopes();
        let mut current = identifier;

        for _ in 0..MAX_ALIAS_HOPS {
            let id = scopes.binding_id_of(&current)?;
            let binding = scopes.binding(id);
            let [declaration] = binding.declarations.as_slice() else {
                debug!(
                    name = %binding.name,
                    declarations = binding.declarations.len(),
                    "alias declared more than once"
                );
                return None;
            };
            let name = self.ast.node_at(*declaration)?;

            let definition = self.definition(id);
            if let Definition::Value(value) = definition {
                let value = unwrap_parens(value);
                if value.kind() == "identifier" {
                    if scopes.binding_id_of(&value).is_none() {
                        return Some(AliasTarget {
                            name,
                            definition: Definition::Global,
                        });
                    }
                    current = value;
                    continue;
                }
            }
            return Some(AliasTarget { name, definition });
        }

        warn!(
            name = self.ast.text(&identifier),
            "alias chain longer than {} hops", MAX_ALIAS_HOPS
        );
        None
    }

    /// Every value assigned to a binding: its initializer plus later
    /// reassignments.
    fn definition(&self, id: BindingId) -> Definition<'a> {
        let ast = self.ast;
        let binding = ast.scopes().binding(id);

        let mut values: Vec<Node<'a>> = binding
            .declarations
            .iter()
            .filter_map(|range| ast.node_at(*range))
            .filter_map(declared_value)
            .collect();
        values.extend(
            binding
                .writes()
                .filter_map(|write| ast.node_at(write.range))
                .filter_map(assigned_value),
        );

        match values.len() {
            0 => Definition::Unassigned,
            1 => Definition::Value(values[0]),
            _ => Definition::Competing(values),
        }
    }

    /// Record the class behind an export and, when it is a Store instance,
    /// build the Store's member entries.
    fn inspect_class(
        &mut self,
        key: Option<&ExportKey>,
        definition: Range,
        target: &AliasTarget<'a>,
    ) -> Option<ExportMap> {
        let value = match &target.definition {
            Definition::Value(value) => unwrap_parens(*value),
            Definition::Competing(values) => {
                if values
                    .iter()
                    .any(|value| unwrap_parens(*value).kind() == "new_expression")
                {
                    warn!(
                        name = self.ast.text(&target.name),
                        assignments = values.len(),
                        "competing store assignments, skipping store pattern"
                    );
                }
                return None;
            }
            Definition::Unassigned | Definition::Global => return None,
        };

        let exported = self.class_behind(value)?;
        if let Some(key) = key {
            self.classes.insert(key.clone(), exported.clone());
        }
        if !exported.is_store() {
            return None;
        }

        let shape = exported.shape;
        let mut members = ExportMap::new();
        let mut definitions = vec![definition, shape.name_range];
        definitions.extend(shape.constructor());
        members.insert(ExportKey::Default, ExportEntry::Ranges(definitions));

        for member in &shape.members {
            match member {
                ClassMember::Constructor { .. } => {}
                ClassMember::Method { name, range, .. } => {
                    members.insert(ExportKey::named(name), ExportEntry::Ranges(vec![*range]));
                }
                ClassMember::Property { name, range, value } => {
                    let mut ranges = vec![*range];
                    ranges.extend(*value);
                    members.insert(ExportKey::named(name), ExportEntry::Ranges(ranges));
                }
            }
        }
        Some(members)
    }

    fn class_behind(&self, value: Node<'a>) -> Option<ExportedClass> {
        let source = self.ast.source();
        if is_class_like(value.kind()) {
            return ClassShape::from_node(value, source).map(|shape| ExportedClass {
                shape,
                is_instance: false,
            });
        }
        if value.kind() != "new_expression" {
            return None;
        }

        let constructor = value
            .child_by_field_name("constructor")
            .map(unwrap_parens)
            .filter(|constructor| constructor.kind() == "identifier")?;
        let class = match self.chase(constructor)?.definition {
            Definition::Value(class) => unwrap_parens(class),
            _ => return None,
        };
        ClassShape::from_node(class, source).map(|shape| ExportedClass {
            shape,
            is_instance: true,
        })
    }
}

/// The value a declaring identifier introduces: a declarator's initializer,
/// or the function/class node for named functions and classes.
fn declared_value(name: Node<'_>) -> Option<Node<'_>> {
    let parent = name.parent()?;
    if parent.child_by_field_name("name") != Some(name) {
        return None;
    }
    match parent.kind() {
        "variable_declarator" => parent.child_by_field_name("value"),
        "function_declaration"
        | "generator_function_declaration"
        | "class_declaration"
        | "function_expression"
        | "generator_function"
        | "class" => Some(parent),
        _ => None,
    }
}
