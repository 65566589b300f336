//! Class introspection for the Store pattern.
//!
//! Stores are singleton state containers built as
//! `var s = new SomeStore(handlers)` where `SomeStore` extends a base class
//! and defines an `initialize` method.

use serde::Serialize;
use tree_sitter::Node;

use crate::parser::nodes::{definition_name_range, is_class_like, named_children, static_key};
use crate::parser::Range;

/// One member declared in a class body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum ClassMember {
    Constructor {
        range: Range,
    },
    Method {
        name: String,
        range: Range,
        is_static: bool,
    },
    Property {
        name: String,
        range: Range,
        value: Option<Range>,
    },
}

impl ClassMember {
    /// Declared name. Constructors are always `constructor`.
    pub fn name(&self) -> &str {
        match self {
            ClassMember::Constructor { .. } => "constructor",
            ClassMember::Method { name, .. } | ClassMember::Property { name, .. } => name,
        }
    }

    /// Range of the member's name.
    pub fn range(&self) -> Range {
        match self {
            ClassMember::Constructor { range }
            | ClassMember::Method { range, .. }
            | ClassMember::Property { range, .. } => *range,
        }
    }
}

/// The structure of a class declaration or class expression.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassShape {
    pub name: Option<String>,
    /// Class name, or the `class` keyword for anonymous classes.
    pub name_range: Range,
    /// The `extends ...` clause, if any.
    pub heritage: Option<Range>,
    pub members: Vec<ClassMember>,
}

impl ClassShape {
    /// Read the shape of a `class_declaration` or `class` node.
    pub fn from_node(node: Node<'_>, source: &str) -> Option<Self> {
        if !is_class_like(node.kind()) {
            return None;
        }

        let name = node
            .child_by_field_name("name")
            .and_then(|name| name.utf8_text(source.as_bytes()).ok())
            .map(str::to_string);
        let heritage = named_children(node)
            .into_iter()
            .find(|child| child.kind() == "class_heritage")
            .map(|heritage| Range::of(&heritage));

        let members = node
            .child_by_field_name("body")
            .map(|body| {
                named_children(body)
                    .into_iter()
                    .filter_map(|member| read_member(member, source))
                    .collect()
            })
            .unwrap_or_default();

        Some(Self {
            name,
            name_range: definition_name_range(node),
            heritage,
            members,
        })
    }

    /// Whether the class declares a method called `name`, static or not.
    pub fn has_method(&self, name: &str) -> bool {
        self.members
            .iter()
            .any(|m| matches!(m, ClassMember::Method { .. }) && m.name() == name)
    }

    /// Name range of the explicit constructor, if the class declares one.
    pub fn constructor(&self) -> Option<Range> {
        self.members
            .iter()
            .find(|m| matches!(m, ClassMember::Constructor { .. }))
            .map(ClassMember::range)
    }

    /// Heritage clause plus an `initialize` method.
    pub fn is_store(&self) -> bool {
        self.heritage.is_some() && self.has_method("initialize")
    }

    /// Declares every one of `methods`.
    pub fn implements(&self, methods: &[&str]) -> bool {
        methods.iter().all(|method| self.has_method(method))
    }
}

fn read_member(member: Node<'_>, source: &str) -> Option<ClassMember> {
    match member.kind() {
        "method_definition" => {
            let name_node = member.child_by_field_name("name")?;
            let name = static_key(name_node, source)?.to_string();
            let range = Range::of(&name_node);
            if name == "constructor" {
                return Some(ClassMember::Constructor { range });
            }
            let is_static = {
                let mut cursor = member.walk();
                let found = member
                    .children(&mut cursor)
                    .any(|child| child.kind() == "static");
                found
            };
            Some(ClassMember::Method {
                name,
                range,
                is_static,
            })
        }
        "field_definition" => {
            let name_node = member.child_by_field_name("property")?;
            let name = static_key(name_node, source)?.to_string();
            Some(ClassMember::Property {
                name,
                range: Range::of(&name_node),
                value: member
                    .child_by_field_name("value")
                    .map(|value| Range::of(&value)),
            })
        }
        _ => None,
    }
}
