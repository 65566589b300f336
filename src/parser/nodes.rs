//! Small helpers over tree-sitter JavaScript nodes.

use tree_sitter::Node;

use super::position::Range;

/// Named children of a node, comments excluded.
pub fn named_children<'t>(node: Node<'t>) -> Vec<Node<'t>> {
    let mut cursor = node.walk();
    let children = node
        .named_children(&mut cursor)
        .filter(|child| child.kind() != "comment")
        .collect();
    children
}

/// First child token of a node (named or not).
pub fn first_child<'t>(node: Node<'t>) -> Option<Node<'t>> {
    let mut cursor = node.walk();
    let first = node.children(&mut cursor).next();
    first
}

/// Node kinds that introduce a function scope.
pub fn is_function_like(kind: &str) -> bool {
    matches!(
        kind,
        "function_expression"
            | "function_declaration"
            | "generator_function"
            | "generator_function_declaration"
            | "arrow_function"
            | "method_definition"
    )
}

pub fn is_class_like(kind: &str) -> bool {
    matches!(kind, "class" | "class_declaration")
}

pub fn is_literal(kind: &str) -> bool {
    matches!(
        kind,
        "string" | "number" | "regex" | "template_string" | "true" | "false" | "null" | "undefined"
    )
}

/// Strip any number of parentheses around an expression.
pub fn unwrap_parens(mut node: Node<'_>) -> Node<'_> {
    while node.kind() == "parenthesized_expression" {
        match named_children(node).into_iter().next() {
            Some(inner) => node = inner,
            None => break,
        }
    }
    node
}

/// Parent of a node, skipping enclosing parentheses.
pub fn parent_skipping_parens(node: Node<'_>) -> Option<Node<'_>> {
    let mut parent = node.parent()?;
    while parent.kind() == "parenthesized_expression" {
        parent = parent.parent()?;
    }
    Some(parent)
}

/// Returns true if `child` is the node stored under `field` in `parent`.
pub fn is_field(parent: Node<'_>, field: &str, child: Node<'_>) -> bool {
    parent.child_by_field_name(field) == Some(child)
}

/// Remove surrounding quotes from a string literal's text.
pub fn unquote(text: &str) -> &str {
    text.trim_start_matches(['"', '\'', '`'])
        .trim_end_matches(['"', '\'', '`'])
}

/// The static name a key-like node denotes: `foo`, `"foo"`, `12`.
pub fn static_key<'s>(node: Node<'_>, source: &'s str) -> Option<&'s str> {
    let text = node.utf8_text(source.as_bytes()).ok()?;
    match node.kind() {
        "property_identifier" | "identifier" | "private_property_identifier" | "number"
        | "shorthand_property_identifier" => Some(text),
        "string" => Some(unquote(text)),
        _ => None,
    }
}

/// The property node of a static member access: `a.b` or `a["b"]`.
pub fn accessed_property(access: Node<'_>) -> Option<Node<'_>> {
    match access.kind() {
        "member_expression" => access.child_by_field_name("property"),
        "subscript_expression" => access
            .child_by_field_name("index")
            .map(unwrap_parens)
            .filter(|index| matches!(index.kind(), "string" | "number")),
        _ => None,
    }
}

/// If `object` is the object of a static member access, returns the access
/// and the name it reads.
pub fn member_access_of<'t, 's>(
    object: Node<'t>,
    source: &'s str,
) -> Option<(Node<'t>, Node<'t>, &'s str)> {
    let access = parent_skipping_parens(object)?;
    let base = access.child_by_field_name("object").map(unwrap_parens)?;
    if base != object {
        return None;
    }
    let property = accessed_property(access)?;
    let name = static_key(property, source)?;
    Some((access, property, name))
}

/// If `callee` is the function of a call expression, returns that call.
pub fn call_of(callee: Node<'_>) -> Option<Node<'_>> {
    let call = parent_skipping_parens(callee)?;
    if call.kind() != "call_expression" {
        return None;
    }
    let function = call.child_by_field_name("function").map(unwrap_parens)?;
    (function == callee).then_some(call)
}

/// Argument expressions of a call or `new` expression.
pub fn call_arguments(call: Node<'_>) -> Vec<Node<'_>> {
    call.child_by_field_name("arguments")
        .map(named_children)
        .unwrap_or_default()
}

/// If `target` is the left-hand side of a plain `=` assignment, returns the
/// assigned value.
pub fn assigned_value(target: Node<'_>) -> Option<Node<'_>> {
    let assignment = parent_skipping_parens(target)?;
    if assignment.kind() != "assignment_expression" {
        return None;
    }
    let left = assignment.child_by_field_name("left").map(unwrap_parens)?;
    if left != target {
        return None;
    }
    assignment.child_by_field_name("right")
}

/// If `value` initializes a variable declarator, returns the declared name.
pub fn declarator_name_of(value: Node<'_>) -> Option<Node<'_>> {
    let declarator = parent_skipping_parens(value)?;
    if declarator.kind() != "variable_declarator" {
        return None;
    }
    let initializer = declarator.child_by_field_name("value").map(unwrap_parens)?;
    if initializer != value {
        return None;
    }
    declarator
        .child_by_field_name("name")
        .filter(|name| name.kind() == "identifier")
}

/// Name range of a function or class, or the range of its leading keyword
/// when it is anonymous.
pub fn definition_name_range(node: Node<'_>) -> Range {
    if let Some(name) = node.child_by_field_name("name") {
        return Range::of(&name);
    }
    first_child(node)
        .map(|keyword| Range::of(&keyword))
        .unwrap_or_else(|| Range::of(&node))
}

/// The expression a zero-parameter getter returns: `() => x`,
/// `() => { return x }` or `function () { return x }`.
pub fn getter_return(function: Node<'_>) -> Option<Node<'_>> {
    let function = unwrap_parens(function);
    if !matches!(function.kind(), "arrow_function" | "function_expression") {
        return None;
    }
    if function.child_by_field_name("parameter").is_some() {
        return None;
    }
    let has_params = function
        .child_by_field_name("parameters")
        .map(|params| !named_children(params).is_empty())
        .unwrap_or(false);
    if has_params {
        return None;
    }

    let body = function.child_by_field_name("body")?;
    if body.kind() != "statement_block" {
        return Some(body);
    }

    let mut returns = named_children(body)
        .into_iter()
        .filter(|statement| statement.kind() == "return_statement");
    let only = returns.next()?;
    if returns.next().is_some() {
        return None;
    }
    named_children(only).into_iter().next()
}
