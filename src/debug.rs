use crate::element::{format_number, Element, PropValue};
use crate::rst::{RstNode, Tree};
use crate::traverse::children_of_node;

/// Knobs for [`debug_node`].
#[derive(Debug, Clone, Copy, Default)]
pub struct DebugOptions {
    /// Leave props out entirely.
    pub ignore_props: bool,
    /// Print object and list props in full instead of `{...}`.
    pub verbose: bool,
}

/// Serialize a render tree into indented pseudo-markup.
///
/// Example output:
/// ```text
/// <div className="box">
///   <Item id={1} onClick={[Function]} />
///   hello
/// </div>
/// ```
pub fn debug_node(tree: &Tree, options: &DebugOptions) -> String {
    let mut output = String::new();
    write_tree(tree, 0, options, &mut output);
    output
}

/// Several trees separated by two blank lines.
pub fn debug_nodes<'a>(trees: impl IntoIterator<Item = &'a Tree>, options: &DebugOptions) -> String {
    trees
        .into_iter()
        .map(|tree| debug_node(tree, options))
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("\n\n\n")
}

fn write_tree(tree: &Tree, indent: usize, options: &DebugOptions, output: &mut String) {
    let prefix = "  ".repeat(indent);
    match tree {
        Tree::Text(text) => {
            if !text.is_empty() {
                output.push_str(&prefix);
                output.push_str(&html_escape::encode_quoted_attribute(text));
            }
        }
        Tree::Number(n) => {
            output.push_str(&prefix);
            output.push_str(&format_number(*n));
        }
        Tree::Node(node) => write_node(node, indent, options, output),
    }
}

fn write_node(node: &RstNode, indent: usize, options: &DebugOptions, output: &mut String) {
    let prefix = "  ".repeat(indent);
    let name = type_name(node);
    output.push_str(&format!("{prefix}<{name}"));

    if !options.ignore_props {
        let props = props_string(node, options);
        if !props.is_empty() {
            output.push(' ');
            output.push_str(&props);
        }
    }

    let children: Vec<String> = children_of_node(node)
        .iter()
        .map(|child| {
            let mut s = String::new();
            write_tree(child, indent + 1, options, &mut s);
            s
        })
        .filter(|s| !s.trim().is_empty())
        .collect();

    if children.is_empty() {
        output.push_str(" />");
    } else {
        output.push_str(">\n");
        output.push_str(&children.join("\n"));
        output.push_str(&format!("\n{prefix}</{name}>"));
    }
}

fn type_name(node: &RstNode) -> String {
    node.ty.display_name().unwrap_or_else(|| "Component".to_string())
}

fn props_string(node: &RstNode, options: &DebugOptions) -> String {
    node.props
        .iter()
        .filter(|(key, _)| key.as_str() != "children")
        .map(|(key, value)| format!("{key}={}", prop_string(value, options)))
        .collect::<Vec<_>>()
        .join(" ")
}

fn prop_string(value: &PropValue, options: &DebugOptions) -> String {
    match value {
        PropValue::String(s) => quote(s),
        PropValue::Number(n) => format!("{{{}}}", format_number(*n)),
        PropValue::Bool(b) => format!("{{{b}}}"),
        PropValue::Null => "{null}".to_string(),
        PropValue::Undefined => "{undefined}".to_string(),
        PropValue::Function(_) => "{[Function]}".to_string(),
        other if options.verbose => format!("{{{}}}", inspect(other)),
        _ => "{{...}}".to_string(),
    }
}

fn quote(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            c => out.push(c),
        }
    }
    out.push('"');
    out
}

/// Full single-line rendering of a prop value.
pub fn inspect(value: &PropValue) -> String {
    match value {
        PropValue::Undefined => "undefined".to_string(),
        PropValue::Null => "null".to_string(),
        PropValue::Bool(b) => b.to_string(),
        PropValue::Number(n) => format_number(*n),
        PropValue::String(s) => quote(s),
        PropValue::Function(f) => match f.name() {
            Some(name) => format!("[Function: {name}]"),
            None => "[Function]".to_string(),
        },
        PropValue::Element(e) => element_tag(e),
        PropValue::List(items) if items.is_empty() => "[]".to_string(),
        PropValue::List(items) => format!(
            "[ {} ]",
            items.iter().map(inspect).collect::<Vec<_>>().join(", ")
        ),
        PropValue::Map(entries) => format!(
            "Map {{ {} }}",
            entries
                .iter()
                .map(|(k, v)| format!("{} => {}", quote(k), inspect(v)))
                .collect::<Vec<_>>()
                .join(", ")
        ),
        PropValue::Object(fields) if fields.is_empty() => "{}".to_string(),
        PropValue::Object(fields) => format!(
            "{{ {} }}",
            fields
                .iter()
                .map(|(k, v)| format!("{k}: {}", inspect(v)))
                .collect::<Vec<_>>()
                .join(", ")
        ),
    }
}

fn element_tag(element: &Element) -> String {
    format!(
        "<{} />",
        element.ty.display_name().unwrap_or_else(|| "Component".to_string())
    )
}
