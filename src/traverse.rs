//! Walking and comparing render trees.
//!
//! Everything here is pure: no renderer calls, only finished [`RstNode`]s.

use std::borrow::Cow;
use std::rc::Rc;

use regex::Regex;

use crate::element::{format_number, Element, PropValue, Props};
use crate::rst::{NodeType, RstNode, Tree};

/// A node's rendered children as a flat sequence, with fragment nodes expanded in place.
pub fn children_of_node(node: &RstNode) -> Vec<Tree> {
    let mut out = Vec::new();
    for child in node.rendered.to_vec() {
        push_expanding_fragments(child, &mut out);
    }
    out
}

fn push_expanding_fragments(tree: Tree, out: &mut Vec<Tree>) {
    match &tree {
        Tree::Node(n) if n.node_type == NodeType::Fragment => {
            for child in n.rendered.to_vec() {
                push_expanding_fragments(child, out);
            }
        }
        _ => out.push(tree),
    }
}

/// Node children only, skipping text leaves.
pub fn child_nodes(node: &RstNode) -> Vec<Rc<RstNode>> {
    children_of_node(node)
        .into_iter()
        .filter_map(|t| match t {
            Tree::Node(n) => Some(n),
            _ => None,
        })
        .collect()
}

/// Pre-order visit of `tree` and every descendant, text leaves included.
pub fn tree_for_each(tree: &Tree, visit: &mut dyn FnMut(&Tree)) {
    visit(tree);
    if let Tree::Node(node) = tree {
        for child in children_of_node(node) {
            tree_for_each(&child, visit);
        }
    }
}

pub fn tree_filter(tree: &Tree, predicate: impl Fn(&Tree) -> bool) -> Vec<Tree> {
    let mut out = Vec::new();
    tree_for_each(tree, &mut |t| {
        if predicate(t) {
            out.push(t.clone());
        }
    });
    out
}

/// Pre-order node search with a fallible predicate. Includes `root` itself.
pub fn find_nodes<E>(
    root: &Rc<RstNode>,
    predicate: &mut dyn FnMut(&Rc<RstNode>) -> Result<bool, E>,
) -> Result<Vec<Rc<RstNode>>, E> {
    let mut out = Vec::new();
    collect_nodes(root, predicate, &mut out)?;
    Ok(out)
}

fn collect_nodes<E>(
    node: &Rc<RstNode>,
    predicate: &mut dyn FnMut(&Rc<RstNode>) -> Result<bool, E>,
    out: &mut Vec<Rc<RstNode>>,
) -> Result<(), E> {
    if predicate(node)? {
        out.push(Rc::clone(node));
    }
    for child in child_nodes(node) {
        collect_nodes(&child, predicate, out)?;
    }
    Ok(())
}

/// Ancestors of `target` from `root` down to its parent. `None` when `target`
/// is not beneath `root`; empty when `target` is `root`.
pub fn path_to_node(target: &RstNode, root: &Rc<RstNode>) -> Option<Vec<Rc<RstNode>>> {
    let mut path = Vec::new();
    if descend(target, root, &mut path) {
        Some(path)
    } else {
        None
    }
}

fn descend(target: &RstNode, node: &Rc<RstNode>, path: &mut Vec<Rc<RstNode>>) -> bool {
    if std::ptr::eq(Rc::as_ptr(node), target) {
        return true;
    }
    path.push(Rc::clone(node));
    for child in child_nodes(node) {
        if descend(target, &child, path) {
            return true;
        }
    }
    path.pop();
    false
}

/// Ancestors of `node`, nearest first.
pub fn parents_of_node(node: &RstNode, root: &Rc<RstNode>) -> Vec<Rc<RstNode>> {
    let mut path = path_to_node(node, root).unwrap_or_default();
    path.reverse();
    path
}

pub fn find_parent_node(root: &Rc<RstNode>, node: &RstNode) -> Option<Rc<RstNode>> {
    path_to_node(node, root).and_then(|mut path| path.pop())
}

/// Props of a node, or an empty map for no node.
pub fn props_of_node(node: Option<&RstNode>) -> Cow<'_, Props> {
    match node {
        Some(n) => Cow::Borrowed(&n.props),
        None => Cow::Owned(Props::new()),
    }
}

/// Class-name test argument: a single name (or space-separated names) or a pattern.
#[derive(Debug, Clone)]
pub enum ClassMatcher {
    Name(String),
    Pattern(Regex),
}

impl From<&str> for ClassMatcher {
    fn from(name: &str) -> Self {
        ClassMatcher::Name(name.to_string())
    }
}

impl From<String> for ClassMatcher {
    fn from(name: String) -> Self {
        ClassMatcher::Name(name)
    }
}

impl From<Regex> for ClassMatcher {
    fn from(pattern: Regex) -> Self {
        ClassMatcher::Pattern(pattern)
    }
}

pub fn has_class_name(node: &RstNode, matcher: &ClassMatcher) -> bool {
    let props = props_of_node(Some(node));
    let classes = match props.get("className") {
        Some(PropValue::String(s)) => s.clone(),
        Some(PropValue::Number(n)) => format_number(*n),
        _ => return false,
    };
    match matcher {
        ClassMatcher::Pattern(re) => re.is_match(&classes),
        ClassMatcher::Name(name) => {
            let wanted: Vec<&str> = name.split_whitespace().collect();
            if wanted.is_empty() {
                return false;
            }
            let tokens: Vec<&str> = classes.split_whitespace().collect();
            tokens
                .windows(wanted.len())
                .any(|window| window == wanted.as_slice())
        }
    }
}

pub fn node_has_id(node: &RstNode, id: &str) -> bool {
    matches!(props_of_node(Some(node)).get("id"), Some(PropValue::String(s)) if s == id)
}

/// Text as a shallow render shows it: composite children print as `<Name />`.
pub fn get_text_from_node(tree: Option<&Tree>) -> String {
    match tree {
        None => String::new(),
        Some(Tree::Text(s)) => s.clone(),
        Some(Tree::Number(n)) => format_number(*n),
        Some(Tree::Node(node)) => {
            if node.ty.is_composite() {
                let name = node.ty.display_name().unwrap_or_else(|| "Component".into());
                return format!("<{name} />");
            }
            children_of_node(node)
                .iter()
                .map(|child| get_text_from_node(Some(child)))
                .collect()
        }
    }
}

/// Concatenated text of every leaf beneath `tree`, through composites.
pub fn get_text_from_host_nodes(tree: &Tree) -> String {
    let mut out = String::new();
    tree_for_each(tree, &mut |t| match t {
        Tree::Text(s) => out.push_str(s),
        Tree::Number(n) => out.push_str(&format_number(*n)),
        Tree::Node(_) => {}
    });
    out
}

/// A flattened children entry used for comparisons.
enum Leaf<'a> {
    Element(&'a Element),
    Text(Cow<'a, str>),
    Number(f64),
    Other(&'a PropValue),
}

fn flatten_leaves<'a>(value: &'a PropValue, out: &mut Vec<Leaf<'a>>) {
    match value {
        PropValue::Undefined | PropValue::Null | PropValue::Bool(_) => {}
        PropValue::List(items) => items.iter().for_each(|v| flatten_leaves(v, out)),
        PropValue::Map(entries) => entries.iter().for_each(|(_, v)| flatten_leaves(v, out)),
        PropValue::Element(e) => out.push(Leaf::Element(e)),
        PropValue::String(s) => out.push(Leaf::Text(Cow::Borrowed(s))),
        PropValue::Number(n) => out.push(Leaf::Number(*n)),
        other => out.push(Leaf::Other(other)),
    }
}

fn absent(value: &PropValue, loose: bool) -> bool {
    match value {
        PropValue::Undefined => true,
        PropValue::Null => loose,
        _ => false,
    }
}

fn compare(
    a_ty: &crate::element::ElementType,
    a: &Props,
    b_ty: &crate::element::ElementType,
    b: &Props,
    loose: bool,
) -> bool {
    if a_ty != b_ty {
        return false;
    }
    let present = |props: &Props| -> usize {
        props
            .iter()
            .filter(|(k, v)| k.as_str() != "children" && !absent(v, loose))
            .count()
    };
    for (key, value) in a {
        if key == "children" || absent(value, loose) {
            continue;
        }
        match b.get(key) {
            Some(other) if !absent(other, loose) && other == value => {}
            _ => return false,
        }
    }
    if !loose && present(a) != present(b) {
        return false;
    }

    let mut left = Vec::new();
    let mut right = Vec::new();
    if let Some(children) = a.get("children") {
        flatten_leaves(children, &mut left);
    }
    if let Some(children) = b.get("children") {
        flatten_leaves(children, &mut right);
    }
    left.len() == right.len()
        && left
            .iter()
            .zip(&right)
            .all(|(l, r)| compare_leaves(l, r, loose))
}

fn compare_leaves(a: &Leaf<'_>, b: &Leaf<'_>, loose: bool) -> bool {
    match (a, b) {
        (Leaf::Element(x), Leaf::Element(y)) => compare(&x.ty, &x.props, &y.ty, &y.props, loose),
        (Leaf::Text(x), Leaf::Text(y)) if loose => x.trim() == y.trim(),
        (Leaf::Text(x), Leaf::Text(y)) => x == y,
        (Leaf::Number(x), Leaf::Number(y)) => PropValue::Number(*x) == PropValue::Number(*y),
        (Leaf::Other(x), Leaf::Other(y)) => x == y,
        _ => false,
    }
}

/// Exact structural equality. `undefined` props count as absent on both sides.
pub fn node_equal(a: &RstNode, b: &RstNode) -> bool {
    compare(&a.ty, &a.props, &b.ty, &b.props, false)
}

/// Every present prop of `a` equals the same prop of `b`; children compared the same way.
pub fn node_matches(a: &RstNode, b: &RstNode) -> bool {
    compare(&a.ty, &a.props, &b.ty, &b.props, true)
}

/// Whether `expected` appears as a contiguous run among `node`'s children.
pub fn contains_children_sub_array(
    matches: impl Fn(&RstNode, &RstNode) -> bool,
    node: &RstNode,
    expected: &[Rc<RstNode>],
) -> bool {
    if expected.is_empty() {
        return false;
    }
    let children = child_nodes(node);
    children.windows(expected.len()).any(|window| {
        window
            .iter()
            .zip(expected)
            .all(|(child, want)| matches(&**child, &**want))
    })
}
