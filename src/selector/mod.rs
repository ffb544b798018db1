//! Selector evaluation over render trees.
//!
//! A query is either CSS-like text, an element type, a props subset or an
//! element to match loosely. Text selectors are tokenized with [`tokenize`]
//! and reduced left to right: the first compound is matched anywhere in the
//! root's subtree (the root included), then each combinator moves the
//! working set to the nodes related to it that match the next compound.

mod parse;

use std::collections::hash_map::Entry;
use std::collections::{HashMap, HashSet};
use std::rc::Rc;

use tracing::debug;

pub use parse::{tokenize, AttrOp, AttrValue, Combinator, Compound, SimpleSelector, Token};

use crate::adapter::{element_to_tree, Adapter};
use crate::element::{Element, ElementType, PropValue, Props};
use crate::error::{Error, Result};
use crate::rst::{RstNode, Tree};
use crate::traverse::{
    child_nodes, children_of_node, find_nodes, has_class_name, node_has_id, node_matches,
    ClassMatcher,
};

const COMPLEX_SELECTOR: &str = "This method does not support complex CSS selectors";

/// Anything a wrapper query accepts.
#[derive(Debug, Clone)]
pub enum Query<'a> {
    Css(&'a str),
    Type(ElementType),
    Props(&'a Props),
    Element(&'a Element),
}

impl<'a> From<&'a str> for Query<'a> {
    fn from(selector: &'a str) -> Self {
        Query::Css(selector)
    }
}

impl<'a> From<&'a String> for Query<'a> {
    fn from(selector: &'a String) -> Self {
        Query::Css(selector)
    }
}

impl From<ElementType> for Query<'_> {
    fn from(ty: ElementType) -> Self {
        Query::Type(ty)
    }
}

impl From<&ElementType> for Query<'_> {
    fn from(ty: &ElementType) -> Self {
        Query::Type(ty.clone())
    }
}

impl<'a> From<&'a Props> for Query<'a> {
    fn from(props: &'a Props) -> Self {
        Query::Props(props)
    }
}

impl<'a> From<&'a Element> for Query<'a> {
    fn from(element: &'a Element) -> Self {
        Query::Element(element)
    }
}

/// Where a predicate is evaluated: the subtree root with its parent links,
/// and the adapter (for names and focus).
pub struct MatchContext<'a> {
    pub root: &'a Rc<RstNode>,
    pub adapter: &'a dyn Adapter,
    parents: HashMap<*const RstNode, Rc<RstNode>>,
}

impl<'a> MatchContext<'a> {
    pub fn new(root: &'a Rc<RstNode>, adapter: &'a dyn Adapter) -> Self {
        let mut parents = HashMap::new();
        let mut pending = vec![Rc::clone(root)];
        while let Some(node) = pending.pop() {
            for child in child_nodes(&node) {
                if let Entry::Vacant(slot) = parents.entry(Rc::as_ptr(&child)) {
                    slot.insert(Rc::clone(&node));
                    pending.push(child);
                }
            }
        }
        Self { root, adapter, parents }
    }

    /// Parent of `node` beneath the root; `None` for the root itself.
    pub fn parent_of(&self, node: &RstNode) -> Option<&Rc<RstNode>> {
        self.parents.get(&(node as *const RstNode))
    }
}

/// A single-node test built from a query without combinators.
#[derive(Debug, Clone)]
pub enum Predicate {
    Compound(Compound),
    Type(ElementType),
    Props(Props),
    Element(Rc<RstNode>),
}

impl Predicate {
    /// Build a predicate for methods that only take simple selectors.
    pub fn simple(query: &Query<'_>) -> Result<Self> {
        match query {
            Query::Css(text) => {
                let mut tokens = tokenize(text)?;
                if tokens.len() != 1 {
                    return Err(Error::ComplexSelector(COMPLEX_SELECTOR.into()));
                }
                match tokens.pop() {
                    Some(Token::Compound(compound)) => {
                        validate(&compound)?;
                        Ok(Predicate::Compound(compound))
                    }
                    _ => Err(Error::ComplexSelector(COMPLEX_SELECTOR.into())),
                }
            }
            other => Self::structural(other),
        }
    }

    fn structural(query: &Query<'_>) -> Result<Self> {
        match query {
            Query::Type(ty) => Ok(Predicate::Type(ty.clone())),
            Query::Props(props) => {
                if props.is_empty() {
                    return Err(Error::Type(
                        "Selector does not support an array, null, or empty object as a selector".into(),
                    ));
                }
                if props.values().any(PropValue::is_undefined) {
                    return Err(Error::Type(
                        "Props can't have `undefined` values. Try using `find_where()` instead.".into(),
                    ));
                }
                Ok(Predicate::Props((*props).clone()))
            }
            Query::Element(element) => Ok(Predicate::Element(element_to_tree(element))),
            Query::Css(text) => Self::simple(&Query::Css(*text)),
        }
    }

    pub fn matches(&self, node: &Rc<RstNode>, cx: &MatchContext<'_>) -> Result<bool> {
        match self {
            Predicate::Compound(compound) => matches_compound(compound, node, cx),
            Predicate::Type(ty) => Ok(&node.ty == ty),
            Predicate::Props(props) => Ok(props
                .iter()
                .all(|(key, value)| node.props.get(key) == Some(value))),
            Predicate::Element(expected) => Ok(node_matches(expected, node)),
        }
    }
}

/// Fail early on pseudo-classes nothing here evaluates.
fn validate(compound: &Compound) -> Result<()> {
    for part in &compound.parts {
        match part {
            SimpleSelector::Pseudo { name, argument } => match name.as_str() {
                "not" => {
                    let inner = argument
                        .as_deref()
                        .ok_or_else(|| Error::Selector(":not() requires an argument".into()))?;
                    not_argument(inner)?;
                }
                "empty" | "first-child" | "last-child" | "focus" => {}
                other => return Err(Error::UnsupportedSelector(format!(":{other}"))),
            },
            SimpleSelector::PseudoElement(name) => {
                return Err(Error::UnsupportedSelector(format!("::{name}")))
            }
            _ => {}
        }
    }
    Ok(())
}

fn not_argument(text: &str) -> Result<Compound> {
    let mut tokens = tokenize(text)?;
    match (tokens.len(), tokens.pop()) {
        (1, Some(Token::Compound(compound))) => {
            validate(&compound)?;
            Ok(compound)
        }
        _ => Err(Error::ComplexSelector(format!(
            ":not() only accepts a simple selector, got \"{text}\""
        ))),
    }
}

fn matches_compound(compound: &Compound, node: &Rc<RstNode>, cx: &MatchContext<'_>) -> Result<bool> {
    for part in &compound.parts {
        if !matches_simple(part, node, cx)? {
            return Ok(false);
        }
    }
    Ok(true)
}

fn matches_simple(part: &SimpleSelector, node: &Rc<RstNode>, cx: &MatchContext<'_>) -> Result<bool> {
    Ok(match part {
        SimpleSelector::Universal => true,
        SimpleSelector::Type(name) => cx.adapter.display_name_of_node(node).as_deref() == Some(name.as_str()),
        SimpleSelector::Class(class) => has_class_name(node, &ClassMatcher::Name(class.clone())),
        SimpleSelector::Id(id) => node_has_id(node, id),
        SimpleSelector::Attribute { name, matcher } => match matcher {
            None => is_present(node.props.get(name)),
            Some((op, value)) => matches_attribute(node.props.get(name), *op, value),
        },
        SimpleSelector::Pseudo { name, argument } => match name.as_str() {
            "not" => {
                let inner = not_argument(argument.as_deref().unwrap_or_default())?;
                !matches_compound(&inner, node, cx)?
            }
            "empty" => children_of_node(node).is_empty(),
            "first-child" => sibling_position(node, cx, |siblings| siblings.first().cloned()),
            "last-child" => sibling_position(node, cx, |siblings| siblings.last().cloned()),
            "focus" => cx.adapter.is_focused(node)?,
            other => return Err(Error::UnsupportedSelector(format!(":{other}"))),
        },
        SimpleSelector::PseudoElement(name) => {
            return Err(Error::UnsupportedSelector(format!("::{name}")))
        }
    })
}

fn sibling_position(
    node: &Rc<RstNode>,
    cx: &MatchContext<'_>,
    pick: impl Fn(&[Rc<RstNode>]) -> Option<Rc<RstNode>>,
) -> bool {
    cx.parent_of(node)
        .and_then(|parent| pick(&child_nodes(parent)))
        .is_some_and(|chosen| Rc::ptr_eq(&chosen, node))
}

/// Presence test for `[name]`. Explicitly falsy values count as absent.
fn is_present(value: Option<&PropValue>) -> bool {
    match value {
        None | Some(PropValue::Undefined | PropValue::Null | PropValue::Bool(false)) => false,
        Some(PropValue::Number(n)) => *n != 0.0 && !n.is_nan(),
        Some(PropValue::String(s)) => !s.is_empty() && s != "false",
        Some(_) => true,
    }
}

/// Same-value equality: `NaN` equals itself and `0` differs from `-0`.
fn same_value(prop: &PropValue, value: &AttrValue) -> bool {
    match (prop, value) {
        (PropValue::Number(a), AttrValue::Number(b)) => {
            (a.is_nan() && b.is_nan()) || a.to_bits() == b.to_bits()
        }
        (PropValue::Bool(a), AttrValue::Bool(b)) => a == b,
        (PropValue::Null, AttrValue::Null) => true,
        (PropValue::String(a), AttrValue::String(b)) => a == b,
        _ => false,
    }
}

fn matches_attribute(prop: Option<&PropValue>, op: AttrOp, value: &AttrValue) -> bool {
    let Some(prop) = prop.filter(|p| !p.is_undefined()) else {
        return false;
    };
    let (PropValue::String(actual), AttrValue::String(wanted)) = (prop, value) else {
        return op == AttrOp::Equals && same_value(prop, value);
    };
    match op {
        AttrOp::Equals => actual == wanted,
        AttrOp::Includes => actual.split_whitespace().any(|word| word == wanted),
        AttrOp::DashMatch => actual == wanted || actual.starts_with(&format!("{wanted}-")),
        AttrOp::Prefix => !wanted.is_empty() && actual.starts_with(wanted.as_str()),
        AttrOp::Suffix => !wanted.is_empty() && actual.ends_with(wanted.as_str()),
        AttrOp::Substring => !wanted.is_empty() && actual.contains(wanted.as_str()),
    }
}

fn push_unique(out: &mut Vec<Rc<RstNode>>, seen: &mut HashSet<*const RstNode>, node: Rc<RstNode>) {
    if seen.insert(Rc::as_ptr(&node)) {
        out.push(node);
    }
}

fn matching<'a>(
    compound: &'a Compound,
    cx: &'a MatchContext<'a>,
) -> impl Fn(&Rc<RstNode>) -> Result<bool> + 'a {
    move |node| matches_compound(compound, node, cx)
}

/// Later siblings of `node` among its parent's rendered children; text leaves included
/// so an adjacent text entry breaks adjacency.
fn following_siblings(node: &Rc<RstNode>, cx: &MatchContext<'_>) -> Vec<Tree> {
    let Some(parent) = cx.parent_of(node) else {
        return Vec::new();
    };
    let siblings = children_of_node(parent);
    let position = siblings
        .iter()
        .position(|t| t.as_node().is_some_and(|n| Rc::ptr_eq(n, node)));
    match position {
        Some(i) => siblings[i + 1..].to_vec(),
        None => Vec::new(),
    }
}

fn apply_combinator(
    combinator: Combinator,
    compound: &Compound,
    current: &[Rc<RstNode>],
    cx: &MatchContext<'_>,
) -> Result<Vec<Rc<RstNode>>> {
    let predicate = matching(compound, cx);
    let mut out = Vec::new();
    let mut seen = HashSet::new();
    for node in current {
        match combinator {
            Combinator::Descendant => {
                for child in child_nodes(node) {
                    for found in find_nodes(&child, &mut |n| predicate(n))? {
                        push_unique(&mut out, &mut seen, found);
                    }
                }
            }
            Combinator::Child => {
                for child in child_nodes(node) {
                    if predicate(&child)? {
                        push_unique(&mut out, &mut seen, child);
                    }
                }
            }
            Combinator::Adjacent => {
                if let Some(Tree::Node(next)) = following_siblings(node, cx).into_iter().next() {
                    if predicate(&next)? {
                        push_unique(&mut out, &mut seen, next);
                    }
                }
            }
            Combinator::General => {
                for sibling in following_siblings(node, cx) {
                    if let Tree::Node(sibling) = sibling {
                        if predicate(&sibling)? {
                            push_unique(&mut out, &mut seen, sibling);
                        }
                    }
                }
            }
        }
    }
    Ok(out)
}

/// All nodes in `root`'s subtree (the root included) selected by `query`, in tree order.
pub fn reduce_tree_by_selector(
    query: &Query<'_>,
    root: &Rc<RstNode>,
    adapter: &dyn Adapter,
) -> Result<Vec<Rc<RstNode>>> {
    let cx = MatchContext::new(root, adapter);
    let Query::Css(text) = query else {
        let predicate = Predicate::structural(query)?;
        return find_nodes(root, &mut |n| predicate.matches(n, &cx));
    };

    let tokens = tokenize(text)?;
    debug!(selector = %text, tokens = tokens.len(), "evaluating selector");
    for token in &tokens {
        if let Token::Compound(compound) = token {
            validate(compound)?;
        }
    }

    let mut tokens = tokens.iter();
    let mut results = match tokens.next() {
        Some(Token::Compound(first)) => {
            let predicate = matching(first, &cx);
            find_nodes(root, &mut |n| predicate(n))?
        }
        _ => return Err(Error::Selector(format!("selector \"{text}\" must start with a simple selector"))),
    };
    while let Some(token) = tokens.next() {
        let (Token::Combinator(combinator), Some(Token::Compound(compound))) = (token, tokens.next()) else {
            return Err(Error::Selector(format!("selector \"{text}\" has a dangling combinator")));
        };
        results = apply_combinator(*combinator, compound, &results, &cx)?;
        if results.is_empty() {
            break;
        }
    }

    // Combinators visit candidates per left-hand match; restore document order.
    let hits: HashSet<*const RstNode> = results.iter().map(Rc::as_ptr).collect();
    find_nodes(root, &mut |n| Ok(hits.contains(&Rc::as_ptr(n))))
}

/// Selector applied to each root in turn; results de-duplicated across roots.
pub fn reduce_trees_by_selector(
    query: &Query<'_>,
    roots: &[Rc<RstNode>],
    adapter: &dyn Adapter,
) -> Result<Vec<Rc<RstNode>>> {
    let mut out = Vec::new();
    let mut seen = HashSet::new();
    for root in roots {
        for node in reduce_tree_by_selector(query, root, adapter)? {
            push_unique(&mut out, &mut seen, node);
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::ReferenceAdapter;
    use crate::element::FunctionComponent;
    use crate::props;

    fn find(selector: &str, el: &Element) -> Result<Vec<Rc<RstNode>>> {
        reduce_tree_by_selector(&Query::Css(selector), &element_to_tree(el), &ReferenceAdapter::new())
    }

    fn count(selector: &str, el: &Element) -> usize {
        find(selector, el).unwrap().len()
    }

    fn sample() -> Element {
        Element::host("div")
            .child(
                Element::host("div")
                    .prop("className", "top-div")
                    .child(Element::host("span")),
            )
            .child(Element::host("div").prop("className", "bottom-div"))
            .child(Element::host("span"))
    }

    #[test]
    fn combinators_over_sample_tree() {
        let el = sample();
        assert_eq!(count("*", &el), 5);
        assert_eq!(count("* + *", &el), 2);
        assert_eq!(count("* > span", &el), 2);
        assert_eq!(count("div span", &el), 2);
        assert_eq!(count(".top-div ~ *", &el), 2);
        assert_eq!(count(".top-div + span", &el), 0);
        assert_eq!(count(".bottom-div + span", &el), 1);
        assert_eq!(count("div > div > span", &el), 1);
    }

    #[test]
    fn parent_links_span_the_subtree() {
        let el = sample();
        let root = element_to_tree(&el);
        let adapter = ReferenceAdapter::new();
        let cx = MatchContext::new(&root, &adapter);
        assert!(cx.parent_of(&root).is_none());
        let top = &child_nodes(&root)[0];
        let span = &child_nodes(top)[0];
        assert!(Rc::ptr_eq(cx.parent_of(span).unwrap(), top));
        assert!(Rc::ptr_eq(cx.parent_of(top).unwrap(), &root));
    }

    #[test]
    fn sibling_combinators_over_a_wide_list() {
        let el = (0..500).fold(Element::host("ul"), |ul, i| {
            ul.child(Element::host("li").prop("data-index", i))
        });
        assert_eq!(count("li + li", &el), 499);
        assert_eq!(count("li ~ li", &el), 499);
        assert_eq!(count("li:first-child", &el), 1);
        assert_eq!(count("li:last-child + li", &el), 0);
    }

    #[test]
    fn results_are_unique_and_in_tree_order() {
        let el = Element::host("div").child(
            Element::host("div")
                .prop("id", "inner")
                .child(Element::host("b").prop("id", "first"))
                .child(Element::host("b").prop("id", "second")),
        );
        let found = find("div b", &el).unwrap();
        let ids: Vec<_> = found.iter().filter_map(|n| n.prop("id").cloned()).collect();
        assert_eq!(ids, vec![PropValue::from("first"), PropValue::from("second")]);
    }

    #[test]
    fn numeric_attribute_values_are_typed() {
        let two = Element::host("div").prop("data-foo", 2);
        assert_eq!(count("[data-foo=2]", &two), 1);
        assert_eq!(count("[data-foo=\"2abc\"]", &two), 0);
        assert_eq!(count("[data-foo=\"2\"]", &two), 0);

        let neg_zero = Element::host("div").prop("data-foo", -0.0);
        assert_eq!(count("[data-foo=-0]", &neg_zero), 1);
        assert_eq!(count("[data-foo=0]", &neg_zero), 0);

        let nan = Element::host("div").prop("data-foo", f64::NAN);
        assert_eq!(count("[data-foo=NaN]", &nan), 1);
    }

    #[test]
    fn string_operators() {
        let el = Element::host("a").prop("title", "en-US main page");
        assert_eq!(count("[title~=\"main\"]", &el), 1);
        assert_eq!(count("[title~=\"mai\"]", &el), 0);
        assert_eq!(count("[title|=\"en\"]", &el), 1);
        assert_eq!(count("[title^=\"en\"]", &el), 1);
        assert_eq!(count("[title$=\"page\"]", &el), 1);
        assert_eq!(count("[title*=\"main\"]", &el), 1);
        assert_eq!(count("[title*=\"\"]", &el), 0);
        assert_eq!(count("[title^=\"\"]", &el), 0);
        assert_eq!(count("[missing=\"x\"]", &el), 0);
    }

    #[test]
    fn presence_follows_the_coercion_table() {
        let with = |value: PropValue| count("[hidden]", &Element::host("i").prop("hidden", value));
        assert_eq!(with(true.into()), 1);
        assert_eq!(with("yes".into()), 1);
        assert_eq!(with(1.into()), 1);
        assert_eq!(with(false.into()), 0);
        assert_eq!(with("false".into()), 0);
        assert_eq!(with("".into()), 0);
        assert_eq!(with(0.into()), 0);
        assert_eq!(with(PropValue::Null), 0);
        assert_eq!(with(PropValue::Undefined), 0);
    }

    #[test]
    fn pseudo_classes() {
        let el = Element::host("ul")
            .child(Element::host("li").prop("className", "done"))
            .child(Element::host("li"))
            .child(Element::host("li").child("x"));
        assert_eq!(count("li:not(.done)", &el), 2);
        assert_eq!(count("li:empty", &el), 2);
        assert_eq!(count("li:first-child", &el), 1);
        assert_eq!(count("li:last-child", &el), 1);
        assert_eq!(count("ul:first-child", &el), 0);
    }

    #[test]
    fn unsupported_pseudo_selectors_fail_at_evaluation() {
        let el = sample();
        assert_eq!(
            find("a:hover", &el).unwrap_err(),
            Error::UnsupportedSelector(":hover".into())
        );
        assert!(matches!(find("p::before", &el), Err(Error::UnsupportedSelector(_))));
        assert!(matches!(find("li:not(a > b)", &el), Err(Error::ComplexSelector(_))));
    }

    #[test]
    fn focus_needs_a_document() {
        let node = element_to_tree(&Element::host("input"));
        let err = reduce_tree_by_selector(&Query::Css(":focus"), &node, &ReferenceAdapter::without_dom())
            .unwrap_err();
        assert!(matches!(err, Error::Environment(_)));
    }

    #[test]
    fn component_display_names_select() {
        let item = FunctionComponent::new("Item", |_, _| Ok(PropValue::Null));
        let el = Element::host("div")
            .child(Element::function(&item))
            .child(Element::function(&item));
        assert_eq!(count("Item", &el), 2);
        assert_eq!(count("div > Item + Item", &el), 1);
        let by_type = reduce_tree_by_selector(
            &Query::from(ElementType::Function(Rc::clone(&item))),
            &element_to_tree(&el),
            &ReferenceAdapter::new(),
        )
        .unwrap();
        assert_eq!(by_type.len(), 2);
    }

    #[test]
    fn props_queries() {
        let el = sample();
        let wanted = props! { "className" => "bottom-div" };
        let root = element_to_tree(&el);
        let adapter = ReferenceAdapter::new();
        assert_eq!(reduce_tree_by_selector(&Query::from(&wanted), &root, &adapter).unwrap().len(), 1);
        let empty = Props::new();
        assert!(matches!(
            reduce_tree_by_selector(&Query::from(&empty), &root, &adapter),
            Err(Error::Type(_))
        ));
    }

    #[test]
    fn simple_predicates_reject_combinators() {
        let err = Predicate::simple(&Query::Css("div > span")).unwrap_err();
        assert_eq!(err.to_string(), "This method does not support complex CSS selectors");
        assert!(Predicate::simple(&Query::Css("div.foo[id]")).is_ok());
    }

    #[test]
    fn multiple_roots_merge_without_duplicates() {
        let root = element_to_tree(&sample());
        let inner = child_nodes(&root)[0].clone();
        let found = reduce_trees_by_selector(
            &Query::Css("span"),
            &[Rc::clone(&root), inner],
            &ReferenceAdapter::new(),
        )
        .unwrap();
        assert_eq!(found.len(), 2);
    }
}
