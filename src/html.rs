//! HTML source to host [`Element`]s.
//!
//! Lets HTML fixtures be mounted like any other element tree. The CLI
//! reads its input through [`parse`].

use scraper::{ElementRef, Html, Node};
use tracing::debug;

use crate::element::{Element, PropValue};

/// Tags that never become elements.
const PRUNED_TAGS: &[&str] = &["script", "style", "noscript", "template", "head", "meta", "link", "title"];

/// Attributes whose presence alone means `true`.
const BOOLEAN_ATTRS: &[&str] = &[
    "autofocus", "checked", "disabled", "hidden", "multiple", "readonly", "required", "selected",
];

/// HTML attribute name to prop name.
fn prop_name(attr: &str) -> String {
    match attr {
        "class" => "className".into(),
        "for" => "htmlFor".into(),
        "tabindex" => "tabIndex".into(),
        "readonly" => "readOnly".into(),
        "maxlength" => "maxLength".into(),
        "colspan" => "colSpan".into(),
        "rowspan" => "rowSpan".into(),
        "autofocus" => "autoFocus".into(),
        other => other.to_string(),
    }
}

/// Parse a fragment such as `<div>..</div><p>..</p>`. Several top-level
/// elements come back wrapped in a fragment.
pub fn parse_fragment(html: &str) -> Element {
    debug!(html_len = html.len(), "parsing HTML fragment");
    let fragment = Html::parse_fragment(html);
    let root = fragment.root_element();
    wrap_roots(convert_children(root))
}

/// Parse a whole document and convert the contents of `<body>`.
pub fn parse_document(html: &str) -> Element {
    debug!(html_len = html.len(), "parsing HTML document");
    let document = Html::parse_document(html);
    let root = document.root_element();
    let body = find_element(&root, "body").unwrap_or(root);
    wrap_roots(convert_children(body))
}

/// Whole documents go through [`parse_document`], anything else through [`parse_fragment`].
pub fn parse(html: &str) -> Element {
    let head: String = html.trim_start().chars().take(9).collect::<String>().to_ascii_lowercase();
    if head.starts_with("<!doctype") || head.starts_with("<html") {
        parse_document(html)
    } else {
        parse_fragment(html)
    }
}

fn wrap_roots(mut roots: Vec<PropValue>) -> Element {
    if let [PropValue::Element(_)] = roots.as_slice() {
        if let Some(PropValue::Element(only)) = roots.pop() {
            return *only;
        }
    }
    Element::fragment().children(roots)
}

fn find_element<'a>(parent: &ElementRef<'a>, tag_name: &str) -> Option<ElementRef<'a>> {
    for child in parent.children() {
        if let Some(elem) = ElementRef::wrap(child) {
            if elem.value().name.local.as_ref() == tag_name {
                return Some(elem);
            }
            if let Some(found) = find_element(&elem, tag_name) {
                return Some(found);
            }
        }
    }
    None
}

fn collapse_whitespace(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut last_space = false;
    for c in text.chars() {
        if c.is_whitespace() {
            if !last_space {
                out.push(' ');
            }
            last_space = true;
        } else {
            out.push(c);
            last_space = false;
        }
    }
    out
}

fn convert_children(parent: ElementRef) -> Vec<PropValue> {
    let mut out = Vec::new();
    for child in parent.children() {
        if let Some(elem) = ElementRef::wrap(child) {
            if let Some(el) = convert_element(elem) {
                out.push(el.into());
            }
        } else if let Node::Text(text) = child.value() {
            if !text.trim().is_empty() {
                out.push(PropValue::String(collapse_whitespace(text)));
            }
        }
    }

    // Indentation around the first and last child is layout, not content.
    if let Some(PropValue::String(first)) = out.first_mut() {
        *first = first.trim_start().to_string();
    }
    if let Some(PropValue::String(last)) = out.last_mut() {
        *last = last.trim_end().to_string();
    }
    out
}

fn convert_element(element: ElementRef) -> Option<Element> {
    let el = element.value();
    let tag = el.name.local.as_ref();
    if PRUNED_TAGS.contains(&tag) {
        return None;
    }

    let mut out = Element::host(tag);
    for (name, value) in el.attrs() {
        let prop: PropValue = if BOOLEAN_ATTRS.contains(&name) && (value.is_empty() || value == name) {
            true.into()
        } else {
            value.into()
        };
        out = out.prop(&prop_name(name), prop);
    }

    let children = convert_children(element);
    match children.len() {
        0 => {}
        1 => {
            if let Some(only) = children.into_iter().next() {
                out = out.child(only);
            }
        }
        _ => out = out.children(children),
    }
    Some(out)
}
