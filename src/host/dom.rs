//! Minimal document: host node identity, focus and static markup.

use std::cell::{Cell, RefCell};
use std::collections::BTreeSet;
use std::rc::{Rc, Weak};

use crate::element::{format_number, PropValue, Props};

thread_local! {
    static DOCUMENT: Rc<Document> = Rc::new(Document::default());
}

/// The document shared by every mount root on this thread.
pub fn document() -> Rc<Document> {
    DOCUMENT.with(Rc::clone)
}

#[derive(Default)]
pub struct Document {
    next_id: Cell<u64>,
    active: Cell<Option<u64>>,
    containers: RefCell<BTreeSet<String>>,
}

impl Document {
    /// Id of the focused host node, if any.
    pub fn active_element(&self) -> Option<u64> {
        self.active.get()
    }

    pub fn create_container(&self, id: &str) {
        self.containers.borrow_mut().insert(id.to_string());
    }

    pub fn has_container(&self, id: &str) -> bool {
        self.containers.borrow().contains(id)
    }

    pub fn remove_container(&self, id: &str) {
        self.containers.borrow_mut().remove(id);
    }

    pub(crate) fn create_node(self: &Rc<Self>, tag: &str, props: &Props) -> Rc<RefCell<HostNode>> {
        let id = self.next_id.get() + 1;
        self.next_id.set(id);
        Rc::new(RefCell::new(HostNode {
            id,
            tag: tag.to_string(),
            attributes: attributes_of(props),
            document: Rc::downgrade(self),
            connected: true,
        }))
    }
}

pub(crate) struct HostNode {
    id: u64,
    tag: String,
    attributes: Props,
    document: Weak<Document>,
    connected: bool,
}

impl HostNode {
    pub fn set_attributes(&mut self, props: &Props) {
        self.attributes = attributes_of(props);
    }

    /// Remove from the document, dropping focus if held.
    pub fn detach(&mut self) {
        self.connected = false;
        if let Some(doc) = self.document.upgrade() {
            if doc.active.get() == Some(self.id) {
                doc.active.set(None);
            }
        }
    }
}

fn attributes_of(props: &Props) -> Props {
    props
        .iter()
        .filter(|(k, v)| k.as_str() != "children" && !matches!(v, PropValue::Function(_)))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect()
}

/// Weak handle to a host node.
#[derive(Clone)]
pub struct HostNodeHandle(Weak<RefCell<HostNode>>);

impl HostNodeHandle {
    pub(crate) fn new(node: &Rc<RefCell<HostNode>>) -> Self {
        Self(Rc::downgrade(node))
    }

    pub fn id(&self) -> Option<u64> {
        self.0.upgrade().map(|n| n.borrow().id)
    }

    pub fn tag(&self) -> String {
        self.0
            .upgrade()
            .map(|n| n.borrow().tag.clone())
            .unwrap_or_default()
    }

    pub fn attribute(&self, name: &str) -> Option<PropValue> {
        self.0
            .upgrade()
            .and_then(|n| n.borrow().attributes.get(name).cloned())
    }

    pub fn is_connected(&self) -> bool {
        self.0.upgrade().is_some_and(|n| n.borrow().connected)
    }

    pub fn focus(&self) {
        if let Some(node) = self.0.upgrade() {
            let node = node.borrow();
            if let (true, Some(doc)) = (node.connected, node.document.upgrade()) {
                doc.active.set(Some(node.id));
            }
        }
    }

    pub fn blur(&self) {
        if let Some(node) = self.0.upgrade() {
            let node = node.borrow();
            if let Some(doc) = node.document.upgrade() {
                if doc.active.get() == Some(node.id) {
                    doc.active.set(None);
                }
            }
        }
    }

    pub fn is_focused(&self) -> bool {
        self.0.upgrade().is_some_and(|node| {
            let node = node.borrow();
            node.document
                .upgrade()
                .is_some_and(|doc| doc.active.get() == Some(node.id))
        })
    }

    pub fn ptr_eq(&self, other: &HostNodeHandle) -> bool {
        self.0.ptr_eq(&other.0)
    }
}

const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "param",
    "source", "track", "wbr",
];

pub(crate) fn is_void_element(tag: &str) -> bool {
    VOID_ELEMENTS.contains(&tag)
}

/// Markup attribute name for a prop, or `None` when the prop never reaches markup.
fn attribute_name(prop: &str) -> Option<&str> {
    match prop {
        "children" | "key" | "ref" | "dangerouslySetInnerHTML" => None,
        "className" => Some("class"),
        "htmlFor" => Some("for"),
        other => Some(other),
    }
}

fn kebab_case(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 4);
    for c in name.chars() {
        if c.is_ascii_uppercase() {
            out.push('-');
            out.push(c.to_ascii_lowercase());
        } else {
            out.push(c);
        }
    }
    out
}

fn attribute_value(name: &str, value: &PropValue) -> Option<String> {
    match value {
        PropValue::Undefined | PropValue::Null | PropValue::Bool(false) => None,
        PropValue::Function(_) | PropValue::Element(_) => None,
        PropValue::Bool(true) => Some(String::new()),
        PropValue::Number(n) => Some(format_number(*n)),
        PropValue::String(s) => Some(s.clone()),
        PropValue::Object(map) if name == "style" => Some(
            map.iter()
                .filter(|(_, v)| !v.is_nullish())
                .map(|(k, v)| format!("{}:{}", kebab_case(k), v.to_js_string()))
                .collect::<Vec<_>>()
                .join(";"),
        ),
        PropValue::Object(_) | PropValue::Map(_) => None,
        PropValue::List(_) => Some(value.to_js_string()),
    }
}

pub(crate) fn write_open_tag(tag: &str, props: &Props, out: &mut String) {
    out.push('<');
    out.push_str(tag);
    for (prop, value) in props {
        let Some(name) = attribute_name(prop) else { continue };
        let Some(value) = attribute_value(prop, value) else { continue };
        out.push(' ');
        out.push_str(name);
        out.push_str("=\"");
        out.push_str(&html_escape::encode_double_quoted_attribute(&value));
        out.push('"');
    }
    if is_void_element(tag) {
        out.push_str("/>");
    } else {
        out.push('>');
    }
}

pub(crate) fn write_close_tag(tag: &str, out: &mut String) {
    if !is_void_element(tag) {
        out.push_str("</");
        out.push_str(tag);
        out.push('>');
    }
}

pub(crate) fn write_text(text: &str, out: &mut String) {
    out.push_str(&html_escape::encode_text(text));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::props;

    #[test]
    fn focus_tracks_active_element() {
        let doc = Rc::new(Document::default());
        let a = doc.create_node("input", &Props::new());
        let b = doc.create_node("input", &Props::new());
        let (ha, hb) = (HostNodeHandle::new(&a), HostNodeHandle::new(&b));

        ha.focus();
        assert!(ha.is_focused());
        assert!(!hb.is_focused());
        hb.focus();
        assert!(!ha.is_focused());
        hb.blur();
        assert_eq!(doc.active_element(), None);
    }

    #[test]
    fn detaching_drops_focus() {
        let doc = Rc::new(Document::default());
        let a = doc.create_node("button", &Props::new());
        let handle = HostNodeHandle::new(&a);
        handle.focus();
        a.borrow_mut().detach();
        assert!(!handle.is_focused());
        assert!(!handle.is_connected());
    }

    #[test]
    fn open_tag_maps_names_and_skips_handlers() {
        let mut props = props! { "className" => "a b", "htmlFor" => "x", "disabled" => true, "hidden" => false };
        props.insert("onClick".into(), crate::element::Function::noop().into());
        let mut out = String::new();
        write_open_tag("label", &props, &mut out);
        assert_eq!(out, r#"<label class="a b" disabled="" for="x">"#);
    }

    #[test]
    fn void_elements_self_close() {
        let mut out = String::new();
        write_open_tag("br", &Props::new(), &mut out);
        write_close_tag("br", &mut out);
        assert_eq!(out, "<br/>");
    }

    #[test]
    fn style_objects_serialize_inline() {
        let mut style = std::collections::BTreeMap::new();
        style.insert("fontSize".to_string(), PropValue::from(12));
        let mut props = Props::new();
        props.insert("style".into(), PropValue::Object(style));
        let mut out = String::new();
        write_open_tag("p", &props, &mut out);
        assert_eq!(out, r#"<p style="font-size:12">"#);
    }
}
