//! The contract between wrappers and a rendering host.
//!
//! An [`Adapter`] hands out [`Renderer`]s for the three render modes and
//! translates between unrendered elements and render-tree nodes. Wrappers
//! only ever see [`RstNode`]s, so any host that can produce them plugs in.

pub mod reference;

use std::rc::Rc;

use crate::config::RenderOptions;
use crate::element::{Context, Element, ElementType, Function, PropValue, Props};
use crate::error::Result;
use crate::host::HostNodeHandle;
use crate::rst::{InstanceRef, NodeType, Rendered, RstNode, Tree};
use crate::traverse::children_of_node;

pub use reference::{Environment, ReferenceAdapter};

/// How deep a renderer goes and what it produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RenderMode {
    /// Full depth, attached to a document.
    Mount,
    /// One level deep; children stay unrendered.
    Shallow,
    /// Static markup only.
    String,
}

impl RenderMode {
    /// Prefix used in wrapper error messages.
    pub fn wrapper_name(&self) -> &'static str {
        match self {
            RenderMode::Mount => "MountWrapper",
            RenderMode::Shallow => "ShallowWrapper",
            RenderMode::String => "StringWrapper",
        }
    }
}

/// Capabilities an adapter advertises.
#[derive(Debug, Clone, PartialEq)]
pub struct AdapterOptions {
    pub modes: Vec<RenderMode>,
}

pub trait Adapter: Send + Sync {
    fn name(&self) -> &str;

    fn options(&self) -> AdapterOptions;

    fn create_renderer(&self, mode: RenderMode, options: &RenderOptions) -> Result<Box<dyn Renderer>>;

    /// Unrendered element to render-tree node; children stay as described.
    fn element_to_node(&self, element: &Element) -> Rc<RstNode> {
        element_to_tree(element)
    }

    fn node_to_element(&self, node: &RstNode) -> Element {
        let mut element = Element::new(node.ty.clone()).with_props(node.props.clone());
        element.key = node.key.clone();
        element.ref_ = node.ref_.clone();
        element
    }

    fn is_valid_element(&self, value: &PropValue) -> bool {
        matches!(value, PropValue::Element(_))
    }

    fn create_element(&self, ty: ElementType, props: Props, children: Vec<PropValue>) -> Element {
        children
            .into_iter()
            .fold(Element::new(ty).with_props(props), |el, child| el.child(child))
    }

    fn display_name_of_node(&self, node: &RstNode) -> Option<String> {
        node.ty.display_name()
    }

    fn is_valid_element_type(&self, ty: &ElementType) -> bool {
        !matches!(ty, ElementType::Host(tag) if tag.is_empty())
    }

    fn is_custom_component(&self, ty: &ElementType) -> bool {
        ty.is_composite()
    }

    fn is_fragment(&self, node: &RstNode) -> bool {
        node.node_type == NodeType::Fragment
    }

    /// First host node at or beneath `node`.
    fn node_to_host_node(&self, node: &RstNode) -> Option<HostNodeHandle> {
        first_host_instance(node)
    }

    fn is_focused(&self, node: &RstNode) -> Result<bool> {
        Ok(self
            .node_to_host_node(node)
            .is_some_and(|host| host.is_focused()))
    }

    fn wrap_with_wrapping_component(&self, element: &Element, options: &RenderOptions) -> Element {
        wrap_with_wrapping_component(element, options)
    }
}

/// A live render root for one mode.
pub trait Renderer {
    fn render(&self, element: &Element, context: &Context, callback: Option<&Function>) -> Result<()>;

    fn unmount(&self) -> Result<()>;

    /// Current root node; `None` before the first render and after unmount.
    fn get_node(&self) -> Result<Option<Tree>>;

    fn simulate_event(&self, node: &RstNode, event: &str, args: &[PropValue]) -> Result<()>;

    /// Run `f` with state updates deferred until it returns.
    fn batched_updates(&self, f: &mut dyn FnMut() -> Result<()>) -> Result<()> {
        f()
    }

    fn markup(&self) -> Result<Option<String>> {
        Ok(None)
    }

    /// Node of the wrapping component, when one was configured.
    fn wrapping_node(&self) -> Result<Option<Tree>> {
        Ok(None)
    }
}

pub fn wrap_with_wrapping_component(element: &Element, options: &RenderOptions) -> Element {
    match &options.wrapping_component {
        Some(ty) => Element::new(ty.clone())
            .with_props(options.wrapping_component_props.clone())
            .child(element.clone()),
        None => element.clone(),
    }
}

pub(crate) fn first_host_instance(node: &RstNode) -> Option<HostNodeHandle> {
    if let Some(InstanceRef::Host(host)) = &node.instance {
        return Some(host.clone());
    }
    children_of_node(node)
        .iter()
        .filter_map(Tree::as_node)
        .find_map(|child| first_host_instance(child))
}

/// Convert an unrendered element into a node whose `rendered` mirrors its children prop.
pub fn element_to_tree(element: &Element) -> Rc<RstNode> {
    Rc::new(RstNode {
        node_type: NodeType::from_type(&element.ty),
        ty: element.ty.clone(),
        props: element.props.clone(),
        key: element.key.clone(),
        ref_: element.ref_.clone(),
        instance: None,
        rendered: rendered_from_value(element.children_prop()),
    })
}

/// Sequences flatten fully and drop holes; a lone value becomes a single entry.
pub fn rendered_from_value(value: &PropValue) -> Rendered {
    match value {
        PropValue::List(_) | PropValue::Map(_) => {
            let mut out = Vec::new();
            flatten_values(value, &mut out);
            Rendered::Many(out)
        }
        other => match value_to_tree(other) {
            Some(tree) => Rendered::One(tree),
            None => Rendered::Nothing,
        },
    }
}

fn flatten_values(value: &PropValue, out: &mut Vec<Tree>) {
    match value {
        PropValue::List(items) => items.iter().for_each(|v| flatten_values(v, out)),
        PropValue::Map(entries) => entries.iter().for_each(|(_, v)| flatten_values(v, out)),
        other => out.extend(value_to_tree(other)),
    }
}

fn value_to_tree(value: &PropValue) -> Option<Tree> {
    match value {
        PropValue::Element(e) => Some(Tree::Node(element_to_tree(e))),
        PropValue::String(s) => Some(Tree::Text(s.clone())),
        PropValue::Number(n) => Some(Tree::Number(*n)),
        _ => None,
    }
}

const NATIVE_TO_SYNTHETIC: &[(&str, &str)] = &[
    ("animationend", "animationEnd"),
    ("animationiteration", "animationIteration"),
    ("animationstart", "animationStart"),
    ("beforeinput", "beforeInput"),
    ("canplay", "canPlay"),
    ("canplaythrough", "canPlayThrough"),
    ("compositionend", "compositionEnd"),
    ("compositionstart", "compositionStart"),
    ("compositionupdate", "compositionUpdate"),
    ("contextmenu", "contextMenu"),
    ("dblclick", "doubleClick"),
    ("doubleclick", "doubleClick"),
    ("dragend", "dragEnd"),
    ("dragenter", "dragEnter"),
    ("dragexit", "dragExit"),
    ("dragleave", "dragLeave"),
    ("dragover", "dragOver"),
    ("dragstart", "dragStart"),
    ("durationchange", "durationChange"),
    ("gotpointercapture", "gotPointerCapture"),
    ("keydown", "keyDown"),
    ("keypress", "keyPress"),
    ("keyup", "keyUp"),
    ("loadeddata", "loadedData"),
    ("loadedmetadata", "loadedMetadata"),
    ("loadstart", "loadStart"),
    ("lostpointercapture", "lostPointerCapture"),
    ("mousedown", "mouseDown"),
    ("mouseenter", "mouseEnter"),
    ("mouseleave", "mouseLeave"),
    ("mousemove", "mouseMove"),
    ("mouseout", "mouseOut"),
    ("mouseover", "mouseOver"),
    ("mouseup", "mouseUp"),
    ("pointercancel", "pointerCancel"),
    ("pointerdown", "pointerDown"),
    ("pointerenter", "pointerEnter"),
    ("pointerleave", "pointerLeave"),
    ("pointermove", "pointerMove"),
    ("pointerout", "pointerOut"),
    ("pointerover", "pointerOver"),
    ("pointerup", "pointerUp"),
    ("ratechange", "rateChange"),
    ("timeupdate", "timeUpdate"),
    ("touchcancel", "touchCancel"),
    ("touchend", "touchEnd"),
    ("touchmove", "touchMove"),
    ("touchstart", "touchStart"),
    ("transitionend", "transitionEnd"),
    ("volumechange", "volumeChange"),
];

const SYNTHETIC_EVENTS: &[&str] = &[
    "abort", "animationEnd", "animationIteration", "animationStart", "beforeInput", "blur",
    "canPlay", "canPlayThrough", "change", "click", "compositionEnd", "compositionStart",
    "compositionUpdate", "contextMenu", "copy", "cut", "doubleClick", "drag", "dragEnd",
    "dragEnter", "dragExit", "dragLeave", "dragOver", "dragStart", "drop", "durationChange",
    "emptied", "encrypted", "ended", "error", "focus", "gotPointerCapture", "input", "invalid",
    "keyDown", "keyPress", "keyUp", "load", "loadStart", "loadedData", "loadedMetadata",
    "lostPointerCapture", "mouseDown", "mouseEnter", "mouseLeave", "mouseMove", "mouseOut",
    "mouseOver", "mouseUp", "paste", "pause", "play", "playing", "pointerCancel", "pointerDown",
    "pointerEnter", "pointerLeave", "pointerMove", "pointerOut", "pointerOver", "pointerUp",
    "progress", "rateChange", "reset", "scroll", "seeked", "seeking", "select", "stalled",
    "submit", "suspend", "timeUpdate", "toggle", "touchCancel", "touchEnd", "touchMove",
    "touchStart", "transitionEnd", "volumeChange", "waiting", "wheel",
];

/// Map a lowercase native event name to its synthetic spelling.
pub fn map_native_event_name(event: &str) -> &str {
    NATIVE_TO_SYNTHETIC
        .iter()
        .find(|(native, _)| *native == event)
        .map(|(_, synthetic)| *synthetic)
        .unwrap_or(event)
}

/// `click` -> `onClick`.
pub fn prop_from_event(event: &str) -> String {
    let mut chars = event.chars();
    match chars.next() {
        Some(first) => format!("on{}{}", first.to_ascii_uppercase(), chars.as_str()),
        None => "on".to_string(),
    }
}

pub fn is_known_event(event: &str) -> bool {
    SYNTHETIC_EVENTS.contains(&event)
}

/// Argument handed to handlers when a simulation supplies none.
pub(crate) fn synthetic_event(event: &str) -> PropValue {
    let mut object = Props::new();
    object.insert("type".into(), event.into());
    object.insert("preventDefault".into(), Function::noop().into());
    object.insert("stopPropagation".into(), Function::noop().into());
    PropValue::Object(object)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn native_names_map_to_synthetic() {
        assert_eq!(map_native_event_name("mouseenter"), "mouseEnter");
        assert_eq!(map_native_event_name("dblclick"), "doubleClick");
        assert_eq!(map_native_event_name("click"), "click");
        assert_eq!(prop_from_event("mouseEnter"), "onMouseEnter");
    }

    #[test]
    fn known_events() {
        assert!(is_known_event("click"));
        assert!(is_known_event("keyDown"));
        assert!(!is_known_event("foo"));
    }

    #[test]
    fn element_to_tree_flattens_children_and_drops_holes() {
        let el = Element::host("ul")
            .child(vec![Element::host("li"), Element::host("li")])
            .child(PropValue::Null)
            .child("tail");
        let node = element_to_tree(&el);
        match &node.rendered {
            Rendered::Many(items) => {
                assert_eq!(items.len(), 3);
                assert!(matches!(&items[2], Tree::Text(t) if t == "tail"));
            }
            other => panic!("expected many, got {other:?}"),
        }
    }

    #[test]
    fn element_to_tree_single_child_and_no_children() {
        let node = element_to_tree(&Element::host("b").child("x"));
        assert!(matches!(&node.rendered, Rendered::One(Tree::Text(t)) if t == "x"));
        let empty = element_to_tree(&Element::host("br"));
        assert!(empty.rendered.is_nothing());
    }

    #[test]
    fn default_element_helpers() {
        let adapter = ReferenceAdapter::new();
        let el = adapter.create_element(
            ElementType::Host("ul".into()),
            crate::props! { "id" => "list" },
            vec![Element::host("li").into(), "text".into()],
        );
        assert!(adapter.is_valid_element(&el.clone().into()));
        assert!(!adapter.is_valid_element(&PropValue::from("ul")));

        let node = adapter.element_to_node(&el);
        assert!(!adapter.is_fragment(&node));
        assert!(adapter.is_fragment(&adapter.element_to_node(&Element::fragment())));
        let back = adapter.node_to_element(&node);
        assert_eq!(back.ty, el.ty);
        assert_eq!(back.props, el.props);
        assert!(!adapter.is_valid_element_type(&ElementType::Host(String::new())));
    }

    #[test]
    fn wrapping_component_wraps_the_root() {
        let options = RenderOptions::default().wrapping_component(
            ElementType::Host("section".into()),
            crate::props! { "id" => "wrap" },
        );
        let wrapped = wrap_with_wrapping_component(&Element::host("p"), &options);
        assert_eq!(wrapped.ty.display_name().as_deref(), Some("section"));
        assert!(wrapped.children_prop().as_element().is_some());
    }
}
