use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

use serde::Serialize;

use crate::element::{format_number, ElementType, PropValue, Props, RefValue};
use crate::host::{HostNodeHandle, InstanceHandle};

/// Kind of a render-tree node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeType {
    Host,
    Class,
    Function,
    Fragment,
    Portal,
}

impl NodeType {
    pub fn from_type(ty: &ElementType) -> Self {
        match ty {
            ElementType::Host(_) => NodeType::Host,
            ElementType::Class(_) => NodeType::Class,
            ElementType::Fragment => NodeType::Fragment,
            ElementType::Portal => NodeType::Portal,
            _ => NodeType::Function,
        }
    }
}

impl fmt::Display for NodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            NodeType::Host => "host",
            NodeType::Class => "class",
            NodeType::Function => "function",
            NodeType::Fragment => "fragment",
            NodeType::Portal => "portal",
        };
        write!(f, "{name}")
    }
}

/// Backing instance of a node. Present for host and class nodes only.
#[derive(Clone)]
pub enum InstanceRef {
    Class(InstanceHandle),
    Host(HostNodeHandle),
}

impl InstanceRef {
    pub fn as_class(&self) -> Option<&InstanceHandle> {
        match self {
            InstanceRef::Class(h) => Some(h),
            InstanceRef::Host(_) => None,
        }
    }

    pub fn as_host(&self) -> Option<&HostNodeHandle> {
        match self {
            InstanceRef::Host(h) => Some(h),
            InstanceRef::Class(_) => None,
        }
    }
}

impl PartialEq for InstanceRef {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (InstanceRef::Class(a), InstanceRef::Class(b)) => a.ptr_eq(b),
            (InstanceRef::Host(a), InstanceRef::Host(b)) => a.ptr_eq(b),
            _ => false,
        }
    }
}

impl fmt::Debug for InstanceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InstanceRef::Class(_) => write!(f, "InstanceRef::Class"),
            InstanceRef::Host(h) => write!(f, "InstanceRef::Host({})", h.tag()),
        }
    }
}

/// A render-tree entry: a node, or a text/number leaf.
#[derive(Clone)]
pub enum Tree {
    Node(Rc<RstNode>),
    Text(String),
    Number(f64),
}

impl Tree {
    pub fn as_node(&self) -> Option<&Rc<RstNode>> {
        match self {
            Tree::Node(n) => Some(n),
            _ => None,
        }
    }
}

impl fmt::Debug for Tree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Tree::Node(n) => write!(f, "{n:?}"),
            Tree::Text(s) => write!(f, "{s:?}"),
            Tree::Number(n) => write!(f, "{}", format_number(*n)),
        }
    }
}

/// What a node rendered: nothing, one entry or a sequence.
#[derive(Clone, Debug, Default)]
pub enum Rendered {
    #[default]
    Nothing,
    One(Tree),
    Many(Vec<Tree>),
}

impl Rendered {
    pub fn is_nothing(&self) -> bool {
        match self {
            Rendered::Nothing => true,
            Rendered::Many(items) => items.is_empty(),
            Rendered::One(_) => false,
        }
    }

    pub fn to_vec(&self) -> Vec<Tree> {
        match self {
            Rendered::Nothing => Vec::new(),
            Rendered::One(t) => vec![t.clone()],
            Rendered::Many(items) => items.clone(),
        }
    }
}

/// A node of the Rendered Structure Tree. Nodes are immutable snapshots;
/// a re-render produces fresh nodes.
#[derive(Clone)]
pub struct RstNode {
    pub node_type: NodeType,
    pub ty: ElementType,
    pub props: Props,
    pub key: Option<String>,
    pub ref_: Option<RefValue>,
    pub instance: Option<InstanceRef>,
    pub rendered: Rendered,
}

impl RstNode {
    pub fn host_tag(&self) -> Option<&str> {
        match &self.ty {
            ElementType::Host(tag) => Some(tag),
            _ => None,
        }
    }

    pub fn prop(&self, name: &str) -> Option<&PropValue> {
        self.props.get(name)
    }
}

impl fmt::Debug for RstNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RstNode")
            .field("node_type", &self.node_type)
            .field("type", &self.ty)
            .field("key", &self.key)
            .field("rendered", &self.rendered)
            .finish()
    }
}

/// JSON-friendly projection of a render tree.
#[derive(Debug, Clone, Serialize)]
pub struct SerializedNode {
    pub node_type: NodeType,
    #[serde(rename = "type")]
    pub type_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub props: BTreeMap<String, serde_json::Value>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub rendered: Vec<SerializedTree>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum SerializedTree {
    Node(SerializedNode),
    Text(String),
    Number(f64),
}

impl SerializedNode {
    pub fn from_node(node: &RstNode) -> Self {
        let props = node
            .props
            .iter()
            .filter(|(k, v)| k.as_str() != "children" && !v.is_undefined())
            .map(|(k, v)| (k.clone(), prop_to_json(v)))
            .collect();
        Self {
            node_type: node.node_type,
            type_name: node
                .ty
                .display_name()
                .unwrap_or_else(|| "Component".into()),
            key: node.key.clone(),
            props,
            rendered: crate::traverse::children_of_node(node)
                .iter()
                .map(SerializedTree::from_tree)
                .collect(),
        }
    }
}

impl SerializedTree {
    pub fn from_tree(tree: &Tree) -> Self {
        match tree {
            Tree::Node(n) => SerializedTree::Node(SerializedNode::from_node(n)),
            Tree::Text(s) => SerializedTree::Text(s.clone()),
            Tree::Number(n) => SerializedTree::Number(*n),
        }
    }
}

/// Functions and elements have no JSON form; they serialize as markers.
pub fn prop_to_json(value: &PropValue) -> serde_json::Value {
    use serde_json::Value;
    match value {
        PropValue::Undefined | PropValue::Null => Value::Null,
        PropValue::Bool(b) => Value::Bool(*b),
        PropValue::Number(n) => serde_json::Number::from_f64(*n)
            .map(Value::Number)
            .unwrap_or_else(|| Value::String(format_number(*n))),
        PropValue::String(s) => Value::String(s.clone()),
        PropValue::Function(_) => Value::String("[Function]".into()),
        PropValue::Element(e) => Value::String(format!("{e:?}")),
        PropValue::List(items) => Value::Array(items.iter().map(prop_to_json).collect()),
        PropValue::Map(entries) => Value::Array(entries.iter().map(|(_, v)| prop_to_json(v)).collect()),
        PropValue::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), prop_to_json(v)))
                .collect(),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::element::Element;

    fn host(tag: &str, props: Props, rendered: Rendered) -> Rc<RstNode> {
        Rc::new(RstNode {
            node_type: NodeType::Host,
            ty: Element::host(tag).ty,
            props,
            key: None,
            ref_: None,
            instance: None,
            rendered,
        })
    }

    #[test]
    fn node_type_from_element_type() {
        assert_eq!(NodeType::from_type(&ElementType::Host("div".into())), NodeType::Host);
        assert_eq!(NodeType::from_type(&ElementType::Fragment), NodeType::Fragment);
        assert_eq!(NodeType::Class.to_string(), "class");
    }

    #[test]
    fn rendered_nothing_and_empty_many_are_empty() {
        assert!(Rendered::Nothing.is_nothing());
        assert!(Rendered::Many(vec![]).is_nothing());
        assert!(!Rendered::One(Tree::Text("x".into())).is_nothing());
    }

    #[test]
    fn serialized_node_omits_children_and_functions_become_markers() {
        let mut props = Props::new();
        props.insert("id".into(), "a".into());
        props.insert("onClick".into(), crate::element::Function::noop().into());
        props.insert("children".into(), "hi".into());
        let node = host("div", props, Rendered::One(Tree::Text("hi".into())));

        let json = serde_json::to_value(SerializedNode::from_node(&node)).unwrap();
        assert_eq!(json["type"], "div");
        assert_eq!(json["node_type"], "host");
        assert_eq!(json["props"]["id"], "a");
        assert_eq!(json["props"]["onClick"], "[Function]");
        assert!(json["props"].get("children").is_none());
        assert_eq!(json["rendered"][0], "hi");
    }

    #[test]
    fn non_finite_numbers_serialize_as_strings() {
        assert_eq!(prop_to_json(&PropValue::Number(f64::NAN)), serde_json::json!("NaN"));
        assert_eq!(prop_to_json(&PropValue::Number(2.0)), serde_json::json!(2.0));
    }
}
