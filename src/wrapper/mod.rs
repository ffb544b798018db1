//! The query and mutation facade returned by [`mount`] and [`shallow`].
//!
//! A [`Wrapper`] holds zero or more render-tree nodes and a shared handle
//! to the root that performed the render. Only the root owns a renderer;
//! wrappers produced by queries are snapshots and share the root's handle.
//! The root caches the tree it last read from the renderer so node identity
//! is stable between queries. Wrapper mutations refresh the cache; changes
//! made behind the wrapper's back (a handle's `set_state`) show up after
//! [`Wrapper::update`].

mod string;

use std::cell::{Cell, RefCell};
use std::collections::HashSet;
use std::fmt;
use std::rc::Rc;
use std::sync::Arc;

use tracing::{debug, warn};

pub use string::StringWrapper;

use crate::adapter::{Adapter, RenderMode, Renderer};
use crate::config::{adapter_for, RenderOptions};
use crate::debug::{debug_nodes, DebugOptions};
use crate::element::{format_number, Context, Element, ElementType, Function, PropValue, Props, State};
use crate::error::{Error, Result};
use crate::host::{write_close_tag, write_open_tag, write_text, HostNodeHandle, InstanceHandle};
use crate::rst::{InstanceRef, RstNode, Tree};
use crate::selector::{reduce_trees_by_selector, MatchContext, Predicate, Query};
use crate::traverse::{
    child_nodes, children_of_node, contains_children_sub_array, find_nodes, find_parent_node,
    get_text_from_host_nodes, get_text_from_node, has_class_name, node_equal, node_matches,
    parents_of_node, ClassMatcher,
};

/// Full-depth render into the document.
pub fn mount(element: &Element, options: RenderOptions) -> Result<Wrapper> {
    Wrapper::create(RenderMode::Mount, element, options)
}

/// One-level render; child components stay unrendered.
pub fn shallow(element: &Element, options: RenderOptions) -> Result<Wrapper> {
    Wrapper::create(RenderMode::Shallow, element, options)
}

/// Static markup render.
pub fn render(element: &Element, options: RenderOptions) -> Result<StringWrapper> {
    let adapter = adapter_for(&options)?;
    check_mode(adapter.as_ref(), RenderMode::String)?;
    let renderer = adapter.create_renderer(RenderMode::String, &options)?;
    renderer.render(element, &options.context_or_default(), None)?;
    let markup = renderer.markup()?.unwrap_or_default();
    debug!(markup_len = markup.len(), "rendered to string");
    Ok(StringWrapper::from_markup(markup))
}

fn check_mode(adapter: &dyn Adapter, mode: RenderMode) -> Result<()> {
    if adapter.options().modes.contains(&mode) {
        Ok(())
    } else {
        Err(Error::Config(format!(
            "adapter \"{}\" does not support {mode:?} rendering",
            adapter.name()
        )))
    }
}

/// What a `contains` check looks for: one element, or a run of sibling elements.
#[derive(Debug, Clone, Copy)]
pub enum Contained<'a> {
    One(&'a Element),
    Run(&'a [Element]),
}

impl<'a> From<&'a Element> for Contained<'a> {
    fn from(element: &'a Element) -> Self {
        Contained::One(element)
    }
}

impl<'a> From<&'a [Element]> for Contained<'a> {
    fn from(elements: &'a [Element]) -> Self {
        Contained::Run(elements)
    }
}

impl<'a> From<&'a Vec<Element>> for Contained<'a> {
    fn from(elements: &'a Vec<Element>) -> Self {
        Contained::Run(elements)
    }
}

/// State owned by the wrapper that performed the render.
struct RootState {
    mode: RenderMode,
    adapter: Arc<dyn Adapter>,
    renderer: Box<dyn Renderer>,
    element: RefCell<Element>,
    context: RefCell<Context>,
    options: RenderOptions,
    tree: RefCell<Option<Tree>>,
    unmounted: Cell<bool>,
}

impl RootState {
    fn refresh(&self) -> Result<()> {
        let tree = self.renderer.get_node()?;
        *self.tree.borrow_mut() = tree;
        Ok(())
    }

    fn tree_root(&self) -> Option<Rc<RstNode>> {
        self.tree.borrow().as_ref().and_then(Tree::as_node).cloned()
    }

    /// The root wrapper's entries. A shallow render of a component shows what
    /// the component rendered, not the component itself.
    fn root_trees(&self) -> Vec<Tree> {
        let Some(node) = self.tree_root() else {
            return Vec::new();
        };
        if self.mode == RenderMode::Shallow && !node.ty.is_host() {
            children_of_node(&node)
        } else {
            vec![Tree::Node(node)]
        }
    }

    fn root_nodes(&self) -> Vec<Rc<RstNode>> {
        self.root_trees()
            .into_iter()
            .filter_map(|t| match t {
                Tree::Node(n) => Some(n),
                _ => None,
            })
            .collect()
    }
}

/// Zero or more selected nodes of one render.
#[derive(Clone)]
pub struct Wrapper {
    root: Rc<RootState>,
    nodes: Vec<Rc<RstNode>>,
    is_root: bool,
}

impl fmt::Debug for Wrapper {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct(self.root.mode.wrapper_name())
            .field("len", &self.len())
            .field("is_root", &self.is_root)
            .finish()
    }
}

fn unique(nodes: impl IntoIterator<Item = Rc<RstNode>>) -> Vec<Rc<RstNode>> {
    let mut seen = HashSet::new();
    nodes
        .into_iter()
        .filter(|n| seen.insert(Rc::as_ptr(n)))
        .collect()
}

fn write_markup(tree: &Tree, out: &mut String) {
    match tree {
        Tree::Text(text) => write_text(text, out),
        Tree::Number(n) => write_text(&format_number(*n), out),
        Tree::Node(node) => match &node.ty {
            ElementType::Host(tag) => {
                write_open_tag(tag, &node.props, out);
                for child in children_of_node(node) {
                    write_markup(&child, out);
                }
                write_close_tag(tag, out);
            }
            _ => {
                for child in children_of_node(node) {
                    write_markup(&child, out);
                }
            }
        },
    }
}

impl Wrapper {
    fn create(mode: RenderMode, element: &Element, mut options: RenderOptions) -> Result<Self> {
        let adapter = adapter_for(&options)?;
        check_mode(adapter.as_ref(), mode)?;
        if !adapter.is_valid_element_type(&element.ty) {
            return Err(Error::Type(format!(
                "{}: expected a valid element type, got {:?}",
                mode.wrapper_name(),
                element.ty
            )));
        }
        options.adapter = Some(Arc::clone(&adapter));
        let renderer = adapter.create_renderer(mode, &options)?;
        let context = options.context_or_default();
        debug!(
            ?mode,
            root = %element.ty.display_name().unwrap_or_default(),
            adapter = adapter.name(),
            "rendering"
        );
        renderer.render(element, &context, None)?;

        let root = Rc::new(RootState {
            mode,
            adapter,
            renderer,
            element: RefCell::new(element.clone()),
            context: RefCell::new(context),
            options,
            tree: RefCell::new(None),
            unmounted: Cell::new(false),
        });
        root.refresh()?;
        Ok(Wrapper {
            nodes: root.root_nodes(),
            root,
            is_root: true,
        })
    }

    fn wrap(&self, nodes: Vec<Rc<RstNode>>) -> Wrapper {
        Wrapper {
            root: Rc::clone(&self.root),
            nodes,
            is_root: false,
        }
    }

    fn name_of(&self) -> &'static str {
        self.root.mode.wrapper_name()
    }

    fn nodes(&self) -> Vec<Rc<RstNode>> {
        if self.is_root {
            self.root.root_nodes()
        } else {
            self.nodes.clone()
        }
    }

    fn single(&self, method: &str) -> Result<Rc<RstNode>> {
        let mut nodes = self.nodes();
        if nodes.len() != 1 {
            return Err(Error::Cardinality {
                method: method.to_string(),
                found: nodes.len(),
            });
        }
        nodes.pop().ok_or_else(|| Error::internal("single node vanished"))
    }

    fn root_only(&self, method: &'static str) -> Result<()> {
        if self.is_root {
            Ok(())
        } else {
            Err(Error::RootOnly {
                wrapper: self.name_of(),
                method,
            })
        }
    }

    fn live_root(&self, method: &'static str) -> Result<Rc<RstNode>> {
        self.root.tree_root().ok_or_else(|| {
            Error::Unmounted(format!(
                "{}::{method}() was called after the root was unmounted",
                self.name_of()
            ))
        })
    }

    fn adapter(&self) -> &dyn Adapter {
        self.root.adapter.as_ref()
    }

    fn match_all(&self, predicate: &Predicate, nodes: Vec<Rc<RstNode>>, keep: bool) -> Result<Vec<Rc<RstNode>>> {
        let Some(tree_root) = self.root.tree_root() else {
            return Ok(Vec::new());
        };
        let cx = MatchContext::new(&tree_root, self.adapter());
        let mut out = Vec::new();
        for node in nodes {
            if predicate.matches(&node, &cx)? == keep {
                out.push(node);
            }
        }
        Ok(out)
    }

    /// Every node in the wrapped subtrees, roots included, in tree order.
    fn subtree_nodes(&self) -> Vec<Rc<RstNode>> {
        let mut out = Vec::new();
        for node in self.nodes() {
            let found: std::result::Result<Vec<_>, std::convert::Infallible> =
                find_nodes(&node, &mut |_| Ok(true));
            out.extend(found.unwrap_or_default());
        }
        unique(out)
    }

    fn callback_arg(&self, method: &str, value: PropValue) -> Result<Option<Function>> {
        match value {
            PropValue::Function(f) => Ok(Some(f)),
            other if !other.is_truthy() => Ok(None),
            _ => Err(Error::Type(format!(
                "{}::{method}() expects a function as its second argument",
                self.name_of()
            ))),
        }
    }

    // ── Size and access ──

    pub fn len(&self) -> usize {
        self.nodes().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn exists(&self) -> bool {
        !self.is_empty()
    }

    pub fn is_root(&self) -> bool {
        self.is_root
    }

    pub fn mode(&self) -> RenderMode {
        self.root.mode
    }

    /// Wrapper over the node at `index`; empty when out of range.
    pub fn at(&self, index: usize) -> Wrapper {
        self.wrap(self.nodes().get(index).cloned().into_iter().collect())
    }

    pub fn first(&self) -> Wrapper {
        self.at(0)
    }

    pub fn last(&self) -> Wrapper {
        let nodes = self.nodes();
        self.wrap(nodes.last().cloned().into_iter().collect())
    }

    pub fn slice(&self, start: usize, end: usize) -> Wrapper {
        let nodes = self.nodes();
        let end = end.min(nodes.len());
        let start = start.min(end);
        self.wrap(nodes[start..end].to_vec())
    }

    pub fn get_node(&self) -> Result<Rc<RstNode>> {
        self.single("get_node")
    }

    pub fn get_nodes(&self) -> Vec<Rc<RstNode>> {
        self.nodes()
    }

    pub fn get_element(&self) -> Result<Element> {
        let node = self.single("get_element")?;
        Ok(self.adapter().node_to_element(&node))
    }

    pub fn get_elements(&self) -> Vec<Element> {
        self.nodes()
            .iter()
            .map(|n| self.adapter().node_to_element(n))
            .collect()
    }

    /// Element of the node at `index`, if any.
    pub fn get(&self, index: usize) -> Option<Element> {
        self.nodes()
            .get(index)
            .map(|n| self.adapter().node_to_element(n))
    }

    pub fn root(&self) -> Wrapper {
        Wrapper {
            root: Rc::clone(&self.root),
            nodes: self.root.root_nodes(),
            is_root: true,
        }
    }

    // ── Queries ──

    /// Nodes in the wrapped subtrees matching `query`, each root included.
    pub fn find<'q>(&self, query: impl Into<Query<'q>>) -> Result<Wrapper> {
        let query = query.into();
        let found = reduce_trees_by_selector(&query, &self.nodes(), self.adapter())?;
        Ok(self.wrap(found))
    }

    pub fn find_where(&self, predicate: impl Fn(&Wrapper) -> bool) -> Wrapper {
        let found = self
            .subtree_nodes()
            .into_iter()
            .filter(|n| predicate(&self.wrap(vec![Rc::clone(n)])))
            .collect();
        self.wrap(found)
    }

    /// Keep the wrapped nodes matching a simple selector. Never descends.
    pub fn filter<'q>(&self, query: impl Into<Query<'q>>) -> Result<Wrapper> {
        let predicate = Predicate::simple(&query.into())?;
        Ok(self.wrap(self.match_all(&predicate, self.nodes(), true)?))
    }

    pub fn filter_where(&self, predicate: impl Fn(&Wrapper) -> bool) -> Wrapper {
        let kept = self
            .nodes()
            .into_iter()
            .filter(|n| predicate(&self.wrap(vec![Rc::clone(n)])))
            .collect();
        self.wrap(kept)
    }

    /// Complement of [`Wrapper::filter`].
    pub fn not<'q>(&self, query: impl Into<Query<'q>>) -> Result<Wrapper> {
        let predicate = Predicate::simple(&query.into())?;
        Ok(self.wrap(self.match_all(&predicate, self.nodes(), false)?))
    }

    pub fn is<'q>(&self, query: impl Into<Query<'q>>) -> Result<bool> {
        let node = self.single("is")?;
        let predicate = Predicate::simple(&query.into())?;
        Ok(!self.match_all(&predicate, vec![node], true)?.is_empty())
    }

    pub fn every<'q>(&self, query: impl Into<Query<'q>>) -> Result<bool> {
        let predicate = Predicate::simple(&query.into())?;
        let nodes = self.nodes();
        let total = nodes.len();
        Ok(self.match_all(&predicate, nodes, true)?.len() == total)
    }

    pub fn every_where(&self, predicate: impl Fn(&Wrapper) -> bool) -> bool {
        self.nodes()
            .into_iter()
            .all(|n| predicate(&self.wrap(vec![n])))
    }

    pub fn some<'q>(&self, query: impl Into<Query<'q>>) -> Result<bool> {
        if self.is_root {
            return Err(Error::Type(format!("{}::some() can not be called on the root", self.name_of())));
        }
        let predicate = Predicate::simple(&query.into())?;
        Ok(!self.match_all(&predicate, self.nodes(), true)?.is_empty())
    }

    pub fn some_where(&self, predicate: impl Fn(&Wrapper) -> bool) -> bool {
        self.nodes()
            .into_iter()
            .any(|n| predicate(&self.wrap(vec![n])))
    }

    // ── Traversal ──

    pub fn children(&self) -> Wrapper {
        self.wrap(unique(self.nodes().iter().flat_map(|n| child_nodes(n))))
    }

    pub fn children_matching<'q>(&self, query: impl Into<Query<'q>>) -> Result<Wrapper> {
        self.children().filter(query)
    }

    pub fn child_at(&self, index: usize) -> Wrapper {
        self.children().at(index)
    }

    pub fn parent(&self) -> Wrapper {
        let Some(tree_root) = self.root.tree_root() else {
            return self.wrap(Vec::new());
        };
        self.wrap(unique(
            self.nodes()
                .iter()
                .filter_map(|n| find_parent_node(&tree_root, n)),
        ))
    }

    /// Ancestors of the single wrapped node, nearest first.
    pub fn parents(&self) -> Result<Wrapper> {
        let node = self.single("parents")?;
        let ancestors = match self.root.tree_root() {
            Some(tree_root) => parents_of_node(&node, &tree_root),
            None => Vec::new(),
        };
        Ok(self.wrap(ancestors))
    }

    pub fn parents_matching<'q>(&self, query: impl Into<Query<'q>>) -> Result<Wrapper> {
        self.parents()?.filter(query)
    }

    /// The node itself when it matches, else its nearest matching ancestor.
    pub fn closest<'q>(&self, query: impl Into<Query<'q>>) -> Result<Wrapper> {
        let query = query.into();
        if self.is(query.clone())? {
            return Ok(self.wrap(self.nodes()));
        }
        Ok(self.parents()?.filter(query)?.first())
    }

    pub fn for_each(&self, mut f: impl FnMut(&Wrapper, usize)) -> &Self {
        for (i, node) in self.nodes().into_iter().enumerate() {
            f(&self.wrap(vec![node]), i);
        }
        self
    }

    pub fn map<T>(&self, mut f: impl FnMut(&Wrapper, usize) -> T) -> Vec<T> {
        self.nodes()
            .into_iter()
            .enumerate()
            .map(|(i, node)| f(&self.wrap(vec![node]), i))
            .collect()
    }

    pub fn reduce<T>(&self, mut f: impl FnMut(T, &Wrapper, usize) -> T, initial: T) -> T {
        self.nodes()
            .into_iter()
            .enumerate()
            .fold(initial, |acc, (i, node)| f(acc, &self.wrap(vec![node]), i))
    }

    pub fn flat_map(&self, mut f: impl FnMut(&Wrapper, usize) -> Wrapper) -> Wrapper {
        let nodes = self
            .nodes()
            .into_iter()
            .enumerate()
            .flat_map(|(i, node)| f(&self.wrap(vec![node]), i).nodes());
        self.wrap(unique(nodes))
    }

    // ── Predicates ──

    pub fn has_class(&self, matcher: impl Into<ClassMatcher>) -> Result<bool> {
        let node = self.single("has_class")?;
        Ok(has_class_name(&node, &matcher.into()))
    }

    /// Whether every wrapped node rendered nothing.
    pub fn is_empty_render(&self) -> bool {
        self.nodes()
            .iter()
            .all(|n| !n.ty.is_host() && n.rendered.is_nothing())
    }

    /// Exact comparison of the single node against an unrendered element.
    pub fn equals(&self, element: &Element) -> Result<bool> {
        let node = self.single("equals")?;
        Ok(node_equal(&node, &self.adapter().element_to_node(element)))
    }

    pub fn matches_element(&self, element: &Element) -> Result<bool> {
        let node = self.single("matches_element")?;
        Ok(node_matches(&self.adapter().element_to_node(element), &node))
    }

    pub fn contains<'c>(&self, target: impl Into<Contained<'c>>) -> bool {
        match target.into() {
            Contained::One(element) => {
                let expected = self.adapter().element_to_node(element);
                self.subtree_nodes().iter().any(|n| node_equal(&expected, n))
            }
            Contained::Run(elements) => {
                let expected: Vec<_> = elements
                    .iter()
                    .map(|e| self.adapter().element_to_node(e))
                    .collect();
                self.subtree_nodes()
                    .iter()
                    .any(|n| contains_children_sub_array(|a, b| node_equal(a, b), n, &expected))
            }
        }
    }

    pub fn contains_matching_element(&self, element: &Element) -> bool {
        let expected = self.adapter().element_to_node(element);
        self.subtree_nodes().iter().any(|n| node_matches(&expected, n))
    }

    pub fn contains_all_matching_elements(&self, elements: &[Element]) -> bool {
        elements.iter().all(|e| self.contains_matching_element(e))
    }

    pub fn contains_any_matching_elements(&self, elements: &[Element]) -> bool {
        elements.iter().any(|e| self.contains_matching_element(e))
    }

    // ── Introspection ──

    pub fn props(&self) -> Result<Props> {
        Ok(self.single("props")?.props.clone())
    }

    pub fn prop(&self, name: &str) -> Result<Option<PropValue>> {
        Ok(self.single("prop")?.props.get(name).cloned())
    }

    pub fn key(&self) -> Result<Option<String>> {
        Ok(self.single("key")?.key.clone())
    }

    pub fn type_of(&self) -> Result<ElementType> {
        Ok(self.single("type")?.ty.clone())
    }

    pub fn name(&self) -> Result<Option<String>> {
        let node = self.single("name")?;
        Ok(self.adapter().display_name_of_node(&node))
    }

    /// Rendered text. Mount renders concatenate every text leaf; shallow
    /// renders show unrendered child components as `<Name />`.
    pub fn text(&self) -> Result<String> {
        if self.is_root && self.root.mode == RenderMode::Shallow {
            if let Some(node) = self.root.tree_root().filter(|n| !n.ty.is_host()) {
                return Ok(children_of_node(&node)
                    .iter()
                    .map(|t| get_text_from_node(Some(t)))
                    .collect());
            }
        }
        let node = Tree::Node(self.single("text")?);
        Ok(match self.root.mode {
            RenderMode::Mount => get_text_from_host_nodes(&node),
            _ => get_text_from_node(Some(&node)),
        })
    }

    /// Markup of the single node; `None` when it renders no host output.
    pub fn html(&self) -> Result<Option<String>> {
        let node = self.single("html")?;
        let markup = match self.root.mode {
            RenderMode::Mount => {
                let mut out = String::new();
                write_markup(&Tree::Node(node), &mut out);
                out
            }
            _ => {
                let element = self.adapter().node_to_element(&node);
                let renderer = self
                    .adapter()
                    .create_renderer(RenderMode::String, &self.root.options)?;
                renderer.render(&element, &self.root.context.borrow(), None)?;
                renderer.markup()?.unwrap_or_default()
            }
        };
        Ok(Some(markup).filter(|m| !m.is_empty()))
    }

    /// Static render of the single node, queryable with CSS.
    pub fn render(&self) -> Result<StringWrapper> {
        Ok(StringWrapper::from_markup(self.html()?.unwrap_or_default()))
    }

    pub fn debug(&self) -> String {
        self.debug_with(&DebugOptions::default())
    }

    pub fn debug_with(&self, options: &DebugOptions) -> String {
        let trees: Vec<Tree> = if self.is_root {
            self.root.root_trees()
        } else {
            self.nodes.iter().cloned().map(Tree::Node).collect()
        };
        debug_nodes(&trees, options)
    }

    /// Node whose instance the instance-level methods act on. Shallow renders
    /// only expose the root component's instance.
    fn instance_node(&self, method: &'static str) -> Result<Rc<RstNode>> {
        match self.root.mode {
            RenderMode::Shallow => {
                self.root_only(method)?;
                self.live_root(method)
            }
            _ => self.single(method),
        }
    }

    fn class_instance(&self, method: &'static str) -> Result<InstanceHandle> {
        match self.instance_node(method)?.instance.clone() {
            Some(InstanceRef::Class(handle)) => Ok(handle),
            _ => Err(Error::Type(format!(
                "{}::{method}() can only be called on class components",
                self.name_of()
            ))),
        }
    }

    /// Backing instance: class instance or host node; `None` for function components.
    pub fn instance(&self) -> Result<Option<InstanceRef>> {
        Ok(self.instance_node("instance")?.instance.clone())
    }

    pub fn state(&self) -> Result<State> {
        self.class_instance("state")?
            .state()
            .ok_or_else(|| Error::Unmounted(format!("{}::state() called on an unmounted component", self.name_of())))
    }

    pub fn state_of(&self, key: &str) -> Result<Option<PropValue>> {
        Ok(self.state()?.get(key).cloned())
    }

    fn require_context_option(&self, method: &'static str) -> Result<()> {
        if self.root.options.context.is_none() {
            return Err(Error::Type(format!(
                "{}::{method}() can only be called on a wrapper that was originally passed a context option",
                self.name_of()
            )));
        }
        Ok(())
    }

    /// Legacy context the root class instance received.
    pub fn context(&self) -> Result<Context> {
        self.root_only("context")?;
        self.require_context_option("context")?;
        self.class_instance("context")?
            .context()
            .ok_or_else(|| Error::Unmounted(format!("{}::context() called on an unmounted component", self.name_of())))
    }

    pub fn context_of(&self, key: &str) -> Result<Option<PropValue>> {
        Ok(self.context()?.get(key).cloned())
    }

    /// The first document node at or beneath the single wrapped node.
    pub fn get_dom_node(&self) -> Result<HostNodeHandle> {
        if self.root.mode != RenderMode::Mount {
            return Err(Error::Type(format!(
                "{}::get_dom_node() can not be called on shallow renders",
                self.name_of()
            )));
        }
        let node = self.single("get_dom_node")?;
        self.adapter().node_to_host_node(&node).ok_or_else(|| {
            Error::Type(format!(
                "{}::get_dom_node() found no host node beneath the wrapped node",
                self.name_of()
            ))
        })
    }

    // ── Mutation ──

    /// Merge `props` into the root element's props and re-render in place.
    pub fn set_props(&self, props: Props) -> Result<Wrapper> {
        self.apply_props(props, None)
    }

    /// [`Wrapper::set_props`], then call `callback` once the update is committed.
    pub fn set_props_then(&self, props: Props, callback: impl Into<PropValue>) -> Result<Wrapper> {
        let callback = self.callback_arg("set_props", callback.into())?;
        self.apply_props(props, callback)
    }

    fn apply_props(&self, props: Props, callback: Option<Function>) -> Result<Wrapper> {
        self.root_only("set_props")?;
        self.live_root("set_props")?;
        let element = {
            let mut element = self.root.element.borrow_mut();
            element.props.extend(props);
            element.clone()
        };
        debug!(root = %element.ty.display_name().unwrap_or_default(), "set_props");
        let context = self.root.context.borrow().clone();
        self.root.renderer.render(&element, &context, callback.as_ref())?;
        self.root.refresh()?;
        Ok(self.root())
    }

    /// Merge `state` into the root class instance's state and re-render.
    pub fn set_state(&self, state: State) -> Result<Wrapper> {
        self.apply_state(state, None)
    }

    pub fn set_state_then(&self, state: State, callback: impl Into<PropValue>) -> Result<Wrapper> {
        let callback = self.callback_arg("set_state", callback.into())?;
        self.apply_state(state, callback)
    }

    fn apply_state(&self, state: State, callback: Option<Function>) -> Result<Wrapper> {
        self.root_only("set_state")?;
        let handle = self.class_instance("set_state")?;
        self.root
            .renderer
            .batched_updates(&mut || handle.set_state(state.clone()))?;
        if let Some(callback) = callback {
            self.root
                .renderer
                .batched_updates(&mut || callback.call(&[]).map(|_| ()))?;
        }
        self.root.refresh()?;
        Ok(self.root())
    }

    /// Re-render with a new legacy context. Needs the `context` render option.
    pub fn set_context(&self, context: Context) -> Result<Wrapper> {
        self.root_only("set_context")?;
        self.require_context_option("set_context")?;
        self.live_root("set_context")?;
        *self.root.context.borrow_mut() = context.clone();
        let element = self.root.element.borrow().clone();
        self.root.renderer.render(&element, &context, None)?;
        self.root.refresh()?;
        Ok(self.root())
    }

    /// Fire `event` at the single node. Mount renders dispatch through the
    /// document; shallow renders call the node's own handler.
    pub fn simulate(&self, event: &str, args: &[PropValue]) -> Result<Wrapper> {
        let node = self.single("simulate")?;
        debug!(event, mode = ?self.root.mode, "simulate");
        self.root.renderer.simulate_event(&node, event, args)?;
        self.root.refresh()?;
        Ok(self.clone())
    }

    /// Call the handler in prop `name` inside a batch and return its result.
    pub fn invoke(&self, name: &str, args: &[PropValue]) -> Result<PropValue> {
        let node = self.single("invoke")?;
        let handler = node
            .props
            .get(name)
            .and_then(PropValue::as_function)
            .cloned()
            .ok_or_else(|| {
                Error::Type(format!("{}::invoke() prop \"{name}\" is not a function", self.name_of()))
            })?;
        let mut result = PropValue::Undefined;
        self.root.renderer.batched_updates(&mut || {
            result = handler.call(args)?;
            Ok(())
        })?;
        self.root.refresh()?;
        Ok(result)
    }

    /// Re-read the tree from the renderer. Derived wrappers update their root.
    pub fn update(&self) -> Result<Wrapper> {
        self.root.refresh()?;
        Ok(self.root())
    }

    pub fn unmount(&self) -> Result<Wrapper> {
        self.root_only("unmount")?;
        if self.root.unmounted.get() {
            warn!(wrapper = self.name_of(), "unmount() called on an already unmounted root");
            return Ok(self.root());
        }
        self.root.renderer.unmount()?;
        self.root.unmounted.set(true);
        self.root.refresh()?;
        Ok(self.root())
    }

    /// Render the root element again from scratch.
    pub fn remount(&self) -> Result<Wrapper> {
        self.root_only("remount")?;
        if !self.root.unmounted.get() {
            self.root.renderer.unmount()?;
        }
        let element = self.root.element.borrow().clone();
        let context = self.root.context.borrow().clone();
        self.root.renderer.render(&element, &context, None)?;
        self.root.unmounted.set(false);
        self.root.refresh()?;
        Ok(self.root())
    }

    /// Shallow-render the single node's element with this root's options.
    pub fn shallow(&self) -> Result<Wrapper> {
        let node = self.single("shallow")?;
        let element = self.adapter().node_to_element(&node);
        let mut options = self.root.options.clone();
        options.context = Some(self.root.context.borrow().clone());
        Wrapper::create(RenderMode::Shallow, &element, options)
    }

    /// Shallow-render the single non-host child one level further.
    pub fn dive(&self) -> Result<Wrapper> {
        if self.root.mode != RenderMode::Shallow {
            return Err(Error::Type(format!("{}::dive() is only available on shallow renders", self.name_of())));
        }
        let node = self.single("dive")?;
        if node.ty.is_host() {
            return Err(Error::Type("ShallowWrapper::dive() can not be called on Host Components".into()));
        }
        if !self.adapter().is_custom_component(&node.ty) {
            return Err(Error::Type("ShallowWrapper::dive() can only be called on components".into()));
        }
        self.shallow()
    }

    /// Wrapper over the wrapping component given in the render options.
    pub fn wrapping_component(&self) -> Result<Wrapper> {
        self.root_only("wrapping_component")?;
        if self.root.options.wrapping_component.is_none() {
            return Err(Error::Type(format!(
                "{}::wrapping_component() can only be called on a root wrapper that was originally passed a `wrapping_component` option",
                self.name_of()
            )));
        }
        match self.root.renderer.wrapping_node()? {
            Some(Tree::Node(node)) => Ok(self.wrap(vec![node])),
            _ => Err(Error::Type(format!(
                "{}::wrapping_component() is not available for this render",
                self.name_of()
            ))),
        }
    }
}
