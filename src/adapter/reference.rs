//! Adapter backed by the in-process host runtime.

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

use tracing::debug;

use super::{
    element_to_tree, first_host_instance, is_known_event, map_native_event_name, prop_from_event,
    rendered_from_value, synthetic_event, wrap_with_wrapping_component, Adapter, AdapterOptions,
    RenderMode, Renderer,
};
use crate::config::RenderOptions;
use crate::element::{Context, Element, ElementType, Function, PropValue};
use crate::error::{Error, Result};
use crate::host::{
    document, Document, Fiber, MountRoot, ShallowRoot, CLASS_COMPONENT, CONTEXT_CONSUMER,
    CONTEXT_PROVIDER, FORWARD_REF, FRAGMENT, FUNCTION_COMPONENT, HOST_COMPONENT, HOST_PORTAL,
    HOST_TEXT, MEMO_COMPONENT,
};
use crate::rst::{InstanceRef, NodeType, Rendered, RstNode, Tree};

/// Whether a document is available for mount rendering.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Dom,
    Headless,
}

#[derive(Debug, Clone)]
pub struct ReferenceAdapter {
    environment: Environment,
}

impl ReferenceAdapter {
    pub fn new() -> Self {
        Self {
            environment: Environment::Dom,
        }
    }

    /// An adapter with no document: shallow and string rendering only.
    pub fn without_dom() -> Self {
        Self {
            environment: Environment::Headless,
        }
    }

    pub fn environment(&self) -> Environment {
        self.environment
    }
}

impl Default for ReferenceAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl Adapter for ReferenceAdapter {
    fn name(&self) -> &str {
        "reference"
    }

    fn options(&self) -> AdapterOptions {
        AdapterOptions {
            modes: vec![RenderMode::Mount, RenderMode::Shallow, RenderMode::String],
        }
    }

    fn create_renderer(&self, mode: RenderMode, options: &RenderOptions) -> Result<Box<dyn Renderer>> {
        debug!(?mode, environment = ?self.environment, "creating renderer");
        match mode {
            RenderMode::Mount => {
                if self.environment == Environment::Headless {
                    return Err(Error::Environment(
                        "mount() expects a DOM environment to be loaded, but none was found.".into(),
                    ));
                }
                Ok(Box::new(MountRenderer::new(document(), options)))
            }
            RenderMode::Shallow => Ok(Box::new(ShallowRenderer::new(options))),
            RenderMode::String => Ok(Box::new(StringRenderer::new(options))),
        }
    }

    fn is_focused(&self, node: &RstNode) -> Result<bool> {
        if self.environment == Environment::Headless {
            return Err(Error::Environment(
                "Selector \":focus\" requires a DOM environment, but none was found.".into(),
            ));
        }
        Ok(self
            .node_to_host_node(node)
            .is_some_and(|host| host.is_focused()))
    }
}

static NEXT_CONTAINER: AtomicU64 = AtomicU64::new(1);

/// Legacy context handed to the root, limited to the declared child context keys.
fn root_context(context: &Context, options: &RenderOptions) -> Context {
    if options.child_context_types.is_empty() {
        return context.clone();
    }
    context
        .iter()
        .filter(|(k, _)| options.child_context_types.contains(k))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect()
}

fn event_args(event: &str, args: &[PropValue]) -> Vec<PropValue> {
    if args.is_empty() {
        vec![synthetic_event(event)]
    } else {
        args.to_vec()
    }
}

/// Fiber to render-tree node. Fragments below the root are spliced into their parent.
pub(crate) fn instance_to_tree(fiber: &Fiber) -> Result<Tree> {
    match fiber.tag {
        HOST_TEXT => Ok(Tree::Text(fiber.text.clone())),
        HOST_COMPONENT | CLASS_COMPONENT | FUNCTION_COMPONENT | HOST_PORTAL | FRAGMENT
        | CONTEXT_PROVIDER | CONTEXT_CONSUMER | FORWARD_REF | MEMO_COMPONENT => {
            let ty = fiber
                .ty
                .clone()
                .ok_or_else(|| Error::internal(format!("node with tag {} has no type", fiber.tag)))?;
            Ok(Tree::Node(Rc::new(RstNode {
                node_type: NodeType::from_type(&ty),
                ty,
                props: fiber.props.clone(),
                key: fiber.key.clone(),
                ref_: fiber.ref_.clone(),
                instance: fiber.instance_ref(),
                rendered: children_to_tree(&fiber.children)?,
            })))
        }
        tag => Err(Error::internal(format!("unknown node with tag {tag}"))),
    }
}

fn children_to_tree(children: &[Fiber]) -> Result<Rendered> {
    let mut trees = Vec::with_capacity(children.len());
    collect_children(children, &mut trees)?;
    Ok(match trees.len() {
        0 => Rendered::Nothing,
        1 => Rendered::One(trees.remove(0)),
        _ => Rendered::Many(trees),
    })
}

fn collect_children(children: &[Fiber], out: &mut Vec<Tree>) -> Result<()> {
    for child in children {
        if child.tag == FRAGMENT {
            collect_children(&child.children, out)?;
        } else {
            out.push(instance_to_tree(child)?);
        }
    }
    Ok(())
}

fn find_fiber<'a>(fiber: &'a Fiber, ty: &ElementType) -> Option<&'a Fiber> {
    fiber
        .children
        .iter()
        .find_map(|child| match &child.ty {
            Some(t) if t == ty => Some(child),
            _ => find_fiber(child, ty),
        })
}

struct MountRenderer {
    root: Rc<MountRoot>,
    options: RenderOptions,
    root_type: RefCell<Option<ElementType>>,
}

impl MountRenderer {
    fn new(document: Rc<Document>, options: &RenderOptions) -> Self {
        let container = options
            .attach_to
            .clone()
            .or_else(|| options.hydrate_in.clone())
            .unwrap_or_else(|| format!("root-{}", NEXT_CONTAINER.fetch_add(1, Ordering::Relaxed)));
        if options.hydrate_in.is_some() {
            debug!(container = %container, "hydrating into existing container");
        }
        Self {
            root: MountRoot::new(document, &container, !options.lifecycles_disabled()),
            options: options.clone(),
            root_type: RefCell::new(None),
        }
    }

    fn with_user_root<R>(&self, f: impl FnOnce(Option<&Fiber>) -> R) -> Result<R> {
        let root_type = self.root_type.borrow().clone();
        let wrapped = self.options.wrapping_component.is_some();
        self.root.with_current(|fiber| match (fiber, wrapped, root_type) {
            (Some(fiber), true, Some(ty)) => f(find_fiber(fiber, &ty)),
            (fiber, _, _) => f(fiber),
        })
    }
}

impl Renderer for MountRenderer {
    fn render(&self, element: &Element, context: &Context, callback: Option<&Function>) -> Result<()> {
        *self.root_type.borrow_mut() = Some(element.ty.clone());
        let target = wrap_with_wrapping_component(element, &self.options);
        self.root.render(&target, root_context(context, &self.options))?;
        if let Some(callback) = callback {
            self.root.batched(&mut || callback.call(&[]).map(|_| ()))?;
        }
        Ok(())
    }

    fn unmount(&self) -> Result<()> {
        self.root.unmount()
    }

    fn get_node(&self) -> Result<Option<Tree>> {
        self.with_user_root(|fiber| fiber.map(instance_to_tree).transpose())?
    }

    fn simulate_event(&self, node: &RstNode, event: &str, args: &[PropValue]) -> Result<()> {
        let mapped = map_native_event_name(event);
        let prop = prop_from_event(mapped);
        let handled = match first_host_instance(node) {
            Some(host) => self.root.dispatch(&host, &prop, &event_args(mapped, args))?,
            None => false,
        };
        if !handled && !is_known_event(mapped) {
            return Err(Error::Simulate {
                wrapper: RenderMode::Mount.wrapper_name(),
                event: event.to_string(),
            });
        }
        Ok(())
    }

    fn batched_updates(&self, f: &mut dyn FnMut() -> Result<()>) -> Result<()> {
        self.root.batched(f)
    }

    fn markup(&self) -> Result<Option<String>> {
        self.root.markup()
    }

    fn wrapping_node(&self) -> Result<Option<Tree>> {
        if self.options.wrapping_component.is_none() {
            return Ok(None);
        }
        self.root
            .with_current(|fiber| fiber.map(instance_to_tree).transpose())?
    }
}

struct ShallowRenderer {
    root: Rc<ShallowRoot>,
    options: RenderOptions,
}

impl ShallowRenderer {
    fn new(options: &RenderOptions) -> Self {
        Self {
            root: ShallowRoot::new(!options.lifecycles_disabled()),
            options: options.clone(),
        }
    }
}

impl Renderer for ShallowRenderer {
    fn render(&self, element: &Element, context: &Context, callback: Option<&Function>) -> Result<()> {
        self.root.render(element, root_context(context, &self.options))?;
        if let Some(callback) = callback {
            self.root.batched(&mut || callback.call(&[]).map(|_| ()))?;
        }
        Ok(())
    }

    fn unmount(&self) -> Result<()> {
        self.root.unmount()
    }

    /// The root component node; what it rendered is one level of unrendered elements.
    fn get_node(&self) -> Result<Option<Tree>> {
        let Some(snapshot) = self.root.snapshot()? else {
            return Ok(None);
        };
        let element = &snapshot.element;
        if !element.ty.is_composite() && !matches!(element.ty, ElementType::Provider(_) | ElementType::Consumer(_)) {
            return Ok(Some(Tree::Node(element_to_tree(element))));
        }
        let props = snapshot
            .instance
            .as_ref()
            .and_then(|handle| handle.props())
            .unwrap_or_else(|| element.props.clone());
        Ok(Some(Tree::Node(Rc::new(RstNode {
            node_type: NodeType::from_type(&element.ty),
            ty: element.ty.clone(),
            props,
            key: element.key.clone(),
            ref_: element.ref_.clone(),
            instance: snapshot.instance.map(InstanceRef::Class),
            rendered: rendered_from_value(&snapshot.output),
        }))))
    }

    /// Calls the node's own handler prop; nothing propagates in shallow mode.
    fn simulate_event(&self, node: &RstNode, event: &str, args: &[PropValue]) -> Result<()> {
        let mapped = map_native_event_name(event);
        let prop = prop_from_event(mapped);
        match node.props.get(&prop).and_then(PropValue::as_function) {
            Some(handler) => {
                let args = event_args(mapped, args);
                self.root.batched(&mut || handler.call(&args).map(|_| ()))
            }
            None if is_known_event(mapped) => Ok(()),
            None => Err(Error::Simulate {
                wrapper: RenderMode::Shallow.wrapper_name(),
                event: event.to_string(),
            }),
        }
    }

    fn batched_updates(&self, f: &mut dyn FnMut() -> Result<()>) -> Result<()> {
        self.root.batched(f)
    }
}

/// Renders to markup once; nothing stays mounted and no lifecycle hooks run.
struct StringRenderer {
    options: RenderOptions,
    markup: RefCell<Option<String>>,
}

impl StringRenderer {
    fn new(options: &RenderOptions) -> Self {
        Self {
            options: options.clone(),
            markup: RefCell::new(None),
        }
    }
}

impl Renderer for StringRenderer {
    fn render(&self, element: &Element, context: &Context, _callback: Option<&Function>) -> Result<()> {
        let root = MountRoot::new(Rc::new(Document::default()), "string", false);
        let target = wrap_with_wrapping_component(element, &self.options);
        root.render(&target, root_context(context, &self.options))?;
        *self.markup.borrow_mut() = root.markup()?;
        Ok(())
    }

    fn unmount(&self) -> Result<()> {
        *self.markup.borrow_mut() = None;
        Ok(())
    }

    fn get_node(&self) -> Result<Option<Tree>> {
        Ok(None)
    }

    fn simulate_event(&self, _node: &RstNode, _event: &str, _args: &[PropValue]) -> Result<()> {
        Err(Error::Type("simulate() is not supported when rendering to a string".into()))
    }

    fn markup(&self) -> Result<Option<String>> {
        Ok(self.markup.borrow().clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::element::{ComponentClass, FunctionComponent};
    use crate::props;

    fn mount(element: &Element) -> Box<dyn Renderer> {
        let renderer = ReferenceAdapter::new()
            .create_renderer(RenderMode::Mount, &RenderOptions::default())
            .unwrap();
        renderer.render(element, &Context::new(), None).unwrap();
        renderer
    }

    fn root_node(renderer: &dyn Renderer) -> Rc<RstNode> {
        match renderer.get_node().unwrap() {
            Some(Tree::Node(n)) => n,
            other => panic!("expected a node, got {other:?}"),
        }
    }

    #[test]
    fn headless_adapter_refuses_mount() {
        let err = ReferenceAdapter::without_dom()
            .create_renderer(RenderMode::Mount, &RenderOptions::default())
            .err()
            .unwrap();
        assert!(err.to_string().contains("expects a DOM environment"));
    }

    #[test]
    fn get_node_is_none_before_render_and_after_unmount() {
        let renderer = ReferenceAdapter::new()
            .create_renderer(RenderMode::Mount, &RenderOptions::default())
            .unwrap();
        assert!(renderer.get_node().unwrap().is_none());
        renderer.render(&Element::host("div"), &Context::new(), None).unwrap();
        assert!(renderer.get_node().unwrap().is_some());
        renderer.unmount().unwrap();
        assert!(renderer.get_node().unwrap().is_none());
    }

    #[test]
    fn instances_only_for_host_and_class_nodes() {
        let func = FunctionComponent::new("Func", |_, _| Ok(Element::host("i").into()));
        let class = ComponentClass::builder("Klass")
            .render(move |_| Ok(Element::function(&func).into()))
            .build();
        let renderer = mount(&Element::class(&class));
        let root = root_node(renderer.as_ref());
        assert!(matches!(root.instance, Some(InstanceRef::Class(_))));
        let Rendered::One(Tree::Node(func_node)) = &root.rendered else {
            panic!("expected function child");
        };
        assert_eq!(func_node.node_type, NodeType::Function);
        assert!(func_node.instance.is_none());
        let Rendered::One(Tree::Node(host)) = &func_node.rendered else {
            panic!("expected host child");
        };
        assert!(matches!(host.instance, Some(InstanceRef::Host(_))));
    }

    #[test]
    fn mount_splices_nested_fragments() {
        let el = Element::host("div").child(
            Element::fragment()
                .child(Element::host("a"))
                .child(Element::host("b")),
        );
        let root = root_node(mount(&el).as_ref());
        assert_eq!(root.rendered.to_vec().len(), 2);
    }

    #[test]
    fn unknown_simulated_events_fail() {
        let renderer = mount(&Element::host("button"));
        let root = root_node(renderer.as_ref());
        renderer.simulate_event(&root, "click", &[]).unwrap();
        let err = renderer.simulate_event(&root, "foo", &[]).unwrap_err();
        assert_eq!(err.to_string(), "MountWrapper::simulate() event 'foo' does not exist");
    }

    #[test]
    fn shallow_root_renders_one_level() {
        let inner = FunctionComponent::new("Inner", |_, _| Ok(Element::host("i").into()));
        let outer = FunctionComponent::new("Outer", move |_, _| {
            Ok(Element::host("div").child(Element::function(&inner)).into())
        });
        let renderer = ReferenceAdapter::without_dom()
            .create_renderer(RenderMode::Shallow, &RenderOptions::default())
            .unwrap();
        renderer
            .render(&Element::function(&outer), &Context::new(), None)
            .unwrap();
        let root = root_node(renderer.as_ref());
        let Rendered::One(Tree::Node(div)) = &root.rendered else {
            panic!("expected div");
        };
        let Rendered::One(Tree::Node(inner_node)) = &div.rendered else {
            panic!("expected inner element");
        };
        assert!(inner_node.rendered.is_nothing());
        assert!(inner_node.instance.is_none());
    }

    #[test]
    fn string_mode_produces_markup() {
        let renderer = ReferenceAdapter::without_dom()
            .create_renderer(RenderMode::String, &RenderOptions::default())
            .unwrap();
        renderer
            .render(
                &Element::host("p").prop("className", "x").child("a < b"),
                &Context::new(),
                None,
            )
            .unwrap();
        assert_eq!(
            renderer.markup().unwrap().as_deref(),
            Some(r#"<p class="x">a &lt; b</p>"#)
        );
    }

    #[test]
    fn child_context_types_limit_root_context() {
        let options = RenderOptions::default().child_context_types(&["a"]);
        let ctx = root_context(&props! { "a" => 1, "b" => 2 }, &options);
        assert_eq!(ctx.len(), 1);
    }
}
