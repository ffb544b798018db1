use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use tracing::{debug, trace};

use super::dom::{write_close_tag, write_open_tag, write_text, Document, HostNode, HostNodeHandle};
use super::{
    child_scope, create_instance, flatten_children, render_instance, run_effects, update_instance,
    with_defaults, Child, ClassInstance, Effect, InstanceHandle, Scope, Updater,
    MAX_UPDATE_PASSES,
};
use crate::element::{Context, Element, ElementType, LifecycleHook, PropValue, Props, RefValue};
use crate::error::{Error, Result};
use crate::rst::InstanceRef;

pub(crate) const FUNCTION_COMPONENT: u8 = 0;
pub(crate) const CLASS_COMPONENT: u8 = 1;
pub(crate) const HOST_PORTAL: u8 = 4;
pub(crate) const HOST_COMPONENT: u8 = 5;
pub(crate) const HOST_TEXT: u8 = 6;
pub(crate) const FRAGMENT: u8 = 7;
pub(crate) const CONTEXT_CONSUMER: u8 = 9;
pub(crate) const CONTEXT_PROVIDER: u8 = 10;
pub(crate) const FORWARD_REF: u8 = 11;
pub(crate) const MEMO_COMPONENT: u8 = 14;

fn tag_for(ty: &ElementType) -> u8 {
    match ty {
        ElementType::Host(_) => HOST_COMPONENT,
        ElementType::Class(_) => CLASS_COMPONENT,
        ElementType::Function(_) => FUNCTION_COMPONENT,
        ElementType::Fragment => FRAGMENT,
        ElementType::Portal => HOST_PORTAL,
        ElementType::Provider(_) => CONTEXT_PROVIDER,
        ElementType::Consumer(_) => CONTEXT_CONSUMER,
        ElementType::ForwardRef(_) => FORWARD_REF,
        ElementType::Memo(_) => MEMO_COMPONENT,
    }
}

pub(crate) enum StateNode {
    None,
    Class(Rc<RefCell<ClassInstance>>),
    Host(Rc<RefCell<HostNode>>),
}

/// One mounted unit of work: a component, host node, text node or wrapper.
pub(crate) struct Fiber {
    pub tag: u8,
    pub ty: Option<ElementType>,
    pub key: Option<String>,
    pub props: Props,
    pub ref_: Option<RefValue>,
    pub state_node: StateNode,
    pub text: String,
    pub children: Vec<Fiber>,
}

impl Fiber {
    fn text(text: String) -> Self {
        Self {
            tag: HOST_TEXT,
            ty: None,
            key: None,
            props: Props::new(),
            ref_: None,
            state_node: StateNode::None,
            text,
            children: Vec::new(),
        }
    }

    pub fn instance_ref(&self) -> Option<InstanceRef> {
        match &self.state_node {
            StateNode::Class(i) => Some(InstanceRef::Class(InstanceHandle::new(i))),
            StateNode::Host(n) => Some(InstanceRef::Host(HostNodeHandle::new(n))),
            StateNode::None => None,
        }
    }

    fn is_dirty(&self) -> bool {
        match &self.state_node {
            StateNode::Class(i) if i.borrow().is_dirty() => true,
            _ => self.children.iter().any(Fiber::is_dirty),
        }
    }

    fn same_identity(&self, old_index: usize, child: &Child, index: usize) -> bool {
        match child {
            Child::Text(_) => self.tag == HOST_TEXT && old_index == index,
            Child::Element(el) => {
                self.ty.as_ref() == Some(&el.ty)
                    && match (&self.key, &el.key) {
                        (Some(a), Some(b)) => a == b,
                        (None, None) => old_index == index,
                        _ => false,
                    }
            }
        }
    }

    /// Path of fibers from `self` down to the host fiber backing `target`.
    fn path_to_host<'a>(&'a self, target: &HostNodeHandle, path: &mut Vec<&'a Fiber>) -> bool {
        path.push(self);
        if let StateNode::Host(node) = &self.state_node {
            if HostNodeHandle::new(node).ptr_eq(target) {
                return true;
            }
        }
        for child in &self.children {
            if child.path_to_host(target, path) {
                return true;
            }
        }
        path.pop();
        false
    }

    /// Static markup of this fiber's host output.
    pub fn write_markup(&self, out: &mut String) {
        match (self.tag, &self.ty) {
            (HOST_TEXT, _) => write_text(&self.text, out),
            (HOST_COMPONENT, Some(ElementType::Host(tag))) => {
                write_open_tag(tag, &self.props, out);
                for child in &self.children {
                    child.write_markup(out);
                }
                write_close_tag(tag, out);
            }
            _ => {
                for child in &self.children {
                    child.write_markup(out);
                }
            }
        }
    }
}

/// Builds and patches fibers, collecting effects to run after commit.
struct Reconciler {
    document: Rc<Document>,
    lifecycles: bool,
    updater: Weak<dyn Updater>,
    unmounts: Vec<Effect>,
    effects: Vec<Effect>,
}

impl Reconciler {
    fn new(document: Rc<Document>, lifecycles: bool, updater: Weak<dyn Updater>) -> Self {
        Self {
            document,
            lifecycles,
            updater,
            unmounts: Vec::new(),
            effects: Vec::new(),
        }
    }

    fn into_effects(self) -> (Vec<Effect>, Vec<Effect>) {
        (self.unmounts, self.effects)
    }

    fn mount_child(&mut self, child: Child, scope: &Scope) -> Result<Fiber> {
        match child {
            Child::Element(el) => self.mount_element(&el, scope),
            Child::Text(text) => Ok(Fiber::text(text)),
        }
    }

    fn mount_children(&mut self, value: &PropValue, scope: &Scope) -> Result<Vec<Fiber>> {
        flatten_children(value)?
            .into_iter()
            .map(|child| self.mount_child(child, scope))
            .collect()
    }

    fn mount_element(&mut self, el: &Element, scope: &Scope) -> Result<Fiber> {
        let mut fiber = Fiber {
            tag: tag_for(&el.ty),
            ty: Some(el.ty.clone()),
            key: el.key.clone(),
            props: el.props.clone(),
            ref_: el.ref_.clone(),
            state_node: StateNode::None,
            text: String::new(),
            children: Vec::new(),
        };

        match &el.ty {
            ElementType::Host(tag) => {
                let node = self.document.create_node(tag, &fiber.props);
                fiber.state_node = StateNode::Host(Rc::clone(&node));
                fiber.children = self.mount_children(el.children_prop(), scope)?;
                if let Some(r) = &fiber.ref_ {
                    self.effects
                        .push(Effect::Ref(r.clone(), Some(InstanceRef::Host(HostNodeHandle::new(&node)))));
                }
            }
            ElementType::Class(class) => {
                let props = with_defaults(&class.default_props, &el.props);
                let context = scope.context_for(&class.context_types);
                let instance = create_instance(class, props.clone(), context, self.updater.clone());
                fiber.props = props;
                fiber.state_node = StateNode::Class(Rc::clone(&instance));
                let output = render_instance(&instance)?;
                let inner = child_scope(&instance, scope);
                fiber.children = self.mount_children(&output, &inner)?;
                if self.lifecycles && class.implements(LifecycleHook::ComponentDidMount) {
                    self.effects.push(Effect::DidMount(Rc::clone(&instance)));
                }
                if let Some(r) = &fiber.ref_ {
                    self.effects.push(Effect::Ref(
                        r.clone(),
                        Some(InstanceRef::Class(InstanceHandle::new(&instance))),
                    ));
                }
            }
            ElementType::Memo(memo) => {
                let inner = el.retyped(memo.inner.clone());
                fiber.ref_ = None;
                fiber.children = vec![self.mount_element(&inner, scope)?];
            }
            _ => {
                let (output, inner) = render_wrapper(el, &mut fiber, scope)?;
                fiber.children = self.mount_children(&output, &inner)?;
            }
        }
        Ok(fiber)
    }

    fn update_fiber(&mut self, fiber: &mut Fiber, el: &Element, scope: &Scope) -> Result<()> {
        fiber.key = el.key.clone();
        fiber.ref_ = el.ref_.clone();

        match &el.ty {
            ElementType::Host(_) => {
                fiber.props = el.props.clone();
                if let StateNode::Host(node) = &fiber.state_node {
                    node.borrow_mut().set_attributes(&fiber.props);
                }
                let children = flatten_children(el.children_prop())?;
                self.reconcile_children(&mut fiber.children, children, scope)?;
            }
            ElementType::Class(class) => {
                let props = with_defaults(&class.default_props, &el.props);
                let context = scope.context_for(&class.context_types);
                self.update_class(fiber, props, context, scope)?;
            }
            ElementType::Memo(memo) => {
                let unchanged = match &memo.compare {
                    Some(compare) => compare(&fiber.props, &el.props),
                    None => shallow_equal(&fiber.props, &el.props),
                };
                fiber.props = el.props.clone();
                fiber.ref_ = None;
                if unchanged {
                    trace!("memo bailout");
                    return Ok(());
                }
                let children = vec![Child::Element(el.retyped(memo.inner.clone()))];
                self.reconcile_children(&mut fiber.children, children, scope)?;
            }
            _ => {
                let (output, inner) = render_wrapper(el, fiber, scope)?;
                let children = flatten_children(&output)?;
                self.reconcile_children(&mut fiber.children, children, &inner)?;
            }
        }
        Ok(())
    }

    /// Returns whether the class re-rendered.
    fn update_class(
        &mut self,
        fiber: &mut Fiber,
        props: Props,
        context: Context,
        scope: &Scope,
    ) -> Result<bool> {
        let StateNode::Class(instance) = &fiber.state_node else {
            return Err(Error::internal("class fiber without an instance"));
        };
        let instance = Rc::clone(instance);
        fiber.props = props.clone();
        match update_instance(&instance, props, context, self.lifecycles, &mut self.effects)? {
            Some(output) => {
                let inner = child_scope(&instance, scope);
                let children = flatten_children(&output)?;
                self.reconcile_children(&mut fiber.children, children, &inner)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn reconcile_children(
        &mut self,
        current: &mut Vec<Fiber>,
        next: Vec<Child>,
        scope: &Scope,
    ) -> Result<()> {
        let mut previous: Vec<(usize, Option<Fiber>)> = std::mem::take(current)
            .into_iter()
            .enumerate()
            .map(|(i, f)| (i, Some(f)))
            .collect();
        let mut result = Vec::with_capacity(next.len());

        for (index, child) in next.into_iter().enumerate() {
            let reused = previous
                .iter_mut()
                .find(|(old_index, slot)| {
                    slot.as_ref()
                        .is_some_and(|f| f.same_identity(*old_index, &child, index))
                })
                .and_then(|(_, slot)| slot.take());
            match reused {
                Some(mut fiber) => {
                    match &child {
                        Child::Element(el) => self.update_fiber(&mut fiber, el, scope)?,
                        Child::Text(text) => fiber.text = text.clone(),
                    }
                    result.push(fiber);
                }
                None => result.push(self.mount_child(child, scope)?),
            }
        }

        for (_, slot) in previous {
            if let Some(stale) = slot {
                self.unmount_fiber(stale);
            }
        }
        *current = result;
        Ok(())
    }

    fn unmount_fiber(&mut self, fiber: Fiber) {
        match &fiber.state_node {
            StateNode::Class(instance) => {
                self.unmounts.push(Effect::WillUnmount(Rc::clone(instance)));
            }
            StateNode::Host(node) => node.borrow_mut().detach(),
            StateNode::None => {}
        }
        if fiber.tag != MEMO_COMPONENT && fiber.tag != FORWARD_REF {
            if let Some(r) = &fiber.ref_ {
                self.unmounts.push(Effect::Ref(r.clone(), None));
            }
        }
        for child in fiber.children {
            self.unmount_fiber(child);
        }
    }

    /// Re-render every class with queued updates.
    fn flush_fiber(&mut self, fiber: &mut Fiber, scope: &Scope) -> Result<()> {
        if let StateNode::Class(instance) = &fiber.state_node {
            if instance.borrow().is_dirty() {
                let (props, context) = {
                    let inst = instance.borrow();
                    (inst.props.clone(), inst.context.clone())
                };
                if self.update_class(fiber, props, context, scope)? {
                    return Ok(());
                }
            }
        }
        let inner = scope_below(fiber, scope);
        for child in &mut fiber.children {
            if child.is_dirty() {
                self.flush_fiber(child, &inner)?;
            }
        }
        Ok(())
    }
}

/// Render the non-class, non-host, non-memo kinds. Returns the output and the scope for it.
fn render_wrapper(el: &Element, fiber: &mut Fiber, scope: &Scope) -> Result<(PropValue, Scope)> {
    match &el.ty {
        ElementType::Function(component) => {
            let props = with_defaults(&component.default_props, &el.props);
            let context = scope.context_for(&component.context_types);
            let output = (component.render)(&props, &context)?;
            fiber.props = props;
            Ok((output, scope.clone()))
        }
        ElementType::ForwardRef(fwd) => {
            fiber.props = el.props.clone();
            let output = (fwd.render)(&el.props, el.ref_.as_ref())?;
            Ok((output, scope.clone()))
        }
        ElementType::Provider(context) => {
            fiber.props = el.props.clone();
            let value = el.props.get("value").cloned().unwrap_or_default();
            Ok((el.children_prop().clone(), scope.with_provider(context, value)))
        }
        ElementType::Consumer(context) => {
            fiber.props = el.props.clone();
            let value = scope.provided(context);
            let output = match el.children_prop() {
                PropValue::Function(f) => f.call(&[value])?,
                _ => {
                    return Err(Error::component(
                        "A context consumer expects a single function as its child",
                    ))
                }
            };
            Ok((output, scope.clone()))
        }
        _ => {
            fiber.props = el.props.clone();
            Ok((el.children_prop().clone(), scope.clone()))
        }
    }
}

/// Scope a fiber's children see.
fn scope_below(fiber: &Fiber, scope: &Scope) -> Scope {
    match (&fiber.state_node, &fiber.ty) {
        (StateNode::Class(instance), _) => child_scope(instance, scope),
        (_, Some(ElementType::Provider(context))) => {
            scope.with_provider(context, fiber.props.get("value").cloned().unwrap_or_default())
        }
        _ => scope.clone(),
    }
}

fn shallow_equal(a: &Props, b: &Props) -> bool {
    a.len() == b.len() && a.iter().all(|(k, v)| b.get(k) == Some(v))
}

struct RootState {
    current: Option<Fiber>,
    document: Rc<Document>,
    scope: Scope,
    lifecycles: bool,
}

/// A full-depth render root attached to a document container.
pub(crate) struct MountRoot {
    state: RefCell<RootState>,
    batch_depth: Cell<usize>,
    updater: Weak<dyn Updater>,
    container: String,
}

impl MountRoot {
    pub fn new(document: Rc<Document>, container: &str, lifecycles: bool) -> Rc<Self> {
        document.create_container(container);
        Rc::new_cyclic(|weak: &Weak<MountRoot>| {
            let updater: Weak<dyn Updater> = weak.clone();
            MountRoot {
                state: RefCell::new(RootState {
                    current: None,
                    document,
                    scope: Scope::default(),
                    lifecycles,
                }),
                batch_depth: Cell::new(0),
                updater,
                container: container.to_string(),
            }
        })
    }

    fn enter(&self) {
        self.batch_depth.set(self.batch_depth.get() + 1);
    }

    fn leave(&self) {
        self.batch_depth.set(self.batch_depth.get().saturating_sub(1));
    }

    fn busy() -> Error {
        Error::internal("render root is already being updated")
    }

    /// Mount `element`, or update in place when the root type and key are unchanged.
    pub fn render(&self, element: &Element, context: Context) -> Result<()> {
        self.enter();
        let result = self.render_inner(element, context);
        self.leave();
        result?;
        self.schedule()
    }

    fn render_inner(&self, element: &Element, context: Context) -> Result<()> {
        let (unmounts, effects) = {
            let mut state = self.state.try_borrow_mut().map_err(|_| Self::busy())?;
            let mut rec = Reconciler::new(
                Rc::clone(&state.document),
                state.lifecycles,
                self.updater.clone(),
            );
            state.scope = Scope::root(context);
            let scope = state.scope.clone();
            match state.current.take() {
                Some(mut fiber)
                    if fiber.ty.as_ref() == Some(&element.ty) && fiber.key == element.key =>
                {
                    debug!(container = %self.container, "updating root in place");
                    let result = rec.update_fiber(&mut fiber, element, &scope);
                    state.current = Some(fiber);
                    result?;
                }
                previous => {
                    if let Some(old) = previous {
                        rec.unmount_fiber(old);
                    }
                    debug!(container = %self.container, "mounting root");
                    state.current = Some(rec.mount_element(element, &scope)?);
                }
            }
            rec.into_effects()
        };
        run_effects(unmounts, effects)
    }

    pub fn unmount(&self) -> Result<()> {
        let (unmounts, effects) = {
            let mut state = self.state.try_borrow_mut().map_err(|_| Self::busy())?;
            let mut rec = Reconciler::new(
                Rc::clone(&state.document),
                state.lifecycles,
                self.updater.clone(),
            );
            if let Some(fiber) = state.current.take() {
                rec.unmount_fiber(fiber);
            }
            rec.into_effects()
        };
        debug!(container = %self.container, "root unmounted");
        self.enter();
        let result = run_effects(unmounts, effects);
        self.leave();
        result
    }

    /// Run `f` with updates deferred until it returns.
    pub fn batched(&self, f: &mut dyn FnMut() -> Result<()>) -> Result<()> {
        self.enter();
        let result = f();
        self.leave();
        result?;
        self.schedule()
    }

    /// Invoke `on<Event>` handlers from the target host node up to the root.
    /// A handler returning `false` stops propagation. Returns whether any handler ran.
    pub fn dispatch(&self, target: &HostNodeHandle, prop: &str, args: &[PropValue]) -> Result<bool> {
        let handlers = {
            let state = self.state.try_borrow().map_err(|_| Self::busy())?;
            let mut path = Vec::new();
            match &state.current {
                Some(root) if root.path_to_host(target, &mut path) => path
                    .iter()
                    .rev()
                    .filter(|f| f.tag == HOST_COMPONENT)
                    .filter_map(|f| f.props.get(prop).and_then(PropValue::as_function).cloned())
                    .collect::<Vec<_>>(),
                _ => Vec::new(),
            }
        };
        if handlers.is_empty() {
            return Ok(false);
        }
        trace!(event = prop, handlers = handlers.len(), "dispatching");
        self.batched(&mut || {
            for handler in &handlers {
                if handler.call(args)? == PropValue::Bool(false) {
                    break;
                }
            }
            Ok(())
        })?;
        Ok(true)
    }

    pub fn with_current<R>(&self, f: impl FnOnce(Option<&Fiber>) -> R) -> Result<R> {
        let state = self.state.try_borrow().map_err(|_| Self::busy())?;
        Ok(f(state.current.as_ref()))
    }

    pub fn markup(&self) -> Result<Option<String>> {
        self.with_current(|fiber| {
            fiber.map(|f| {
                let mut out = String::new();
                f.write_markup(&mut out);
                out
            })
        })
    }

    fn flush(&self) -> Result<()> {
        self.enter();
        let result = self.flush_passes();
        self.leave();
        result
    }

    fn flush_passes(&self) -> Result<()> {
        for pass in 0..MAX_UPDATE_PASSES {
            let (unmounts, effects) = {
                let mut state = self.state.try_borrow_mut().map_err(|_| Self::busy())?;
                let Some(mut current) = state.current.take() else {
                    return Ok(());
                };
                if !current.is_dirty() {
                    state.current = Some(current);
                    return Ok(());
                }
                trace!(pass, "flushing state updates");
                let mut rec = Reconciler::new(
                    Rc::clone(&state.document),
                    state.lifecycles,
                    self.updater.clone(),
                );
                let scope = state.scope.clone();
                let result = rec.flush_fiber(&mut current, &scope);
                state.current = Some(current);
                result?;
                rec.into_effects()
            };
            run_effects(unmounts, effects)?;
        }
        Err(Error::component(
            "Maximum update depth exceeded. A component repeatedly calls setState inside componentDidUpdate.",
        ))
    }
}

impl Updater for MountRoot {
    fn schedule(&self) -> Result<()> {
        if self.batch_depth.get() == 0 {
            self.flush()
        } else {
            Ok(())
        }
    }
}

impl Drop for MountRoot {
    fn drop(&mut self) {
        if let Ok(state) = self.state.try_borrow() {
            state.document.remove_container(&self.container);
        }
    }
}
