//! In-process host runtime the reference adapter drives.
//!
//! Mount roots keep a fiber tree (`fiber`), shallow roots keep a single
//! component instance (`shallow`). Class instances and host nodes live in
//! `Rc<RefCell<_>>` cells so handles handed out through refs and render-tree
//! snapshots survive re-renders.

mod dom;
mod fiber;
mod shallow;

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::{Rc, Weak};

use tracing::trace;

pub use dom::{document, Document, HostNodeHandle};
pub(crate) use dom::{write_close_tag, write_open_tag, write_text};
pub(crate) use fiber::{Fiber, MountRoot, StateNode};
pub(crate) use fiber::{
    CLASS_COMPONENT, CONTEXT_CONSUMER, CONTEXT_PROVIDER, FORWARD_REF, FRAGMENT,
    FUNCTION_COMPONENT, HOST_COMPONENT, HOST_PORTAL, HOST_TEXT, MEMO_COMPONENT,
};
pub(crate) use shallow::{ShallowOutput, ShallowRoot};

use crate::element::{
    format_number, ComponentClass, Context, ContextType, Element, LifecycleHook, PropValue,
    Props, RefValue, State, This,
};
use crate::error::{Error, Result};
use crate::rst::InstanceRef;

/// Guard against components that update themselves forever.
pub(crate) const MAX_UPDATE_PASSES: usize = 50;

/// Something that can apply queued state updates.
pub(crate) trait Updater {
    /// Flush now unless a batch is open.
    fn schedule(&self) -> Result<()>;
}

pub(crate) struct ClassInstance {
    pub class: Rc<ComponentClass>,
    pub props: Props,
    pub state: State,
    pub context: Context,
    pending: Vec<State>,
    force: bool,
    mounted: bool,
    updater: Weak<dyn Updater>,
}

impl ClassInstance {
    pub fn is_dirty(&self) -> bool {
        self.force || !self.pending.is_empty()
    }
}

/// Weak handle to a class component instance.
#[derive(Clone)]
pub struct InstanceHandle(Weak<RefCell<ClassInstance>>);

impl InstanceHandle {
    pub(crate) fn new(instance: &Rc<RefCell<ClassInstance>>) -> Self {
        Self(Rc::downgrade(instance))
    }

    fn live(&self, method: &str) -> Result<Rc<RefCell<ClassInstance>>> {
        self.0
            .upgrade()
            .filter(|i| i.borrow().mounted)
            .ok_or_else(|| Error::Unmounted(format!("{method}() was called on an unmounted component")))
    }

    /// Queue a shallow-merged state update. Applied immediately unless a batch is open.
    pub fn set_state(&self, partial: State) -> Result<()> {
        let instance = self.live("setState")?;
        let updater = {
            let mut inst = instance.borrow_mut();
            trace!(component = %inst.class.display_name(), keys = partial.len(), "state update queued");
            inst.pending.push(partial);
            inst.updater.clone()
        };
        match updater.upgrade() {
            Some(u) => u.schedule(),
            None => Ok(()),
        }
    }

    /// Re-render without a state change, bypassing `shouldComponentUpdate`.
    pub fn force_update(&self) -> Result<()> {
        let instance = self.live("forceUpdate")?;
        let updater = {
            let mut inst = instance.borrow_mut();
            inst.force = true;
            inst.updater.clone()
        };
        match updater.upgrade() {
            Some(u) => u.schedule(),
            None => Ok(()),
        }
    }

    pub fn state(&self) -> Option<State> {
        self.0.upgrade().map(|i| i.borrow().state.clone())
    }

    pub fn props(&self) -> Option<Props> {
        self.0.upgrade().map(|i| i.borrow().props.clone())
    }

    pub fn context(&self) -> Option<Context> {
        self.0.upgrade().map(|i| i.borrow().context.clone())
    }

    pub fn class(&self) -> Option<Rc<ComponentClass>> {
        self.0.upgrade().map(|i| Rc::clone(&i.borrow().class))
    }

    pub fn is_mounted(&self) -> bool {
        self.0.upgrade().is_some_and(|i| i.borrow().mounted)
    }

    pub fn ptr_eq(&self, other: &InstanceHandle) -> bool {
        self.0.ptr_eq(&other.0)
    }
}

pub(crate) fn create_instance(
    class: &Rc<ComponentClass>,
    props: Props,
    context: Context,
    updater: Weak<dyn Updater>,
) -> Rc<RefCell<ClassInstance>> {
    let state = class
        .initial_state
        .as_ref()
        .map(|f| f(&props, &context))
        .unwrap_or_default();
    Rc::new(RefCell::new(ClassInstance {
        class: Rc::clone(class),
        props,
        state,
        context,
        pending: Vec::new(),
        force: false,
        mounted: true,
        updater,
    }))
}

pub(crate) fn this_of(instance: &Rc<RefCell<ClassInstance>>) -> This {
    let inst = instance.borrow();
    This::new(
        inst.props.clone(),
        inst.state.clone(),
        inst.context.clone(),
        InstanceHandle::new(instance),
    )
}

pub(crate) fn render_instance(instance: &Rc<RefCell<ClassInstance>>) -> Result<PropValue> {
    let class = Rc::clone(&instance.borrow().class);
    let this = this_of(instance);
    (class.render)(&this)
}

/// Apply queued state plus new props/context to an instance and re-render it.
///
/// Returns the new output, or `None` when `shouldComponentUpdate` vetoed the render.
pub(crate) fn update_instance(
    instance: &Rc<RefCell<ClassInstance>>,
    next_props: Props,
    next_context: Context,
    lifecycles: bool,
    effects: &mut Vec<Effect>,
) -> Result<Option<PropValue>> {
    let (class, prev_props, prev_state, next_state, forced) = {
        let mut inst = instance.borrow_mut();
        let mut next_state = inst.state.clone();
        for partial in inst.pending.drain(..) {
            next_state.extend(partial);
        }
        let forced = std::mem::take(&mut inst.force);
        (
            Rc::clone(&inst.class),
            inst.props.clone(),
            inst.state.clone(),
            next_state,
            forced,
        )
    };

    let should_render = match (&class.should_update, lifecycles && !forced) {
        (Some(should_update), true) => should_update(&this_of(instance), &next_props, &next_state),
        _ => true,
    };

    {
        let mut inst = instance.borrow_mut();
        inst.props = next_props;
        inst.state = next_state;
        inst.context = next_context;
    }

    if !should_render {
        trace!(component = %class.display_name(), "render skipped by shouldComponentUpdate");
        return Ok(None);
    }

    let output = render_instance(instance)?;
    if lifecycles && class.implements(LifecycleHook::ComponentDidUpdate) {
        effects.push(Effect::DidUpdate(Rc::clone(instance), prev_props, prev_state));
    }
    Ok(Some(output))
}

/// Work deferred until the tree is committed and no borrow is held.
pub(crate) enum Effect {
    DidMount(Rc<RefCell<ClassInstance>>),
    DidUpdate(Rc<RefCell<ClassInstance>>, Props, State),
    WillUnmount(Rc<RefCell<ClassInstance>>),
    Ref(RefValue, Option<InstanceRef>),
}

impl Effect {
    fn run(self) -> Result<()> {
        match self {
            Effect::DidMount(instance) => {
                let class = Rc::clone(&instance.borrow().class);
                if let Some(hook) = &class.did_mount {
                    hook(&this_of(&instance))?;
                }
            }
            Effect::DidUpdate(instance, prev_props, prev_state) => {
                let class = Rc::clone(&instance.borrow().class);
                if let Some(hook) = &class.did_update {
                    hook(&this_of(&instance), &prev_props, &prev_state)?;
                }
            }
            Effect::WillUnmount(instance) => {
                let class = Rc::clone(&instance.borrow().class);
                let result = match &class.will_unmount {
                    Some(hook) => hook(&this_of(&instance)),
                    None => Ok(()),
                };
                instance.borrow_mut().mounted = false;
                result?;
            }
            Effect::Ref(r, value) => r.attach(value),
        }
        Ok(())
    }
}

/// Run unmount effects first, then mount/update effects, in order.
pub(crate) fn run_effects(unmounts: Vec<Effect>, effects: Vec<Effect>) -> Result<()> {
    for effect in unmounts.into_iter().chain(effects) {
        effect.run()?;
    }
    Ok(())
}

/// Context visible at a point in the tree.
#[derive(Clone, Default)]
pub(crate) struct Scope {
    legacy: Context,
    providers: BTreeMap<u64, PropValue>,
}

impl Scope {
    pub fn root(legacy: Context) -> Self {
        Self {
            legacy,
            providers: BTreeMap::new(),
        }
    }

    /// The legacy context keys a component declared.
    pub fn context_for(&self, keys: &[String]) -> Context {
        keys.iter()
            .filter_map(|k| self.legacy.get(k).map(|v| (k.clone(), v.clone())))
            .collect()
    }

    pub fn provided(&self, context: &ContextType) -> PropValue {
        self.providers
            .get(&context.id())
            .cloned()
            .unwrap_or_else(|| context.default_value().clone())
    }

    pub fn with_provider(&self, context: &ContextType, value: PropValue) -> Self {
        let mut next = self.clone();
        next.providers.insert(context.id(), value);
        next
    }

    pub fn with_legacy(&self, extra: Context) -> Self {
        let mut next = self.clone();
        next.legacy.extend(extra);
        next
    }
}

/// Scope a class instance exposes to its subtree.
pub(crate) fn child_scope(instance: &Rc<RefCell<ClassInstance>>, scope: &Scope) -> Scope {
    let class = Rc::clone(&instance.borrow().class);
    match &class.child_context {
        Some(f) => scope.with_legacy(f(&this_of(instance))),
        None => scope.clone(),
    }
}

/// Props with defaults filled in for missing or `undefined` entries.
pub(crate) fn with_defaults(defaults: &Props, props: &Props) -> Props {
    let mut merged = props.clone();
    for (k, v) in defaults {
        if !matches!(merged.get(k), Some(v) if !v.is_undefined()) {
            merged.insert(k.clone(), v.clone());
        }
    }
    merged
}

/// A renderable child after flattening.
pub(crate) enum Child {
    Element(Element),
    Text(String),
}

/// Flatten a children value; `null`, booleans and `undefined` render nothing.
pub(crate) fn flatten_children(value: &PropValue) -> Result<Vec<Child>> {
    let mut out = Vec::new();
    push_children(value, &mut out)?;
    Ok(out)
}

fn push_children(value: &PropValue, out: &mut Vec<Child>) -> Result<()> {
    match value {
        PropValue::Undefined | PropValue::Null | PropValue::Bool(_) | PropValue::Function(_) => {}
        PropValue::Number(n) => out.push(Child::Text(format_number(*n))),
        PropValue::String(s) => out.push(Child::Text(s.clone())),
        PropValue::Element(e) => out.push(Child::Element((**e).clone())),
        PropValue::List(items) => {
            for item in items {
                push_children(item, out)?;
            }
        }
        PropValue::Map(entries) => {
            for (_, item) in entries {
                push_children(item, out)?;
            }
        }
        PropValue::Object(map) => {
            let keys: Vec<&str> = map.keys().map(String::as_str).collect();
            return Err(Error::component(format!(
                "Objects are not valid as a child (found: object with keys {{{}}})",
                keys.join(", ")
            )));
        }
    }
    Ok(())
}
