use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use tracing::{debug, trace};

use super::{
    create_instance, render_instance, run_effects, update_instance, with_defaults, ClassInstance,
    Effect, InstanceHandle, Scope, Updater, MAX_UPDATE_PASSES,
};
use crate::element::{Context, Element, ElementType, LifecycleHook, PropValue};
use crate::error::{Error, Result};

/// What a shallow root currently shows: the root element, what it rendered
/// one level deep, and its instance when it is a class.
#[derive(Clone)]
pub(crate) struct ShallowOutput {
    pub element: Element,
    pub output: PropValue,
    pub instance: Option<InstanceHandle>,
}

struct ShallowState {
    element: Option<Element>,
    instance: Option<Rc<RefCell<ClassInstance>>>,
    output: PropValue,
    context: Context,
    lifecycles: bool,
}

/// Renders a single component one level deep; children stay unrendered elements.
pub(crate) struct ShallowRoot {
    state: RefCell<ShallowState>,
    batch_depth: Cell<usize>,
    updater: Weak<dyn Updater>,
}

impl ShallowRoot {
    pub fn new(lifecycles: bool) -> Rc<Self> {
        Rc::new_cyclic(|weak: &Weak<ShallowRoot>| {
            let updater: Weak<dyn Updater> = weak.clone();
            ShallowRoot {
                state: RefCell::new(ShallowState {
                    element: None,
                    instance: None,
                    output: PropValue::Undefined,
                    context: Context::new(),
                    lifecycles,
                }),
                batch_depth: Cell::new(0),
                updater,
            }
        })
    }

    fn busy() -> Error {
        Error::internal("shallow root is already being updated")
    }

    fn enter(&self) {
        self.batch_depth.set(self.batch_depth.get() + 1);
    }

    fn leave(&self) {
        self.batch_depth.set(self.batch_depth.get().saturating_sub(1));
    }

    pub fn render(&self, element: &Element, context: Context) -> Result<()> {
        self.enter();
        let result = self.render_inner(element, context);
        self.leave();
        result?;
        self.schedule()
    }

    fn render_inner(&self, element: &Element, context: Context) -> Result<()> {
        let mut unmounts = Vec::new();
        let mut effects = Vec::new();
        {
            let mut state = self.state.try_borrow_mut().map_err(|_| Self::busy())?;
            let lifecycles = state.lifecycles;
            let same_root = state
                .element
                .as_ref()
                .is_some_and(|prev| prev.ty == element.ty && prev.key == element.key);
            let current = if same_root { state.instance.clone() } else { None };
            let mut mounted = None;

            // Nothing in `state` changes until the new output is in hand.
            let ty = unwrap_memo(&element.ty);
            let scope = Scope::root(context.clone());
            let output = match &ty {
                ElementType::Class(class) => {
                    let props = with_defaults(&class.default_props, &element.props);
                    let ctx = scope.context_for(&class.context_types);
                    match current {
                        Some(instance) => {
                            debug!(component = %class.display_name(), "shallow update");
                            match update_instance(&instance, props, ctx, lifecycles, &mut effects)? {
                                Some(output) => output,
                                None => state.output.clone(),
                            }
                        }
                        None => {
                            debug!(component = %class.display_name(), "shallow mount");
                            let instance = create_instance(class, props, ctx, self.updater.clone());
                            let output = render_instance(&instance)?;
                            if lifecycles && class.implements(LifecycleHook::ComponentDidMount) {
                                effects.push(Effect::DidMount(Rc::clone(&instance)));
                            }
                            mounted = Some(instance);
                            output
                        }
                    }
                }
                ElementType::Function(component) => {
                    let props = with_defaults(&component.default_props, &element.props);
                    let ctx = scope.context_for(&component.context_types);
                    (component.render)(&props, &ctx)?
                }
                ElementType::ForwardRef(fwd) => (fwd.render)(&element.props, element.ref_.as_ref())?,
                ElementType::Consumer(ctx) => match element.children_prop() {
                    PropValue::Function(f) => f.call(&[scope.provided(ctx)])?,
                    _ => {
                        return Err(Error::component(
                            "A context consumer expects a single function as its child",
                        ))
                    }
                },
                ElementType::Provider(_) => element.children_prop().clone(),
                _ => PropValue::Undefined,
            };

            if !same_root {
                if let Some(previous) = state.instance.take() {
                    unmounts.push(Effect::WillUnmount(previous));
                }
            }
            if mounted.is_some() {
                state.instance = mounted;
            }
            state.output = output;
            state.element = Some(element.clone());
            state.context = context;
        }
        run_effects(unmounts, effects)
    }

    pub fn unmount(&self) -> Result<()> {
        let instance = {
            let mut state = self.state.try_borrow_mut().map_err(|_| Self::busy())?;
            state.element = None;
            state.output = PropValue::Undefined;
            state.instance.take()
        };
        match instance {
            Some(instance) => run_effects(vec![Effect::WillUnmount(instance)], Vec::new()),
            None => Ok(()),
        }
    }

    pub fn batched(&self, f: &mut dyn FnMut() -> Result<()>) -> Result<()> {
        self.enter();
        let result = f();
        self.leave();
        result?;
        self.schedule()
    }

    pub fn snapshot(&self) -> Result<Option<ShallowOutput>> {
        let state = self.state.try_borrow().map_err(|_| Self::busy())?;
        Ok(state.element.as_ref().map(|element| ShallowOutput {
            element: element.clone(),
            output: state.output.clone(),
            instance: state.instance.as_ref().map(InstanceHandle::new),
        }))
    }

    fn flush(&self) -> Result<()> {
        self.enter();
        let result = self.flush_passes();
        self.leave();
        result
    }

    fn flush_passes(&self) -> Result<()> {
        for pass in 0..MAX_UPDATE_PASSES {
            let mut effects = Vec::new();
            {
                let mut state = self.state.try_borrow_mut().map_err(|_| Self::busy())?;
                let Some(instance) = state.instance.clone() else {
                    return Ok(());
                };
                if !instance.borrow().is_dirty() {
                    return Ok(());
                }
                trace!(pass, "shallow flush");
                let (props, context) = {
                    let inst = instance.borrow();
                    (inst.props.clone(), inst.context.clone())
                };
                let lifecycles = state.lifecycles;
                if let Some(output) = update_instance(&instance, props, context, lifecycles, &mut effects)? {
                    state.output = output;
                }
            }
            run_effects(Vec::new(), effects)?;
        }
        Err(Error::component(
            "Maximum update depth exceeded. A component repeatedly calls setState inside componentDidUpdate.",
        ))
    }
}

impl Updater for ShallowRoot {
    fn schedule(&self) -> Result<()> {
        if self.batch_depth.get() == 0 {
            self.flush()
        } else {
            Ok(())
        }
    }
}

/// Shallow rendering a memo wrapper renders the wrapped type.
fn unwrap_memo(ty: &ElementType) -> ElementType {
    match ty {
        ElementType::Memo(memo) => unwrap_memo(&memo.inner),
        other => other.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::element::{ComponentClass, FunctionComponent};
    use crate::props;

    #[test]
    fn renders_one_level_only() {
        let child = FunctionComponent::new("Child", |_, _| Ok(Element::host("i").into()));
        let parent = FunctionComponent::new("Parent", move |_, _| {
            Ok(Element::host("div").child(Element::function(&child)).into())
        });
        let root = ShallowRoot::new(true);
        root.render(&Element::function(&parent), Context::new()).unwrap();
        let out = root.snapshot().unwrap().unwrap();
        let div = out.output.as_element().unwrap();
        let inner = div.children_prop().as_element().unwrap();
        assert_eq!(inner.ty.display_name().as_deref(), Some("Child"));
    }

    #[test]
    fn lifecycles_can_be_disabled() {
        let mounted = Rc::new(Cell::new(false));
        let flag = Rc::clone(&mounted);
        let class = ComponentClass::builder("Foo")
            .component_did_mount(move |_| {
                flag.set(true);
                Ok(())
            })
            .build();
        let root = ShallowRoot::new(false);
        root.render(&Element::class(&class), Context::new()).unwrap();
        assert!(!mounted.get());
    }

    #[test]
    fn state_updates_rerender_the_output() {
        let class = ComponentClass::builder("Toggle")
            .initial_state(|_, _| props! { "on" => false })
            .render(|this| {
                let on = this.state_value("on").and_then(PropValue::as_bool).unwrap_or(false);
                Ok(Element::host("span").child(if on { "on" } else { "off" }).into())
            })
            .build();
        let root = ShallowRoot::new(true);
        root.render(&Element::class(&class), Context::new()).unwrap();
        let handle = root.snapshot().unwrap().unwrap().instance.unwrap();
        handle.set_state(props! { "on" => true }).unwrap();
        let out = root.snapshot().unwrap().unwrap().output;
        assert_eq!(out.as_element().unwrap().children_prop(), &PropValue::from("on"));
    }

    #[test]
    fn declared_context_reaches_the_component() {
        let class = ComponentClass::builder("Named")
            .context_types(&["name"])
            .render(|this| Ok(this.context.get("name").cloned().unwrap_or_default()))
            .build();
        let root = ShallowRoot::new(true);
        root.render(&Element::class(&class), props! { "name" => "foo", "x" => 1 })
            .unwrap();
        assert_eq!(root.snapshot().unwrap().unwrap().output, PropValue::from("foo"));
        let ctx = root.snapshot().unwrap().unwrap().instance.unwrap().context().unwrap();
        assert_eq!(ctx.len(), 1);
    }

    #[test]
    fn failed_root_swap_keeps_the_mounted_instance() {
        let unmounted = Rc::new(Cell::new(0));
        let hook = Rc::clone(&unmounted);
        let stable = ComponentClass::builder("Stable")
            .initial_state(|_, _| props! { "n" => 0 })
            .render(|this| Ok(this.state_value("n").cloned().unwrap_or_default()))
            .component_will_unmount(move |_| {
                hook.set(hook.get() + 1);
                Ok(())
            })
            .build();
        let broken = ComponentClass::builder("Broken")
            .render(|_| Err(Error::component("broken render")))
            .build();

        let root = ShallowRoot::new(true);
        root.render(&Element::class(&stable), Context::new()).unwrap();
        let handle = root.snapshot().unwrap().unwrap().instance.unwrap();
        handle.set_state(props! { "n" => 7 }).unwrap();

        let err = root.render(&Element::class(&broken), Context::new()).unwrap_err();
        assert!(matches!(&err, Error::Component(m) if m == "broken render"));
        assert_eq!(unmounted.get(), 0);

        let out = root.snapshot().unwrap().unwrap();
        assert_eq!(out.element.ty.display_name().as_deref(), Some("Stable"));
        assert!(out.instance.unwrap().ptr_eq(&handle));

        root.render(&Element::class(&stable), Context::new()).unwrap();
        assert_eq!(root.snapshot().unwrap().unwrap().output, PropValue::from(7));
        assert!(handle.is_mounted());

        root.unmount().unwrap();
        assert_eq!(unmounted.get(), 1);
    }
}
