//! Unrendered element descriptions and component definitions.
//!
//! An [`Element`] is what a test hands to `mount`/`shallow`/`render`: a type,
//! a prop map (children live under the `children` prop), an optional key and
//! an optional ref. Component types are reference-counted definitions so that
//! two elements of the same component compare equal by identity.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::error::Result;
use crate::host::InstanceHandle;
use crate::rst::InstanceRef;

/// Prop map. Ordering is irrelevant to equality; `BTreeMap` keeps dumps stable.
pub type Props = BTreeMap<String, PropValue>;
/// Class component state.
pub type State = Props;
/// Legacy (named-key) context.
pub type Context = Props;

/// Build a [`Props`] map from `key => value` pairs.
///
/// ```
/// let p = treewright::props! { "id" => "foo", "count" => 2 };
/// assert_eq!(p.len(), 2);
/// ```
#[macro_export]
macro_rules! props {
    () => { $crate::element::Props::new() };
    ($($key:expr => $value:expr),+ $(,)?) => {{
        let mut map = $crate::element::Props::new();
        $( map.insert(::std::string::String::from($key), $crate::element::PropValue::from($value)); )+
        map
    }};
}

/// A dynamically typed prop value.
#[derive(Clone, Default)]
pub enum PropValue {
    #[default]
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    String(String),
    Function(Function),
    Element(Box<Element>),
    List(Vec<PropValue>),
    /// Ordered keyed collection; iterates its values in insertion order.
    Map(Vec<(String, PropValue)>),
    Object(BTreeMap<String, PropValue>),
}

impl PropValue {
    pub fn is_undefined(&self) -> bool {
        matches!(self, PropValue::Undefined)
    }

    /// `null` or `undefined`.
    pub fn is_nullish(&self) -> bool {
        matches!(self, PropValue::Undefined | PropValue::Null)
    }

    pub fn is_truthy(&self) -> bool {
        match self {
            PropValue::Undefined | PropValue::Null => false,
            PropValue::Bool(b) => *b,
            PropValue::Number(n) => *n != 0.0 && !n.is_nan(),
            PropValue::String(s) => !s.is_empty(),
            _ => true,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            PropValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            PropValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            PropValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_function(&self) -> Option<&Function> {
        match self {
            PropValue::Function(f) => Some(f),
            _ => None,
        }
    }

    pub fn as_element(&self) -> Option<&Element> {
        match self {
            PropValue::Element(e) => Some(e),
            _ => None,
        }
    }

    /// Name of the value's kind, as a script `typeof` would report it.
    pub fn type_of(&self) -> &'static str {
        match self {
            PropValue::Undefined => "undefined",
            PropValue::Bool(_) => "boolean",
            PropValue::Number(_) => "number",
            PropValue::String(_) => "string",
            PropValue::Function(_) => "function",
            _ => "object",
        }
    }

    /// String coercion: numbers print without a trailing `.0`, `null` prints `null`.
    pub fn to_js_string(&self) -> String {
        match self {
            PropValue::Undefined => "undefined".into(),
            PropValue::Null => "null".into(),
            PropValue::Bool(b) => b.to_string(),
            PropValue::Number(n) => format_number(*n),
            PropValue::String(s) => s.clone(),
            PropValue::Function(_) => "[Function]".into(),
            PropValue::Element(_) | PropValue::Object(_) | PropValue::Map(_) => {
                "[object Object]".into()
            }
            PropValue::List(items) => items
                .iter()
                .map(|v| {
                    if v.is_nullish() {
                        String::new()
                    } else {
                        v.to_js_string()
                    }
                })
                .collect::<Vec<_>>()
                .join(","),
        }
    }
}

/// Format a number the way script string coercion does.
pub fn format_number(n: f64) -> String {
    if n.is_nan() {
        "NaN".into()
    } else if n.is_infinite() {
        if n > 0.0 { "Infinity".into() } else { "-Infinity".into() }
    } else if n == 0.0 {
        "0".into()
    } else if n.fract() == 0.0 && n.abs() < 1e21 {
        format!("{n:.0}")
    } else {
        format!("{n}")
    }
}

impl PartialEq for PropValue {
    /// Deep value equality. `NaN` equals `NaN` and `0` equals `-0`;
    /// functions compare by identity.
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (PropValue::Undefined, PropValue::Undefined) => true,
            (PropValue::Null, PropValue::Null) => true,
            (PropValue::Bool(a), PropValue::Bool(b)) => a == b,
            (PropValue::Number(a), PropValue::Number(b)) => a == b || (a.is_nan() && b.is_nan()),
            (PropValue::String(a), PropValue::String(b)) => a == b,
            (PropValue::Function(a), PropValue::Function(b)) => a.ptr_eq(b),
            (PropValue::Element(a), PropValue::Element(b)) => a == b,
            (PropValue::List(a), PropValue::List(b)) => a == b,
            (PropValue::Map(a), PropValue::Map(b)) => a == b,
            (PropValue::Object(a), PropValue::Object(b)) => a == b,
            _ => false,
        }
    }
}

impl fmt::Debug for PropValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PropValue::Undefined => write!(f, "undefined"),
            PropValue::Null => write!(f, "null"),
            PropValue::Bool(b) => write!(f, "{b}"),
            PropValue::Number(n) => write!(f, "{}", format_number(*n)),
            PropValue::String(s) => write!(f, "{s:?}"),
            PropValue::Function(func) => write!(f, "{func:?}"),
            PropValue::Element(e) => write!(f, "{e:?}"),
            PropValue::List(items) => f.debug_list().entries(items).finish(),
            PropValue::Map(entries) => f
                .debug_map()
                .entries(entries.iter().map(|(k, v)| (k, v)))
                .finish(),
            PropValue::Object(map) => f.debug_map().entries(map).finish(),
        }
    }
}

impl From<&str> for PropValue {
    fn from(s: &str) -> Self {
        PropValue::String(s.to_string())
    }
}

impl From<String> for PropValue {
    fn from(s: String) -> Self {
        PropValue::String(s)
    }
}

impl From<bool> for PropValue {
    fn from(b: bool) -> Self {
        PropValue::Bool(b)
    }
}

impl From<f64> for PropValue {
    fn from(n: f64) -> Self {
        PropValue::Number(n)
    }
}

impl From<i32> for PropValue {
    fn from(n: i32) -> Self {
        PropValue::Number(n as f64)
    }
}

impl From<i64> for PropValue {
    fn from(n: i64) -> Self {
        PropValue::Number(n as f64)
    }
}

impl From<u32> for PropValue {
    fn from(n: u32) -> Self {
        PropValue::Number(n as f64)
    }
}

impl From<usize> for PropValue {
    fn from(n: usize) -> Self {
        PropValue::Number(n as f64)
    }
}

impl From<Element> for PropValue {
    fn from(e: Element) -> Self {
        PropValue::Element(Box::new(e))
    }
}

impl From<Function> for PropValue {
    fn from(f: Function) -> Self {
        PropValue::Function(f)
    }
}

impl From<Vec<PropValue>> for PropValue {
    fn from(items: Vec<PropValue>) -> Self {
        PropValue::List(items)
    }
}

impl From<Vec<Element>> for PropValue {
    fn from(items: Vec<Element>) -> Self {
        PropValue::List(items.into_iter().map(PropValue::from).collect())
    }
}

impl<T: Into<PropValue>> From<Option<T>> for PropValue {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(PropValue::Null)
    }
}

type Callback = dyn Fn(&[PropValue]) -> Result<PropValue>;

/// A callable prop value (event handler, render prop, ...). Compares by identity.
#[derive(Clone)]
pub struct Function {
    name: Option<Rc<str>>,
    f: Rc<Callback>,
}

impl Function {
    pub fn new(f: impl Fn(&[PropValue]) -> Result<PropValue> + 'static) -> Self {
        Self {
            name: None,
            f: Rc::new(f),
        }
    }

    pub fn named(name: &str, f: impl Fn(&[PropValue]) -> Result<PropValue> + 'static) -> Self {
        Self {
            name: Some(Rc::from(name)),
            f: Rc::new(f),
        }
    }

    /// A handler that ignores its arguments and returns `undefined`.
    pub fn noop() -> Self {
        Self::new(|_| Ok(PropValue::Undefined))
    }

    pub fn call(&self, args: &[PropValue]) -> Result<PropValue> {
        (self.f)(args)
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn ptr_eq(&self, other: &Function) -> bool {
        Rc::ptr_eq(&self.f, &other.f)
    }
}

impl fmt::Debug for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.name {
            Some(name) => write!(f, "[Function: {name}]"),
            None => write!(f, "[Function]"),
        }
    }
}

/// Normalize a key value: absent stays absent, anything else is stringified.
/// `null` therefore becomes the literal string `"null"`.
pub fn normalize_key(key: &PropValue) -> Option<String> {
    match key {
        PropValue::Undefined => None,
        other => Some(other.to_js_string()),
    }
}

/// An unrendered element description.
#[derive(Clone)]
pub struct Element {
    pub ty: ElementType,
    pub props: Props,
    pub key: Option<String>,
    pub ref_: Option<RefValue>,
    variadic: bool,
}

impl Element {
    pub fn new(ty: ElementType) -> Self {
        Self {
            ty,
            props: Props::new(),
            key: None,
            ref_: None,
            variadic: false,
        }
    }

    pub fn host(tag: &str) -> Self {
        Self::new(ElementType::Host(tag.to_string()))
    }

    pub fn class(class: &Rc<ComponentClass>) -> Self {
        Self::new(ElementType::Class(Rc::clone(class)))
    }

    pub fn function(component: &Rc<FunctionComponent>) -> Self {
        Self::new(ElementType::Function(Rc::clone(component)))
    }

    pub fn fragment() -> Self {
        Self::new(ElementType::Fragment)
    }

    /// Render children into a named document container outside the parent tree.
    pub fn portal(container: &str) -> Self {
        Self::new(ElementType::Portal).prop("container", container)
    }

    pub fn provider(context: &ContextType, value: impl Into<PropValue>) -> Self {
        Self::new(ElementType::Provider(context.clone())).prop("value", value)
    }

    /// A consumer whose render prop receives the nearest provided value.
    pub fn consumer(
        context: &ContextType,
        render: impl Fn(&PropValue) -> Result<PropValue> + 'static,
    ) -> Self {
        let f = Function::new(move |args| {
            let value = args.first().cloned().unwrap_or_default();
            render(&value)
        });
        Self::new(ElementType::Consumer(context.clone())).children(f)
    }

    pub fn prop(mut self, name: &str, value: impl Into<PropValue>) -> Self {
        self.props.insert(name.to_string(), value.into());
        self
    }

    pub fn with_props(mut self, props: Props) -> Self {
        self.props.extend(props);
        self
    }

    pub fn key(mut self, key: impl Into<PropValue>) -> Self {
        self.key = normalize_key(&key.into());
        self
    }

    pub fn with_ref(mut self, r: RefValue) -> Self {
        self.ref_ = Some(r);
        self
    }

    /// Append one child argument. A single child is stored bare; two or
    /// more become a list, each argument kept as its own entry.
    pub fn child(mut self, child: impl Into<PropValue>) -> Self {
        let child = child.into();
        let current = self.props.remove("children").unwrap_or_default();
        let next = match current {
            PropValue::Undefined if !self.variadic => child,
            PropValue::List(mut items) if self.variadic => {
                items.push(child);
                PropValue::List(items)
            }
            previous => {
                self.variadic = true;
                PropValue::List(vec![previous, child])
            }
        };
        self.props.insert("children".into(), next);
        self
    }

    /// Replace the `children` prop wholesale.
    pub fn children(mut self, children: impl Into<PropValue>) -> Self {
        self.variadic = false;
        self.props.insert("children".into(), children.into());
        self
    }

    /// Same props and ref under another type, without a key.
    pub(crate) fn retyped(&self, ty: ElementType) -> Element {
        Element {
            ty,
            key: None,
            ..self.clone()
        }
    }

    pub fn children_prop(&self) -> &PropValue {
        self.props.get("children").unwrap_or(&PropValue::Undefined)
    }
}

impl PartialEq for Element {
    fn eq(&self, other: &Self) -> bool {
        self.ty == other.ty && self.key == other.key && self.props == other.props
    }
}

impl fmt::Debug for Element {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = self.ty.display_name().unwrap_or_else(|| "Component".into());
        write!(f, "<{name} />")
    }
}

/// The type half of an element.
#[derive(Clone)]
pub enum ElementType {
    Host(String),
    Class(Rc<ComponentClass>),
    Function(Rc<FunctionComponent>),
    Fragment,
    Portal,
    Provider(ContextType),
    Consumer(ContextType),
    ForwardRef(Rc<ForwardRef>),
    Memo(Rc<Memo>),
}

impl ElementType {
    pub fn is_host(&self) -> bool {
        matches!(self, ElementType::Host(_))
    }

    /// Class and function components, including forward-ref and memo wrappers.
    pub fn is_composite(&self) -> bool {
        matches!(
            self,
            ElementType::Class(_)
                | ElementType::Function(_)
                | ElementType::ForwardRef(_)
                | ElementType::Memo(_)
        )
    }

    /// Name used in dumps and type selectors.
    pub fn display_name(&self) -> Option<String> {
        match self {
            ElementType::Host(tag) => Some(tag.clone()),
            ElementType::Class(c) => Some(c.display_name().to_string()).filter(|n| !n.is_empty()),
            ElementType::Function(c) => Some(c.display_name().to_string()).filter(|n| !n.is_empty()),
            ElementType::Fragment => Some("Fragment".into()),
            ElementType::Portal => Some("Portal".into()),
            ElementType::Provider(ctx) => Some(match ctx.display_name() {
                Some(name) => format!("{name}.Provider"),
                None => "ContextProvider".into(),
            }),
            ElementType::Consumer(ctx) => Some(match ctx.display_name() {
                Some(name) => format!("{name}.Consumer"),
                None => "ContextConsumer".into(),
            }),
            ElementType::ForwardRef(fwd) => Some(match &fwd.display_name {
                Some(name) => name.clone(),
                None => "ForwardRef".into(),
            }),
            ElementType::Memo(memo) => Some(match memo.inner.display_name() {
                Some(name) => format!("Memo({name})"),
                None => "Memo".into(),
            }),
        }
    }
}

impl PartialEq for ElementType {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (ElementType::Host(a), ElementType::Host(b)) => a == b,
            (ElementType::Class(a), ElementType::Class(b)) => Rc::ptr_eq(a, b),
            (ElementType::Function(a), ElementType::Function(b)) => Rc::ptr_eq(a, b),
            (ElementType::Fragment, ElementType::Fragment) => true,
            (ElementType::Portal, ElementType::Portal) => true,
            (ElementType::Provider(a), ElementType::Provider(b)) => a == b,
            (ElementType::Consumer(a), ElementType::Consumer(b)) => a == b,
            (ElementType::ForwardRef(a), ElementType::ForwardRef(b)) => Rc::ptr_eq(a, b),
            (ElementType::Memo(a), ElementType::Memo(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl fmt::Debug for ElementType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.display_name().unwrap_or_else(|| "Component".into()))
    }
}

static NEXT_CONTEXT_ID: AtomicU64 = AtomicU64::new(1);

struct ContextDef {
    id: u64,
    display_name: Option<String>,
    default_value: PropValue,
}

/// A provider/consumer context. Values flow from the nearest provider above a consumer.
#[derive(Clone)]
pub struct ContextType(Rc<ContextDef>);

impl ContextType {
    pub fn new(default_value: impl Into<PropValue>) -> Self {
        Self(Rc::new(ContextDef {
            id: NEXT_CONTEXT_ID.fetch_add(1, Ordering::Relaxed),
            display_name: None,
            default_value: default_value.into(),
        }))
    }

    pub fn named(name: &str, default_value: impl Into<PropValue>) -> Self {
        Self(Rc::new(ContextDef {
            id: NEXT_CONTEXT_ID.fetch_add(1, Ordering::Relaxed),
            display_name: Some(name.to_string()),
            default_value: default_value.into(),
        }))
    }

    pub fn id(&self) -> u64 {
        self.0.id
    }

    pub fn display_name(&self) -> Option<&str> {
        self.0.display_name.as_deref()
    }

    pub fn default_value(&self) -> &PropValue {
        &self.0.default_value
    }
}

impl PartialEq for ContextType {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

/// Lifecycle hooks a class component may implement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum LifecycleHook {
    ComponentDidMount,
    ShouldComponentUpdate,
    ComponentDidUpdate,
    ComponentWillUnmount,
}

impl LifecycleHook {
    pub const ALL: [LifecycleHook; 4] = [
        LifecycleHook::ComponentDidMount,
        LifecycleHook::ShouldComponentUpdate,
        LifecycleHook::ComponentDidUpdate,
        LifecycleHook::ComponentWillUnmount,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            LifecycleHook::ComponentDidMount => "componentDidMount",
            LifecycleHook::ShouldComponentUpdate => "shouldComponentUpdate",
            LifecycleHook::ComponentDidUpdate => "componentDidUpdate",
            LifecycleHook::ComponentWillUnmount => "componentWillUnmount",
        }
    }
}

/// The view a class component's render function and hooks receive.
pub struct This {
    pub props: Props,
    pub state: State,
    pub context: Context,
    handle: InstanceHandle,
}

impl This {
    pub(crate) fn new(props: Props, state: State, context: Context, handle: InstanceHandle) -> Self {
        Self {
            props,
            state,
            context,
            handle,
        }
    }

    pub fn prop(&self, name: &str) -> Option<&PropValue> {
        self.props.get(name)
    }

    pub fn state_value(&self, name: &str) -> Option<&PropValue> {
        self.state.get(name)
    }

    /// Queue a shallow-merged state update.
    pub fn set_state(&self, partial: State) -> Result<()> {
        self.handle.set_state(partial)
    }

    /// A handle that outlives this render, for use inside event handlers.
    pub fn handle(&self) -> InstanceHandle {
        self.handle.clone()
    }
}

type RenderFn = Rc<dyn Fn(&This) -> Result<PropValue>>;
type HookFn = Rc<dyn Fn(&This) -> Result<()>>;
type UpdateHookFn = Rc<dyn Fn(&This, &Props, &State) -> Result<()>>;
type ShouldUpdateFn = Rc<dyn Fn(&This, &Props, &State) -> bool>;
type InitialStateFn = Rc<dyn Fn(&Props, &Context) -> State>;
type ChildContextFn = Rc<dyn Fn(&This) -> Context>;

/// A stateful component definition.
pub struct ComponentClass {
    name: String,
    display_name: Option<String>,
    pub(crate) default_props: Props,
    pub(crate) context_types: Vec<String>,
    pub(crate) initial_state: Option<InitialStateFn>,
    pub(crate) render: RenderFn,
    pub(crate) did_mount: Option<HookFn>,
    pub(crate) should_update: Option<ShouldUpdateFn>,
    pub(crate) did_update: Option<UpdateHookFn>,
    pub(crate) will_unmount: Option<HookFn>,
    pub(crate) child_context: Option<ChildContextFn>,
}

impl ComponentClass {
    pub fn builder(name: &str) -> ComponentClassBuilder {
        ComponentClassBuilder {
            inner: ComponentClass {
                name: name.to_string(),
                display_name: None,
                default_props: Props::new(),
                context_types: Vec::new(),
                initial_state: None,
                render: Rc::new(|_| Ok(PropValue::Null)),
                did_mount: None,
                should_update: None,
                did_update: None,
                will_unmount: None,
                child_context: None,
            },
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn display_name(&self) -> &str {
        self.display_name.as_deref().unwrap_or(&self.name)
    }

    /// Whether this class implements the given lifecycle hook.
    pub fn implements(&self, hook: LifecycleHook) -> bool {
        match hook {
            LifecycleHook::ComponentDidMount => self.did_mount.is_some(),
            LifecycleHook::ShouldComponentUpdate => self.should_update.is_some(),
            LifecycleHook::ComponentDidUpdate => self.did_update.is_some(),
            LifecycleHook::ComponentWillUnmount => self.will_unmount.is_some(),
        }
    }
}

pub struct ComponentClassBuilder {
    inner: ComponentClass,
}

impl ComponentClassBuilder {
    pub fn display_name(mut self, name: &str) -> Self {
        self.inner.display_name = Some(name.to_string());
        self
    }

    pub fn default_prop(mut self, name: &str, value: impl Into<PropValue>) -> Self {
        self.inner.default_props.insert(name.to_string(), value.into());
        self
    }

    /// Legacy context keys this component reads.
    pub fn context_types(mut self, keys: &[&str]) -> Self {
        self.inner.context_types = keys.iter().map(|k| k.to_string()).collect();
        self
    }

    pub fn initial_state(mut self, f: impl Fn(&Props, &Context) -> State + 'static) -> Self {
        self.inner.initial_state = Some(Rc::new(f));
        self
    }

    pub fn render(mut self, f: impl Fn(&This) -> Result<PropValue> + 'static) -> Self {
        self.inner.render = Rc::new(f);
        self
    }

    pub fn component_did_mount(mut self, f: impl Fn(&This) -> Result<()> + 'static) -> Self {
        self.inner.did_mount = Some(Rc::new(f));
        self
    }

    /// Receives the next props and next state; returning `false` skips the render.
    pub fn should_component_update(
        mut self,
        f: impl Fn(&This, &Props, &State) -> bool + 'static,
    ) -> Self {
        self.inner.should_update = Some(Rc::new(f));
        self
    }

    /// Receives the previous props and previous state.
    pub fn component_did_update(
        mut self,
        f: impl Fn(&This, &Props, &State) -> Result<()> + 'static,
    ) -> Self {
        self.inner.did_update = Some(Rc::new(f));
        self
    }

    pub fn component_will_unmount(mut self, f: impl Fn(&This) -> Result<()> + 'static) -> Self {
        self.inner.will_unmount = Some(Rc::new(f));
        self
    }

    /// Legacy context this component provides to its descendants.
    pub fn child_context(mut self, f: impl Fn(&This) -> Context + 'static) -> Self {
        self.inner.child_context = Some(Rc::new(f));
        self
    }

    pub fn build(self) -> Rc<ComponentClass> {
        Rc::new(self.inner)
    }
}

type FunctionRenderFn = Rc<dyn Fn(&Props, &Context) -> Result<PropValue>>;

/// A stateless component: props and legacy context in, children out.
pub struct FunctionComponent {
    name: String,
    display_name: Option<String>,
    pub(crate) default_props: Props,
    pub(crate) context_types: Vec<String>,
    pub(crate) render: FunctionRenderFn,
}

impl FunctionComponent {
    pub fn new(
        name: &str,
        render: impl Fn(&Props, &Context) -> Result<PropValue> + 'static,
    ) -> Rc<Self> {
        Rc::new(Self {
            name: name.to_string(),
            display_name: None,
            default_props: Props::new(),
            context_types: Vec::new(),
            render: Rc::new(render),
        })
    }

    /// Like [`FunctionComponent::new`] with a display name, default props and context keys.
    pub fn with_options(
        name: &str,
        display_name: Option<&str>,
        default_props: Props,
        context_types: &[&str],
        render: impl Fn(&Props, &Context) -> Result<PropValue> + 'static,
    ) -> Rc<Self> {
        Rc::new(Self {
            name: name.to_string(),
            display_name: display_name.map(str::to_string),
            default_props,
            context_types: context_types.iter().map(|k| k.to_string()).collect(),
            render: Rc::new(render),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn display_name(&self) -> &str {
        self.display_name.as_deref().unwrap_or(&self.name)
    }
}

type ForwardRefRenderFn = Rc<dyn Fn(&Props, Option<&RefValue>) -> Result<PropValue>>;

/// A component that receives the ref its element was given.
pub struct ForwardRef {
    pub(crate) display_name: Option<String>,
    pub(crate) render: ForwardRefRenderFn,
}

pub fn forward_ref(
    display_name: Option<&str>,
    render: impl Fn(&Props, Option<&RefValue>) -> Result<PropValue> + 'static,
) -> ElementType {
    ElementType::ForwardRef(Rc::new(ForwardRef {
        display_name: display_name.map(str::to_string),
        render: Rc::new(render),
    }))
}

type CompareFn = Rc<dyn Fn(&Props, &Props) -> bool>;

/// Skips re-rendering the inner type while props compare equal.
pub struct Memo {
    pub(crate) inner: ElementType,
    pub(crate) compare: Option<CompareFn>,
}

pub fn memo(inner: ElementType) -> ElementType {
    ElementType::Memo(Rc::new(Memo {
        inner,
        compare: None,
    }))
}

pub fn memo_with(
    inner: ElementType,
    compare: impl Fn(&Props, &Props) -> bool + 'static,
) -> ElementType {
    ElementType::Memo(Rc::new(Memo {
        inner,
        compare: Some(Rc::new(compare)),
    }))
}

type RefCallback = Rc<dyn Fn(Option<InstanceRef>)>;

/// A ref attached to an element: called (or filled) with the backing instance.
#[derive(Clone)]
pub enum RefValue {
    Callback(RefCallback),
    Object(RefObject),
}

impl RefValue {
    pub fn callback(f: impl Fn(Option<InstanceRef>) + 'static) -> Self {
        RefValue::Callback(Rc::new(f))
    }

    pub(crate) fn attach(&self, instance: Option<InstanceRef>) {
        match self {
            RefValue::Callback(f) => f(instance),
            RefValue::Object(obj) => *obj.0.borrow_mut() = instance,
        }
    }
}

/// Holder filled with the instance on mount and cleared on unmount.
#[derive(Clone, Default)]
pub struct RefObject(Rc<RefCell<Option<InstanceRef>>>);

impl RefObject {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> Option<InstanceRef> {
        self.0.borrow().clone()
    }
}
