//! Process-wide adapter configuration and per-render options.

use std::fmt;
use std::sync::Arc;

use once_cell::sync::Lazy;
use parking_lot::RwLock;
use tracing::info;

use crate::adapter::Adapter;
use crate::element::{Context, ElementType, PropValue, Props};
use crate::error::{Error, Result};

/// Global settings applied to every render that does not override them.
#[derive(Clone, Default)]
pub struct Configuration {
    pub adapter: Option<Arc<dyn Adapter>>,
    /// `None` leaves the current setting alone.
    pub disable_lifecycle_methods: Option<bool>,
}

impl Configuration {
    pub fn with_adapter(adapter: impl Adapter + 'static) -> Self {
        Self {
            adapter: Some(Arc::new(adapter)),
            disable_lifecycle_methods: None,
        }
    }

    pub fn disable_lifecycle_methods(mut self, disable: bool) -> Self {
        self.disable_lifecycle_methods = Some(disable);
        self
    }

    fn merge(&mut self, other: Configuration) {
        if other.adapter.is_some() {
            self.adapter = other.adapter;
        }
        if other.disable_lifecycle_methods.is_some() {
            self.disable_lifecycle_methods = other.disable_lifecycle_methods;
        }
    }
}

impl fmt::Debug for Configuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Configuration")
            .field("adapter", &self.adapter.as_ref().map(|a| a.name().to_string()))
            .field("disable_lifecycle_methods", &self.disable_lifecycle_methods)
            .finish()
    }
}

static CONFIG: Lazy<RwLock<Configuration>> = Lazy::new(|| RwLock::new(Configuration::default()));

/// Merge `config` into the global configuration. Fields left `None` keep their current value.
pub fn configure(config: Configuration) -> Result<()> {
    if let Some(adapter) = &config.adapter {
        if adapter.options().modes.is_empty() {
            return Err(Error::Config(format!(
                "adapter \"{}\" does not support any render mode",
                adapter.name()
            )));
        }
        info!(adapter = adapter.name(), "adapter configured");
    }
    CONFIG.write().merge(config);
    Ok(())
}

/// Snapshot of the global configuration.
pub fn get() -> Configuration {
    CONFIG.read().clone()
}

pub fn reset() {
    *CONFIG.write() = Configuration::default();
}

/// The adapter a render should use: its own, else the configured one.
pub fn adapter_for(options: &RenderOptions) -> Result<Arc<dyn Adapter>> {
    options
        .adapter
        .clone()
        .or_else(|| CONFIG.read().adapter.clone())
        .ok_or_else(|| {
            Error::Config(
                "treewright expects an adapter to be configured, but found none. \
                 Call `treewright::configure` or pass an adapter in the render options."
                    .into(),
            )
        })
}

/// Options for a single `mount`/`shallow`/`render` call.
#[derive(Clone, Default)]
pub struct RenderOptions {
    pub context: Option<Context>,
    pub child_context_types: Vec<String>,
    pub attach_to: Option<String>,
    pub hydrate_in: Option<String>,
    pub wrapping_component: Option<ElementType>,
    pub wrapping_component_props: Props,
    pub disable_lifecycle_methods: Option<bool>,
    pub adapter: Option<Arc<dyn Adapter>>,
}

impl RenderOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn context(mut self, context: Context) -> Self {
        self.context = Some(context);
        self
    }

    pub fn context_value(mut self, key: &str, value: impl Into<PropValue>) -> Self {
        self.context
            .get_or_insert_with(Context::new)
            .insert(key.to_string(), value.into());
        self
    }

    pub fn child_context_types(mut self, keys: &[&str]) -> Self {
        self.child_context_types = keys.iter().map(|k| k.to_string()).collect();
        self
    }

    /// Mount into a named document container.
    pub fn attach_to(mut self, container: &str) -> Self {
        self.attach_to = Some(container.to_string());
        self
    }

    pub fn hydrate_in(mut self, container: &str) -> Self {
        self.hydrate_in = Some(container.to_string());
        self
    }

    /// Render the root inside `ty`, which must render its `children` prop.
    pub fn wrapping_component(mut self, ty: ElementType, props: Props) -> Self {
        self.wrapping_component = Some(ty);
        self.wrapping_component_props = props;
        self
    }

    pub fn disable_lifecycle_methods(mut self, disable: bool) -> Self {
        self.disable_lifecycle_methods = Some(disable);
        self
    }

    pub fn adapter(mut self, adapter: impl Adapter + 'static) -> Self {
        self.adapter = Some(Arc::new(adapter));
        self
    }

    pub fn lifecycles_disabled(&self) -> bool {
        self.disable_lifecycle_methods
            .or_else(|| CONFIG.read().disable_lifecycle_methods)
            .unwrap_or(false)
    }

    pub fn context_or_default(&self) -> Context {
        self.context.clone().unwrap_or_default()
    }
}

impl fmt::Debug for RenderOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RenderOptions")
            .field("context", &self.context)
            .field("child_context_types", &self.child_context_types)
            .field("attach_to", &self.attach_to)
            .field("hydrate_in", &self.hydrate_in)
            .field("wrapping_component", &self.wrapping_component)
            .field("disable_lifecycle_methods", &self.disable_lifecycle_methods)
            .field("adapter", &self.adapter.as_ref().map(|a| a.name().to_string()))
            .finish()
    }
}
