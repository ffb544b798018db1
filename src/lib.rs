//! Inspect, query and drive rendered component trees.
//!
//! Renders go through an [`Adapter`] that turns a framework's internal tree
//! into a version-agnostic render tree ([`RstNode`]). Everything else
//! (selectors, traversal, the [`Wrapper`] facade, [`debug`] dumps) works on
//! that tree alone.
//!
//! ```
//! use treewright::{mount, Element, ReferenceAdapter, RenderOptions};
//!
//! let el = Element::host("ul")
//!     .child(Element::host("li").prop("className", "item").child("a"))
//!     .child(Element::host("li").prop("className", "item").child("b"));
//! let wrapper = mount(&el, RenderOptions::new().adapter(ReferenceAdapter::new())).unwrap();
//! assert_eq!(wrapper.find(".item").unwrap().len(), 2);
//! assert_eq!(wrapper.text().unwrap(), "ab");
//! ```

pub mod adapter;
pub mod config;
pub mod debug;
pub mod element;
pub mod error;
pub mod host;
pub mod html;
pub mod rst;
pub mod selector;
pub mod traverse;
pub mod wrapper;

pub use adapter::{Adapter, AdapterOptions, ReferenceAdapter, RenderMode, Renderer};
pub use config::{configure, Configuration, RenderOptions};
pub use debug::{debug_node, debug_nodes, DebugOptions};
pub use element::{
    ComponentClass, Context, ContextType, Element, ElementType, Function, FunctionComponent,
    LifecycleHook, PropValue, Props, State,
};
pub use error::{Error, Result};
pub use rst::{InstanceRef, NodeType, RstNode, Tree};
pub use selector::Query;
pub use traverse::ClassMatcher;
pub use wrapper::{mount, render, shallow, Contained, StringWrapper, Wrapper};
