//! Error types for render, query and adapter operations

use thiserror::Error;

/// Result type alias for treewright operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by wrappers, the selector engine and adapters.
///
/// Every message names the operation that failed so a failing test points
/// at the misuse rather than at library internals.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    /// Missing or invalid adapter configuration
    #[error("{0}")]
    Config(String),

    /// A single-node method was called on a wrapper of a different size
    #[error("Method “{method}” is meant to be run on 1 node. {found} found instead.")]
    Cardinality { method: String, found: usize },

    /// A root-only method was called on a derived wrapper
    #[error("{wrapper}::{method}() can only be called on the root")]
    RootOnly {
        wrapper: &'static str,
        method: &'static str,
    },

    /// The selector could not be parsed
    #[error("Failed to parse selector: {0}")]
    Selector(String),

    /// The selector uses a pseudo-class or pseudo-element we do not evaluate
    #[error("Selector does not support the \"{0}\" pseudo-element or pseudo-class selectors.")]
    UnsupportedSelector(String),

    /// A complex selector was passed where only a simple selector is accepted
    #[error("{0}")]
    ComplexSelector(String),

    /// Mount-mode work attempted without a DOM-capable environment
    #[error("{0}")]
    Environment(String),

    /// Adapter produced or met a shape it does not understand
    #[error("internal error: {0}")]
    Internal(String),

    /// An event name with no mapping and no handler on the target
    #[error("{wrapper}::simulate() event '{event}' does not exist")]
    Simulate {
        wrapper: &'static str,
        event: String,
    },

    /// Wrong argument or wrong kind of node for the operation
    #[error("{0}")]
    Type(String),

    /// Raised by a component while rendering, handling an event or running a lifecycle hook
    #[error("{0}")]
    Component(String),

    /// The root was unmounted
    #[error("{0}")]
    Unmounted(String),
}

impl Error {
    /// Error raised from inside a component.
    pub fn component(message: impl Into<String>) -> Self {
        Error::Component(message.into())
    }

    pub(crate) fn internal(message: impl Into<String>) -> Self {
        Error::Internal(message.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cardinality_message_names_method_and_count() {
        let err = Error::Cardinality {
            method: "props".into(),
            found: 2,
        };
        assert_eq!(
            err.to_string(),
            "Method “props” is meant to be run on 1 node. 2 found instead."
        );
    }

    #[test]
    fn root_only_message_is_greppable() {
        let err = Error::RootOnly {
            wrapper: "MountWrapper",
            method: "set_props",
        };
        assert_eq!(
            err.to_string(),
            "MountWrapper::set_props() can only be called on the root"
        );
    }

    #[test]
    fn internal_errors_carry_a_distinct_prefix() {
        let err = Error::internal("unknown node with tag 42");
        assert!(err.to_string().starts_with("internal error: "));
    }
}
