//! Errors raised while validating vnode trees.

use thiserror::Error;

/// A malformed node was found where a host or text node was expected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ElementError {
    /// The tag is empty or contains characters no host accepts.
    #[error("invalid host tag `{0}`")]
    InvalidTag(String),

    /// Text nodes carry their value in `nodeValue` and never have children.
    #[error("text node cannot have children (found {count})")]
    TextWithChildren { count: usize },

    /// A component, provider or fragment reached the host layer.
    #[error("{kind} node reached the host tree without being resolved")]
    Unresolved { kind: String },
}
