//! Render errors.

use arbor_core::ElementError;
use thiserror::Error;

/// Errors that can occur while rendering into a root.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RenderError {
    /// The tree contained a node no host can represent.
    #[error("malformed tree: {0}")]
    Element(#[from] ElementError),

    /// State updates kept scheduling renders past the configured limit.
    #[error("updates did not settle after {passes} render passes")]
    FlushLimit { passes: usize },
}
