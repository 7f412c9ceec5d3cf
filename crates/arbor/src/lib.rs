//! Arbor - a small declarative UI rendering toolkit.
//!
//! Arbor turns trees of virtual nodes into host trees and keeps them in
//! sync: components render [`VNode`](arbor_core::VNode)s, the renderer
//! resolves them to host elements, and later renders are reconciled against
//! what was mounted so that only the differences reach the host.
//!
//! The host is anything implementing [`HostAdapter`]. [`MemoryHost`] is an
//! in-memory document used for tests and server-side rendering.
//!
//! # Quick Start
//!
//! ```ignore
//! use arbor::prelude::*;
//!
//! let counter = Component::new("Counter", |cx, _| {
//!     let (count, set_count) = cx.use_state(0);
//!     VNode::element("button")
//!         .prop("onClick", Handler::from_fn(move || set_count.update(|n| n + 1)))
//!         .child(count)
//! });
//!
//! let mut host = MemoryHost::new();
//! let container = host.create_container("div");
//! let mut root = Root::new(host, container);
//! root.render(VNode::component(&counter, Props::new()))?;
//! ```
//!
//! # State Management with Hooks
//!
//! Hooks are methods on the [`Scope`](arbor_core::Scope) a component
//! receives. Their state is kept per component instance across renders.
//!
//! | Hook | Purpose |
//! |------|---------|
//! | `use_state` | State with a `(value, setter)` tuple; setting schedules a re-render |
//! | `use_ref` | Mutable cell that survives renders without triggering them |
//! | `use_effect` | Side effects after the patch, when dependencies change |
//! | `use_effect_cleanup` | Effects with cleanup functions |
//! | `use_mount` | One-time effect on first render |
//! | `use_memo` | Memoized computations |
//! | `use_callback` | Memoized callbacks |
//! | `use_context` | Value of the nearest provider |
//!
//! ## Rules of Hooks
//!
//! Hooks must be called in the **same order** on every render:
//!
//! - ✅ Call hooks at the top level of the render function
//! - ❌ Don't call hooks inside conditionals (`if`/`match`)
//! - ❌ Don't call hooks inside loops
//! - ❌ Don't call hooks after early returns
//!
//! # Fine-grained reactivity
//!
//! [`Runtime`](arbor_core::Runtime) provides signals, effects and memos
//! independent of the component model. See [`arbor_core::reactive`].

pub mod config;
pub mod error;
pub mod host;
pub mod renderer;
mod root;

pub mod prelude {
    //! Common imports for arbor applications.
    pub use crate::host::{HostAdapter, MemoryHost};
    pub use crate::{RenderError, Root, RootConfig};
    pub use arbor_core::{children, props};
    pub use arbor_core::{
        create_context, create_element, Always, Child, Component, Context, Event, Handler, Key,
        Kind, NodeRef, PropValue, Props, RefHandle, Scope, StateSetter, StyleMap, VNode,
    };
    pub use arbor_core::{Effect, Memo, ReadSignal, Runtime, WriteSignal};
}

pub use arbor_core as core;
pub use config::RootConfig;
pub use error::RenderError;
pub use host::{HostAdapter, MemoryHost};
pub use root::Root;
