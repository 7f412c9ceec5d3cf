//! Core types for arbor: vnodes, hooks and signals.

pub mod element;
pub mod error;
pub mod events;
pub mod hooks;
pub mod reactive;
pub mod schedule;

pub use element::{
    create_element, Child, Component, ComponentId, Key, Kind, NodeRef, PropValue, Props,
    RefTarget, StyleMap, VNode,
};
pub use error::ElementError;

// Re-export hooks for ergonomic state management
pub use hooks::{
    create_context, Always, Context, ContextId, ContextStack, HookMeta, HookRegistry, RefHandle,
    Scope, SlotKind, StateSetter,
};

// Re-export reactive types for convenience
pub use reactive::{Effect, Memo, ReadSignal, Runtime, WriteSignal};

pub use events::{Event, EventCallback, EventHandlerId, Handler};
pub use schedule::{Cleanup, PendingEffect, RenderContext};
