//! The interface between the renderer and a live output tree.
//!
//! The renderer never touches host nodes directly. Every mutation goes
//! through a [`HostAdapter`], and every prop name is routed through
//! [`classify`] before it reaches the adapter.

pub mod memory;

use std::fmt;

use arbor_core::element::{KEY, NODE_VALUE, REF};
use arbor_core::events::event_name;
use arbor_core::{Handler, PropValue};

pub use memory::{MemoryHost, Mutation, NodeId};

/// Mutation primitives of a host tree (a DOM, a widget tree, an in-memory
/// arena).
///
/// Node handles are cheap to clone and compare by identity.
pub trait HostAdapter {
    type Node: Clone + PartialEq + fmt::Debug + 'static;

    fn create_element(&mut self, tag: &str) -> Self::Node;
    fn create_text(&mut self, value: &str) -> Self::Node;
    fn set_text(&mut self, node: &Self::Node, value: &str);

    fn set_property(&mut self, node: &Self::Node, name: &str, value: &PropValue);
    fn remove_property(&mut self, node: &Self::Node, name: &str);

    /// Write one style declaration. An empty value clears it.
    fn set_style(&mut self, node: &Self::Node, name: &str, value: &str);

    fn add_listener(&mut self, node: &Self::Node, event: &str, handler: &Handler);
    fn remove_listener(&mut self, node: &Self::Node, event: &str, handler: &Handler);

    fn append_child(&mut self, parent: &Self::Node, child: &Self::Node);
    fn remove_child(&mut self, parent: &Self::Node, child: &Self::Node);
    fn replace_child(&mut self, parent: &Self::Node, old: &Self::Node, new: &Self::Node);

    /// Insert `child` before `reference`, or append when `reference` is
    /// `None`. A child already in the tree is moved.
    fn insert_before(
        &mut self,
        parent: &Self::Node,
        child: &Self::Node,
        reference: Option<&Self::Node>,
    );

    fn clear_children(&mut self, parent: &Self::Node);
}

/// Name of the structured style prop.
pub const STYLE: &str = "style";
/// Never a settable prop; children travel in the vnode's child list.
pub const CHILDREN: &str = "children";

/// How a prop name reaches the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PropertyKind {
    /// Consumed by the renderer, never forwarded.
    Reserved,
    /// A style map, written key by key.
    Style,
    /// A listener for the contained event name.
    Listener(String),
    /// Written as-is with `set_property`.
    Plain,
}

/// Classify a prop name.
pub fn classify(name: &str) -> PropertyKind {
    match name {
        CHILDREN | KEY | REF | NODE_VALUE => PropertyKind::Reserved,
        STYLE => PropertyKind::Style,
        _ => match event_name(name) {
            Some(event) => PropertyKind::Listener(event),
            None => PropertyKind::Plain,
        },
    }
}
