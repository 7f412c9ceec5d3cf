//! Turning vnode trees into host mutations.
//!
//! A render pass has two phases. [`resolve`] expands components, fragments
//! and providers into a tree of host-tag and text nodes only, without
//! touching the host. [`mount`] and [`reconcile`] then synchronize the host
//! tree with that resolved tree, keeping the host node bound to every
//! resolved node in a [`Mounted`] tree for the next pass.

pub(crate) mod mount;
pub(crate) mod props;
pub(crate) mod reconcile;
pub(crate) mod resolve;

use arbor_core::{Key, Kind, PropValue, Props, VNode};
use arbor_core::element::NODE_VALUE;

/// A resolved node together with the host node it is bound to.
#[derive(Debug)]
pub struct Mounted<N> {
    pub kind: Kind,
    pub props: Props,
    pub node: N,
    pub children: Vec<Mounted<N>>,
}

impl<N> Mounted<N> {
    pub fn key(&self) -> Option<Key> {
        self.props.key()
    }

    pub fn text_value(&self) -> String {
        self.props
            .get(NODE_VALUE)
            .and_then(PropValue::to_text)
            .unwrap_or_default()
    }

    /// The resolved vnode this subtree was rendered from.
    pub fn to_vnode(&self) -> VNode {
        VNode {
            kind: self.kind.clone(),
            props: self.props.clone(),
            children: self.children.iter().map(Mounted::to_vnode).collect(),
        }
    }
}
