//! Building host subtrees for resolved nodes.

use arbor_core::{ElementError, Kind, Props, VNode};

use super::props::{patch_props, update_ref};
use super::Mounted;
use crate::host::HostAdapter;

/// Create the host subtree for a resolved node.
///
/// The returned node is not attached; the caller inserts it.
pub(crate) fn mount<H: HostAdapter>(
    host: &mut H,
    vnode: VNode,
) -> Result<Mounted<H::Node>, ElementError> {
    vnode.validate_host()?;
    let text = vnode.text_value();
    let VNode {
        kind,
        props,
        children,
    } = vnode;

    let (node, children) = match &kind {
        Kind::Tag(tag) => {
            let node = host.create_element(tag);
            patch_props(host, &node, &Props::new(), &props);
            let mut mounted = Vec::with_capacity(children.len());
            for child in children {
                let child = mount(host, child)?;
                host.append_child(&node, &child.node);
                mounted.push(child);
            }
            (node, mounted)
        }
        _ => (host.create_text(&text), Vec::new()),
    };
    tracing::trace!(kind = kind.name(), ?node, "mounted");

    update_ref(None, &props, &node);
    Ok(Mounted {
        kind,
        props,
        node,
        children,
    })
}

/// Clear the refs of a subtree that left the host tree.
pub(crate) fn release<N>(mounted: &Mounted<N>) {
    if let Some(node_ref) = mounted.props.node_ref() {
        node_ref.detach();
    }
    for child in &mounted.children {
        release(child);
    }
}
