//! Property patching.

use arbor_core::Props;

use crate::host::{classify, HostAdapter, PropertyKind, STYLE};

/// Bring the host properties of `node` from `old` to `new`.
///
/// Listener values are swapped only when the handler changed, style maps
/// are merged key by key, and everything that compares equal is skipped.
pub(crate) fn patch_props<H: HostAdapter>(host: &mut H, node: &H::Node, old: &Props, new: &Props) {
    for (name, old_value) in old.iter() {
        if new.contains(name) {
            continue;
        }
        match classify(name) {
            PropertyKind::Reserved => {}
            PropertyKind::Listener(event) => {
                if let Some(handler) = old_value.as_handler() {
                    host.remove_listener(node, &event, handler);
                }
            }
            PropertyKind::Style | PropertyKind::Plain => host.remove_property(node, name),
        }
    }

    for (name, value) in new.iter() {
        let old_value = old.get(name);
        if old_value == Some(value) {
            continue;
        }
        match classify(name) {
            PropertyKind::Reserved => {}
            PropertyKind::Listener(event) => {
                let Some(handler) = value.as_handler() else {
                    tracing::warn!(prop = name, ?value, "listener prop does not hold a handler, ignoring");
                    continue;
                };
                if let Some(previous) = old_value.and_then(|v| v.as_handler()) {
                    host.remove_listener(node, &event, previous);
                }
                tracing::trace!(?node, event = %event, "listener attached");
                host.add_listener(node, &event, handler);
            }
            PropertyKind::Style => match value.as_style() {
                Some(style) => {
                    let previous = old_value.and_then(|v| v.as_style());
                    for (key, declaration) in style {
                        if previous.and_then(|p| p.get(key)) != Some(declaration) {
                            host.set_style(node, key, declaration);
                        }
                    }
                    // Declarations dropped from the map are cleared.
                    if let Some(previous) = previous {
                        for key in previous.keys().filter(|k| !style.contains_key(*k)) {
                            host.set_style(node, key, "");
                        }
                    }
                }
                None => host.set_property(node, STYLE, value),
            },
            PropertyKind::Plain => host.set_property(node, name, value),
        }
    }
}

/// Point the `ref` prop at `node`, detaching a ref that was replaced.
pub(crate) fn update_ref<N: 'static>(old: Option<&Props>, new: &Props, node: &N) {
    let new_ref = new.node_ref();
    if let Some(old_ref) = old.and_then(Props::node_ref)
        && Some(old_ref) != new_ref
    {
        old_ref.detach();
    }
    if let Some(node_ref) = new_ref {
        node_ref.attach(node);
    }
}
