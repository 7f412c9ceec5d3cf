//! An in-memory host tree.
//!
//! [`MemoryHost`] keeps nodes in an arena and records every mutation it
//! receives in a journal, which makes it the host of choice for tests and
//! for rendering to markup without a browser. Nodes are never freed, so a
//! [`NodeId`] stays valid (and keeps its identity) after the node leaves the
//! tree.
//!
//! Misuse, such as removing a node from a parent it does not belong to, is
//! logged with [`tracing::error!`] and otherwise ignored.

use std::fmt;

use arbor_core::events::html_escape_string;
use arbor_core::{Event, Handler, PropValue, StyleMap};
use indexmap::IndexMap;

use super::HostAdapter;

/// Handle to a node in a [`MemoryHost`].
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

impl fmt::Debug for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// One adapter call, as recorded in the journal.
#[derive(Debug, Clone, PartialEq)]
pub enum Mutation {
    CreateElement { node: NodeId, tag: String },
    CreateText { node: NodeId, value: String },
    SetText { node: NodeId, value: String },
    SetProperty { node: NodeId, name: String, value: PropValue },
    RemoveProperty { node: NodeId, name: String },
    SetStyle { node: NodeId, name: String, value: String },
    AddListener { node: NodeId, event: String },
    RemoveListener { node: NodeId, event: String },
    AppendChild { parent: NodeId, child: NodeId },
    RemoveChild { parent: NodeId, child: NodeId },
    ReplaceChild { parent: NodeId, old: NodeId, new: NodeId },
    InsertBefore { parent: NodeId, child: NodeId, reference: Option<NodeId> },
    ClearChildren { parent: NodeId },
}

impl Mutation {
    /// Whether this call created a node rather than changing an existing one.
    pub fn is_creation(&self) -> bool {
        matches!(self, Mutation::CreateElement { .. } | Mutation::CreateText { .. })
    }
}

enum NodeData {
    Element {
        tag: String,
        properties: IndexMap<String, PropValue>,
        style: StyleMap,
        listeners: Vec<(String, Handler)>,
    },
    Text(String),
}

struct MemoryNode {
    data: NodeData,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

/// Arena-backed [`HostAdapter`] with a mutation journal.
#[derive(Default)]
pub struct MemoryHost {
    nodes: Vec<MemoryNode>,
    journal: Vec<Mutation>,
}

impl MemoryHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an element to render into. Not journaled.
    pub fn create_container(&mut self, tag: &str) -> NodeId {
        self.alloc(NodeData::Element {
            tag: tag.to_string(),
            properties: IndexMap::new(),
            style: StyleMap::new(),
            listeners: Vec::new(),
        })
    }

    fn alloc(&mut self, data: NodeData) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(MemoryNode {
            data,
            parent: None,
            children: Vec::new(),
        });
        id
    }

    fn node(&self, id: NodeId) -> Option<&MemoryNode> {
        let node = self.nodes.get(id.0);
        if node.is_none() {
            tracing::error!(%id, "unknown node");
        }
        node
    }

    fn node_mut(&mut self, id: NodeId) -> Option<&mut MemoryNode> {
        let node = self.nodes.get_mut(id.0);
        if node.is_none() {
            tracing::error!(%id, "unknown node");
        }
        node
    }

    /// Every mutation since the last [`MemoryHost::take_journal`].
    pub fn journal(&self) -> &[Mutation] {
        &self.journal
    }

    pub fn take_journal(&mut self) -> Vec<Mutation> {
        std::mem::take(&mut self.journal)
    }

    pub fn clear_journal(&mut self) {
        self.journal.clear();
    }

    /// Number of nodes ever created, including containers.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        self.node(id)
            .map(|node| node.children.as_slice())
            .unwrap_or_default()
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.node(id)?.parent
    }

    /// Tag of an element node.
    pub fn tag(&self, id: NodeId) -> Option<&str> {
        match &self.node(id)?.data {
            NodeData::Element { tag, .. } => Some(tag),
            NodeData::Text(_) => None,
        }
    }

    /// Value of a text node.
    pub fn text(&self, id: NodeId) -> Option<&str> {
        match &self.node(id)?.data {
            NodeData::Text(value) => Some(value),
            NodeData::Element { .. } => None,
        }
    }

    pub fn property(&self, id: NodeId, name: &str) -> Option<&PropValue> {
        match &self.node(id)?.data {
            NodeData::Element { properties, .. } => properties.get(name),
            NodeData::Text(_) => None,
        }
    }

    pub fn style(&self, id: NodeId, name: &str) -> Option<&str> {
        match &self.node(id)?.data {
            NodeData::Element { style, .. } => style.get(name).map(String::as_str),
            NodeData::Text(_) => None,
        }
    }

    pub fn listener_count(&self, id: NodeId, event: &str) -> usize {
        match self.node(id).map(|node| &node.data) {
            Some(NodeData::Element { listeners, .. }) => {
                listeners.iter().filter(|(name, _)| name == event).count()
            }
            _ => 0,
        }
    }

    /// Invoke the listeners registered on `id` for `event.name`.
    ///
    /// Returns how many handlers ran. Events do not bubble.
    pub fn dispatch(&self, id: NodeId, event: &Event) -> usize {
        let handlers: Vec<Handler> = match self.node(id).map(|node| &node.data) {
            Some(NodeData::Element { listeners, .. }) => listeners
                .iter()
                .filter(|(name, _)| *name == event.name)
                .map(|(_, handler)| handler.clone())
                .collect(),
            _ => Vec::new(),
        };
        tracing::trace!(%id, event = %event.name, handlers = handlers.len(), "dispatching event");
        for handler in &handlers {
            handler.invoke(event);
        }
        handlers.len()
    }

    /// Concatenated text of `id` and its descendants.
    pub fn text_content(&self, id: NodeId) -> String {
        let mut out = String::new();
        self.collect_text(id, &mut out);
        out
    }

    fn collect_text(&self, id: NodeId, out: &mut String) {
        let Some(node) = self.node(id) else {
            return;
        };
        match &node.data {
            NodeData::Text(value) => out.push_str(value),
            NodeData::Element { .. } => {
                for child in &node.children {
                    self.collect_text(*child, out);
                }
            }
        }
    }

    /// Markup for the children of `id`.
    pub fn inner_html(&self, id: NodeId) -> String {
        let mut html = String::new();
        for child in self.children(id) {
            self.write_html(*child, &mut html);
        }
        html
    }

    /// Markup for `id` itself.
    pub fn outer_html(&self, id: NodeId) -> String {
        let mut html = String::new();
        self.write_html(id, &mut html);
        html
    }

    fn write_html(&self, id: NodeId, html: &mut String) {
        let Some(node) = self.node(id) else {
            return;
        };
        match &node.data {
            NodeData::Text(value) => html.push_str(&html_escape_string(value)),
            NodeData::Element {
                tag,
                properties,
                style,
                ..
            } => {
                html.push('<');
                html.push_str(tag);
                for (name, value) in properties {
                    write_attribute(html, name, value);
                }
                if !style.is_empty() {
                    let declarations: Vec<String> =
                        style.iter().map(|(k, v)| format!("{k}: {v}")).collect();
                    html.push_str(&format!(
                        " style=\"{}\"",
                        html_escape_string(&declarations.join("; "))
                    ));
                }
                html.push('>');
                for child in &node.children {
                    self.write_html(*child, html);
                }
                html.push_str(&format!("</{tag}>"));
            }
        }
    }

    /// Unlink `child` from its current parent, if any.
    fn detach(&mut self, child: NodeId) {
        let Some(parent) = self.nodes.get(child.0).and_then(|node| node.parent) else {
            return;
        };
        if let Some(parent) = self.nodes.get_mut(parent.0) {
            parent.children.retain(|c| *c != child);
        }
        if let Some(child) = self.nodes.get_mut(child.0) {
            child.parent = None;
        }
    }

    fn position(&self, parent: NodeId, child: NodeId) -> Option<usize> {
        self.node(parent)?.children.iter().position(|c| *c == child)
    }
}

/// Attribute name used for a property in markup.
fn attribute_name(name: &str) -> &str {
    match name {
        "className" => "class",
        "htmlFor" => "for",
        _ => name,
    }
}

fn write_attribute(html: &mut String, name: &str, value: &PropValue) {
    let name = attribute_name(name);
    match value {
        PropValue::Bool(true) => {
            html.push(' ');
            html.push_str(name);
        }
        PropValue::Bool(false) => {}
        other => {
            if let Some(text) = other.to_text() {
                html.push_str(&format!(" {}=\"{}\"", name, html_escape_string(&text)));
            }
        }
    }
}

impl HostAdapter for MemoryHost {
    type Node = NodeId;

    fn create_element(&mut self, tag: &str) -> NodeId {
        let node = self.create_container(tag);
        self.journal.push(Mutation::CreateElement {
            node,
            tag: tag.to_string(),
        });
        node
    }

    fn create_text(&mut self, value: &str) -> NodeId {
        let node = self.alloc(NodeData::Text(value.to_string()));
        self.journal.push(Mutation::CreateText {
            node,
            value: value.to_string(),
        });
        node
    }

    fn set_text(&mut self, node: &NodeId, value: &str) {
        self.journal.push(Mutation::SetText {
            node: *node,
            value: value.to_string(),
        });
        match self.node_mut(*node).map(|n| &mut n.data) {
            Some(NodeData::Text(text)) => *text = value.to_string(),
            Some(NodeData::Element { .. }) => tracing::error!(%node, "set_text on an element"),
            None => {}
        }
    }

    fn set_property(&mut self, node: &NodeId, name: &str, value: &PropValue) {
        self.journal.push(Mutation::SetProperty {
            node: *node,
            name: name.to_string(),
            value: value.clone(),
        });
        match self.node_mut(*node).map(|n| &mut n.data) {
            Some(NodeData::Element { properties, .. }) => {
                properties.insert(name.to_string(), value.clone());
            }
            Some(NodeData::Text(_)) => tracing::error!(%node, name, "set_property on a text node"),
            None => {}
        }
    }

    fn remove_property(&mut self, node: &NodeId, name: &str) {
        self.journal.push(Mutation::RemoveProperty {
            node: *node,
            name: name.to_string(),
        });
        if let Some(NodeData::Element {
            properties, style, ..
        }) = self.node_mut(*node).map(|n| &mut n.data)
        {
            if name == super::STYLE {
                style.clear();
            }
            properties.shift_remove(name);
        }
    }

    fn set_style(&mut self, node: &NodeId, name: &str, value: &str) {
        self.journal.push(Mutation::SetStyle {
            node: *node,
            name: name.to_string(),
            value: value.to_string(),
        });
        if let Some(NodeData::Element { style, .. }) = self.node_mut(*node).map(|n| &mut n.data) {
            if value.is_empty() {
                style.shift_remove(name);
            } else {
                style.insert(name.to_string(), value.to_string());
            }
        }
    }

    fn add_listener(&mut self, node: &NodeId, event: &str, handler: &Handler) {
        self.journal.push(Mutation::AddListener {
            node: *node,
            event: event.to_string(),
        });
        if let Some(NodeData::Element { listeners, .. }) = self.node_mut(*node).map(|n| &mut n.data)
        {
            listeners.push((event.to_string(), handler.clone()));
        }
    }

    fn remove_listener(&mut self, node: &NodeId, event: &str, handler: &Handler) {
        self.journal.push(Mutation::RemoveListener {
            node: *node,
            event: event.to_string(),
        });
        if let Some(NodeData::Element { listeners, .. }) = self.node_mut(*node).map(|n| &mut n.data)
        {
            listeners.retain(|(name, h)| !(name == event && h == handler));
        }
    }

    fn append_child(&mut self, parent: &NodeId, child: &NodeId) {
        self.insert_before(parent, child, None);
    }

    fn remove_child(&mut self, parent: &NodeId, child: &NodeId) {
        self.journal.push(Mutation::RemoveChild {
            parent: *parent,
            child: *child,
        });
        if self.position(*parent, *child).is_none() {
            tracing::error!(%parent, %child, "remove_child: not a child of this parent");
            return;
        }
        self.detach(*child);
    }

    fn replace_child(&mut self, parent: &NodeId, old: &NodeId, new: &NodeId) {
        self.journal.push(Mutation::ReplaceChild {
            parent: *parent,
            old: *old,
            new: *new,
        });
        self.detach(*new);
        let Some(index) = self.position(*parent, *old) else {
            tracing::error!(%parent, %old, "replace_child: not a child of this parent");
            return;
        };
        if let Some(p) = self.nodes.get_mut(parent.0) {
            p.children[index] = *new;
        }
        if let Some(o) = self.nodes.get_mut(old.0) {
            o.parent = None;
        }
        if let Some(n) = self.nodes.get_mut(new.0) {
            n.parent = Some(*parent);
        }
    }

    fn insert_before(&mut self, parent: &NodeId, child: &NodeId, reference: Option<&NodeId>) {
        self.journal.push(match reference {
            Some(reference) => Mutation::InsertBefore {
                parent: *parent,
                child: *child,
                reference: Some(*reference),
            },
            None => Mutation::AppendChild {
                parent: *parent,
                child: *child,
            },
        });
        if self.node(*parent).is_none() || self.node(*child).is_none() {
            return;
        }

        self.detach(*child);
        let index = match reference {
            Some(reference) => match self.position(*parent, *reference) {
                Some(index) => index,
                None => {
                    tracing::error!(%parent, %reference, "insert_before: reference is not a child, appending");
                    self.children(*parent).len()
                }
            },
            None => self.children(*parent).len(),
        };
        if let Some(p) = self.nodes.get_mut(parent.0) {
            p.children.insert(index, *child);
        }
        if let Some(c) = self.nodes.get_mut(child.0) {
            c.parent = Some(*parent);
        }
    }

    fn clear_children(&mut self, parent: &NodeId) {
        self.journal.push(Mutation::ClearChildren { parent: *parent });
        let Some(node) = self.nodes.get_mut(parent.0) else {
            tracing::error!(%parent, "unknown node");
            return;
        };
        let children = std::mem::take(&mut node.children);
        for child in children {
            if let Some(c) = self.nodes.get_mut(child.0) {
                c.parent = None;
            }
        }
    }
}

impl fmt::Debug for MemoryHost {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryHost")
            .field("nodes", &self.nodes.len())
            .field("journal", &self.journal.len())
            .finish()
    }
}
