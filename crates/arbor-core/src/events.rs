//! Event handler values carried by vnode props.
//!
//! A handler is stored under an `on*` prop (`onClick`, `onInput`, ...) and
//! handed to the host adapter when the node is mounted or patched. Handlers
//! compare by identity: re-rendering with the same [`Handler`] value is a
//! no-op, a freshly built closure swaps the listener.

use std::fmt;
use std::rc::Rc;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Escape HTML special characters in a string.
///
/// Used when serializing host trees to markup.
pub fn html_escape_string(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

/// Unique identifier for an event handler.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, PartialOrd, Ord)]
pub struct EventHandlerId(pub usize);

impl fmt::Display for EventHandlerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Global counter for generating unique event handler IDs.
static NEXT_HANDLER_ID: AtomicUsize = AtomicUsize::new(0);

/// Generate a new unique event handler ID.
pub fn next_handler_id() -> EventHandlerId {
    EventHandlerId(NEXT_HANDLER_ID.fetch_add(1, Ordering::SeqCst))
}

/// An event delivered to a [`Handler`].
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    /// Lower-cased event name, e.g. `"click"`.
    pub name: String,
    /// Optional payload, e.g. the new value of an input.
    pub value: Option<String>,
}

impl Event {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: None,
        }
    }

    pub fn with_value(mut self, value: impl Into<String>) -> Self {
        self.value = Some(value.into());
        self
    }
}

/// Type alias for event handler callbacks.
pub type EventCallback = dyn Fn(&Event) + 'static;

/// A listener registered through an `on*` prop.
#[derive(Clone)]
pub struct Handler {
    id: EventHandlerId,
    callback: Rc<EventCallback>,
}

impl Handler {
    /// Wrap a callback that receives the event.
    pub fn new<F: Fn(&Event) + 'static>(f: F) -> Self {
        Self {
            id: next_handler_id(),
            callback: Rc::new(f),
        }
    }

    /// Wrap a callback that ignores the event payload.
    pub fn from_fn<F: Fn() + 'static>(f: F) -> Self {
        Self::new(move |_| f())
    }

    pub fn id(&self) -> EventHandlerId {
        self.id
    }

    /// Invoke the callback.
    pub fn invoke(&self, event: &Event) {
        (self.callback)(event)
    }
}

impl PartialEq for Handler {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl fmt::Debug for Handler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Handler({})", self.id)
    }
}

/// Derive the event name from a listener prop name.
///
/// `onClick` becomes `click`. Returns `None` for names that are not
/// listener registrations (no `on` prefix, or nothing after it).
pub fn event_name(prop: &str) -> Option<String> {
    let rest = prop.strip_prefix("on")?;
    if rest.is_empty() {
        return None;
    }
    Some(rest.to_lowercase())
}
