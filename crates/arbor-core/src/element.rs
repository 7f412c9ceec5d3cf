//! Element types and component handles.
//!
//! A [`VNode`] is the immutable-per-render description of one node: its
//! [`Kind`], an ordered prop map and an ordered child list. Text nodes keep
//! their value under the reserved `nodeValue` prop and never have children.

use std::any::Any;
use std::borrow::Cow;
use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;

use crate::error::ElementError;
use crate::events::Handler;
use crate::hooks::{ContextId, Scope};

/// Reserved prop holding a text node's value.
pub const NODE_VALUE: &str = "nodeValue";
/// Reserved prop holding a sibling identity hint.
pub const KEY: &str = "key";
/// Reserved prop receiving the host node.
pub const REF: &str = "ref";

/// Ordered style declarations, written key by key onto the host node.
pub type StyleMap = IndexMap<String, String>;

// ============================================================================
// Kind
// ============================================================================

/// What a vnode stands for.
#[derive(Clone)]
pub enum Kind {
    /// A host element such as `div`.
    Tag(Cow<'static, str>),
    /// A text leaf.
    Text,
    /// A user-defined component, expanded during resolution.
    Component(Component),
    /// A context provider; its children see the provided value.
    Provider(ContextId),
    /// A grouping whose children are spliced into the parent.
    Fragment,
}

impl Kind {
    /// Human-readable name used in logs and errors.
    pub fn name(&self) -> &str {
        match self {
            Kind::Tag(tag) => &**tag,
            Kind::Text => "text",
            Kind::Component(component) => component.name(),
            Kind::Provider(_) => "provider",
            Kind::Fragment => "fragment",
        }
    }

    /// Whether this kind can appear in a resolved tree.
    pub fn is_host(&self) -> bool {
        matches!(self, Kind::Tag(_) | Kind::Text)
    }
}

impl PartialEq for Kind {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Kind::Tag(a), Kind::Tag(b)) => a == b,
            (Kind::Text, Kind::Text) => true,
            (Kind::Component(a), Kind::Component(b)) => a == b,
            (Kind::Provider(a), Kind::Provider(b)) => a == b,
            (Kind::Fragment, Kind::Fragment) => true,
            _ => false,
        }
    }
}

impl fmt::Debug for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Kind::Tag(tag) => write!(f, "Tag({tag})"),
            Kind::Text => f.write_str("Text"),
            Kind::Component(component) => write!(f, "Component({})", component.name()),
            Kind::Provider(id) => write!(f, "Provider({id:?})"),
            Kind::Fragment => f.write_str("Fragment"),
        }
    }
}

impl From<&'static str> for Kind {
    fn from(tag: &'static str) -> Self {
        Kind::Tag(Cow::Borrowed(tag))
    }
}

impl From<String> for Kind {
    fn from(tag: String) -> Self {
        Kind::Tag(Cow::Owned(tag))
    }
}

impl From<Component> for Kind {
    fn from(component: Component) -> Self {
        Kind::Component(component)
    }
}

/// Check that a tag names something a host could create.
pub fn validate_tag(tag: &str) -> Result<(), ElementError> {
    let mut chars = tag.chars();
    let valid = match chars.next() {
        Some(first) => {
            first.is_ascii_alphabetic() && chars.all(|c| c.is_ascii_alphanumeric() || c == '-')
        }
        None => false,
    };
    if valid {
        Ok(())
    } else {
        Err(ElementError::InvalidTag(tag.to_string()))
    }
}

// ============================================================================
// Components
// ============================================================================

/// Signature of a component's render function.
pub type RenderFn = dyn Fn(&mut Scope<'_>, &Props) -> VNode;

/// Stable identity of a component function.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct ComponentId(usize);

/// A user-defined component.
///
/// Identity is the shared render function: clones of one `Component` are
/// the same component, two `Component::new` calls are different ones even
/// with identical bodies. Build components once and reuse the handle.
///
/// # Example
///
/// ```ignore
/// let counter = Component::new("Counter", |cx, _props| {
///     let (count, set_count) = cx.use_state(0);
///     VNode::element("button")
///         .prop("onClick", Handler::from_fn(move || set_count.update(|n| n + 1)))
///         .child(count)
/// });
/// ```
#[derive(Clone)]
pub struct Component {
    name: &'static str,
    render: Rc<RenderFn>,
}

impl Component {
    pub fn new<F>(name: &'static str, render: F) -> Self
    where
        F: Fn(&mut Scope<'_>, &Props) -> VNode + 'static,
    {
        Self {
            name,
            render: Rc::new(render),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn id(&self) -> ComponentId {
        ComponentId(Rc::as_ptr(&self.render) as *const () as usize)
    }

    /// Invoke the render function inside an active hook scope.
    pub fn render(&self, scope: &mut Scope<'_>, props: &Props) -> VNode {
        (self.render)(scope, props)
    }
}

impl PartialEq for Component {
    fn eq(&self, other: &Self) -> bool {
        self.id() == other.id()
    }
}

impl fmt::Debug for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Component({})", self.name)
    }
}

// ============================================================================
// Props
// ============================================================================

/// A write target for host nodes, stored under the `ref` prop.
pub trait RefTarget {
    /// Store the host node. Nodes of an unexpected type are ignored.
    fn attach(&self, node: &dyn Any);
    /// Forget the host node after it left the tree.
    fn detach(&self);
}

/// Type-erased handle to a [`RefTarget`].
#[derive(Clone)]
pub struct NodeRef(Rc<dyn RefTarget>);

impl NodeRef {
    pub fn new(target: Rc<dyn RefTarget>) -> Self {
        Self(target)
    }

    pub fn attach(&self, node: &dyn Any) {
        self.0.attach(node)
    }

    pub fn detach(&self) {
        self.0.detach()
    }
}

impl PartialEq for NodeRef {
    fn eq(&self, other: &Self) -> bool {
        std::ptr::addr_eq(Rc::as_ptr(&self.0), Rc::as_ptr(&other.0))
    }
}

impl fmt::Debug for NodeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("NodeRef(...)")
    }
}

/// A prop value.
///
/// Scalars and style maps compare structurally; handlers, refs and opaque
/// values compare by identity.
#[derive(Clone)]
pub enum PropValue {
    Str(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    Style(StyleMap),
    Handler(Handler),
    Ref(NodeRef),
    Any(Rc<dyn Any>),
}

impl PropValue {
    /// Wrap an arbitrary value, e.g. data passed to a component.
    pub fn any<T: 'static>(value: T) -> Self {
        PropValue::Any(Rc::new(value))
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            PropValue::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            PropValue::Int(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            PropValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_handler(&self) -> Option<&Handler> {
        match self {
            PropValue::Handler(h) => Some(h),
            _ => None,
        }
    }

    pub fn as_style(&self) -> Option<&StyleMap> {
        match self {
            PropValue::Style(style) => Some(style),
            _ => None,
        }
    }

    /// Borrow an opaque value as `T`.
    pub fn downcast_ref<T: 'static>(&self) -> Option<&T> {
        match self {
            PropValue::Any(value) => value.downcast_ref::<T>(),
            _ => None,
        }
    }

    /// Text rendering of scalar values; `None` for everything else.
    pub fn to_text(&self) -> Option<String> {
        match self {
            PropValue::Str(s) => Some(s.clone()),
            PropValue::Int(n) => Some(n.to_string()),
            PropValue::Float(x) => Some(x.to_string()),
            PropValue::Bool(b) => Some(b.to_string()),
            _ => None,
        }
    }
}

impl PartialEq for PropValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (PropValue::Str(a), PropValue::Str(b)) => a == b,
            (PropValue::Int(a), PropValue::Int(b)) => a == b,
            (PropValue::Float(a), PropValue::Float(b)) => a == b,
            (PropValue::Bool(a), PropValue::Bool(b)) => a == b,
            (PropValue::Style(a), PropValue::Style(b)) => a == b,
            (PropValue::Handler(a), PropValue::Handler(b)) => a == b,
            (PropValue::Ref(a), PropValue::Ref(b)) => a == b,
            (PropValue::Any(a), PropValue::Any(b)) => {
                std::ptr::addr_eq(Rc::as_ptr(a), Rc::as_ptr(b))
            }
            _ => false,
        }
    }
}

impl fmt::Debug for PropValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PropValue::Str(s) => write!(f, "{s:?}"),
            PropValue::Int(n) => write!(f, "{n}"),
            PropValue::Float(x) => write!(f, "{x}"),
            PropValue::Bool(b) => write!(f, "{b}"),
            PropValue::Style(style) => f.debug_map().entries(style.iter()).finish(),
            PropValue::Handler(h) => h.fmt(f),
            PropValue::Ref(r) => r.fmt(f),
            PropValue::Any(_) => f.write_str("Any(...)"),
        }
    }
}

impl From<&str> for PropValue {
    fn from(s: &str) -> Self {
        PropValue::Str(s.to_string())
    }
}

impl From<String> for PropValue {
    fn from(s: String) -> Self {
        PropValue::Str(s)
    }
}

impl From<i32> for PropValue {
    fn from(n: i32) -> Self {
        PropValue::Int(n.into())
    }
}

impl From<i64> for PropValue {
    fn from(n: i64) -> Self {
        PropValue::Int(n)
    }
}

impl From<usize> for PropValue {
    fn from(n: usize) -> Self {
        PropValue::Int(n as i64)
    }
}

impl From<f64> for PropValue {
    fn from(x: f64) -> Self {
        PropValue::Float(x)
    }
}

impl From<bool> for PropValue {
    fn from(b: bool) -> Self {
        PropValue::Bool(b)
    }
}

impl From<StyleMap> for PropValue {
    fn from(style: StyleMap) -> Self {
        PropValue::Style(style)
    }
}

impl From<Handler> for PropValue {
    fn from(handler: Handler) -> Self {
        PropValue::Handler(handler)
    }
}

impl From<NodeRef> for PropValue {
    fn from(node_ref: NodeRef) -> Self {
        PropValue::Ref(node_ref)
    }
}

/// Identity hint for siblings, taken from the `key` prop.
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub struct Key(String);

impl Key {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Ordered prop map of a vnode.
#[derive(Clone, Default, PartialEq)]
pub struct Props(IndexMap<String, PropValue>);

impl Props {
    pub fn new() -> Self {
        Self(IndexMap::new())
    }

    /// Builder-style insert.
    pub fn with(mut self, name: impl Into<String>, value: impl Into<PropValue>) -> Self {
        self.insert(name, value);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<PropValue>) {
        self.0.insert(name.into(), value.into());
    }

    pub fn remove(&mut self, name: &str) -> Option<PropValue> {
        self.0.shift_remove(name)
    }

    pub fn get(&self, name: &str) -> Option<&PropValue> {
        self.0.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &PropValue)> {
        self.0.iter().map(|(name, value)| (name.as_str(), value))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// The `key` prop, if it holds a string or integer.
    pub fn key(&self) -> Option<Key> {
        match self.get(KEY)? {
            PropValue::Str(s) => Some(Key(s.clone())),
            PropValue::Int(n) => Some(Key(n.to_string())),
            _ => None,
        }
    }

    /// The `ref` prop, if present.
    pub fn node_ref(&self) -> Option<&NodeRef> {
        match self.get(REF)? {
            PropValue::Ref(node_ref) => Some(node_ref),
            _ => None,
        }
    }

    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(PropValue::as_str)
    }

    /// Borrow an opaque prop as `T`.
    pub fn get_any<T: 'static>(&self, name: &str) -> Option<&T> {
        self.get(name).and_then(PropValue::downcast_ref::<T>)
    }
}

impl fmt::Debug for Props {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.0.iter()).finish()
    }
}

impl<K: Into<String>, V: Into<PropValue>> FromIterator<(K, V)> for Props {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut props = Props::new();
        for (name, value) in iter {
            props.insert(name, value);
        }
        props
    }
}

/// Build a [`Props`] map: `props! { "className" => "title", "id" => "main" }`.
#[macro_export]
macro_rules! props {
    () => {
        $crate::element::Props::new()
    };
    ($($name:expr => $value:expr),+ $(,)?) => {{
        let mut props = $crate::element::Props::new();
        $( props.insert($name, $value); )+
        props
    }};
}

/// Build a child list for [`create_element`]: `children!["text", 42, node]`.
#[macro_export]
macro_rules! children {
    ($($child:expr),* $(,)?) => {
        vec![$($crate::element::Child::from($child)),*]
    };
}

// ============================================================================
// Children
// ============================================================================

/// Anything that may appear in a child position before normalization.
#[derive(Debug, Clone)]
pub enum Child {
    Node(VNode),
    Text(String),
    Bool(bool),
    Empty,
}

impl Child {
    /// Normalize into a vnode: empty and `false` children are dropped,
    /// primitives become text nodes.
    pub fn into_vnode(self) -> Option<VNode> {
        match self {
            Child::Node(node) => Some(node),
            Child::Text(text) => Some(VNode::text(text)),
            Child::Bool(true) => Some(VNode::text("true")),
            Child::Bool(false) | Child::Empty => None,
        }
    }
}

impl From<VNode> for Child {
    fn from(node: VNode) -> Self {
        Child::Node(node)
    }
}

impl From<&str> for Child {
    fn from(text: &str) -> Self {
        Child::Text(text.to_string())
    }
}

impl From<String> for Child {
    fn from(text: String) -> Self {
        Child::Text(text)
    }
}

impl From<&String> for Child {
    fn from(text: &String) -> Self {
        Child::Text(text.clone())
    }
}

impl From<i32> for Child {
    fn from(n: i32) -> Self {
        Child::Text(n.to_string())
    }
}

impl From<i64> for Child {
    fn from(n: i64) -> Self {
        Child::Text(n.to_string())
    }
}

impl From<usize> for Child {
    fn from(n: usize) -> Self {
        Child::Text(n.to_string())
    }
}

impl From<f64> for Child {
    fn from(x: f64) -> Self {
        Child::Text(x.to_string())
    }
}

impl From<bool> for Child {
    fn from(b: bool) -> Self {
        Child::Bool(b)
    }
}

impl<T: Into<Child>> From<Option<T>> for Child {
    fn from(child: Option<T>) -> Self {
        child.map_or(Child::Empty, Into::into)
    }
}

// ============================================================================
// VNode
// ============================================================================

/// A node in the virtual tree.
#[derive(Clone, PartialEq)]
pub struct VNode {
    pub kind: Kind,
    pub props: Props,
    pub children: Vec<VNode>,
}

/// Create a vnode from a kind, optional props and raw children.
///
/// Children that are `None` or `false` are dropped, strings and numbers
/// become text nodes and vnodes pass through unchanged. Malformed kinds are
/// not checked here; they fail when the tree is rendered.
///
/// # Example
///
/// ```ignore
/// let node = create_element("p", None, children!["hello"]);
/// ```
pub fn create_element(
    kind: impl Into<Kind>,
    props: impl Into<Option<Props>>,
    children: impl IntoIterator<Item = Child>,
) -> VNode {
    VNode {
        kind: kind.into(),
        props: props.into().unwrap_or_default(),
        children: children.into_iter().filter_map(Child::into_vnode).collect(),
    }
}

impl VNode {
    /// A text leaf.
    pub fn text(value: impl Into<String>) -> Self {
        Self {
            kind: Kind::Text,
            props: Props::new().with(NODE_VALUE, value.into()),
            children: Vec::new(),
        }
    }

    /// A host element with no props or children yet.
    pub fn element(tag: impl Into<Kind>) -> Self {
        create_element(tag, None, [])
    }

    /// A component invocation with the given props.
    pub fn component(component: &Component, props: Props) -> Self {
        create_element(component.clone(), props, [])
    }

    /// A fragment grouping `children`.
    pub fn fragment(children: impl IntoIterator<Item = Child>) -> Self {
        create_element(Kind::Fragment, None, children)
    }

    /// Builder-style prop insert.
    pub fn prop(mut self, name: impl Into<String>, value: impl Into<PropValue>) -> Self {
        self.props.insert(name, value);
        self
    }

    /// Builder-style `key` prop.
    pub fn with_key(self, key: impl Into<PropValue>) -> Self {
        self.prop(KEY, key)
    }

    /// Builder-style child append, with the same filtering as
    /// [`create_element`].
    pub fn child(mut self, child: impl Into<Child>) -> Self {
        if let Some(node) = child.into().into_vnode() {
            self.children.push(node);
        }
        self
    }

    /// Append every child of an iterator.
    pub fn children<C: Into<Child>>(mut self, children: impl IntoIterator<Item = C>) -> Self {
        self.children
            .extend(children.into_iter().filter_map(|c| c.into().into_vnode()));
        self
    }

    pub fn key(&self) -> Option<Key> {
        self.props.key()
    }

    pub fn is_text(&self) -> bool {
        matches!(self.kind, Kind::Text)
    }

    /// The value of a text node; empty when `nodeValue` is missing.
    pub fn text_value(&self) -> String {
        self.props
            .get(NODE_VALUE)
            .and_then(PropValue::to_text)
            .unwrap_or_default()
    }

    /// Check this node (not its descendants) can be handed to a host.
    pub fn validate_host(&self) -> Result<(), ElementError> {
        match &self.kind {
            Kind::Tag(tag) => validate_tag(tag),
            Kind::Text if !self.children.is_empty() => Err(ElementError::TextWithChildren {
                count: self.children.len(),
            }),
            Kind::Text => Ok(()),
            other => Err(ElementError::Unresolved {
                kind: other.name().to_string(),
            }),
        }
    }
}

impl fmt::Debug for VNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_text() {
            return write!(f, "Text({:?})", self.text_value());
        }
        let mut debug = f.debug_struct("VNode");
        debug.field("kind", &self.kind);
        if !self.props.is_empty() {
            debug.field("props", &self.props);
        }
        if !self.children.is_empty() {
            debug.field("children", &self.children);
        }
        debug.finish()
    }
}
