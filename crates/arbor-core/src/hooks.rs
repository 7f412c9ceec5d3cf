//! React-style hooks for component-local state.
//!
//! Every component instance owns a [`HookRegistry`]: an ordered list of
//! slots addressed purely by call position. While the component renders it
//! receives a [`Scope`] bound to that registry, and every hook is a method
//! on the scope. There is no ambient "current component"; a hook cannot be
//! called outside of a render because there is no scope to call it on.
//!
//! # Quick Start
//!
//! ```ignore
//! use arbor::prelude::*;
//!
//! let counter = Component::new("Counter", |cx, _props| {
//!     let (count, set_count) = cx.use_state(0);
//!     let clicks = cx.use_ref(0);
//!
//!     cx.use_effect(move || println!("count is {count}"), count);
//!
//!     VNode::element("button")
//!         .prop("onClick", Handler::from_fn(move || {
//!             *clicks.borrow_mut() += 1;
//!             set_count.update(|n| n + 1);
//!         }))
//!         .child(count)
//! });
//! ```
//!
//! # Available Hooks
//!
//! | Hook | Purpose |
//! |------|---------|
//! | [`Scope::use_state`] | `(value, setter)` state that schedules a re-render |
//! | [`Scope::use_state_with`] | Same, with a lazily-run initializer |
//! | [`Scope::use_ref`] | Mutable cell that never triggers re-renders |
//! | [`Scope::use_effect`] | Side effects after the patch, when deps change |
//! | [`Scope::use_effect_cleanup`] | Effects that return a cleanup |
//! | [`Scope::use_effect_always`] | Effects that run after every render |
//! | [`Scope::use_mount`] | Effect that runs once, cleanup on unmount |
//! | [`Scope::use_memo`] | Memoized computations |
//! | [`Scope::use_callback`] | Memoized callbacks |
//! | [`Scope::use_context`] | Nearest provided context value |
//!
//! # Rules of Hooks
//!
//! Hooks must be called in the **exact same order** on every render,
//! because slots are identified by position, not by name. Don't call hooks
//! inside conditionals, loops with varying iteration counts, or after an
//! early return.
//!
//! Violations panic:
//!
//! ```text
//! arbor hooks error: Hook order mismatch at index 1 in `Profile`!
//! Previous render: `use_effect`
//! Current render: `use_state`
//! ```
//!
//! ```text
//! arbor hooks error: Hook count mismatch in `Profile`!
//! Previous render had 3 hooks, current render has 2 hooks.
//! ```

use std::any::Any;
use std::cell::{Ref, RefCell, RefMut};
use std::fmt;
use std::rc::Rc;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::element::{create_element, Child, Kind, NodeRef, PropValue, Props, RefTarget, VNode};
use crate::schedule::{Cleanup, PendingEffect, RenderContext};

// ============================================================================
// Hook Registry
// ============================================================================

/// The variant stored in a hook slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotKind {
    State,
    Effect,
    Ref,
    Memo,
}

/// Metadata about a hook for debugging purposes.
#[derive(Debug, Clone)]
pub struct HookMeta {
    /// The slot variant.
    pub kind: SlotKind,
    /// The hook function name (e.g. "use_state", "use_effect")
    pub hook_type: &'static str,
    /// The type of value stored (from std::any::type_name)
    pub value_type: &'static str,
}

/// Internal storage for a single hook.
struct HookEntry {
    value: Box<dyn Any>,
    meta: HookMeta,
}

/// Ordered hook storage of one component instance.
pub struct HookRegistry {
    /// Stored hook values, indexed by call order
    hooks: Vec<HookEntry>,
    /// Expected hook count from previous render (for mismatch detection)
    expected_count: Option<usize>,
    /// Number of completed renders (for debugging)
    render_count: usize,
}

impl HookRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self {
            hooks: Vec::new(),
            expected_count: None,
            render_count: 0,
        }
    }

    /// Number of completed renders.
    pub fn render_count(&self) -> usize {
        self.render_count
    }

    /// Describe every registered slot, in call order.
    pub fn debug_info(&self) -> Vec<HookMeta> {
        self.hooks.iter().map(|entry| entry.meta.clone()).collect()
    }

    /// Validate hook count and end the render cycle.
    fn end_render(&mut self, used: usize, component: &str) {
        if let Some(expected) = self.expected_count
            && used != expected
        {
            panic!(
                "\n\narbor hooks error: Hook count mismatch in `{}`!\n\
                Previous render had {} hooks, current render has {} hooks.\n\
                Render number: {}\n\n\
                This usually happens when:\n\
                - A hook is called inside a conditional (if/match)\n\
                - A hook is called inside a loop with varying iterations\n\
                - A hook is called inside an early return\n\n\
                Hooks must be called in the exact same order every render.\n",
                component, expected, used, self.render_count
            );
        }

        self.expected_count = Some(used);
        self.render_count += 1;
    }

    /// Get or create the slot at `index`.
    fn slot<T: Clone + 'static>(
        &mut self,
        index: usize,
        kind: SlotKind,
        hook_type: &'static str,
        component: &str,
        init: impl FnOnce() -> T,
    ) -> T {
        if let Some(entry) = self.hooks.get(index) {
            if entry.meta.hook_type != hook_type || entry.meta.kind != kind {
                panic!(
                    "\n\narbor hooks error: Hook order mismatch at index {} in `{}`!\n\
                    Previous render: `{}`\n\
                    Current render: `{}`\n\n\
                    Hooks must be called in the exact same order every render.\n",
                    index, component, entry.meta.hook_type, hook_type
                );
            }

            match entry.value.downcast_ref::<T>() {
                Some(value) => value.clone(),
                None => panic!(
                    "\n\narbor hooks error: Hook type mismatch at index {} in `{}`!\n\
                    Previous render stored `{}`, current render expects `{}`.\n",
                    index,
                    component,
                    entry.meta.value_type,
                    std::any::type_name::<T>()
                ),
            }
        } else {
            if self.expected_count.is_some() {
                // A new slot on a later render; end_render reports the count.
                tracing::warn!(index, hook_type, component, "hook slot appended after first render");
            }
            let value = init();
            self.hooks.push(HookEntry {
                value: Box::new(value.clone()),
                meta: HookMeta {
                    kind,
                    hook_type,
                    value_type: std::any::type_name::<T>(),
                },
            });
            value
        }
    }

    /// Run every pending effect cleanup and drop all slots.
    ///
    /// Called when the owning instance leaves the tree.
    pub fn dispose(&mut self) {
        for entry in self.hooks.drain(..) {
            if entry.meta.kind != SlotKind::Effect {
                continue;
            }
            if let Some(state) = entry.value.downcast_ref::<Rc<RefCell<EffectState>>>() {
                let cleanup = {
                    let mut state = state.borrow_mut();
                    state.disposed = true;
                    state.cleanup.take()
                };
                if let Some(cleanup) = cleanup {
                    cleanup();
                }
            }
        }
        self.expected_count = None;
    }
}

impl Default for HookRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for HookRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HookRegistry")
            .field("hooks", &self.debug_info())
            .field("render_count", &self.render_count)
            .finish()
    }
}

// ============================================================================
// Context
// ============================================================================

/// Identity of a context object.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct ContextId(usize);

static NEXT_CONTEXT_ID: AtomicUsize = AtomicUsize::new(0);

/// Reserved prop carrying a provider's value.
pub const PROVIDER_VALUE: &str = "value";

/// A value shared with every component resolved below a provider.
///
/// # Example
///
/// ```ignore
/// let theme = create_context("light");
///
/// let child = Component::new("Child", {
///     let theme = theme.clone();
///     move |cx, _| VNode::element("span").child(cx.use_context(&theme))
/// });
///
/// let tree = theme.provider("dark", children![VNode::component(&child, Props::new())]);
/// ```
pub struct Context<T> {
    id: ContextId,
    default: Rc<T>,
}

impl<T> Clone for Context<T> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            default: Rc::clone(&self.default),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for Context<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("id", &self.id)
            .field("default", &self.default)
            .finish()
    }
}

/// Create a context with a default value used when no provider is above.
pub fn create_context<T: 'static>(default: T) -> Context<T> {
    Context {
        id: ContextId(NEXT_CONTEXT_ID.fetch_add(1, Ordering::SeqCst)),
        default: Rc::new(default),
    }
}

impl<T: 'static> Context<T> {
    pub fn id(&self) -> ContextId {
        self.id
    }

    pub fn default_value(&self) -> &T {
        &self.default
    }

    /// A provider node making `value` visible to `children`.
    pub fn provider(&self, value: T, children: impl IntoIterator<Item = Child>) -> VNode {
        create_element(
            Kind::Provider(self.id),
            Props::new().with(PROVIDER_VALUE, PropValue::any(value)),
            children,
        )
    }
}

/// A value entered by a provider node.
enum Provided {
    /// An opaque value, as built by [`Context::provider`].
    Value(Rc<dyn Any>),
    /// A plain prop value, e.g. from `props! { "value" => "dark" }`.
    Prop(PropValue),
    /// The provider had no `value` prop.
    Missing,
}

/// Provider values active at the current point of resolution.
#[derive(Default)]
pub struct ContextStack {
    frames: Vec<(ContextId, Provided)>,
}

impl ContextStack {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enter a provider with the value of its `value` prop.
    pub fn push(&mut self, id: ContextId, value: Option<&PropValue>) {
        let provided = match value {
            Some(PropValue::Any(value)) => Provided::Value(Rc::clone(value)),
            Some(other) => Provided::Prop(other.clone()),
            None => Provided::Missing,
        };
        self.frames.push((id, provided));
    }

    pub fn pop(&mut self) {
        self.frames.pop();
    }

    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    /// The innermost value provided for `context`, if any.
    ///
    /// Scalar prop values are converted to the context's type: strings to
    /// `String`, integers to `i64`, `i32` or `usize`, floats to `f64` and
    /// booleans to `bool`.
    ///
    /// # Panics
    ///
    /// Panics when the innermost provider holds a value that cannot be read
    /// as `T`, or no value at all.
    pub fn lookup<T: Clone + 'static>(&self, context: &Context<T>) -> Option<T> {
        let (_, provided) = self.frames.iter().rev().find(|(id, _)| *id == context.id)?;
        let (value, stored) = match provided {
            Provided::Value(value) => (value.downcast_ref::<T>().cloned(), "an opaque value"),
            Provided::Prop(prop) => (prop_as::<T>(prop), "a prop value"),
            Provided::Missing => (None, "no `value` prop"),
        };
        match value {
            Some(value) => Some(value),
            None => panic!(
                "\n\narbor hooks error: Context type mismatch!\n\
                The nearest provider holds {}, but the context expects `{}`.\n",
                stored,
                std::any::type_name::<T>()
            ),
        }
    }
}

/// Read a provider's prop value as `T`.
fn prop_as<T: 'static>(prop: &PropValue) -> Option<T> {
    fn cast<T: 'static, U: 'static>(value: U) -> Option<T> {
        (Box::new(value) as Box<dyn Any>)
            .downcast::<T>()
            .ok()
            .map(|value| *value)
    }

    let scalar = match prop {
        PropValue::Str(s) => cast(s.clone()),
        PropValue::Int(n) => cast::<T, i64>(*n)
            .or_else(|| i32::try_from(*n).ok().and_then(cast::<T, i32>))
            .or_else(|| usize::try_from(*n).ok().and_then(cast::<T, usize>)),
        PropValue::Float(x) => cast(*x),
        PropValue::Bool(b) => cast(*b),
        _ => None,
    };
    scalar.or_else(|| cast(prop.clone()))
}

// ============================================================================
// Scope
// ============================================================================

/// The hook dispatch context handed to a component while it renders.
pub struct Scope<'a> {
    registry: &'a mut HookRegistry,
    cursor: usize,
    render: &'a RenderContext,
    contexts: &'a ContextStack,
    children: &'a [VNode],
    component: &'static str,
}

impl<'a> Scope<'a> {
    /// Open a scope on `registry`; the slot cursor starts at zero.
    pub fn new(
        registry: &'a mut HookRegistry,
        render: &'a RenderContext,
        contexts: &'a ContextStack,
        children: &'a [VNode],
        component: &'static str,
    ) -> Self {
        Self {
            registry,
            cursor: 0,
            render,
            contexts,
            children,
            component,
        }
    }

    /// Close the scope, checking the hook count against the last render.
    pub fn finish(self) {
        self.registry.end_render(self.cursor, self.component);
    }

    /// Children passed to the component being rendered.
    pub fn children(&self) -> &'a [VNode] {
        self.children
    }

    /// Name of the component being rendered.
    pub fn component_name(&self) -> &'static str {
        self.component
    }

    /// Handle to the owning root's update queue.
    pub fn render_context(&self) -> &RenderContext {
        self.render
    }

    fn use_hook<T: Clone + 'static>(
        &mut self,
        kind: SlotKind,
        hook_type: &'static str,
        init: impl FnOnce() -> T,
    ) -> T {
        let index = self.cursor;
        self.cursor += 1;
        self.registry
            .slot(index, kind, hook_type, self.component, init)
    }

    /// State that persists across renders, with a setter that schedules a
    /// re-render of the owning root.
    ///
    /// `initial` is stored as-is on the first render and ignored afterwards.
    /// Use [`Scope::use_state_with`] to compute it lazily.
    pub fn use_state<T: Clone + 'static>(&mut self, initial: T) -> (T, StateSetter<T>) {
        self.use_state_with(move || initial)
    }

    /// Like [`Scope::use_state`], but `init` only runs on the first render.
    pub fn use_state_with<T: Clone + 'static>(
        &mut self,
        init: impl FnOnce() -> T,
    ) -> (T, StateSetter<T>) {
        let cell = self.use_hook(SlotKind::State, "use_state", || {
            Rc::new(RefCell::new(init()))
        });
        let value = cell.borrow().clone();
        let setter = StateSetter {
            cell,
            render: self.render.clone(),
        };
        (value, setter)
    }

    /// A mutable cell allocated once per slot. Mutating it never triggers a
    /// re-render.
    ///
    /// A `RefHandle<Option<N>>` passed as the `ref` prop of a host element
    /// receives that element's host node.
    pub fn use_ref<T: 'static>(&mut self, initial: T) -> RefHandle<T> {
        let inner = self.use_hook(SlotKind::Ref, "use_ref", || Rc::new(RefCell::new(initial)));
        RefHandle { inner }
    }

    fn queue_effect<D: PartialEq + 'static>(
        &mut self,
        hook_type: &'static str,
        deps: D,
        run: Box<dyn FnOnce() -> Option<Cleanup>>,
    ) {
        let state = self.use_hook(SlotKind::Effect, hook_type, || {
            Rc::new(RefCell::new(EffectState::default()))
        });

        let changed = match &state.borrow().deps {
            None => true,
            Some(old) => old.downcast_ref::<D>() != Some(&deps),
        };

        if changed {
            self.render
                .queue_effect(PendingEffect::new(state, Box::new(deps), run));
        }
    }

    /// Run `effect_fn` after the patch when `deps` changed since the last
    /// render (always on the first render).
    ///
    /// Pass `()` to run only on mount and [`Always`] to run after every
    /// render.
    pub fn use_effect<F, D>(&mut self, effect_fn: F, deps: D)
    where
        F: FnOnce() + 'static,
        D: PartialEq + 'static,
    {
        self.queue_effect(
            "use_effect",
            deps,
            Box::new(move || {
                effect_fn();
                None
            }),
        );
    }

    /// Like [`Scope::use_effect`], but `effect_fn` returns a cleanup that
    /// runs before the next invocation and when the instance unmounts.
    pub fn use_effect_cleanup<F, C, D>(&mut self, effect_fn: F, deps: D)
    where
        F: FnOnce() -> C + 'static,
        C: FnOnce() + 'static,
        D: PartialEq + 'static,
    {
        self.queue_effect(
            "use_effect",
            deps,
            Box::new(move || Some(Box::new(effect_fn()) as Cleanup)),
        );
    }

    /// Run `effect_fn` after every render.
    pub fn use_effect_always<F>(&mut self, effect_fn: F)
    where
        F: FnOnce() + 'static,
    {
        self.use_effect(effect_fn, Always);
    }

    /// Run `effect_fn` once after the first render; its cleanup runs on
    /// unmount.
    pub fn use_mount<F, C>(&mut self, effect_fn: F)
    where
        F: FnOnce() -> C + 'static,
        C: FnOnce() + 'static,
    {
        self.use_effect_cleanup(effect_fn, ());
    }

    /// Memoize a computation; `compute` only runs when `deps` changed.
    pub fn use_memo<T, F, D>(&mut self, compute: F, deps: D) -> T
    where
        T: Clone + 'static,
        F: FnOnce() -> T,
        D: PartialEq + 'static,
    {
        let state = self.use_hook(SlotKind::Memo, "use_memo", || {
            Rc::new(RefCell::new(MemoState::<T, D> {
                value: None,
                deps: None,
            }))
        });

        let mut state = state.borrow_mut();
        let cached = match (&state.value, &state.deps) {
            (Some(value), Some(old)) if *old == deps => Some(value.clone()),
            _ => None,
        };

        match cached {
            Some(value) => value,
            None => {
                let value = compute();
                state.value = Some(value.clone());
                state.deps = Some(deps);
                value
            }
        }
    }

    /// Memoize a callback; the same value is returned until `deps` change.
    pub fn use_callback<F, D>(&mut self, callback: F, deps: D) -> F
    where
        F: Clone + 'static,
        D: PartialEq + 'static,
    {
        self.use_memo(|| callback, deps)
    }

    /// The value of the nearest enclosing provider for `context`, or its
    /// default. Does not occupy a hook slot.
    pub fn use_context<T: Clone + 'static>(&self, context: &Context<T>) -> T {
        self.contexts
            .lookup(context)
            .unwrap_or_else(|| context.default_value().clone())
    }
}

// ============================================================================
// Hook values
// ============================================================================

/// Setter returned by [`Scope::use_state`].
pub struct StateSetter<T> {
    cell: Rc<RefCell<T>>,
    render: RenderContext,
}

impl<T> Clone for StateSetter<T> {
    fn clone(&self) -> Self {
        Self {
            cell: Rc::clone(&self.cell),
            render: self.render.clone(),
        }
    }
}

impl<T: 'static> StateSetter<T> {
    /// Store `value` and schedule a re-render.
    pub fn set(&self, value: T) {
        *self.cell.borrow_mut() = value;
        self.render.request_render();
    }

    /// Compute the next value from the previous one and schedule a re-render.
    pub fn update(&self, f: impl FnOnce(&T) -> T) {
        let next = f(&self.cell.borrow());
        self.set(next);
    }

    /// Whether both setters write the same slot.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.cell, &other.cell)
    }
}

impl<T: Clone> StateSetter<T> {
    /// The value currently stored in the slot.
    pub fn current(&self) -> T {
        self.cell.borrow().clone()
    }
}

impl<T> fmt::Debug for StateSetter<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("StateSetter(...)")
    }
}

/// Handle to a ref value created by [`Scope::use_ref`].
pub struct RefHandle<T> {
    inner: Rc<RefCell<T>>,
}

impl<T> Clone for RefHandle<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T> RefHandle<T> {
    /// Get a reference to the current value.
    pub fn borrow(&self) -> Ref<'_, T> {
        self.inner.borrow()
    }

    /// Get a mutable reference to the current value.
    pub fn borrow_mut(&self) -> RefMut<'_, T> {
        self.inner.borrow_mut()
    }

    /// Set the value directly.
    pub fn set(&self, value: T) {
        *self.inner.borrow_mut() = value;
    }

    /// Whether both handles point at the same slot.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl<T: Clone> RefHandle<T> {
    /// Get a clone of the current value.
    pub fn get(&self) -> T {
        self.inner.borrow().clone()
    }
}

impl<T: fmt::Debug> fmt::Debug for RefHandle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RefHandle")
            .field("current", &*self.inner.borrow())
            .finish()
    }
}

impl<N: Clone + 'static> RefTarget for RefCell<Option<N>> {
    fn attach(&self, node: &dyn Any) {
        match node.downcast_ref::<N>() {
            Some(node) => *self.borrow_mut() = Some(node.clone()),
            None => tracing::warn!(
                expected = std::any::type_name::<N>(),
                "ref prop received a host node of another type"
            ),
        }
    }

    fn detach(&self) {
        *self.borrow_mut() = None;
    }
}

impl<N: Clone + 'static> From<RefHandle<Option<N>>> for PropValue {
    fn from(handle: RefHandle<Option<N>>) -> Self {
        PropValue::Ref(NodeRef::new(handle.inner))
    }
}

/// Storage for effect dependencies and cleanup function.
#[derive(Default)]
pub struct EffectState {
    pub(crate) deps: Option<Box<dyn Any>>,
    pub(crate) cleanup: Option<Cleanup>,
    pub(crate) disposed: bool,
}

/// Storage for memoized computation state.
struct MemoState<T, D> {
    value: Option<T>,
    deps: Option<D>,
}

/// Dependency marker that never compares equal, so the effect runs after
/// every render.
#[derive(Debug, Clone, Copy, Default)]
pub struct Always;

impl PartialEq for Always {
    fn eq(&self, _other: &Self) -> bool {
        false
    }
}
