//! Reactive primitives: signals, effects, and memos.
//!
//! Fine-grained reactivity in the style of Solid.js and Leptos. Unlike the
//! hook state in [`crate::hooks`], this graph has no notion of components or
//! renders; it is usable anywhere.
//!
//! # Core Concepts
//!
//! - **Signal**: a value cell that notifies the effects that read it when it changes
//! - **Effect**: a closure that re-runs when any signal it read on its last run changes
//! - **Memo**: a cached derived value, kept current eagerly by a backing effect
//!
//! All graph state lives in a [`Runtime`]. The runtime owns the tracking
//! stack, so "the currently running effect" is a property of one runtime and
//! never a process global.
//!
//! # Example
//!
//! ```ignore
//! use arbor_core::reactive::Runtime;
//!
//! let rt = Runtime::new();
//! let (count, set_count) = rt.create_signal(0);
//!
//! rt.create_effect(move || {
//!     println!("Count is: {}", count.get());
//! });
//!
//! set_count.set(1); // Prints: "Count is: 1"
//! ```

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::{Rc, Weak};

use indexmap::IndexSet;

// ============================================================================
// Runtime
// ============================================================================

/// Identity of a node in the graph. Signals, effects and memos share one id
/// space; a memo is both a source and an observer under the same id.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
struct NodeId(usize);

struct EffectSlot {
    /// `None` while the effect is running.
    f: Option<Box<dyn FnMut()>>,
    /// Sources read during the last run.
    sources: Vec<NodeId>,
    /// Notified while running; re-runs as soon as the current run returns.
    dirty: bool,
}

#[derive(Default)]
struct RuntimeInner {
    /// Currently executing observers. `None` entries come from `untracked`.
    observer_stack: Vec<Option<NodeId>>,
    effects: HashMap<NodeId, EffectSlot>,
    subscribers: HashMap<NodeId, IndexSet<NodeId>>,
    batch_depth: usize,
    pending: IndexSet<NodeId>,
    next_id: usize,
}

/// Owner of a reactive graph.
///
/// Cloning a runtime yields another handle to the same graph.
#[derive(Clone, Default)]
pub struct Runtime {
    inner: Rc<RefCell<RuntimeInner>>,
}

impl Runtime {
    pub fn new() -> Self {
        Self::default()
    }

    fn next_id(&self) -> NodeId {
        let mut inner = self.inner.borrow_mut();
        let id = NodeId(inner.next_id);
        inner.next_id += 1;
        id
    }

    fn downgrade(&self) -> WeakRuntime {
        WeakRuntime(Rc::downgrade(&self.inner))
    }

    /// Subscribe the current observer (if any) to `source`.
    fn track(&self, source: NodeId) {
        let mut inner = self.inner.borrow_mut();
        let Some(Some(observer)) = inner.observer_stack.last().copied() else {
            return;
        };
        if observer == source {
            return;
        }
        inner
            .subscribers
            .entry(source)
            .or_default()
            .insert(observer);
        if let Some(slot) = inner.effects.get_mut(&observer)
            && !slot.sources.contains(&source)
        {
            slot.sources.push(source);
        }
    }

    /// Run every subscriber of `source`, from a snapshot taken now.
    fn notify(&self, source: NodeId) {
        let subscribers: Vec<NodeId> = {
            let mut inner = self.inner.borrow_mut();
            let Some(subscribers) = inner.subscribers.get(&source) else {
                return;
            };
            let snapshot: Vec<NodeId> = subscribers.iter().copied().collect();
            if inner.batch_depth > 0 {
                inner.pending.extend(snapshot);
                return;
            }
            snapshot
        };

        for observer in subscribers {
            self.run_effect(observer);
        }
    }

    /// Drop every subscription `observer` holds.
    fn unsubscribe(inner: &mut RuntimeInner, observer: NodeId, sources: &[NodeId]) {
        for source in sources {
            if let Some(subscribers) = inner.subscribers.get_mut(source) {
                subscribers.shift_remove(&observer);
                if subscribers.is_empty() {
                    inner.subscribers.remove(source);
                }
            }
        }
    }

    /// Run `f` with `observer` as the tracking target, after dropping the
    /// subscriptions of its previous run.
    fn observe<R>(&self, observer: NodeId, f: impl FnOnce() -> R) -> R {
        {
            let mut inner = self.inner.borrow_mut();
            let stale = inner
                .effects
                .get_mut(&observer)
                .map(|slot| std::mem::take(&mut slot.sources))
                .unwrap_or_default();
            Self::unsubscribe(&mut inner, observer, &stale);
            inner.observer_stack.push(Some(observer));
        }

        let result = f();

        self.inner.borrow_mut().observer_stack.pop();
        result
    }

    fn run_effect(&self, id: NodeId) {
        let f = {
            let mut inner = self.inner.borrow_mut();
            let Some(slot) = inner.effects.get_mut(&id) else {
                return;
            };
            let f = slot.f.take();
            if f.is_none() {
                // Already running: the outer run picks the change up.
                slot.dirty = true;
                tracing::trace!(effect = id.0, "effect notified while running, re-run queued");
            }
            f
        };
        let Some(mut f) = f else {
            return;
        };

        loop {
            self.observe(id, &mut f);

            let mut inner = self.inner.borrow_mut();
            // The effect may have been disposed while it ran.
            let Some(slot) = inner.effects.get_mut(&id) else {
                return;
            };
            if !std::mem::take(&mut slot.dirty) {
                slot.f = Some(f);
                return;
            }
        }
    }

    fn register(&self) -> NodeId {
        let id = self.next_id();
        self.inner.borrow_mut().effects.insert(
            id,
            EffectSlot {
                f: None,
                sources: Vec::new(),
                dirty: false,
            },
        );
        id
    }

    fn install(&self, id: NodeId, f: Box<dyn FnMut()>) {
        if let Some(slot) = self.inner.borrow_mut().effects.get_mut(&id) {
            slot.f = Some(f);
        }
    }

    fn dispose_effect(&self, id: NodeId) {
        // Dropping the closure may drop signal handles; release the borrow first.
        let removed = {
            let mut inner = self.inner.borrow_mut();
            let removed = inner.effects.remove(&id);
            if let Some(slot) = &removed {
                Self::unsubscribe(&mut inner, id, &slot.sources);
            }
            inner.subscribers.remove(&id);
            inner.pending.shift_remove(&id);
            removed
        };
        drop(removed);
    }

    /// Create a signal holding `value`.
    ///
    /// Returns a read half that tracks and a write half that notifies.
    pub fn create_signal<T: 'static>(&self, value: T) -> (ReadSignal<T>, WriteSignal<T>) {
        let id = self.next_id();
        let cell = Rc::new(RefCell::new(value));
        (
            ReadSignal {
                id,
                cell: Rc::clone(&cell),
                runtime: self.clone(),
            },
            WriteSignal {
                id,
                cell,
                runtime: self.clone(),
            },
        )
    }

    /// Create an effect, run it immediately, and re-run it whenever a
    /// signal read during its latest run changes.
    pub fn create_effect<F: FnMut() + 'static>(&self, f: F) -> Effect {
        let id = self.register();
        self.install(id, Box::new(f));
        self.run_effect(id);
        Effect {
            id,
            runtime: self.clone(),
        }
    }

    /// Create a memo computed by `f`.
    ///
    /// The value is recomputed eagerly whenever a dependency changes, and
    /// readers are notified only when the new value differs from the cached
    /// one. Reading never recomputes.
    pub fn create_memo<T, F>(&self, f: F) -> Memo<T>
    where
        T: Clone + PartialEq + 'static,
        F: Fn() -> T + 'static,
    {
        let id = self.register();
        let cell = Rc::new(RefCell::new(self.observe(id, &f)));

        let runtime = self.downgrade();
        let cached = Rc::clone(&cell);
        self.install(
            id,
            Box::new(move || {
                let next = f();
                if *cached.borrow() == next {
                    return;
                }
                *cached.borrow_mut() = next;
                if let Some(runtime) = runtime.upgrade() {
                    runtime.notify(id);
                }
            }),
        );

        Memo {
            id,
            cell,
            runtime: self.clone(),
        }
    }

    /// Defer notifications made inside `f`; each affected effect runs once
    /// when the outermost batch ends.
    ///
    /// The queue is drained in notification order while still batched, so
    /// a memo re-computed during the drain only re-queues readers that are
    /// not already waiting.
    pub fn batch<R>(&self, f: impl FnOnce() -> R) -> R {
        self.inner.borrow_mut().batch_depth += 1;
        let result = f();

        if self.inner.borrow().batch_depth == 1 {
            loop {
                let next = self.inner.borrow_mut().pending.shift_remove_index(0);
                let Some(observer) = next else {
                    break;
                };
                self.run_effect(observer);
            }
        }

        self.inner.borrow_mut().batch_depth -= 1;
        result
    }

    /// Run `f` without subscribing the current observer to anything it reads.
    pub fn untracked<R>(&self, f: impl FnOnce() -> R) -> R {
        self.inner.borrow_mut().observer_stack.push(None);
        let result = f();
        self.inner.borrow_mut().observer_stack.pop();
        result
    }

    /// Number of live effects and memos.
    pub fn effect_count(&self) -> usize {
        self.inner.borrow().effects.len()
    }
}

impl fmt::Debug for Runtime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.borrow();
        f.debug_struct("Runtime")
            .field("effects", &inner.effects.len())
            .field("sources", &inner.subscribers.len())
            .field("batch_depth", &inner.batch_depth)
            .finish()
    }
}

struct WeakRuntime(Weak<RefCell<RuntimeInner>>);

impl WeakRuntime {
    fn upgrade(&self) -> Option<Runtime> {
        self.0.upgrade().map(|inner| Runtime { inner })
    }
}

// ============================================================================
// Signal
// ============================================================================

/// Read half of a signal.
///
/// Reading inside an effect subscribes that effect to the signal.
///
/// # Example
///
/// ```ignore
/// let (count, set_count) = rt.create_signal(0);
///
/// let value = count.get();
/// set_count.set(5);
/// set_count.update(|n| n + 1);
/// ```
pub struct ReadSignal<T> {
    id: NodeId,
    cell: Rc<RefCell<T>>,
    runtime: Runtime,
}

impl<T: Clone> ReadSignal<T> {
    /// Get the current value, subscribing the running effect.
    pub fn get(&self) -> T {
        self.runtime.track(self.id);
        self.cell.borrow().clone()
    }

    /// Get the current value without subscribing.
    pub fn get_untracked(&self) -> T {
        self.cell.borrow().clone()
    }
}

impl<T> ReadSignal<T> {
    /// Borrow the current value without cloning, subscribing the running
    /// effect.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        self.runtime.track(self.id);
        f(&self.cell.borrow())
    }
}

impl<T> Clone for ReadSignal<T> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            cell: Rc::clone(&self.cell),
            runtime: self.runtime.clone(),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for ReadSignal<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReadSignal")
            .field("value", &*self.cell.borrow())
            .finish()
    }
}

impl<T: fmt::Display> fmt::Display for ReadSignal<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&*self.cell.borrow(), f)
    }
}

/// Write half of a signal.
pub struct WriteSignal<T> {
    id: NodeId,
    cell: Rc<RefCell<T>>,
    runtime: Runtime,
}

impl<T> WriteSignal<T> {
    /// Store `value` and synchronously run every subscribed effect.
    pub fn set(&self, value: T) {
        *self.cell.borrow_mut() = value;
        self.runtime.notify(self.id);
    }

    /// Compute the next value from the previous one, then notify.
    pub fn update(&self, f: impl FnOnce(&T) -> T) {
        let next = f(&self.cell.borrow());
        self.set(next);
    }
}

impl<T> Clone for WriteSignal<T> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            cell: Rc::clone(&self.cell),
            runtime: self.runtime.clone(),
        }
    }
}

impl<T> fmt::Debug for WriteSignal<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "WriteSignal({})", self.id.0)
    }
}

// ============================================================================
// Effect
// ============================================================================

/// Handle to an effect created by [`Runtime::create_effect`].
///
/// Dropping the handle does not stop the effect. Call [`Effect::dispose`].
#[derive(Clone)]
pub struct Effect {
    id: NodeId,
    runtime: Runtime,
}

impl Effect {
    /// Run the effect now, re-tracking its dependencies.
    pub fn run(&self) {
        self.runtime.run_effect(self.id);
    }

    /// Unsubscribe the effect and drop its closure.
    pub fn dispose(&self) {
        self.runtime.dispose_effect(self.id);
    }

    pub fn is_disposed(&self) -> bool {
        !self.runtime.inner.borrow().effects.contains_key(&self.id)
    }
}

impl fmt::Debug for Effect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Effect({})", self.id.0)
    }
}

// ============================================================================
// Memo
// ============================================================================

/// A cached derived value.
///
/// # Example
///
/// ```ignore
/// let (count, set_count) = rt.create_signal(2);
/// let doubled = rt.create_memo(move || count.get() * 2);
///
/// doubled.get(); // 4, computed when the memo was created
/// set_count.set(3); // recomputed here
/// doubled.get(); // 6, cached
/// ```
pub struct Memo<T> {
    id: NodeId,
    cell: Rc<RefCell<T>>,
    runtime: Runtime,
}

impl<T: Clone> Memo<T> {
    /// The cached value. Subscribes the running effect; never recomputes.
    pub fn get(&self) -> T {
        self.runtime.track(self.id);
        self.cell.borrow().clone()
    }

    pub fn get_untracked(&self) -> T {
        self.cell.borrow().clone()
    }
}

impl<T> Memo<T> {
    /// Stop recomputing. The last value stays readable.
    pub fn dispose(&self) {
        self.runtime.dispose_effect(self.id);
    }
}

impl<T> Clone for Memo<T> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            cell: Rc::clone(&self.cell),
            runtime: self.runtime.clone(),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for Memo<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Memo")
            .field("value", &*self.cell.borrow())
            .finish()
    }
}
