//! Deferred work owned by a render root.
//!
//! State setters never re-render synchronously. They mark the owning
//! root's [`RenderContext`] dirty, and effects produced during a render are
//! queued here until the root's patch has been applied. The root drains
//! both on its next flush.

use std::any::Any;
use std::cell::RefCell;
use std::collections::VecDeque;
use std::fmt;
use std::rc::Rc;

use crate::hooks::EffectState;

/// A cleanup returned by an effect, run before the next invocation or on
/// unmount.
pub type Cleanup = Box<dyn FnOnce()>;

/// An effect callback waiting for the current patch to finish.
///
/// The dependencies it was queued with are committed to the hook slot only
/// when it runs, so an effect that is discarded is queued again by the next
/// render.
pub struct PendingEffect {
    state: Rc<RefCell<EffectState>>,
    deps: Box<dyn Any>,
    run: Box<dyn FnOnce() -> Option<Cleanup>>,
}

impl PendingEffect {
    pub(crate) fn new(
        state: Rc<RefCell<EffectState>>,
        deps: Box<dyn Any>,
        run: Box<dyn FnOnce() -> Option<Cleanup>>,
    ) -> Self {
        Self { state, deps, run }
    }

    /// Run the previous cleanup (if any), then the callback, and keep the
    /// cleanup it returns. Effects of unmounted instances are skipped.
    pub fn run(self) {
        let previous = {
            let mut state = self.state.borrow_mut();
            if state.disposed {
                return;
            }
            state.deps = Some(self.deps);
            state.cleanup.take()
        };
        if let Some(cleanup) = previous {
            cleanup();
        }

        let cleanup = (self.run)();
        self.state.borrow_mut().cleanup = cleanup;
    }
}

impl fmt::Debug for PendingEffect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("PendingEffect(...)")
    }
}

/// Shared state for the render context.
#[derive(Default)]
struct RenderContextInner {
    needs_render: bool,
    render_requests: usize,
    pending_effects: VecDeque<PendingEffect>,
    closed: bool,
}

/// Handle for requesting re-renders and queueing effects on one root.
#[derive(Clone, Default)]
pub struct RenderContext {
    inner: Rc<RefCell<RenderContextInner>>,
}

impl RenderContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request a re-render of the owning root.
    ///
    /// Requests made before the next flush are coalesced into one pass.
    pub fn request_render(&self) {
        let mut inner = self.inner.borrow_mut();
        if inner.closed {
            tracing::warn!("render requested on a root that has been unmounted");
            return;
        }
        inner.render_requests += 1;
        if !inner.needs_render {
            inner.needs_render = true;
            tracing::trace!("re-render scheduled");
        }
    }

    pub fn needs_render(&self) -> bool {
        self.inner.borrow().needs_render
    }

    /// Total render requests seen, coalesced or not.
    pub fn render_requests(&self) -> usize {
        self.inner.borrow().render_requests
    }

    pub fn clear_render_flag(&self) {
        self.inner.borrow_mut().needs_render = false;
    }

    pub fn queue_effect(&self, effect: PendingEffect) {
        self.inner.borrow_mut().pending_effects.push_back(effect);
    }

    pub fn pending_effects(&self) -> usize {
        self.inner.borrow().pending_effects.len()
    }

    /// Drop effects queued after the first `len`, e.g. by a render pass
    /// that failed before its patch was applied.
    pub fn discard_effects_from(&self, len: usize) {
        let mut inner = self.inner.borrow_mut();
        if inner.pending_effects.len() > len {
            tracing::debug!(
                discarded = inner.pending_effects.len() - len,
                "discarding effects of an aborted render pass"
            );
            inner.pending_effects.truncate(len);
        }
    }

    /// Take every queued effect, in queueing order.
    pub fn take_effects(&self) -> VecDeque<PendingEffect> {
        std::mem::take(&mut self.inner.borrow_mut().pending_effects)
    }

    /// Stop accepting work; later requests are logged and dropped.
    pub fn close(&self) {
        let mut inner = self.inner.borrow_mut();
        inner.closed = true;
        inner.needs_render = false;
        inner.pending_effects.clear();
    }

    pub fn is_closed(&self) -> bool {
        self.inner.borrow().closed
    }
}

impl fmt::Debug for RenderContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.borrow();
        f.debug_struct("RenderContext")
            .field("needs_render", &inner.needs_render)
            .field("pending_effects", &inner.pending_effects.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn requests_are_coalesced() {
        let ctx = RenderContext::new();
        assert!(!ctx.needs_render());

        ctx.request_render();
        ctx.request_render();
        assert!(ctx.needs_render());
        assert_eq!(ctx.render_requests(), 2);

        ctx.clear_render_flag();
        assert!(!ctx.needs_render());
    }

    #[test]
    fn discarded_effects_never_run_and_keep_deps_uncommitted() {
        let ctx = RenderContext::new();
        let state = Rc::new(RefCell::new(EffectState::default()));
        let runs = Rc::new(std::cell::Cell::new(0));

        let kept = runs.clone();
        ctx.queue_effect(PendingEffect::new(
            state.clone(),
            Box::new(1),
            Box::new(move || {
                kept.set(kept.get() + 1);
                None
            }),
        ));
        let dropped = runs.clone();
        ctx.queue_effect(PendingEffect::new(
            Rc::new(RefCell::new(EffectState::default())),
            Box::new(2),
            Box::new(move || {
                dropped.set(dropped.get() + 10);
                None
            }),
        ));

        ctx.discard_effects_from(1);
        assert_eq!(ctx.pending_effects(), 1);
        assert!(state.borrow().deps.is_none());

        for effect in ctx.take_effects() {
            effect.run();
        }
        assert_eq!(runs.get(), 1);
        let committed = state
            .borrow()
            .deps
            .as_ref()
            .and_then(|deps| deps.downcast_ref::<i32>().copied());
        assert_eq!(committed, Some(1));
    }

    #[test]
    fn closed_context_drops_requests() {
        let ctx = RenderContext::new();
        ctx.close();
        ctx.request_render();

        assert!(ctx.is_closed());
        assert!(!ctx.needs_render());
    }
}
