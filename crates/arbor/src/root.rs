//! Render roots.
//!
//! A [`Root`] owns everything that outlives a single render pass for one
//! host container: the last input tree, the mounted tree it produced, the
//! component instances behind it and the update queue their hooks write to.
//!
//! State setters never render synchronously. They mark the root's
//! [`RenderContext`] dirty; the work happens on the next [`Root::flush`]:
//!
//! ```ignore
//! let mut host = MemoryHost::new();
//! let container = host.create_container("div");
//! let mut root = Root::new(host, container);
//!
//! root.render(VNode::component(&counter, Props::new()))?;
//! root.host().dispatch(button, &Event::new("click"));
//! root.flush()?; // re-renders once, then runs effects
//! ```

use arbor_core::{HookMeta, RenderContext, VNode};

use crate::config::RootConfig;
use crate::error::RenderError;
use crate::host::HostAdapter;
use crate::renderer::mount::{mount, release};
use crate::renderer::reconcile::reconcile_children;
use crate::renderer::resolve::{dispose, Instances, Resolver};
use crate::renderer::Mounted;

/// The container record of one rendering target.
pub struct Root<H: HostAdapter> {
    host: H,
    container: H::Node,
    config: RootConfig,
    context: RenderContext,
    instances: Instances,
    /// Input of the last `render` call, replayed for scheduled re-renders.
    current: Option<VNode>,
    /// `None` until the first successful mount.
    tree: Option<Vec<Mounted<H::Node>>>,
    passes: usize,
}

impl<H: HostAdapter> Root<H> {
    pub fn new(host: H, container: H::Node) -> Self {
        Self::with_config(host, container, RootConfig::default())
    }

    pub fn with_config(host: H, container: H::Node, config: RootConfig) -> Self {
        Self {
            host,
            container,
            config,
            context: RenderContext::new(),
            instances: Instances::default(),
            current: None,
            tree: None,
            passes: 0,
        }
    }

    /// Render `vnode` into the container.
    ///
    /// The first call mounts, later calls reconcile against the previous
    /// tree. Queued effects and any re-renders they request are flushed
    /// before returning.
    pub fn render(&mut self, vnode: VNode) -> Result<(), RenderError> {
        self.current = Some(vnode);
        self.pass()?;
        self.flush()
    }

    /// Run queued effects and pending re-renders until both queues are
    /// empty.
    ///
    /// Effects always run after the patch that queued them. Re-render
    /// requests made since the last pass collapse into a single pass.
    pub fn flush(&mut self) -> Result<(), RenderError> {
        let mut passes = 0;
        loop {
            let effects = self.context.take_effects();
            if !effects.is_empty() {
                tracing::trace!(count = effects.len(), "running effects");
                for effect in effects {
                    effect.run();
                }
                continue;
            }

            if !self.context.needs_render() {
                return Ok(());
            }
            if passes == self.config.max_flush_passes {
                tracing::warn!(passes, "render requests did not settle");
                return Err(RenderError::FlushLimit { passes });
            }
            passes += 1;
            self.pass()?;
        }
    }

    fn pass(&mut self) -> Result<(), RenderError> {
        let queued = self.context.pending_effects();
        let result = self.apply_pass();
        if result.is_err() {
            // Effects of an aborted pass never observe a patched tree.
            self.context.discard_effects_from(queued);
        }
        result
    }

    fn apply_pass(&mut self) -> Result<(), RenderError> {
        self.context.clear_render_flag();
        let Some(vnode) = self.current.as_ref() else {
            return Ok(());
        };

        self.instances.begin_pass();
        let resolved = Resolver::new(&mut self.instances, &self.context).resolve_root(vnode)?;

        let tree = match self.tree.take() {
            Some(old) => reconcile_children(
                &mut self.host,
                &self.container,
                old,
                resolved,
                self.config.keyed_diffing,
            )?,
            None => {
                if self.config.clear_container_on_mount {
                    self.host.clear_children(&self.container);
                }
                let mut tree = Vec::with_capacity(resolved.len());
                for vnode in resolved {
                    let mounted = mount(&mut self.host, vnode)?;
                    self.host.append_child(&self.container, &mounted.node);
                    tree.push(mounted);
                }
                tree
            }
        };
        self.tree = Some(tree);

        // Cleanups of instances that left the tree run after the patch.
        dispose(self.instances.sweep());

        self.passes += 1;
        tracing::debug!(
            pass = self.passes,
            instances = self.instances.len(),
            pending_effects = self.context.pending_effects(),
            "render pass applied"
        );
        Ok(())
    }

    /// Remove the rendered nodes from the container and unmount every
    /// component instance, running its effect cleanups.
    ///
    /// Setters held by the old instances are ignored afterwards. The root
    /// can be rendered into again.
    pub fn unmount(&mut self) {
        for mounted in self.tree.take().unwrap_or_default() {
            self.host.remove_child(&self.container, &mounted.node);
            release(&mounted);
        }
        dispose(self.instances.take_all());

        self.context.close();
        self.context = RenderContext::new();
        self.current = None;
        tracing::debug!("root unmounted");
    }

    pub fn is_mounted(&self) -> bool {
        self.tree.is_some()
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    pub fn host_mut(&mut self) -> &mut H {
        &mut self.host
    }

    pub fn container(&self) -> &H::Node {
        &self.container
    }

    pub fn config(&self) -> &RootConfig {
        &self.config
    }

    /// The update queue setters of this root write to.
    pub fn render_context(&self) -> &RenderContext {
        &self.context
    }

    /// Host nodes directly under the container, in order.
    pub fn root_nodes(&self) -> Vec<H::Node> {
        self.tree
            .iter()
            .flatten()
            .map(|mounted| mounted.node.clone())
            .collect()
    }

    /// The resolved tree of the last pass.
    pub fn last_resolved(&self) -> Option<Vec<VNode>> {
        self.tree
            .as_ref()
            .map(|tree| tree.iter().map(Mounted::to_vnode).collect())
    }

    /// Total render passes applied.
    pub fn render_passes(&self) -> usize {
        self.passes
    }

    pub fn instance_count(&self) -> usize {
        self.instances.len()
    }

    /// Hook layout of every live component instance.
    pub fn hooks_debug_info(&self) -> Vec<(&'static str, Vec<HookMeta>)> {
        self.instances.debug_info()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::{MemoryHost, Mutation, NodeId};
    use arbor_core::{
        children, create_context, create_element, props, Component, ElementError, Event,
        Handler, Props, Runtime, SlotKind, StyleMap,
    };
    use std::cell::{Cell, RefCell};
    use std::rc::Rc;

    fn init_tracing() {
        let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    }

    fn memory_root() -> Root<MemoryHost> {
        init_tracing();
        let mut host = MemoryHost::new();
        let container = host.create_container("div");
        Root::new(host, container)
    }

    fn html(root: &Root<MemoryHost>) -> String {
        root.host().inner_html(*root.container())
    }

    fn click(root: &Root<MemoryHost>, node: NodeId) {
        root.host().dispatch(node, &Event::new("click"));
    }

    #[test]
    fn paragraph_with_text() {
        let mut root = memory_root();
        root.render(create_element("p", None, children!["hello"]))
            .expect("render");

        let nodes = root.root_nodes();
        assert_eq!(nodes.len(), 1);
        assert_eq!(root.host().tag(nodes[0]), Some("p"));
        assert_eq!(root.host().text_content(nodes[0]), "hello");
        assert_eq!(html(&root), "<p>hello</p>");
    }

    #[test]
    fn class_update_reuses_the_node() {
        let mut root = memory_root();
        root.render(create_element("div", props! { "className" => "old" }, []))
            .expect("render");
        let before = root.root_nodes();

        root.render(create_element("div", props! { "className" => "new" }, []))
            .expect("render");

        assert_eq!(root.root_nodes(), before);
        assert_eq!(
            root.host().property(before[0], "className"),
            Some(&"new".into())
        );
    }

    fn counter() -> Component {
        Component::new("Counter", |cx, _| {
            let (count, set_count) = cx.use_state(0);
            VNode::element("button")
                .prop(
                    "onClick",
                    Handler::from_fn(move || set_count.update(|n| n + 1)),
                )
                .child(count)
        })
    }

    #[test]
    fn click_counter_renders_two() {
        let mut root = memory_root();
        root.render(VNode::component(&counter(), Props::new()))
            .expect("render");
        let button = root.root_nodes()[0];

        click(&root, button);
        // Setters only schedule.
        assert_eq!(root.host().text_content(button), "0");
        root.flush().expect("flush");
        assert_eq!(root.host().text_content(button), "1");

        click(&root, button);
        root.flush().expect("flush");
        assert_eq!(root.root_nodes(), vec![button]);
        assert_eq!(root.host().text_content(button), "2");
    }

    #[test]
    fn keyed_list_removal_keeps_survivors() {
        let list = |keys: &[&str]| {
            VNode::element("ul").children(
                keys.iter()
                    .map(|key| VNode::element("li").with_key(*key).child(*key)),
            )
        };
        let mut root = memory_root();
        root.render(list(&["a", "b", "c"])).expect("render");
        let ul = root.root_nodes()[0];
        let before = root.host().children(ul).to_vec();
        root.host_mut().clear_journal();

        root.render(list(&["a", "c"])).expect("render");

        assert_eq!(root.host().children(ul), &[before[0], before[2]]);
        assert_eq!(
            root.host().journal(),
            &[Mutation::RemoveChild { parent: ul, child: before[1] }]
        );
    }

    #[test]
    fn rerendering_the_same_tree_is_silent() {
        let handler = Handler::from_fn(|| {});
        let tree = VNode::element("section")
            .prop("onClick", handler)
            .prop("style", StyleMap::from([("color".to_string(), "red".to_string())]))
            .child(VNode::element("h1").child("title"))
            .child("body");

        let mut root = memory_root();
        root.render(tree.clone()).expect("render");
        root.host_mut().clear_journal();

        root.render(tree).expect("render");
        assert!(root.host().journal().is_empty());
    }

    #[test]
    fn setter_requests_are_coalesced() {
        let renders = Rc::new(Cell::new(0));
        let setter = Rc::new(RefCell::new(None));

        let component = Component::new("Batch", {
            let renders = renders.clone();
            let setter = setter.clone();
            move |cx, _| {
                renders.set(renders.get() + 1);
                let (value, set_value) = cx.use_state(0);
                *setter.borrow_mut() = Some(set_value);
                VNode::text(value.to_string())
            }
        });

        let mut root = memory_root();
        root.render(VNode::component(&component, Props::new()))
            .expect("render");
        assert_eq!(renders.get(), 1);

        let set_value = setter.borrow().clone().expect("setter captured");
        set_value.set(1);
        set_value.update(|n| n + 1);
        set_value.update(|n| n + 1);
        root.flush().expect("flush");

        assert_eq!(renders.get(), 2);
        assert_eq!(html(&root), "3");
        assert_eq!(root.render_context().render_requests(), 3);
    }

    #[test]
    fn instances_of_one_component_are_independent() {
        let counter = counter();
        let mut root = memory_root();
        root.render(VNode::fragment(children![
            VNode::component(&counter, Props::new()),
            VNode::component(&counter, Props::new()),
        ]))
        .expect("render");
        let buttons = root.root_nodes();

        click(&root, buttons[0]);
        root.flush().expect("flush");

        assert_eq!(html(&root), "<button>1</button><button>0</button>");
        assert_eq!(root.instance_count(), 2);
    }

    #[test]
    fn effects_run_after_the_patch_in_queue_order() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let component = Component::new("Tracker", {
            let log = log.clone();
            move |cx, _| {
                let node = cx.use_ref(None::<NodeId>);
                let (first, second) = (log.clone(), log.clone());
                let seen = node.clone();
                cx.use_effect(
                    move || first.borrow_mut().push(format!("attached={}", seen.get().is_some())),
                    (),
                );
                cx.use_effect(move || second.borrow_mut().push("second".to_string()), ());
                VNode::element("input").prop("ref", node)
            }
        });

        let mut root = memory_root();
        root.render(VNode::component(&component, Props::new()))
            .expect("render");

        assert_eq!(*log.borrow(), vec!["attached=true", "second"]);
    }

    #[test]
    fn removed_components_run_cleanups_once() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let child = Component::new("Child", {
            let log = log.clone();
            move |cx, _| {
                let log = log.clone();
                cx.use_mount(move || {
                    log.borrow_mut().push("mount");
                    move || log.borrow_mut().push("cleanup")
                });
                VNode::element("span")
            }
        });
        let tree = |show: bool| {
            VNode::element("div").child(show.then(|| VNode::component(&child, Props::new())))
        };

        let mut root = memory_root();
        root.render(tree(true)).expect("render");
        root.render(tree(true)).expect("render");
        root.render(tree(false)).expect("render");
        root.render(tree(false)).expect("render");

        assert_eq!(*log.borrow(), vec!["mount", "cleanup"]);
        assert_eq!(root.instance_count(), 0);
        assert_eq!(html(&root), "<div></div>");
    }

    #[test]
    fn unmount_tears_everything_down() {
        let cleaned = Rc::new(Cell::new(false));
        let setter = Rc::new(RefCell::new(None));
        let component = Component::new("Leaf", {
            let cleaned = cleaned.clone();
            let setter = setter.clone();
            move |cx, _| {
                let (_, set) = cx.use_state(0);
                *setter.borrow_mut() = Some(set);
                let cleaned = cleaned.clone();
                cx.use_mount(move || move || cleaned.set(true));
                VNode::element("p")
            }
        });

        let mut root = memory_root();
        root.render(VNode::component(&component, Props::new()))
            .expect("render");
        root.unmount();

        assert!(cleaned.get());
        assert!(!root.is_mounted());
        assert_eq!(html(&root), "");

        // A stale setter does not schedule anything on the fresh queue.
        if let Some(set) = setter.borrow().as_ref() {
            set.set(1);
        }
        assert!(!root.render_context().needs_render());

        root.render(VNode::element("p").child("again")).expect("render");
        assert_eq!(html(&root), "<p>again</p>");
    }

    #[test]
    fn self_scheduling_renders_hit_the_limit() {
        let component = Component::new("Loop", |cx, _| {
            let (n, set_n) = cx.use_state(0);
            cx.use_effect_always(move || set_n.set(n + 1));
            VNode::text(n.to_string())
        });

        init_tracing();
        let mut host = MemoryHost::new();
        let container = host.create_container("div");
        let config = RootConfig {
            max_flush_passes: 5,
            ..RootConfig::default()
        };
        let mut root = Root::with_config(host, container, config);

        let err = root
            .render(VNode::component(&component, Props::new()))
            .unwrap_err();
        assert_eq!(err, RenderError::FlushLimit { passes: 5 });
        assert_eq!(root.render_passes(), 6);
    }

    #[test]
    fn malformed_tree_leaves_the_host_untouched() {
        let mut root = memory_root();
        root.render(VNode::element("p")).expect("render");
        root.host_mut().clear_journal();

        let err = root
            .render(VNode::element("p").child(VNode::element("not a tag")))
            .unwrap_err();

        assert_eq!(
            err,
            RenderError::Element(ElementError::InvalidTag("not a tag".into()))
        );
        assert!(root.host().journal().is_empty());
    }

    #[test]
    fn failed_pass_does_not_run_its_effects() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let tracker = Component::new("Tracker", {
            let log = log.clone();
            move |cx, _| {
                let log = log.clone();
                cx.use_effect(move || log.borrow_mut().push("effect ran"), ());
                VNode::element("span")
            }
        });
        let tree = |sibling: &'static str| {
            VNode::fragment(children![
                VNode::component(&tracker, Props::new()),
                VNode::element(sibling),
            ])
        };

        let mut root = memory_root();
        assert!(root.render(tree("bad tag")).is_err());
        root.flush().expect("flush");
        assert_eq!(html(&root), "");
        assert!(log.borrow().is_empty());

        root.render(tree("p")).expect("render");
        assert_eq!(html(&root), "<span></span><p></p>");
        assert_eq!(*log.borrow(), vec!["effect ran"]);
    }

    #[test]
    fn container_is_cleared_on_first_mount() {
        init_tracing();
        for clear in [true, false] {
            let mut host = MemoryHost::new();
            let container = host.create_container("div");
            let stale = host.create_text("stale");
            host.append_child(&container, &stale);

            let config = RootConfig {
                clear_container_on_mount: clear,
                ..RootConfig::default()
            };
            let mut root = Root::with_config(host, container, config);
            root.render(VNode::text("fresh")).expect("render");

            let expected = if clear { "fresh" } else { "stalefresh" };
            assert_eq!(html(&root), expected);
        }
    }

    #[test]
    fn context_reaches_nested_components() {
        let theme = create_context("light".to_string());
        let label = Component::new("Label", {
            let theme = theme.clone();
            move |cx, _| VNode::element("span").child(cx.use_context(&theme))
        });
        let panel = Component::new("Panel", {
            let label = label.clone();
            move |_, _| VNode::element("div").child(VNode::component(&label, Props::new()))
        });

        let mut root = memory_root();
        root.render(VNode::fragment(children![
            theme.provider(
                "dark".to_string(),
                children![VNode::component(&panel, Props::new())]
            ),
            VNode::component(&label, Props::new()),
        ]))
        .expect("render");

        assert_eq!(
            html(&root),
            "<div><span>dark</span></div><span>light</span>"
        );
    }

    #[test]
    fn component_children_are_passed_through() {
        let card = Component::new("Card", |cx, props| {
            VNode::element("article")
                .prop("className", props.get_str("variant").unwrap_or("plain").to_string())
                .children(cx.children().iter().cloned())
        });

        let mut root = memory_root();
        let mut tree = VNode::component(&card, Props::new().with("variant", "wide"));
        tree.children.push(VNode::element("h2").child("title"));
        root.render(tree).expect("render");

        assert_eq!(
            html(&root),
            r#"<article class="wide"><h2>title</h2></article>"#
        );
    }

    #[test]
    fn signals_can_drive_a_root() {
        let rt = Runtime::new();
        let (name, set_name) = rt.create_signal("ada".to_string());
        let view = Component::new("View", {
            let name = name.clone();
            move |_, _| VNode::text(name.get_untracked())
        });

        let mut root = memory_root();
        root.render(VNode::component(&view, Props::new()))
            .expect("render");

        let context = root.render_context().clone();
        rt.create_effect(move || {
            let _ = name.get();
            context.request_render();
        });
        root.flush().expect("flush");

        set_name.set("grace".to_string());
        root.flush().expect("flush");
        assert_eq!(html(&root), "grace");
    }

    #[test]
    fn hook_layout_is_reported_per_instance() {
        let component = Component::new("Form", |cx, _| {
            cx.use_state(0);
            cx.use_state(String::new());
            cx.use_ref(0u8);
            cx.use_effect(|| {}, ());
            VNode::element("form")
        });

        let mut root = memory_root();
        root.render(VNode::component(&component, Props::new()))
            .expect("render");

        let info = root.hooks_debug_info();
        assert_eq!(info.len(), 1);
        assert_eq!(info[0].0, "Form");
        let kinds: Vec<_> = info[0].1.iter().map(|meta| meta.kind).collect();
        assert_eq!(
            kinds,
            vec![SlotKind::State, SlotKind::State, SlotKind::Ref, SlotKind::Effect]
        );
    }

    #[test]
    #[should_panic(expected = "Hook count mismatch")]
    fn conditional_hooks_panic() {
        let flag = Rc::new(Cell::new(true));
        let component = Component::new("Flaky", {
            let flag = flag.clone();
            move |cx, _| {
                cx.use_state(0);
                if flag.get() {
                    cx.use_state(1);
                }
                VNode::element("div")
            }
        });

        let mut root = memory_root();
        let tree = VNode::component(&component, Props::new());
        root.render(tree.clone()).expect("render");
        flag.set(false);
        let _ = root.render(tree);
    }
}
