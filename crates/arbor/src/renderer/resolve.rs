//! Expansion of components, fragments and providers.
//!
//! Component state lives in an [`Instances`] table keyed by the instance's
//! path: the sibling index (or key) of every node from the root down, plus
//! the identity of every component along the way. Two occurrences of the
//! same component therefore own separate hook slots, and an instance keeps
//! its slots for as long as its path keeps resolving to the same component.

use arbor_core::element::KEY;
use arbor_core::hooks::PROVIDER_VALUE;
use arbor_core::{
    Component, ComponentId, ContextStack, ElementError, HookMeta, HookRegistry, Key, Kind,
    RenderContext, Scope, VNode,
};
use rustc_hash::{FxHashMap, FxHashSet};

#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub(crate) enum Segment {
    Index(usize),
    Key(Key),
    Component(ComponentId),
}

type Path = Vec<Segment>;

struct Instance {
    name: &'static str,
    registry: HookRegistry,
    /// Pass in which this instance was last rendered.
    epoch: u64,
    /// Creation order, for deterministic teardown.
    order: u64,
}

/// Hook storage of every live component instance of one root.
#[derive(Default)]
pub(crate) struct Instances {
    by_path: FxHashMap<Path, Instance>,
    epoch: u64,
    created: u64,
}

impl Instances {
    /// Start a render pass; instances not entered before the matching
    /// [`Instances::sweep`] are considered unmounted.
    pub fn begin_pass(&mut self) {
        self.epoch += 1;
    }

    fn enter(&mut self, path: &Path, name: &'static str) -> &mut Instance {
        let epoch = self.epoch;
        let created = &mut self.created;
        let instance = self.by_path.entry(path.clone()).or_insert_with(|| {
            *created += 1;
            tracing::trace!(component = name, "component instance created");
            Instance {
                name,
                registry: HookRegistry::new(),
                epoch,
                order: *created,
            }
        });
        instance.epoch = epoch;
        instance
    }

    fn drain_where(&mut self, stale: impl Fn(&Instance) -> bool) -> Vec<(&'static str, HookRegistry)> {
        let paths: Vec<Path> = self
            .by_path
            .iter()
            .filter(|(_, instance)| stale(instance))
            .map(|(path, _)| path.clone())
            .collect();

        let mut removed: Vec<Instance> = paths
            .iter()
            .filter_map(|path| self.by_path.remove(path))
            .collect();
        removed.sort_by_key(|instance| instance.order);
        removed
            .into_iter()
            .map(|instance| (instance.name, instance.registry))
            .collect()
    }

    /// Remove every instance the current pass did not reach.
    pub fn sweep(&mut self) -> Vec<(&'static str, HookRegistry)> {
        let epoch = self.epoch;
        self.drain_where(|instance| instance.epoch != epoch)
    }

    /// Remove every instance.
    pub fn take_all(&mut self) -> Vec<(&'static str, HookRegistry)> {
        self.drain_where(|_| true)
    }

    pub fn len(&self) -> usize {
        self.by_path.len()
    }

    /// Hook layout of every instance, in creation order.
    pub fn debug_info(&self) -> Vec<(&'static str, Vec<HookMeta>)> {
        let mut instances: Vec<&Instance> = self.by_path.values().collect();
        instances.sort_by_key(|instance| instance.order);
        instances
            .into_iter()
            .map(|instance| (instance.name, instance.registry.debug_info()))
            .collect()
    }
}

/// Run effect cleanups of instances that left the tree.
pub(crate) fn dispose(instances: Vec<(&'static str, HookRegistry)>) {
    for (name, mut registry) in instances {
        tracing::trace!(component = name, "component instance unmounted");
        registry.dispose();
    }
}

/// One resolution pass over a tree.
pub(crate) struct Resolver<'a> {
    instances: &'a mut Instances,
    render: &'a RenderContext,
    contexts: ContextStack,
    path: Path,
}

impl<'a> Resolver<'a> {
    pub fn new(instances: &'a mut Instances, render: &'a RenderContext) -> Self {
        Self {
            instances,
            render,
            contexts: ContextStack::new(),
            path: Vec::new(),
        }
    }

    /// Resolve `root` into the list of host-level nodes it stands for.
    pub fn resolve_root(&mut self, root: &VNode) -> Result<Vec<VNode>, ElementError> {
        let mut out = Vec::new();
        self.resolve_node(root, &mut out)?;
        Ok(out)
    }

    fn resolve_node(&mut self, node: &VNode, out: &mut Vec<VNode>) -> Result<(), ElementError> {
        match &node.kind {
            Kind::Text => {
                node.validate_host()?;
                out.push(node.clone());
            }
            Kind::Tag(_) => {
                node.validate_host()?;
                let mut children = Vec::with_capacity(node.children.len());
                self.resolve_children(&node.children, &mut children)?;
                out.push(VNode {
                    kind: node.kind.clone(),
                    props: node.props.clone(),
                    children,
                });
            }
            Kind::Fragment => self.resolve_children(&node.children, out)?,
            Kind::Provider(id) => {
                self.contexts.push(*id, node.props.get(PROVIDER_VALUE));
                let result = self.resolve_children(&node.children, out);
                self.contexts.pop();
                result?;
            }
            Kind::Component(component) => self.resolve_component(component, node, out)?,
        }
        Ok(())
    }

    fn resolve_children(
        &mut self,
        children: &[VNode],
        out: &mut Vec<VNode>,
    ) -> Result<(), ElementError> {
        let mut seen = FxHashSet::default();
        for (index, child) in children.iter().enumerate() {
            // A repeated key falls back to the position for instance identity.
            let segment = match child.key() {
                Some(key) if seen.insert(key.clone()) => Segment::Key(key),
                _ => Segment::Index(index),
            };
            self.path.push(segment);
            let result = self.resolve_node(child, out);
            self.path.pop();
            result?;
        }
        Ok(())
    }

    fn resolve_component(
        &mut self,
        component: &Component,
        node: &VNode,
        out: &mut Vec<VNode>,
    ) -> Result<(), ElementError> {
        self.path.push(Segment::Component(component.id()));

        let output = {
            let instance = self.instances.enter(&self.path, component.name());
            let mut scope = Scope::new(
                &mut instance.registry,
                self.render,
                &self.contexts,
                &node.children,
                component.name(),
            );
            let output = component.render(&mut scope, &node.props);
            scope.finish();
            output
        };
        tracing::trace!(component = component.name(), "component rendered");

        let start = out.len();
        let result = self.resolve_node(&output, out);
        self.path.pop();
        result?;

        // A keyed component lends its key to a single unkeyed root.
        if let Some(key) = node.props.get(KEY)
            && out.len() == start + 1
            && !out[start].props.contains(KEY)
        {
            out[start].props.insert(KEY, key.clone());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arbor_core::{children, create_context, create_element, props, Props};
    use std::cell::Cell;
    use std::rc::Rc;

    fn resolve(instances: &mut Instances, render: &RenderContext, root: &VNode) -> Vec<VNode> {
        instances.begin_pass();
        let resolved = Resolver::new(instances, render)
            .resolve_root(root)
            .expect("tree should resolve");
        dispose(instances.sweep());
        resolved
    }

    #[test]
    fn components_expand_to_host_nodes() {
        let greeting = Component::new("Greeting", |_, props| {
            VNode::element("p").child(props.get_str("name").unwrap_or("nobody").to_string())
        });
        let tree = VNode::element("div")
            .child(VNode::component(&greeting, Props::new().with("name", "ada")));

        let mut instances = Instances::default();
        let render = RenderContext::new();
        let resolved = resolve(&mut instances, &render, &tree);

        assert_eq!(resolved.len(), 1);
        let p = &resolved[0].children[0];
        assert_eq!(p.kind, Kind::from("p"));
        assert_eq!(p.children[0].text_value(), "ada");
        assert_eq!(instances.len(), 1);
    }

    #[test]
    fn fragments_are_spliced_into_the_parent() {
        let tree = VNode::element("ul").child(VNode::fragment(children![
            VNode::element("li"),
            VNode::fragment(children![VNode::element("li"), VNode::element("li")]),
        ]));

        let mut instances = Instances::default();
        let resolved = resolve(&mut instances, &RenderContext::new(), &tree);
        assert_eq!(resolved[0].children.len(), 3);
    }

    #[test]
    fn each_occurrence_owns_its_state() {
        let item = Component::new("Item", |cx, _| {
            let counter = cx.use_ref(0);
            *counter.borrow_mut() += 1;
            VNode::text(counter.get().to_string())
        });
        let tree = VNode::element("div").children([
            VNode::component(&item, Props::new()),
            VNode::component(&item, Props::new()),
        ]);

        let mut instances = Instances::default();
        let render = RenderContext::new();
        resolve(&mut instances, &render, &tree);
        let resolved = resolve(&mut instances, &render, &tree);

        let texts: Vec<_> = resolved[0].children.iter().map(VNode::text_value).collect();
        assert_eq!(texts, vec!["2", "2"]);
        assert_eq!(instances.len(), 2);
    }

    #[test]
    fn keyed_instances_follow_their_key() {
        let item = Component::new("Item", |cx, props| {
            let (label, _) = cx.use_state(props.get_str("label").unwrap_or_default().to_string());
            VNode::element("li").child(label)
        });
        let list = |labels: &[&str]| {
            VNode::element("ul").children(labels.iter().map(|label| {
                VNode::component(&item, Props::new().with("label", *label)).with_key(*label)
            }))
        };

        let mut instances = Instances::default();
        let render = RenderContext::new();
        resolve(&mut instances, &render, &list(&["a", "b"]));
        let resolved = resolve(&mut instances, &render, &list(&["b", "a"]));

        let items = &resolved[0].children;
        assert_eq!(items[0].children[0].text_value(), "b");
        assert_eq!(items[0].key().map(|k| k.to_string()), Some("b".into()));
        assert_eq!(items[1].children[0].text_value(), "a");
    }

    #[test]
    fn unreached_instances_are_disposed() {
        let unmounted = Rc::new(Cell::new(0));
        let counter = unmounted.clone();
        let child = Component::new("Child", move |cx, _| {
            let counter = counter.clone();
            cx.use_mount(move || move || counter.set(counter.get() + 1));
            VNode::element("span")
        });

        let mut instances = Instances::default();
        let render = RenderContext::new();
        resolve(&mut instances, &render, &VNode::component(&child, Props::new()));
        for effect in render.take_effects() {
            effect.run();
        }

        resolve(&mut instances, &render, &VNode::element("div"));
        assert_eq!(unmounted.get(), 1);
        assert_eq!(instances.len(), 0);
    }

    #[test]
    fn providers_scope_context_to_their_subtree() {
        let theme = create_context("light");
        let reader = Component::new("Reader", {
            let theme = theme.clone();
            move |cx, _| VNode::text(cx.use_context(&theme))
        });
        let read = || VNode::component(&reader, Props::new());

        let tree = VNode::fragment(children![
            read(),
            theme.provider(
                "dark",
                children![read(), theme.provider("blue", children![read()]), read()],
            ),
            read(),
        ]);

        let mut instances = Instances::default();
        let resolved = resolve(&mut instances, &RenderContext::new(), &tree);
        let texts: Vec<_> = resolved.iter().map(VNode::text_value).collect();
        assert_eq!(texts, vec!["light", "dark", "blue", "dark", "light"]);
    }

    #[test]
    fn generic_provider_nodes_supply_plain_values() {
        let theme = create_context("light".to_string());
        let reader = Component::new("Reader", {
            let theme = theme.clone();
            move |cx, _| VNode::text(cx.use_context(&theme))
        });

        let tree = create_element(
            Kind::Provider(theme.id()),
            props! { "value" => "dark" },
            children![VNode::component(&reader, Props::new())],
        );

        let mut instances = Instances::default();
        let resolved = resolve(&mut instances, &RenderContext::new(), &tree);
        assert_eq!(resolved[0].text_value(), "dark");
    }

    #[test]
    fn malformed_nodes_fail_resolution() {
        let mut text = VNode::text("x");
        text.children.push(VNode::text("y"));
        let tree = VNode::element("div").child(text);

        let mut instances = Instances::default();
        let render = RenderContext::new();
        let err = Resolver::new(&mut instances, &render)
            .resolve_root(&tree)
            .unwrap_err();
        assert_eq!(err, ElementError::TextWithChildren { count: 1 });
    }
}
