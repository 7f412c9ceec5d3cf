//! Diffing resolved trees against the mounted tree.

use arbor_core::{ElementError, Key, Kind, VNode};
use rustc_hash::{FxHashMap, FxHashSet};

use super::mount::{mount, release};
use super::props::{patch_props, update_ref};
use super::Mounted;
use crate::host::HostAdapter;

type Result<T> = std::result::Result<T, ElementError>;

/// Synchronize the children of `parent` with `new`.
///
/// Fully keyed lists with unique keys are matched by key when `keyed` is
/// set; everything else is matched by position.
pub(crate) fn reconcile_children<H: HostAdapter>(
    host: &mut H,
    parent: &H::Node,
    old: Vec<Mounted<H::Node>>,
    new: Vec<VNode>,
    keyed: bool,
) -> Result<Vec<Mounted<H::Node>>> {
    if keyed && !old.is_empty() && !new.is_empty() {
        match (
            sibling_keys(old.iter().map(Mounted::key)),
            sibling_keys(new.iter().map(VNode::key)),
        ) {
            (SiblingKeys::Unique(old_keys), SiblingKeys::Unique(new_keys)) => {
                return reconcile_keyed(host, parent, old, &old_keys, new, &new_keys, keyed);
            }
            (SiblingKeys::Duplicate(key), _) | (_, SiblingKeys::Duplicate(key)) => {
                tracing::warn!(?parent, %key, "duplicate sibling key, diffing by position");
            }
            _ => {}
        }
    }
    reconcile_positional(host, parent, old, new, keyed)
}

/// Reconcile one node in place. The result is bound to the host node now
/// at that position.
pub(crate) fn reconcile_node<H: HostAdapter>(
    host: &mut H,
    parent: &H::Node,
    old: Mounted<H::Node>,
    new: VNode,
    keyed: bool,
) -> Result<Mounted<H::Node>> {
    if old.kind != new.kind {
        let mounted = mount(host, new)?;
        tracing::trace!(from = old.kind.name(), to = mounted.kind.name(), "replacing node");
        host.replace_child(parent, &old.node, &mounted.node);
        release(&old);
        return Ok(mounted);
    }

    let old_text = old.text_value();
    let new_text = new.text_value();
    let Mounted {
        props: old_props,
        node,
        children: old_children,
        ..
    } = old;
    let VNode {
        kind,
        props,
        children,
    } = new;

    let children = match kind {
        Kind::Text => {
            if old_text != new_text {
                tracing::trace!(?node, "text updated");
                host.set_text(&node, &new_text);
            }
            Vec::new()
        }
        _ => {
            patch_props(host, &node, &old_props, &props);
            reconcile_children(host, &node, old_children, children, keyed)?
        }
    };
    update_ref(Some(&old_props), &props, &node);

    Ok(Mounted {
        kind,
        props,
        node,
        children,
    })
}

fn reconcile_positional<H: HostAdapter>(
    host: &mut H,
    parent: &H::Node,
    old: Vec<Mounted<H::Node>>,
    new: Vec<VNode>,
    keyed: bool,
) -> Result<Vec<Mounted<H::Node>>> {
    let mut result = Vec::with_capacity(new.len());
    let mut old = old.into_iter();
    let mut new = new.into_iter();

    loop {
        match (old.next(), new.next()) {
            (None, None) => break,
            (None, Some(vnode)) => {
                let mounted = mount(host, vnode)?;
                host.append_child(parent, &mounted.node);
                result.push(mounted);
            }
            (Some(mounted), None) => {
                host.remove_child(parent, &mounted.node);
                release(&mounted);
            }
            (Some(mounted), Some(vnode)) => {
                result.push(reconcile_node(host, parent, mounted, vnode, keyed)?);
            }
        }
    }
    Ok(result)
}

fn reconcile_keyed<H: HostAdapter>(
    host: &mut H,
    parent: &H::Node,
    old: Vec<Mounted<H::Node>>,
    old_keys: &[Key],
    new: Vec<VNode>,
    new_keys: &[Key],
    keyed: bool,
) -> Result<Vec<Mounted<H::Node>>> {
    let old_index: FxHashMap<&Key, usize> =
        old_keys.iter().enumerate().map(|(i, key)| (key, i)).collect();
    let sources: Vec<Option<usize>> = new_keys
        .iter()
        .map(|key| old_index.get(key).copied())
        .collect();
    let reused: FxHashSet<usize> = sources.iter().flatten().copied().collect();

    let mut old: Vec<Option<Mounted<H::Node>>> = old.into_iter().map(Some).collect();
    for (index, slot) in old.iter_mut().enumerate() {
        if reused.contains(&index) {
            continue;
        }
        if let Some(mounted) = slot.take() {
            host.remove_child(parent, &mounted.node);
            release(&mounted);
        }
    }

    // Update survivors where they stand; new keys are built detached.
    let mut result = Vec::with_capacity(new.len());
    for (vnode, source) in new.into_iter().zip(&sources) {
        let previous = source.and_then(|index| old.get_mut(index)).and_then(Option::take);
        let mounted = match previous {
            Some(previous) => reconcile_node(host, parent, previous, vnode, keyed)?,
            None => mount(host, vnode)?,
        };
        result.push(mounted);
    }

    // Survivors whose old positions increase along the longest run stay put.
    let matched: Vec<(usize, usize)> = sources
        .iter()
        .enumerate()
        .filter_map(|(new_index, source)| source.map(|old_index| (new_index, old_index)))
        .collect();
    let old_positions: Vec<usize> = matched.iter().map(|&(_, old_index)| old_index).collect();
    let stable: FxHashSet<usize> = longest_increasing_subsequence(&old_positions)
        .into_iter()
        .map(|i| matched[i].0)
        .collect();

    let mut anchor: Option<H::Node> = None;
    let mut moves = 0;
    for (index, mounted) in result.iter().enumerate().rev() {
        if !stable.contains(&index) {
            host.insert_before(parent, &mounted.node, anchor.as_ref());
            moves += 1;
        }
        anchor = Some(mounted.node.clone());
    }
    tracing::trace!(?parent, moves, "keyed children reconciled");

    Ok(result)
}

enum SiblingKeys {
    Unique(Vec<Key>),
    Duplicate(Key),
    Missing,
}

fn sibling_keys(keys: impl Iterator<Item = Option<Key>>) -> SiblingKeys {
    let mut seen = FxHashSet::default();
    let mut ordered = Vec::new();
    for key in keys {
        let Some(key) = key else {
            return SiblingKeys::Missing;
        };
        if !seen.insert(key.clone()) {
            return SiblingKeys::Duplicate(key);
        }
        ordered.push(key);
    }
    SiblingKeys::Unique(ordered)
}

/// Positions (into `seq`) of one longest strictly increasing subsequence.
fn longest_increasing_subsequence(seq: &[usize]) -> Vec<usize> {
    // tails[k]: position of the smallest tail of an increasing run of length k + 1
    let mut tails: Vec<usize> = Vec::new();
    let mut previous: Vec<Option<usize>> = vec![None; seq.len()];

    for (i, &value) in seq.iter().enumerate() {
        let k = tails.partition_point(|&t| seq[t] < value);
        if k > 0 {
            previous[i] = Some(tails[k - 1]);
        }
        if k == tails.len() {
            tails.push(i);
        } else {
            tails[k] = i;
        }
    }

    let mut run = Vec::with_capacity(tails.len());
    let mut cursor = tails.last().copied();
    while let Some(i) = cursor {
        run.push(i);
        cursor = previous[i];
    }
    run.reverse();
    run
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::{MemoryHost, Mutation, NodeId};
    use arbor_core::{Handler, NodeRef, RefTarget};
    use std::any::Any;
    use std::cell::RefCell;
    use std::rc::Rc;

    struct Fixture {
        host: MemoryHost,
        root: NodeId,
        tree: Vec<Mounted<NodeId>>,
    }

    impl Fixture {
        fn new(children: Vec<VNode>) -> Self {
            let mut host = MemoryHost::new();
            let root = host.create_container("div");
            let tree = reconcile_children(&mut host, &root, Vec::new(), children, true)
                .expect("mount");
            host.clear_journal();
            Self { host, root, tree }
        }

        fn update(&mut self, children: Vec<VNode>) {
            self.update_with(children, true);
        }

        fn update_with(&mut self, children: Vec<VNode>, keyed: bool) {
            let old = std::mem::take(&mut self.tree);
            self.tree = reconcile_children(&mut self.host, &self.root, old, children, keyed)
                .expect("reconcile");
        }

        fn nodes(&self) -> Vec<NodeId> {
            self.host.children(self.root).to_vec()
        }

        fn html(&self) -> String {
            self.host.inner_html(self.root)
        }
    }

    fn items(keys: &[&str]) -> Vec<VNode> {
        keys.iter()
            .map(|key| VNode::element("li").with_key(*key).child(*key))
            .collect()
    }

    fn plain(texts: &[&str]) -> Vec<VNode> {
        texts.iter().map(|text| VNode::element("li").child(*text)).collect()
    }

    #[test]
    fn identical_tree_makes_no_calls() {
        let handler = Handler::from_fn(|| {});
        let tree = vec![
            VNode::element("p")
                .prop("className", "intro")
                .prop("onClick", handler)
                .child("hello"),
            VNode::text("tail"),
        ];
        let mut fixture = Fixture::new(tree.clone());

        fixture.update(tree);
        assert!(fixture.host.journal().is_empty());
    }

    #[test]
    fn text_is_updated_in_place() {
        let mut fixture = Fixture::new(vec![VNode::text("a")]);
        let before = fixture.nodes();

        fixture.update(vec![VNode::text("b")]);

        assert_eq!(fixture.nodes(), before);
        assert_eq!(
            fixture.host.take_journal(),
            vec![Mutation::SetText { node: before[0], value: "b".into() }]
        );
    }

    #[test]
    fn kind_change_replaces_the_node() {
        let mut fixture = Fixture::new(vec![VNode::element("p").child("x")]);
        let before = fixture.nodes();

        fixture.update(vec![VNode::element("span").child("x")]);

        let after = fixture.nodes();
        assert_ne!(after[0], before[0]);
        assert_eq!(fixture.html(), "<span>x</span>");
        assert!(fixture
            .host
            .journal()
            .iter()
            .any(|m| matches!(m, Mutation::ReplaceChild { old, .. } if *old == before[0])));
    }

    #[test]
    fn tail_insertions_and_removals_by_position() {
        let mut fixture = Fixture::new(plain(&["a", "b"]));
        fixture.update(plain(&["a", "b", "c"]));
        assert_eq!(fixture.html(), "<li>a</li><li>b</li><li>c</li>");

        fixture.update(plain(&["a"]));
        assert_eq!(fixture.html(), "<li>a</li>");
        assert_eq!(fixture.nodes().len(), 1);
    }

    #[test]
    fn unkeyed_mid_list_removal_drifts_content() {
        let mut fixture = Fixture::new(plain(&["a", "b", "c"]));
        let before = fixture.nodes();

        fixture.update(plain(&["a", "c"]));

        // The node that showed "b" now shows "c"; the last node is removed.
        assert_eq!(fixture.nodes(), &before[..2]);
        assert_eq!(fixture.html(), "<li>a</li><li>c</li>");
    }

    #[test]
    fn keyed_reorder_preserves_identity() {
        let mut fixture = Fixture::new(items(&["a", "b"]));
        let before = fixture.nodes();

        fixture.update(items(&["b", "a"]));

        assert_eq!(fixture.nodes(), vec![before[1], before[0]]);
        assert_eq!(fixture.html(), "<li>b</li><li>a</li>");
        assert!(!fixture.host.journal().iter().any(Mutation::is_creation));
    }

    #[test]
    fn keyed_removal_removes_only_that_node() {
        let mut fixture = Fixture::new(items(&["a", "b", "c"]));
        let before = fixture.nodes();

        fixture.update(items(&["a", "c"]));

        assert_eq!(fixture.nodes(), vec![before[0], before[2]]);
        assert_eq!(
            fixture.host.take_journal(),
            vec![Mutation::RemoveChild { parent: fixture.root, child: before[1] }]
        );
    }

    #[test]
    fn keyed_moves_are_minimal() {
        let mut fixture = Fixture::new(items(&["a", "b", "c", "d", "e"]));
        let before = fixture.nodes();

        fixture.update(items(&["e", "a", "b", "c", "d"]));

        let moves: Vec<_> = fixture
            .host
            .take_journal()
            .into_iter()
            .filter(|m| matches!(m, Mutation::InsertBefore { .. } | Mutation::AppendChild { .. }))
            .collect();
        assert_eq!(
            moves,
            vec![Mutation::InsertBefore {
                parent: fixture.root,
                child: before[4],
                reference: Some(before[0]),
            }]
        );
        assert_eq!(fixture.html(), "<li>e</li><li>a</li><li>b</li><li>c</li><li>d</li>");
    }

    #[test]
    fn keyed_insertions_land_in_order() {
        let mut fixture = Fixture::new(items(&["b", "d"]));
        let before = fixture.nodes();

        fixture.update(items(&["a", "b", "c", "d", "e"]));

        let after = fixture.nodes();
        assert_eq!(after.len(), 5);
        assert_eq!(after[1], before[0]);
        assert_eq!(after[3], before[1]);
        assert_eq!(
            fixture.html(),
            "<li>a</li><li>b</li><li>c</li><li>d</li><li>e</li>"
        );
    }

    #[test]
    fn keyed_children_are_patched_in_place() {
        let mut fixture = Fixture::new(vec![
            VNode::element("li").with_key("a").prop("className", "old"),
        ]);
        let before = fixture.nodes();

        fixture.update(vec![
            VNode::element("li").with_key("a").prop("className", "new"),
        ]);

        assert_eq!(fixture.nodes(), before);
        assert_eq!(fixture.html(), r#"<li class="new"></li>"#);
    }

    #[test]
    fn mixed_keys_fall_back_to_position() {
        let mut fixture = Fixture::new(vec![
            VNode::element("li").with_key("a").child("a"),
            VNode::element("li").child("b"),
        ]);
        let before = fixture.nodes();

        fixture.update(vec![
            VNode::element("li").child("b"),
            VNode::element("li").with_key("a").child("a"),
        ]);

        assert_eq!(fixture.nodes(), before);
        assert_eq!(fixture.html(), "<li>b</li><li>a</li>");
    }

    #[test]
    fn duplicate_keys_fall_back_to_position() {
        let mut fixture = Fixture::new(items(&["a", "b"]));
        let before = fixture.nodes();

        fixture.update(items(&["b", "b"]));

        assert_eq!(fixture.nodes(), before);
        assert_eq!(fixture.html(), "<li>b</li><li>b</li>");
    }

    #[test]
    fn keyed_diffing_can_be_disabled() {
        let mut fixture = Fixture::new(items(&["a", "b"]));
        let before = fixture.nodes();

        fixture.update_with(items(&["b", "a"]), false);

        assert_eq!(fixture.nodes(), before);
        assert_eq!(fixture.html(), "<li>b</li><li>a</li>");
    }

    struct Slot(RefCell<Option<NodeId>>);

    impl RefTarget for Slot {
        fn attach(&self, node: &dyn Any) {
            *self.0.borrow_mut() = node.downcast_ref::<NodeId>().copied();
        }

        fn detach(&self) {
            *self.0.borrow_mut() = None;
        }
    }

    #[test]
    fn refs_follow_mount_and_removal() {
        let slot = Rc::new(Slot(RefCell::new(None)));
        let node_ref = NodeRef::new(slot.clone());
        let mut fixture = Fixture::new(vec![VNode::element("input").prop("ref", node_ref)]);

        let mounted = fixture.nodes()[0];
        assert_eq!(*slot.0.borrow(), Some(mounted));
        assert_eq!(fixture.host.property(mounted, "ref"), None);

        fixture.update(Vec::new());
        assert_eq!(*slot.0.borrow(), None);
    }

    #[test]
    fn nested_children_are_reconciled() {
        let mut fixture = Fixture::new(vec![VNode::element("ul").children(items(&["a", "b"]))]);
        let list = fixture.nodes()[0];
        let before = fixture.host.children(list).to_vec();

        fixture.update(vec![VNode::element("ul").children(items(&["b", "a", "c"]))]);

        let after = fixture.host.children(list).to_vec();
        assert_eq!(&after[..2], &[before[1], before[0]]);
        assert_eq!(fixture.nodes(), vec![list]);
        assert_eq!(
            fixture.html(),
            "<ul><li>b</li><li>a</li><li>c</li></ul>"
        );
    }

    #[test]
    fn lis_picks_a_longest_run() {
        assert_eq!(longest_increasing_subsequence(&[]), Vec::<usize>::new());
        assert_eq!(longest_increasing_subsequence(&[0, 1, 2]), vec![0, 1, 2]);
        assert_eq!(longest_increasing_subsequence(&[4, 0, 1, 2, 3]), vec![1, 2, 3, 4]);
        assert_eq!(longest_increasing_subsequence(&[2, 0, 1]).len(), 2);
        assert_eq!(longest_increasing_subsequence(&[3, 2, 1]).len(), 1);
    }

    #[test]
    fn keys_are_detected() {
        assert!(matches!(
            sibling_keys(items(&["a", "b"]).iter().map(VNode::key)),
            SiblingKeys::Unique(keys) if keys.len() == 2
        ));
        assert!(matches!(
            sibling_keys(items(&["a", "a"]).iter().map(VNode::key)),
            SiblingKeys::Duplicate(_)
        ));
        assert!(matches!(
            sibling_keys(plain(&["a"]).iter().map(VNode::key)),
            SiblingKeys::Missing
        ));
    }
}
