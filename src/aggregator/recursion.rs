//! Recursion-free variant of a call tree.

use log::debug;

use super::tree::{CallTree, NodeId};

/// Fold every self-recursive chain into its outermost occurrence.
///
/// Works on a deep copy; the input tree is left untouched. A node whose name
/// matches one of its strict ancestors is removed: its exclusive time is
/// taken back out of the intermediate levels, its children move up to the
/// matching ancestor, and its calls are recorded there as removed calls.
pub fn collapse_recursion(tree: &CallTree) -> CallTree {
    let mut collapsed = tree.deep_copy();
    let root = collapsed.root_id();
    let mut folded = 0usize;

    for id in collapsed.postorder() {
        if id == root {
            continue;
        }
        let name = collapsed.node(id).name.clone();
        let mut between = Vec::new();
        let mut target = None;
        for ancestor in collapsed.ancestors(id) {
            if ancestor == root {
                break;
            }
            if collapsed.node(ancestor).name == name {
                target = Some(ancestor);
                break;
            }
            between.push(ancestor);
        }
        let Some(target) = target else {
            continue;
        };

        let exclusive = collapsed.exclusive_ns(id);
        for ancestor in between {
            let node = collapsed.node_mut(ancestor);
            node.realtime_ns = node.realtime_ns.saturating_sub(exclusive);
        }
        fold_into(&mut collapsed, id, target);
        folded += 1;
    }

    if folded > 0 {
        renumber_levels(&mut collapsed);
        // Lifting children can expose new same-named siblings; their counts
        // are already accumulated, so this merge is the lenient one.
        collapsed.merge_siblings();
        debug!("Collapsed {} recursive nodes", folded);
    }
    collapsed
}

fn fold_into(tree: &mut CallTree, id: NodeId, target: NodeId) {
    let node = tree.node(id).clone();
    if let Some(parent) = node.parent {
        tree.node_mut(parent).children.retain(|&c| c != id);
    }
    for &child in &node.children {
        tree.node_mut(child).parent = Some(target);
    }
    let ancestor = tree.node_mut(target);
    ancestor.children.extend(node.children.iter().copied());
    ancestor.count += node.count;
    ancestor.removed_calls += node.count;
    ancestor.recursions += 1 + node.recursions;

    let detached = tree.node_mut(id);
    detached.parent = None;
    detached.children.clear();
}

fn renumber_levels(tree: &mut CallTree) {
    for id in tree.preorder() {
        let level = match tree.node(id).parent {
            Some(parent) => tree.node(parent).stack_level + 1,
            None => continue,
        };
        tree.node_mut(id).stack_level = level;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::Event;
    use pretty_assertions::assert_eq;

    fn ev(name: &'static str, level: i32, start: u64, stop: u64) -> Event {
        Event::new(name, level, start, stop)
    }

    /// (name, level, realtime, count, recursions) in preorder
    fn shape(tree: &CallTree) -> Vec<(String, i32, u64, u64, u32)> {
        tree.preorder()
            .into_iter()
            .map(|id| {
                let n = tree.node(id);
                (n.name.to_string(), n.stack_level, n.realtime_ns, n.count, n.recursions)
            })
            .collect()
    }

    #[test]
    fn test_direct_recursion_collapses() {
        let mut events = Vec::new();
        for i in 0..3u64 {
            let base = i * 1000;
            events.push(ev("F", 0, base, base + 900).with_frame(true));
            events.push(ev("P", 1, base + 10, base + 800));
            events.push(ev("R", 2, base + 20, base + 700));
            events.push(ev("R", 3, base + 30, base + 500));
            events.push(ev("R", 4, base + 40, base + 200));
        }
        let full = CallTree::build(&events).unwrap();
        let collapsed = collapse_recursion(&full);

        let f = collapsed.frame_node().unwrap();
        let p = collapsed.node(f).children[0];
        assert_eq!(collapsed.node(p).children.len(), 1);
        let r = collapsed.node(p).children[0];
        let r_node = collapsed.node(r);
        assert_eq!(r_node.name, "R");
        assert_eq!(r_node.stack_level, 2);
        assert_eq!(r_node.recursions, 2);
        assert_eq!(r_node.count, 9);
        assert_eq!(r_node.removed_calls, 6);
        assert_eq!(r_node.own_calls(), 3);
        assert!(r_node.children.is_empty());
        // Outermost R keeps its inclusive span
        assert_eq!(r_node.realtime_ns, 3 * 680);

        // The full tree is unchanged
        assert_eq!(full.max_stack_level(), 4);
    }

    #[test]
    fn test_indirect_recursion_trims_intermediate() {
        // A -> B -> A(leaf): B loses the inner A's exclusive time
        let events = vec![
            ev("A", 0, 0, 100),
            ev("B", 1, 10, 90),
            ev("A", 2, 20, 50),
            ev("C", 2, 60, 80),
        ];
        let full = CallTree::build(&events).unwrap();
        let collapsed = collapse_recursion(&full);

        assert_eq!(
            shape(&collapsed),
            vec![
                ("<root>".to_string(), -1, 100, 1, 0),
                ("A".to_string(), 0, 100, 2, 1),
                ("B".to_string(), 1, 50, 1, 0),
                ("C".to_string(), 2, 20, 1, 0),
            ]
        );
    }

    #[test]
    fn test_lifted_children_merge_with_existing() {
        // A -> X, A -> A -> X: the inner X joins the outer one
        let events = vec![
            ev("A", 0, 0, 100),
            ev("X", 1, 5, 15),
            ev("A", 1, 20, 90),
            ev("X", 2, 30, 40),
        ];
        let collapsed = collapse_recursion(&CallTree::build(&events).unwrap());
        let a = collapsed.root().children[0];
        assert_eq!(collapsed.node(a).children.len(), 1);
        let x = collapsed.node(collapsed.node(a).children[0]);
        assert_eq!(x.count, 2);
        assert_eq!(x.realtime_ns, 20);
        assert_eq!(x.stack_level, 1);
    }

    #[test]
    fn test_recursion_free_tree_is_unchanged() {
        let events = vec![
            ev("main", 0, 0, 100),
            ev("load", 1, 10, 40),
            ev("parse", 2, 12, 30),
            ev("run", 1, 50, 90),
        ];
        let full = CallTree::build(&events).unwrap();
        let collapsed = collapse_recursion(&full);
        assert_eq!(shape(&collapsed), shape(&full));
    }
}
