//! Call-tree reconstruction from a flat, level-tagged event stream.
//!
//! Nodes live in an arena and refer to each other by `NodeId`; the parent
//! link is a plain index, so re-parenting and splicing never invalidate
//! anything. Removed nodes stay in the arena detached from the tree.
//!
//! Example: events `F@0, A@1, F@0, A@1` build `<root> -> F -> A` once
//! sibling merging folds the second frame into the first (count 2 each).

use std::collections::HashMap;

use log::debug;

use crate::capture::{Event, Name};
use crate::utils::config::ROOT_NAME;
use crate::utils::error::{AnalysisError, ProtocolError, TreeError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub(crate) usize);

#[derive(Debug, Clone)]
pub struct Node {
    pub name: Name,
    pub stack_level: i32,
    pub frame: bool,
    pub process_clock: bool,
    /// Accumulated wallclock ns over all folded-in records
    pub realtime_ns: u64,
    pub cpu_ns: u64,
    pub parent: Option<NodeId>,
    pub children: Vec<NodeId>,
    /// Raw records folded into this node, including those folded in by
    /// recursion collapsing
    pub count: u64,
    /// The part of `count` that came from collapsed recursive calls
    pub removed_calls: u64,
    /// Levels of self-recursion folded into this node
    pub recursions: u32,
    pub mitigated: bool,
}

impl Node {
    fn root() -> Self {
        Self {
            name: Name::Static(ROOT_NAME),
            stack_level: -1,
            frame: false,
            process_clock: false,
            realtime_ns: 0,
            cpu_ns: 0,
            parent: None,
            children: Vec::new(),
            count: 1,
            removed_calls: 0,
            recursions: 0,
            mitigated: false,
        }
    }

    fn from_event(event: &Event, parent: NodeId) -> Self {
        Self {
            name: event.name.clone(),
            stack_level: event.stack_level,
            frame: event.frame,
            process_clock: event.process_clock,
            realtime_ns: event.duration_ns(),
            cpu_ns: event.cpu_ns,
            parent: Some(parent),
            children: Vec::new(),
            count: 1,
            removed_calls: 0,
            recursions: 0,
            mitigated: false,
        }
    }

    /// Calls made at this position in the tree itself
    pub fn own_calls(&self) -> u64 {
        self.count - self.removed_calls
    }

    /// Average inclusive wallclock ns per call
    pub fn realtime_avg_ns(&self) -> u64 {
        self.realtime_ns / self.count.max(1)
    }

    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }
}

#[derive(Debug, Clone)]
pub struct CallTree {
    nodes: Vec<Node>,
    root: NodeId,
}

impl CallTree {
    pub(crate) fn empty() -> Self {
        Self {
            nodes: vec![Node::root()],
            root: NodeId(0),
        }
    }

    /// Build a thread's call tree from its events in push order.
    ///
    /// Repeated siblings are merged (strict mode) and the root's frame flag
    /// is derived from its children. A frame-flagged root must have exactly
    /// one direct child.
    pub fn build(events: &[Event]) -> Result<Self, AnalysisError> {
        let mut tree = Self::empty();
        let mut stack = vec![tree.root];

        for (index, event) in events.iter().enumerate() {
            let broken = || TreeError::BrokenEventList {
                index,
                name: event.name.to_string(),
                stack_level: event.stack_level,
            };
            while let Some(&top) = stack.last() {
                if tree.nodes[top.0].stack_level < event.stack_level {
                    break;
                }
                stack.pop();
            }
            let parent = *stack.last().ok_or_else(broken)?;
            let parent_node = &tree.nodes[parent.0];
            if event.stack_level != parent_node.stack_level + 1 {
                return Err(broken().into());
            }
            if !parent_node.is_root() && event.process_clock && !parent_node.process_clock {
                return Err(TreeError::ClockKindChange {
                    parent: parent_node.name.to_string(),
                    name: event.name.to_string(),
                }
                .into());
            }
            let child = tree.add_node(Node::from_event(event, parent));
            stack.push(child);
        }

        tree.merge_siblings_strict()?;
        tree.update_root_totals();

        let root = tree.root();
        let frame_children = root.children.iter().filter(|&&c| tree.node(c).frame).count();
        if frame_children > 0 {
            if root.children.len() > 1 {
                return Err(ProtocolError::MultipleFrameEntryPoints {
                    count: root.children.len(),
                }
                .into());
            }
            tree.nodes[tree.root.0].frame = true;
        }

        debug!(
            "Built call tree: {} events, {} nodes",
            events.len(),
            tree.len()
        );
        Ok(tree)
    }

    pub(crate) fn add_node(&mut self, node: Node) -> NodeId {
        let id = NodeId(self.nodes.len());
        if let Some(parent) = node.parent {
            self.nodes[parent.0].children.push(id);
        }
        self.nodes.push(node);
        id
    }

    pub fn root_id(&self) -> NodeId {
        self.root
    }

    pub fn root(&self) -> &Node {
        &self.nodes[self.root.0]
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.0]
    }

    pub(crate) fn node_mut(&mut self, id: NodeId) -> &mut Node {
        &mut self.nodes[id.0]
    }

    pub fn children(&self, id: NodeId) -> impl Iterator<Item = &Node> + '_ {
        self.nodes[id.0].children.iter().map(move |&c| &self.nodes[c.0])
    }

    /// Sum of the direct children's realtime
    pub fn children_realtime_ns(&self, id: NodeId) -> u64 {
        self.children(id).map(|c| c.realtime_ns).sum()
    }

    /// Invocations completed by the direct children
    pub fn children_calls(&self, id: NodeId) -> u64 {
        self.children(id).map(|c| c.count).sum()
    }

    /// Realtime not attributed to any direct child
    pub fn exclusive_ns(&self, id: NodeId) -> u64 {
        self.node(id)
            .realtime_ns
            .saturating_sub(self.children_realtime_ns(id))
    }

    /// The single frame node under a frame-flagged root
    pub fn frame_node(&self) -> Option<NodeId> {
        let root = self.root();
        if root.frame {
            root.children.first().copied()
        } else {
            None
        }
    }

    /// Nodes reachable from the root
    pub fn len(&self) -> usize {
        self.preorder().len()
    }

    pub fn is_empty(&self) -> bool {
        self.root().children.is_empty()
    }

    pub fn preorder(&self) -> Vec<NodeId> {
        let mut order = Vec::new();
        let mut stack = vec![self.root];
        while let Some(id) = stack.pop() {
            order.push(id);
            stack.extend(self.nodes[id.0].children.iter().rev());
        }
        order
    }

    /// Children before parents
    pub fn postorder(&self) -> Vec<NodeId> {
        let mut order = Vec::new();
        let mut stack = vec![self.root];
        while let Some(id) = stack.pop() {
            order.push(id);
            stack.extend(self.nodes[id.0].children.iter());
        }
        order.reverse();
        order
    }

    /// Strict ancestors, nearest first
    pub fn ancestors(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        std::iter::successors(self.nodes[id.0].parent, move |p| self.nodes[p.0].parent)
    }

    pub fn max_stack_level(&self) -> i32 {
        self.preorder()
            .into_iter()
            .map(|id| self.node(id).stack_level)
            .max()
            .unwrap_or(-1)
    }

    /// The root performs no work of its own
    pub(crate) fn update_root_totals(&mut self) {
        let root = self.root;
        let realtime = self.children_realtime_ns(root);
        let cpu = self.children(root).map(|c| c.cpu_ns).sum();
        let node = self.node_mut(root);
        node.realtime_ns = realtime;
        node.cpu_ns = cpu;
    }

    /// Fold later same-named siblings into the first one, at every level.
    ///
    /// Counts, times and recursion totals of absorbed nodes are summed into
    /// the survivor, so nodes that already accumulated calls merge fine.
    pub fn merge_siblings(&mut self) {
        let mut pending = vec![self.root];
        while let Some(id) = pending.pop() {
            let (kept, folds) = self.plan_folds(id);
            self.apply_folds(id, kept, folds);
            pending.extend(self.nodes[id.0].children.iter().rev());
        }
    }

    /// `merge_siblings` for a freshly built tree: every absorbed node must
    /// still be a single raw record. The tree is not modified below the
    /// level where the check fails.
    pub fn merge_siblings_strict(&mut self) -> Result<(), TreeError> {
        let mut pending = vec![self.root];
        while let Some(id) = pending.pop() {
            let (kept, folds) = self.plan_folds(id);
            for &(_, absorbed) in &folds {
                let node = &self.nodes[absorbed.0];
                if node.count != 1 || node.recursions != 0 || node.removed_calls != 0 {
                    return Err(TreeError::MergeInvariant {
                        name: node.name.to_string(),
                    });
                }
            }
            self.apply_folds(id, kept, folds);
            pending.extend(self.nodes[id.0].children.iter().rev());
        }
        Ok(())
    }

    /// Children of `id` to keep, and (survivor, absorbed) pairs
    fn plan_folds(&self, id: NodeId) -> (Vec<NodeId>, Vec<(NodeId, NodeId)>) {
        let mut kept: Vec<NodeId> = Vec::new();
        let mut folds: Vec<(NodeId, NodeId)> = Vec::new();
        let mut by_name: HashMap<&str, NodeId> = HashMap::new();

        for &child in &self.nodes[id.0].children {
            let name = self.nodes[child.0].name.as_str();
            match by_name.get(name) {
                Some(&survivor) => folds.push((survivor, child)),
                None => {
                    by_name.insert(name, child);
                    kept.push(child);
                }
            }
        }
        (kept, folds)
    }

    fn apply_folds(&mut self, id: NodeId, kept: Vec<NodeId>, folds: Vec<(NodeId, NodeId)>) {
        if folds.is_empty() {
            return;
        }
        // Absorbed children may bring grandchildren; those are merged when
        // the survivor itself is visited.
        self.nodes[id.0].children = kept;
        for (survivor, absorbed) in folds {
            self.absorb(survivor, absorbed);
        }
    }

    fn absorb(&mut self, survivor: NodeId, absorbed: NodeId) {
        let node = std::mem::replace(&mut self.nodes[absorbed.0], Node::root());
        for &grandchild in &node.children {
            self.nodes[grandchild.0].parent = Some(survivor);
        }
        let target = &mut self.nodes[survivor.0];
        target.realtime_ns += node.realtime_ns;
        target.cpu_ns += node.cpu_ns;
        target.count += node.count;
        target.removed_calls += node.removed_calls;
        target.recursions += node.recursions;
        target.mitigated &= node.mitigated;
        target.children.extend(node.children);
    }

    /// Copy of the reachable tree with fresh, compact ids
    pub fn deep_copy(&self) -> CallTree {
        let mut copy = CallTree {
            nodes: Vec::with_capacity(self.nodes.len()),
            root: NodeId(0),
        };
        let mut root = self.root().clone();
        root.children.clear();
        copy.nodes.push(root);

        let mut pending: Vec<(NodeId, NodeId)> = self.nodes[self.root.0]
            .children
            .iter()
            .rev()
            .map(|&c| (c, copy.root))
            .collect();
        while let Some((source, parent)) = pending.pop() {
            let mut node = self.nodes[source.0].clone();
            node.parent = Some(parent);
            node.children.clear();
            let id = copy.add_node(node);
            pending.extend(self.nodes[source.0].children.iter().rev().map(|&c| (c, id)));
        }
        copy
    }
}
