//! Per-function statistics over a recursion-free call tree.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::tree::{CallTree, NodeId};
use crate::utils::error::StatsError;

/// Totals for one function name across every tree position it occupies
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionStat {
    pub name: String,
    /// Shallowest stack level the name was seen at; -1 is the whole thread
    pub min_stack_level: i32,
    pub realtime_ns: u64,
    pub cpu_ns: u64,
    pub children_realtime_ns: u64,
    pub count: u64,
    pub recursions: u32,
    pub process_clock: bool,
}

impl FunctionStat {
    pub fn exclusive_ns(&self) -> u64 {
        self.realtime_ns.saturating_sub(self.children_realtime_ns)
    }

    pub fn is_thread_total(&self) -> bool {
        self.min_stack_level < 0
    }

    /// Average inclusive time per call
    pub fn average_ns(&self) -> u64 {
        self.realtime_ns / self.count.max(1)
    }
}

/// Fail if any node repeats the name of one of its strict ancestors
pub fn check_recursion(tree: &CallTree) -> Result<(), StatsError> {
    for id in tree.preorder() {
        let name = &tree.node(id).name;
        if tree.ancestors(id).any(|a| tree.node(a).name == *name) {
            return Err(StatsError::RecursionDetected {
                name: name.to_string(),
            });
        }
    }
    Ok(())
}

/// Fold the tree into per-name buckets.
///
/// Sorted by exclusive time descending, ties by inclusive time ascending;
/// the whole-thread bucket always comes last.
pub fn collect_statistics(tree: &CallTree) -> Result<Vec<FunctionStat>, StatsError> {
    check_recursion(tree)?;

    let mut stats: Vec<FunctionStat> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();
    for id in tree.preorder() {
        fold_node(tree, id, &mut stats, &mut index);
    }

    stats.sort_by(|a, b| {
        a.is_thread_total()
            .cmp(&b.is_thread_total())
            .then_with(|| b.exclusive_ns().cmp(&a.exclusive_ns()))
            .then_with(|| a.realtime_ns.cmp(&b.realtime_ns))
    });
    Ok(stats)
}

fn fold_node(
    tree: &CallTree,
    id: NodeId,
    stats: &mut Vec<FunctionStat>,
    index: &mut HashMap<String, usize>,
) {
    let node = tree.node(id);
    let children_realtime_ns = tree.children_realtime_ns(id);
    match index.get(node.name.as_str()) {
        Some(&slot) => {
            let stat = &mut stats[slot];
            stat.min_stack_level = stat.min_stack_level.min(node.stack_level);
            stat.realtime_ns += node.realtime_ns;
            stat.cpu_ns += node.cpu_ns;
            stat.children_realtime_ns += children_realtime_ns;
            stat.count += node.count;
            stat.recursions += node.recursions;
            stat.process_clock |= node.process_clock;
        }
        None => {
            index.insert(node.name.to_string(), stats.len());
            stats.push(FunctionStat {
                name: node.name.to_string(),
                min_stack_level: node.stack_level,
                realtime_ns: node.realtime_ns,
                cpu_ns: node.cpu_ns,
                children_realtime_ns,
                count: node.count,
                recursions: node.recursions,
                process_clock: node.process_clock,
            });
        }
    }
}
