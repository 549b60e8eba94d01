//! Removal of the instrumentation's own cost from tree timings.

use log::debug;

use super::tree::CallTree;
use crate::capture::Calibration;

/// Subtract calibrated overhead from every node, bottom-up.
///
/// Each node loses the self overhead of all calls folded into it plus the
/// overhead its child invocations added, but never drops below the sum of its
/// (already mitigated) children. Nodes already mitigated are skipped. The
/// root is redefined as the sum of its children.
pub fn mitigate(tree: &mut CallTree, calibration: &Calibration) {
    if !calibration.is_calibrated() {
        debug!("No calibration available, skipping overhead mitigation");
        return;
    }

    let root = tree.root_id();
    let mut adjusted = 0usize;
    for id in tree.postorder() {
        if id == root || tree.node(id).mitigated {
            continue;
        }
        let deduction = calibration.self_overhead(tree.node(id).count)
            + calibration.children_overhead(tree.children_calls(id));
        let floor = tree.children_realtime_ns(id);

        let node = tree.node_mut(id);
        node.realtime_ns = node.realtime_ns.saturating_sub(deduction).max(floor);
        node.mitigated = true;
        adjusted += 1;
    }
    tree.update_root_totals();
    debug!("Mitigated overhead on {} nodes", adjusted);
}
