//! Tri-state propagation: down to descendants, aggregated up to ancestors

use std::collections::HashMap;

use log::debug;

use super::TreeState;
use crate::model::NodeId;
use crate::model::OpCode;
use crate::model::OperationState;

/// Sets an operation on a node and cascades the change. Returns `false`
/// (silent no-op) when the node is unknown or the code is not available
/// on it. The whole cascade completes before this returns; no partially
/// propagated state is ever observable.
pub(crate) fn set_operation(
    state: &mut TreeState,
    id: &NodeId,
    code: &OpCode,
    value: OperationState,
) -> bool {
    let Some(node) = state.node_mut(id) else {
        return false;
    };
    if !node.is_operation_available(code) {
        return false;
    }
    debug!("set operation {code} on `{id}` to {value:?}");
    node.operation_state.insert(code.clone(), value);
    node.mixed_operations.remove(code);

    propagate_down(state, id, code, value);
    propagate_up(state, id, code);
    true
}

/// Advances an operation through the rotation
/// Unselected → Allowed → Denied → Unselected. Silent no-op when the
/// code is unavailable on the node.
pub(crate) fn toggle_operation(state: &mut TreeState, id: &NodeId, code: &OpCode) -> bool {
    let Some(node) = state.node(id) else {
        return false;
    };
    if !node.is_operation_available(code) {
        return false;
    }
    let next = node.operation_state(code).next();
    set_operation(state, id, code, next)
}

/// Bulk-assigns states on one node without downward propagation (initial
/// data import). Keys outside the node's available set are dropped;
/// ancestor aggregates are re-derived for every applied code.
pub(crate) fn set_initial_states(
    state: &mut TreeState,
    id: &NodeId,
    states: HashMap<OpCode, OperationState>,
) -> bool {
    let Some(node) = state.node_mut(id) else {
        return false;
    };
    let mut applied = Vec::new();
    for (code, value) in states {
        if node.is_operation_available(&code) {
            node.operation_state.insert(code.clone(), value);
            node.mixed_operations.remove(&code);
            applied.push(code);
        }
    }
    for code in &applied {
        propagate_up(state, id, code);
    }
    !applied.is_empty()
}

/// Visits every descendant; descendants holding the code take the new
/// value, the rest are skipped but their own subtrees are still visited
/// (an intermediate node lacking the code never blocks the cascade).
fn propagate_down(state: &mut TreeState, id: &NodeId, code: &OpCode, value: OperationState) {
    for descendant_id in state.preorder_ids(id) {
        if descendant_id == *id {
            continue;
        }
        if let Some(descendant) = state.node_mut(&descendant_id) {
            if descendant.is_operation_available(code) {
                descendant.operation_state.insert(code.clone(), value);
                descendant.mixed_operations.remove(code);
            }
        }
    }
}

/// Climbs from the node's parent to the root, re-deriving each ancestor's
/// aggregate from its *current* children: all relevant children equal →
/// that value, disagreement → mixed flag. An ancestor with no child
/// holding the code stops the climb.
fn propagate_up(state: &mut TreeState, id: &NodeId, code: &OpCode) {
    let mut current = state.node(id).and_then(|n| n.parent.clone());
    while let Some(parent_id) = current {
        let Some(parent) = state.node(&parent_id) else {
            return;
        };
        let child_states: Vec<OperationState> = parent
            .children
            .iter()
            .filter_map(|child_id| state.node(child_id))
            .filter(|child| child.is_operation_available(code))
            .map(|child| child.operation_state(code))
            .collect();
        if child_states.is_empty() {
            return;
        }

        let first = child_states[0];
        let agreed = child_states.iter().all(|s| *s == first);
        let next = state.node(&parent_id).and_then(|n| n.parent.clone());
        if let Some(parent) = state.node_mut(&parent_id) {
            if agreed {
                // The aggregate value is only recorded on ancestors that
                // hold the code themselves; the climb continues either way.
                if parent.is_operation_available(code) {
                    parent.operation_state.insert(code.clone(), first);
                }
                parent.mixed_operations.remove(code);
            } else {
                parent.mixed_operations.insert(code.clone());
            }
        }
        current = next;
    }
}

/// Re-derives every node's mixed flags from its immediate children.
/// Used after deserialization and catalog changes; stored mixed data is
/// never trusted.
pub(crate) fn recompute_mixed(state: &mut TreeState) {
    let codes: Vec<OpCode> = state.catalog.codes().cloned().collect();
    for id in state.all_ids() {
        for code in &codes {
            let Some(node) = state.node(&id) else {
                continue;
            };
            let child_states: Vec<OperationState> = node
                .children
                .iter()
                .filter_map(|child_id| state.node(child_id))
                .filter(|child| child.is_operation_available(code))
                .map(|child| child.operation_state(code))
                .collect();
            let mixed = child_states
                .first()
                .is_some_and(|first| child_states.iter().any(|s| s != first));
            if let Some(node) = state.node_mut(&id) {
                if mixed {
                    node.mixed_operations.insert(code.clone());
                } else {
                    node.mixed_operations.remove(code);
                }
            }
        }
    }
}

/// Purges a removed catalog code from every node tree-wide.
pub(crate) fn purge_operation(state: &mut TreeState, code: &OpCode) {
    for id in state.all_ids() {
        if let Some(node) = state.node_mut(&id) {
            node.available_operations.retain(|c| c != code);
            node.operation_state.remove(code);
            node.mixed_operations.remove(code);
        }
    }
}
