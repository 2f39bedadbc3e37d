//! Name search: force-loads unloaded subtrees, projects visibility

use log::debug;

use super::TreeState;
use crate::model::LoadState;
use crate::model::NodeId;

/// Sets every node's visibility flag.
pub(crate) fn reset_visibility(state: &mut TreeState, visible: bool) {
    for id in state.all_ids() {
        if let Some(node) = state.node_mut(&id) {
            node.visible = visible;
        }
    }
}

/// Ids of every lazy folder that still needs loading before the search
/// can see into it. Folders currently `Loading` are covered by the
/// single-flight guard and are not re-requested.
pub(crate) fn unloaded_folders(state: &TreeState) -> Vec<NodeId> {
    state
        .all_ids()
        .into_iter()
        .filter(|id| {
            state
                .node(id)
                .is_some_and(|n| n.is_folder && n.lazy_load && n.load_state == LoadState::NotLoaded)
        })
        .collect()
}

/// Computes the visibility projection for a query over a fully-loaded
/// walk: a match reveals itself and its ancestor path (un-collapsing
/// ancestor folders); a matching folder additionally reveals its entire
/// loaded subtree and un-collapses itself. Case-insensitive substring
/// match on the name. Returns the number of matches.
pub(crate) fn apply_matches(state: &mut TreeState, query: &str) -> usize {
    let needle = query.to_lowercase();
    let matches: Vec<NodeId> = state
        .all_ids()
        .into_iter()
        .filter(|id| {
            state
                .node(id)
                .is_some_and(|n| n.name.to_lowercase().contains(&needle))
        })
        .collect();
    debug!("search `{query}` matched {} node(s)", matches.len());

    for id in &matches {
        mark_path_visible(state, id);
        let is_folder = state.node(id).is_some_and(|n| n.is_folder);
        if is_folder {
            if let Some(node) = state.node_mut(id) {
                node.collapsed = false;
            }
            // A matching folder reveals its full loaded contents.
            for descendant_id in state.preorder_ids(id) {
                if let Some(descendant) = state.node_mut(&descendant_id) {
                    descendant.visible = true;
                }
            }
        }
    }
    matches.len()
}

/// Marks a node and every ancestor visible, un-collapsing ancestor
/// folders so the match is reachable without further clicks.
fn mark_path_visible(state: &mut TreeState, id: &NodeId) {
    let mut current = Some(id.clone());
    while let Some(node_id) = current {
        let Some(node) = state.node_mut(&node_id) else {
            return;
        };
        node.visible = true;
        if node.is_folder && node_id != *id {
            node.collapsed = false;
        }
        current = node.parent.clone();
    }
}

/// Ends a search: restores visibility tree-wide and discards subtrees
/// that exist only because the search loaded them (reset to `NotLoaded`,
/// children dropped). Folders the user expanded in the meantime lost
/// their speculative mark and are retained.
pub(crate) fn clear_search(state: &mut TreeState) {
    state.search_active = false;
    let speculative: Vec<NodeId> = state
        .all_ids()
        .into_iter()
        .filter(|id| state.node(id).is_some_and(|n| n.search_loaded))
        .collect();
    for id in speculative {
        // A nested speculative folder may already be gone with its parent.
        if state.node(&id).is_none() {
            continue;
        }
        state.remove_descendants(&id);
        if let Some(node) = state.node_mut(&id) {
            node.load_state = LoadState::NotLoaded;
            node.search_loaded = false;
        }
    }
    reset_visibility(state, true);
}
