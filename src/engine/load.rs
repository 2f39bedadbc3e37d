//! Lazy-load lifecycle: single-flight fetches and view-intent toggles

use log::debug;
use log::warn;

use super::TreeState;
use crate::error::LoadError;
use crate::error::Result;
use crate::error::TreeError;
use crate::loader::NodeSnapshot;
use crate::loader::NodeSpec;
use crate::model::LoadState;
use crate::model::NodeId;

/// Identity of one in-flight fetch. A completion is applied only if the
/// tree generation, the node, and its load epoch still match; anything
/// else is a stale completion and is discarded.
#[derive(Debug, Clone)]
pub(crate) struct LoadTicket {
    pub node: NodeId,
    pub epoch: u64,
    pub generation: u64,
    pub snapshot: NodeSnapshot,
}

/// Synchronous half of an `expand` call.
pub(crate) enum ExpandAction {
    /// Nothing to do (non-folder, or a fetch already in flight).
    Ignore,
    /// The folder was already loaded; only the view intent flipped.
    Expanded,
    /// A fetch must be issued for this ticket.
    Fetch(LoadTicket),
}

/// Decides what an expand request means for the node's current state.
/// `Loaded` flips the view intent only (loading is one-shot per epoch);
/// `Loading` is the single-flight guard and ignores the request;
/// `NotLoaded` starts a fetch.
pub(crate) fn begin_expand(state: &mut TreeState, id: &NodeId) -> ExpandAction {
    let Some(node) = state.node_mut(id) else {
        return ExpandAction::Ignore;
    };
    if !node.is_folder {
        return ExpandAction::Ignore;
    }
    match node.load_state {
        LoadState::Loaded => {
            node.collapsed = false;
            // A user expand sanctions data a search loaded speculatively.
            node.search_loaded = false;
            ExpandAction::Expanded
        }
        LoadState::Loading { .. } => ExpandAction::Ignore,
        LoadState::NotLoaded => match begin_fetch(state, id) {
            Some(ticket) => ExpandAction::Fetch(ticket),
            None => ExpandAction::Ignore,
        },
    }
}

/// Moves a `NotLoaded` folder into `Loading`, clears any stale children
/// and returns the fetch ticket. Returns `None` for anything not
/// currently fetchable.
pub(crate) fn begin_fetch(state: &mut TreeState, id: &NodeId) -> Option<LoadTicket> {
    let fetchable = state
        .node(id)
        .is_some_and(|n| n.is_folder && n.load_state == LoadState::NotLoaded);
    if !fetchable {
        return None;
    }
    state.remove_descendants(id);
    let epoch = state.alloc_epoch();
    let generation = state.generation;
    let node = state.node_mut(id)?;
    node.load_state = LoadState::Loading { epoch };
    debug!("fetch started for `{id}` (epoch {epoch})");
    Some(LoadTicket {
        node: id.clone(),
        epoch,
        generation,
        snapshot: NodeSnapshot {
            id: node.id.clone(),
            name: node.name.clone(),
            level: node.level,
        },
    })
}

/// Applies a fetch completion. Returns `Ok(false)` when the completion is
/// stale (tree replaced, node gone, or a different epoch took over);
/// stale results are discarded without touching the tree. On success the
/// returned specs are validated as a batch and attached; on failure the
/// node reverts to `NotLoaded` so a later expand can retry.
pub(crate) fn finish_load(
    state: &mut TreeState,
    ticket: &LoadTicket,
    result: std::result::Result<Vec<NodeSpec>, LoadError>,
    for_search: bool,
) -> Result<bool> {
    if state.generation != ticket.generation {
        debug!("discarding stale fetch for `{}` (tree replaced)", ticket.node);
        return Ok(false);
    }
    let live = state
        .node(&ticket.node)
        .is_some_and(|n| n.load_state == LoadState::Loading { epoch: ticket.epoch });
    if !live {
        debug!("discarding stale fetch for `{}` (superseded)", ticket.node);
        return Ok(false);
    }

    let specs = match result {
        Ok(specs) => specs,
        Err(source) => {
            warn!("fetch for `{}` failed: {source}", ticket.node);
            revert(state, &ticket.node);
            return Err(TreeError::LoadFailed {
                id: ticket.node.clone(),
                source,
            });
        }
    };

    if let Err(err) = state.validate_specs(&specs) {
        warn!("fetch for `{}` returned invalid records: {err}", ticket.node);
        revert(state, &ticket.node);
        return Err(err);
    }
    for spec in specs {
        state.insert_spec(&ticket.node, spec)?;
    }
    if let Some(node) = state.node_mut(&ticket.node) {
        node.load_state = LoadState::Loaded;
        if for_search {
            node.search_loaded = true;
        } else {
            node.collapsed = false;
        }
    }
    debug!("fetch finished for `{}`", ticket.node);
    Ok(true)
}

fn revert(state: &mut TreeState, id: &NodeId) {
    if let Some(node) = state.node_mut(id) {
        // `collapsed` is left untouched; the caller decides whether to retry.
        node.load_state = LoadState::NotLoaded;
    }
}

/// Flips a folder to collapsed. Pure view intent: already-fetched
/// children are retained (no eviction). Returns `false` for non-folders.
pub(crate) fn collapse(state: &mut TreeState, id: &NodeId) -> bool {
    match state.node_mut(id) {
        Some(node) if node.is_folder => {
            node.collapsed = true;
            true
        }
        _ => false,
    }
}

/// Pre-order sweep expanding every folder above `max_level`: loaded
/// folders un-collapse immediately, unloaded lazy folders produce fetch
/// tickets for the caller to run concurrently. Nodes in `skip` (already
/// fetched once this sweep, e.g. after a failure) are not re-requested.
pub(crate) fn expand_sweep(
    state: &mut TreeState,
    max_level: u32,
    skip: &std::collections::HashSet<NodeId>,
) -> Vec<LoadTicket> {
    let mut tickets = Vec::new();
    for id in state.all_ids() {
        let Some(node) = state.node(&id) else {
            continue;
        };
        if !node.is_folder || node.level >= max_level {
            continue;
        }
        match node.load_state {
            LoadState::Loaded => {
                if let Some(node) = state.node_mut(&id) {
                    node.collapsed = false;
                    node.search_loaded = false;
                }
            }
            LoadState::NotLoaded => {
                if !skip.contains(&id) {
                    if let Some(ticket) = begin_fetch(state, &id) {
                        tickets.push(ticket);
                    }
                }
            }
            LoadState::Loading { .. } => {}
        }
    }
    tickets
}

/// Collapses every node at or below `min_level`.
pub(crate) fn collapse_sweep(state: &mut TreeState, min_level: u32) {
    for id in state.all_ids() {
        if let Some(node) = state.node_mut(&id) {
            if node.is_folder && node.level >= min_level {
                node.collapsed = true;
            }
        }
    }
}
