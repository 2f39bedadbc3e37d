//! The TreeAction engine handle

use std::collections::HashMap;
use std::collections::HashSet;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::MutexGuard;
use std::sync::PoisonError;

use futures::future::join_all;
use log::debug;
use tokio::sync::broadcast;

use crate::document;
use crate::document::TreeDocument;
use crate::engine::load;
use crate::engine::load::ExpandAction;
use crate::engine::load::LoadTicket;
use crate::engine::search;
use crate::engine::state;
use crate::engine::TreeState;
use crate::error::Result;
use crate::event::TreeEvent;
use crate::loader::ChildrenLoader;
use crate::loader::NodeSpec;
use crate::model::Node;
use crate::model::NodeId;
use crate::model::OpCode;
use crate::model::OperationCatalog;
use crate::model::OperationState;

const EVENT_CHANNEL_CAPACITY: usize = 64;

/// The hierarchical tri-state operation engine.
///
/// Owns the node arena, the operation catalog and the lazy-load
/// lifecycle. Cheap to clone (uses `Arc` internally); all clones address
/// the same tree. Mutations are serialized through one internal lock
/// which is never held across the [`ChildrenLoader`] fetch boundary; a
/// node's `Loading` state is the per-node lock while a fetch is in
/// flight.
///
/// # Example
///
/// ```ignore
/// use tree_action::{NodeSpec, TreeAction};
///
/// let tree = TreeAction::new(MyLoader::new());
/// let root = tree.root_id();
/// tree.attach_child(&root, NodeSpec::lazy_folder("docs", "Documents"))?;
///
/// tree.expand(&"docs".into()).await?;
/// tree.search("report").await?;
/// ```
#[derive(Clone)]
pub struct TreeAction {
    state: Arc<Mutex<TreeState>>,
    loader: Arc<dyn ChildrenLoader>,
    events: broadcast::Sender<TreeEvent>,
}

impl TreeAction {
    /// Creates a tree with the default Create/Read/Update/Delete/Share
    /// catalog and a root folder (`id = "root"`) carrying every code.
    pub fn new(loader: impl ChildrenLoader + 'static) -> Self {
        Self::with_catalog(loader, OperationCatalog::crud_share())
    }

    /// Creates a tree with a custom operation catalog.
    pub fn with_catalog(loader: impl ChildrenLoader + 'static, catalog: OperationCatalog) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            state: Arc::new(Mutex::new(TreeState::new(catalog))),
            loader: Arc::new(loader),
            events,
        }
    }

    fn lock(&self) -> MutexGuard<'_, TreeState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn emit(&self, event: TreeEvent) {
        // Nobody listening is fine; views subscribe on demand.
        let _ = self.events.send(event);
    }

    /// Subscribes to change notifications.
    pub fn subscribe(&self) -> broadcast::Receiver<TreeEvent> {
        self.events.subscribe()
    }

    /// Returns the root node id.
    pub fn root_id(&self) -> NodeId {
        self.lock().root.clone()
    }

    /// Returns a snapshot of one node.
    pub fn node(&self, id: &NodeId) -> Option<Node> {
        self.lock().node(id).cloned()
    }

    /// Returns every node id in pre-order (parents before children).
    pub fn node_ids(&self) -> Vec<NodeId> {
        self.lock().all_ids()
    }

    /// Returns a copy of the operation catalog.
    pub fn catalog(&self) -> OperationCatalog {
        self.lock().catalog.clone()
    }

    /// Returns `true` while a search projection is active.
    pub fn is_search_active(&self) -> bool {
        self.lock().search_active
    }

    /// Builds and attaches the subtree described by `spec` under `parent`.
    ///
    /// # Errors
    ///
    /// Rejects duplicate ids, operation codes outside the catalog,
    /// children on non-folders and unknown parents; nothing is attached
    /// on error.
    pub fn attach_child(&self, parent: &NodeId, spec: NodeSpec) -> Result<()> {
        {
            let mut state = self.lock();
            state.validate_specs(std::slice::from_ref(&spec))?;
            state.insert_spec(parent, spec)?;
        }
        self.emit(TreeEvent::TreeUpdated);
        Ok(())
    }

    /// Sets an operation's tri-state on a node, cascading down to every
    /// descendant holding the code and re-aggregating every ancestor.
    /// Silent no-op when the code is not available on the node. The
    /// cascade completes before this returns.
    pub fn set_operation(&self, id: &NodeId, code: &OpCode, value: OperationState) {
        let changed = state::set_operation(&mut self.lock(), id, code, value);
        if changed {
            self.emit(TreeEvent::TreeUpdated);
        }
    }

    /// Advances an operation through Unselected → Allowed → Denied →
    /// Unselected. Silent no-op when the code is unavailable.
    pub fn toggle_operation(&self, id: &NodeId, code: &OpCode) {
        let changed = state::toggle_operation(&mut self.lock(), id, code);
        if changed {
            self.emit(TreeEvent::TreeUpdated);
        }
    }

    /// Bulk-assigns states on one node without downward propagation.
    /// States for unavailable codes are dropped silently; ancestor
    /// aggregates are re-derived.
    pub fn set_initial_states(&self, id: &NodeId, states: HashMap<OpCode, OperationState>) {
        let changed = state::set_initial_states(&mut self.lock(), id, states);
        if changed {
            self.emit(TreeEvent::TreeUpdated);
        }
    }

    /// Adds an operation type to the catalog. The new code becomes
    /// available on the root only; existing descendants are unaffected.
    pub fn add_operation(&self, code: impl Into<OpCode>, label: impl Into<String>) -> Result<()> {
        let code = code.into();
        {
            let mut state = self.lock();
            state.catalog.add(code.clone(), label)?;
            let root = state.root.clone();
            if let Some(root) = state.node_mut(&root) {
                root.available_operations.push(code);
            }
        }
        self.emit(TreeEvent::TreeUpdated);
        Ok(())
    }

    /// Removes an operation type and purges the code from every node's
    /// available set and state tree-wide. Returns `false` (no-op) if the
    /// code was not in the catalog.
    pub fn remove_operation(&self, code: &OpCode) -> bool {
        {
            let mut state = self.lock();
            if !state.catalog.remove(code) {
                return false;
            }
            state::purge_operation(&mut state, code);
            state::recompute_mixed(&mut state);
        }
        self.emit(TreeEvent::TreeUpdated);
        true
    }

    /// Expands a folder.
    ///
    /// Already-loaded folders just un-collapse. A `NotLoaded` lazy folder
    /// fetches its children through the [`ChildrenLoader`]; a folder with
    /// a fetch already in flight ignores the request (single-flight), so
    /// concurrent expands of the same node cost one loader call.
    ///
    /// # Errors
    ///
    /// [`TreeError::LoadFailed`](crate::TreeError::LoadFailed) when the
    /// loader fails; the node reverts to `NotLoaded` and a later call
    /// retries the fetch.
    pub async fn expand(&self, id: &NodeId) -> Result<()> {
        let action = load::begin_expand(&mut self.lock(), id);
        match action {
            ExpandAction::Ignore => Ok(()),
            ExpandAction::Expanded => {
                self.emit(TreeEvent::NodeExpanded(id.clone()));
                Ok(())
            }
            ExpandAction::Fetch(ticket) => self.run_load(ticket, None, false).await,
        }
    }

    /// Collapses a folder. Pure view intent: loaded children are
    /// retained for the life of the node.
    pub fn collapse(&self, id: &NodeId) {
        if load::collapse(&mut self.lock(), id) {
            self.emit(TreeEvent::NodeCollapsed(id.clone()));
        }
    }

    /// Expands every folder with `level < max_level`, pre-order. Lazy
    /// loads run concurrently and transitively: folders revealed by one
    /// sweep are expanded by the next, until the depth is saturated.
    /// Individual load failures do not abort siblings; the first failure
    /// is returned after the sweep settles.
    pub async fn expand_to_depth(&self, max_level: u32) -> Result<()> {
        let mut requested: HashSet<NodeId> = HashSet::new();
        let mut first_err = None;
        loop {
            let tickets: Vec<LoadTicket> = {
                let mut state = self.lock();
                load::expand_sweep(&mut state, max_level, &requested)
            };
            if tickets.is_empty() {
                break;
            }
            requested.extend(tickets.iter().map(|t| t.node.clone()));
            let loads = tickets.into_iter().map(|t| self.run_load(t, None, false));
            for result in join_all(loads).await {
                if let Err(err) = result {
                    first_err.get_or_insert(err);
                }
            }
        }
        self.emit(TreeEvent::TreeUpdated);
        first_err.map_or(Ok(()), Err)
    }

    /// Collapses every folder with `level >= min_level`.
    pub fn collapse_to_depth(&self, min_level: u32) {
        load::collapse_sweep(&mut self.lock(), min_level);
        self.emit(TreeEvent::TreeUpdated);
    }

    /// Expands the whole tree, loading every lazy folder.
    pub async fn expand_all(&self) -> Result<()> {
        self.expand_to_depth(u32::MAX).await
    }

    /// Collapses the whole tree.
    pub fn collapse_all(&self) {
        self.collapse_to_depth(0);
    }

    /// Searches node names for a case-insensitive substring match and
    /// projects visibility: matches, their ancestor paths and the full
    /// subtrees of matching folders stay visible, everything else is
    /// hidden (but never removed). Unloaded lazy subtrees, including
    /// ones discovered transitively, are force-loaded through the same
    /// single-flight path before the projection is computed; the
    /// projection is final when this returns.
    ///
    /// An empty query is equivalent to [`clear_search`](Self::clear_search).
    pub async fn search(&self, query: &str) -> Result<()> {
        if query.is_empty() {
            self.clear_search();
            return Ok(());
        }
        debug!("search started for `{query}`");
        self.emit(TreeEvent::SearchStarted);
        {
            let mut state = self.lock();
            state.search_active = true;
            search::reset_visibility(&mut state, false);
        }

        let mut requested: HashSet<NodeId> = HashSet::new();
        let mut first_err = None;
        loop {
            let tickets: Vec<LoadTicket> = {
                let mut state = self.lock();
                search::unloaded_folders(&state)
                    .into_iter()
                    .filter(|id| requested.insert(id.clone()))
                    .filter_map(|id| load::begin_fetch(&mut state, &id))
                    .collect()
            };
            if tickets.is_empty() {
                break;
            }
            let loads = tickets
                .into_iter()
                .map(|t| self.run_load(t, Some(query), true));
            for result in join_all(loads).await {
                if let Err(err) = result {
                    first_err.get_or_insert(err);
                }
            }
        }

        search::apply_matches(&mut self.lock(), query);
        self.emit(TreeEvent::SearchCompleted);
        first_err.map_or(Ok(()), Err)
    }

    /// Ends the active search: every node becomes visible again and
    /// subtrees that were loaded purely to satisfy the search are
    /// discarded (reset to `NotLoaded`). Folders expanded by the user
    /// since the search keep their data.
    pub fn clear_search(&self) {
        search::clear_search(&mut self.lock());
        self.emit(TreeEvent::TreeUpdated);
    }

    /// Serializes the whole tree (catalog plus node records).
    pub fn to_document(&self) -> TreeDocument {
        document::to_document(&self.lock())
    }

    /// Serializes the whole tree to a JSON string.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(&self.to_document())?)
    }

    /// Replaces the whole tree from a document. All-or-nothing: a
    /// malformed document leaves the current tree untouched. Levels are
    /// rebuilt from attachment and mixed flags recomputed; completions of
    /// loads issued against the old tree are discarded.
    pub fn load_document(&self, doc: &TreeDocument) -> Result<()> {
        let mut fresh = document::build_state(doc)?;
        {
            let mut state = self.lock();
            fresh.generation = state.generation + 1;
            *state = fresh;
        }
        self.emit(TreeEvent::TreeUpdated);
        Ok(())
    }

    /// Replaces the whole tree from a JSON document string.
    pub fn load_json(&self, json: &str) -> Result<()> {
        let doc: TreeDocument = serde_json::from_str(json)?;
        self.load_document(&doc)
    }

    async fn run_load(&self, ticket: LoadTicket, query: Option<&str>, for_search: bool) -> Result<()> {
        let result = self.loader.load(ticket.snapshot.clone(), query).await;
        let outcome = {
            let mut state = self.lock();
            load::finish_load(&mut state, &ticket, result, for_search)
        };
        match outcome {
            Ok(true) => {
                if !for_search {
                    self.emit(TreeEvent::NodeExpanded(ticket.node.clone()));
                }
                self.emit(TreeEvent::TreeUpdated);
                Ok(())
            }
            Ok(false) => Ok(()),
            Err(err) => {
                self.emit(TreeEvent::LoadFailed(ticket.node.clone()));
                Err(err)
            }
        }
    }
}
