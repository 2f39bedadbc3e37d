//! Tree node and per-operation state

use std::collections::HashMap;
use std::collections::HashSet;

use serde::Deserialize;
use serde::Serialize;

use super::OpCode;

/// Unique, stable identifier of a node within one tree.
///
/// Ids are assigned by the creator (client code or the deserializer) and
/// are never reused for a different entity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(String);

impl NodeId {
    /// Returns the id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for NodeId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for NodeId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Tri-state permission value for one operation on one node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationState {
    /// No explicit choice has been made.
    #[default]
    Unselected,
    /// The operation is permitted.
    Allowed,
    /// The operation is forbidden.
    Denied,
}

impl OperationState {
    /// The toggle rotation: Unselected → Allowed → Denied → Unselected.
    pub fn next(self) -> Self {
        match self {
            Self::Unselected => Self::Allowed,
            Self::Allowed => Self::Denied,
            Self::Denied => Self::Unselected,
        }
    }
}

/// Lazy-load lifecycle of a folder.
///
/// `Loading` doubles as the single-flight lock: any expand or
/// search-triggered load observing it is a no-op, so a node can never have
/// two fetches in flight. The epoch tags the in-flight fetch so a
/// completion arriving after the node was reloaded or replaced is
/// recognized as stale and discarded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadState {
    /// Children are present (non-folders and non-lazy folders are always here).
    Loaded,
    /// Children have not been fetched yet.
    NotLoaded,
    /// A fetch is in flight.
    Loading {
        /// Identity of the in-flight fetch.
        epoch: u64,
    },
}

impl LoadState {
    /// Returns `true` if children are present.
    pub fn is_loaded(self) -> bool {
        matches!(self, Self::Loaded)
    }

    /// Returns `true` if a fetch is in flight.
    pub fn is_loading(self) -> bool {
        matches!(self, Self::Loading { .. })
    }
}

/// One entry in the tree.
///
/// Nodes are owned by the tree and addressed by [`NodeId`]; `parent` and
/// `children` are id references, never owning edges, so upward traversal
/// cannot form an ownership cycle. All mutation goes through
/// [`TreeAction`](crate::TreeAction); values handed out by the engine are
/// snapshots.
#[derive(Debug, Clone)]
pub struct Node {
    /// Unique, stable identifier.
    pub id: NodeId,
    /// Display label, not required to be unique.
    pub name: String,
    /// Only folders may have children or be lazily loaded.
    pub is_folder: bool,
    /// Whether children are fetched on demand (folders only).
    pub lazy_load: bool,
    /// Lazy-load lifecycle; doubles as the single-flight lock.
    pub load_state: LoadState,
    /// View intent: whether the folder is drawn collapsed.
    pub collapsed: bool,
    /// Depth from the root (root = 0); derived from attachment.
    pub level: u32,
    /// Codes applicable to this node, in catalog order; subset of the catalog.
    pub available_operations: Vec<OpCode>,
    /// Tri-state per available code; an absent key means `Unselected`.
    pub operation_state: HashMap<OpCode, OperationState>,
    /// Codes whose descendants currently disagree. Derived, never persisted.
    pub mixed_operations: HashSet<OpCode>,
    /// Search projection; `true` outside of an active search.
    pub visible: bool,
    /// Ordered child ids; order is creator-supplied and preserved.
    pub children: Vec<NodeId>,
    /// Parent id; `None` only for the root.
    pub parent: Option<NodeId>,
    /// Set when this folder was populated speculatively by a search.
    pub(crate) search_loaded: bool,
}

impl Node {
    /// Creates a detached node. `lazy_load` is only honored for folders;
    /// non-lazy nodes start `Loaded`.
    pub(crate) fn new(id: NodeId, name: impl Into<String>, is_folder: bool, lazy_load: bool) -> Self {
        let lazy_load = is_folder && lazy_load;
        Self {
            id,
            name: name.into(),
            is_folder,
            lazy_load,
            load_state: if lazy_load {
                LoadState::NotLoaded
            } else {
                LoadState::Loaded
            },
            collapsed: true,
            level: 0,
            available_operations: Vec::new(),
            operation_state: HashMap::new(),
            mixed_operations: HashSet::new(),
            visible: true,
            children: Vec::new(),
            parent: None,
            search_loaded: false,
        }
    }

    /// Returns `true` if the given operation applies to this node.
    pub fn is_operation_available(&self, code: &OpCode) -> bool {
        self.available_operations.contains(code)
    }

    /// Returns the state of an operation; absent keys read as `Unselected`.
    pub fn operation_state(&self, code: &OpCode) -> OperationState {
        self.operation_state.get(code).copied().unwrap_or_default()
    }

    /// Returns `true` if this node's children disagree on the operation.
    pub fn is_mixed(&self, code: &OpCode) -> bool {
        self.mixed_operations.contains(code)
    }
}
