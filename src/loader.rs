//! The asynchronous children-loader collaborator

use std::collections::HashMap;

use async_trait::async_trait;

use crate::error::LoadError;
use crate::model::NodeId;
use crate::model::OpCode;
use crate::model::OperationState;

/// Read-only projection of the folder a load was requested for.
///
/// Handed to the [`ChildrenLoader`] instead of the live node so the
/// engine never leaks mutable tree state across the fetch boundary.
#[derive(Debug, Clone)]
pub struct NodeSnapshot {
    /// Id of the folder being loaded.
    pub id: NodeId,
    /// Display name of the folder.
    pub name: String,
    /// Depth of the folder (root = 0).
    pub level: u32,
}

/// Construction record for one node, produced by a [`ChildrenLoader`] or
/// passed to [`TreeAction::attach_child`](crate::TreeAction::attach_child).
///
/// Specs are plain data; levels and parent links are derived when the
/// engine attaches them. Nested children let a loader return a pre-built
/// subtree in one call.
///
/// # Example
///
/// ```
/// use tree_action::NodeSpec;
/// use tree_action::model::OperationState;
///
/// let spec = NodeSpec::folder("docs", "Documents")
///     .with_operations(["C", "R", "D"])
///     .with_state("R", OperationState::Allowed)
///     .with_child(NodeSpec::file("readme", "README.md").with_operations(["R"]));
/// ```
#[derive(Debug, Clone)]
pub struct NodeSpec {
    /// Unique, stable id for the new node.
    pub id: NodeId,
    /// Display name.
    pub name: String,
    /// Whether the node is a folder.
    pub folder: bool,
    /// Whether the folder's children are fetched on demand.
    pub lazy: bool,
    /// Operation codes applicable to the node; must be catalog codes.
    pub available_operations: Vec<OpCode>,
    /// Initial tri-state values; keys outside `available_operations` are
    /// silently dropped.
    pub initial_states: HashMap<OpCode, OperationState>,
    /// Pre-built children (folders only).
    pub children: Vec<NodeSpec>,
}

impl NodeSpec {
    fn new(id: impl Into<NodeId>, name: impl Into<String>, folder: bool, lazy: bool) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            folder,
            lazy,
            available_operations: Vec::new(),
            initial_states: HashMap::new(),
            children: Vec::new(),
        }
    }

    /// Creates a leaf (non-folder) spec.
    pub fn file(id: impl Into<NodeId>, name: impl Into<String>) -> Self {
        Self::new(id, name, false, false)
    }

    /// Creates an eagerly-populated folder spec.
    pub fn folder(id: impl Into<NodeId>, name: impl Into<String>) -> Self {
        Self::new(id, name, true, false)
    }

    /// Creates a folder spec whose children are fetched on demand.
    pub fn lazy_folder(id: impl Into<NodeId>, name: impl Into<String>) -> Self {
        Self::new(id, name, true, true)
    }

    /// Sets the applicable operation codes.
    pub fn with_operations<C: Into<OpCode>>(mut self, codes: impl IntoIterator<Item = C>) -> Self {
        self.available_operations = codes.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the initial state of one operation.
    pub fn with_state(mut self, code: impl Into<OpCode>, state: OperationState) -> Self {
        self.initial_states.insert(code.into(), state);
        self
    }

    /// Appends a pre-built child.
    pub fn with_child(mut self, child: NodeSpec) -> Self {
        self.children.push(child);
        self
    }
}

/// Collaborator that fetches the children of a lazy folder.
///
/// Called at most once per load epoch for a given node: the engine's
/// single-flight guard ensures a second expand (or a search reaching the
/// same folder) while a fetch is outstanding never enqueues a duplicate
/// call. Failures surface as
/// [`TreeError::LoadFailed`](crate::TreeError::LoadFailed) and leave the
/// node retryable.
///
/// Timeouts are the loader's responsibility; the engine imposes none.
///
/// # Example
///
/// ```ignore
/// use async_trait::async_trait;
/// use tree_action::{ChildrenLoader, LoadError, NodeSnapshot, NodeSpec};
///
/// struct ApiLoader { client: ApiClient }
///
/// #[async_trait]
/// impl ChildrenLoader for ApiLoader {
///     async fn load(
///         &self,
///         node: NodeSnapshot,
///         query: Option<&str>,
///     ) -> Result<Vec<NodeSpec>, LoadError> {
///         let entries = self.client.list(node.id.as_str(), query).await?;
///         Ok(entries.into_iter().map(to_spec).collect())
///     }
/// }
/// ```
#[async_trait]
pub trait ChildrenLoader: Send + Sync {
    /// Fetches the children of `node`.
    ///
    /// `query` carries the active search string when the fetch was
    /// triggered by a search rather than a user expand; loaders may use it
    /// to narrow the fetch but are free to ignore it.
    async fn load(&self, node: NodeSnapshot, query: Option<&str>) -> Result<Vec<NodeSpec>, LoadError>;
}
