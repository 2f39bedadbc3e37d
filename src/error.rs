//! Error types

use crate::model::NodeId;
use crate::model::OpCode;

/// Error type produced by a [`ChildrenLoader`](crate::ChildrenLoader).
///
/// Loader failures are opaque to the engine; they are wrapped into
/// [`TreeError::LoadFailed`] and surfaced to the caller.
pub type LoadError = Box<dyn std::error::Error + Send + Sync>;

/// Convenience alias for results produced by this crate.
pub type Result<T> = std::result::Result<T, TreeError>;

/// Errors that can occur while mutating or rebuilding a tree.
///
/// Referencing an operation code that is not available on a node is *not*
/// an error: such calls are silent no-ops by design (defensive UI
/// semantics).
#[derive(Debug, thiserror::Error)]
pub enum TreeError {
    /// Attempted to attach a node that already has a parent.
    #[error("node `{id}` is already attached to a parent")]
    DuplicateAttachment {
        /// Id of the already-attached node.
        id: NodeId,
    },

    /// A node with this id already exists in the tree.
    #[error("a node with id `{id}` already exists in the tree")]
    DuplicateId {
        /// The conflicting id.
        id: NodeId,
    },

    /// No node with this id exists in the tree.
    #[error("no node with id `{id}` exists in the tree")]
    UnknownNode {
        /// The missing id.
        id: NodeId,
    },

    /// The referenced node is not a folder and cannot hold children.
    #[error("node `{id}` is not a folder")]
    NotAFolder {
        /// Id of the non-folder node.
        id: NodeId,
    },

    /// An operation type with this code already exists in the catalog.
    #[error("operation type `{code}` already exists")]
    DuplicateOperation {
        /// The conflicting code.
        code: OpCode,
    },

    /// Operation codes must be 1–2 characters long.
    #[error("operation code `{code}` must be 1 to 2 characters")]
    InvalidOperationCode {
        /// The offending code.
        code: String,
    },

    /// The children loader rejected or failed; the node reverts to
    /// `NotLoaded` and a later expand retries the fetch.
    #[error("loading children of `{id}` failed: {source}")]
    LoadFailed {
        /// Id of the folder whose load failed.
        id: NodeId,
        /// The underlying loader error.
        #[source]
        source: LoadError,
    },

    /// A serialized tree or a loader result failed validation. The
    /// previous tree state is left intact (all-or-nothing).
    #[error("malformed tree document: {reason}")]
    MalformedDocument {
        /// Description of the validation failure.
        reason: String,
    },

    /// The document was not valid JSON.
    #[error("invalid JSON document: {0}")]
    Json(#[from] serde_json::Error),
}

impl TreeError {
    /// Creates a malformed-document error.
    pub(crate) fn malformed(reason: impl Into<String>) -> Self {
        Self::MalformedDocument {
            reason: reason.into(),
        }
    }
}
