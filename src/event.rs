//! Change notifications emitted by the engine

use crate::model::NodeId;

/// Discrete change notification consumed by a view layer.
///
/// Events are delivered over a `tokio::sync::broadcast` channel obtained
/// from [`TreeAction::subscribe`](crate::TreeAction::subscribe); a view
/// re-renders by walking the node graph read-only when one arrives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TreeEvent {
    /// A folder was expanded (view intent, or a lazy load completed).
    NodeExpanded(NodeId),
    /// A folder was collapsed.
    NodeCollapsed(NodeId),
    /// Node state or structure changed anywhere in the tree.
    TreeUpdated,
    /// A search pass started; visibility flags are being recomputed.
    SearchStarted,
    /// The search visibility projection is final.
    SearchCompleted,
    /// A lazy load failed; the folder reverted to `NotLoaded`.
    LoadFailed(NodeId),
}
