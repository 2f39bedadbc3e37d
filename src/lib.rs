//! Hierarchical tri-state operation tree engine
//!
//! A file/resource tree where every node carries a set of operations
//! (Create/Read/Update/Delete/Share by default), each independently
//! togglable between Unselected, Allowed and Denied. Setting an operation
//! cascades down to every descendant holding it and re-aggregates every
//! ancestor, surfacing disagreement as a derived "mixed" indicator.
//! Folders can load their children on demand through an asynchronous
//! [`ChildrenLoader`] with a single-flight guarantee, and name search
//! transparently force-loads unloaded subtrees before projecting which
//! nodes stay visible.
//!
//! The engine carries no rendering: views subscribe to [`TreeEvent`]
//! notifications and walk the node graph read-only.

pub mod document;
pub mod error;
pub mod event;
pub mod loader;
pub mod model;

mod engine;
mod tree;

pub use document::NodeRecord;
pub use document::TreeDocument;
pub use error::LoadError;
pub use error::Result;
pub use error::TreeError;
pub use event::TreeEvent;
pub use loader::ChildrenLoader;
pub use loader::NodeSnapshot;
pub use loader::NodeSpec;
pub use model::LoadState;
pub use model::Node;
pub use model::NodeId;
pub use model::OpCode;
pub use model::OperationCatalog;
pub use model::OperationState;
pub use model::OperationType;
pub use tree::TreeAction;
