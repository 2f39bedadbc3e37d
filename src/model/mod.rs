//! Data model: nodes, operation codes and the operation catalog

mod catalog;
mod node;

pub use catalog::*;
pub use node::*;
